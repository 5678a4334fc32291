use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::RelayRequest;
use crate::core::sse::FrameDecoder;
use crate::relay::CHAT_ROUTE;
use crate::utils::auth::add_bearer_auth;
use crate::utils::url::construct_api_url;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamMessage {
    /// The relay accepted the request and the body is being read.
    Started,
    Chunk(String),
    Error(String),
    End,
}

/// Request-level failures, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("Quota exhausted: {0}")]
    QuotaExhausted(String),
    #[error("{0}")]
    Service(String),
    #[error("{0}")]
    Transport(String),
}

impl RequestError {
    /// Classify a non-success response that arrived before any streaming.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let message = extract_error_message(body)
            .unwrap_or_else(|| format!("Request failed ({})", status.as_u16()));
        match status {
            StatusCode::TOO_MANY_REQUESTS => RequestError::RateLimited(message),
            StatusCode::PAYMENT_REQUIRED => RequestError::QuotaExhausted(message),
            _ => RequestError::Service(message),
        }
    }
}

fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body.trim()).ok()?;
    let message = match value.get("error")? {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Object(map) => map.get("message")?.as_str()?.to_string(),
        _ => return None,
    };
    let collapsed = message.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

pub struct StreamParams {
    pub client: reqwest::Client,
    pub relay_url: String,
    pub api_key: Option<String>,
    pub request: RelayRequest,
    pub cancel_token: tokio_util::sync::CancellationToken,
    pub stream_id: u64,
}

#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::UnboundedSender<(StreamMessage, u64)>,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_stream(&self, params: StreamParams) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let StreamParams {
                client,
                relay_url,
                api_key,
                request,
                cancel_token,
                stream_id,
            } = params;

            tokio::select! {
                result = run_stream(&client, &relay_url, api_key.as_deref(), &request, &tx, stream_id) => {
                    if let Err(err) = result {
                        warn!(stream_id, error = %err, "chat request failed");
                        let _ = tx.send((StreamMessage::Error(err.to_string()), stream_id));
                    }
                    let _ = tx.send((StreamMessage::End, stream_id));
                }
                _ = cancel_token.cancelled() => {
                    debug!(stream_id, "chat stream cancelled");
                }
            }
        });
    }
}

async fn run_stream(
    client: &reqwest::Client,
    relay_url: &str,
    api_key: Option<&str>,
    request: &RelayRequest,
    tx: &mpsc::UnboundedSender<(StreamMessage, u64)>,
    stream_id: u64,
) -> Result<(), RequestError> {
    let chat_url = construct_api_url(relay_url, CHAT_ROUTE);
    let http_request = client
        .post(chat_url)
        .header("Content-Type", "application/json");
    let http_request = add_bearer_auth(http_request, api_key);

    let response = http_request
        .json(request)
        .send()
        .await
        .map_err(|e| RequestError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RequestError::from_response(status, &body));
    }

    let _ = tx.send((StreamMessage::Started, stream_id));
    pump_body(response.bytes_stream(), tx, stream_id).await
}

/// Feed a response body through a [`FrameDecoder`], forwarding each delta.
pub async fn pump_body<S, E>(
    body: S,
    tx: &mpsc::UnboundedSender<(StreamMessage, u64)>,
    stream_id: u64,
) -> Result<(), RequestError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut decoder = FrameDecoder::new();
    let mut body = std::pin::pin!(body);

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| RequestError::Transport(e.to_string()))?;
        for delta in decoder.feed(&chunk) {
            let _ = tx.send((StreamMessage::Chunk(delta), stream_id));
        }
        if decoder.is_done() {
            return Ok(());
        }
    }

    for delta in decoder.finish() {
        let _ = tx.send((StreamMessage::Chunk(delta), stream_id));
    }
    Ok(())
}
