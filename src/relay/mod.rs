//! HTTP relay between chat clients and the completion gateway.
//!
//! The relay owns the gateway credential and the system prompts. Clients post
//! a [`RelayRequest`]; the relay composes the full message list, forwards it
//! with streaming enabled, and pipes the upstream event stream back
//! unmodified.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::api::{ChatRequest, ErrorBody, RelayRequest};
use crate::core::prompt::compose_messages;
use crate::utils::auth::add_bearer_auth;
use crate::utils::url::construct_api_url;

pub const CHAT_ROUTE: &str = "/agent-chat";
pub const HEARTBEAT_ROUTE: &str = "/heartbeat";

/// Environment variable holding the gateway bearer credential.
pub const GATEWAY_API_KEY_ENV: &str = "AGENTDESK_GATEWAY_API_KEY";

const MAX_REQUEST_BYTES: usize = 10 * 1024 * 1024;
const MAX_LOGGED_ERROR_BYTES: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Rate limit exceeded. Please try again shortly.")]
    RateLimited,
    #[error("AI credits exhausted. Please add credits in Settings.")]
    CreditsExhausted,
    #[error("AI service error")]
    Upstream(StatusCode),
    #[error("AGENTDESK_GATEWAY_API_KEY is not configured")]
    MissingApiKey,
    #[error("{0}")]
    Transport(String),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            RelayError::CreditsExhausted => StatusCode::PAYMENT_REQUIRED,
            RelayError::Upstream(_) | RelayError::MissingApiKey | RelayError::Transport(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

/// What the gateway answered, before any status handling.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Body,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, body: impl Into<Body>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Seam between the relay handler and the network.
#[async_trait::async_trait]
pub trait CompletionUpstream: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<UpstreamResponse, RelayError>;
}

/// OpenAI-compatible gateway reached over HTTP.
pub struct GatewayClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }

    pub fn from_env(base_url: impl Into<String>) -> Self {
        Self::new(base_url, std::env::var(GATEWAY_API_KEY_ENV).ok())
    }
}

#[async_trait::async_trait]
impl CompletionUpstream for GatewayClient {
    async fn complete(&self, request: ChatRequest) -> Result<UpstreamResponse, RelayError> {
        let api_key = self.api_key.as_deref().ok_or(RelayError::MissingApiKey)?;
        let url = construct_api_url(&self.base_url, "chat/completions");

        let response = add_bearer_auth(self.client.post(url), Some(api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        Ok(UpstreamResponse {
            status: response.status(),
            body: Body::from_stream(response.bytes_stream()),
        })
    }
}

#[derive(Clone)]
pub struct RelayState {
    pub upstream: Arc<dyn CompletionUpstream>,
    pub model: String,
}

pub async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

pub async fn agent_chat(State(state): State<RelayState>, body: Bytes) -> Response {
    match relay_chat(&state, &body).await {
        Ok(response) => response,
        Err(err) => {
            warn!(status = err.status().as_u16(), error = %err, "agent chat failed");
            err.into_response()
        }
    }
}

async fn relay_chat(state: &RelayState, body: &[u8]) -> Result<Response, RelayError> {
    let request: RelayRequest = serde_json::from_slice(body)
        .map_err(|e| RelayError::InvalidRequest(format!("Invalid request body: {e}")))?;
    if request.messages.is_empty() {
        return Err(RelayError::InvalidRequest(
            "messages must not be empty".to_string(),
        ));
    }

    debug!(
        mode = %request.mode,
        messages = request.messages.len(),
        has_documents = request.document_context.is_some(),
        "relaying chat request"
    );

    let messages = compose_messages(
        request.mode,
        request.document_context.as_deref(),
        &request.messages,
    );
    let upstream = state
        .upstream
        .complete(ChatRequest {
            model: state.model.clone(),
            messages,
            stream: true,
        })
        .await?;

    match upstream.status {
        status if status.is_success() => Ok((
            [(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"))],
            upstream.body,
        )
            .into_response()),
        StatusCode::TOO_MANY_REQUESTS => Err(RelayError::RateLimited),
        StatusCode::PAYMENT_REQUIRED => Err(RelayError::CreditsExhausted),
        status => {
            let text = axum::body::to_bytes(upstream.body, MAX_LOGGED_ERROR_BYTES)
                .await
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or_default();
            error!(status = status.as_u16(), body = %text, "AI gateway error");
            Err(RelayError::Upstream(status))
        }
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ])
}

pub fn build_router(state: RelayState) -> Router {
    Router::new()
        .route(HEARTBEAT_ROUTE, get(heartbeat))
        .route(CHAT_ROUTE, post(agent_chat))
        .layer(axum::extract::DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and run the relay until Ctrl+C.
pub async fn serve(listen: SocketAddr, state: RelayState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(addr = %listener.local_addr()?, model = %state.model, "relay listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutting down relay");
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ChatMessage, Role};
    use crate::core::prompt::{AgentMode, DOCUMENT_CONTEXT_PREAMBLE};
    use axum::http::Request;
    use tower::ServiceExt;

    struct MockUpstream {
        status: StatusCode,
        body: &'static str,
        captured: tokio::sync::Mutex<Option<ChatRequest>>,
    }

    impl MockUpstream {
        fn new(status: StatusCode, body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                status,
                body,
                captured: tokio::sync::Mutex::new(None),
            })
        }
    }

    #[async_trait::async_trait]
    impl CompletionUpstream for MockUpstream {
        async fn complete(&self, request: ChatRequest) -> Result<UpstreamResponse, RelayError> {
            *self.captured.lock().await = Some(request);
            Ok(UpstreamResponse::new(self.status, self.body))
        }
    }

    struct FailingUpstream;

    #[async_trait::async_trait]
    impl CompletionUpstream for FailingUpstream {
        async fn complete(&self, _request: ChatRequest) -> Result<UpstreamResponse, RelayError> {
            Err(RelayError::Transport("connection refused".into()))
        }
    }

    fn router(upstream: Arc<dyn CompletionUpstream>) -> Router {
        build_router(RelayState {
            upstream,
            model: "test/model".into(),
        })
    }

    fn chat_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(CHAT_ROUTE)
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn error_text(response: Response) -> String {
        let body: ErrorBody = serde_json::from_str(&body_text(response).await).unwrap();
        body.error
    }

    #[tokio::test]
    async fn heartbeat_returns_ok() {
        let app = router(MockUpstream::new(StatusCode::OK, ""));
        let req = Request::builder()
            .uri(HEARTBEAT_ROUTE)
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn success_pipes_event_stream_unmodified() {
        let stream = "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\ndata: [DONE]\n\n";
        let upstream = MockUpstream::new(StatusCode::OK, stream);
        let app = router(upstream.clone());

        let resp = app
            .oneshot(chat_request(
                r#"{"messages":[{"role":"user","content":"hello"}],"mode":"research"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CONTENT_TYPE], "text/event-stream");
        assert_eq!(body_text(resp).await, stream);

        let captured = upstream.captured.lock().await.take().unwrap();
        assert_eq!(captured.model, "test/model");
        assert!(captured.stream);
        assert_eq!(
            captured.messages,
            vec![
                ChatMessage::system(AgentMode::Research.system_prompt()),
                ChatMessage::user("hello"),
            ]
        );
    }

    #[tokio::test]
    async fn document_context_is_inserted_after_system_prompt() {
        let upstream = MockUpstream::new(StatusCode::OK, "");
        let app = router(upstream.clone());

        let body = r#"{
            "messages":[{"role":"user","content":"q"},{"role":"assistant","content":"a"}],
            "documentContext":"--- Document: a.txt ---\nalpha"
        }"#;
        let resp = app.oneshot(chat_request(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let captured = upstream.captured.lock().await.take().unwrap();
        let roles: Vec<_> = captured.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::System, Role::User, Role::Assistant]
        );
        assert_eq!(
            captured.messages[0].content,
            AgentMode::Documents.system_prompt()
        );
        assert_eq!(
            captured.messages[1].content,
            format!("{DOCUMENT_CONTEXT_PREAMBLE}--- Document: a.txt ---\nalpha")
        );
    }

    #[tokio::test]
    async fn upstream_rate_limit_maps_to_429() {
        let app = router(MockUpstream::new(StatusCode::TOO_MANY_REQUESTS, "slow down"));
        let resp = app
            .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"x"}]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            error_text(resp).await,
            "Rate limit exceeded. Please try again shortly."
        );
    }

    #[tokio::test]
    async fn upstream_payment_required_maps_to_402() {
        let app = router(MockUpstream::new(StatusCode::PAYMENT_REQUIRED, "{}"));
        let resp = app
            .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"x"}]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(
            error_text(resp).await,
            "AI credits exhausted. Please add credits in Settings."
        );
    }

    #[tokio::test]
    async fn other_upstream_failures_map_to_generic_500() {
        let app = router(MockUpstream::new(StatusCode::BAD_GATEWAY, "<html>oops</html>"));
        let resp = app
            .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"x"}]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error_text(resp).await, "AI service error");
    }

    #[tokio::test]
    async fn transport_failure_reports_error_text() {
        let app = router(Arc::new(FailingUpstream));
        let resp = app
            .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"x"}]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error_text(resp).await, "connection refused");
    }

    #[tokio::test]
    async fn invalid_bodies_are_rejected_with_400() {
        for body in [
            "not json",
            r#"{"mode":"research"}"#,
            r#"{"messages":"hello"}"#,
            r#"{"messages":[]}"#,
            r#"{"messages":[{"role":"tool","content":"x"}]}"#,
        ] {
            let upstream = MockUpstream::new(StatusCode::OK, "");
            let app = router(upstream.clone());
            let resp = app.oneshot(chat_request(body)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body: {body}");
            assert!(upstream.captured.lock().await.is_none());
        }
    }

    #[tokio::test]
    async fn unknown_mode_falls_back_to_documents() {
        let upstream = MockUpstream::new(StatusCode::OK, "");
        let app = router(upstream.clone());
        let resp = app
            .oneshot(chat_request(
                r#"{"messages":[{"role":"user","content":"x"}],"mode":"astrology"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let captured = upstream.captured.lock().await.take().unwrap();
        assert_eq!(
            captured.messages[0].content,
            AgentMode::Documents.system_prompt()
        );
    }

    #[tokio::test]
    async fn preflight_is_answered_by_cors_layer() {
        let upstream = MockUpstream::new(StatusCode::OK, "");
        let app = router(upstream.clone());
        let req = Request::builder()
            .method("OPTIONS")
            .uri(CHAT_ROUTE)
            .header("origin", "https://app.example")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "authorization,x-client-info")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert!(resp.status().is_success());
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
        assert!(upstream.captured.lock().await.is_none());
    }

    #[tokio::test]
    async fn gateway_without_api_key_fails_before_sending() {
        let client = GatewayClient::new("http://127.0.0.1:9", Some("  ".into()));
        let request = ChatRequest {
            model: "m".into(),
            messages: vec![ChatMessage::user("x")],
            stream: true,
        };
        let err = client.complete(request).await.err().unwrap();
        assert!(matches!(err, RelayError::MissingApiKey));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "AGENTDESK_GATEWAY_API_KEY is not configured");
    }
}
