//! Conversation state for one chat front-end.
//!
//! `ChatSession` is the single owner of the transcript and of the reply that
//! is currently streaming. It never performs I/O itself: `begin_send` hands
//! back the request to post, and the caller feeds every [`StreamMessage`] of
//! that request back through [`ChatSession::apply`].

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{ChatMessage, RelayRequest, Role};
use crate::core::chat_stream::StreamMessage;
use crate::core::documents::DocumentStore;
use crate::core::prompt::AgentMode;
use crate::core::steps::{AgentStep, StepKind, StepTracker};
use crate::utils::logging::LoggingState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptMessage {
    pub role: Role,
    pub content: String,
    pub steps: Vec<AgentStep>,
    /// Synthetic failure notice appended by the session itself.
    pub is_error: bool,
}

impl TranscriptMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            steps: Vec::new(),
            is_error: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendRejected {
    #[error("message is empty")]
    Empty,
    #[error("a reply is still streaming")]
    Busy,
}

/// Everything needed to post one user turn.
#[derive(Debug)]
pub struct PreparedSend {
    pub request: RelayRequest,
    pub stream_id: u64,
    pub cancel_token: CancellationToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    Started,
    Content { delta: String },
    Finished,
    Failed(String),
}

struct InFlight {
    stream_id: u64,
    cancel_token: CancellationToken,
    analyze_step: u64,
    result_step: Option<u64>,
    reply_index: Option<usize>,
}

pub struct ChatSession {
    messages: Vec<TranscriptMessage>,
    mode: AgentMode,
    documents: DocumentStore,
    steps: StepTracker,
    in_flight: Option<InFlight>,
    current_stream_id: u64,
    current_response: String,
    model_label: String,
    pub logging: LoggingState,
}

pub fn format_error_message(message: &str) -> String {
    let message = message.trim().trim_end_matches('.');
    let message = if message.is_empty() {
        "Something went wrong"
    } else {
        message
    };
    format!("⚠️ Error: {message}. Please try again.")
}

impl ChatSession {
    pub fn new(mode: AgentMode, model_label: impl Into<String>, logging: LoggingState) -> Self {
        Self {
            messages: Vec::new(),
            mode,
            documents: DocumentStore::new(),
            steps: StepTracker::new(),
            in_flight: None,
            current_stream_id: 0,
            current_response: String::new(),
            model_label: model_label.into(),
            logging,
        }
    }

    pub fn messages(&self) -> &[TranscriptMessage] {
        &self.messages
    }

    pub fn mode(&self) -> AgentMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: AgentMode) {
        self.mode = mode;
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn documents_mut(&mut self) -> &mut DocumentStore {
        &mut self.documents
    }

    pub fn current_steps(&self) -> &[AgentStep] {
        self.steps.steps()
    }

    pub fn current_response(&self) -> &str {
        &self.current_response
    }

    pub fn is_processing(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_current_stream(&self, stream_id: u64) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.stream_id == stream_id)
    }

    /// Record the user's turn, run the preparatory stages, and return the
    /// request to send. Only one reply may be in flight at a time.
    pub fn begin_send(&mut self, content: &str) -> Result<PreparedSend, SendRejected> {
        if self.in_flight.is_some() {
            return Err(SendRejected::Busy);
        }
        let content = content.trim();
        if content.is_empty() {
            return Err(SendRejected::Empty);
        }

        if let Err(e) = self.logging.log_user(content) {
            warn!(error = %e, "failed to write transcript log");
        }
        self.messages.push(TranscriptMessage::new(Role::User, content));
        self.current_response.clear();
        self.steps.clear();

        let think = self
            .steps
            .start(StepKind::Thinking, "Analyzing query intent", None);
        self.steps.complete(think);

        let mut document_context = None;
        if self.mode == AgentMode::Documents && self.documents.has_text() {
            let search = self.steps.start(
                StepKind::Search,
                "Searching document embeddings",
                Some(format!("{} docs", self.documents.text_count())),
            );
            document_context = Some(self.documents.build_context());
            self.steps.complete(search);
        }

        let analyze_step = self.steps.start(
            StepKind::Analyze,
            "Processing with AI model",
            Some(self.model_label.clone()),
        );

        let history = self
            .messages
            .iter()
            .map(|message| ChatMessage::new(message.role, message.content.clone()))
            .collect();

        self.current_stream_id += 1;
        let cancel_token = CancellationToken::new();
        self.in_flight = Some(InFlight {
            stream_id: self.current_stream_id,
            cancel_token: cancel_token.clone(),
            analyze_step,
            result_step: None,
            reply_index: None,
        });

        debug!(stream_id = self.current_stream_id, mode = %self.mode, "sending message");
        Ok(PreparedSend {
            request: RelayRequest {
                messages: history,
                mode: self.mode,
                document_context,
            },
            stream_id: self.current_stream_id,
            cancel_token,
        })
    }

    /// Apply one stream event. Events for any stream other than the one in
    /// flight are ignored.
    pub fn apply(&mut self, stream_id: u64, message: StreamMessage) -> Option<SessionUpdate> {
        if !self.is_current_stream(stream_id) {
            return None;
        }

        match message {
            StreamMessage::Started => {
                let in_flight = self.in_flight.as_mut()?;
                self.steps.complete(in_flight.analyze_step);
                in_flight.result_step =
                    Some(self.steps.start(StepKind::Result, "Streaming response", None));
                Some(SessionUpdate::Started)
            }
            StreamMessage::Chunk(delta) => {
                if delta.is_empty() {
                    return None;
                }
                self.append_to_response(&delta);
                Some(SessionUpdate::Content { delta })
            }
            StreamMessage::Error(message) => Some(SessionUpdate::Failed(self.fail(&message))),
            StreamMessage::End => {
                self.finish();
                Some(SessionUpdate::Finished)
            }
        }
    }

    /// Abandon the reply in flight. Text already received stays in place.
    pub fn cancel(&mut self) -> bool {
        let Some(in_flight) = self.in_flight.take() else {
            return false;
        };
        in_flight.cancel_token.cancel();
        self.steps.fail_running();
        self.close_reply(in_flight.reply_index);
        true
    }

    fn append_to_response(&mut self, delta: &str) {
        self.current_response.push_str(delta);
        let Some(in_flight) = self.in_flight.as_mut() else {
            return;
        };

        match in_flight.reply_index {
            Some(index) => {
                if let Some(reply) = self.messages.get_mut(index) {
                    reply.content.clone_from(&self.current_response);
                }
            }
            None => {
                self.messages.push(TranscriptMessage::new(
                    Role::Assistant,
                    self.current_response.clone(),
                ));
                in_flight.reply_index = Some(self.messages.len() - 1);
            }
        }
    }

    fn finish(&mut self) {
        let Some(in_flight) = self.in_flight.take() else {
            return;
        };
        let last_step = in_flight.result_step.unwrap_or(in_flight.analyze_step);
        self.steps.complete(last_step);

        if let Err(e) = self.logging.log_assistant(&self.current_response) {
            warn!(error = %e, "failed to write transcript log");
        }
        self.close_reply(in_flight.reply_index);
    }

    fn fail(&mut self, message: &str) -> String {
        let reply_index = self.in_flight.take().and_then(|in_flight| in_flight.reply_index);
        self.steps.fail_running();
        self.close_reply(reply_index);

        let content = format_error_message(message);
        self.messages.push(TranscriptMessage {
            is_error: true,
            ..TranscriptMessage::new(Role::Assistant, content.clone())
        });
        content
    }

    fn close_reply(&mut self, reply_index: Option<usize>) {
        let steps = self.steps.take();
        if let Some(reply) = reply_index.and_then(|index| self.messages.get_mut(index)) {
            reply.steps = steps;
        }
        self.current_response.clear();
    }
}
