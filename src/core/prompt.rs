//! System prompts and message assembly for each assistant mode.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum AgentMode {
    /// Answer questions about uploaded documents
    #[default]
    Documents,
    /// Data-science and ML engineering help
    #[value(name = "datascience")]
    DataScience,
    /// Multi-angle research reports
    Research,
}

pub const ALL_MODES: [AgentMode; 3] = [
    AgentMode::Documents,
    AgentMode::DataScience,
    AgentMode::Research,
];

const DOCUMENTS_PROMPT: &str = "You are a retrieval-augmented assistant for data science engineers. The user has uploaded documents and asks questions about them.

How to respond:
- Ground every answer in the document content supplied in the conversation
- If no document content was supplied, say that documents must be uploaded first
- Quote the relevant passages where you can
- Do not invent facts; if the documents do not contain the answer, say so
- Use markdown: fenced code blocks, bold, headings, bullet lists
- Give code examples with language tags for syntax highlighting

Work through each question step by step:
1. Restate what the user is asking
2. Look for the answer in the supplied document context
3. Compose a clear answer backed by that evidence
4. Cite the source document when possible";

const DATA_SCIENCE_PROMPT: &str = "You are a senior data science and machine learning engineering assistant. You help engineers with:

- Python for data analysis, ML pipelines and feature engineering
- Explaining algorithms and statistical ideas
- Debugging ML code and proposing improvements
- Best practices for training, evaluating and deploying models
- Libraries such as pandas, scikit-learn, PyTorch, TensorFlow and XGBoost

How to respond:
- Give complete code examples that run as written
- Explain trade-offs and when each approach fits
- Mention performance and scalability concerns
- Use markdown with fenced code blocks
- Reason step by step through hard problems";

const RESEARCH_PROMPT: &str = "You are an autonomous research agent for data science engineers and you carry out multi-step research.

How to respond:
- Split the research question into sub-tasks
- Examine the topic from several angles
- Produce structured reports with sections, tables and data points
- Compare approaches and technologies objectively
- Cover trends, statistics and actionable recommendations
- Lay the report out as:
  - Executive Summary
  - Key Findings (numbered)
  - Data/Comparison Tables (markdown tables)
  - Recommendations
  - Sources/References where available

Think like a research analyst: thorough, data-driven and objective.";

pub const DOCUMENT_CONTEXT_PREAMBLE: &str = "Here are the uploaded document contents for reference:\n\n";

impl AgentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentMode::Documents => "documents",
            AgentMode::DataScience => "datascience",
            AgentMode::Research => "research",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            AgentMode::Documents => "Document Q&A",
            AgentMode::DataScience => "Data Science",
            AgentMode::Research => "Research Agent",
        }
    }

    pub fn system_prompt(self) -> &'static str {
        match self {
            AgentMode::Documents => DOCUMENTS_PROMPT,
            AgentMode::DataScience => DATA_SCIENCE_PROMPT,
            AgentMode::Research => RESEARCH_PROMPT,
        }
    }
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ALL_MODES
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| {
                format!("unknown mode '{value}' (expected documents, datascience, or research)")
            })
    }
}

/// Wire values are lenient: anything unrecognized selects the documents mode.
impl From<String> for AgentMode {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            debug!(mode = %value, "unknown mode on the wire, using documents");
            AgentMode::Documents
        })
    }
}

/// Build the message list sent upstream: the mode's system prompt, the
/// document context as a second system message when present, then history.
pub fn compose_messages(
    mode: AgentMode,
    document_context: Option<&str>,
    history: &[ChatMessage],
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(mode.system_prompt()));

    if let Some(context) = document_context.filter(|context| !context.is_empty()) {
        messages.push(ChatMessage::system(format!(
            "{DOCUMENT_CONTEXT_PREAMBLE}{context}"
        )));
    }

    messages.extend(history.iter().cloned());
    messages
}
