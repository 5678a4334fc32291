use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Thinking,
    Tool,
    Search,
    Analyze,
    Code,
    Result,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Running,
    Done,
    Error,
}

/// Progress indicator shown while a reply is being produced. Purely
/// cosmetic: no stage does any work beyond what its label names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentStep {
    pub id: u64,
    pub kind: StepKind,
    pub label: String,
    pub detail: Option<String>,
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,
}

impl StepKind {
    pub fn icon(self) -> &'static str {
        match self {
            StepKind::Thinking => "🧠",
            StepKind::Tool => "🔧",
            StepKind::Search => "🔍",
            StepKind::Analyze => "📊",
            StepKind::Code => "💻",
            StepKind::Result => "✨",
        }
    }
}

impl StepStatus {
    pub fn marker(self) -> &'static str {
        match self {
            StepStatus::Running => "…",
            StepStatus::Done => "✓",
            StepStatus::Error => "✗",
        }
    }
}

impl AgentStep {
    pub fn summary(&self) -> String {
        match &self.detail {
            Some(detail) => format!(
                "{} {} ({}) {}",
                self.kind.icon(),
                self.label,
                detail,
                self.status.marker()
            ),
            None => format!("{} {} {}", self.kind.icon(), self.label, self.status.marker()),
        }
    }
}

#[derive(Debug, Default)]
pub struct StepTracker {
    steps: Vec<AgentStep>,
    next_id: u64,
}

impl StepTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a running step and return its id.
    pub fn start(&mut self, kind: StepKind, label: &str, detail: Option<String>) -> u64 {
        self.next_id += 1;
        self.steps.push(AgentStep {
            id: self.next_id,
            kind,
            label: label.to_string(),
            detail,
            status: StepStatus::Running,
            timestamp: Utc::now(),
        });
        self.next_id
    }

    pub fn set_status(&mut self, id: u64, status: StepStatus) -> bool {
        match self.steps.iter_mut().find(|step| step.id == id) {
            Some(step) => {
                step.status = status;
                true
            }
            None => false,
        }
    }

    pub fn complete(&mut self, id: u64) -> bool {
        self.set_status(id, StepStatus::Done)
    }

    /// Mark every step still running as failed.
    pub fn fail_running(&mut self) {
        for step in self
            .steps
            .iter_mut()
            .filter(|step| step.status == StepStatus::Running)
        {
            step.status = StepStatus::Error;
        }
    }

    pub fn steps(&self) -> &[AgentStep] {
        &self.steps
    }

    pub fn take(&mut self) -> Vec<AgentStep> {
        std::mem::take(&mut self.steps)
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }
}
