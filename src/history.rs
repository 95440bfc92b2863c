use chrono::{DateTime, Utc};
use tracing::debug;

use crate::github::Issue;
use crate::response::ParsedResponse;

/// Which list changed, and its new length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryChange {
    Responses(usize),
    ToolUsages(usize),
}

/// Called after every mutation of a [`History`].
pub type ChangeListener = Box<dyn Fn(HistoryChange) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ResponseRecord {
    pub issue_number: u64,
    pub issue_title: String,
    pub response: ParsedResponse,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolUsage {
    pub issue_number: u64,
    pub issue_title: String,
    pub tool_path: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Fix results and tool paths for the current process. Nothing is persisted.
#[derive(Default)]
pub struct History {
    responses: Vec<ResponseRecord>,
    tool_usages: Vec<ToolUsage>,
    listener: Option<ChangeListener>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listener(listener: impl Fn(HistoryChange) + Send + Sync + 'static) -> Self {
        Self {
            listener: Some(Box::new(listener)),
            ..Self::default()
        }
    }

    /// Record a response. Newest first.
    pub fn add_response(&mut self, issue: &Issue, response: ParsedResponse) {
        debug!(issue = issue.number, status = %response.status, "recording response");
        self.responses.insert(
            0,
            ResponseRecord {
                issue_number: issue.number,
                issue_title: issue.title.clone(),
                response,
                received_at: Utc::now(),
            },
        );
        self.notify(HistoryChange::Responses(self.responses.len()));
    }

    pub fn responses(&self) -> &[ResponseRecord] {
        &self.responses
    }

    /// Store the tool path used for an issue, replacing any earlier entry
    /// for the same issue. Empty paths are ignored.
    pub fn record_tools(&mut self, issue: &Issue, tool_path: &[String]) {
        if tool_path.is_empty() {
            return;
        }
        let usage = ToolUsage {
            issue_number: issue.number,
            issue_title: issue.title.clone(),
            tool_path: tool_path.to_vec(),
            timestamp: Utc::now(),
        };
        match self
            .tool_usages
            .iter_mut()
            .find(|existing| existing.issue_number == issue.number)
        {
            Some(existing) => *existing = usage,
            None => self.tool_usages.push(usage),
        }
        self.notify(HistoryChange::ToolUsages(self.tool_usages.len()));
    }

    pub fn tool_usages(&self) -> &[ToolUsage] {
        &self.tool_usages
    }

    pub fn clear_responses(&mut self) {
        self.responses.clear();
        self.notify(HistoryChange::Responses(0));
    }

    pub fn clear_tool_usages(&mut self) {
        self.tool_usages.clear();
        self.notify(HistoryChange::ToolUsages(0));
    }

    fn notify(&self, change: HistoryChange) {
        if let Some(listener) = &self.listener {
            listener(change);
        }
    }
}
