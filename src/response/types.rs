use serde::{Deserialize, Serialize};

pub const FALLBACK_SUMMARY: &str = "Agent response processed";
pub const PARSE_ERROR_SUMMARY: &str = "Error parsing response";
pub const INVALID_FORMAT: &str = "Invalid response format";

/// Outcome of one fix request as far as the agent reported it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
    Partial,
    #[default]
    Processing,
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseStatus::Success => write!(f, "SUCCESS"),
            ResponseStatus::Error => write!(f, "ERROR"),
            ResponseStatus::Partial => write!(f, "PARTIAL"),
            ResponseStatus::Processing => write!(f, "PROCESSING"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    InProgress,
    Completed,
    Failed,
}

/// One progress report from a streaming agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepUpdate {
    pub step: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// A single `data:` payload of the SSE transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    Status(StepUpdate),
    FinalResponse(serde_json::Value),
}

/// What a response source read off the wire: one complete body, or the
/// decoded `data:` payloads of an event stream in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    Buffer(String),
    Events(Vec<serde_json::Value>),
}

/// Normalized agent result, independent of the backend wire shape.
///
/// Built through [`ParsedResponse::finalize`], which enforces that the
/// summary is never empty, that `files_modified` and `errors` hold distinct
/// entries, and that any error forces `status == Error`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ParsedResponse {
    pub status: ResponseStatus,
    pub summary: String,
    pub solution: Option<String>,
    pub files_modified: Vec<String>,
    pub pull_request_url: Option<String>,
    pub branch_name: Option<String>,
    pub errors: Vec<String>,
    pub next_steps: Vec<String>,
    pub tool_path: Vec<String>,
    /// Agent messages of the final-output shapes, as sent
    pub agent_messages: Vec<String>,
    pub steps: Vec<StepUpdate>,
    /// Longest embedded agent message found in the raw text
    pub agent_output: Option<String>,
    pub raw_content: String,
}

impl ParsedResponse {
    pub fn new(raw_content: impl Into<String>) -> Self {
        Self {
            raw_content: raw_content.into(),
            ..Self::default()
        }
    }

    /// The response recorded when the payload could not be parsed at all.
    pub fn parse_failure(raw_content: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            status: ResponseStatus::Error,
            summary: PARSE_ERROR_SUMMARY.to_string(),
            errors: vec![error.to_string()],
            raw_content: raw_content.into(),
            ..Self::default()
        }
    }

    /// The response recorded for an HTTP error status from the agent server.
    pub fn server_failure(message: &str, body: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            summary: format!("Server error: {message}"),
            errors: vec![message.to_string()],
            raw_content: body.into(),
            ..Self::default()
        }
        .finalize()
    }

    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }

    pub(crate) fn finalize(mut self) -> Self {
        self.files_modified = dedup_preserving_order(std::mem::take(&mut self.files_modified));
        self.errors = dedup_preserving_order(std::mem::take(&mut self.errors));
        if !self.errors.is_empty() {
            self.status = ResponseStatus::Error;
        }
        if self.summary.trim().is_empty() {
            self.summary = FALLBACK_SUMMARY.to_string();
        }
        self.solution = self.solution.filter(|s| !s.trim().is_empty());
        self.branch_name = self.branch_name.filter(|s| !s.trim().is_empty());
        self.pull_request_url = self.pull_request_url.filter(|s| !s.trim().is_empty());
        self
    }
}

/// Remove duplicates, keeping the first occurrence of each entry.
pub fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(ResponseStatus::Success.to_string(), "SUCCESS");
        assert_eq!(ResponseStatus::Partial.to_string(), "PARTIAL");
        assert_eq!(ResponseStatus::default(), ResponseStatus::Processing);
    }

    #[test]
    fn test_finalize_enforces_error_status() {
        let mut response = ParsedResponse::new("raw");
        response.status = ResponseStatus::Success;
        response.errors = vec!["boom".to_string()];
        let response = response.finalize();
        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(response.summary, FALLBACK_SUMMARY);
    }

    #[test]
    fn test_finalize_dedups_but_keeps_distinct_errors() {
        let mut response = ParsedResponse::new("raw");
        response.files_modified = vec!["a.py".into(), "b.py".into(), "a.py".into()];
        response.errors = vec![
            "TypeError: x is undefined".into(),
            "x is undefined".into(),
            "TypeError: x is undefined".into(),
        ];
        let response = response.finalize();
        assert_eq!(response.files_modified, vec!["a.py", "b.py"]);
        assert_eq!(response.errors, vec!["TypeError: x is undefined", "x is undefined"]);
    }

    #[test]
    fn test_stream_event_decoding() {
        let status: StreamEvent = serde_json::from_str(
            r#"{"type":"status","data":{"step":"Cloning repository","status":"in_progress"}}"#,
        )
        .unwrap();
        match status {
            StreamEvent::Status(step) => {
                assert_eq!(step.step, "Cloning repository");
                assert_eq!(step.status, StepStatus::InProgress);
                assert!(step.details.is_none());
            }
            other => panic!("unexpected event {other:?}"),
        }

        let final_event: StreamEvent =
            serde_json::from_str(r#"{"type":"final_response","data":{"summary":"done"}}"#).unwrap();
        assert!(matches!(final_event, StreamEvent::FinalResponse(_)));

        assert!(serde_json::from_str::<StreamEvent>(r#"{"type":"heartbeat","data":{}}"#).is_err());
    }

    #[test]
    fn test_server_failure() {
        let response = ParsedResponse::server_failure("Internal Server Error", "oops");
        assert!(response.is_error());
        assert_eq!(response.summary, "Server error: Internal Server Error");
        assert_eq!(response.raw_content, "oops");
    }
}
