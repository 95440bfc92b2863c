//! Known wire shapes of the agent backend.
//!
//! The backend changed its JSON contract several times; every version it has
//! shipped is one variant here, decoded by its own typed struct. Anything
//! else is [`AgentShape::Unrecognized`].

use serde::Deserialize;
use serde_json::Value;

use super::types::{ResponseStatus, StepUpdate};

#[derive(Debug, Clone)]
pub enum AgentShape {
    /// `{status, data: {messages, summary, tool_path}}`
    Wrapped(WrappedOutput),
    /// `{messages, summary, tool_path}` without the status envelope
    FinalOutput(FinalOutput),
    /// `{summary, status, solution?, files_modified?, ...}`
    Structured(StructuredOutput),
    /// LangGraph state dump: `{agent: {messages: [{content}]}, tools: {...}}`
    LegacyNested(NestedOutput),
    /// `{result, details, error?}`
    LegacyFlat(FlatOutput),
    /// `{step, status, details?}` sent outside of an SSE envelope
    Step(StepUpdate),
    Unrecognized(Value),
}

#[derive(Debug, Clone, Deserialize)]
pub struct WrappedOutput {
    #[serde(default)]
    pub status: Option<String>,
    pub data: FinalOutput,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FinalOutput {
    #[serde(default)]
    pub messages: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tool_path: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StructuredOutput {
    pub summary: String,
    pub status: ResponseStatus,
    #[serde(default)]
    pub solution: Option<String>,
    #[serde(default, alias = "filesModified")]
    pub files_modified: Vec<String>,
    #[serde(default, alias = "pullRequestUrl")]
    pub pull_request_url: Option<String>,
    #[serde(default, alias = "branchName")]
    pub branch_name: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default, alias = "nextSteps")]
    pub next_steps: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NestedOutput {
    pub agent: MessageList,
    #[serde(default)]
    pub tools: Option<MessageList>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub solution: Option<String>,
    #[serde(default, alias = "filesModified")]
    pub files_modified: Option<Vec<String>>,
    #[serde(default, alias = "pullRequestUrl")]
    pub pull_request_url: Option<String>,
    #[serde(default, alias = "branchName")]
    pub branch_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageList {
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub content: Value,
}

impl Message {
    /// Text content; structured content is rendered back to JSON.
    pub fn text(&self) -> Option<String> {
        match &self.content {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlatOutput {
    pub result: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub error: Option<String>,
}

fn is_object_with(value: &Value, key: &str, check: fn(&Value) -> bool) -> bool {
    value.get(key).is_some_and(check)
}

impl AgentShape {
    /// Classify a decoded JSON value. Checks run from the most specific shape
    /// to the loosest; a value that matches a shape's keys but fails its typed
    /// decode falls through to the next candidate.
    pub fn classify(value: Value) -> AgentShape {
        if is_object_with(&value, "data", |d| {
            d.get("summary").is_some() || d.get("messages").is_some()
        }) {
            if let Ok(wrapped) = WrappedOutput::deserialize(&value) {
                return AgentShape::Wrapped(wrapped);
            }
        }

        if is_object_with(&value, "summary", Value::is_string)
            && is_object_with(&value, "status", Value::is_string)
        {
            if let Ok(structured) = StructuredOutput::deserialize(&value) {
                return AgentShape::Structured(structured);
            }
        }

        if is_object_with(&value, "summary", Value::is_string)
            && is_object_with(&value, "messages", Value::is_array)
        {
            if let Ok(output) = FinalOutput::deserialize(&value) {
                return AgentShape::FinalOutput(output);
            }
        }

        if value
            .get("agent")
            .is_some_and(|agent| agent.get("messages").is_some_and(Value::is_array))
        {
            if let Ok(nested) = NestedOutput::deserialize(&value) {
                return AgentShape::LegacyNested(nested);
            }
        }

        if is_object_with(&value, "result", Value::is_string) {
            if let Ok(flat) = FlatOutput::deserialize(&value) {
                return AgentShape::LegacyFlat(flat);
            }
        }

        if is_object_with(&value, "step", Value::is_string) {
            if let Ok(step) = StepUpdate::deserialize(&value) {
                return AgentShape::Step(step);
            }
        }

        AgentShape::Unrecognized(value)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AgentShape::Wrapped(_) => "wrapped",
            AgentShape::FinalOutput(_) => "final_output",
            AgentShape::Structured(_) => "structured",
            AgentShape::LegacyNested(_) => "legacy_nested",
            AgentShape::LegacyFlat(_) => "legacy_flat",
            AgentShape::Step(_) => "step",
            AgentShape::Unrecognized(_) => "unrecognized",
        }
    }
}
