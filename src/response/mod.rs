pub mod log;
pub mod rules;
pub mod shape;
pub mod types;

pub use types::{ParsedResponse, RawPayload, ResponseStatus, StepStatus, StepUpdate, StreamEvent};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use rules::{first_match, SOLUTION_RULES, SUMMARY_RULES};
use shape::{AgentShape, FinalOutput, FlatOutput, NestedOutput, StructuredOutput, WrappedOutput};
use types::INVALID_FORMAT;

const AGENT_DONE_SUMMARY: &str = "Agent completed task successfully";
const NO_FINAL_SUMMARY: &str = "Agent did not send a final response";
const EMPTY_RESPONSE: &str = "Empty response from agent";

/// Normalize a raw agent payload of any known shape.
///
/// Never fails: payloads that cannot be decoded at all come back as an
/// error response carrying the original text in `raw_content`.
pub fn parse(raw: &str) -> ParsedResponse {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return invalid(raw, EMPTY_RESPONSE).finalize();
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => return parse_value(value, raw),
        Err(strict) => {
            if let Some(value) = embedded_object(trimmed) {
                debug!("recovered JSON object from surrounding text");
                return parse_value(value, raw);
            }
            if trimmed.starts_with(['{', '[']) {
                warn!(error = %strict, "agent response is malformed JSON");
                return ParsedResponse::parse_failure(raw, strict);
            }
        }
    }

    finish(parse_text(&unescape(trimmed), raw))
}

/// Normalize an already-decoded JSON value. `raw` is kept as `raw_content`.
pub fn parse_value(value: Value, raw: &str) -> ParsedResponse {
    finish(decode(value, raw))
}

/// Normalize whatever a [`ResponseSource`](crate::agent::ResponseSource) read.
pub fn parse_payload(payload: &RawPayload) -> ParsedResponse {
    match payload {
        RawPayload::Buffer(text) => parse(text),
        RawPayload::Events(events) => parse_events(events),
    }
}

/// Fold an SSE event sequence into one response. The last `final_response`
/// wins; without one the result is `Partial`.
pub fn parse_events(events: &[Value]) -> ParsedResponse {
    let raw = events
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join("\n");

    let mut steps = Vec::new();
    let mut final_data = None;
    for event in events {
        match StreamEvent::deserialize(event) {
            Ok(StreamEvent::Status(step)) => steps.push(step),
            Ok(StreamEvent::FinalResponse(data)) => final_data = Some(data),
            Err(err) => warn!(error = %err, "skipping unrecognized stream event"),
        }
    }

    let mut response = match final_data {
        Some(data) => decode(data, &raw),
        None => {
            debug!(steps = steps.len(), "stream ended without a final response");
            let mut partial = ParsedResponse::new(raw.as_str());
            partial.status = ResponseStatus::Partial;
            partial.summary = steps
                .last()
                .map(|step| step.step.clone())
                .unwrap_or_else(|| NO_FINAL_SUMMARY.to_string());
            partial
        }
    };
    response.steps = steps;
    finish(response)
}

/// Render agent messages as `**Step N:**` entries, dropping any message that
/// merely repeats the summary.
pub fn render_steps(messages: &[String], summary: &str) -> Option<String> {
    let entries: Vec<String> = messages
        .iter()
        .enumerate()
        .filter(|(_, message)| message.as_str() != summary)
        .map(|(i, message)| format!("**Step {}:**\n{}", i + 1, message.trim()))
        .collect();
    (!entries.is_empty()).then(|| entries.join("\n\n"))
}

fn finish(mut response: ParsedResponse) -> ParsedResponse {
    let output = log::largest_message_content(&response.raw_content);
    if !output.is_empty() {
        response.agent_output = Some(output);
    }
    response.finalize()
}

fn decode(value: Value, raw: &str) -> ParsedResponse {
    if let Value::String(text) = &value {
        return parse_text(&unescape(text), raw);
    }

    let shape = AgentShape::classify(value);
    debug!(shape = shape.name(), "classified agent response");
    match shape {
        AgentShape::Wrapped(wrapped) => decode_wrapped(wrapped, raw),
        AgentShape::FinalOutput(output) => decode_final(output, None, raw),
        AgentShape::Structured(structured) => decode_structured(structured, raw),
        AgentShape::LegacyNested(nested) => decode_nested(nested, raw),
        AgentShape::LegacyFlat(flat) => decode_flat(flat, raw),
        AgentShape::Step(step) => decode_step(step, raw),
        AgentShape::Unrecognized(value) => {
            let keys: Vec<&str> = value
                .as_object()
                .map(|object| object.keys().map(String::as_str).collect())
                .unwrap_or_default();
            warn!(?keys, "agent response matches no known shape");
            invalid(raw, INVALID_FORMAT)
        }
    }
}

fn invalid(raw: &str, reason: &str) -> ParsedResponse {
    let mut response = ParsedResponse::new(raw);
    response.status = ResponseStatus::Error;
    response.summary = reason.to_string();
    response.errors = vec![reason.to_string()];
    response
}

fn decode_wrapped(wrapped: WrappedOutput, raw: &str) -> ParsedResponse {
    let failed = wrapped.status.as_deref() == Some("error");
    let mut response = decode_final(wrapped.data, wrapped.status.as_deref(), raw);
    if failed {
        response.errors.extend(wrapped.error);
        response.errors.extend(wrapped.message);
    }
    response
}

fn decode_final(output: FinalOutput, envelope_status: Option<&str>, raw: &str) -> ParsedResponse {
    let failed = envelope_status == Some("error") || output.status.as_deref() == Some("error");

    let mut response = ParsedResponse::new(raw);
    response.solution = render_steps(&output.messages, &output.summary);
    response.pull_request_url = output
        .messages
        .iter()
        .find_map(|message| rules::pull_request_url(message));
    response.summary = output.summary;
    response.agent_messages = output.messages;
    response.tool_path = output.tool_path;
    if failed {
        response.status = ResponseStatus::Error;
        response.errors.extend(output.error);
    } else {
        response.status = ResponseStatus::Success;
    }
    response
}

fn decode_structured(structured: StructuredOutput, raw: &str) -> ParsedResponse {
    let mut response = ParsedResponse::new(raw);
    response.status = structured.status;
    response.summary = structured.summary;
    response.solution = structured.solution;
    response.files_modified = structured.files_modified;
    response.pull_request_url = structured.pull_request_url;
    response.branch_name = structured.branch_name;
    response.errors = structured.errors;
    response.next_steps = structured.next_steps;
    response
}

fn decode_nested(nested: NestedOutput, raw: &str) -> ParsedResponse {
    let mut response = ParsedResponse::new(raw);
    let contents: Vec<String> = nested.agent.messages.iter().filter_map(|m| m.text()).collect();

    let mut summary = None;
    for content in &contents {
        if summary.is_none() {
            summary = first_match(SUMMARY_RULES, content);
        }
        if response.solution.is_none() {
            response.solution = first_match(SOLUTION_RULES, content);
        }
        if response.branch_name.is_none() {
            response.branch_name = rules::quoted_branch(content);
        }
        response.files_modified.extend(rules::file_paths(content));
        response.errors.extend(rules::message_errors(content));
    }

    let tool_contents: Vec<String> = nested
        .tools
        .iter()
        .flat_map(|tools| tools.messages.iter())
        .filter_map(|m| m.text())
        .collect();
    response.pull_request_url = tool_contents
        .iter()
        .chain(contents.iter())
        .find_map(|content| rules::pull_request_url(content));

    response.summary = summary
        .or(nested.summary)
        .unwrap_or_else(|| AGENT_DONE_SUMMARY.to_string());

    // Explicit fields from the backend beat anything guessed from prose.
    if nested.solution.is_some() {
        response.solution = nested.solution;
    }
    if let Some(files) = nested.files_modified {
        response.files_modified = files;
    }
    if nested.pull_request_url.is_some() {
        response.pull_request_url = nested.pull_request_url;
    }
    if nested.branch_name.is_some() {
        response.branch_name = nested.branch_name;
    }

    response.status = ResponseStatus::Success;
    response
}

fn decode_flat(flat: FlatOutput, raw: &str) -> ParsedResponse {
    let mut response = parse_text(&unescape(&flat.details), raw);
    match flat.result.as_str() {
        "error" => {
            response.status = ResponseStatus::Error;
            let reason = flat
                .error
                .filter(|e| !e.trim().is_empty())
                .or_else(|| Some(flat.details.trim().to_string()).filter(|d| !d.is_empty()))
                .unwrap_or_else(|| "Agent reported an error".to_string());
            response.errors.push(reason);
        }
        "processing" => response.status = ResponseStatus::Processing,
        _ => {}
    }
    response
}

fn decode_step(step: StepUpdate, raw: &str) -> ParsedResponse {
    let mut response = ParsedResponse::new(raw);
    response.summary = step.step.clone();
    response.status = match step.status {
        StepStatus::InProgress => ResponseStatus::Processing,
        StepStatus::Completed => ResponseStatus::Partial,
        StepStatus::Failed => ResponseStatus::Error,
    };
    if step.status == StepStatus::Failed {
        response
            .errors
            .push(step.details.clone().unwrap_or_else(|| step.step.clone()));
    }
    response.steps.push(step);
    response
}

fn parse_text(text: &str, raw: &str) -> ParsedResponse {
    let mut response = ParsedResponse::new(raw);
    response.status = ResponseStatus::Success;
    response.summary = rules::first_line(text).unwrap_or_default();
    response.solution = rules::labeled_section(text);
    response.files_modified = rules::listed_files(text);
    response.pull_request_url = rules::pull_request_url(text);
    response.branch_name = rules::labeled_branch(text);
    response.errors = rules::labeled_errors(text);
    response
}

fn unescape(text: &str) -> String {
    text.replace("\\n", "\n")
        .replace("\\\"", "\"")
        .replace("\\'", "'")
}

/// First balanced `{...}` in `text` that decodes as JSON of a known shape.
/// Braces inside string literals are ignored.
fn embedded_object(text: &str) -> Option<Value> {
    text.match_indices('{').find_map(|(start, _)| {
        let end = balanced_end(&text[start..])?;
        let value: Value = serde_json::from_str(&text[start..start + end]).ok()?;
        let known = !matches!(AgentShape::classify(value.clone()), AgentShape::Unrecognized(_));
        known.then_some(value)
    })
}

fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
