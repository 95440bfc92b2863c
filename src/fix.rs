use tracing::{info, instrument, warn};

use crate::agent::{AgentClient, AgentError, Credentials, FixRequest, Progress};
use crate::github::Issue;
use crate::history::History;
use crate::response::{ParsedResponse, ResponseStatus};

/// What one fix attempt produced, after every error has been turned into
/// something displayable.
#[derive(Debug, Clone)]
pub enum FixOutcome {
    Completed(ParsedResponse),
    Failed(ParsedResponse),
    /// The agent server could not be reached; nothing was recorded.
    Unreachable(String),
}

/// Send one issue to the agent and record the result.
#[instrument(skip_all, fields(issue = issue.number))]
pub async fn fix_issue(
    agent: &AgentClient,
    credentials: Credentials,
    issue: &Issue,
    history: &mut History,
    progress: Progress<'_>,
) -> FixOutcome {
    info!(title = %issue.title, "requesting fix");
    progress(&format!("Sending issue #{} to the agent...", issue.number));
    let request = FixRequest::new(credentials, issue);
    let result = agent.fix_issue(&request, progress).await;
    record_outcome(history, issue, result)
}

/// Fold an agent result into the history.
///
/// Server errors are recorded as error responses. Transport errors are
/// reported but leave the history untouched.
pub fn record_outcome(
    history: &mut History,
    issue: &Issue,
    result: Result<ParsedResponse, AgentError>,
) -> FixOutcome {
    match result {
        Ok(response) => {
            history.record_tools(issue, &response.tool_path);
            history.add_response(issue, response.clone());
            if response.is_error() {
                FixOutcome::Failed(response)
            } else {
                FixOutcome::Completed(response)
            }
        }
        Err(AgentError::Server { message, body, .. }) => {
            let response = ParsedResponse::server_failure(&message, body);
            history.add_response(issue, response.clone());
            FixOutcome::Failed(response)
        }
        Err(err @ AgentError::Client(_)) => {
            let mut response = ParsedResponse::new("");
            response.status = ResponseStatus::Error;
            response.summary = format!("Error: {err}");
            response.errors.push(err.to_string());
            let response = response.finalize();
            history.add_response(issue, response.clone());
            FixOutcome::Failed(response)
        }
        Err(err @ AgentError::Transport(_)) => {
            warn!(error = %err, "agent server unreachable");
            FixOutcome::Unreachable(err.to_string())
        }
    }
}
