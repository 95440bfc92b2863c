pub mod reader;
#[cfg(test)]
pub(crate) mod test_server;
pub mod types;

pub use reader::source_for;
pub use types::{Credentials, FixRequest};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::AgentConfig;
use crate::response::{self, ParsedResponse, RawPayload};

/// Progress callback handed to response sources. Receives short
/// human-readable status lines while a response is streaming in.
pub type Progress<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// How the agent server delivers its response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// One complete JSON (or text) body
    #[default]
    Json,
    /// A chunked body that is only meaningful once complete
    Chunked,
    /// `text/event-stream` with status and final_response events
    Sse,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("No response from server. Please check if the server is running: {0}")]
    Transport(reqwest::Error),

    #[error("Server error {status}: {message}")]
    Server {
        status: u16,
        message: String,
        body: String,
    },

    #[error("Failed to set up agent request: {0}")]
    Client(reqwest::Error),
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            AgentError::Client(err)
        } else {
            AgentError::Transport(err)
        }
    }
}

/// Reads an agent response body off the wire.
///
/// Implementations differ only in how the bytes arrive; all of them feed
/// the same normalization in [`crate::response`].
#[async_trait]
pub trait ResponseSource: Send + Sync {
    fn name(&self) -> &str;

    /// `Accept` header sent with the request.
    fn accept(&self) -> &'static str {
        "application/json"
    }

    async fn read(
        &self,
        response: reqwest::Response,
        progress: Progress<'_>,
    ) -> Result<RawPayload, AgentError>;

    async fn receive(
        &self,
        response: reqwest::Response,
        progress: Progress<'_>,
    ) -> Result<ParsedResponse, AgentError> {
        let payload = self.read(response, progress).await?;
        Ok(response::parse_payload(&payload))
    }
}

/// Pull a human-readable message out of an error body, falling back to the
/// status line's reason phrase.
pub fn server_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "detail", "error"].iter().find_map(|key| {
                value
                    .get(key)
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.trim().is_empty())
                    .map(str::to_string)
            })
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        })
}

/// HTTP client for the fix agent server.
pub struct AgentClient {
    http: reqwest::Client,
    endpoint: String,
    source: Box<dyn ResponseSource>,
}

impl AgentClient {
    pub fn new(config: &AgentConfig) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(AgentError::Client)?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            source: source_for(config.transport),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one fix request and normalize whatever comes back.
    ///
    /// A non-2xx status is returned as [`AgentError::Server`] with the body
    /// attached, so callers can still record it.
    #[instrument(skip(self, request, progress), fields(issue = request.issue_data.number, transport = self.source.name()))]
    pub async fn fix_issue(
        &self,
        request: &FixRequest,
        progress: Progress<'_>,
    ) -> Result<ParsedResponse, AgentError> {
        info!(endpoint = %self.endpoint, "sending fix request");
        let response = self
            .http
            .post(&self.endpoint)
            .header("Accept", self.source.accept())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = server_message(status, &body);
            warn!(status = status.as_u16(), %message, "agent server returned an error");
            return Err(AgentError::Server {
                status: status.as_u16(),
                message,
                body,
            });
        }

        let parsed = self.source.receive(response, progress).await?;
        debug!(status = %parsed.status, errors = parsed.errors.len(), "agent response parsed");
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::types::Issue;
    use clap::ValueEnum;
    use serde_json::json;

    #[test]
    fn test_server_message_prefers_body_fields() {
        let body = r#"{"detail":"Repository not found"}"#;
        assert_eq!(server_message(StatusCode::NOT_FOUND, body), "Repository not found");

        let body = r#"{"message":"","error":"token expired"}"#;
        assert_eq!(server_message(StatusCode::UNAUTHORIZED, body), "token expired");
    }

    #[test]
    fn test_server_message_falls_back_to_reason() {
        assert_eq!(
            server_message(StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>"),
            "Internal Server Error"
        );
        assert_eq!(server_message(StatusCode::BAD_GATEWAY, ""), "Bad Gateway");
    }

    #[test]
    fn test_transport_value_enum() {
        assert_eq!(Transport::from_str("sse", true).unwrap(), Transport::Sse);
        assert_eq!(Transport::from_str("chunked", true).unwrap(), Transport::Chunked);
        assert!(Transport::from_str("websocket", true).is_err());
        assert_eq!(Transport::default(), Transport::Json);
    }

    #[test]
    fn test_server_error_display() {
        let err = AgentError::Server {
            status: 500,
            message: "Internal Server Error".to_string(),
            body: String::new(),
        };
        assert_eq!(err.to_string(), "Server error 500: Internal Server Error");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let config = AgentConfig {
            endpoint: "http://127.0.0.1:1/api/fix/issue".to_string(),
            timeout_secs: 5,
            ..AgentConfig::default()
        };
        let client = AgentClient::new(&config).unwrap();
        let issue: Issue = serde_json::from_value(json!({
            "number": 1,
            "title": "Broken",
            "state": "open",
            "created_at": "2025-05-01T10:00:00Z",
            "updated_at": "2025-05-01T10:00:00Z"
        }))
        .unwrap();
        let request = FixRequest::new(
            Credentials {
                token: "t".to_string(),
                repository_name: "octo/calculator".to_string(),
            },
            &issue,
        );

        let err = client.fix_issue(&request, &|_: &str| {}).await.unwrap_err();
        assert!(matches!(err, AgentError::Transport(_)));
        assert!(err.to_string().starts_with("No response from server"));
    }

    fn sample_request() -> FixRequest {
        let issue: Issue = serde_json::from_value(json!({
            "number": 3,
            "title": "Calculator crashes",
            "body": "Syntax error in add()",
            "state": "open",
            "created_at": "2025-05-01T10:00:00Z",
            "updated_at": "2025-05-01T10:00:00Z"
        }))
        .unwrap();
        FixRequest::new(
            Credentials {
                token: "t".to_string(),
                repository_name: "octo/calculator".to_string(),
            },
            &issue,
        )
    }

    fn client_for(base_url: &str, transport: Transport) -> AgentClient {
        let config = AgentConfig {
            endpoint: format!("{base_url}/api/fix/issue"),
            transport,
            timeout_secs: 5,
        };
        AgentClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_server_error_status_keeps_message_and_body() {
        let body = r#"{"message":"x"}"#;
        let url = test_server::serve_once(test_server::with_length(
            "500 Internal Server Error",
            "application/json",
            body,
        ))
        .await;

        let err = client_for(&url, Transport::Json)
            .fix_issue(&sample_request(), &|_: &str| {})
            .await
            .unwrap_err();
        match err {
            AgentError::Server { status, message, body: received } => {
                assert_eq!(status, 500);
                assert_eq!(message, "x");
                assert_eq!(received, body);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_json_response_is_parsed() {
        let url = test_server::serve_once(test_server::with_length(
            "200 OK",
            "application/json",
            include_str!("../../tests/fixtures/wrapped.json"),
        ))
        .await;

        let parsed = client_for(&url, Transport::Json)
            .fix_issue(&sample_request(), &|_: &str| {})
            .await
            .unwrap();
        assert_eq!(parsed.status, response::ResponseStatus::Success);
        assert_eq!(parsed.tool_path, vec!["read_file", "write_file", "create_pull_request"]);
        assert_eq!(
            parsed.pull_request_url.as_deref(),
            Some("https://github.com/octo/calculator/pull/4")
        );
    }

    #[tokio::test]
    async fn test_sse_response_streams_progress() {
        let url = test_server::serve_once(test_server::until_close(
            "text/event-stream",
            include_str!("../../tests/fixtures/stream.sse"),
        ))
        .await;

        let seen = std::sync::Mutex::new(Vec::new());
        let progress = |message: &str| seen.lock().unwrap().push(message.to_string());
        let parsed = client_for(&url, Transport::Sse)
            .fix_issue(&sample_request(), &progress)
            .await
            .unwrap();
        assert_eq!(parsed.branch_name.as_deref(), Some("fix-issue-3"));
        assert_eq!(parsed.steps.len(), 3);
        assert!(!seen.lock().unwrap().is_empty());
    }
}
