use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::github::types::{Issue, Label, RepoSlug, User};

/// Body of `POST <agent endpoint>`. Built once per fix action and sent as-is.
#[derive(Debug, Clone, Serialize)]
pub struct FixRequest {
    pub github_credentials: Credentials,
    pub issue_data: IssueData,
}

#[derive(Clone, Serialize)]
pub struct Credentials {
    pub token: String,
    /// `owner/repo`
    pub repository_name: String,
}

impl Credentials {
    pub fn for_repo(token: &str, slug: &RepoSlug) -> Self {
        Self {
            token: token.to_string(),
            repository_name: slug.to_string(),
        }
    }
}

// Keep the token out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("repository_name", &self.repository_name)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueData {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user: User,
    pub labels: Vec<Label>,
}

impl FixRequest {
    pub fn new(credentials: Credentials, issue: &Issue) -> Self {
        Self {
            github_credentials: credentials,
            issue_data: IssueData {
                number: issue.number,
                title: issue.title.clone(),
                body: issue.body.clone().unwrap_or_default(),
                state: issue.state.clone(),
                created_at: issue.created_at,
                updated_at: issue.updated_at,
                user: issue.user.clone().unwrap_or_default(),
                labels: issue.labels.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_issue() -> Issue {
        serde_json::from_value(json!({
            "number": 3,
            "title": "Calculator crashes",
            "body": null,
            "state": "open",
            "created_at": "2025-05-01T10:00:00Z",
            "updated_at": "2025-05-01T12:00:00Z",
            "user": null,
            "labels": [{"name": "bug"}]
        }))
        .unwrap()
    }

    #[test]
    fn test_fix_request_wire_format() {
        let slug = RepoSlug {
            owner: "octo".to_string(),
            repo: "calculator".to_string(),
        };
        let credentials = Credentials::for_repo("ghp_secret", &slug);
        let request = FixRequest::new(credentials, &sample_issue());
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            json!({
                "github_credentials": {"token": "ghp_secret", "repository_name": "octo/calculator"},
                "issue_data": {
                    "number": 3,
                    "title": "Calculator crashes",
                    "body": "",
                    "state": "open",
                    "created_at": "2025-05-01T10:00:00Z",
                    "updated_at": "2025-05-01T12:00:00Z",
                    "user": {"login": ""},
                    "labels": [{"name": "bug"}]
                }
            })
        );
    }

    #[test]
    fn test_credentials_debug_redacts_token() {
        let credentials = Credentials {
            token: "ghp_secret".to_string(),
            repository_name: "octo/calculator".to_string(),
        };
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("ghp_secret"));
        assert!(debug.contains("octo/calculator"));
    }
}
