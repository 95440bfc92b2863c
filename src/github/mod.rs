pub mod remote;
pub mod types;

pub use types::{Issue, RepoSlug};

use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::Config;

const PER_PAGE: usize = 100;

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("GitHub API request failed: {0}")]
    ApiRequest(#[from] reqwest::Error),

    #[error("Invalid repository '{0}', expected owner/repo")]
    InvalidRepository(String),

    #[error("Remote repository is not hosted on GitHub: {0}")]
    NotGithubRemote(String),

    #[error("No origin remote found. A GitHub remote repository is required")]
    NoOrigin,

    #[error("Failed to run git: {0}")]
    Git(std::io::Error),

    #[error("GitHub token not found in config or environment")]
    MissingToken,
}

/// Resolve the target repository: explicit override, then config, then the
/// origin remote of the working directory.
pub async fn resolve_repository(
    explicit: Option<&str>,
    config: &Config,
) -> Result<RepoSlug, GithubError> {
    if let Some(slug) = explicit.or(config.github.repository.as_deref()) {
        return remote::parse_slug(slug);
    }
    remote::detect_origin().await
}

/// Thin client over the GitHub issues REST endpoints.
pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl GithubClient {
    pub fn from_config(config: &Config) -> Result<Self, GithubError> {
        let token = config.github_token().ok_or(GithubError::MissingToken)?;
        Ok(Self {
            http: reqwest::Client::new(),
            api_url: config.api_url().to_string(),
            token,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// List open issues, following pagination. Pull requests are dropped.
    #[instrument(skip(self), fields(repo = %slug))]
    pub async fn list_open_issues(&self, slug: &RepoSlug) -> Result<Vec<Issue>, GithubError> {
        let url = format!("{}/repos/{}/{}/issues", self.api_url, slug.owner, slug.repo);
        let mut issues = Vec::new();
        let mut page = 1usize;

        loop {
            debug!(page, "fetching issues page");
            let batch = self
                .http
                .get(&url)
                .query(&[
                    ("state", "open".to_string()),
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ])
                .header("User-Agent", "issue-medic")
                .header("Accept", "application/vnd.github+json")
                .bearer_auth(&self.token)
                .send()
                .await?
                .error_for_status()?
                .json::<Vec<Issue>>()
                .await?;

            let fetched = batch.len();
            issues.extend(batch.into_iter().filter(|issue| !issue.is_pull_request()));
            if fetched < PER_PAGE {
                break;
            }
            page += 1;
        }

        debug!(count = issues.len(), "received issues");
        Ok(issues)
    }

    #[instrument(skip(self), fields(repo = %slug))]
    pub async fn get_issue(&self, slug: &RepoSlug, number: u64) -> Result<Issue, GithubError> {
        let url = format!(
            "{}/repos/{}/{}/issues/{}",
            self.api_url, slug.owner, slug.repo, number
        );
        let issue = self
            .http
            .get(&url)
            .header("User-Agent", "issue-medic")
            .header("Accept", "application/vnd.github+json")
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json::<Issue>()
            .await?;
        debug!(title = %issue.title, "received issue");
        Ok(issue)
    }
}
