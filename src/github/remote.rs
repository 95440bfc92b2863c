use regex::Regex;
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::debug;

use super::types::RepoSlug;
use super::GithubError;

static GITHUB_REMOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"github\.com[:/]([^/\s]+)/([^/\s]+?)(?:\.git)?/?$").expect("remote pattern is valid")
});

/// Extract `owner/repo` from a git remote URL.
///
/// Accepts both `https://github.com/owner/repo(.git)` and
/// `git@github.com:owner/repo(.git)`.
pub fn parse_remote_url(url: &str) -> Result<RepoSlug, GithubError> {
    let caps = GITHUB_REMOTE
        .captures(url.trim())
        .ok_or_else(|| GithubError::NotGithubRemote(url.trim().to_string()))?;
    Ok(RepoSlug {
        owner: caps[1].to_string(),
        repo: caps[2].to_string(),
    })
}

/// Parse an explicit `owner/repo` string.
pub fn parse_slug(slug: &str) -> Result<RepoSlug, GithubError> {
    match slug.trim().split_once('/') {
        Some((owner, repo))
            if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') =>
        {
            Ok(RepoSlug {
                owner: owner.to_string(),
                repo: repo.to_string(),
            })
        }
        _ => Err(GithubError::InvalidRepository(slug.to_string())),
    }
}

/// Ask git for the origin remote of the current directory.
pub async fn detect_origin() -> Result<RepoSlug, GithubError> {
    let output = Command::new("git")
        .args(["remote", "get-url", "origin"])
        .output()
        .await
        .map_err(GithubError::Git)?;

    if !output.status.success() {
        return Err(GithubError::NoOrigin);
    }

    let url = String::from_utf8_lossy(&output.stdout);
    debug!(url = %url.trim(), "found origin remote");
    parse_remote_url(&url)
}
