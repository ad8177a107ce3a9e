use repochat_api::UserRepo;
use thiserror::Error;
use url::Url;

/// Repositories a user may keep indexed at once.
pub const MAX_REPOS: usize = 3;

const ALLOWED_HOSTS: &[&str] = &[
    "github.com",
    "www.github.com",
    "gitlab.com",
    "www.gitlab.com",
    "bitbucket.org",
    "www.bitbucket.org",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepoError {
    #[error("Only https links to GitHub, GitLab or Bitbucket repositories are supported.")]
    UnsupportedUrl,
    #[error(
        "You have reached the limit of {MAX_REPOS} repositories. Delete one before adding another."
    )]
    QuotaReached,
}

/// Name the backend will file `repo_url` under: the last path segment
/// without a `.git` suffix.
pub fn repo_name_from_url(repo_url: &str) -> Result<String, RepoError> {
    let url = Url::parse(repo_url.trim()).map_err(|_| RepoError::UnsupportedUrl)?;
    if url.scheme() != "https" {
        return Err(RepoError::UnsupportedUrl);
    }
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    if !ALLOWED_HOSTS.contains(&host.as_str()) {
        return Err(RepoError::UnsupportedUrl);
    }
    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    if segments.len() < 2 {
        return Err(RepoError::UnsupportedUrl);
    }
    segments
        .last()
        .map(|name| name.trim_end_matches(".git").to_string())
        .filter(|name| !name.is_empty())
        .ok_or(RepoError::UnsupportedUrl)
}

/// Validate `repo_url` and check it fits the quota. Re-indexing a
/// repository that is already listed is always allowed.
pub fn check_index_request(existing: &[UserRepo], repo_url: &str) -> Result<String, RepoError> {
    let name = repo_name_from_url(repo_url)?;
    let reindex = existing.iter().any(|repo| repo.repo_name == name);
    if existing.len() >= MAX_REPOS && !reindex {
        return Err(RepoError::QuotaReached);
    }
    Ok(name)
}
