use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepoIndexResponse {
    pub status: String,
    pub message: String,
    pub total_chunks: u64,
    pub repo_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserRepo {
    pub id: i64,
    pub repo_name: String,
    pub repo_url: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeleteRepoResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Speaker of a stored message. The backend calls the assistant `ai`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    #[serde(rename = "ai")]
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoredMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Result of persisting one chat turn. The save endpoint answers 200 even
/// when the insert failed, with `{"status": "error", "detail": ...}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Rejected(String),
}

#[derive(Debug, Deserialize)]
pub(crate) struct SaveResponse {
    pub status: String,
    #[serde(default)]
    pub detail: Option<String>,
}

impl From<SaveResponse> for SaveOutcome {
    fn from(resp: SaveResponse) -> Self {
        if resp.status == "saved" {
            SaveOutcome::Saved
        } else {
            SaveOutcome::Rejected(resp.detail.unwrap_or(resp.status))
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct IndexRepoBody<'a> {
    pub repo_url: &'a str,
    pub user_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RepoRefBody<'a> {
    pub user_id: &'a str,
    pub repo_name: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct SaveMessageBody<'a> {
    pub user_id: &'a str,
    pub repo_name: &'a str,
    pub role: MessageRole,
    pub content: &'a str,
}
