//! Capability traits the engine talks to: the contact directory and the
//! credential store holding its API key.

use crate::contacts::{Contact, ContactDraft, ContactId, ValidationError};

/// Result type for capability operations.
pub type CapResult<T> = Result<T, CapError>;

#[derive(Debug, thiserror::Error)]
pub enum CapError {
    #[error("network error: {0}")]
    Network(String),

    #[error("timeout")]
    Timeout,

    #[error("contact not found: {0}")]
    NotFound(ContactId),

    #[error("directory rejected {operation} with HTTP {status}")]
    Rejected { operation: &'static str, status: u16 },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Contact directory
// ---------------------------------------------------------------------------

/// Remote list of contacts supporting create/read/update/delete.
///
/// `create` and `update` validate the draft before any request is made.
#[async_trait::async_trait]
pub trait DirectoryService: Send + Sync {
    async fn list(&self) -> CapResult<Vec<Contact>>;

    async fn get(&self, id: &ContactId) -> CapResult<Contact>;

    async fn create(&self, draft: &ContactDraft) -> CapResult<()>;

    async fn update(&self, id: &ContactId, draft: &ContactDraft) -> CapResult<()>;

    async fn delete(&self, id: &ContactId) -> CapResult<()>;
}

// ---------------------------------------------------------------------------
// Credential store
// ---------------------------------------------------------------------------

pub trait CredentialStore: Send + Sync {
    /// The stored token, if one was ever saved.
    fn get(&self) -> CapResult<Option<String>>;

    /// Save `token` (trimmed). Blank tokens are rejected.
    fn set(&self, token: &str) -> CapResult<()>;
}

/// Trim a token for storage, rejecting blank input.
pub fn sanitize_token(token: &str) -> CapResult<String> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyApiKey.into());
    }
    Ok(trimmed.to_string())
}
