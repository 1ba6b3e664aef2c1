//! Remote mutation/read collaborator interface.

use thiserror::Error;

use crate::record::ResourceRecord;

/// Remote errors.
///
/// `NotFound` is a distinct, checkable signal. Destruction checks treat it
/// as the success path; everything else there means absence could not be
/// confirmed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Transient remote error: {0}")]
    Transient(String),

    #[error("Unexpected remote error: {0}")]
    Unexpected(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// Handle to the remote system.
///
/// Implementations resolve retry/backoff internally: every call returns a
/// definitive outcome, so a `Transient` error surfacing here is terminal
/// for the caller. Handles are passed explicitly into every resolver and
/// verifier call; there is no ambient client state.
#[allow(async_fn_in_trait)]
pub trait RemoteBackend: Send + Sync {
    /// Configuration payload accepted by `apply`. Opaque to the core; it
    /// arrives already resolved by the configuration layer.
    type Config: Send + Sync;

    /// Apply a desired configuration, returning the identifier of the
    /// resource it converged on.
    async fn apply(&self, config: &Self::Config) -> Result<String>;

    /// Describe a resource by identifier.
    async fn read(&self, id: &str) -> Result<ResourceRecord>;
}
