use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid Nessie branch name: {0:?}")]
    InvalidBranchName(String),

    #[error("Nessie request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Nessie returned {status}: {body}")]
    Api { status: u16, body: String },
}

impl CatalogError {
    /// Transient errors are 5xx responses and connection-level failures —
    /// the same distinction the runner's retry wrapper makes. 4xx errors
    /// indicate a bad request and are never retried.
    pub fn is_transient(&self) -> bool {
        match self {
            CatalogError::Api { status, .. } => *status >= 500,
            CatalogError::Request(e) => e.is_connect() || e.is_timeout(),
            CatalogError::InvalidBranchName(_) => false,
        }
    }
}
