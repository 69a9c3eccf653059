use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to build object store client: {0}")]
    ClientBuild(String),

    #[error("object store operation failed: {0}")]
    Backend(#[from] object_store::Error),

    #[error("object at {0:?} is not valid utf-8")]
    NotUtf8(String),
}
