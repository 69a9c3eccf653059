use thiserror::Error;

#[derive(Debug, Error)]
pub enum QualityError {
    #[error(transparent)]
    Templating(#[from] rat_templating::TemplatingError),
    #[error(transparent)]
    Engine(#[from] rat_engine::EngineError),
    #[error(transparent)]
    Arrow(#[from] datafusion::arrow::error::ArrowError),
    #[error(transparent)]
    Store(#[from] rat_store::StoreError),
}
