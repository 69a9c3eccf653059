use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplatingError {
    #[error("invalid ref {0:?}: expected 'layer.name' or 'ns.layer.name'")]
    InvalidRef(String),

    #[error("unclosed {{% if %}} block in template")]
    UnclosedIfBlock,

    #[error("unknown condition or expression {0:?}")]
    UnknownCondition(String),

    #[error("unterminated {0} tag in template")]
    UnterminatedTag(String),

    #[error(transparent)]
    Store(#[from] rat_store::StoreError),
}
