use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("pipeline script syntax error: {0}")]
    Syntax(String),

    #[error("script references blocked name '{name}' at line {line}")]
    BlockedIdentifier { name: String, line: usize },

    #[error("sql command not allowed in pipeline scripts: {0}")]
    BlockedSql(String),

    #[error("script must assign `result` to a query result; got nothing")]
    MissingResult,

    #[error("script must assign `result` to a query result; got a {0} value instead")]
    WrongResultType(String),

    #[error(transparent)]
    Lua(#[from] mlua::Error),

    #[error(transparent)]
    Engine(#[from] rat_engine::EngineError),

    #[error(transparent)]
    Templating(#[from] rat_templating::TemplatingError),
}
