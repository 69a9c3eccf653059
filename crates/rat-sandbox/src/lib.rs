//! Restricted Lua execution environment for script pipelines.
//!
//! A script pipeline runs in a freshly built, per-execution `mlua`
//! interpreter with a narrow, audited set of globals — no filesystem, no
//! process, no module loading, no raw/metatable access. The only way a
//! script touches data is through the injected `engine.sql(...)` binding,
//! whose result it must assign to `result`.

mod bindings;
mod engine_binding;
mod error;
mod execute;
mod result;
mod validate;

pub use error::SandboxError;
pub use execute::execute_script_pipeline;
pub use result::QueryResult;
pub use validate::validate_source;
