//! SQL/script template compilation with `ref()`/`landing_zone()` resolution.
//!
//! Pipeline sources carry `-- @key: value` / `# @key: value` metadata
//! headers (`annotations`), reference upstream tables and raw landing zones
//! through a small hand-rolled template language (`render`, `compile`), and
//! are checked for syntax errors and anti-patterns before being accepted
//! (`validate`).

mod annotations;
mod compile;
mod dependencies;
mod error;
mod render;
mod resolve;
mod validate;

pub use annotations::{extract_metadata, strip_metadata_lines};
pub use compile::compile_sql;
pub use dependencies::{extract_dependencies, extract_landing_zones};
pub use error::TemplatingError;
pub use render::{parse_template, render_nodes, Node, RenderCtx};
pub use resolve::{resolve_landing_zone, resolve_landing_zone_preview, resolve_ref, split_ref};
pub use validate::{validate_landing_zones, validate_template};
