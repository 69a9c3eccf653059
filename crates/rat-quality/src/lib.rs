//! Post-write quality gate: discovers a pipeline's published quality tests,
//! runs each against the ephemeral write branch, and classifies the result
//! set so the executor can decide whether a merge is safe.

mod annotations;
mod error;
mod gate;
mod sample;

pub use annotations::{parse_description, parse_remediation, parse_severity, parse_tags};
pub use error::QualityError;
pub use gate::{discover_quality_tests_versioned, has_error_failures, run_quality_test, run_quality_tests};
pub use sample::{format_sample_rows, total_row_count};
