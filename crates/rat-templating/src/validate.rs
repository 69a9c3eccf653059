//! Template validation: syntax errors, nested-reference errors, and
//! bare-call warnings; plus a separate landing-zone content check.

use std::sync::OnceLock;

use object_store::ObjectStore;
use regex::Regex;

use rat_core::S3Config;

use crate::dependencies::extract_landing_zones;
use crate::error::TemplatingError;
use crate::render::parse_template;

fn nested_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?:ref|landing_zone)\(\s*['"].*\{\{.*\}\}.*['"]\s*\)"#).unwrap()
    })
}

fn bare_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?:ref|landing_zone)\(\s*['"][^'"]+['"]\s*\)"#).unwrap())
}

/// Validate template syntax and two common anti-patterns.
///
/// Returns `(errors, warnings)`. A syntax error short-circuits the
/// remaining checks, same as the original: there's no point flagging
/// anti-patterns in a template that won't parse.
pub fn validate_template(raw_sql: &str) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if let Err(e) = parse_template(raw_sql) {
        errors.push(format!("template syntax error: {e}"));
        return (errors, warnings);
    }

    for m in nested_pattern().find_iter(raw_sql) {
        errors.push(format!("Nested template expression inside function call: {}", m.as_str()));
    }

    for m in bare_pattern().find_iter(raw_sql) {
        let start = m.start();

        let line_start = raw_sql[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_prefix = &raw_sql[line_start..start];
        if line_prefix.contains("--") {
            continue;
        }

        let last_block_open = raw_sql[..start].rfind("/*");
        let last_block_close = raw_sql[..start].rfind("*/");
        if let Some(open) = last_block_open {
            if last_block_close.map(|close| open > close).unwrap_or(true) {
                continue;
            }
        }

        let prefix = &raw_sql[..start];
        let last_open = prefix.rfind("{{");
        let last_close = prefix.rfind("}}");
        if last_open.is_some() && last_close.unwrap_or(0) < last_open.unwrap() {
            continue;
        }

        let last_stmt_open = prefix.rfind("{%");
        let last_stmt_close = prefix.rfind("%}");
        if last_stmt_open.is_some() && last_stmt_close.unwrap_or(0) < last_stmt_open.unwrap() {
            continue;
        }

        warnings.push(format!("Bare function call outside template delimiters: {}", m.as_str()));
    }

    (errors, warnings)
}

/// Check that every `landing_zone('...')` referenced by `sql` has files,
/// returning a warning (never an error) per empty zone.
pub async fn validate_landing_zones(
    sql: &str,
    namespace: &str,
    s3_config: &S3Config,
    store: &dyn ObjectStore,
) -> Result<Vec<String>, TemplatingError> {
    let zones = extract_landing_zones(sql);
    if zones.is_empty() {
        return Ok(Vec::new());
    }

    let checks = zones.iter().map(|zone| {
        let prefix = format!("{namespace}/landing/{zone}/");
        async move {
            let keys = rat_store::list_keys(store, &prefix, None).await?;
            if keys.is_empty() {
                Ok::<_, TemplatingError>(Some(format!(
                    "Landing zone '{zone}' has no files at s3://{}/{prefix}",
                    s3_config.bucket
                )))
            } else {
                Ok(None)
            }
        }
    });

    let results = futures::future::try_join_all(checks).await?;
    Ok(results.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_nested_template_inside_ref_literal() {
        let (errors, _) = validate_template("select * from {{ ref('{{this}}') }}");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Nested template"));
    }

    #[test]
    fn warns_on_bare_ref_outside_delimiters() {
        let (errors, warnings) = validate_template("select * from ref('silver.orders')");
        assert!(errors.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn does_not_warn_on_ref_inside_delimiters() {
        let (errors, warnings) = validate_template("select * from {{ ref('silver.orders') }}");
        assert!(errors.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn does_not_warn_on_ref_inside_line_comment() {
        let (errors, warnings) = validate_template("-- see ref('silver.orders') for context\nselect 1");
        assert!(errors.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn does_not_warn_on_ref_inside_block_comment() {
        let (errors, warnings) = validate_template("/* ref('silver.orders') */\nselect 1");
        assert!(errors.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn surfaces_syntax_error_and_skips_other_checks() {
        let (errors, warnings) = validate_template("{% if is_incremental() %}oops");
        assert_eq!(errors.len(), 1);
        assert!(warnings.is_empty());
    }
}
