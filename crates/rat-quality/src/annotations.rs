//! `-- @key: value` header parsing for quality test SQL, mirroring the
//! pipeline-source annotation headers `rat-templating` reads.

use std::sync::OnceLock;

use regex::Regex;

fn severity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^--\s*@severity:\s*(\w+)").unwrap())
}

fn description_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^--\s*@description:\s*(.+)$").unwrap())
}

fn tags_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^--\s*@tags:\s*(.+)$").unwrap())
}

fn remediation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^--\s*@remediation:\s*(.+)$").unwrap())
}

/// Parse `-- @severity: error|warn` from any comment line. Defaults to
/// `"error"`; `"warning"` is accepted as an alias for `"warn"`.
pub fn parse_severity(sql: &str) -> String {
    for line in sql.lines() {
        if let Some(caps) = severity_re().captures(line.trim()) {
            let val = caps[1].to_lowercase();
            return if val == "warn" || val == "warning" { "warn".to_string() } else { "error".to_string() };
        }
    }
    "error".to_string()
}

/// Parse `-- @description: ...` from any comment line. Empty if absent.
pub fn parse_description(sql: &str) -> String {
    for line in sql.lines() {
        if let Some(caps) = description_re().captures(line.trim()) {
            return caps[1].trim().to_string();
        }
    }
    String::new()
}

/// Parse `-- @tags: completeness, accuracy` into lowercase, trimmed tags.
pub fn parse_tags(sql: &str) -> Vec<String> {
    for line in sql.lines() {
        if let Some(caps) = tags_re().captures(line.trim()) {
            return caps[1].split(',').map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty()).collect();
        }
    }
    Vec::new()
}

/// Parse `-- @remediation: ...` from any comment line. Empty if absent.
pub fn parse_remediation(sql: &str) -> String {
    for line in sql.lines() {
        if let Some(caps) = remediation_re().captures(line.trim()) {
            return caps[1].trim().to_string();
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_severity_to_error() {
        assert_eq!(parse_severity("select 1"), "error");
    }

    #[test]
    fn parses_warn_alias() {
        assert_eq!(parse_severity("-- @severity: warning\nselect 1"), "warn");
    }

    #[test]
    fn parses_description_and_tags_independently_of_position() {
        let sql = "select 1\n-- @description: no null emails\n-- @tags: completeness, pii";
        assert_eq!(parse_description(sql), "no null emails");
        assert_eq!(parse_tags(sql), vec!["completeness".to_string(), "pii".to_string()]);
    }

    #[test]
    fn missing_annotations_are_empty() {
        assert_eq!(parse_description("select 1"), "");
        assert!(parse_tags("select 1").is_empty());
        assert_eq!(parse_remediation("select 1"), "");
    }
}
