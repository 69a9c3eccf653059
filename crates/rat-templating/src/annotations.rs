//! `@key: value` metadata headers, read from leading `--`/`#` comment lines.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

fn annotation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:--|#)\s*@(\w+):\s*(.+)$").unwrap())
}

fn metadata_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:--|#)\s*@\w+:").unwrap())
}

/// Parse leading `@key: value` annotation comments. Stops at the first
/// non-comment, non-empty line.
pub fn extract_metadata(source: &str) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    for line in source.lines() {
        let stripped = line.trim();
        if let Some(caps) = annotation_re().captures(stripped) {
            metadata.insert(caps[1].to_string(), caps[2].trim().to_string());
        } else if !stripped.is_empty() && !stripped.starts_with("--") && !stripped.starts_with('#') {
            break;
        }
    }
    metadata
}

/// Strip `@key: value` annotation lines from rendered output.
pub fn strip_metadata_lines(rendered: &str) -> String {
    rendered
        .lines()
        .filter(|line| !metadata_line_re().is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_sql_and_python_style_annotations() {
        let source = "-- @description: clean orders\n# @merge_strategy: incremental\nselect 1";
        let meta = extract_metadata(source);
        assert_eq!(meta.get("description").unwrap(), "clean orders");
        assert_eq!(meta.get("merge_strategy").unwrap(), "incremental");
    }

    #[test]
    fn stops_at_first_non_comment_line() {
        let source = "-- @description: a\nselect 1\n-- @description: b";
        let meta = extract_metadata(source);
        assert_eq!(meta.get("description").unwrap(), "a");
    }

    #[test]
    fn strip_metadata_lines_removes_annotation_comments_only() {
        let rendered = "-- @description: clean orders\nselect 1\n-- a regular comment";
        let stripped = strip_metadata_lines(rendered);
        assert_eq!(stripped, "select 1\n-- a regular comment");
    }
}
