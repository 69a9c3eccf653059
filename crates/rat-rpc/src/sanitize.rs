//! Error sanitization applied before any error message crosses the RPC
//! boundary to a client.
//!
//! The full, unsanitized error is always logged server-side first — this
//! pipeline only scrubs what's returned over the wire: absolute file
//! paths, memory addresses, internal engine source references, and
//! stack-trace lines.

use std::sync::OnceLock;

use regex::Regex;

fn file_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(/[^\s:]+\.(?:rs|so|cpp|c|h|hpp|o|parquet|csv|json|lua))").unwrap())
}

fn memory_addr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"0x[0-9a-fA-F]{6,}").unwrap())
}

fn internal_src_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"src/[^\s]+\.(?:rs|[ch]pp):\d+").unwrap())
}

fn stack_frame_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*(at |\d+:\s+0x).*$").unwrap())
}

fn blank_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").unwrap())
}

/// Strip server-internal detail from an error message before it's returned
/// to an RPC caller. Idempotent — sanitizing an already-sanitized message
/// is a no-op.
pub fn sanitize_error(error: &str) -> String {
    let sanitized = file_path_re().replace_all(error, "<path>");
    let sanitized = memory_addr_re().replace_all(&sanitized, "<addr>");
    let sanitized = internal_src_re().replace_all(&sanitized, "<internal>");
    let sanitized = stack_frame_re().replace_all(&sanitized, "");
    let sanitized = blank_run_re().replace_all(&sanitized, "\n\n");
    sanitized.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_absolute_file_paths() {
        let msg = "failed to read /home/runner/.cargo/registry/src/foo.rs";
        assert!(!sanitize_error(msg).contains("/home/runner"));
    }

    #[test]
    fn strips_memory_addresses() {
        let msg = "segfault at 0x7fff5fbff8c0 in thread";
        let out = sanitize_error(msg);
        assert!(!out.contains("0x7fff5fbff8c0"));
        assert!(out.contains("<addr>"));
    }

    #[test]
    fn strips_internal_source_references() {
        let msg = "panic in src/engine/exec.cpp:482";
        assert!(sanitize_error(&msg).contains("<internal>"));
    }

    #[test]
    fn collapses_blank_lines() {
        let msg = "line one\n\n\n\nline two";
        assert_eq!(sanitize_error(msg), "line one\n\nline two");
    }

    #[test]
    fn leaves_plain_messages_untouched() {
        let msg = "quality test 'no_nulls' failed: 3 violation(s)";
        assert_eq!(sanitize_error(msg), msg);
    }
}
