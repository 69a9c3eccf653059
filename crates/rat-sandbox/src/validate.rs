//! Pre-execution source scanning for script pipelines.
//!
//! `python_exec.py`'s sandbox walks a Python AST looking for dunder
//! attribute access (`__class__`, `__subclasses__`, ...) because that's
//! where Python's introspection-based sandbox escapes live. Lua has no
//! dunder attributes — its equivalent escape surface is the handful of
//! globals that expose the raw interpreter state: `getmetatable`/
//! `setmetatable` (swap a table's behavior), `rawget`/`rawset`/`rawequal`/
//! `rawlen` (bypass any access control a metatable would otherwise enforce),
//! `load`/`loadstring`/`dofile`/`loadfile` (compile and run arbitrary new
//! code), `require`/`package` (pull in host modules), `debug` (full
//! interpreter introspection), `collectgarbage`, and the `_G` global table
//! itself. We don't have a Lua parser in the dependency stack, so this is a
//! source-level scan rather than an AST walk — still run before the
//! interpreter ever sees the script, same as the AST check it replaces.
use std::sync::OnceLock;

use regex::Regex;

use crate::error::SandboxError;

const BLOCKED_IDENTIFIERS: &[&str] = &[
    "_G",
    "getmetatable",
    "setmetatable",
    "rawget",
    "rawset",
    "rawequal",
    "rawlen",
    "load",
    "loadstring",
    "dofile",
    "loadfile",
    "require",
    "package",
    "debug",
    "collectgarbage",
];

fn blocked_identifier_res() -> &'static [(String, Regex)] {
    static RES: OnceLock<Vec<(String, Regex)>> = OnceLock::new();
    RES.get_or_init(|| {
        BLOCKED_IDENTIFIERS
            .iter()
            .map(|name| {
                let pattern = format!(r"\b{}\b", regex::escape(name));
                (name.to_string(), Regex::new(&pattern).unwrap())
            })
            .collect()
    })
}

fn string_dump_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"string\s*\.\s*dump").unwrap())
}

/// Reject a script that references any blocked identifier, whether as a
/// bare name, a table-indexed call (`debug.getinfo`), or a string literal
/// (`_G["load"]`) — matching the spirit of the original's "also reject
/// string-literal dunder references" defense-in-depth pass.
pub fn validate_source(source: &str) -> Result<(), SandboxError> {
    for (line_no, line) in source.lines().enumerate() {
        if string_dump_re().is_match(line) {
            return Err(SandboxError::BlockedIdentifier {
                name: "string.dump".to_string(),
                line: line_no + 1,
            });
        }
        for (name, re) in blocked_identifier_res() {
            if re.is_match(line) {
                return Err(SandboxError::BlockedIdentifier {
                    name: name.clone(),
                    line: line_no + 1,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_script() {
        let src = "result = engine.sql(\"select 1\")\n";
        assert!(validate_source(src).is_ok());
    }

    #[test]
    fn rejects_bare_identifier() {
        let err = validate_source("local x = getmetatable(result)\n").unwrap_err();
        assert!(matches!(err, SandboxError::BlockedIdentifier { name, .. } if name == "getmetatable"));
    }

    #[test]
    fn rejects_string_literal_reference() {
        let err = validate_source("local x = _G[\"load\"]\n").unwrap_err();
        assert!(matches!(err, SandboxError::BlockedIdentifier { .. }));
    }

    #[test]
    fn rejects_dotted_access() {
        let err = validate_source("debug.getinfo(1)\n").unwrap_err();
        assert!(matches!(err, SandboxError::BlockedIdentifier { name, .. } if name == "debug"));
    }

    #[test]
    fn rejects_string_dump() {
        let err = validate_source("local x = string.dump(f)\n").unwrap_err();
        assert!(matches!(err, SandboxError::BlockedIdentifier { name, .. } if name == "string.dump"));
    }

    #[test]
    fn reports_the_offending_line_number() {
        let err = validate_source("result = 1\nlocal x = require(\"os\")\n").unwrap_err();
        assert!(matches!(err, SandboxError::BlockedIdentifier { line, .. } if line == 2));
    }
}
