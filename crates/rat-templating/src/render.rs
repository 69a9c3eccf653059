//! A small hand-rolled template renderer: `{{ expr }}` substitution plus
//! `{% if %}` / `{% elif %}` / `{% else %}` / `{% endif %}` blocks.
//!
//! No general-purpose templating crate is pulled in here — the binding
//! surface (`ref`, `landing_zone`, `this`, `run_started_at`, a handful of
//! `is_*()` predicates, `watermark_value`) is small and fixed, and a direct
//! implementation mirrors the original's sandboxed environment (no
//! filesystem access, no attribute introspection) more faithfully than
//! pulling in Tera or Handlebars would.

use std::collections::HashMap;

use crate::error::TemplatingError;

#[derive(Debug, Clone, PartialEq)]
enum RawToken {
    Text(String),
    Expr(String),
    Stmt(String),
}

fn next_delim(s: &str) -> Option<(usize, bool)> {
    let expr_pos = s.find("{{");
    let stmt_pos = s.find("{%");
    match (expr_pos, stmt_pos) {
        (None, None) => None,
        (Some(e), None) => Some((e, true)),
        (None, Some(st)) => Some((st, false)),
        (Some(e), Some(st)) => Some(if e < st { (e, true) } else { (st, false) }),
    }
}

fn tokenize(src: &str) -> Result<Vec<RawToken>, TemplatingError> {
    let mut tokens = Vec::new();
    let mut rest = src;
    while let Some((pos, is_expr)) = next_delim(rest) {
        if pos > 0 {
            tokens.push(RawToken::Text(rest[..pos].to_string()));
        }
        let after_open = &rest[pos + 2..];
        let close = if is_expr { "}}" } else { "%}" };
        match after_open.find(close) {
            Some(end) => {
                let inner = after_open[..end].trim().to_string();
                tokens.push(if is_expr { RawToken::Expr(inner) } else { RawToken::Stmt(inner) });
                rest = &after_open[end + close.len()..];
            }
            None => {
                let tag = if is_expr { "{{" } else { "{%" };
                return Err(TemplatingError::UnterminatedTag(tag.to_string()));
            }
        }
    }
    if !rest.is_empty() {
        tokens.push(RawToken::Text(rest.to_string()));
    }
    Ok(tokens)
}

#[derive(Debug, Clone)]
pub enum Node {
    Text(String),
    Expr(String),
    /// Ordered `(condition, body)` branches; the final branch's condition is
    /// `None` for a trailing `{% else %}`.
    If(Vec<(Option<String>, Vec<Node>)>),
}

struct Parser<'a> {
    tokens: &'a [RawToken],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&RawToken> {
        self.tokens.get(self.pos)
    }

    fn parse_nodes(&mut self, in_if: bool) -> Result<Vec<Node>, TemplatingError> {
        let mut nodes = Vec::new();
        loop {
            match self.peek() {
                None => {
                    if in_if {
                        return Err(TemplatingError::UnclosedIfBlock);
                    }
                    return Ok(nodes);
                }
                Some(RawToken::Text(t)) => {
                    nodes.push(Node::Text(t.clone()));
                    self.pos += 1;
                }
                Some(RawToken::Expr(e)) => {
                    nodes.push(Node::Expr(e.clone()));
                    self.pos += 1;
                }
                Some(RawToken::Stmt(s)) => {
                    if in_if && (s == "else" || s.starts_with("elif") || s == "endif") {
                        return Ok(nodes);
                    }
                    if s == "if" || s.starts_with("if ") {
                        let cond = s.strip_prefix("if").unwrap().trim().to_string();
                        self.pos += 1;
                        nodes.push(self.parse_if(cond)?);
                    } else {
                        return Err(TemplatingError::UnknownCondition(s.clone()));
                    }
                }
            }
        }
    }

    fn parse_if(&mut self, first_cond: String) -> Result<Node, TemplatingError> {
        let mut branches = Vec::new();
        let mut current_cond = Some(first_cond);
        loop {
            let body = self.parse_nodes(true)?;
            branches.push((current_cond.take(), body));
            match self.peek() {
                Some(RawToken::Stmt(s)) if s.starts_with("elif") => {
                    let cond = s.strip_prefix("elif").unwrap().trim().to_string();
                    self.pos += 1;
                    current_cond = Some(cond);
                }
                Some(RawToken::Stmt(s)) if s == "else" => {
                    self.pos += 1;
                    let else_body = self.parse_nodes(true)?;
                    branches.push((None, else_body));
                    match self.peek() {
                        Some(RawToken::Stmt(s2)) if s2 == "endif" => {
                            self.pos += 1;
                            return Ok(Node::If(branches));
                        }
                        _ => return Err(TemplatingError::UnclosedIfBlock),
                    }
                }
                Some(RawToken::Stmt(s)) if s == "endif" => {
                    self.pos += 1;
                    return Ok(Node::If(branches));
                }
                _ => return Err(TemplatingError::UnclosedIfBlock),
            }
        }
    }
}

/// Parse a template into a node tree, validating `{% if %}` block nesting.
pub fn parse_template(src: &str) -> Result<Vec<Node>, TemplatingError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens: &tokens, pos: 0 };
    parser.parse_nodes(false)
}

/// Bindings available to a rendered template. `ref_map`/`landing_zone_map`
/// hold pre-resolved expressions keyed by the literal argument string, since
/// resolving a `ref()` call requires an async catalog round-trip that
/// happens once up front rather than during tree-walk rendering.
pub struct RenderCtx {
    pub this: String,
    pub run_started_at: String,
    pub watermark_value: Option<String>,
    pub is_incremental: bool,
    pub is_scd2: bool,
    pub is_snapshot: bool,
    pub is_append_only: bool,
    pub is_delete_insert: bool,
    pub ref_map: HashMap<String, String>,
    pub landing_zone_map: HashMap<String, String>,
}

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Bool(bool),
    None,
}

impl Value {
    fn to_text(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::None => "None".to_string(),
        }
    }
}

fn strip_quotes(s: &str) -> Option<&str> {
    if s.len() >= 2 && ((s.starts_with('\'') && s.ends_with('\'')) || (s.starts_with('"') && s.ends_with('"'))) {
        Some(&s[1..s.len() - 1])
    } else {
        None
    }
}

fn parse_call<'a>(expr: &'a str, name: &str) -> Option<&'a str> {
    let prefix = format!("{name}(");
    if !expr.starts_with(&prefix) || !expr.ends_with(')') {
        return None;
    }
    let inner = expr[prefix.len()..expr.len() - 1].trim();
    strip_quotes(inner)
}

fn evaluate_value(expr: &str, ctx: &RenderCtx) -> Result<Value, TemplatingError> {
    let expr = expr.trim();
    if let Some(rest) = expr.strip_prefix("not ") {
        let inner = evaluate_value(rest.trim(), ctx)?;
        return match inner {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            _ => Err(TemplatingError::UnknownCondition(expr.to_string())),
        };
    }
    match expr {
        "this" => Ok(Value::Str(ctx.this.clone())),
        "run_started_at" => Ok(Value::Str(ctx.run_started_at.clone())),
        "watermark_value" => Ok(match &ctx.watermark_value {
            Some(v) => Value::Str(v.clone()),
            None => Value::None,
        }),
        "is_incremental()" => Ok(Value::Bool(ctx.is_incremental)),
        "is_scd2()" => Ok(Value::Bool(ctx.is_scd2)),
        "is_snapshot()" => Ok(Value::Bool(ctx.is_snapshot)),
        "is_append_only()" => Ok(Value::Bool(ctx.is_append_only)),
        "is_delete_insert()" => Ok(Value::Bool(ctx.is_delete_insert)),
        _ => {
            if let Some(arg) = parse_call(expr, "ref") {
                return ctx
                    .ref_map
                    .get(arg)
                    .cloned()
                    .map(Value::Str)
                    .ok_or_else(|| TemplatingError::InvalidRef(arg.to_string()));
            }
            if let Some(arg) = parse_call(expr, "landing_zone") {
                return ctx
                    .landing_zone_map
                    .get(arg)
                    .cloned()
                    .map(Value::Str)
                    .ok_or_else(|| TemplatingError::InvalidRef(arg.to_string()));
            }
            Err(TemplatingError::UnknownCondition(expr.to_string()))
        }
    }
}

fn evaluate_bool(expr: &str, ctx: &RenderCtx) -> Result<bool, TemplatingError> {
    match evaluate_value(expr, ctx)? {
        Value::Bool(b) => Ok(b),
        _ => Err(TemplatingError::UnknownCondition(expr.to_string())),
    }
}

/// Walk the node tree, substituting expressions and taking the first
/// matching `{% if %}`/`{% elif %}` branch (or the `{% else %}` body).
pub fn render_nodes(nodes: &[Node], ctx: &RenderCtx) -> Result<String, TemplatingError> {
    let mut out = String::new();
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Expr(e) => out.push_str(&evaluate_value(e, ctx)?.to_text()),
            Node::If(branches) => {
                for (cond, body) in branches {
                    let take = match cond {
                        Some(c) => evaluate_bool(c, ctx)?,
                        None => true,
                    };
                    if take {
                        out.push_str(&render_nodes(body, ctx)?);
                        break;
                    }
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RenderCtx {
        let mut ref_map = HashMap::new();
        ref_map.insert("silver.orders".to_string(), "iceberg_scan('s3://rat/x/meta.json')".to_string());
        ref_map.insert("bronze.orders".to_string(), "iceberg_scan('s3://rat/y/meta.json')".to_string());
        let mut landing_zone_map = HashMap::new();
        landing_zone_map.insert("orders_csv".to_string(), "s3://rat/ns/landing/orders_csv/**".to_string());
        RenderCtx {
            this: "iceberg_scan('s3://rat/y/meta.json')".to_string(),
            run_started_at: "2026-07-28T00:00:00+00:00".to_string(),
            watermark_value: Some("2026-07-27".to_string()),
            is_incremental: true,
            is_scd2: false,
            is_snapshot: false,
            is_append_only: false,
            is_delete_insert: false,
            ref_map,
            landing_zone_map,
        }
    }

    #[test]
    fn substitutes_ref_and_this() {
        let nodes = parse_template("select * from {{ ref('silver.orders') }} where t = {{ this }}").unwrap();
        let rendered = render_nodes(&nodes, &ctx()).unwrap();
        assert_eq!(
            rendered,
            "select * from iceberg_scan('s3://rat/x/meta.json') where t = iceberg_scan('s3://rat/y/meta.json')"
        );
    }

    #[test]
    fn if_block_picks_matching_branch() {
        let sql = "select 1 {% if is_incremental() %}where ts > '{{ watermark_value }}'{% else %}-- full{% endif %}";
        let nodes = parse_template(sql).unwrap();
        let rendered = render_nodes(&nodes, &ctx()).unwrap();
        assert_eq!(rendered, "select 1 where ts > '2026-07-27'");
    }

    #[test]
    fn not_prefix_negates_boolean_condition() {
        let sql = "{% if not is_incremental() %}full{% else %}incr{% endif %}";
        let nodes = parse_template(sql).unwrap();
        let rendered = render_nodes(&nodes, &ctx()).unwrap();
        assert_eq!(rendered, "incr");
    }

    #[test]
    fn unclosed_if_block_is_an_error() {
        let err = parse_template("{% if is_incremental() %}oops").unwrap_err();
        assert!(matches!(err, TemplatingError::UnclosedIfBlock));
    }

    #[test]
    fn unknown_expression_is_an_error() {
        let nodes = parse_template("{{ bogus_fn() }}").unwrap();
        let err = render_nodes(&nodes, &ctx()).unwrap_err();
        assert!(matches!(err, TemplatingError::UnknownCondition(_)));
    }
}
