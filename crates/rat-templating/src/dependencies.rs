//! Regex extraction of `ref('...')` / `landing_zone('...')` call strings,
//! used for DAG construction and landing-zone validation.

use std::sync::OnceLock;

use regex::Regex;

fn ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"ref\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap())
}

fn landing_zone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"landing_zone\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap())
}

/// Extract `ref('x.y')` table references from a pipeline template.
pub fn extract_dependencies(sql: &str) -> Vec<String> {
    ref_re()
        .captures_iter(sql)
        .map(|c| c[1].to_string())
        .collect()
}

/// Extract `landing_zone('x')` references from a pipeline template.
pub fn extract_landing_zones(sql: &str) -> Vec<String> {
    landing_zone_re()
        .captures_iter(sql)
        .map(|c| c[1].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_two_and_three_part_refs() {
        let sql = "select * from {{ ref('silver.orders') }} join {{ ref('analytics.bronze.events') }}";
        assert_eq!(
            extract_dependencies(sql),
            vec!["silver.orders".to_string(), "analytics.bronze.events".to_string()]
        );
    }

    #[test]
    fn extracts_landing_zones_with_double_quotes() {
        let sql = r#"select * from {{ landing_zone("orders_csv") }}"#;
        assert_eq!(extract_landing_zones(sql), vec!["orders_csv".to_string()]);
    }
}
