//! Typed query specifications for the trait store.
//!
//! Motivation:
//! - Queries used to be assembled by string concatenation scattered across
//!   call sites, which is untestable except by string matching.
//! - A `QuerySpec` is an ordered set of clause buckets (required matches,
//!   optional matches, WITH projections, RETURN projections, ordering,
//!   pagination or a count flag) rendered by a *single* formatter, so unit
//!   tests target the specification and the renderer separately.
//!
//! Clause order is fixed: `MATCH*`, `OPTIONAL MATCH*`, `WITH`, `RETURN`,
//! `ORDER BY`, `SKIP`/`LIMIT`. A spec with no required match or no return
//! projection is a programmer error and fails to render.

pub mod load;
pub mod term_search;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    /// No required MATCH clause was supplied; nothing to search.
    #[error("query spec has no match clause")]
    NoMatchClause,
    /// No RETURN projection was supplied; nothing to project.
    #[error("query spec has no return clause")]
    NoReturnClause,
}

/// A match pattern plus the boolean expressions of its WHERE clause
/// (AND-joined).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchClause {
    pub pattern: String,
    #[serde(default)]
    pub wheres: Vec<String>,
}

impl MatchClause {
    pub fn new(pattern: impl Into<String>) -> Self {
        MatchClause { pattern: pattern.into(), wheres: Vec::new() }
    }

    pub fn filtered(pattern: impl Into<String>, wheres: Vec<String>) -> Self {
        MatchClause { pattern: pattern.into(), wheres }
    }
}

/// Ordered clause buckets describing one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub matches: Vec<MatchClause>,
    #[serde(default)]
    pub optional: Vec<MatchClause>,
    #[serde(default)]
    pub with: Vec<String>,
    #[serde(default)]
    pub ret: Vec<String>,
    #[serde(default)]
    pub order: Vec<String>,
    /// 1-based page number; defaults to 1 at render time.
    #[serde(default)]
    pub page: Option<u32>,
    /// Page size; defaults to 50 at render time.
    #[serde(default)]
    pub per: Option<u32>,
    /// Count mode bypasses pagination entirely.
    #[serde(default)]
    pub count: bool,
}

impl QuerySpec {
    pub fn new() -> Self {
        QuerySpec::default()
    }

    pub fn matching(&mut self, pattern: impl Into<String>) -> &mut Self {
        self.matches.push(MatchClause::new(pattern));
        self
    }

    pub fn matching_where(&mut self, pattern: impl Into<String>, wheres: Vec<String>) -> &mut Self {
        self.matches.push(MatchClause::filtered(pattern, wheres));
        self
    }

    pub fn optional_matching(&mut self, pattern: impl Into<String>) -> &mut Self {
        self.optional.push(MatchClause::new(pattern));
        self
    }

    pub fn returning<I, S>(&mut self, cols: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ret.extend(cols.into_iter().map(Into::into));
        self
    }

    /// Render to query text, enforcing the fixed clause order.
    pub fn render(&self) -> Result<String, QueryError> {
        if self.matches.is_empty() {
            return Err(QueryError::NoMatchClause);
        }
        if self.ret.is_empty() {
            return Err(QueryError::NoReturnClause);
        }
        let mut q = String::new();
        for m in &self.matches {
            push_match(&mut q, "MATCH", m);
        }
        for m in &self.optional {
            push_match(&mut q, "OPTIONAL MATCH", m);
        }
        if !self.with.is_empty() {
            push_sep(&mut q);
            q.push_str("WITH ");
            q.push_str(&self.with.join(" WITH "));
        }
        push_sep(&mut q);
        q.push_str("RETURN ");
        q.push_str(&self.ret.join(", "));
        if !self.order.is_empty() {
            q.push_str(" ORDER BY ");
            q.push_str(&self.order.join(", "));
        }
        if !self.count {
            q.push_str(&limit_and_skip_clause(self.page, self.per));
        }
        Ok(q)
    }
}

fn push_sep(q: &mut String) {
    if !q.is_empty() {
        q.push(' ');
    }
}

fn push_match(q: &mut String, directive: &str, m: &MatchClause) {
    push_sep(q);
    q.push_str(directive);
    q.push(' ');
    q.push_str(&m.pattern);
    if !m.wheres.is_empty() {
        q.push_str(" WHERE ");
        q.push_str(&m.wheres.join(" AND "));
    }
}

/// Render the pagination tail. SKIP is omitted when the offset is zero.
pub fn limit_and_skip_clause(page: Option<u32>, per: Option<u32>) -> String {
    let page = page.unwrap_or(1).max(1);
    let per = per.unwrap_or(50);
    let skip = (page as u64 - 1) * per as u64;
    if skip > 0 {
        format!(" SKIP {skip} LIMIT {per}")
    } else {
        format!(" LIMIT {per}")
    }
}

/// Quote a value for embedding in query text. Numeric-looking values pass
/// through unquoted; everything else goes through [`quote_string`].
pub fn quote(value: &str) -> String {
    if looks_numeric(value) {
        return value.to_string();
    }
    quote_string(value)
}

/// Double-quote a string with `\` and `"` escaped. For values that must
/// render as string literals whatever their shape, URIs included.
pub fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn looks_numeric(value: &str) -> bool {
    let s = value.strip_prefix(['-', '+']).unwrap_or(value);
    if s.is_empty() {
        return false;
    }
    let mut seen_dot = false;
    let mut seen_digit = false;
    for c in s.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            ',' if !seen_dot => {}
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }
    seen_digit
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_spec() -> QuerySpec {
        let mut spec = QuerySpec::new();
        spec.matching("(page:Page)").returning(["page"]);
        spec
    }

    #[test]
    fn render_requires_a_match_clause() {
        let mut spec = QuerySpec::new();
        spec.returning(["page"]);
        assert_eq!(spec.render(), Err(QueryError::NoMatchClause));
    }

    #[test]
    fn render_requires_a_return_clause() {
        let mut spec = QuerySpec::new();
        spec.matching("(page:Page)");
        assert_eq!(spec.render(), Err(QueryError::NoReturnClause));
    }

    #[test]
    fn clause_order_is_fixed() {
        let mut spec = QuerySpec::new();
        spec.matching_where(
            "(page:Page)-[:trait]->(trait:Trait)",
            vec!["trait.normal_measurement >= 1".into()],
        );
        spec.optional_matching("(trait)-[:units_term]->(units:Term)");
        spec.returning(["page", "trait"]);
        spec.order.push("page.name".into());
        let q = spec.render().unwrap();
        assert_eq!(
            q,
            "MATCH (page:Page)-[:trait]->(trait:Trait) \
             WHERE trait.normal_measurement >= 1 \
             OPTIONAL MATCH (trait)-[:units_term]->(units:Term) \
             RETURN page, trait ORDER BY page.name LIMIT 50"
        );
    }

    #[test]
    fn multiple_wheres_are_and_joined() {
        let mut spec = QuerySpec::new();
        spec.matching_where("(t:Trait)", vec!["a = 1".into(), "b = 2".into()]);
        spec.returning(["t"]);
        let q = spec.render().unwrap();
        assert!(q.contains("WHERE a = 1 AND b = 2"));
    }

    #[test]
    fn first_page_has_no_skip() {
        assert_eq!(limit_and_skip_clause(Some(1), Some(50)), " LIMIT 50");
        assert_eq!(limit_and_skip_clause(Some(3), Some(50)), " SKIP 100 LIMIT 50");
        assert_eq!(limit_and_skip_clause(None, None), " LIMIT 50");
    }

    #[test]
    fn count_mode_skips_pagination() {
        let mut spec = minimal_spec();
        spec.count = true;
        spec.page = Some(4);
        spec.per = Some(10);
        let q = spec.render().unwrap();
        assert!(!q.contains("SKIP"));
        assert!(!q.contains("LIMIT"));
    }

    #[test]
    fn quote_passes_numbers_and_escapes_strings() {
        assert_eq!(quote("42"), "42");
        assert_eq!(quote("-3.5"), "-3.5");
        assert_eq!(quote("1,200.5"), "1,200.5");
        assert_eq!(quote("Felis \"catus\""), "\"Felis \\\"catus\\\"\"");
        assert_eq!(quote(""), "\"\"");
        assert_eq!(quote("."), "\".\"");
    }

    #[test]
    fn quote_string_always_quotes() {
        assert_eq!(quote_string("42"), "\"42\"");
        assert_eq!(quote_string("uri:a\"b"), "\"uri:a\\\"b\"");
    }

    proptest::proptest! {
        #[test]
        fn skip_is_always_a_whole_number_of_pages(page in 1u32..10_000, per in 1u32..10_000) {
            let clause = limit_and_skip_clause(Some(page), Some(per));
            let limit = format!("LIMIT {per}");
            proptest::prop_assert!(clause.ends_with(&limit), "clause {clause:?} missing {limit:?}");
            if page > 1 {
                let skip = format!(" SKIP {} ", (page as u64 - 1) * per as u64);
                proptest::prop_assert!(clause.starts_with(&skip), "clause {clause:?} missing {skip:?}");
            } else {
                proptest::prop_assert!(!clause.contains("SKIP"));
            }
        }

        #[test]
        fn quoted_strings_never_leak_an_unescaped_quote(s in ".*") {
            let quoted = quote(&s);
            if quoted.starts_with('"') {
                let inner = &quoted[1..quoted.len() - 1];
                let mut chars = inner.chars();
                while let Some(c) = chars.next() {
                    proptest::prop_assert!(c != '"', "unescaped quote in {quoted:?}");
                    if c == '\\' {
                        chars.next();
                    }
                }
            }
        }
    }
}
