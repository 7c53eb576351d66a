//! Controlled-vocabulary terms.
//!
//! Terms are immutable once created (administrative edits aside) and are
//! identified by URI. The `parent_term` hierarchy between terms is a graph
//! edge, not a property, so it does not appear here; queries walk it with
//! `parent_term*0..3` hops.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The four kinds of term the store distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermType {
    Measurement,
    Association,
    Value,
    Metadata,
}

impl std::fmt::Display for TermType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TermType::Measurement => "measurement",
            TermType::Association => "association",
            TermType::Value => "value",
            TermType::Metadata => "metadata",
        };
        f.write_str(s)
    }
}

/// A vocabulary term as stored on a `Term` node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub uri: String,
    #[serde(default)]
    pub name: String,
    /// Absent on older nodes; callers that require a type must check.
    #[serde(rename = "type", default, deserialize_with = "lenient_term_type")]
    pub term_type: Option<TermType>,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub definition: Option<String>,
    #[serde(default)]
    pub attribution: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub is_hidden_from_overview: bool,
    #[serde(default)]
    pub is_hidden_from_glossary: bool,
    #[serde(default)]
    pub is_hidden_from_select: bool,
}

/// Some stored nodes carry `type` strings outside the current vocabulary;
/// an unknown value loses the type, not the whole term.
fn lenient_term_type<'de, D>(deserializer: D) -> Result<Option<TermType>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| serde_json::from_value(v).ok()))
}

impl Term {
    /// Decode a term from a node's property bag, ignoring unknown keys.
    pub fn from_properties(props: &serde_json::Map<String, Value>) -> Option<Term> {
        serde_json::from_value(Value::Object(props.clone())).ok()
    }

    /// Display name, falling back to a de-uri'd tail when the store has none.
    pub fn display_name(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        humanize_uri(&self.uri)
    }
}

/// Turn a URI tail into a lowercase human label (`.../TrophicLevel` →
/// "trophic level").
pub fn humanize_uri(uri: &str) -> String {
    let tail = uri
        .rsplit(|c| c == '/' || c == '#')
        .next()
        .unwrap_or(uri);
    let mut out = String::with_capacity(tail.len() + 4);
    let mut prev_lower = false;
    for c in tail.chars() {
        if c == '_' || c == '-' {
            out.push(' ');
            prev_lower = false;
        } else if c.is_ascii_uppercase() {
            if prev_lower {
                out.push(' ');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_ascii_lowercase();
        }
    }
    out
}
