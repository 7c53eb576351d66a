//! Start/stop directives: the pseudo-metadata records that bound painting.
//!
//! A directive is a MetaData node whose predicate is the reserved start or
//! stop term and whose literal is a page id. Directives arrive in a
//! tab-separated file with a header row naming `page`, `stop`, `start`
//! (and optionally `comment`); `stop` and `start` carry trait resource
//! keys, either or both per row.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use traitbank_client::GraphConnector;
use traitbank_core::uris;

use crate::{PaintError, Painter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Start,
    Stop,
}

impl DirectiveKind {
    pub fn uri(self) -> &'static str {
        match self {
            DirectiveKind::Start => uris::STARTS_AT,
            DirectiveKind::Stop => uris::STOPS_AT,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            DirectiveKind::Start => "start",
            DirectiveKind::Stop => "stop",
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            uris::STARTS_AT => Some(DirectiveKind::Start),
            uris::STOPS_AT => Some(DirectiveKind::Stop),
            _ => None,
        }
    }
}

/// One directive as stored in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub page_id: i64,
    pub trait_pk: String,
    pub key: String,
}

/// One parsed line of the directives file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveRow {
    pub page_id: i64,
    pub start: Option<String>,
    pub stop: Option<String>,
}

/// Outcome of a directive-file load. Individual failures (usually a trait
/// key unknown to the resource) do not abort the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub added: usize,
    pub failed: Vec<String>,
}

/// Deterministic MetaData key so reloading a directives file merges
/// instead of duplicating.
pub fn directive_key(resource_id: i64, kind: DirectiveKind, page_id: i64, trait_pk: &str) -> String {
    format!("R{resource_id}-BP{}.{page_id}.{trait_pk}", kind.tag())
}

/// Parse the tab-separated directives file. Blank lines and `#` comments
/// are skipped; a row without a usable page id is an error.
pub fn parse_directives_tsv(text: &str) -> Result<Vec<DirectiveRow>, PaintError> {
    let mut lines = text.lines().enumerate();
    let (_, header) = lines
        .find(|(_, l)| !l.trim().is_empty())
        .ok_or(PaintError::BadDirective { line: 1, reason: "empty file".into() })?;
    let columns: Vec<&str> = header.split('\t').map(str::trim).collect();
    let col = |name: &str| columns.iter().position(|c| *c == name);
    let page_at = col("page").ok_or(PaintError::BadDirective {
        line: 1,
        reason: "header must name a 'page' column".into(),
    })?;
    let start_at = col("start");
    let stop_at = col("stop");

    let mut rows = Vec::new();
    for (i, line) in lines {
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        let page_id = fields
            .get(page_at)
            .and_then(|f| f.parse::<i64>().ok())
            .ok_or_else(|| PaintError::BadDirective {
                line: i + 1,
                reason: "page id is not an integer".into(),
            })?;
        let pick = |at: Option<usize>| {
            at.and_then(|a| fields.get(a))
                .filter(|f| !f.is_empty())
                .map(|f| f.to_string())
        };
        rows.push(DirectiveRow {
            page_id,
            start: pick(start_at),
            stop: pick(stop_at),
        });
    }
    Ok(rows)
}

/// Directive listing for one resource.
pub fn directives_query(resource_id: i64) -> String {
    format!(
        "MATCH (:Resource {{ resource_id: {resource_id} }})<-[:supplier]-(t:Trait)\
         -[:metadata]->(m:MetaData)-[:predicate]->(term:Term) \
         WHERE term.uri IN [ \"{}\", \"{}\" ] \
         RETURN term.uri AS uri, toInteger(m.literal) AS page_id, \
         t.resource_pk AS trait_pk, m.eol_pk AS key \
         ORDER BY trait_pk, page_id",
        uris::STARTS_AT,
        uris::STOPS_AT
    )
}

/// Merge one directive onto its trait. Empty result means the trait key
/// does not exist in the resource.
pub fn add_directive_query(
    resource_id: i64,
    kind: DirectiveKind,
    page_id: i64,
    trait_pk: &str,
) -> String {
    let key = directive_key(resource_id, kind, page_id, trait_pk);
    format!(
        "MATCH (t:Trait {{ resource_pk: \"{trait_pk}\" }})-[:supplier]->\
         (:Resource {{ resource_id: {resource_id} }}) \
         MERGE (term:Term {{ uri: \"{}\" }}) \
         MERGE (m:MetaData {{ eol_pk: \"{key}\" }}) \
         SET m.literal = {page_id} \
         MERGE (t)-[:metadata]->(m) \
         MERGE (m)-[:predicate]->(term) \
         RETURN m.eol_pk",
        kind.uri()
    )
}

impl<'a, C: GraphConnector> Painter<'a, C> {
    /// List the resource's current start/stop directives.
    pub fn directives(&self) -> Result<Vec<Directive>, PaintError> {
        let res = self.connector().run(&directives_query(self.resource_id()))?;
        let mut out = Vec::with_capacity(res.data.len());
        for row in &res.data {
            let kind = row
                .first()
                .and_then(|c| c.as_str())
                .and_then(DirectiveKind::from_uri);
            let page_id = row.get(1).and_then(|c| c.as_i64());
            let trait_pk = row.get(2).and_then(|c| c.as_str());
            let (Some(kind), Some(page_id), Some(trait_pk)) = (kind, page_id, trait_pk) else {
                continue;
            };
            let key = row
                .get(3)
                .and_then(|c| c.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| directive_key(self.resource_id(), kind, page_id, trait_pk));
            out.push(Directive { kind, page_id, trait_pk: trait_pk.to_string(), key });
        }
        Ok(out)
    }

    /// Load a directives file, merging one MetaData record per start/stop
    /// cell. Rows whose trait key is unknown are reported, not fatal.
    pub fn load_directives(&self, path: &Path) -> Result<LoadReport, PaintError> {
        let text = fs::read_to_string(path).map_err(traitbank_client::ClientError::from)?;
        let rows = parse_directives_tsv(&text)?;
        let mut report = LoadReport::default();
        for row in &rows {
            for (kind, pk) in [
                (DirectiveKind::Stop, &row.stop),
                (DirectiveKind::Start, &row.start),
            ] {
                let Some(trait_pk) = pk else { continue };
                let q = add_directive_query(self.resource_id(), kind, row.page_id, trait_pk);
                let res = self.connector().run(&q)?;
                let key = directive_key(self.resource_id(), kind, row.page_id, trait_pk);
                if res.is_empty() {
                    warn!(%key, "directive not added; trait key unknown in resource");
                    report.failed.push(key);
                } else {
                    debug!(%key, "directive merged");
                    report.added += 1;
                }
            }
        }
        Ok(report)
    }
}
