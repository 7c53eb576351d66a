//! Branch painting: propagating traits down the page hierarchy.
//!
//! A trait marked with a start directive holds on every proper descendant
//! of the start page; a stop directive retracts it from the stop page's
//! subtree. Both phases stream `(page_id, trait_pk)` rows to CSV through
//! paginated bulk queries, because a start point near the root can cover
//! millions of descendants. The net inferred set is the assert set minus
//! the retract set, diffed in memory on the distinct keys.
//!
//! Painting merges edges inline during the assert stream, which is safe
//! under a SKIP cursor because merging leaves the match set unchanged.
//! Retraction is split: the paged stream is read-only, and the deletes
//! drain the edge set afterwards in fixed-size batches anchored at offset
//! zero. A rerun converges instead of duplicating edges; `infer` runs the
//! read traversals alone for a dry run.

pub mod directives;
pub mod qc;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info, warn};

use traitbank_client::{bulk::read_csv_records, BulkPager, ClientError, GraphConnector};
use traitbank_core::uris;

pub use directives::{Directive, DirectiveKind, DirectiveRow, LoadReport};
pub use qc::QcFinding;

#[derive(Debug, Error)]
pub enum PaintError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("bad directive at line {line}: {reason}")]
    BadDirective { line: usize, reason: String },

    #[error("missing column {column} in {path}")]
    MissingKeyColumn { column: &'static str, path: String },

    #[error("malformed row {line} in {path}")]
    MalformedRow { path: String, line: usize },

    /// The retract phase failed after a completed assert phase; any stop
    /// directives that could not be resolved are carried for the operator.
    #[error("retract phase failed: {source}")]
    RetractFailed {
        source: ClientError,
        orphans: Vec<QcFinding>,
    },
}

/// Whether a stop directive retracts from the stop page itself or only
/// from its descendants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopPolicy {
    /// The stop page and everything below it.
    #[default]
    Inclusive,
    /// Descendants only; the stop page keeps the inferred trait.
    Exclusive,
}

impl StopPolicy {
    fn hops(self) -> &'static str {
        match self {
            StopPolicy::Inclusive => "*0..",
            StopPolicy::Exclusive => "*1..",
        }
    }
}

/// `(page_id, trait resource_pk)` identifying one inferred assertion.
pub type InferenceKey = (i64, String);

/// Outcome of one infer/paint run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaintSummary {
    pub asserted: usize,
    pub retracted: usize,
    /// Assert minus retract, ascending by page id then trait key.
    pub net: Vec<InferenceKey>,
}

/// The inference engine for one resource.
pub struct Painter<'a, C: GraphConnector> {
    connector: &'a C,
    resource_id: i64,
    stop_policy: StopPolicy,
    page_size: u32,
    work_dir: PathBuf,
}

impl<'a, C: GraphConnector> Painter<'a, C> {
    pub fn new(connector: &'a C, resource_id: i64, work_dir: impl Into<PathBuf>) -> Self {
        Painter {
            connector,
            resource_id,
            stop_policy: StopPolicy::default(),
            page_size: 10_000,
            work_dir: work_dir.into(),
        }
    }

    pub fn stop_policy(mut self, policy: StopPolicy) -> Self {
        self.stop_policy = policy;
        self
    }

    pub fn page_size(mut self, rows: u32) -> Self {
        self.page_size = rows;
        self
    }

    pub fn connector(&self) -> &C {
        self.connector
    }

    pub fn resource_id(&self) -> i64 {
        self.resource_id
    }

    /// Dry run: compute the net inferred set without touching the graph.
    pub fn infer(&self) -> Result<PaintSummary, PaintError> {
        self.run(false)
    }

    /// Propagate and retract for real, then report the net set.
    pub fn paint(&self) -> Result<PaintSummary, PaintError> {
        self.run(true)
    }

    fn run(&self, mutate: bool) -> Result<PaintSummary, PaintError> {
        let assert_path = self.phase_path("assert");
        let retract_path = self.phase_path("retract");
        let pager = BulkPager::new(self.connector).page_size(self.page_size);

        // Assert failure aborts outright; nothing has been reconciled yet
        // and a partial paint must not be reported.
        pager.run(&assert_query(self.resource_id, mutate), &assert_path)?;
        info!(resource = self.resource_id, mutate, "assert phase complete");

        // Deleting inside the paged traversal would shrink the match set
        // under the SKIP cursor and jump over unprocessed rows, so the
        // stream stays read-only and the deletes drain separately.
        let retract_q = retract_query(self.resource_id, self.stop_policy);
        if let Err(source) = pager.run(&retract_q, &retract_path) {
            return Err(self.retract_failed(source));
        }
        if mutate {
            if let Err(source) = self.delete_retract_set() {
                return Err(self.retract_failed(source));
            }
        }

        let asserted = load_keys(&assert_path)?;
        let retracted = load_keys(&retract_path)?;
        let net: Vec<InferenceKey> = asserted.difference(&retracted).cloned().collect();
        Ok(PaintSummary {
            asserted: asserted.len(),
            retracted: retracted.len(),
            net,
        })
    }

    fn phase_path(&self, phase: &str) -> PathBuf {
        self.work_dir
            .join(format!("paint-{}-{phase}.csv", self.resource_id))
    }

    /// Current number of inferred-trait edges for the resource.
    pub fn count(&self) -> Result<i64, PaintError> {
        let res = self.connector.run(&count_query(self.resource_id))?;
        Ok(res.single_count().unwrap_or(0))
    }

    /// Delete every inferred-trait edge for the resource. Returns how many
    /// were removed.
    pub fn clean(&self) -> Result<i64, PaintError> {
        let res = self.connector.run(&clean_query(self.resource_id))?;
        Ok(res.single_count().unwrap_or(0))
    }

    /// Drain the inferred edges under the stop pages in batches of
    /// `page_size`, until a batch comes back short.
    fn delete_retract_set(&self) -> Result<i64, ClientError> {
        let query = retract_delete_query(self.resource_id, self.stop_policy, self.page_size);
        let mut total = 0;
        loop {
            let removed = self.connector.run(&query)?.single_count().unwrap_or(0);
            total += removed;
            if removed < i64::from(self.page_size) {
                return Ok(total);
            }
        }
    }

    fn retract_failed(&self, source: ClientError) -> PaintError {
        error!(resource = self.resource_id, %source, "retract phase failed");
        let orphans = self.orphan_stops().unwrap_or_else(|e| {
            warn!(%e, "could not resolve orphan stop directives");
            Vec::new()
        });
        PaintError::RetractFailed { source, orphans }
    }

    fn orphan_stops(&self) -> Result<Vec<QcFinding>, PaintError> {
        let directives = self.directives()?;
        qc::orphan_stop_findings(self.connector, &directives)
    }
}

/// Assert-phase query: every proper descendant of each start page, per
/// trait of the resource. `mutate` adds the MERGE.
pub fn assert_query(resource_id: i64, mutate: bool) -> String {
    let merge = if mutate {
        "MERGE (d)-[:inferred_trait]->(t) "
    } else {
        ""
    };
    format!(
        "MATCH (:Resource {{ resource_id: {resource_id} }})<-[:supplier]-(t:Trait)\
         -[:metadata]->(m:MetaData)-[:predicate]->(:Term {{ uri: \"{}\" }}) \
         WITH t, toInteger(m.literal) AS start_id \
         MATCH (:Page {{ page_id: start_id }})<-[:parent*1..]-(d:Page) \
         {merge}\
         RETURN d.page_id AS page_id, t.resource_pk AS trait_pk \
         ORDER BY page_id, trait_pk",
        uris::STARTS_AT
    )
}

/// Retract-phase read query: descendants of each stop page (per policy)
/// that currently carry the inferred edge. Read-only, so the pager's
/// SKIP cursor walks a stable set.
pub fn retract_query(resource_id: i64, policy: StopPolicy) -> String {
    format!(
        "MATCH (:Resource {{ resource_id: {resource_id} }})<-[:supplier]-(t:Trait)\
         -[:metadata]->(m:MetaData)-[:predicate]->(:Term {{ uri: \"{}\" }}) \
         WITH t, toInteger(m.literal) AS stop_id \
         MATCH (:Page {{ page_id: stop_id }})<-[:parent{}]-(d:Page), \
         (d)-[:inferred_trait]->(t) \
         RETURN d.page_id AS page_id, t.resource_pk AS trait_pk \
         ORDER BY page_id, trait_pk",
        uris::STOPS_AT,
        policy.hops()
    )
}

/// Retract-phase write query: unbind one batch of inferred edges under
/// the stop pages. Anchored at offset zero; repeated runs drain the set
/// without a moving cursor.
pub fn retract_delete_query(resource_id: i64, policy: StopPolicy, batch: u32) -> String {
    format!(
        "MATCH (:Resource {{ resource_id: {resource_id} }})<-[:supplier]-(t:Trait)\
         -[:metadata]->(m:MetaData)-[:predicate]->(:Term {{ uri: \"{}\" }}) \
         WITH t, toInteger(m.literal) AS stop_id \
         MATCH (:Page {{ page_id: stop_id }})<-[:parent{}]-(d:Page), \
         (d)-[i:inferred_trait]->(t) \
         WITH i LIMIT {batch} \
         DELETE i RETURN COUNT(*) AS count",
        uris::STOPS_AT,
        policy.hops()
    )
}

pub fn count_query(resource_id: i64) -> String {
    format!(
        "MATCH (:Page)-[:inferred_trait]->(:Trait)-[:supplier]->\
         (:Resource {{ resource_id: {resource_id} }}) \
         WITH COUNT(*) AS count RETURN count"
    )
}

pub fn clean_query(resource_id: i64) -> String {
    format!(
        "MATCH (:Page)-[i:inferred_trait]->(:Trait)-[:supplier]->\
         (:Resource {{ resource_id: {resource_id} }}) \
         DELETE i RETURN COUNT(*) AS count"
    )
}

/// Load the `(page_id, trait_pk)` key set back out of a phase CSV.
fn load_keys(path: &Path) -> Result<BTreeSet<InferenceKey>, PaintError> {
    let records = read_csv_records(path)?;
    let Some(header) = records.first() else {
        return Ok(BTreeSet::new());
    };
    let col = |name: &'static str| {
        header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| PaintError::MissingKeyColumn {
                column: name,
                path: path.display().to_string(),
            })
    };
    let page_at = col("page_id")?;
    let trait_at = col("trait_pk")?;

    let mut keys = BTreeSet::new();
    for (i, record) in records.iter().enumerate().skip(1) {
        let page_id = record
            .get(page_at)
            .and_then(|f| f.parse::<i64>().ok())
            .ok_or_else(|| PaintError::MalformedRow {
                path: path.display().to_string(),
                line: i + 1,
            })?;
        let trait_pk = record
            .get(trait_at)
            .ok_or_else(|| PaintError::MalformedRow {
                path: path.display().to_string(),
                line: i + 1,
            })?;
        keys.insert((page_id, trait_pk.clone()));
    }
    Ok(keys)
}
