//! Read-only directive checks run before a paint.
//!
//! Findings are report output for the operator; only transport failures
//! are errors.

use std::fmt;

use traitbank_client::GraphConnector;

use crate::{Directive, DirectiveKind, PaintError, Painter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QcFinding {
    /// The directive's target page does not exist.
    MissingPage { directive: Directive },
    /// The page exists but has no parent edge, so propagation cannot
    /// traverse through it.
    NotInHierarchy { directive: Directive },
    /// A stop directive whose page descends from no start page of the
    /// same trait; it can never retract anything.
    OrphanStop { directive: Directive },
}

impl fmt::Display for QcFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QcFinding::MissingPage { directive } => write!(
                f,
                "{}({}, {}): page missing",
                directive.kind.tag(),
                directive.page_id,
                directive.trait_pk
            ),
            QcFinding::NotInHierarchy { directive } => write!(
                f,
                "{}({}, {}): page not in hierarchy",
                directive.kind.tag(),
                directive.page_id,
                directive.trait_pk
            ),
            QcFinding::OrphanStop { directive } => write!(
                f,
                "stop({}, {}): no start point above it",
                directive.page_id, directive.trait_pk
            ),
        }
    }
}

/// Does the page exist, and does it have a parent.
pub fn page_check_query(page_id: i64) -> String {
    format!(
        "MATCH (p:Page {{ page_id: {page_id} }}) \
         OPTIONAL MATCH (p)-[:parent]->(q:Page) \
         RETURN p.page_id, q.page_id"
    )
}

/// Is `descendant` strictly below `ancestor` in the page hierarchy.
pub fn descent_check_query(descendant: i64, ancestor: i64) -> String {
    format!(
        "MATCH (:Page {{ page_id: {descendant} }})-[:parent*1..]->\
         (:Page {{ page_id: {ancestor} }}) \
         WITH COUNT(*) AS count RETURN count"
    )
}

impl<'a, C: GraphConnector> Painter<'a, C> {
    /// Run every directive check. Never mutates the graph.
    pub fn qc(&self) -> Result<Vec<QcFinding>, PaintError> {
        let directives = self.directives()?;
        let mut findings = Vec::new();
        for d in &directives {
            let res = self.connector().run(&page_check_query(d.page_id))?;
            if res.is_empty() {
                findings.push(QcFinding::MissingPage { directive: d.clone() });
            } else if res.data[0].get(1).map(|c| c.is_null()).unwrap_or(true) {
                findings.push(QcFinding::NotInHierarchy { directive: d.clone() });
            }
        }
        findings.extend(orphan_stop_findings(self.connector(), &directives)?);
        Ok(findings)
    }
}

/// Stop directives that descend from no start point of the same trait.
pub fn orphan_stop_findings<C: GraphConnector>(
    connector: &C,
    directives: &[Directive],
) -> Result<Vec<QcFinding>, PaintError> {
    let mut findings = Vec::new();
    for stop in directives.iter().filter(|d| d.kind == DirectiveKind::Stop) {
        let mut reachable = false;
        for start in directives
            .iter()
            .filter(|d| d.kind == DirectiveKind::Start && d.trait_pk == stop.trait_pk)
        {
            let res = connector.run(&descent_check_query(stop.page_id, start.page_id))?;
            if res.single_count().unwrap_or(0) > 0 {
                reachable = true;
                break;
            }
        }
        if !reachable {
            findings.push(QcFinding::OrphanStop { directive: stop.clone() });
        }
    }
    Ok(findings)
}
