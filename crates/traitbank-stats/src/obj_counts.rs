//! Object-term occurrence counts for a categorical predicate.
//!
//! The fetch over-requests a handful of candidates beyond the caller's
//! limit, then prunes: a candidate whose count equals an ancestor
//! candidate's count carries no extra information (every one of its traits
//! is already tallied under the broader term) and is dropped. Pruning
//! needs the term hierarchy, so a second query fetches ancestor pairs
//! among the candidates only.

use tracing::debug;

use traitbank_client::GraphConnector;
use traitbank_core::{Term, TermFilter};
use traitbank_query::{quote_string, term_search::PARENT_HOPS, QuerySpec};

use crate::{check_query_valid_for_counts, PredicateProfile, Stats, StatsError};

/// Extra candidates fetched beyond the requested limit so the ancestor
/// prune still leaves a full page.
const CANDIDATE_PAD: u32 = 5;

/// One object term and the number of matching traits carrying it (or a
/// hierarchy descendant of it).
#[derive(Debug, Clone, PartialEq)]
pub struct ObjCount {
    pub term: Term,
    pub count: i64,
}

impl<'a, C: GraphConnector> Stats<'a, C> {
    /// Top object terms for a categorical predicate, ranked by descending
    /// trait count, pruned of redundant descendants, truncated to `limit`.
    pub fn obj_counts(
        &self,
        filter: &TermFilter,
        record_count: i64,
        limit: usize,
    ) -> Result<Vec<ObjCount>, StatsError> {
        let profile = match filter.predicate.first() {
            Some(uri) => self.predicate_profile(uri)?,
            None => PredicateProfile::default(),
        };
        let gate = check_query_valid_for_counts(filter, &profile, record_count);
        if !gate.is_valid() {
            return Err(StatsError::InvalidQuery(gate.reason.unwrap_or_default()));
        }

        let query = obj_counts_query(filter, limit)?;
        debug!(%query, "object counts");
        let res = self.connector().run(&query)?;

        let mut candidates = Vec::with_capacity(res.data.len());
        for row in &res.data {
            let term = row
                .first()
                .and_then(|c| c.properties())
                .and_then(Term::from_properties);
            let count = row.get(1).and_then(|c| c.as_i64());
            if let (Some(term), Some(count)) = (term, count) {
                candidates.push(ObjCount { term, count });
            }
        }
        if candidates.len() < 2 {
            candidates.truncate(limit);
            return Ok(candidates);
        }

        let uris: Vec<&str> = candidates.iter().map(|c| c.term.uri.as_str()).collect();
        let pair_res = self.connector().run(&ancestor_pairs_query(&uris)?)?;
        let mut pairs = Vec::with_capacity(pair_res.data.len());
        for row in &pair_res.data {
            if let (Some(child), Some(anc)) = (
                row.first().and_then(|c| c.as_str()),
                row.get(1).and_then(|c| c.as_str()),
            ) {
                pairs.push((child.to_string(), anc.to_string()));
            }
        }
        Ok(prune_redundant(candidates, &pairs, limit))
    }
}

/// Candidate fetch: top `limit + pad` non-hidden object terms by count.
pub fn obj_counts_query(filter: &TermFilter, limit: usize) -> Result<String, StatsError> {
    let uri = filter.predicate.first().map(String::as_str).unwrap_or_default();
    let mut page = String::from("(page:Page)-[:trait|inferred_trait]->(trait:Trait)");
    if let Some(clade) = filter.clade {
        page = format!("(ancestor:Page {{ page_id: {clade} }})<-[:parent*0..]-{page}");
    }
    let mut spec = QuerySpec::new();
    spec.matching(page)
        .matching(format!(
            "(trait)-[:predicate]->(:Term)-[:parent_term{PARENT_HOPS}]->(:Term {{ uri: {} }})",
            quote_string(uri)
        ))
        .matching_where(
            format!("(trait)-[:object_term]->(:Term)-[:parent_term{PARENT_HOPS}]->(obj:Term)"),
            vec!["obj.is_hidden_from_select = false".into()],
        )
        .returning(["obj", "count"]);
    spec.with.push("obj, COUNT(DISTINCT trait) AS count".into());
    spec.order.push("count DESC".into());
    spec.per = Some(limit as u32 + CANDIDATE_PAD);
    Ok(spec.render()?)
}

/// Ancestor pairs among the candidate terms (proper ancestry only).
pub fn ancestor_pairs_query(uris: &[&str]) -> Result<String, StatsError> {
    let list = format!(
        "[ {} ]",
        uris.iter().map(|u| quote_string(u)).collect::<Vec<_>>().join(", ")
    );
    let mut spec = QuerySpec::new();
    spec.matching_where(
        "(child:Term)-[:parent_term*1..]->(anc:Term)",
        vec![format!("child.uri IN {list}"), format!("anc.uri IN {list}")],
    )
    .returning(["child.uri", "anc.uri"]);
    Ok(spec.render()?)
}

/// Drop any candidate whose count matches an ancestor candidate's count,
/// then truncate. Rows keep their descending-count order.
pub fn prune_redundant(
    candidates: Vec<ObjCount>,
    ancestor_pairs: &[(String, String)],
    limit: usize,
) -> Vec<ObjCount> {
    // Ties under ORDER BY count DESC arrive in arbitrary store order, so a
    // descendant may sort before its ancestor. Check each row against the
    // full candidate set: ancestry among candidates is transitive, so the
    // topmost term of an equal-count chain has no equal-count ancestor and
    // always survives.
    let counts: Vec<(&str, i64)> = candidates
        .iter()
        .map(|c| (c.term.uri.as_str(), c.count))
        .collect();
    let keep: Vec<bool> = candidates
        .iter()
        .map(|row| {
            !ancestor_pairs.iter().any(|(child, anc)| {
                *child == row.term.uri
                    && counts.iter().any(|(uri, count)| uri == anc && *count == row.count)
            })
        })
        .collect();
    let mut kept: Vec<ObjCount> = candidates
        .into_iter()
        .zip(keep)
        .filter_map(|(row, keep)| keep.then_some(row))
        .collect();
    kept.truncate(limit);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counted(uri: &str, count: i64) -> ObjCount {
        ObjCount {
            term: Term { uri: uri.into(), name: uri.into(), ..Term::default() },
            count,
        }
    }

    #[test]
    fn candidate_query_shape() {
        let filter = TermFilter::by_predicate("uri:habitat");
        let q = obj_counts_query(&filter, 10).unwrap();
        assert!(q.starts_with("MATCH (page:Page)-[:trait|inferred_trait]->(trait:Trait)"));
        assert!(q.contains("{ uri: \"uri:habitat\" }"));
        assert!(q.contains("WHERE obj.is_hidden_from_select = false"));
        assert!(q.contains("WITH obj, COUNT(DISTINCT trait) AS count"));
        assert!(q.contains("ORDER BY count DESC"));
        assert!(q.ends_with("LIMIT 15"));
    }

    #[test]
    fn candidate_query_scopes_to_clade() {
        let filter = TermFilter { clade: Some(7), ..TermFilter::by_predicate("uri:habitat") };
        let q = obj_counts_query(&filter, 10).unwrap();
        assert!(q.contains("(ancestor:Page { page_id: 7 })<-[:parent*0..]-(page:Page)"));
    }

    #[test]
    fn ancestor_query_lists_both_sides() {
        let q = ancestor_pairs_query(&["uri:a", "uri:b"]).unwrap();
        assert!(q.contains("(child:Term)-[:parent_term*1..]->(anc:Term)"));
        assert!(q.contains("child.uri IN [ \"uri:a\", \"uri:b\" ]"));
        assert!(q.contains("anc.uri IN [ \"uri:a\", \"uri:b\" ]"));
    }

    #[test]
    fn prune_drops_equal_count_descendants() {
        let rows = vec![counted("uri:marine", 40), counted("uri:deep_sea", 40), counted("uri:reef", 12)];
        let pairs = vec![
            ("uri:deep_sea".to_string(), "uri:marine".to_string()),
            ("uri:reef".to_string(), "uri:marine".to_string()),
        ];
        let kept = prune_redundant(rows, &pairs, 10);
        let uris: Vec<&str> = kept.iter().map(|c| c.term.uri.as_str()).collect();
        // deep_sea is subsumed by marine at equal count; reef's count differs.
        assert_eq!(uris, ["uri:marine", "uri:reef"]);
    }

    #[test]
    fn prune_handles_ties_in_any_store_order() {
        // Equal counts tie under ORDER BY count DESC, so the descendant can
        // arrive first; it must still lose to its ancestor.
        let rows = vec![counted("uri:deep_sea", 40), counted("uri:marine", 40)];
        let pairs = vec![("uri:deep_sea".to_string(), "uri:marine".to_string())];
        let kept = prune_redundant(rows, &pairs, 10);
        let uris: Vec<&str> = kept.iter().map(|c| c.term.uri.as_str()).collect();
        assert_eq!(uris, ["uri:marine"]);
    }

    #[test]
    fn prune_never_leaves_equal_count_ancestor_pairs() {
        let rows = vec![
            counted("uri:a", 9),
            counted("uri:b", 9),
            counted("uri:c", 9),
            counted("uri:d", 3),
        ];
        // chain: c -> b -> a
        let pairs = vec![
            ("uri:b".to_string(), "uri:a".to_string()),
            ("uri:c".to_string(), "uri:b".to_string()),
            ("uri:c".to_string(), "uri:a".to_string()),
        ];
        let kept = prune_redundant(rows, &pairs, 10);
        for x in &kept {
            for y in &kept {
                let related = pairs
                    .iter()
                    .any(|(c, a)| *c == x.term.uri && *a == y.term.uri);
                assert!(!(related && x.count == y.count), "{} left under {}", x.term.uri, y.term.uri);
            }
        }
        assert_eq!(kept.len(), 2); // a survives the chain, plus d
    }

    #[test]
    fn prune_truncates_to_limit() {
        let rows = vec![counted("uri:a", 5), counted("uri:b", 4), counted("uri:c", 3)];
        let kept = prune_redundant(rows, &[], 2);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].term.uri, "uri:a");
    }
}
