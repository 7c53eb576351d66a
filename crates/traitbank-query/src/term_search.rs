//! Compile a [`TermFilter`] into a [`QuerySpec`].
//!
//! Filter semantics:
//! - predicate/object-term filters walk the term hierarchy through zero to
//!   three `parent_term` hops, so filtering on a broad term also matches
//!   traits tagged with its descendants;
//! - `clade` scopes results to a page and its hierarchy descendants;
//! - `page_list` restricts the return shape to distinct pages. A page list
//!   that specifies BOTH predicates and object terms is best-effort, not an
//!   exact AND-of-ANY match: a page qualifies when it has all the object
//!   terms *somewhere*, under any predicate. Close enough for a download;
//!   do not rely on it for exact counts.

use traitbank_core::{SortDir, SortField, TermFilter};

use crate::{quote_string, QuerySpec, QueryError};

/// Number of `parent_term` hops the hierarchy walk covers.
pub const PARENT_HOPS: &str = "*0..3";

/// Build the query spec for a term search.
pub fn term_search_spec(filter: &TermFilter) -> QuerySpec {
    let mut spec = QuerySpec::new();
    spec.count = filter.count;

    if filter.page_list {
        page_list_clauses(filter, &mut spec);
    } else {
        trait_clauses(filter, &mut spec);
    }

    if filter.count {
        let distinct = if filter.page_list { "page" } else { "trait" };
        spec.with.push(format!("COUNT(DISTINCT({distinct})) AS count"));
        spec.returning(["count"]);
    } else {
        spec.page = filter.page;
        spec.per = filter.per;
        if filter.page_list {
            spec.returning(["page"]);
            spec.order.push("page.name".into());
        } else {
            spec.returning(["page", "trait", "predicate", "TYPE(info) AS info_type", "info_term", "resource"]);
            if filter.meta {
                spec.returning(["meta", "meta_predicate", "meta_units_term", "meta_object_term"]);
            }
            spec.order.extend(order_clause_array(filter));
            if filter.meta {
                spec.order.push("meta_predicate.name".into());
            }
        }
    }
    spec
}

/// Render and return the final query text.
pub fn term_search_query(filter: &TermFilter) -> Result<String, QueryError> {
    term_search_spec(filter).render()
}

fn page_list_clauses(filter: &TermFilter, spec: &mut QuerySpec) {
    let mut wheres = Vec::new();
    if let Some(clade) = filter.clade {
        wheres.push(format!("(page)-[:parent*0..]->(:Page {{ page_id: {clade} }})"));
    }
    for uri in &filter.predicate {
        wheres.push(format!(
            "(page)-[:trait]->(:Trait)-[:predicate|parent_term{PARENT_HOPS}]->(:Term {{ uri: {} }})",
            quote_string(uri)
        ));
    }
    for uri in &filter.object_term {
        wheres.push(format!(
            "(page)-[:trait]->(:Trait)-[:object_term|parent_term{PARENT_HOPS}]->(:Term {{ uri: {} }})",
            quote_string(uri)
        ));
    }
    spec.matching_where("(page:Page)", wheres);
}

fn trait_clauses(filter: &TermFilter, spec: &mut QuerySpec) {
    let mut main = String::from("(page:Page)-[:trait]->(trait:Trait)-[:supplier]->(resource:Resource)");
    if let Some(clade) = filter.clade {
        main = format!("(ancestor:Page {{ page_id: {clade} }})<-[:parent*0..]-{main}");
    }
    let mut main_wheres = Vec::new();
    if let Some(min) = filter.min {
        main_wheres.push(format!("trait.normal_measurement >= {min}"));
    }
    if let Some(max) = filter.max {
        main_wheres.push(format!("trait.normal_measurement <= {max}"));
    }
    spec.matching_where(main, main_wheres);
    spec.matching("(trait)-[:predicate]->(predicate:Term)");

    if !filter.predicate.is_empty() {
        spec.matching_where(
            format!("(trait)-[:predicate|parent_term{PARENT_HOPS}]->(p_match:Term)"),
            vec![uri_condition("p_match", &filter.predicate)],
        );
    }
    if !filter.object_term.is_empty() {
        spec.matching_where(
            format!("(trait)-[:object_term|parent_term{PARENT_HOPS}]->(o_match:Term)"),
            vec![uri_condition("o_match", &filter.object_term)],
        );
        // The matched term may be an ancestor; still project the term the
        // trait actually uses.
        spec.optional_matching("(trait)-[info:object_term]->(info_term:Term)");
    } else {
        // The query cannot know statically whether the linked term is an
        // object term or a units term; project both and re-tag downstream.
        spec.optional_matching("(trait)-[info:units_term|object_term]->(info_term:Term)");
    }

    if filter.meta {
        spec.optional_matching("(trait)-[:metadata]->(meta:MetaData)-[:predicate]->(meta_predicate:Term)");
        spec.optional_matching("(meta)-[:units_term]->(meta_units_term:Term)");
        spec.optional_matching("(meta)-[:object_term]->(meta_object_term:Term)");
    }
}

// URIs always render as string literals, escaped, whatever the caller
// passed in.
fn uri_condition(var: &str, uris: &[String]) -> String {
    let quoted: Vec<String> = uris.iter().map(|u| quote_string(u)).collect();
    if let [only] = quoted.as_slice() {
        format!("{var}.uri = {only}")
    } else {
        format!("{var}.uri IN [ {} ]", quoted.join(", "))
    }
}

/// Ordering keys for a (non page-list) term search.
///
/// Default is predicate name, resolved object/units-term name, normalized
/// measurement, literal, all case-insensitive where textual, with page name
/// as the final tie-break. A single object-term filter means every row
/// carries that term, so value ordering is suppressed.
pub fn order_clause_array(filter: &TermFilter) -> Vec<String> {
    let mut sorts: Vec<String> = if !filter.object_term.is_empty() {
        Vec::new()
    } else if filter.sort == SortField::Measurement {
        vec!["trait.normal_measurement".into()]
    } else {
        vec![
            "LOWER(predicate.name)".into(),
            "LOWER(info_term.name)".into(),
            "trait.normal_measurement".into(),
            "LOWER(trait.literal)".into(),
        ]
    };
    // Ties between traits are resolved by species name.
    sorts.push("page.name".into());
    if filter.sort_dir == SortDir::Desc {
        for sort in &mut sorts {
            sort.push_str(" DESC");
        }
    }
    sorts
}

#[cfg(test)]
mod tests {
    use super::*;
    use traitbank_core::TermFilter;

    #[test]
    fn predicate_filter_walks_term_hierarchy() {
        let filter = TermFilter::by_predicate("uri:color");
        let q = term_search_query(&filter).unwrap();
        assert!(q.contains("(trait)-[:predicate|parent_term*0..3]->(p_match:Term)"));
        assert!(q.contains("p_match.uri = \"uri:color\""));
    }

    #[test]
    fn predicate_array_renders_in_list() {
        let filter = TermFilter {
            predicate: vec!["uri:a".into(), "uri:b".into()],
            ..TermFilter::default()
        };
        let q = term_search_query(&filter).unwrap();
        assert!(q.contains("p_match.uri IN [ \"uri:a\", \"uri:b\" ]"));
    }

    #[test]
    fn filter_uris_render_as_escaped_string_literals() {
        let filter = TermFilter::by_predicate("uri:a\" OR 1=1 //");
        let q = term_search_query(&filter).unwrap();
        assert!(q.contains("p_match.uri = \"uri:a\\\" OR 1=1 //\""));

        let pages = TermFilter {
            page_list: true,
            object_term: vec!["uri:\\red".into()],
            ..TermFilter::default()
        };
        let q = term_search_query(&pages).unwrap();
        assert!(q.contains("{ uri: \"uri:\\\\red\" }"));
    }

    #[test]
    fn object_term_filter_keeps_actual_term_projection() {
        let filter = TermFilter::by_object_term("uri:red");
        let q = term_search_query(&filter).unwrap();
        assert!(q.contains("OPTIONAL MATCH (trait)-[info:object_term]->(info_term:Term)"));
        assert!(!q.contains("units_term|object_term"));
        // Single object term: no value ordering beyond the page tie-break.
        assert!(q.contains("ORDER BY page.name"));
    }

    #[test]
    fn no_object_filter_projects_generic_info_edge() {
        let filter = TermFilter::by_predicate("uri:mass");
        let q = term_search_query(&filter).unwrap();
        assert!(q.contains("OPTIONAL MATCH (trait)-[info:units_term|object_term]->(info_term:Term)"));
    }

    #[test]
    fn clade_restricts_via_hierarchy() {
        let filter = TermFilter { clade: Some(7662), ..TermFilter::by_predicate("uri:color") };
        let q = term_search_query(&filter).unwrap();
        assert!(q.starts_with("MATCH (ancestor:Page { page_id: 7662 })<-[:parent*0..]-(page:Page)"));
    }

    #[test]
    fn numeric_bounds_render_on_normal_measurement() {
        let filter = TermFilter {
            min: Some(1.5),
            max: Some(20.0),
            ..TermFilter::by_predicate("uri:mass")
        };
        let q = term_search_query(&filter).unwrap();
        assert!(q.contains("WHERE trait.normal_measurement >= 1.5 AND trait.normal_measurement <= 20"));
    }

    #[test]
    fn meta_flag_adds_optional_joins_and_order() {
        let filter = TermFilter { meta: true, ..TermFilter::by_predicate("uri:color") };
        let q = term_search_query(&filter).unwrap();
        assert!(q.contains("(trait)-[:metadata]->(meta:MetaData)-[:predicate]->(meta_predicate:Term)"));
        assert!(q.contains("meta, meta_predicate, meta_units_term, meta_object_term"));
        assert!(q.ends_with("meta_predicate.name LIMIT 50"));
    }

    #[test]
    fn count_mode_replaces_return_with_aggregate() {
        let filter = TermFilter::by_predicate("uri:color").counting();
        let q = term_search_query(&filter).unwrap();
        assert!(q.contains("WITH COUNT(DISTINCT(trait)) AS count"));
        assert!(q.contains("RETURN count"));
        assert!(!q.contains("LIMIT"));

        let pages = TermFilter { page_list: true, ..filter };
        let q = term_search_query(&pages).unwrap();
        assert!(q.contains("COUNT(DISTINCT(page)) AS count"));
    }

    #[test]
    fn page_list_returns_distinct_pages_only() {
        let filter = TermFilter {
            page_list: true,
            predicate: vec!["uri:color".into()],
            object_term: vec!["uri:red".into()],
            ..TermFilter::default()
        };
        let q = term_search_query(&filter).unwrap();
        assert!(q.contains("MATCH (page:Page) WHERE"));
        assert!(q.contains("(page)-[:trait]->(:Trait)-[:predicate|parent_term*0..3]->(:Term { uri: \"uri:color\" })"));
        assert!(q.contains("(page)-[:trait]->(:Trait)-[:object_term|parent_term*0..3]->(:Term { uri: \"uri:red\" })"));
        assert!(q.contains("RETURN page ORDER BY page.name"));
        assert!(!q.contains("resource"));
    }

    #[test]
    fn measurement_sort_leads_with_normal_measurement() {
        let filter = TermFilter {
            sort: SortField::Measurement,
            ..TermFilter::by_predicate("uri:mass")
        };
        let q = term_search_query(&filter).unwrap();
        assert!(q.contains("ORDER BY trait.normal_measurement, page.name"));
    }

    #[test]
    fn desc_reverses_every_key() {
        let filter = TermFilter {
            sort_dir: SortDir::Desc,
            ..TermFilter::by_predicate("uri:mass")
        };
        let keys = order_clause_array(&filter);
        assert!(keys.iter().all(|k| k.ends_with(" DESC")));
    }

    #[test]
    fn pagination_offsets_by_page_size() {
        let filter = TermFilter::by_predicate("uri:color").paged(2, 2);
        let q = term_search_query(&filter).unwrap();
        assert!(q.ends_with(" SKIP 2 LIMIT 2"));
    }
}
