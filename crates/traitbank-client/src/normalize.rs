//! Flatten tabular results into trait records.
//!
//! The store returns one row per joined combination, so a trait with N
//! metadata rows arrives as N near-duplicate rows. Rows are pre-sorted by
//! the identifier column; consecutive rows sharing the identifier's
//! store-internal id collapse into one group.
//!
//! Merge rule within a group, per column: the first occurrence sets the
//! field; a differing later value promotes it to a list and further
//! differing values append; identical repeats are ignored as join fan-out.
//! Columns prefixed `meta` are the exception: metadata is structurally
//! one-to-many, so they are always lists — even with a single value, even
//! null — which also keeps the parallel `meta*` columns index-aligned.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use traitbank_core::{MetaDatum, Term, TraitRecord};

use crate::protocol::{CellValue, ResultSet};
use crate::ClientError;

/// A merged field: scalar until a second distinct value shows up.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    One(CellValue),
    Many(Vec<CellValue>),
}

impl FieldValue {
    /// View as a slice-like list regardless of representation.
    pub fn cells(&self) -> Vec<&CellValue> {
        match self {
            FieldValue::One(cell) => vec![cell],
            FieldValue::Many(cells) => cells.iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FieldValue::One(_) => 1,
            FieldValue::Many(cells) => cells.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type RowGroup = BTreeMap<String, FieldValue>;

/// Collapse rows into groups keyed by the identifier column (default
/// "trait", else the first column).
pub fn results_to_groups(
    results: &ResultSet,
    identifier: Option<&str>,
) -> Result<Vec<RowGroup>, ClientError> {
    let id_col = match identifier {
        Some(name) => results
            .column_index(name)
            .ok_or_else(|| ClientError::MissingColumn(name.to_string()))?,
        None => results.column_index("trait").unwrap_or(0),
    };
    let id_name = results
        .columns
        .get(id_col)
        .cloned()
        .unwrap_or_default();

    let mut groups: Vec<RowGroup> = Vec::new();
    let mut group: Option<RowGroup> = None;
    let mut previous_id: Option<u64> = None;

    for (row_idx, row) in results.data.iter().enumerate() {
        let row_id = row
            .get(id_col)
            .and_then(CellValue::identity)
            .ok_or_else(|| ClientError::MissingIdentifier {
                column: id_name.clone(),
                row: row_idx,
            })?;
        if previous_id != Some(row_id) {
            previous_id = Some(row_id);
            if let Some(done) = group.take() {
                groups.push(done);
            }
            group = Some(RowGroup::new());
        }
        let current = group.as_mut().unwrap();
        for (col_idx, column) in results.columns.iter().enumerate() {
            let Some(value) = row.get(col_idx) else { continue };
            merge_cell(current, column, value);
        }
    }
    if let Some(done) = group {
        groups.push(done);
    }
    Ok(groups)
}

fn merge_cell(group: &mut RowGroup, column: &str, value: &CellValue) {
    let is_meta = column.starts_with("meta");
    match group.get_mut(column) {
        Some(FieldValue::Many(list)) => {
            // Meta columns append unconditionally to stay aligned with the
            // other meta columns; everything else skips duplicate fan-out.
            if is_meta || list.last() != Some(value) {
                list.push(value.clone());
            }
        }
        Some(slot @ FieldValue::One(_)) => {
            let FieldValue::One(existing) = slot else { unreachable!() };
            if existing != value {
                let first = existing.clone();
                *slot = FieldValue::Many(vec![first, value.clone()]);
            }
        }
        None => {
            if is_meta {
                group.insert(column.to_string(), FieldValue::Many(vec![value.clone()]));
            } else if !value.is_null() {
                group.insert(column.to_string(), FieldValue::One(value.clone()));
            }
        }
    }
}

/// Normalize a trait-shaped result into application records.
pub fn build_trait_records(results: &ResultSet) -> Result<Vec<TraitRecord>, ClientError> {
    let groups = results_to_groups(results, None)?;
    groups.iter().map(record_from_group).collect()
}

/// Build one record from a merged row group.
pub fn record_from_group(group: &RowGroup) -> Result<TraitRecord, ClientError> {
    let mut rec = TraitRecord::default();

    let trait_props = single_node_properties(group, "trait");
    if let Some(props) = &trait_props {
        rec.resource_pk = prop_str(props, "resource_pk");
        rec.scientific_name = prop_str(props, "scientific_name");
        rec.sex = prop_str(props, "sex");
        rec.lifestage = prop_str(props, "lifestage");
        rec.statistical_method = prop_str(props, "statistical_method");
        rec.source = prop_str(props, "source");
        rec.literal = prop_str(props, "literal");
        rec.measurement = prop_f64(props, "measurement");
        rec.normal_measurement = prop_f64(props, "normal_measurement");
        rec.normal_units = prop_str(props, "normal_units");
        rec.object_page_id = prop_i64(props, "object_page_id");
    }
    if let Some(props) = single_node_properties(group, "page") {
        rec.page_id = prop_i64(&props, "page_id");
    }
    if let Some(props) = single_node_properties(group, "resource") {
        rec.resource_id = prop_i64(&props, "resource_id");
    }
    rec.predicate = term_field(group, "predicate");
    rec.object_term = term_field(group, "object_term");
    rec.units = term_field(group, "units");

    // The generic (info_type, info_term) projection is used when the query
    // cannot statically know which term kind it joined; re-tag by type.
    if let (Some(types), Some(terms)) = (group.get("info_type"), group.get("info_term")) {
        let terms = terms.cells();
        for (i, ty) in types.cells().iter().enumerate() {
            let Some(term) = terms.get(i).copied().and_then(term_from_cell) else { continue };
            match ty.as_str() {
                Some("object_term") => rec.object_term = Some(term),
                Some("units_term") => rec.units = Some(term),
                _ => {}
            }
        }
    }

    rec.metadata = zip_metadata(group)?;

    if let Some(pk) = &rec.resource_pk {
        rec.id = TraitRecord::synthetic_id(rec.resource_id, pk, rec.page_id);
    }
    Ok(rec)
}

/// Zip the parallel `meta*` lists into metadata sub-records, by index.
/// Null meta cells (an OPTIONAL MATCH that joined nothing) are dropped.
fn zip_metadata(group: &RowGroup) -> Result<Vec<MetaDatum>, ClientError> {
    let Some(meta) = group.get("meta") else {
        return Ok(Vec::new());
    };
    let metas = meta.cells();
    if !group.contains_key("meta_predicate") {
        return Err(ClientError::MissingColumn("meta_predicate".to_string()));
    }
    for column in ["meta_predicate", "meta_units_term", "meta_object_term"] {
        if let Some(field) = group.get(column) {
            if field.len() != metas.len() {
                return Err(ClientError::MetaShape {
                    column: column.to_string(),
                    expected: metas.len(),
                    actual: field.len(),
                });
            }
        }
    }
    let predicates = group.get("meta_predicate").map(FieldValue::cells).unwrap_or_default();
    let units = group.get("meta_units_term").map(FieldValue::cells).unwrap_or_default();
    let objects = group.get("meta_object_term").map(FieldValue::cells).unwrap_or_default();

    let mut out = Vec::new();
    for (i, cell) in metas.iter().enumerate() {
        let Some(props) = cell.properties() else { continue };
        out.push(MetaDatum {
            measurement: prop_f64(props, "measurement"),
            literal: prop_str(props, "literal"),
            predicate: predicates.get(i).copied().and_then(term_from_cell),
            units: units.get(i).copied().and_then(term_from_cell),
            object_term: objects.get(i).copied().and_then(term_from_cell),
        });
    }
    Ok(out)
}

/// Page ids from a page-list (distinct pages) result.
pub fn page_ids(results: &ResultSet) -> Result<Vec<i64>, ClientError> {
    let groups = results_to_groups(results, Some("page"))?;
    Ok(groups
        .iter()
        .filter_map(|g| single_node_properties(g, "page"))
        .filter_map(|props| prop_i64(&props, "page_id"))
        .collect())
}

fn single_node_properties(group: &RowGroup, column: &str) -> Option<Map<String, Value>> {
    match group.get(column)?.cells().first()? {
        CellValue::Node { properties, .. } => Some(properties.clone()),
        _ => None,
    }
}

fn term_field(group: &RowGroup, column: &str) -> Option<Term> {
    group.get(column)?.cells().first().copied().and_then(term_from_cell)
}

fn term_from_cell(cell: &CellValue) -> Option<Term> {
    Term::from_properties(cell.properties()?)
}

fn prop_str(props: &Map<String, Value>, key: &str) -> Option<String> {
    match props.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numeric properties sometimes arrive as strings; coerce both.
fn prop_f64(props: &Map<String, Value>, key: &str) -> Option<f64> {
    match props.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn prop_i64(props: &Map<String, Value>, key: &str) -> Option<i64> {
    match props.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn term_node(id: u64, uri: &str, name: &str) -> CellValue {
        CellValue::node(id, json!({ "uri": uri, "name": name }))
    }

    fn trait_node(id: u64, pk: &str) -> CellValue {
        CellValue::node(id, json!({ "resource_pk": pk, "literal": "blue" }))
    }

    #[test]
    fn consecutive_rows_with_same_identifier_collapse() {
        let rs = ResultSet::new(
            &["trait", "predicate"],
            vec![
                vec![trait_node(1, "a"), term_node(10, "uri:p", "color")],
                vec![trait_node(1, "a"), term_node(10, "uri:p", "color")],
                vec![trait_node(2, "b"), term_node(10, "uri:p", "color")],
            ],
        );
        let groups = results_to_groups(&rs, None).unwrap();
        assert_eq!(groups.len(), 2);
        // Identical repeat was ignored, not promoted to a list.
        assert!(matches!(groups[0].get("predicate"), Some(FieldValue::One(_))));
    }

    #[test]
    fn differing_values_promote_to_list() {
        let rs = ResultSet::new(
            &["trait", "info_type"],
            vec![
                vec![trait_node(1, "a"), CellValue::string("units_term")],
                vec![trait_node(1, "a"), CellValue::string("object_term")],
            ],
        );
        let groups = results_to_groups(&rs, None).unwrap();
        let info = groups[0].get("info_type").unwrap();
        assert_eq!(info.len(), 2);
    }

    #[test]
    fn meta_column_is_a_list_even_at_cardinality_one() {
        let rs = ResultSet::new(
            &["trait", "meta"],
            vec![vec![trait_node(1, "a"), CellValue::node(50, json!({ "literal": "male" }))]],
        );
        let groups = results_to_groups(&rs, None).unwrap();
        assert!(matches!(groups[0].get("meta"), Some(FieldValue::Many(v)) if v.len() == 1));
    }

    #[test]
    fn identifier_must_have_identity() {
        let rs = ResultSet::new(&["trait"], vec![vec![CellValue::string("oops")]]);
        let err = results_to_groups(&rs, None).unwrap_err();
        assert!(matches!(err, ClientError::MissingIdentifier { row: 0, .. }));
    }

    #[test]
    fn n_metadata_rows_yield_one_record_with_n_aligned_entries() {
        let t = || {
            CellValue::node(
                1,
                json!({ "resource_pk": "R1", "measurement": 4.0, "normal_measurement": "4.0" }),
            )
        };
        let rs = ResultSet::new(
            &["page", "trait", "resource", "predicate", "meta", "meta_predicate", "meta_units_term", "meta_object_term"],
            vec![
                vec![
                    CellValue::node(7, json!({ "page_id": 101 })),
                    t(),
                    CellValue::node(8, json!({ "resource_id": 40 })),
                    term_node(10, "uri:legs", "leg count"),
                    CellValue::node(50, json!({ "literal": "counted" })),
                    term_node(11, "uri:method", "statistical method"),
                    CellValue::Null,
                    term_node(12, "uri:direct", "direct observation"),
                ],
                vec![
                    CellValue::node(7, json!({ "page_id": 101 })),
                    t(),
                    CellValue::node(8, json!({ "resource_id": 40 })),
                    term_node(10, "uri:legs", "leg count"),
                    CellValue::node(51, json!({ "measurement": "2" })),
                    term_node(13, "uri:sample", "sample size"),
                    term_node(14, "uri:individuals", "individuals"),
                    CellValue::Null,
                ],
            ],
        );
        let records = build_trait_records(&rs).unwrap();
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.id, "trait--40--R1--101");
        assert_eq!(rec.measurement, Some(4.0));
        assert_eq!(rec.normal_measurement, Some(4.0));
        assert_eq!(rec.metadata.len(), 2);
        assert_eq!(rec.metadata[0].predicate.as_ref().unwrap().uri, "uri:method");
        assert_eq!(rec.metadata[0].object_term.as_ref().unwrap().uri, "uri:direct");
        assert!(rec.metadata[0].units.is_none());
        assert_eq!(rec.metadata[1].measurement, Some(2.0));
        assert_eq!(rec.metadata[1].units.as_ref().unwrap().uri, "uri:individuals");
    }

    #[test]
    fn info_pair_retags_object_and_units_terms() {
        let rs = ResultSet::new(
            &["trait", "info_type", "info_term"],
            vec![
                vec![trait_node(1, "a"), CellValue::string("units_term"), term_node(20, "uri:cm", "centimeters")],
                vec![trait_node(1, "a"), CellValue::string("object_term"), term_node(21, "uri:red", "red")],
            ],
        );
        let rec = &build_trait_records(&rs).unwrap()[0];
        assert_eq!(rec.units.as_ref().unwrap().uri, "uri:cm");
        assert_eq!(rec.object_term.as_ref().unwrap().uri, "uri:red");
    }

    #[test]
    fn missing_meta_predicate_column_is_fatal() {
        let rs = ResultSet::new(
            &["trait", "meta"],
            vec![vec![trait_node(1, "a"), CellValue::node(50, json!({}))]],
        );
        let err = build_trait_records(&rs).unwrap_err();
        assert!(matches!(err, ClientError::MissingColumn(c) if c == "meta_predicate"));
    }

    #[test]
    fn mismatched_parallel_meta_lengths_are_fatal() {
        let mut group = RowGroup::new();
        group.insert(
            "meta".into(),
            FieldValue::Many(vec![
                CellValue::node(1, json!({})),
                CellValue::node(2, json!({})),
            ]),
        );
        group.insert(
            "meta_predicate".into(),
            FieldValue::Many(vec![CellValue::node(3, json!({}))]),
        );
        let err = record_from_group(&group).unwrap_err();
        assert!(matches!(
            err,
            ClientError::MetaShape { expected: 2, actual: 1, .. }
        ));
    }

    #[test]
    fn page_list_results_extract_page_ids() {
        let rs = ResultSet::new(
            &["page"],
            vec![
                vec![CellValue::node(1, json!({ "page_id": 5 }))],
                vec![CellValue::node(2, json!({ "page_id": 9 }))],
            ],
        );
        assert_eq!(page_ids(&rs).unwrap(), vec![5, 9]);
    }
}
