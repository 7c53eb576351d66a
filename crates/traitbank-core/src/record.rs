//! Application-facing trait records.
//!
//! These are what the result normalizer produces from the store's tabular
//! output: one record per Trait, with its one-to-many metadata reassembled
//! into `metadata` and the generic `(info_type, info_term)` projection
//! re-tagged into `object_term` / `units`.

use serde::{Deserialize, Serialize};

use crate::term::Term;

/// A metadata qualifier attached to a trait (sex, lifestage, statistical
/// method, ...). Same value shape as a trait minus page/resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaDatum {
    #[serde(default)]
    pub measurement: Option<f64>,
    #[serde(default)]
    pub literal: Option<String>,
    #[serde(default)]
    pub predicate: Option<Term>,
    #[serde(default)]
    pub object_term: Option<Term>,
    #[serde(default)]
    pub units: Option<Term>,
}

/// One trait, flattened from the store's column-oriented result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraitRecord {
    /// Synthetic identifier `trait--<resource_id>--<resource_pk>[--<page_id>]`.
    pub id: String,
    #[serde(default)]
    pub page_id: Option<i64>,
    /// `None` when the supplier resource was not part of the projection; the
    /// synthetic id then carries the sentinel `MISSING`.
    #[serde(default)]
    pub resource_id: Option<i64>,
    #[serde(default)]
    pub resource_pk: Option<String>,
    #[serde(default)]
    pub scientific_name: Option<String>,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub lifestage: Option<String>,
    #[serde(default)]
    pub statistical_method: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub literal: Option<String>,
    #[serde(default)]
    pub measurement: Option<f64>,
    #[serde(default)]
    pub normal_measurement: Option<f64>,
    #[serde(default)]
    pub normal_units: Option<String>,
    #[serde(default)]
    pub object_page_id: Option<i64>,
    #[serde(default)]
    pub predicate: Option<Term>,
    #[serde(default)]
    pub object_term: Option<Term>,
    #[serde(default)]
    pub units: Option<Term>,
    #[serde(default)]
    pub metadata: Vec<MetaDatum>,
}

impl TraitRecord {
    /// Build the synthetic record id. Trait identity is the
    /// `(resource_id, resource_pk)` pair; page id is appended when known so
    /// the same trait shown on different pages stays distinguishable.
    pub fn synthetic_id(
        resource_id: Option<i64>,
        resource_pk: &str,
        page_id: Option<i64>,
    ) -> String {
        let resource = match resource_id {
            Some(id) => id.to_string(),
            None => "MISSING".to_string(),
        };
        match page_id {
            Some(page) => format!("trait--{resource}--{resource_pk}--{page}"),
            None => format!("trait--{resource}--{resource_pk}"),
        }
    }
}
