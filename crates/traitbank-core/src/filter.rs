//! Term-search filter specifications.
//!
//! A `TermFilter` is the value object a caller hands to the query layer: it
//! says *what* to search for (predicate/object URIs, clade, numeric bounds)
//! and *how* to return it (sort, pagination, count-only, page-list, with or
//! without metadata). The query layer compiles it; nothing here renders
//! text.

use serde::{Deserialize, Serialize};

/// Which value drives the primary sort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    /// Predicate name, then resolved object/units term name, then normalized
    /// measurement, then literal.
    #[default]
    Default,
    /// Normalized numeric measurement first.
    Measurement,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

/// A structured description of one term search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermFilter {
    /// Predicate term URI(s); matching walks up to three `parent_term` hops
    /// so a broad term also matches its descendants' traits.
    #[serde(default)]
    pub predicate: Vec<String>,
    /// Object term URI(s), matched through the same hierarchy walk.
    #[serde(default)]
    pub object_term: Vec<String>,
    /// Restrict to this page and its hierarchy descendants.
    #[serde(default)]
    pub clade: Option<i64>,
    /// Inclusive lower bound on `normal_measurement`.
    #[serde(default)]
    pub min: Option<f64>,
    /// Inclusive upper bound on `normal_measurement`.
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub sort: SortField,
    #[serde(default)]
    pub sort_dir: SortDir,
    /// 1-based page number.
    #[serde(default)]
    pub page: Option<u32>,
    /// Page size.
    #[serde(default)]
    pub per: Option<u32>,
    /// Count the results instead of returning them.
    #[serde(default)]
    pub count: bool,
    /// Return distinct pages only (species-list downloads).
    #[serde(default)]
    pub page_list: bool,
    /// Join metadata qualifiers into the projection.
    #[serde(default)]
    pub meta: bool,
}

impl TermFilter {
    pub fn by_predicate(uri: impl Into<String>) -> Self {
        TermFilter { predicate: vec![uri.into()], ..TermFilter::default() }
    }

    pub fn by_object_term(uri: impl Into<String>) -> Self {
        TermFilter { object_term: vec![uri.into()], ..TermFilter::default() }
    }

    pub fn counting(mut self) -> Self {
        self.count = true;
        self
    }

    pub fn paged(mut self, page: u32, per: u32) -> Self {
        self.page = Some(page);
        self.per = Some(per);
        self
    }

    /// How many numeric/range constraints the filter carries. The stats gate
    /// rejects any.
    pub fn numeric_filter_count(&self) -> usize {
        self.min.iter().count() + self.max.iter().count()
    }
}
