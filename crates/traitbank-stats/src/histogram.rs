//! Measurement histograms for a numeric predicate.
//!
//! The qualifying measurements are fetched in pages, grouped by their
//! normalized units term, and bucketed per unit. Only the unit covering
//! the most records is kept so a single chart never mixes grams with
//! kilograms. Bucket boundaries snap outward onto a grid whose step grows
//! with the range magnitude, keeping the axis labels readable.

use std::collections::BTreeMap;

use tracing::debug;

use traitbank_client::GraphConnector;
use traitbank_core::TermFilter;
use traitbank_query::{quote_string, term_search::PARENT_HOPS, QuerySpec};

use crate::{check_query_valid_for_histogram, PredicateProfile, Stats, StatsError};

const MAX_BUCKETS: usize = 20;
const FETCH_PAGE: u32 = 10_000;
/// Ranges narrower than this collapse to a single bucket.
const NEAR_ZERO: f64 = 1e-9;

/// One non-empty histogram bucket. `min` is the bucket's lower bound;
/// `[min, min + width)` is its span, with the last bucket closed above.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBucket {
    pub index: usize,
    pub min: f64,
    pub width: f64,
    pub count: i64,
    pub unit: String,
}

impl<'a, C: GraphConnector> Stats<'a, C> {
    /// Bucketed distribution of normalized measurements matching the
    /// filter, for the dominant units term.
    pub fn histogram(
        &self,
        filter: &TermFilter,
        record_count: i64,
    ) -> Result<Vec<HistogramBucket>, StatsError> {
        let profile = match filter.predicate.first() {
            Some(uri) => self.predicate_profile(uri)?,
            None => PredicateProfile::default(),
        };
        let gate = check_query_valid_for_histogram(filter, &profile, record_count);
        if !gate.is_valid() {
            return Err(StatsError::InvalidQuery(gate.reason.unwrap_or_default()));
        }

        let mut by_unit: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut page = 1u32;
        loop {
            let query = measurement_query(filter, page, FETCH_PAGE)?;
            debug!(page, "histogram fetch");
            let res = self.connector().run(&query)?;
            let rows = res.data.len();
            for row in &res.data {
                let Some(value) = row.first().and_then(|c| c.as_f64()) else {
                    continue;
                };
                let unit = row
                    .get(1)
                    .and_then(|c| c.as_str())
                    .unwrap_or_default()
                    .to_string();
                by_unit.entry(unit).or_default().push(value);
            }
            if rows < FETCH_PAGE as usize {
                break;
            }
            page += 1;
        }

        Ok(dominant_unit_buckets(by_unit))
    }
}

/// One page of `(normal_measurement, normal units uri)` rows.
pub fn measurement_query(filter: &TermFilter, page: u32, per: u32) -> Result<String, StatsError> {
    let uri = filter.predicate.first().map(String::as_str).unwrap_or_default();
    let mut main = String::from("(page:Page)-[:trait|inferred_trait]->(trait:Trait)");
    if let Some(clade) = filter.clade {
        main = format!("(ancestor:Page {{ page_id: {clade} }})<-[:parent*0..]-{main}");
    }
    let mut spec = QuerySpec::new();
    spec.matching_where(main, vec!["trait.normal_measurement IS NOT NULL".into()])
        .matching(format!(
            "(trait)-[:predicate]->(:Term)-[:parent_term{PARENT_HOPS}]->(:Term {{ uri: {} }})",
            quote_string(uri)
        ))
        .optional_matching("(trait)-[:normal_units_term]->(unit:Term)")
        .returning(["trait.normal_measurement AS m", "unit.uri AS unit"]);
    spec.order.push("m".into());
    spec.page = Some(page);
    spec.per = Some(per);
    Ok(spec.render()?)
}

/// Bucket every unit group, keep the one covering the most records.
pub fn dominant_unit_buckets(by_unit: BTreeMap<String, Vec<f64>>) -> Vec<HistogramBucket> {
    let mut best: Vec<HistogramBucket> = Vec::new();
    let mut best_total = 0i64;
    for (unit, values) in by_unit {
        let buckets = build_buckets(&values, &unit);
        let total: i64 = buckets.iter().map(|b| b.count).sum();
        if total > best_total {
            best_total = total;
            best = buckets;
        }
    }
    best
}

/// Bucket one unit's values. Empty buckets are dropped; the survivors stay
/// in ascending index order.
pub fn build_buckets(values: &[f64], unit: &str) -> Vec<HistogramBucket> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max - min < NEAR_ZERO {
        let step = grid_step(0.0);
        return vec![HistogramBucket {
            index: 0,
            min: snap_down(min, step),
            width: step,
            count: values.len() as i64,
            unit: unit.to_string(),
        }];
    }

    let step = grid_step(max - min);
    let lo = snap_down(min, step);
    let hi = snap_up(max, step);
    let buckets = bucket_count(values.len());
    let width = (hi - lo) / buckets as f64;

    let mut counts = vec![0i64; buckets];
    for &v in values {
        let mut i = ((v - lo) / width) as usize;
        if i >= buckets {
            i = buckets - 1;
        }
        counts[i] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .filter(|(_, count)| *count > 0)
        .map(|(index, count)| HistogramBucket {
            index,
            min: lo + index as f64 * width,
            width,
            count,
            unit: unit.to_string(),
        })
        .collect()
}

/// `min(ceil(sqrt(n)), 20)`, never zero.
pub fn bucket_count(n: usize) -> usize {
    ((n as f64).sqrt().ceil() as usize).clamp(1, MAX_BUCKETS)
}

/// Grid step by range magnitude.
pub fn grid_step(width: f64) -> f64 {
    if width < 10.0 {
        0.1
    } else if width < 100.0 {
        1.0
    } else if width < 1000.0 {
        10.0
    } else {
        100.0
    }
}

fn snap_down(v: f64, step: f64) -> f64 {
    (v / step).floor() * step
}

fn snap_up(v: f64, step: f64) -> f64 {
    (v / step).ceil() * step
}
