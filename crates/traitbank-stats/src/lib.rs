//! Statistical aggregates over trait search results.
//!
//! Both aggregate queries (object-term counts and measurement histograms)
//! share a precondition gate: exactly one predicate filter, a resolvable
//! predicate of type `measurement`, no object-term filters, no numeric or
//! range filters. The gate returns a [`CheckResult`] so callers that expect
//! invalid queries can branch; the engine entry points turn an invalid
//! result into [`StatsError::InvalidQuery`] — the request as given cannot
//! be serviced.

pub mod counts;
pub mod histogram;
pub mod obj_counts;

use thiserror::Error;
use traitbank_client::{ClientError, GraphConnector, ResultSet};
use traitbank_core::{uris, CheckResult, Term, TermFilter, TermType};
use traitbank_query::{quote_string, QueryError};

pub use counts::TermSearchCounts;
pub use histogram::HistogramBucket;
pub use obj_counts::ObjCount;

/// Clade-scoped aggregations over these many records are rejected for the
/// known-expensive predicates.
pub const RECORD_THRESHOLD: i64 = 20_000;

/// Minimum qualifying records before a histogram is worth drawing.
pub const MIN_HISTOGRAM_RECORDS: i64 = 5;

#[derive(Debug, Error)]
pub enum StatsError {
    /// The precondition gate failed; carries the gate's reason.
    #[error("invalid aggregation query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Query(#[from] QueryError),
}

/// What the gate needs to know about the predicate being aggregated.
#[derive(Debug, Clone, Default)]
pub struct PredicateProfile {
    pub term: Option<Term>,
    /// Any trait under this predicate carries a normalized measurement.
    pub has_numeric_values: bool,
    /// Records attached by a direct `trait` edge (not inherited).
    pub direct_record_count: i64,
}

/// Shared gate: a single, resolvable, measurement-typed predicate and no
/// value constraints.
pub fn check_measurement_query_common(
    filter: &TermFilter,
    profile: &PredicateProfile,
) -> CheckResult {
    if filter.predicate.len() != 1 {
        return CheckResult::invalid("query must have a single predicate filter");
    }
    let Some(term) = &profile.term else {
        return CheckResult::invalid(format!(
            "failed to retrieve a Term with uri {}",
            filter.predicate[0]
        ));
    };
    if term.term_type != Some(TermType::Measurement) {
        return CheckResult::invalid("predicate type must be 'measurement'");
    }
    if !filter.object_term.is_empty() {
        return CheckResult::invalid("query must not have any object term filters");
    }
    if filter.numeric_filter_count() > 0 {
        return CheckResult::invalid("query must not have any numeric or range filters");
    }
    CheckResult::valid()
}

pub fn check_query_valid_for_histogram(
    filter: &TermFilter,
    profile: &PredicateProfile,
    record_count: i64,
) -> CheckResult {
    let common = check_measurement_query_common(filter, profile);
    if !common.is_valid() {
        return common;
    }
    if !profile.has_numeric_values {
        return CheckResult::invalid("query predicate does not have numerical values");
    }
    if record_count < MIN_HISTOGRAM_RECORDS {
        return CheckResult::invalid(format!(
            "histogram requires at least {MIN_HISTOGRAM_RECORDS} records"
        ));
    }
    if profile.direct_record_count < 1 {
        return CheckResult::invalid("predicate has no directly-associated records");
    }
    CheckResult::valid()
}

pub fn check_query_valid_for_counts(
    filter: &TermFilter,
    profile: &PredicateProfile,
    record_count: i64,
) -> CheckResult {
    let common = check_measurement_query_common(filter, profile);
    if !common.is_valid() {
        return common;
    }
    if profile.has_numeric_values {
        return CheckResult::invalid("query predicate has numerical values");
    }
    let uri = filter.predicate[0].as_str();
    if filter.clade.is_some()
        && uris::EXPENSIVE_AGGREGATE_PREDICATES.contains(&uri)
        && record_count > RECORD_THRESHOLD
    {
        return CheckResult::invalid("count exceeds threshold for uri");
    }
    CheckResult::valid()
}

/// The aggregate engine: a connector plus the queries both paths share.
pub struct Stats<'a, C: GraphConnector> {
    connector: &'a C,
}

impl<'a, C: GraphConnector> Stats<'a, C> {
    pub fn new(connector: &'a C) -> Self {
        Stats { connector }
    }

    pub fn connector(&self) -> &C {
        self.connector
    }

    /// Look a term up by URI.
    pub fn term(&self, uri: &str) -> Result<Option<Term>, StatsError> {
        let q = format!("MATCH (term:Term {{ uri: {} }}) RETURN term", quote_string(uri));
        let res = self.connector.run(&q)?;
        Ok(first_node_term(&res))
    }

    /// Gather the gate inputs for one predicate URI.
    pub fn predicate_profile(&self, uri: &str) -> Result<PredicateProfile, StatsError> {
        let term = self.term(uri)?;
        let quoted = quote_string(uri);
        let numeric = self.connector.run(&format!(
            "MATCH (trait:Trait)-[:predicate]->(:Term {{ uri: {quoted} }}) \
             WHERE trait.normal_measurement IS NOT NULL RETURN trait LIMIT 1"
        ))?;
        let direct = self.connector.run(&format!(
            "MATCH (:Page)-[:trait]->(trait:Trait)\
             -[:predicate|parent_term*0..3]->(:Term {{ uri: {quoted} }}) \
             WITH COUNT(trait) AS count RETURN count"
        ))?;
        Ok(PredicateProfile {
            term,
            has_numeric_values: !numeric.is_empty(),
            direct_record_count: direct.single_count().unwrap_or(0),
        })
    }
}

fn first_node_term(res: &ResultSet) -> Option<Term> {
    let cell = res.data.first()?.first()?;
    Term::from_properties(cell.properties()?)
}
