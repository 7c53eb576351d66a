//! Reserved term URIs.
//!
//! `STARTS_AT` / `STOPS_AT` mark branch-painting directives: a MetaData
//! record whose predicate is one of these URIs and whose literal value is a
//! page id is a propagation boundary for its owning Trait, not real
//! measurement metadata.

/// Predicate URI of a "start painting here" directive.
pub const STARTS_AT: &str = "https://eol.org/schema/terms/starts_at";

/// Predicate URI of a "stop painting here" directive.
pub const STOPS_AT: &str = "https://eol.org/schema/terms/stops_at";

/// Predicates whose unfiltered clade-scoped aggregations are known to be
/// expensive; object-count queries over these are rejected above a record
/// ceiling.
pub const EXPENSIVE_AGGREGATE_PREDICATES: &[&str] = &[
    "https://eol.org/schema/terms/habitat_includes",
    "https://eol.org/schema/terms/geographic_distribution",
    "https://eol.org/schema/terms/trophic_level",
    "https://eol.org/schema/terms/ecoregion",
];
