//! TraitBank domain types.
//!
//! The graph store holds five node labels and their relationships:
//!
//! - `Resource` { resource_id }
//! - `Page`: parent(Page), trait(Trait) { page_id }
//! - `Trait`: predicate(Term), supplier(Resource), metadata(MetaData),
//!   object_term(Term), units_term(Term) { resource_pk, scientific_name,
//!   statistical_method, sex, lifestage, source, measurement, object_page_id,
//!   literal, normal_measurement, normal_units }
//! - `MetaData`: predicate(Term), object_term(Term), units_term(Term)
//!   { measurement, literal }
//! - `Term`: parent_term(Term) { uri, name, type, position, definition,
//!   attribution, comment, is_hidden_from_overview, is_hidden_from_glossary,
//!   is_hidden_from_select }
//!
//! Identity rules: a Term is its URI; a Trait is its
//! `(resource_id, resource_pk)` pair. A Page has at most one `parent` edge;
//! "descendant" always means the transitive closure of `parent`.
//!
//! This crate is pure data: no I/O, no query text. The query renderer lives
//! in `traitbank-query`, the wire protocol in `traitbank-client`.

pub mod check;
pub mod filter;
pub mod record;
pub mod term;
pub mod uris;

pub use check::CheckResult;
pub use filter::{SortDir, SortField, TermFilter};
pub use record::{MetaDatum, TraitRecord};
pub use term::{Term, TermType};
