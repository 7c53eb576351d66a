//! Graph store client: wire protocol, normalization, bulk pagination.
//!
//! The store speaks request/response over HTTP/JSON: a request carries one
//! query string (plus auth token); a response carries
//! `{ columns: [..], data: [[cell, ..], ..] }` where each cell is either a
//! scalar or a wrapped node/relationship object. Cells are decoded into a
//! tagged [`CellValue`] exactly once, at this boundary; nothing downstream
//! touches raw JSON.
//!
//! Design constraints:
//! - No global connection state: callers own a connector value and inject
//!   it into every component. Lifecycle and retry policy are configured
//!   once, at construction.
//! - Single-threaded, blocking, run-to-completion. The only suspension
//!   point is the network round trip.
//! - Transport failures get exactly one immediate connector-level retry
//!   with a fixed short delay; bulk windows add a bounded outer retry.

pub mod bulk;
pub mod connector;
pub mod mock;
pub mod normalize;
pub mod protocol;

pub use bulk::BulkPager;
pub use connector::{GraphConnector, HttpConnector};
pub use mock::ScriptedConnector;
pub use protocol::{CellValue, ResultSet};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket-level failure or timeout; retried once before surfacing.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("server returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode result set: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid server url: {0}")]
    BadUrl(String),

    /// Programmer error: the query was built without a column the caller
    /// depends on.
    #[error("expected result column \"{0}\" is missing")]
    MissingColumn(String),

    /// Programmer error: the identifier column held a cell with no
    /// store-internal identity.
    #[error("row {row} has no identifier in column \"{column}\"")]
    MissingIdentifier { column: String, row: usize },

    /// Programmer error: a parallel metadata column disagrees with the
    /// length of the `meta` column.
    #[error("column \"{column}\" has {actual} values where meta has {expected}")]
    MetaShape { column: String, expected: usize, actual: usize },

    /// The bulk pager owns SKIP/LIMIT; a pre-capped query would silently
    /// truncate the run.
    #[error("bulk query must not carry its own SKIP/LIMIT: {0}")]
    CappedQuery(String),

    #[error("malformed csv at {path}, line {line}")]
    MalformedCsv { path: String, line: usize },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Whether a bulk window may retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(_) | ClientError::Status { status: 500..=599, .. }
        )
    }
}
