//! Record and page totals for a term search.
//!
//! One query produces both counts. Page-list searches are not valid for
//! record counting, so their result carries only `page_count`; a missing
//! `record_count` column reads as zero, while a missing `page_count`
//! column is a malformed result and errors.

use std::fmt;

use traitbank_client::{ClientError, GraphConnector, ResultSet};
use traitbank_core::TermFilter;
use traitbank_query::term_search::term_search_spec;

use crate::{Stats, StatsError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSearchCounts {
    pub records: i64,
    pub pages: i64,
}

impl TermSearchCounts {
    pub fn from_results(res: &ResultSet) -> Result<Self, StatsError> {
        let pages_at = res
            .column_index("page_count")
            .ok_or_else(|| ClientError::MissingColumn("page_count".into()))?;
        let cell = |i: usize| {
            res.data
                .first()
                .and_then(|row| row.get(i))
                .and_then(|c| c.as_i64())
                .unwrap_or(0)
        };
        let records = res.column_index("record_count").map(&cell).unwrap_or(0);
        Ok(TermSearchCounts { records, pages: cell(pages_at) })
    }

    /// The count the search's return shape is measured in.
    pub fn primary(&self, filter: &TermFilter) -> i64 {
        if filter.page_list {
            self.pages
        } else {
            self.records
        }
    }
}

impl fmt::Display for TermSearchCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "records: {}, pages: {}", self.records, self.pages)
    }
}

impl<'a, C: GraphConnector> Stats<'a, C> {
    pub fn term_search_counts(&self, filter: &TermFilter) -> Result<TermSearchCounts, StatsError> {
        let res = self.connector().run(&counts_query(filter)?)?;
        TermSearchCounts::from_results(&res)
    }
}

/// The term-search query with its projection swapped for the two counts.
pub fn counts_query(filter: &TermFilter) -> Result<String, StatsError> {
    let mut counting = filter.clone();
    counting.count = true;
    let mut spec = term_search_spec(&counting);
    spec.with.clear();
    if counting.page_list {
        spec.with.push("COUNT(DISTINCT(page)) AS page_count".into());
        spec.ret = vec!["page_count".into()];
    } else {
        spec.with
            .push("COUNT(DISTINCT(trait)) AS record_count, COUNT(DISTINCT(page)) AS page_count".into());
        spec.ret = vec!["record_count".into(), "page_count".into()];
    }
    Ok(spec.render()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use traitbank_client::CellValue;

    #[test]
    fn reads_both_counts() {
        let res = ResultSet::new(
            &["record_count", "page_count"],
            vec![vec![CellValue::int(12), CellValue::int(4)]],
        );
        let counts = TermSearchCounts::from_results(&res).unwrap();
        assert_eq!(counts.records, 12);
        assert_eq!(counts.pages, 4);
    }

    #[test]
    fn missing_record_count_reads_as_zero() {
        let res = ResultSet::new(&["page_count"], vec![vec![CellValue::int(4)]]);
        let counts = TermSearchCounts::from_results(&res).unwrap();
        assert_eq!(counts.records, 0);
        assert_eq!(counts.pages, 4);
    }

    #[test]
    fn missing_page_count_is_an_error() {
        let res = ResultSet::new(&["record_count"], vec![vec![CellValue::int(4)]]);
        let err = TermSearchCounts::from_results(&res).unwrap_err();
        assert!(matches!(err, StatsError::Client(ClientError::MissingColumn(_))));
    }

    #[test]
    fn primary_count_follows_return_shape() {
        let counts = TermSearchCounts { records: 12, pages: 4 };
        assert_eq!(counts.primary(&TermFilter::default()), 12);
        let listing = TermFilter { page_list: true, ..TermFilter::default() };
        assert_eq!(counts.primary(&listing), 4);
    }

    #[test]
    fn counts_query_projects_both_totals() {
        let q = counts_query(&TermFilter::by_predicate("uri:color")).unwrap();
        assert!(q.contains(
            "WITH COUNT(DISTINCT(trait)) AS record_count, COUNT(DISTINCT(page)) AS page_count"
        ));
        assert!(q.ends_with("RETURN record_count, page_count"));
        assert!(!q.contains("LIMIT"));
    }

    #[test]
    fn page_list_counts_query_omits_record_count() {
        let listing = TermFilter { page_list: true, ..TermFilter::by_object_term("uri:red") };
        let q = counts_query(&listing).unwrap();
        assert!(q.contains("COUNT(DISTINCT(page)) AS page_count"));
        assert!(!q.contains("record_count"));
    }
}
