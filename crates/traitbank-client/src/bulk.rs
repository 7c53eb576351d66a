//! Windowed bulk queries streaming to disk.
//!
//! A query too large for one round trip runs as successive
//! `SKIP i*N LIMIT N` windows, strictly increasing, each appended to a
//! UTF-8 CSV file as soon as it arrives — the full result set is never
//! held in memory. The run stops when a window comes back short.
//!
//! Windows are offset-based and the run is not resumable: a fresh run
//! truncates any partial file and restarts at window zero, because a saved
//! offset cannot prove the earlier windows were produced against the same
//! graph state. Downstream set reconciliation requires a complete,
//! non-overlapping row set, so a failed window (after bounded retries)
//! fails the whole run rather than leaving a gap.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::connector::GraphConnector;
use crate::protocol::CellValue;
use crate::ClientError;

const DEFAULT_PAGE_SIZE: u32 = 10_000;
const DEFAULT_WINDOW_ATTEMPTS: u32 = 3;
const DEFAULT_WINDOW_BACKOFF: Duration = Duration::from_secs(2);

/// Executes one uncapped query as bounded sequential windows.
pub struct BulkPager<'a, C: GraphConnector> {
    connector: &'a C,
    page_size: u32,
    attempts: u32,
    backoff: Duration,
}

impl<'a, C: GraphConnector> BulkPager<'a, C> {
    pub fn new(connector: &'a C) -> Self {
        BulkPager {
            connector,
            page_size: DEFAULT_PAGE_SIZE,
            attempts: DEFAULT_WINDOW_ATTEMPTS,
            backoff: DEFAULT_WINDOW_BACKOFF,
        }
    }

    pub fn page_size(mut self, rows: u32) -> Self {
        self.page_size = rows.max(1);
        self
    }

    pub fn attempts(mut self, attempts: u32, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Run `query` to completion, streaming rows to `out_path`. The query
    /// must not carry its own SKIP/LIMIT. Returns the output path.
    pub fn run(&self, query: &str, out_path: &Path) -> Result<PathBuf, ClientError> {
        let upper = query.to_uppercase();
        if upper.contains(" LIMIT ") || upper.contains(" SKIP ") {
            return Err(ClientError::CappedQuery(query.to_string()));
        }
        let file = File::create(out_path)?;
        let mut writer = BufWriter::new(file);
        let mut header_written = false;
        let mut total_rows = 0usize;

        for window in 0u64.. {
            let windowed = format!(
                "{query} SKIP {} LIMIT {}",
                window * self.page_size as u64,
                self.page_size
            );
            let result = self.run_window(&windowed)?;
            if !header_written {
                write_csv_record(&mut writer, &result.columns)?;
                header_written = true;
            }
            for row in &result.data {
                let fields: Vec<String> = row.iter().map(cell_to_field).collect();
                write_csv_record(&mut writer, &fields)?;
            }
            writer.flush()?;
            total_rows += result.len();
            tracing::debug!(window, rows = result.len(), total_rows, "bulk window complete");
            if result.len() < self.page_size as usize {
                break;
            }
        }
        Ok(out_path.to_path_buf())
    }

    fn run_window(&self, query: &str) -> Result<crate::ResultSet, ClientError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.connector.run(query) {
                Ok(rs) => return Ok(rs),
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    tracing::warn!(attempt, error = %e, "bulk window failed; backing off");
                    thread::sleep(self.backoff);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn cell_to_field(cell: &CellValue) -> String {
    match cell {
        CellValue::Null => String::new(),
        CellValue::Scalar(v) => match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        },
        // Bulk rows should project properties, not entities; fall back to
        // the store identity so the row stays keyed.
        CellValue::Node { id, .. } | CellValue::Relationship { id, .. } => id.to_string(),
    }
}

/// Write one CSV record, quoting fields that need it.
pub fn write_csv_record<W: Write>(w: &mut W, fields: &[String]) -> std::io::Result<()> {
    let mut first = true;
    for field in fields {
        if !first {
            w.write_all(b",")?;
        }
        first = false;
        if field.contains(['"', ',', '\n', '\r']) {
            let escaped = field.replace('"', "\"\"");
            write!(w, "\"{escaped}\"")?;
        } else {
            w.write_all(field.as_bytes())?;
        }
    }
    w.write_all(b"\n")
}

/// Read a whole CSV file back, header row included.
pub fn read_csv_records(path: &Path) -> Result<Vec<Vec<String>>, ClientError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let record = parse_csv_line(&line).ok_or_else(|| ClientError::MalformedCsv {
            path: path.display().to_string(),
            line: line_no + 1,
        })?;
        records.push(record);
    }
    Ok(records)
}

fn parse_csv_line(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut in_quotes = false;
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
        } else {
            match c {
                ',' => fields.push(std::mem::take(&mut field)),
                '"' if field.is_empty() => in_quotes = true,
                '"' => return None,
                _ => field.push(c),
            }
        }
    }
    if in_quotes {
        return None;
    }
    fields.push(field);
    Some(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_fields_round_trip() {
        let fields = vec![
            "plain".to_string(),
            "with,comma".to_string(),
            "with \"quotes\"".to_string(),
            String::new(),
        ];
        let mut buf = Vec::new();
        write_csv_record(&mut buf, &fields).unwrap();
        let line = String::from_utf8(buf).unwrap();
        let parsed = parse_csv_line(line.trim_end()).unwrap();
        assert_eq!(parsed, fields);
    }

    #[test]
    fn unbalanced_quote_is_malformed() {
        assert!(parse_csv_line("a,\"b").is_none());
    }

    proptest::proptest! {
        #[test]
        fn any_newline_free_fields_round_trip(
            fields in proptest::collection::vec("[^\r\n]*", 1..8)
        ) {
            let mut buf = Vec::new();
            write_csv_record(&mut buf, &fields).unwrap();
            let line = String::from_utf8(buf).unwrap();
            let record = line.strip_suffix('\n').unwrap_or(&line);
            let parsed = parse_csv_line(record).unwrap();
            proptest::prop_assert_eq!(parsed, fields);
        }
    }
}
