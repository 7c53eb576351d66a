//! Scripted connectors for tests.
//!
//! Engine-level tests script the store: each entry pairs a substring
//! pattern with the result set to return for queries containing it.
//! Unmatched queries return an empty result set (harmless for MERGE and
//! DELETE statements). Every query is logged for order assertions.

use std::sync::Mutex;

use crate::protocol::ResultSet;
use crate::{ClientError, GraphConnector};

pub struct ScriptedConnector {
    scripts: Vec<(String, ResultSet)>,
    log: Mutex<Vec<String>>,
}

impl ScriptedConnector {
    pub fn new() -> ScriptedConnector {
        ScriptedConnector { scripts: Vec::new(), log: Mutex::new(Vec::new()) }
    }

    /// Respond with `result` to any query containing `pattern`. Earlier
    /// entries win.
    pub fn on(mut self, pattern: &str, result: ResultSet) -> Self {
        self.scripts.push((pattern.to_string(), result));
        self
    }

    /// Every query run so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn queries_matching(&self, pattern: &str) -> usize {
        self.queries().iter().filter(|q| q.contains(pattern)).count()
    }
}

impl Default for ScriptedConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphConnector for ScriptedConnector {
    fn run(&self, query: &str) -> Result<ResultSet, ClientError> {
        self.log.lock().unwrap().push(query.to_string());
        for (pattern, result) in &self.scripts {
            if query.contains(pattern.as_str()) {
                return Ok(result.clone());
            }
        }
        Ok(ResultSet::empty())
    }
}

/// Wraps a connector and fails the first `n` calls with a transport error;
/// used to exercise bounded window retries.
pub struct FlakyConnector<C> {
    inner: C,
    failures_remaining: Mutex<u32>,
}

impl<C> FlakyConnector<C> {
    pub fn failing_first(inner: C, n: u32) -> FlakyConnector<C> {
        FlakyConnector { inner, failures_remaining: Mutex::new(n) }
    }
}

impl<C: GraphConnector> GraphConnector for FlakyConnector<C> {
    fn run(&self, query: &str) -> Result<ResultSet, ClientError> {
        let mut remaining = self.failures_remaining.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(ClientError::Transport("connection refused (scripted)".into()));
        }
        drop(remaining);
        self.inner.run(query)
    }
}
