//! Precondition check results.
//!
//! Expected-invalid aggregate queries are a normal condition the immediate
//! caller branches on, so the gate returns a value instead of raising. Only
//! the top-level call boundary turns an invalid result into an error.

use serde::{Deserialize, Serialize};

/// Outcome of a stats-query precondition gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub valid: bool,
    pub reason: Option<String>,
}

impl CheckResult {
    pub fn valid() -> Self {
        CheckResult { valid: true, reason: None }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        CheckResult { valid: false, reason: Some(reason.into()) }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_carries_reason() {
        let r = CheckResult::invalid("query must have a single predicate filter");
        assert!(!r.is_valid());
        assert_eq!(r.reason.as_deref(), Some("query must have a single predicate filter"));
        assert!(CheckResult::valid().is_valid());
    }
}
