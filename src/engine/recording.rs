//! Engine double that records statements instead of running them.
//! Failure injection is by substring so callers can target one file, one
//! chunk view or one extension.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{QueryEngine, ResultSet};
use crate::error::{AppError, AppResult};

#[derive(Default)]
pub struct RecordingEngine {
    statements: Mutex<Vec<String>>,
    failures: Mutex<Vec<String>>,
}

impl RecordingEngine {
    pub fn new() -> Self { Self::default() }

    /// Any statement containing `needle` is rejected (after being recorded).
    pub fn fail_when_contains(&self, needle: &str) { self.failures.lock().push(needle.to_string()); }

    pub fn statements(&self) -> Vec<String> { self.statements.lock().clone() }

    pub fn clear(&self) { self.statements.lock().clear(); }

    /// Statements beginning with `prefix`, in order.
    pub fn statements_starting_with(&self, prefix: &str) -> Vec<String> {
        self.statements.lock().iter().filter(|s| s.starts_with(prefix)).cloned().collect()
    }
}

#[async_trait]
impl QueryEngine for RecordingEngine {
    async fn execute(&self, sql: &str) -> AppResult<ResultSet> {
        self.statements.lock().push(sql.to_string());
        let rejected = self.failures.lock().iter().any(|n| sql.contains(n.as_str()));
        if rejected {
            return Err(AppError::query("engine_error", format!("rejected: {}", sql)));
        }
        Ok(ResultSet::empty())
    }
}
