//! Comparison results

use crate::row::Row;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one comparison run
///
/// A cancelled run still produces a result holding everything accumulated
/// up to the cancellation point; check [`cancelled`](Self::cancelled)
/// before treating the collections as complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Index after the last probed row of A (counts rows skipped by the start offset)
    pub total_records_a: usize,
    /// Rows indexed from B
    pub total_records_b: usize,
    /// Rows of A that found at least one row of B
    pub match_count: usize,
    /// Rows of B after transfer rules, one entry per (A row, B row) match
    pub modified_records: Vec<Row>,
    /// Rows of A with no matching key in B
    pub not_found_in_b: Vec<Row>,
    /// Rows of B whose key appears nowhere in A
    pub not_found_in_a: Vec<Row>,
    /// Run stopped early on request
    pub cancelled: bool,
    /// When the run finished or stopped
    pub finished_at: DateTime<Utc>,
}

impl Default for ComparisonResult {
    fn default() -> Self {
        Self {
            total_records_a: 0,
            total_records_b: 0,
            match_count: 0,
            modified_records: Vec::new(),
            not_found_in_b: Vec::new(),
            not_found_in_a: Vec::new(),
            cancelled: false,
            finished_at: Utc::now(),
        }
    }
}

impl ComparisonResult {
    /// Counts-only view of the result
    pub fn summary(&self) -> ComparisonSummary {
        ComparisonSummary {
            total_records_a: self.total_records_a,
            total_records_b: self.total_records_b,
            match_count: self.match_count,
            modified_count: self.modified_records.len(),
            not_found_in_a_count: self.not_found_in_a.len(),
            not_found_in_b_count: self.not_found_in_b.len(),
            cancelled: self.cancelled,
            finished_at: self.finished_at,
        }
    }
}

/// Counts reported to control-plane callers instead of full row dumps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonSummary {
    pub total_records_a: usize,
    pub total_records_b: usize,
    pub match_count: usize,
    pub modified_count: usize,
    pub not_found_in_a_count: usize,
    pub not_found_in_b_count: usize,
    pub cancelled: bool,
    pub finished_at: DateTime<Utc>,
}
