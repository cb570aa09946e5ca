//! Hash join between file A (probe side) and file B (build side)
//!
//! A run moves through `Indexing(B) -> Counting(A) -> Probing(A) ->
//! ReconcilingUnmatchedB -> Done`, or stops in `Cancelled` when the
//! cancellation handle trips. B is held in memory; A is only ever streamed.
//!
//! Probing honors the start offset, but the unmatched-B pass always reads
//! A from its first row: a B row is only reported missing when its key
//! occurs nowhere in A, even if probing started later in the file.
//!
//! Source files must not change while a run reads them.

use crate::control::{CancellationHandle, ProgressObserver, RunPhase};
use crate::error::{Error, Result};
use crate::key::build_key;
use crate::reader::{RecordReader, Separator};
use crate::result::ComparisonResult;
use crate::row::Row;
use crate::rules::{validate_rules, MatchRule, Side, TransferRule};
use crate::transfer::apply_transfer_rules;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Location and separator of one input file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub path: PathBuf,
    #[serde(default)]
    pub separator: Separator,
}

impl SourceSpec {
    pub fn new(path: impl Into<PathBuf>, separator: Separator) -> Self {
        Self {
            path: path.into(),
            separator,
        }
    }

    fn open(&self) -> Result<RecordReader<std::io::BufReader<std::fs::File>>> {
        RecordReader::open(&self.path, self.separator)
    }
}

/// Owned description of one comparison run
///
/// Holds copies of the rules, so the run is unaffected by rule changes made
/// while it executes and can be moved to a worker thread.
#[derive(Debug, Clone)]
pub struct JoinPlan {
    pub file_a: SourceSpec,
    pub file_b: SourceSpec,
    pub match_rules: Vec<MatchRule>,
    pub transfer_rules: Vec<TransferRule>,
    /// Reject duplicate keys in B instead of fanning out transfers
    pub unique_keys: bool,
}

impl JoinPlan {
    pub fn new(file_a: SourceSpec, file_b: SourceSpec) -> Self {
        Self {
            file_a,
            file_b,
            match_rules: Vec::new(),
            transfer_rules: Vec::new(),
            unique_keys: false,
        }
    }

    pub fn with_match_rules(mut self, rules: Vec<MatchRule>) -> Self {
        self.match_rules = rules;
        self
    }

    pub fn with_transfer_rules(mut self, rules: Vec<TransferRule>) -> Self {
        self.transfer_rules = rules;
        self
    }

    pub fn with_unique_keys(mut self, unique: bool) -> Self {
        self.unique_keys = unique;
        self
    }

    /// Execute the run
    ///
    /// Rows of A before `start_index` are skipped while probing. IO errors
    /// abort the run; cancellation returns the partial result with
    /// `cancelled` set.
    pub fn run(
        &self,
        start_index: usize,
        cancel: &CancellationHandle,
        progress: &dyn ProgressObserver,
    ) -> Result<ComparisonResult> {
        validate_rules(&self.match_rules, &self.transfer_rules)?;
        if self.match_rules.is_empty() {
            warn!("no match rules configured, every row of A matches every row of B");
        }

        let mut run = JoinRun::new(self);
        let outcome = run.execute(start_index, cancel, progress);

        let completed = match outcome {
            Ok(completed) => completed,
            Err(e) => {
                progress.phase(RunPhase::Idle);
                return Err(e);
            }
        };

        let result = run.finish(!completed);
        if completed {
            info!(
                total_a = result.total_records_a,
                total_b = result.total_records_b,
                matched = result.match_count,
                not_found_in_a = result.not_found_in_a.len(),
                not_found_in_b = result.not_found_in_b.len(),
                "comparison finished"
            );
            progress.phase(RunPhase::Done);
        } else {
            warn!(
                processed_a = result.total_records_a,
                indexed_b = result.total_records_b,
                "comparison cancelled, returning partial result"
            );
            progress.phase(RunPhase::Cancelled);
        }
        Ok(result)
    }
}

/// In-memory B side: rows plus key -> row positions
#[derive(Default)]
struct BuildIndex {
    rows: Vec<Row>,
    by_key: HashMap<String, Vec<usize>>,
}

/// Mutable state of a single run
///
/// B rows live in `index.rows`; result lists refer to them by position so a
/// row matched several times reflects every transfer applied to it.
struct JoinRun<'a> {
    plan: &'a JoinPlan,
    index: BuildIndex,
    total_a: usize,
    total_b: usize,
    match_count: usize,
    modified: Vec<usize>,
    not_found_in_b: Vec<Row>,
    not_found_in_a: Vec<usize>,
}

impl<'a> JoinRun<'a> {
    fn new(plan: &'a JoinPlan) -> Self {
        Self {
            plan,
            index: BuildIndex::default(),
            total_a: 0,
            total_b: 0,
            match_count: 0,
            modified: Vec::new(),
            not_found_in_b: Vec::new(),
            not_found_in_a: Vec::new(),
        }
    }

    /// Run every phase in order. Returns false if cancelled.
    fn execute(
        &mut self,
        start_index: usize,
        cancel: &CancellationHandle,
        progress: &dyn ProgressObserver,
    ) -> Result<bool> {
        Ok(self.index_b(cancel, progress)?
            && self.probe_a(start_index, cancel, progress)?
            && self.reconcile_unmatched_b(cancel, progress)?)
    }

    /// Stream B fully into the key index. Returns false if cancelled.
    fn index_b(&mut self, cancel: &CancellationHandle, progress: &dyn ProgressObserver) -> Result<bool> {
        progress.phase(RunPhase::Indexing);
        debug!(path = %self.plan.file_b.path.display(), "indexing file B");

        let mut reader = self.plan.file_b.open()?;
        loop {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            let Some(row) = reader.next() else { break };
            let row = row?;

            let key = build_key(&row, Side::B, &self.plan.match_rules);
            if self.plan.unique_keys && self.index.by_key.contains_key(&key) {
                return Err(Error::DuplicateKey {
                    key,
                    index: row.index(),
                });
            }

            let position = self.index.rows.len();
            self.index.rows.push(row);
            self.index.by_key.entry(key).or_default().push(position);
            self.total_b += 1;
        }

        debug!(
            rows = self.total_b,
            keys = self.index.by_key.len(),
            "file B indexed"
        );
        Ok(true)
    }

    /// Count data rows of A for progress totals. None if cancelled.
    fn count_a(&self, cancel: &CancellationHandle, progress: &dyn ProgressObserver) -> Result<Option<usize>> {
        progress.phase(RunPhase::Counting);

        let mut reader = self.plan.file_a.open()?;
        let mut count = 0;
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            if !reader.skip_line()? {
                break;
            }
            count += 1;
        }
        Ok(Some(count))
    }

    /// Stream A from `start_index`, matching against the index. Returns false if cancelled.
    fn probe_a(
        &mut self,
        start_index: usize,
        cancel: &CancellationHandle,
        progress: &dyn ProgressObserver,
    ) -> Result<bool> {
        let Some(total) = self.count_a(cancel, progress)? else {
            return Ok(false);
        };
        let remaining = total.saturating_sub(start_index);

        progress.phase(RunPhase::Probing);
        debug!(
            path = %self.plan.file_a.path.display(),
            start_index,
            rows = total,
            "probing file A"
        );

        let mut reader = self.plan.file_a.open()?;
        reader.skip_rows(start_index)?;
        self.total_a = reader.next_index();

        loop {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            let Some(row) = reader.next() else { break };
            let mut row_a = row?;

            let key = build_key(&row_a, Side::A, &self.plan.match_rules);
            match self.index.by_key.get(&key) {
                Some(positions) => {
                    self.match_count += 1;
                    for &position in positions {
                        apply_transfer_rules(
                            &mut row_a,
                            &mut self.index.rows[position],
                            &self.plan.transfer_rules,
                        );
                        self.modified.push(position);
                    }
                }
                None => self.not_found_in_b.push(row_a),
            }

            self.total_a = reader.next_index();
            progress.report(self.total_a.saturating_sub(start_index), remaining);
        }

        Ok(true)
    }

    /// Collect every key of A, then every B row whose key is not among them.
    /// Returns false if cancelled.
    fn reconcile_unmatched_b(
        &mut self,
        cancel: &CancellationHandle,
        progress: &dyn ProgressObserver,
    ) -> Result<bool> {
        progress.phase(RunPhase::ReconcilingUnmatchedB);

        let mut keys_a: HashSet<String> = HashSet::new();
        let mut reader = self.plan.file_a.open()?;
        loop {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            let Some(row) = reader.next() else { break };
            keys_a.insert(build_key(&row?, Side::A, &self.plan.match_rules));
        }

        let mut unmatched: Vec<usize> = self
            .index
            .by_key
            .iter()
            .filter(|(key, _)| !keys_a.contains(key.as_str()))
            .flat_map(|(_, positions)| positions.iter().copied())
            .collect();
        // file order, independent of hash iteration order
        unmatched.sort_unstable();
        self.not_found_in_a = unmatched;

        Ok(true)
    }

    fn finish(self, cancelled: bool) -> ComparisonResult {
        let rows = &self.index.rows;
        ComparisonResult {
            total_records_a: self.total_a,
            total_records_b: self.total_b,
            match_count: self.match_count,
            modified_records: self.modified.iter().map(|&p| rows[p].clone()).collect(),
            not_found_in_b: self.not_found_in_b,
            not_found_in_a: self.not_found_in_a.iter().map(|&p| rows[p].clone()).collect(),
            cancelled,
            finished_at: Utc::now(),
        }
    }
}
