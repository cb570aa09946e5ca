//! Reconciler service: the entry point for control-plane callers
//!
//! Holds the loaded file descriptions, the active rule sets and the most
//! recent result. A run works on an owned [`JoinPlan`] snapshot, so callers
//! that must not hold the service across a long run can split it into
//! [`Reconciler::prepare`], [`JoinPlan::run`] and [`Reconciler::store_result`].

use crate::control::{CancellationHandle, ProgressObserver};
use crate::engine::{JoinPlan, SourceSpec};
use crate::error::{Error, Result};
use crate::export::{export_rows, write_rows};
use crate::job::JobFile;
use crate::reader::{load_preview, Separator, PREVIEW_ROWS};
use crate::result::ComparisonResult;
use crate::row::Row;
use crate::rules::{validate_rules, MatchRule, Side, TransferRule};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// A loaded input file: where it is, how it splits, its headers and first rows
#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub source: SourceSpec,
    pub headers: Vec<String>,
    pub preview: Vec<Row>,
}

/// Which collection of the last result to export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// Modified records
    Results,
    /// Rows of the given side that have no counterpart on the other side
    NotFound,
}

/// Service facade over reader, engine and exporter
#[derive(Debug, Default)]
pub struct Reconciler {
    file_a: Option<LoadedFile>,
    file_b: Option<LoadedFile>,
    match_rules: Vec<MatchRule>,
    transfer_rules: Vec<TransferRule>,
    unique_keys: bool,
    last_result: Option<Arc<ComparisonResult>>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure a reconciler from a job file, loading both inputs
    pub fn from_job(job: &JobFile) -> Result<Self> {
        job.validate()?;
        let mut reconciler = Self::new();
        reconciler.load_preview(Side::A, &job.file_a.path, job.file_a.separator)?;
        reconciler.load_preview(Side::B, &job.file_b.path, job.file_b.separator)?;
        reconciler.set_match_rules(job.match_rules.clone());
        reconciler.set_transfer_rules(job.transfer_rules.clone());
        reconciler.set_unique_keys(job.unique_keys);
        Ok(reconciler)
    }

    /// Load the headers and first rows of a file for `side`
    ///
    /// Replaces whatever was loaded for that side before. Returns the headers.
    pub fn load_preview<P: AsRef<Path>>(
        &mut self,
        side: Side,
        path: P,
        separator: Separator,
    ) -> Result<&[String]> {
        let path = path.as_ref();
        let preview = load_preview(path, separator, PREVIEW_ROWS)?;
        info!(
            side = %side,
            path = %path.display(),
            columns = preview.headers.len(),
            "loaded file"
        );

        let slot = self.slot_mut(side);
        *slot = Some(LoadedFile {
            source: SourceSpec::new(path, separator),
            headers: preview.headers,
            preview: preview.rows,
        });
        Ok(slot.as_ref().map(|f| f.headers.as_slice()).unwrap_or(&[]))
    }

    /// Up to `count` preview rows of a side (empty if not loaded)
    pub fn preview(&self, side: Side, count: usize) -> &[Row] {
        match self.file(side) {
            Some(file) => &file.preview[..count.min(file.preview.len())],
            None => &[],
        }
    }

    /// Headers of the last file loaded for a side (empty if not loaded)
    pub fn headers(&self, side: Side) -> &[String] {
        self.file(side).map(|f| f.headers.as_slice()).unwrap_or(&[])
    }

    /// The loaded file of a side
    pub fn file(&self, side: Side) -> Option<&LoadedFile> {
        match side {
            Side::A => self.file_a.as_ref(),
            Side::B => self.file_b.as_ref(),
        }
    }

    fn slot_mut(&mut self, side: Side) -> &mut Option<LoadedFile> {
        match side {
            Side::A => &mut self.file_a,
            Side::B => &mut self.file_b,
        }
    }

    /// Replace the match rules used by the next run
    pub fn set_match_rules(&mut self, rules: Vec<MatchRule>) {
        self.match_rules = rules;
    }

    /// Replace the transfer rules used by the next run
    pub fn set_transfer_rules(&mut self, rules: Vec<TransferRule>) {
        self.transfer_rules = rules;
    }

    /// Reject duplicate keys in B on the next run
    pub fn set_unique_keys(&mut self, unique: bool) {
        self.unique_keys = unique;
    }

    pub fn match_rules(&self) -> &[MatchRule] {
        &self.match_rules
    }

    pub fn transfer_rules(&self) -> &[TransferRule] {
        &self.transfer_rules
    }

    /// Snapshot the configuration into a plan; the previous result stays until replaced
    pub fn prepare(&mut self) -> Result<JoinPlan> {
        validate_rules(&self.match_rules, &self.transfer_rules)?;
        let file_a = self.file_a.as_ref().ok_or(Error::FileNotLoaded(Side::A))?;
        let file_b = self.file_b.as_ref().ok_or(Error::FileNotLoaded(Side::B))?;

        let plan = JoinPlan::new(file_a.source.clone(), file_b.source.clone())
            .with_match_rules(self.match_rules.clone())
            .with_transfer_rules(self.transfer_rules.clone())
            .with_unique_keys(self.unique_keys);

        Ok(plan)
    }

    /// Keep `result` for export and hand back a shared reference to it
    pub fn store_result(&mut self, result: ComparisonResult) -> Arc<ComparisonResult> {
        let result = Arc::new(result);
        self.last_result = Some(Arc::clone(&result));
        result
    }

    /// Run a full comparison with the current files and rules
    pub fn compare(
        &mut self,
        start_index: usize,
        cancel: &CancellationHandle,
        progress: &dyn ProgressObserver,
    ) -> Result<Arc<ComparisonResult>> {
        let plan = self.prepare()?;
        let result = plan.run(start_index, cancel, progress)?;
        Ok(self.store_result(result))
    }

    /// Result of the most recent completed or cancelled run
    pub fn last_result(&self) -> Option<Arc<ComparisonResult>> {
        self.last_result.clone()
    }

    /// Headers, rows and separator for an export
    fn export_parts(&self, kind: ExportKind, side: Side) -> Result<(&[String], &[Row], Separator)> {
        let result = self.last_result.as_ref().ok_or(Error::NoResult)?;
        let file = self.file(side).ok_or(Error::FileNotLoaded(side))?;
        let rows: &[Row] = match (kind, side) {
            (ExportKind::Results, _) => &result.modified_records,
            (ExportKind::NotFound, Side::A) => &result.not_found_in_b,
            (ExportKind::NotFound, Side::B) => &result.not_found_in_a,
        };
        Ok((file.headers.as_slice(), rows, file.source.separator))
    }

    /// Write an export of the last result to any writer
    pub fn write_export<W: Write>(&self, writer: W, kind: ExportKind, side: Side) -> Result<()> {
        let (headers, rows, separator) = self.export_parts(kind, side)?;
        write_rows(writer, headers, rows, separator).map_err(|e| Error::Csv {
            path: PathBuf::from("<stream>"),
            source: e,
        })
    }

    /// Export the modified records using the headers of `side`
    pub fn export_results<P: AsRef<Path>>(&self, path: P, side: Side) -> Result<()> {
        let (headers, rows, separator) = self.export_parts(ExportKind::Results, side)?;
        export_rows(path, headers, rows, separator)
    }

    /// Export the rows of `side` that were not found on the other side
    pub fn export_not_found<P: AsRef<Path>>(&self, path: P, side: Side) -> Result<()> {
        let (headers, rows, separator) = self.export_parts(ExportKind::NotFound, side)?;
        export_rows(path, headers, rows, separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::NoProgress;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_preview_keeps_headers_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.csv", "id;name\n1;a\n2;b\n3;c\n");
        let mut rec = Reconciler::new();

        let headers = rec.load_preview(Side::A, &path, Separator::SEMICOLON).unwrap().to_vec();

        assert_eq!(headers, vec!["id", "name"]);
        assert_eq!(rec.headers(Side::A), headers.as_slice());
        assert_eq!(rec.preview(Side::A, 2).len(), 2);
        assert_eq!(rec.preview(Side::A, 50).len(), 3);
        assert!(rec.headers(Side::B).is_empty());
    }

    #[test]
    fn test_compare_requires_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.csv", "id\n1\n");
        let mut rec = Reconciler::new();
        rec.load_preview(Side::A, &path, Separator::COMMA).unwrap();

        let err = rec
            .compare(0, &CancellationHandle::new(), &NoProgress)
            .unwrap_err();
        assert!(matches!(err, Error::FileNotLoaded(Side::B)));
    }

    #[test]
    fn test_export_requires_result() {
        let rec = Reconciler::new();
        let err = rec.export_results("unused.csv", Side::B).unwrap_err();
        assert!(matches!(err, Error::NoResult));
    }

    #[test]
    fn test_failed_load_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.csv", "id\n1\n");
        let mut rec = Reconciler::new();
        rec.load_preview(Side::A, &path, Separator::COMMA).unwrap();

        assert!(rec
            .load_preview(Side::A, dir.path().join("missing.csv"), Separator::COMMA)
            .is_err());
        assert_eq!(rec.headers(Side::A), &["id".to_string()]);
    }

    #[test]
    fn test_new_run_replaces_result() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.csv", "id\n1\n2\n");
        let b = write(dir.path(), "b.csv", "id\n1\n");
        let mut rec = Reconciler::new();
        rec.load_preview(Side::A, &a, Separator::COMMA).unwrap();
        rec.load_preview(Side::B, &b, Separator::COMMA).unwrap();
        rec.set_match_rules(vec![MatchRule::new("id", "id")]);

        let first = rec.compare(0, &CancellationHandle::new(), &NoProgress).unwrap();
        assert_eq!(first.match_count, 1);

        rec.set_match_rules(vec![MatchRule::new("missing", "id")]);
        let second = rec.compare(0, &CancellationHandle::new(), &NoProgress).unwrap();
        assert_eq!(second.match_count, 0);

        let last = rec.last_result().unwrap();
        assert!(Arc::ptr_eq(&last, &second));
        // the earlier snapshot is untouched
        assert_eq!(first.match_count, 1);
    }

    #[test]
    fn test_prepare_keeps_last_result() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.csv", "id\n1\n");
        let mut rec = Reconciler::new();
        rec.load_preview(Side::A, &a, Separator::COMMA).unwrap();
        rec.load_preview(Side::B, &a, Separator::COMMA).unwrap();
        let first = rec.compare(0, &CancellationHandle::new(), &NoProgress).unwrap();

        rec.prepare().unwrap();
        assert!(Arc::ptr_eq(&rec.last_result().unwrap(), &first));
    }

    #[test]
    fn test_failed_run_keeps_last_result() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.csv", "id\n1\n");
        let b = write(dir.path(), "b.csv", "id\n1\n");
        let mut rec = Reconciler::new();
        rec.load_preview(Side::A, &a, Separator::COMMA).unwrap();
        rec.load_preview(Side::B, &b, Separator::COMMA).unwrap();
        rec.set_match_rules(vec![MatchRule::new("id", "id")]);
        let first = rec.compare(0, &CancellationHandle::new(), &NoProgress).unwrap();
        let mut before = Vec::new();
        rec.write_export(&mut before, ExportKind::NotFound, Side::A).unwrap();

        std::fs::remove_file(&a).unwrap();
        assert!(rec.compare(0, &CancellationHandle::new(), &NoProgress).is_err());

        assert!(Arc::ptr_eq(&rec.last_result().unwrap(), &first));
        let mut after = Vec::new();
        rec.write_export(&mut after, ExportKind::NotFound, Side::A).unwrap();
        assert_eq!(before, after);
    }
}
