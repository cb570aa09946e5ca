//! recon-core: Core library for reconciling two delimited record files
//!
//! This library provides functionality to:
//! - Stream delimited text files row by row, keeping each original line
//! - Build composite match keys from user-defined column pairs
//! - Join file A against an in-memory index of file B
//! - Copy column values between matched rows via transfer rules
//! - Export modified and unmatched rows back to delimited text
//!
//! Runs are cancellable and report progress through explicit handles.

pub mod control;
pub mod engine;
pub mod error;
pub mod export;
pub mod job;
pub mod key;
pub mod reader;
pub mod result;
pub mod row;
pub mod rules;
pub mod service;
pub mod transfer;

pub use control::{CancellationHandle, NoProgress, ProgressHandle, ProgressObserver, ProgressSnapshot, RunPhase};
pub use engine::{JoinPlan, SourceSpec};
pub use error::{Error, Result};
pub use export::{export_rows, rows_to_string, write_rows};
pub use job::{JobFile, JobOutput};
pub use key::{build_key, KEY_DELIMITER};
pub use reader::{load_preview, Preview, RecordReader, Separator, PREVIEW_ROWS};
pub use result::{ComparisonResult, ComparisonSummary};
pub use row::Row;
pub use rules::{CompareRequest, MatchRule, Side, TransferRule};
pub use service::{ExportKind, LoadedFile, Reconciler};
pub use transfer::apply_transfer_rules;
