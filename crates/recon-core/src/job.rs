//! Job files describing a complete comparison run
//!
//! A job file is JSON:
//!
//! ```json
//! {
//!   "fileA": { "path": "clients.csv", "separator": ";" },
//!   "fileB": { "path": "accounts.csv", "separator": "," },
//!   "matchRules": [{ "columnA": "id", "columnB": "client_id" }],
//!   "transferRules": [{ "isSourceA": true, "sourceColumn": "name", "destinationColumn": "owner" }],
//!   "startIndex": 0,
//!   "output": { "results": "modified_b.csv", "notFoundInB": "missing_from_b.csv" }
//! }
//! ```

use crate::engine::{JoinPlan, SourceSpec};
use crate::error::{Error, Result};
use crate::reader::Separator;
use crate::rules::{validate_rules, MatchRule, Side, TransferRule};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Where to write the outputs of a job; every entry is optional
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutput {
    /// Modified records, written with the headers of `results_side`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<PathBuf>,
    #[serde(default = "default_results_side")]
    pub results_side: Side,
    /// Rows of A without a match in B
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_found_in_b: Option<PathBuf>,
    /// Rows of B whose key never occurs in A
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_found_in_a: Option<PathBuf>,
}

fn default_results_side() -> Side {
    Side::B
}

impl Default for JobOutput {
    fn default() -> Self {
        Self {
            results: None,
            results_side: default_results_side(),
            not_found_in_b: None,
            not_found_in_a: None,
        }
    }
}

/// A complete, self-contained comparison job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFile {
    pub file_a: SourceSpec,
    pub file_b: SourceSpec,
    #[serde(default)]
    pub match_rules: Vec<MatchRule>,
    #[serde(default)]
    pub transfer_rules: Vec<TransferRule>,
    #[serde(default)]
    pub start_index: usize,
    /// Fail on duplicate keys in B instead of fanning out
    #[serde(default)]
    pub unique_keys: bool,
    #[serde(default)]
    pub output: JobOutput,
}

impl JobFile {
    /// Load a job file from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        let job: JobFile = serde_json::from_str(&content).map_err(Error::Json)?;
        job.validate()?;
        Ok(job)
    }

    /// Save the job file to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content).map_err(|e| Error::FileWrite {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        Ok(())
    }

    /// Check the rule lists before anything is streamed
    pub fn validate(&self) -> Result<()> {
        validate_rules(&self.match_rules, &self.transfer_rules)
    }

    /// Template with placeholder paths and one rule of each kind
    pub fn template() -> Self {
        Self {
            file_a: SourceSpec::new("file_a.csv", Separator::COMMA),
            file_b: SourceSpec::new("file_b.csv", Separator::COMMA),
            match_rules: vec![MatchRule::new("id", "id")],
            transfer_rules: vec![TransferRule::a_to_b("name", "name")],
            start_index: 0,
            unique_keys: false,
            output: JobOutput {
                results: Some(PathBuf::from("results.csv")),
                results_side: Side::B,
                not_found_in_b: Some(PathBuf::from("not_found_in_b.csv")),
                not_found_in_a: Some(PathBuf::from("not_found_in_a.csv")),
            },
        }
    }

    /// The join this job describes
    pub fn plan(&self) -> JoinPlan {
        JoinPlan::new(self.file_a.clone(), self.file_b.clone())
            .with_match_rules(self.match_rules.clone())
            .with_transfer_rules(self.transfer_rules.clone())
            .with_unique_keys(self.unique_keys)
    }
}
