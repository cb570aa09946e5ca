//! Match and transfer rule definitions
//!
//! Rules serialize with camelCase field names so the same JSON shape is
//! accepted by the HTTP control plane, job files and the C bindings.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which of the two input files a row, header list or rule refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    /// The opposite side
    pub fn other(self) -> Self {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => write!(f, "A"),
            Side::B => write!(f, "B"),
        }
    }
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "A" | "a" => Ok(Side::A),
            "B" | "b" => Ok(Side::B),
            other => Err(Error::InvalidConfig(format!(
                "side must be 'A' or 'B', got '{}'",
                other
            ))),
        }
    }
}

/// Pairs a column of file A with a column of file B for key construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRule {
    pub column_a: String,
    pub column_b: String,
    #[serde(default)]
    pub case_sensitive: bool,
}

impl MatchRule {
    /// Create a case-insensitive rule
    pub fn new(column_a: impl Into<String>, column_b: impl Into<String>) -> Self {
        Self {
            column_a: column_a.into(),
            column_b: column_b.into(),
            case_sensitive: false,
        }
    }

    /// Mark the rule as case-sensitive
    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    /// Column name used on the given side
    pub fn column(&self, side: Side) -> &str {
        match side {
            Side::A => &self.column_a,
            Side::B => &self.column_b,
        }
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.column_a, self.column_b)?;
        if self.case_sensitive {
            write!(f, " (case-sensitive)")?;
        }
        Ok(())
    }
}

/// Copies a column value from one matched row into a column of its counterpart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRule {
    pub is_source_a: bool,
    pub source_column: String,
    pub destination_column: String,
}

impl TransferRule {
    /// Copy `source` of file A into `destination` of file B
    pub fn a_to_b(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            is_source_a: true,
            source_column: source.into(),
            destination_column: destination.into(),
        }
    }

    /// Copy `source` of file B into `destination` of file A
    pub fn b_to_a(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            is_source_a: false,
            source_column: source.into(),
            destination_column: destination.into(),
        }
    }

    /// Side the value is read from
    pub fn source_side(&self) -> Side {
        if self.is_source_a {
            Side::A
        } else {
            Side::B
        }
    }
}

impl fmt::Display for TransferRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = self.source_side();
        write!(
            f,
            "{}.{} -> {}.{}",
            source,
            self.source_column,
            source.other(),
            self.destination_column
        )
    }
}

/// Rules plus probe offset for one comparison run
///
/// This is the body accepted by `/compare` and by the C bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareRequest {
    #[serde(default)]
    pub match_rules: Vec<MatchRule>,
    #[serde(default)]
    pub transfer_rules: Vec<TransferRule>,
    #[serde(default)]
    pub start_index: usize,
}

impl CompareRequest {
    /// Parse a request from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::Json)
    }
}

/// Reject rules with blank column names
pub fn validate_rules(match_rules: &[MatchRule], transfer_rules: &[TransferRule]) -> Result<()> {
    for (i, rule) in match_rules.iter().enumerate() {
        if rule.column_a.is_empty() || rule.column_b.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "match rule {} has an empty column name",
                i + 1
            )));
        }
    }
    for (i, rule) in transfer_rules.iter().enumerate() {
        if rule.source_column.is_empty() || rule.destination_column.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "transfer rule {} has an empty column name",
                i + 1
            )));
        }
    }
    Ok(())
}
