//! Request and response bodies of the control plane
//!
//! Every JSON response is wrapped in [`ApiResponse`]. Field names are
//! camelCase, the shape the desktop client already speaks.

use chrono::{DateTime, Utc};
use recon_core::{RunPhase, Side};
use serde::{Deserialize, Serialize};

/// Unified response wrapper
///
/// - code: 0 = success, otherwise the HTTP status of the failure
/// - msg: short description
/// - data: payload on success
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(code: i32, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

/// `GET /`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexData {
    pub status: String,
    pub version: String,
    pub endpoints: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Query of `POST /upload`
#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    #[serde(rename = "type")]
    pub side: Option<String>,
    pub separator: Option<String>,
}

/// `POST /upload`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadData {
    pub side: Side,
    pub file_name: Option<String>,
    pub separator: String,
    pub headers: Vec<String>,
    /// First rows, values in header order
    pub preview: Vec<Vec<String>>,
}

/// Load state of one side
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideStats {
    pub loaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
    pub headers: Vec<String>,
}

/// `GET /stats`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsData {
    pub file_a: SideStats,
    pub file_b: SideStats,
    pub match_rules: usize,
    pub transfer_rules: usize,
    pub has_result: bool,
    pub running: bool,
}

/// `GET /progress`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressData {
    pub processed: usize,
    pub total: usize,
    pub phase: RunPhase,
    pub running: bool,
}

/// `POST /cancel`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelData {
    /// False when no run was active
    pub cancelled: bool,
}

/// Query of `POST /export`
#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    pub kind: Option<String>,
    pub side: Option<String>,
}
