//! Request and response bodies for the REST surface.

use serde::{Deserialize, Serialize};

use rill_core::{CellId, CellType};

/// Body of `POST /notebook/cells`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellCreateRequest {
    /// Cell language.
    #[serde(rename = "type")]
    pub cell_type: CellType,
    /// Initial source text.
    #[serde(default)]
    pub code: String,
}

/// Body of `PATCH /notebook/cells/{id}`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CellUpdateRequest {
    pub code: Option<String>,
    #[serde(rename = "type")]
    pub cell_type: Option<CellType>,
    pub order: Option<i64>,
}

/// Body of `PATCH /notebook/settings`; replaces settings wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub dsn: Option<String>,
}

/// Body of `POST /notebook/run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(rename = "cellId")]
    pub cell_id: CellId,
}

/// Response of `POST /notebook/run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    #[serde(rename = "runId")]
    pub run_id: u64,
}

/// Response of `POST /notebook/test-connection`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// `"success"` or `"error"`.
    pub status: String,
    pub message: String,
}

impl ConnectionStatus {
    pub fn from_check(check: rill_core::ConnectionCheck) -> Self {
        Self {
            status: if check.ok { "success" } else { "error" }.to_string(),
            message: check.message,
        }
    }
}
