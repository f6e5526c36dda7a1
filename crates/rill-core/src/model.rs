//! Domain model: cells, settings, and the notebook snapshot.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a cell, assigned on creation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CellId(Uuid);

impl CellId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CellId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for CellId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Language of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellType {
    /// Rillscript cell executed against the shared namespace.
    Imperative,
    /// SQL cell executed against the configured backend.
    Query,
}

/// Cell execution status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    /// Cell has not been executed, or was skipped.
    #[default]
    Idle,
    /// Cell is currently executing.
    Running,
    /// Cell completed successfully.
    Success,
    /// Cell failed with an error.
    Error,
}

/// A single notebook cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Unique identifier.
    pub id: CellId,
    /// Cell language.
    #[serde(rename = "type")]
    pub cell_type: CellType,
    /// Source text.
    pub code: String,
    /// Display order; `(order, id)` totally orders cells.
    pub order: i64,
    /// Status of the last execution attempt.
    #[serde(default)]
    pub status: CellStatus,
    /// Output lines from the last execution attempt.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Error message from the last attempt, if any.
    #[serde(default)]
    pub error: Option<String>,
    /// Names defined at the cell's top level.
    #[serde(default)]
    pub defs: BTreeSet<String>,
    /// Free names referenced by the cell.
    #[serde(default)]
    pub refs: BTreeSet<String>,
}

impl Cell {
    /// Create a fresh idle cell.
    pub fn new(cell_type: CellType, code: String, order: i64) -> Self {
        Self {
            id: CellId::new(),
            cell_type,
            code,
            order,
            status: CellStatus::Idle,
            outputs: Vec::new(),
            error: None,
            defs: BTreeSet::new(),
            refs: BTreeSet::new(),
        }
    }

    /// Sort key for display and tie-breaking.
    pub fn sort_key(&self) -> (i64, CellId) {
        (self.order, self.id)
    }
}

/// Notebook-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotebookSettings {
    /// Connection string for the query backend.
    #[serde(default)]
    pub dsn: Option<String>,
}

/// Snapshot of the whole notebook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    /// Notebook settings.
    pub settings: NotebookSettings,
    /// Cells ordered by `(order, id)`.
    pub cells: Vec<Cell>,
}
