//! In-memory notebook repository.
//!
//! Single notebook, single source of truth for persisted cell fields. All
//! operations are synchronous and atomic with respect to one another; writers
//! that need cross-operation consistency serialize through the scheduler's
//! run lock.

use std::collections::BTreeSet;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::model::{Cell, CellId, CellStatus, CellType, Notebook, NotebookSettings};

/// A partial update to one cell. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct CellPatch {
    pub code: Option<String>,
    pub cell_type: Option<CellType>,
    pub order: Option<i64>,
    pub status: Option<CellStatus>,
    pub outputs: Option<Vec<String>>,
    /// `Some(None)` clears the error; `Some(Some(_))` sets it.
    pub error: Option<Option<String>>,
    pub defs: Option<BTreeSet<String>>,
    pub refs: Option<BTreeSet<String>>,
}

#[derive(Default)]
struct Inner {
    settings: NotebookSettings,
    cells: Vec<Cell>,
}

/// The in-memory repository.
#[derive(Default)]
pub struct NotebookRepository {
    inner: Mutex<Inner>,
}

impl NotebookRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of settings plus cells in `(order, id)` order.
    pub fn notebook(&self) -> Notebook {
        let inner = self.inner.lock();
        let mut cells = inner.cells.clone();
        cells.sort_by_key(Cell::sort_key);
        Notebook {
            settings: inner.settings.clone(),
            cells,
        }
    }

    /// All cells in `(order, id)` order.
    pub fn list_cells(&self) -> Vec<Cell> {
        let inner = self.inner.lock();
        let mut cells = inner.cells.clone();
        cells.sort_by_key(Cell::sort_key);
        cells
    }

    pub fn get_cell(&self, id: CellId) -> Result<Cell> {
        let inner = self.inner.lock();
        inner
            .cells
            .iter()
            .find(|cell| cell.id == id)
            .cloned()
            .ok_or(Error::CellNotFound(id))
    }

    /// Create a cell at the end of the notebook.
    pub fn insert_cell(&self, cell_type: CellType, code: String) -> Cell {
        let mut inner = self.inner.lock();
        let order = inner
            .cells
            .iter()
            .map(|cell| cell.order)
            .max()
            .map_or(0, |max| max + 1);
        let cell = Cell::new(cell_type, code, order);
        inner.cells.push(cell.clone());
        cell
    }

    pub fn update_cell(&self, id: CellId, patch: CellPatch) -> Result<Cell> {
        let mut inner = self.inner.lock();
        let cell = inner
            .cells
            .iter_mut()
            .find(|cell| cell.id == id)
            .ok_or(Error::CellNotFound(id))?;
        if let Some(code) = patch.code {
            cell.code = code;
        }
        if let Some(cell_type) = patch.cell_type {
            cell.cell_type = cell_type;
        }
        if let Some(order) = patch.order {
            cell.order = order;
        }
        if let Some(status) = patch.status {
            cell.status = status;
        }
        if let Some(outputs) = patch.outputs {
            cell.outputs = outputs;
        }
        if let Some(error) = patch.error {
            cell.error = error;
        }
        if let Some(defs) = patch.defs {
            cell.defs = defs;
        }
        if let Some(refs) = patch.refs {
            cell.refs = refs;
        }
        Ok(cell.clone())
    }

    /// Remove a cell, returning it so callers can sweep its defs.
    pub fn delete_cell(&self, id: CellId) -> Result<Cell> {
        let mut inner = self.inner.lock();
        let position = inner
            .cells
            .iter()
            .position(|cell| cell.id == id)
            .ok_or(Error::CellNotFound(id))?;
        Ok(inner.cells.remove(position))
    }

    pub fn settings(&self) -> NotebookSettings {
        self.inner.lock().settings.clone()
    }

    /// Replace settings wholesale, returning the previous value.
    pub fn put_settings(&self, settings: NotebookSettings) -> NotebookSettings {
        let mut inner = self.inner.lock();
        std::mem::replace(&mut inner.settings, settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_assigns_increasing_order() {
        let repo = NotebookRepository::new();
        let a = repo.insert_cell(CellType::Imperative, "x = 1".to_string());
        let b = repo.insert_cell(CellType::Query, "SELECT 1".to_string());
        assert_eq!(a.order, 0);
        assert_eq!(b.order, 1);
        assert_eq!(repo.list_cells().len(), 2);
    }

    #[test]
    fn test_list_sorts_by_order_then_id() {
        let repo = NotebookRepository::new();
        let a = repo.insert_cell(CellType::Imperative, String::new());
        let b = repo.insert_cell(CellType::Imperative, String::new());
        repo.update_cell(
            b.id,
            CellPatch {
                order: Some(-1),
                ..Default::default()
            },
        )
        .unwrap();
        let ids: Vec<CellId> = repo.list_cells().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[test]
    fn test_patch_updates_only_given_fields() {
        let repo = NotebookRepository::new();
        let cell = repo.insert_cell(CellType::Imperative, "x = 1".to_string());
        let updated = repo
            .update_cell(
                cell.id,
                CellPatch {
                    status: Some(CellStatus::Error),
                    error: Some(Some("boom".to_string())),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.code, "x = 1");
        assert_eq!(updated.status, CellStatus::Error);
        assert_eq!(updated.error.as_deref(), Some("boom"));

        let cleared = repo
            .update_cell(
                cell.id,
                CellPatch {
                    error: Some(None),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(cleared.error, None);
    }

    #[test]
    fn test_delete_returns_cell_and_missing_is_error() {
        let repo = NotebookRepository::new();
        let cell = repo.insert_cell(CellType::Imperative, String::new());
        let removed = repo.delete_cell(cell.id).unwrap();
        assert_eq!(removed.id, cell.id);
        assert!(matches!(
            repo.delete_cell(cell.id),
            Err(Error::CellNotFound(_))
        ));
    }

    #[test]
    fn test_settings_replace_returns_previous() {
        let repo = NotebookRepository::new();
        let old = repo.put_settings(NotebookSettings {
            dsn: Some("postgres://localhost/db".to_string()),
        });
        assert_eq!(old.dsn, None);
        assert_eq!(
            repo.settings().dsn.as_deref(),
            Some("postgres://localhost/db")
        );
    }
}
