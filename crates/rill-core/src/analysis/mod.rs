//! Symbolic analysis of cell bodies.
//!
//! Given a cell's source, the analyzers return the names the cell defines in
//! the shared namespace and the free names it references. Both are pure
//! functions of the source text; the scheduler re-runs them on every cell at
//! the start of each run.

pub mod imperative;
pub mod query;

use std::collections::BTreeSet;

use crate::model::CellType;

/// The `(defs, refs)` pair extracted from one cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Analysis {
    /// Names the cell introduces at top level.
    pub defs: BTreeSet<String>,
    /// Free names the cell reads.
    pub refs: BTreeSet<String>,
}

/// Analyze a cell body according to its language.
pub fn analyze(cell_type: CellType, code: &str) -> Analysis {
    match cell_type {
        CellType::Imperative => imperative::analyze(code),
        CellType::Query => query::analyze(code),
    }
}
