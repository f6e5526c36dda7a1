//! Error types for rill-core.

use thiserror::Error;

use crate::model::CellId;

/// Result type for rill-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in rill-core.
///
/// Cell-scoped execution failures (name lookup, timeout, SQL errors) are not
/// represented here; they are carried as data on the cell and delivered as
/// `cell_error` events. This enum covers infrastructure failures and lookups.
#[derive(Debug, Error)]
pub enum Error {
    /// Cell not found in the repository.
    #[error("cell not found: {0}")]
    CellNotFound(CellId),

    /// Connection pool could not be created or acquired.
    #[error("pool error: {0}")]
    Pool(String),

    /// Execution worker failed outside the cell's own code.
    #[error("execution error: {0}")]
    Execution(String),
}
