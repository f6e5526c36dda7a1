//! The reactive scheduler.
//!
//! One exclusive run lock serializes runs; the shared namespace and the run
//! counter live behind it. A run re-analyzes every cell, rebuilds the
//! dependency graph, orders the impacted subgraph, sweeps stale definitions,
//! and executes cells in order with failure-skip semantics, emitting events
//! along the way.

use std::collections::BTreeSet;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::Mutex;

use crate::analysis;
use crate::error::Result;
use crate::events::{EventBus, NotebookEvent};
use crate::exec::pool::{ConnectionCheck, PoolManager};
use crate::exec::{imperative, query, Outcome};
use crate::graph::{DependencyGraph, GraphDiagnostic};
use crate::model::{Cell, CellId, CellStatus, CellType, Notebook, NotebookSettings};
use crate::repo::{CellPatch, NotebookRepository};
use crate::value::Namespace;

/// State owned by the run lock: mutated only while a run (or a deletion
/// sweep) holds it.
struct RunState {
    namespace: Namespace,
    next_run_id: u64,
}

/// Orchestrates runs and repository mutations.
pub struct Scheduler {
    repo: Arc<NotebookRepository>,
    bus: EventBus,
    pools: Arc<PoolManager>,
    run: Mutex<RunState>,
}

impl Scheduler {
    pub fn new(repo: Arc<NotebookRepository>, bus: EventBus, pools: Arc<PoolManager>) -> Self {
        Self {
            repo,
            bus,
            pools,
            run: Mutex::new(RunState {
                namespace: Namespace::default(),
                next_run_id: 1,
            }),
        }
    }

    pub fn repo(&self) -> &NotebookRepository {
        &self.repo
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn pools(&self) -> &PoolManager {
        &self.pools
    }

    /// Execute the impacted subgraph of `trigger`.
    ///
    /// Returns the run id once the run has finished. Concurrent callers
    /// queue on the run lock; a newer run never preempts an older one.
    pub async fn run(&self, trigger: CellId) -> Result<u64> {
        let mut state = self.run.lock().await;
        let state = &mut *state;
        let run_id = state.next_run_id;
        state.next_run_id += 1;

        // the trigger must exist before anything is announced
        self.repo.get_cell(trigger)?;
        tracing::info!(%trigger, run_id, "run started");
        self.bus
            .publish(Some(run_id), NotebookEvent::RunStarted { cell_id: trigger });

        // refresh (defs, refs) on every cell, keeping the previous defs for
        // the stale-name sweep below
        let cells = self.repo.list_cells();
        let mut old_defs: FxHashMap<CellId, BTreeSet<String>> = FxHashMap::default();
        for cell in &cells {
            old_defs.insert(cell.id, cell.defs.clone());
            let analysis = analysis::analyze(cell.cell_type, &cell.code);
            self.repo.update_cell(
                cell.id,
                CellPatch {
                    defs: Some(analysis.defs),
                    refs: Some(analysis.refs),
                    ..Default::default()
                },
            )?;
        }

        let cells = self.repo.list_cells();
        let graph = match DependencyGraph::build(&cells) {
            Ok(graph) => graph,
            Err(diagnostics) => {
                self.report_graph_errors(run_id, diagnostics)?;
                return Ok(run_id);
            }
        };

        let impacted = graph.descendants(trigger);
        let order = match graph.topo_order(&impacted) {
            Ok(order) => order,
            Err(diagnostics) => {
                self.report_graph_errors(run_id, diagnostics)?;
                return Ok(run_id);
            }
        };
        tracing::debug!(?order, "execution order");

        // clear stale names for everything about to (re-)execute
        for id in &impacted {
            if let Some(defs) = old_defs.get(id) {
                for name in defs {
                    state.namespace.remove(name);
                }
            }
        }

        let dsn = self.repo.settings().dsn;
        let mut blocked: FxHashSet<CellId> = FxHashSet::default();
        for id in order {
            let cell = self.repo.get_cell(id)?;

            // any failed or skipped ancestor blocks this cell silently
            if graph.parents(id).iter().any(|parent| blocked.contains(parent)) {
                blocked.insert(id);
                self.repo.update_cell(
                    id,
                    CellPatch {
                        status: Some(CellStatus::Idle),
                        outputs: Some(Vec::new()),
                        error: Some(None),
                        ..Default::default()
                    },
                )?;
                self.publish_status(run_id, id, CellStatus::Idle);
                continue;
            }

            self.repo.update_cell(
                id,
                CellPatch {
                    status: Some(CellStatus::Running),
                    ..Default::default()
                },
            )?;
            self.publish_status(run_id, id, CellStatus::Running);

            let outcome = match cell.cell_type {
                CellType::Imperative => {
                    let namespace = std::mem::take(&mut state.namespace);
                    let (namespace, outcome) =
                        imperative::execute(cell.code.clone(), namespace).await;
                    state.namespace = namespace;
                    outcome
                }
                CellType::Query => match dsn.as_deref() {
                    Some(dsn) => {
                        query::execute(&self.pools, dsn, &cell.code, &state.namespace).await
                    }
                    None => Outcome::failure("no DSN configured"),
                },
            };

            match outcome.error {
                None => {
                    self.repo.update_cell(
                        id,
                        CellPatch {
                            status: Some(CellStatus::Success),
                            outputs: Some(outcome.outputs.clone()),
                            error: Some(None),
                            ..Default::default()
                        },
                    )?;
                    self.bus.publish(
                        Some(run_id),
                        NotebookEvent::CellOutput {
                            cell_id: id,
                            outputs: outcome.outputs,
                        },
                    );
                    self.publish_status(run_id, id, CellStatus::Success);
                }
                Some(message) => {
                    tracing::debug!(%id, %message, "cell failed");
                    blocked.insert(id);
                    // a failed cell contributes nothing to the namespace
                    for name in &cell.defs {
                        state.namespace.remove(name);
                    }
                    self.repo.update_cell(
                        id,
                        CellPatch {
                            status: Some(CellStatus::Error),
                            outputs: Some(Vec::new()),
                            error: Some(Some(message.clone())),
                            ..Default::default()
                        },
                    )?;
                    self.bus.publish(
                        Some(run_id),
                        NotebookEvent::CellError {
                            cell_id: id,
                            error: message,
                        },
                    );
                    self.publish_status(run_id, id, CellStatus::Error);
                }
            }
        }

        self.bus
            .publish(Some(run_id), NotebookEvent::RunFinished { cell_id: trigger });
        tracing::info!(run_id, "run finished");
        Ok(run_id)
    }

    /// Mark every cell named by duplicate-definition or cycle diagnostics.
    fn report_graph_errors(&self, run_id: u64, diagnostics: Vec<GraphDiagnostic>) -> Result<()> {
        let mut by_cell: FxHashMap<CellId, Vec<String>> = FxHashMap::default();
        for diagnostic in diagnostics {
            by_cell
                .entry(diagnostic.cell)
                .or_default()
                .push(diagnostic.message);
        }
        for (id, messages) in by_cell {
            let message = messages.join("\n");
            tracing::warn!(%id, %message, "graph error");
            self.repo.update_cell(
                id,
                CellPatch {
                    status: Some(CellStatus::Error),
                    error: Some(Some(message.clone())),
                    ..Default::default()
                },
            )?;
            self.publish_status(run_id, id, CellStatus::Error);
            self.bus.publish(
                Some(run_id),
                NotebookEvent::CellError {
                    cell_id: id,
                    error: message,
                },
            );
        }
        Ok(())
    }

    fn publish_status(&self, run_id: u64, cell_id: CellId, status: CellStatus) {
        self.bus.publish(
            Some(run_id),
            NotebookEvent::CellStatus { cell_id, status },
        );
    }

    fn publish_notebook_state(&self) {
        self.bus
            .publish(None, NotebookEvent::NotebookState(self.repo.notebook()));
    }

    /// Create a cell and announce the new notebook state.
    pub fn create_cell(&self, cell_type: CellType, code: String) -> Cell {
        let cell = self.repo.insert_cell(cell_type, code);
        self.publish_notebook_state();
        cell
    }

    /// Patch a cell's code, type, or order and announce the new state.
    pub fn update_cell(&self, id: CellId, patch: CellPatch) -> Result<Cell> {
        let cell = self.repo.update_cell(id, patch)?;
        self.publish_notebook_state();
        Ok(cell)
    }

    /// Delete a cell, dropping its last-known defs from the namespace.
    pub async fn delete_cell(&self, id: CellId) -> Result<()> {
        let mut state = self.run.lock().await;
        let removed = self.repo.delete_cell(id)?;
        for name in &removed.defs {
            state.namespace.remove(name);
        }
        drop(state);
        self.publish_notebook_state();
        Ok(())
    }

    /// Replace settings; a changed DSN invalidates its old pool.
    pub async fn save_settings(&self, settings: NotebookSettings) -> Notebook {
        let previous = self.repo.put_settings(settings.clone());
        if previous.dsn != settings.dsn {
            if let Some(old_dsn) = previous.dsn {
                self.pools.invalidate(&old_dsn).await;
            }
        }
        self.publish_notebook_state();
        self.repo.notebook()
    }

    /// Probe the configured DSN.
    pub async fn test_connection(&self) -> ConnectionCheck {
        match self.repo.settings().dsn {
            Some(dsn) => self.pools.test(&dsn).await,
            None => ConnectionCheck {
                ok: false,
                message: "no DSN configured".to_string(),
            },
        }
    }

    /// Close pooled connections; called at server shutdown.
    pub async fn shutdown(&self) {
        self.pools.close_all().await;
    }
}
