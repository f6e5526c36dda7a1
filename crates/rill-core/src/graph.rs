//! Cell dependency graph.
//!
//! Built fresh for every run from the cells' `(defs, refs)`. An edge `A → B`
//! means B references a name A defines. Duplicate definitions are rejected at
//! build time; cycles are rejected when ordering the impacted set. Both are
//! reported per cell so the scheduler can mark every participant.

use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::FxHashMap;
use std::collections::{BTreeSet, VecDeque};

use crate::model::{Cell, CellId};

/// A per-cell diagnostic raised during graph construction or ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphDiagnostic {
    pub cell: CellId,
    pub message: String,
}

/// The dependency graph over the current notebook, rebuilt per run.
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<CellId, ()>,
    nodes: FxHashMap<CellId, NodeIndex>,
    /// Display order per cell, for deterministic tie-breaking.
    orders: FxHashMap<CellId, i64>,
}

impl DependencyGraph {
    /// Build the graph from analyzed cells.
    ///
    /// A name defined by two or more cells is a duplicate-definition error;
    /// every colliding cell receives a diagnostic naming the peers.
    /// References with no defining cell are allowed and surface at execution
    /// time instead.
    pub fn build(cells: &[Cell]) -> Result<Self, Vec<GraphDiagnostic>> {
        let mut graph = DiGraph::new();
        let mut nodes = FxHashMap::default();
        let mut orders = FxHashMap::default();
        for cell in cells {
            let index = graph.add_node(cell.id);
            nodes.insert(cell.id, index);
            orders.insert(cell.id, cell.order);
        }

        let mut defined_by: FxHashMap<&str, Vec<&Cell>> = FxHashMap::default();
        for cell in cells {
            for name in &cell.defs {
                defined_by.entry(name).or_default().push(cell);
            }
        }

        let mut diagnostics = Vec::new();
        for cell in cells {
            for name in &cell.defs {
                let owners = &defined_by[name.as_str()];
                if owners.len() > 1 {
                    let peers: Vec<String> = owners
                        .iter()
                        .filter(|peer| peer.id != cell.id)
                        .map(|peer| peer.id.to_string())
                        .collect();
                    diagnostics.push(GraphDiagnostic {
                        cell: cell.id,
                        message: format!(
                            "duplicate definition of '{}' with cell {}",
                            name,
                            peers.join(", ")
                        ),
                    });
                }
            }
        }
        if !diagnostics.is_empty() {
            return Err(diagnostics);
        }

        for cell in cells {
            for name in &cell.refs {
                if let Some(owners) = defined_by.get(name.as_str()) {
                    let upstream = owners[0];
                    if upstream.id != cell.id {
                        // update_edge keeps the graph simple when two names
                        // share the same producer/consumer pair
                        graph.update_edge(nodes[&upstream.id], nodes[&cell.id], ());
                    }
                }
            }
        }

        Ok(Self {
            graph,
            nodes,
            orders,
        })
    }

    /// The trigger cell plus every transitive dependent, unordered.
    pub fn descendants(&self, root: CellId) -> Vec<CellId> {
        let Some(&start) = self.nodes.get(&root) else {
            return Vec::new();
        };
        let mut seen = BTreeSet::from([root]);
        let mut queue = VecDeque::from([start]);
        while let Some(index) = queue.pop_front() {
            for neighbor in self.graph.neighbors(index) {
                let id = self.graph[neighbor];
                if seen.insert(id) {
                    queue.push_back(neighbor);
                }
            }
        }
        seen.into_iter().collect()
    }

    /// Direct upstream dependencies of a cell.
    pub fn parents(&self, id: CellId) -> Vec<CellId> {
        self.nodes
            .get(&id)
            .map(|&index| {
                self.graph
                    .neighbors_directed(index, petgraph::Direction::Incoming)
                    .map(|parent| self.graph[parent])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Topologically order `set`, tie-breaking ready cells by `(order, id)`.
    ///
    /// Kahn's algorithm restricted to the given node set; edges to or from
    /// cells outside the set are ignored. Leftover nodes form a cycle and
    /// each participant receives a diagnostic naming the members.
    pub fn topo_order(&self, set: &[CellId]) -> Result<Vec<CellId>, Vec<GraphDiagnostic>> {
        let members: BTreeSet<CellId> = set.iter().copied().collect();
        let mut indegree: FxHashMap<CellId, usize> = FxHashMap::default();
        for &id in &members {
            let within = self
                .parents(id)
                .into_iter()
                .filter(|parent| members.contains(parent))
                .count();
            indegree.insert(id, within);
        }

        // ready set keyed by (order, id) so pops are deterministic
        let mut ready: BTreeSet<(i64, CellId)> = indegree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&id, _)| (self.orders[&id], id))
            .collect();

        let mut ordered = Vec::with_capacity(members.len());
        while let Some(&(order, id)) = ready.iter().next() {
            ready.remove(&(order, id));
            ordered.push(id);
            if let Some(&index) = self.nodes.get(&id) {
                for neighbor in self.graph.neighbors(index) {
                    let child = self.graph[neighbor];
                    if let Some(degree) = indegree.get_mut(&child) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.insert((self.orders[&child], child));
                        }
                    }
                }
            }
            indegree.remove(&id);
        }

        if indegree.is_empty() {
            return Ok(ordered);
        }

        let mut cycle: Vec<(i64, CellId)> = indegree
            .keys()
            .map(|&id| (self.orders[&id], id))
            .collect();
        cycle.sort_unstable();
        let members_list = cycle
            .iter()
            .map(|(_, id)| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Err(cycle
            .into_iter()
            .map(|(_, id)| GraphDiagnostic {
                cell: id,
                message: format!("cyclic dependency among cells: {members_list}"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CellType;

    fn cell(order: i64, defs: &[&str], refs: &[&str]) -> Cell {
        let mut cell = Cell::new(CellType::Imperative, String::new(), order);
        cell.defs = defs.iter().map(|s| s.to_string()).collect();
        cell.refs = refs.iter().map(|s| s.to_string()).collect();
        cell
    }

    #[test]
    fn test_linear_chain_orders_in_dependency_order() {
        let a = cell(0, &["x"], &[]);
        let b = cell(1, &["y"], &["x"]);
        let c = cell(2, &["z"], &["y"]);
        let cells = vec![c.clone(), a.clone(), b.clone()];
        let graph = DependencyGraph::build(&cells).unwrap();

        let impacted = graph.descendants(a.id);
        assert_eq!(impacted.len(), 3);
        let order = graph.topo_order(&impacted).unwrap();
        assert_eq!(order, vec![a.id, b.id, c.id]);
    }

    #[test]
    fn test_diamond_ties_break_on_display_order() {
        let a = cell(0, &["x"], &[]);
        let b = cell(2, &["y"], &["x"]);
        let c = cell(1, &["w"], &["x"]);
        let d = cell(3, &["z"], &["y", "w"]);
        let cells = vec![a.clone(), b.clone(), c.clone(), d.clone()];
        let graph = DependencyGraph::build(&cells).unwrap();

        let order = graph.topo_order(&graph.descendants(a.id)).unwrap();
        // c displays before b, so it runs first
        assert_eq!(order, vec![a.id, c.id, b.id, d.id]);
    }

    #[test]
    fn test_descendants_excludes_independent_cells() {
        let a = cell(0, &["x"], &[]);
        let b = cell(1, &["y"], &["x"]);
        let d = cell(2, &["w"], &[]);
        let cells = vec![a.clone(), b.clone(), d.clone()];
        let graph = DependencyGraph::build(&cells).unwrap();

        let impacted = graph.descendants(a.id);
        assert!(impacted.contains(&a.id));
        assert!(impacted.contains(&b.id));
        assert!(!impacted.contains(&d.id));
    }

    #[test]
    fn test_duplicate_definition_flags_both_cells() {
        let a = cell(0, &["x"], &[]);
        let b = cell(1, &["x"], &[]);
        let diagnostics = DependencyGraph::build(&[a.clone(), b.clone()]).unwrap_err();
        assert_eq!(diagnostics.len(), 2);
        let flagged: Vec<CellId> = diagnostics.iter().map(|d| d.cell).collect();
        assert!(flagged.contains(&a.id));
        assert!(flagged.contains(&b.id));
        assert!(diagnostics[0]
            .message
            .starts_with("duplicate definition of 'x' with cell "));
    }

    #[test]
    fn test_unresolved_ref_is_not_an_error() {
        let a = cell(0, &["y"], &["missing"]);
        let graph = DependencyGraph::build(&[a.clone()]).unwrap();
        assert_eq!(graph.descendants(a.id), vec![a.id]);
    }

    #[test]
    fn test_cycle_reported_on_each_participant() {
        let a = cell(0, &["x"], &["z"]);
        let b = cell(1, &["y"], &["x"]);
        let c = cell(2, &["z"], &["y"]);
        let cells = vec![a.clone(), b.clone(), c.clone()];
        let graph = DependencyGraph::build(&cells).unwrap();

        let diagnostics = graph.topo_order(&graph.descendants(a.id)).unwrap_err();
        assert_eq!(diagnostics.len(), 3);
        for diagnostic in &diagnostics {
            assert!(diagnostic
                .message
                .starts_with("cyclic dependency among cells: "));
        }
    }

    #[test]
    fn test_self_reference_adds_no_edge() {
        // the analyzer normally strips self-refs; the graph tolerates them
        let a = cell(0, &["x"], &["x"]);
        let graph = DependencyGraph::build(&[a.clone()]).unwrap();
        assert!(graph.parents(a.id).is_empty());
    }

    #[test]
    fn test_schedule_respects_every_edge() {
        let a = cell(3, &["a"], &[]);
        let b = cell(2, &["b"], &["a"]);
        let c = cell(1, &["c"], &["a", "b"]);
        let d = cell(0, &["d"], &["c"]);
        let cells = vec![a.clone(), b.clone(), c.clone(), d.clone()];
        let graph = DependencyGraph::build(&cells).unwrap();
        let order = graph.topo_order(&graph.descendants(a.id)).unwrap();

        let position = |id: CellId| order.iter().position(|&x| x == id).unwrap();
        assert!(position(a.id) < position(b.id));
        assert!(position(b.id) < position(c.id));
        assert!(position(c.id) < position(d.id));
    }
}
