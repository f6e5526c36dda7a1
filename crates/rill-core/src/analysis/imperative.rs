//! Def/ref analysis for imperative (rillscript) cells.
//!
//! `defs` are the names bound at module top level: assignment targets
//! (including destructuring), augmented-assignment targets, and `fn`
//! declarations. `refs` are free name reads anywhere in the module,
//! excluding names bound in an enclosing scope, the builtin allowlist, and
//! the cell's own defs. Loop targets bind in their enclosing scope and
//! appear in neither set.

use std::collections::BTreeSet;

use rustc_hash::FxHashSet;

use super::Analysis;
use crate::lang::ast::{Expr, ExprKind, Stmt, StmtKind};
use crate::lang::{is_builtin, parse};

/// Analyze an imperative cell body.
///
/// A cell that fails to parse yields an empty analysis; the executor
/// surfaces the syntax error when the cell runs.
pub fn analyze(code: &str) -> Analysis {
    let program = match parse(code) {
        Ok(program) => program,
        Err(_) => return Analysis::default(),
    };

    let mut defs = BTreeSet::new();
    collect_defs(&program.body, &mut defs);

    let mut walker = RefWalker {
        refs: BTreeSet::new(),
        scopes: Vec::new(),
    };
    // module scope: defs plus loop targets, so binders never count as refs
    let mut module_bound: FxHashSet<String> = defs.iter().cloned().collect();
    collect_loop_targets(&program.body, &mut module_bound);
    walker.scopes.push(module_bound);
    walker.walk_block(&program.body);

    let refs = walker
        .refs
        .into_iter()
        .filter(|name| !defs.contains(name))
        .collect();
    Analysis { defs, refs }
}

/// Top-level binding forms contribute to `defs`.
fn collect_defs(body: &[Stmt], defs: &mut BTreeSet<String>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Assign { target, .. } => {
                for name in target.names() {
                    defs.insert(name.to_string());
                }
            }
            StmtKind::AugAssign { name, .. } => {
                defs.insert(name.clone());
            }
            StmtKind::FnDef(func) => {
                defs.insert(func.name.clone());
            }
            // bindings inside control flow still land at module level
            StmtKind::If {
                branches,
                else_body,
            } => {
                for (_, branch) in branches {
                    collect_defs(branch, defs);
                }
                if let Some(body) = else_body {
                    collect_defs(body, defs);
                }
            }
            StmtKind::While { body, .. } | StmtKind::For { body, .. } => {
                collect_defs(body, defs);
            }
            StmtKind::Expr(_) | StmtKind::Return(_) | StmtKind::Break | StmtKind::Continue => {}
        }
    }
}

/// Loop targets in a statement list (same scope level).
fn collect_loop_targets(body: &[Stmt], bound: &mut FxHashSet<String>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::For { target, body, .. } => {
                bound.insert(target.clone());
                collect_loop_targets(body, bound);
            }
            StmtKind::While { body, .. } => collect_loop_targets(body, bound),
            StmtKind::If {
                branches,
                else_body,
            } => {
                for (_, branch) in branches {
                    collect_loop_targets(branch, bound);
                }
                if let Some(body) = else_body {
                    collect_loop_targets(body, bound);
                }
            }
            _ => {}
        }
    }
}

/// Names assigned anywhere inside a function body are local (hoisted), like
/// the parameters; reads of anything else fall through to the outer scopes.
fn collect_local_binds(body: &[Stmt], bound: &mut FxHashSet<String>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Assign { target, .. } => {
                for name in target.names() {
                    bound.insert(name.to_string());
                }
            }
            StmtKind::AugAssign { name, .. } => {
                bound.insert(name.clone());
            }
            StmtKind::FnDef(func) => {
                bound.insert(func.name.clone());
            }
            StmtKind::For { target, body, .. } => {
                bound.insert(target.clone());
                collect_local_binds(body, bound);
            }
            StmtKind::While { body, .. } => collect_local_binds(body, bound),
            StmtKind::If {
                branches,
                else_body,
            } => {
                for (_, branch) in branches {
                    collect_local_binds(branch, bound);
                }
                if let Some(body) = else_body {
                    collect_local_binds(body, bound);
                }
            }
            StmtKind::Expr(_) | StmtKind::Return(_) | StmtKind::Break | StmtKind::Continue => {}
        }
    }
}

struct RefWalker {
    refs: BTreeSet<String>,
    scopes: Vec<FxHashSet<String>>,
}

impl RefWalker {
    fn is_bound(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn read(&mut self, name: &str) {
        if !self.is_bound(name) && !is_builtin(name) {
            self.refs.insert(name.to_string());
        }
    }

    fn walk_block(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.walk_stmt(stmt);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(expr) => self.walk_expr(expr),
            // targets are writes, not reads
            StmtKind::Assign { value, .. } => self.walk_expr(value),
            StmtKind::AugAssign { value, .. } => self.walk_expr(value),
            StmtKind::FnDef(func) => {
                let mut bound: FxHashSet<String> = func.params.iter().cloned().collect();
                collect_local_binds(&func.body, &mut bound);
                self.scopes.push(bound);
                self.walk_block(&func.body);
                self.scopes.pop();
            }
            StmtKind::Return(value) => {
                if let Some(expr) = value {
                    self.walk_expr(expr);
                }
            }
            StmtKind::If {
                branches,
                else_body,
            } => {
                for (cond, branch) in branches {
                    self.walk_expr(cond);
                    self.walk_block(branch);
                }
                if let Some(body) = else_body {
                    self.walk_block(body);
                }
            }
            StmtKind::While { cond, body } => {
                self.walk_expr(cond);
                self.walk_block(body);
            }
            StmtKind::For { iter, body, .. } => {
                self.walk_expr(iter);
                self.walk_block(body);
            }
            StmtKind::Break | StmtKind::Continue => {}
        }
    }

    fn walk_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Name(name) => self.read(name),
            ExprKind::Call { func, args } => {
                self.read(func);
                for arg in args {
                    self.walk_expr(arg);
                }
            }
            ExprKind::List(items) => {
                for item in items {
                    self.walk_expr(item);
                }
            }
            ExprKind::Unary { operand, .. } => self.walk_expr(operand),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.walk_expr(lhs);
                self.walk_expr(rhs);
            }
            ExprKind::Index { obj, index } => {
                self.walk_expr(obj);
                self.walk_expr(index);
            }
            ExprKind::Int(_)
            | ExprKind::Float(_)
            | ExprKind::Str(_)
            | ExprKind::Bool(_)
            | ExprKind::Null => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defs(code: &str) -> Vec<String> {
        analyze(code).defs.into_iter().collect()
    }

    fn refs(code: &str) -> Vec<String> {
        analyze(code).refs.into_iter().collect()
    }

    #[test]
    fn test_assignment_defs() {
        assert_eq!(defs("x = 10"), vec!["x"]);
    }

    #[test]
    fn test_destructuring_defs() {
        assert_eq!(defs("a, b = 1, 2"), vec!["a", "b"]);
    }

    #[test]
    fn test_augmented_assignment_defs() {
        assert_eq!(defs("x += 1"), vec!["x"]);
    }

    #[test]
    fn test_fn_def() {
        assert_eq!(defs("fn helper(a) { return a }"), vec!["helper"]);
    }

    #[test]
    fn test_conditional_assignment_still_defs() {
        assert_eq!(defs("if flag { x = 1 } else { x = 2 }"), vec!["x"]);
        assert_eq!(refs("if flag { x = 1 } else { x = 2 }"), vec!["flag"]);
    }

    #[test]
    fn test_free_refs() {
        assert_eq!(refs("y = x + 5"), vec!["x"]);
    }

    #[test]
    fn test_own_defs_excluded_from_refs() {
        assert!(refs("x = 10\nz = x * 2").is_empty());
    }

    #[test]
    fn test_builtins_excluded() {
        assert_eq!(refs("n = len(items)"), vec!["items"]);
    }

    #[test]
    fn test_function_params_and_locals_not_refs() {
        let code = "fn scale(n) {\n  factor = 2\n  return n * factor\n}";
        assert_eq!(defs(code), vec!["scale"]);
        assert!(refs(code).is_empty());
    }

    #[test]
    fn test_function_free_reads_are_refs() {
        let code = "fn scale(n) { return n * factor }";
        assert_eq!(refs(code), vec!["factor"]);
    }

    #[test]
    fn test_cross_cell_function_call_is_ref() {
        assert_eq!(refs("y = double(4)"), vec!["double"]);
    }

    #[test]
    fn test_loop_targets_are_neither() {
        let code = "total = 0\nfor i in range(3) { total += i }";
        assert_eq!(defs(code), vec!["total"]);
        assert!(refs(code).is_empty());
    }

    #[test]
    fn test_parse_failure_yields_empty_analysis() {
        assert_eq!(analyze("x = = 1"), Analysis::default());
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let code = "b = a + c\nd = b * 2";
        assert_eq!(analyze(code), analyze(code));
    }
}
