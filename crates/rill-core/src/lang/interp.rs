//! Tree-walking interpreter for rillscript.
//!
//! Module-level bindings land in the shared namespace; function calls get a
//! local scope with read-through to globals. The interpreter checks a
//! wall-clock deadline at every statement and loop iteration, so runaway
//! cells abort with a timeout error instead of hanging the worker.

use std::cmp::Ordering;
use std::time::Instant;

use rustc_hash::FxHashMap;
use thiserror::Error;

use super::ast::{BinOp, Expr, ExprKind, Program, Stmt, StmtKind, Target, UnOp};
use super::is_builtin;
use crate::value::{Namespace, Value};

/// Maximum user-function call depth.
pub const MAX_CALL_DEPTH: usize = 100;

/// Cap on `range()` materialization.
const MAX_RANGE_LEN: i64 = 10_000_000;

/// A runtime failure, annotated with the source line it occurred on.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("line {line}: {kind}")]
pub struct RuntimeError {
    pub line: usize,
    pub kind: RuntimeErrorKind,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeErrorKind {
    #[error("name '{0}' is not defined")]
    NameNotDefined(String),

    #[error("'{0}' is not callable")]
    NotCallable(String),

    #[error("{0}")]
    TypeMismatch(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("list index out of range")]
    IndexOutOfRange,

    #[error("{name}() takes {expected} arguments, got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("maximum call depth exceeded")]
    CallDepth,

    #[error("{0}")]
    ValueError(String),

    #[error("execution timeout: deadline exceeded")]
    Timeout,
}

/// Control flow signal threaded through block execution.
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Name-binding environment for the currently executing frame.
enum Scope {
    /// Module level: bindings go straight to the namespace.
    Module,
    /// Function body: bindings are local, reads fall through to globals.
    Local(FxHashMap<String, Value>),
}

/// Interpreter over a borrowed namespace.
pub struct Interpreter<'ns> {
    globals: &'ns mut Namespace,
    deadline: Instant,
    stdout: String,
    depth: usize,
}

impl<'ns> Interpreter<'ns> {
    pub fn new(globals: &'ns mut Namespace, deadline: Instant) -> Self {
        Self {
            globals,
            deadline,
            stdout: String::new(),
            depth: 0,
        }
    }

    /// Execute a module. Returns the captured stdout and the error, if any.
    ///
    /// The namespace keeps whatever bindings were made before a failure;
    /// the scheduler's stale-def sweep cleans them up on the next run.
    pub fn run(mut self, program: &Program) -> (String, Option<RuntimeError>) {
        let mut scope = Scope::Module;
        let result = self.exec_block(&program.body, &mut scope);
        (self.stdout, result.err())
    }

    fn check_deadline(&self, line: usize) -> Result<(), RuntimeError> {
        if Instant::now() >= self.deadline {
            Err(RuntimeError {
                line,
                kind: RuntimeErrorKind::Timeout,
            })
        } else {
            Ok(())
        }
    }

    fn exec_block(&mut self, stmts: &[Stmt], scope: &mut Scope) -> Result<Flow, RuntimeError> {
        for stmt in stmts {
            match self.exec_stmt(stmt, scope)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &mut Scope) -> Result<Flow, RuntimeError> {
        self.check_deadline(stmt.line)?;
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr, scope)?;
                Ok(Flow::Normal)
            }
            StmtKind::Assign { target, value } => {
                let value = self.eval(value, scope)?;
                self.bind_target(target, value, scope, stmt.line)?;
                Ok(Flow::Normal)
            }
            StmtKind::AugAssign { name, op, value } => {
                let current = self.lookup(name, scope, stmt.line)?;
                let rhs = self.eval(value, scope)?;
                let updated = binary_op(*op, current, rhs, stmt.line)?;
                self.bind(name, updated, scope);
                Ok(Flow::Normal)
            }
            StmtKind::FnDef(func) => {
                self.bind(&func.name, Value::Func(func.clone()), scope);
                Ok(Flow::Normal)
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            StmtKind::If {
                branches,
                else_body,
            } => {
                for (cond, body) in branches {
                    if self.eval(cond, scope)?.is_truthy() {
                        return self.exec_block(body, scope);
                    }
                }
                if let Some(body) = else_body {
                    return self.exec_block(body, scope);
                }
                Ok(Flow::Normal)
            }
            StmtKind::While { cond, body } => {
                loop {
                    self.check_deadline(stmt.line)?;
                    if !self.eval(cond, scope)?.is_truthy() {
                        break;
                    }
                    match self.exec_block(body, scope)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::For { target, iter, body } => {
                let items = match self.eval(iter, scope)? {
                    Value::List(items) => items,
                    Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                    other => {
                        return Err(RuntimeError {
                            line: stmt.line,
                            kind: RuntimeErrorKind::TypeMismatch(format!(
                                "'{}' is not iterable",
                                other.type_name()
                            )),
                        });
                    }
                };
                for item in items {
                    self.check_deadline(stmt.line)?;
                    self.bind(target, item, scope);
                    match self.exec_block(body, scope)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::Break => Ok(Flow::Break),
            StmtKind::Continue => Ok(Flow::Continue),
        }
    }

    fn bind(&mut self, name: &str, value: Value, scope: &mut Scope) {
        match scope {
            Scope::Module => {
                self.globals.insert(name.to_string(), value);
            }
            Scope::Local(locals) => {
                locals.insert(name.to_string(), value);
            }
        }
    }

    fn bind_target(
        &mut self,
        target: &Target,
        value: Value,
        scope: &mut Scope,
        line: usize,
    ) -> Result<(), RuntimeError> {
        match target {
            Target::Name(name) => {
                self.bind(name, value, scope);
                Ok(())
            }
            Target::Tuple(names) => {
                let items = match value {
                    Value::List(items) => items,
                    other => {
                        return Err(RuntimeError {
                            line,
                            kind: RuntimeErrorKind::TypeMismatch(format!(
                                "cannot unpack '{}' into {} names",
                                other.type_name(),
                                names.len()
                            )),
                        });
                    }
                };
                if items.len() != names.len() {
                    return Err(RuntimeError {
                        line,
                        kind: RuntimeErrorKind::ValueError(format!(
                            "expected {} values to unpack, got {}",
                            names.len(),
                            items.len()
                        )),
                    });
                }
                for (name, item) in names.iter().zip(items) {
                    self.bind(name, item, scope);
                }
                Ok(())
            }
        }
    }

    fn lookup_opt(&self, name: &str, scope: &Scope) -> Option<Value> {
        if let Scope::Local(locals) = scope {
            if let Some(value) = locals.get(name) {
                return Some(value.clone());
            }
        }
        self.globals.get(name).cloned()
    }

    fn lookup(&self, name: &str, scope: &Scope, line: usize) -> Result<Value, RuntimeError> {
        self.lookup_opt(name, scope).ok_or_else(|| RuntimeError {
            line,
            kind: RuntimeErrorKind::NameNotDefined(name.to_string()),
        })
    }

    fn eval(&mut self, expr: &Expr, scope: &mut Scope) -> Result<Value, RuntimeError> {
        match &expr.kind {
            ExprKind::Int(n) => Ok(Value::Int(*n)),
            ExprKind::Float(x) => Ok(Value::Float(*x)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, scope)?);
                }
                Ok(Value::List(values))
            }
            ExprKind::Name(name) => self.lookup(name, scope, expr.line),
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand, scope)?;
                match op {
                    UnOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnOp::Neg => match value {
                        Value::Int(n) => Ok(Value::Int(-n)),
                        Value::Float(x) => Ok(Value::Float(-x)),
                        other => Err(RuntimeError {
                            line: expr.line,
                            kind: RuntimeErrorKind::TypeMismatch(format!(
                                "bad operand type for unary -: '{}'",
                                other.type_name()
                            )),
                        }),
                    },
                }
            }
            ExprKind::Binary { op, lhs, rhs } => match op {
                BinOp::And => {
                    let lhs = self.eval(lhs, scope)?;
                    if lhs.is_truthy() {
                        self.eval(rhs, scope)
                    } else {
                        Ok(lhs)
                    }
                }
                BinOp::Or => {
                    let lhs = self.eval(lhs, scope)?;
                    if lhs.is_truthy() {
                        Ok(lhs)
                    } else {
                        self.eval(rhs, scope)
                    }
                }
                _ => {
                    let lhs = self.eval(lhs, scope)?;
                    let rhs = self.eval(rhs, scope)?;
                    binary_op(*op, lhs, rhs, expr.line)
                }
            },
            ExprKind::Index { obj, index } => {
                let obj = self.eval(obj, scope)?;
                let index = self.eval(index, scope)?;
                index_value(obj, index, expr.line)
            }
            ExprKind::Call { func, args } => self.call(func, args, scope, expr.line),
        }
    }

    fn call(
        &mut self,
        func: &str,
        args: &[Expr],
        scope: &mut Scope,
        line: usize,
    ) -> Result<Value, RuntimeError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, scope)?);
        }

        // user bindings shadow builtins
        match self.lookup_opt(func, scope) {
            Some(Value::Func(function)) => {
                if values.len() != function.params.len() {
                    return Err(RuntimeError {
                        line,
                        kind: RuntimeErrorKind::Arity {
                            name: function.name.clone(),
                            expected: function.params.len(),
                            got: values.len(),
                        },
                    });
                }
                if self.depth + 1 > MAX_CALL_DEPTH {
                    return Err(RuntimeError {
                        line,
                        kind: RuntimeErrorKind::CallDepth,
                    });
                }
                self.depth += 1;
                let locals: FxHashMap<String, Value> = function
                    .params
                    .iter()
                    .cloned()
                    .zip(values)
                    .collect();
                let mut local_scope = Scope::Local(locals);
                let flow = self.exec_block(&function.body, &mut local_scope);
                self.depth -= 1;
                match flow? {
                    Flow::Return(value) => Ok(value),
                    _ => Ok(Value::Null),
                }
            }
            Some(other) => Err(RuntimeError {
                line,
                kind: RuntimeErrorKind::NotCallable(format!(
                    "{} ({})",
                    func,
                    other.type_name()
                )),
            }),
            None if is_builtin(func) => self.call_builtin(func, values, line),
            None => Err(RuntimeError {
                line,
                kind: RuntimeErrorKind::NameNotDefined(func.to_string()),
            }),
        }
    }

    fn call_builtin(
        &mut self,
        name: &str,
        args: Vec<Value>,
        line: usize,
    ) -> Result<Value, RuntimeError> {
        let arity = |expected: usize, got: usize| -> Result<(), RuntimeError> {
            if expected == got {
                Ok(())
            } else {
                Err(RuntimeError {
                    line,
                    kind: RuntimeErrorKind::Arity {
                        name: name.to_string(),
                        expected,
                        got,
                    },
                })
            }
        };
        let type_error = |message: String| RuntimeError {
            line,
            kind: RuntimeErrorKind::TypeMismatch(message),
        };

        match name {
            "print" => {
                let rendered: Vec<String> = args.iter().map(Value::to_string).collect();
                self.stdout.push_str(&rendered.join(" "));
                self.stdout.push('\n');
                Ok(Value::Null)
            }
            "len" => {
                arity(1, args.len())?;
                match &args[0] {
                    Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                    Value::List(xs) => Ok(Value::Int(xs.len() as i64)),
                    other => Err(type_error(format!(
                        "object of type '{}' has no length",
                        other.type_name()
                    ))),
                }
            }
            "str" => {
                arity(1, args.len())?;
                Ok(Value::Str(args[0].to_string()))
            }
            "int" => {
                arity(1, args.len())?;
                match &args[0] {
                    Value::Int(n) => Ok(Value::Int(*n)),
                    Value::Float(x) => Ok(Value::Int(*x as i64)),
                    Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                    Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                        RuntimeError {
                            line,
                            kind: RuntimeErrorKind::ValueError(format!(
                                "invalid literal for int: '{s}'"
                            )),
                        }
                    }),
                    other => Err(type_error(format!(
                        "cannot convert '{}' to int",
                        other.type_name()
                    ))),
                }
            }
            "float" => {
                arity(1, args.len())?;
                match &args[0] {
                    Value::Int(n) => Ok(Value::Float(*n as f64)),
                    Value::Float(x) => Ok(Value::Float(*x)),
                    Value::Bool(b) => Ok(Value::Float(f64::from(u8::from(*b)))),
                    Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                        RuntimeError {
                            line,
                            kind: RuntimeErrorKind::ValueError(format!(
                                "invalid literal for float: '{s}'"
                            )),
                        }
                    }),
                    other => Err(type_error(format!(
                        "cannot convert '{}' to float",
                        other.type_name()
                    ))),
                }
            }
            "abs" => {
                arity(1, args.len())?;
                match &args[0] {
                    Value::Int(n) => Ok(Value::Int(n.abs())),
                    Value::Float(x) => Ok(Value::Float(x.abs())),
                    other => Err(type_error(format!(
                        "bad operand type for abs(): '{}'",
                        other.type_name()
                    ))),
                }
            }
            "min" | "max" => {
                let items = match args.len() {
                    0 => {
                        return Err(type_error(format!("{name}() expected at least 1 argument")));
                    }
                    1 => match &args[0] {
                        Value::List(xs) if !xs.is_empty() => xs.clone(),
                        Value::List(_) => {
                            return Err(RuntimeError {
                                line,
                                kind: RuntimeErrorKind::ValueError(format!(
                                    "{name}() of an empty list"
                                )),
                            });
                        }
                        other => {
                            return Err(type_error(format!(
                                "'{}' is not iterable",
                                other.type_name()
                            )));
                        }
                    },
                    _ => args,
                };
                let mut best = items[0].clone();
                for item in &items[1..] {
                    let ordering = compare(item, &best).ok_or_else(|| {
                        type_error(format!(
                            "cannot compare '{}' with '{}'",
                            item.type_name(),
                            best.type_name()
                        ))
                    })?;
                    let take = if name == "min" {
                        ordering == Ordering::Less
                    } else {
                        ordering == Ordering::Greater
                    };
                    if take {
                        best = item.clone();
                    }
                }
                Ok(best)
            }
            "sum" => {
                arity(1, args.len())?;
                let items = match &args[0] {
                    Value::List(xs) => xs,
                    other => {
                        return Err(type_error(format!(
                            "'{}' is not iterable",
                            other.type_name()
                        )));
                    }
                };
                let mut int_total: i64 = 0;
                let mut float_total: f64 = 0.0;
                let mut saw_float = false;
                for item in items {
                    match item {
                        Value::Int(n) => int_total += n,
                        Value::Float(x) => {
                            saw_float = true;
                            float_total += x;
                        }
                        other => {
                            return Err(type_error(format!(
                                "cannot sum '{}'",
                                other.type_name()
                            )));
                        }
                    }
                }
                if saw_float {
                    Ok(Value::Float(float_total + int_total as f64))
                } else {
                    Ok(Value::Int(int_total))
                }
            }
            "range" => {
                let (start, stop) = match args.len() {
                    1 => (0, as_int(&args[0]).ok_or_else(|| {
                        type_error("range() arguments must be ints".to_string())
                    })?),
                    2 => (
                        as_int(&args[0]).ok_or_else(|| {
                            type_error("range() arguments must be ints".to_string())
                        })?,
                        as_int(&args[1]).ok_or_else(|| {
                            type_error("range() arguments must be ints".to_string())
                        })?,
                    ),
                    got => {
                        return Err(RuntimeError {
                            line,
                            kind: RuntimeErrorKind::Arity {
                                name: name.to_string(),
                                expected: 2,
                                got,
                            },
                        });
                    }
                };
                let len = stop.saturating_sub(start);
                if len > MAX_RANGE_LEN {
                    return Err(RuntimeError {
                        line,
                        kind: RuntimeErrorKind::ValueError(format!(
                            "range of {len} elements is too large"
                        )),
                    });
                }
                Ok(Value::List((start..stop).map(Value::Int).collect()))
            }
            _ => Err(RuntimeError {
                line,
                kind: RuntimeErrorKind::NameNotDefined(name.to_string()),
            }),
        }
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Int(n) => Some(*n),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

/// Ordering between two values, when comparable.
fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => {
            let a = as_f64(lhs)?;
            let b = as_f64(rhs)?;
            a.partial_cmp(&b)
        }
    }
}

/// Equality with numeric cross-type coercion (`1 == 1.0`).
fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (as_f64(lhs), as_f64(rhs)) {
        (Some(a), Some(b)) => a == b,
        _ => lhs == rhs,
    }
}

fn binary_op(op: BinOp, lhs: Value, rhs: Value, line: usize) -> Result<Value, RuntimeError> {
    let type_error = || RuntimeError {
        line,
        kind: RuntimeErrorKind::TypeMismatch(format!(
            "unsupported operand types for {}: '{}' and '{}'",
            op.symbol(),
            lhs.type_name(),
            rhs.type_name()
        )),
    };

    match op {
        BinOp::Add => match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            (Value::List(a), Value::List(b)) => {
                let mut joined = a.clone();
                joined.extend(b.iter().cloned());
                Ok(Value::List(joined))
            }
            _ => match (as_f64(&lhs), as_f64(&rhs)) {
                (Some(a), Some(b)) => Ok(Value::Float(a + b)),
                _ => Err(type_error()),
            },
        },
        BinOp::Sub | BinOp::Mul => match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(if op == BinOp::Sub {
                a - b
            } else {
                a * b
            })),
            _ => match (as_f64(&lhs), as_f64(&rhs)) {
                (Some(a), Some(b)) => Ok(Value::Float(if op == BinOp::Sub {
                    a - b
                } else {
                    a * b
                })),
                _ => Err(type_error()),
            },
        },
        BinOp::Div => match (as_f64(&lhs), as_f64(&rhs)) {
            (Some(_), Some(b)) if b == 0.0 => Err(RuntimeError {
                line,
                kind: RuntimeErrorKind::DivisionByZero,
            }),
            (Some(a), Some(b)) => Ok(Value::Float(a / b)),
            _ => Err(type_error()),
        },
        BinOp::Mod => match (&lhs, &rhs) {
            (Value::Int(_), Value::Int(0)) => Err(RuntimeError {
                line,
                kind: RuntimeErrorKind::DivisionByZero,
            }),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.rem_euclid(*b))),
            _ => Err(type_error()),
        },
        BinOp::Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
        BinOp::Ne => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = compare(&lhs, &rhs).ok_or_else(type_error)?;
            let result = match op {
                BinOp::Lt => ordering == Ordering::Less,
                BinOp::Le => ordering != Ordering::Greater,
                BinOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::Bool(result))
        }
        // short-circuit forms are handled in eval
        BinOp::And | BinOp::Or => Err(type_error()),
    }
}

fn index_value(obj: Value, index: Value, line: usize) -> Result<Value, RuntimeError> {
    let idx = match index {
        Value::Int(n) => n,
        other => {
            return Err(RuntimeError {
                line,
                kind: RuntimeErrorKind::TypeMismatch(format!(
                    "indices must be ints, not '{}'",
                    other.type_name()
                )),
            });
        }
    };
    let resolve = |len: usize| -> Result<usize, RuntimeError> {
        let len = len as i64;
        let resolved = if idx < 0 { len + idx } else { idx };
        if resolved < 0 || resolved >= len {
            Err(RuntimeError {
                line,
                kind: RuntimeErrorKind::IndexOutOfRange,
            })
        } else {
            Ok(resolved as usize)
        }
    };
    match obj {
        Value::List(xs) => {
            let i = resolve(xs.len())?;
            Ok(xs[i].clone())
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = resolve(chars.len())?;
            Ok(Value::Str(chars[i].to_string()))
        }
        other => Err(RuntimeError {
            line,
            kind: RuntimeErrorKind::TypeMismatch(format!(
                "'{}' is not indexable",
                other.type_name()
            )),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::parse;
    use std::time::Duration;

    fn run(source: &str) -> (Namespace, String, Option<RuntimeError>) {
        let mut namespace = Namespace::default();
        let program = parse(source).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let (stdout, error) = Interpreter::new(&mut namespace, deadline).run(&program);
        (namespace, stdout, error)
    }

    fn run_ok(source: &str) -> (Namespace, String) {
        let (namespace, stdout, error) = run(source);
        assert_eq!(error, None);
        (namespace, stdout)
    }

    #[test]
    fn test_arithmetic_and_bindings() {
        let (ns, _) = run_ok("x = 10\ny = x + 5\nz = y * 2");
        assert_eq!(ns.get("x"), Some(&Value::Int(10)));
        assert_eq!(ns.get("y"), Some(&Value::Int(15)));
        assert_eq!(ns.get("z"), Some(&Value::Int(30)));
    }

    #[test]
    fn test_print_captures_stdout() {
        let (_, stdout) = run_ok("print('hello', 1 + 1)");
        assert_eq!(stdout, "hello 2\n");
    }

    #[test]
    fn test_division_is_float() {
        let (ns, _) = run_ok("q = 7 / 2");
        assert_eq!(ns.get("q"), Some(&Value::Float(3.5)));
    }

    #[test]
    fn test_division_by_zero() {
        let (_, _, error) = run("q = 1 / 0");
        assert_eq!(error.unwrap().kind, RuntimeErrorKind::DivisionByZero);
    }

    #[test]
    fn test_name_not_defined_reports_line() {
        let (_, _, error) = run("x = 1\ny = missing + 1");
        let error = error.unwrap();
        assert_eq!(error.line, 2);
        assert_eq!(
            error.kind,
            RuntimeErrorKind::NameNotDefined("missing".to_string())
        );
    }

    #[test]
    fn test_function_call_and_locals() {
        let (ns, _) = run_ok("fn double(n) {\n  m = n * 2\n  return m\n}\ny = double(21)");
        assert_eq!(ns.get("y"), Some(&Value::Int(42)));
        // function locals never leak into the namespace
        assert_eq!(ns.get("m"), None);
        assert_eq!(ns.get("n"), None);
    }

    #[test]
    fn test_function_reads_globals() {
        let (ns, _) = run_ok("base = 10\nfn bump(n) { return n + base }\ny = bump(5)");
        assert_eq!(ns.get("y"), Some(&Value::Int(15)));
    }

    #[test]
    fn test_recursion_and_depth_cap() {
        let (ns, _) = run_ok("fn fact(n) {\n  if n <= 1 { return 1 }\n  return n * fact(n - 1)\n}\nx = fact(10)");
        assert_eq!(ns.get("x"), Some(&Value::Int(3_628_800)));

        let (_, _, error) = run("fn loop_forever(n) { return loop_forever(n) }\nloop_forever(1)");
        assert_eq!(error.unwrap().kind, RuntimeErrorKind::CallDepth);
    }

    #[test]
    fn test_while_and_augmented_assignment() {
        let (ns, _) = run_ok("total = 0\ni = 0\nwhile i < 5 {\n  total += i\n  i += 1\n}");
        assert_eq!(ns.get("total"), Some(&Value::Int(10)));
    }

    #[test]
    fn test_for_over_range_with_break() {
        let (ns, _) = run_ok("last = 0\nfor i in range(10) {\n  if i == 4 { break }\n  last = i\n}");
        assert_eq!(ns.get("last"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_destructuring() {
        let (ns, _) = run_ok("a, b = 1, 'two'");
        assert_eq!(ns.get("a"), Some(&Value::Int(1)));
        assert_eq!(ns.get("b"), Some(&Value::Str("two".to_string())));
    }

    #[test]
    fn test_indexing_and_negative_index() {
        let (ns, _) = run_ok("xs = [10, 20, 30]\nfirst = xs[0]\nlast = xs[-1]");
        assert_eq!(ns.get("first"), Some(&Value::Int(10)));
        assert_eq!(ns.get("last"), Some(&Value::Int(30)));
    }

    #[test]
    fn test_builtins() {
        let (ns, _) = run_ok(
            "n = len('abc')\ns = str(12)\ni = int('7')\nm = min([3, 1, 2])\nt = sum(range(5))",
        );
        assert_eq!(ns.get("n"), Some(&Value::Int(3)));
        assert_eq!(ns.get("s"), Some(&Value::Str("12".to_string())));
        assert_eq!(ns.get("i"), Some(&Value::Int(7)));
        assert_eq!(ns.get("m"), Some(&Value::Int(1)));
        assert_eq!(ns.get("t"), Some(&Value::Int(10)));
    }

    #[test]
    fn test_short_circuit() {
        // the undefined name on the right is never evaluated
        let (ns, _) = run_ok("ok = true or missing\nko = false and missing");
        assert_eq!(ns.get("ok"), Some(&Value::Bool(true)));
        assert_eq!(ns.get("ko"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_deadline_aborts_infinite_loop() {
        let mut namespace = Namespace::default();
        let program = parse("while true { }").unwrap();
        let deadline = Instant::now() + Duration::from_millis(20);
        let (_, error) = Interpreter::new(&mut namespace, deadline).run(&program);
        assert_eq!(error.unwrap().kind, RuntimeErrorKind::Timeout);
    }

    #[test]
    fn test_partial_mutation_survives_failure() {
        let (ns, _, error) = run("x = 1\ny = boom");
        assert!(error.is_some());
        assert_eq!(ns.get("x"), Some(&Value::Int(1)));
        assert_eq!(ns.get("y"), None);
    }
}
