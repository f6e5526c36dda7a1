//! Runtime values for the shared namespace.
//!
//! The namespace maps names to [`Value`]s. The tagged union covers every
//! shape the query interpolator understands; function objects are opaque and
//! fall back to their textual form when interpolated.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::lang::ast::Function;

/// The shared imperative globals, owned by the scheduler.
pub type Namespace = FxHashMap<String, Value>;

/// A runtime value produced by rillscript and consumed by the interpolator.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Null,
    List(Vec<Value>),
    /// A user-defined function bound in the namespace.
    Func(Arc<Function>),
}

impl Value {
    /// Human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "str",
            Value::Null => "null",
            Value::List(_) => "list",
            Value::Func(_) => "function",
        }
    }

    /// Truthiness, used by conditions and `not`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::Null => false,
            Value::List(xs) => !xs.is_empty(),
            Value::Func(_) => true,
        }
    }

    /// Render as a SQL literal.
    ///
    /// Strings are single-quoted with internal quotes doubled; lists are
    /// comma-joined element-wise without surrounding parentheses (the query
    /// author supplies them, e.g. `IN ({{xs}})`).
    pub fn sql_literal(&self) -> String {
        match self {
            Value::Int(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Str(s) => quote_sql(s),
            Value::Null => "NULL".to_string(),
            Value::List(xs) => xs
                .iter()
                .map(Value::sql_literal)
                .collect::<Vec<_>>()
                .join(", "),
            Value::Func(_) => quote_sql(&self.to_string()),
        }
    }
}

fn quote_sql(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(true) => write!(f, "true"),
            Value::Bool(false) => write!(f, "false"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Null => write!(f, "null"),
            Value::List(xs) => {
                write!(f, "[")?;
                for (i, x) in xs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match x {
                        Value::Str(s) => write!(f, "\"{s}\"")?,
                        other => write!(f, "{other}")?,
                    }
                }
                write!(f, "]")
            }
            Value::Func(func) => write!(f, "<fn {}>", func.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_quoting_doubles_quotes() {
        let v = Value::Str("O'Brien".to_string());
        assert_eq!(v.sql_literal(), "'O''Brien'");
    }

    #[test]
    fn test_scalar_literals() {
        assert_eq!(Value::Int(42).sql_literal(), "42");
        assert_eq!(Value::Float(2.5).sql_literal(), "2.5");
        assert_eq!(Value::Bool(true).sql_literal(), "TRUE");
        assert_eq!(Value::Bool(false).sql_literal(), "FALSE");
        assert_eq!(Value::Null.sql_literal(), "NULL");
    }

    #[test]
    fn test_list_literal_is_comma_joined() {
        let v = Value::List(vec![
            Value::Int(1),
            Value::Str("a".to_string()),
            Value::Null,
        ]);
        assert_eq!(v.sql_literal(), "1, 'a', NULL");
    }

    #[test]
    fn test_truthiness() {
        assert!(Value::Int(1).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(Value::List(vec![Value::Null]).is_truthy());
    }
}
