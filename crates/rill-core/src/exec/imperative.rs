//! Imperative cell executor.
//!
//! Runs a rillscript cell against the shared namespace on a blocking worker
//! under the wall-clock deadline. The namespace moves into the worker and
//! back out, so mutations made before a failure persist (the scheduler's
//! stale-def sweep cleans them on the next run).

use std::time::Instant;

use super::{Outcome, EXECUTION_TIMEOUT};
use crate::lang::{parse, Interpreter};
use crate::value::Namespace;

/// Execute a cell body. Returns the (possibly mutated) namespace and the
/// outcome; on failure the captured stdout is discarded.
pub async fn execute(code: String, mut namespace: Namespace) -> (Namespace, Outcome) {
    let program = match parse(&code) {
        Ok(program) => program,
        Err(error) => {
            return (namespace, Outcome::failure(format!("syntax error: {error}")));
        }
    };

    let deadline = Instant::now() + EXECUTION_TIMEOUT;
    let handle = tokio::task::spawn_blocking(move || {
        let (stdout, error) = Interpreter::new(&mut namespace, deadline).run(&program);
        (namespace, stdout, error)
    });

    match handle.await {
        Ok((namespace, stdout, None)) => {
            let outputs = split_lines(&stdout);
            (namespace, Outcome::success(outputs))
        }
        Ok((namespace, _, Some(error))) => (namespace, Outcome::failure(error.to_string())),
        Err(join_error) => {
            // worker panicked or was cancelled; the namespace is lost with it
            tracing::error!("imperative worker failed: {join_error}");
            (
                Namespace::default(),
                Outcome::failure(format!("execution worker failed: {join_error}")),
            )
        }
    }
}

/// Captured stdout as output lines, trailing newline stripped per line.
fn split_lines(stdout: &str) -> Vec<String> {
    if stdout.is_empty() {
        return Vec::new();
    }
    stdout
        .strip_suffix('\n')
        .unwrap_or(stdout)
        .split('\n')
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[tokio::test]
    async fn test_success_updates_namespace_and_outputs() {
        let (ns, outcome) = execute(
            "x = 10\nprint('x is', x)".to_string(),
            Namespace::default(),
        )
        .await;
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.outputs, vec!["x is 10"]);
        assert_eq!(ns.get("x"), Some(&Value::Int(10)));
    }

    #[tokio::test]
    async fn test_syntax_error_reported_at_runtime() {
        let (_, outcome) = execute("x = = 1".to_string(), Namespace::default()).await;
        let error = outcome.error.unwrap();
        assert!(error.starts_with("syntax error: "), "got: {error}");
        assert!(outcome.outputs.is_empty());
    }

    #[tokio::test]
    async fn test_runtime_error_discards_stdout() {
        let (ns, outcome) = execute(
            "print('before')\ny = missing".to_string(),
            Namespace::default(),
        )
        .await;
        assert!(outcome.outputs.is_empty());
        assert!(outcome.error.unwrap().contains("'missing' is not defined"));
        // bindings made before the failure survive
        assert!(ns.get("y").is_none());
    }

    #[tokio::test]
    async fn test_reads_existing_namespace() {
        let mut ns = Namespace::default();
        ns.insert("x".to_string(), Value::Int(20));
        let (ns, outcome) = execute("y = x + 5".to_string(), ns).await;
        assert_eq!(outcome.error, None);
        assert_eq!(ns.get("y"), Some(&Value::Int(25)));
    }

    #[test]
    fn test_split_lines_strips_trailing_newline() {
        assert_eq!(split_lines(""), Vec::<String>::new());
        assert_eq!(split_lines("a\nb\n"), vec!["a", "b"]);
        assert_eq!(split_lines("a\n\nb\n"), vec!["a", "", "b"]);
    }
}
