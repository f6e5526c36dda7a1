//! Query cell executor.
//!
//! Interpolates `{{name}}` placeholders from the shared namespace with
//! type-aware quoting, runs the statement through the DSN's pool under the
//! deadline, caps the row count, and shapes each row as one JSON line.

use serde_json::{Map, Value as JsonValue};
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo};

use super::pool::PoolManager;
use super::{Outcome, EXECUTION_TIMEOUT, ROW_CAP};
use crate::analysis::query::PLACEHOLDER;
use crate::value::Namespace;

/// Trailing output line appended when results exceed the row cap.
pub const TRUNCATION_NOTICE: &str = "[truncated to 1000 rows]";

/// Execute a query cell.
pub async fn execute(pools: &PoolManager, dsn: &str, code: &str, namespace: &Namespace) -> Outcome {
    let sql = match interpolate(code, namespace) {
        Ok(sql) => sql,
        Err(message) => return Outcome::failure(message),
    };

    let pool = match pools.get(dsn).await {
        Ok(pool) => pool,
        Err(error) => return Outcome::failure(error.to_string()),
    };

    let fetched = tokio::time::timeout(EXECUTION_TIMEOUT, sqlx::query(&sql).fetch_all(&pool)).await;
    let rows = match fetched {
        Ok(Ok(rows)) => rows,
        Ok(Err(error)) => return Outcome::failure(format!("query failed: {error}")),
        Err(_) => {
            return Outcome::failure(format!(
                "query timeout: exceeded {} seconds",
                EXECUTION_TIMEOUT.as_secs()
            ));
        }
    };

    let truncated = rows.len() > ROW_CAP;
    let mut outputs: Vec<String> = rows
        .iter()
        .take(ROW_CAP)
        .map(|row| row_to_line(row))
        .collect();
    if truncated {
        outputs.push(TRUNCATION_NOTICE.to_string());
    }
    Outcome::success(outputs)
}

/// Replace each placeholder with the SQL literal of its namespace value.
///
/// Placeholders resolve in order of appearance; the first missing name
/// aborts the query before anything reaches the backend.
pub fn interpolate(code: &str, namespace: &Namespace) -> Result<String, String> {
    let mut sql = String::with_capacity(code.len());
    let mut last_end = 0;
    for captures in PLACEHOLDER.captures_iter(code) {
        let whole = captures.get(0).expect("match group 0");
        let name = &captures[1];
        let value = namespace
            .get(name)
            .ok_or_else(|| format!("missing value for placeholder '{name}'"))?;
        sql.push_str(&code[last_end..whole.start()]);
        sql.push_str(&value.sql_literal());
        last_end = whole.end();
    }
    sql.push_str(&code[last_end..]);
    Ok(sql)
}

/// Shape one row as a JSON object line `{column: value}`.
fn row_to_line(row: &PgRow) -> String {
    let mut object = Map::new();
    for (index, column) in row.columns().iter().enumerate() {
        object.insert(column.name().to_string(), column_to_json(row, index));
    }
    JsonValue::Object(object).to_string()
}

/// Decode a column by its Postgres type name, falling back to text.
fn column_to_json(row: &PgRow, index: usize) -> JsonValue {
    let type_name = row.columns()[index].type_info().name().to_string();
    match type_name.as_str() {
        "BOOL" => decode(row.try_get::<Option<bool>, _>(index)),
        "INT2" => decode(row.try_get::<Option<i16>, _>(index)),
        "INT4" => decode(row.try_get::<Option<i32>, _>(index)),
        "INT8" => decode(row.try_get::<Option<i64>, _>(index)),
        "FLOAT4" => decode(row.try_get::<Option<f32>, _>(index)),
        "FLOAT8" => decode(row.try_get::<Option<f64>, _>(index)),
        "JSON" | "JSONB" => match row.try_get::<Option<JsonValue>, _>(index) {
            Ok(Some(value)) => value,
            _ => JsonValue::Null,
        },
        _ => decode(row.try_get::<Option<String>, _>(index)),
    }
}

fn decode<T: serde::Serialize>(result: std::result::Result<Option<T>, sqlx::Error>) -> JsonValue {
    match result {
        Ok(Some(value)) => serde_json::to_value(value).unwrap_or(JsonValue::Null),
        Ok(None) => JsonValue::Null,
        Err(error) => {
            tracing::debug!("undecodable column rendered as null: {error}");
            JsonValue::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn namespace(pairs: &[(&str, Value)]) -> Namespace {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_interpolates_in_order() {
        let ns = namespace(&[
            ("user_id", Value::Int(123)),
            ("status", Value::Str("active".to_string())),
        ]);
        let sql = interpolate(
            "SELECT * FROM users WHERE id = {{user_id}} AND status = {{ status }}",
            &ns,
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM users WHERE id = 123 AND status = 'active'"
        );
    }

    #[test]
    fn test_missing_placeholder_names_the_culprit() {
        let error = interpolate("SELECT {{nope}}", &Namespace::default()).unwrap_err();
        assert_eq!(error, "missing value for placeholder 'nope'");
    }

    #[test]
    fn test_string_quoting_round_trips() {
        let ns = namespace(&[("x", Value::Str("it's; DROP TABLE".to_string()))]);
        let sql = interpolate("SELECT {{x}}", &ns).unwrap();
        assert_eq!(sql, "SELECT 'it''s; DROP TABLE'");
    }

    #[test]
    fn test_list_interpolation_adds_no_parens() {
        let ns = namespace(&[(
            "xs",
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        )]);
        let sql = interpolate("SELECT * FROM t WHERE id IN ({{xs}})", &ns).unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE id IN (1, 2, 3)");
    }

    #[test]
    fn test_null_and_bool_literals() {
        let ns = namespace(&[("a", Value::Null), ("b", Value::Bool(false))]);
        let sql = interpolate("SELECT {{a}}, {{b}}", &ns).unwrap();
        assert_eq!(sql, "SELECT NULL, FALSE");
    }

    #[test]
    fn test_code_without_placeholders_unchanged() {
        let sql = interpolate("SELECT 1", &Namespace::default()).unwrap();
        assert_eq!(sql, "SELECT 1");
    }
}
