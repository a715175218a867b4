use chrono::{DateTime, NaiveDate, Utc};
use derive_more::From;
use sqlx::{Executor, MySql};

use crate::error::AppError;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq, From)]
pub enum SqlValue {
    Text(Option<String>),
    Int(Option<u64>),
    Float(Option<f64>),
    Bool(bool),
    Date(Option<NaiveDate>),
    Timestamp(Option<DateTime<Utc>>),
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(Some(value))
    }
}

impl From<u64> for SqlValue {
    fn from(value: u64) -> Self {
        SqlValue::Int(Some(value))
    }
}

/// Binds every [`SqlValue`] in order onto any sqlx query builder.
macro_rules! bind_values {
    ($query:expr, $values:expr) => {{
        let mut query = $query;
        for value in $values {
            query = match value {
                $crate::utils::db_utils::SqlValue::Text(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::Int(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::Float(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::Bool(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::Date(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::Timestamp(v) => query.bind(v),
            };
        }
        query
    }};
}
pub(crate) use bind_values;

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// ===============================
/// Build UPDATE SQL from whitelisted columns
/// ===============================
pub fn build_update_sql(
    table: &str,
    changes: Vec<(&'static str, SqlValue)>,
    id_column: &str,
    id_value: u64,
) -> Result<SqlUpdate, AppError> {
    if changes.is_empty() {
        return Err(AppError::BadRequest("No fields provided for update".into()));
    }

    if let Some(bad) = std::iter::once(table)
        .chain(std::iter::once(id_column))
        .chain(changes.iter().map(|(column, _)| *column))
        .find(|name| !is_identifier(name))
    {
        return Err(AppError::Internal(format!("refusing to build SQL for identifier {bad:?}")));
    }

    let set_clause = changes
        .iter()
        .map(|(column, _)| format!("{} = ?", column))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!("UPDATE {} SET {} WHERE {} = ?", table, set_clause, id_column);

    let mut values: Vec<SqlValue> = changes.into_iter().map(|(_, value)| value).collect();
    values.push(SqlValue::Int(Some(id_value)));

    Ok(SqlUpdate { sql, values })
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update<'e, E>(executor: E, update: SqlUpdate) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    let SqlUpdate { sql, values } = update;
    let query = bind_values!(sqlx::query(&sql), values);

    let result = query.execute(executor).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_set_clause_in_order() {
        let update = build_update_sql(
            "employees",
            vec![
                ("position", SqlValue::from("Lead".to_string())),
                ("manager_id", SqlValue::Int(None)),
            ],
            "id",
            9,
        )
        .unwrap();

        assert_eq!(update.sql, "UPDATE employees SET position = ?, manager_id = ? WHERE id = ?");
        assert_eq!(
            update.values,
            vec![
                SqlValue::Text(Some("Lead".into())),
                SqlValue::Int(None),
                SqlValue::Int(Some(9)),
            ]
        );
    }

    #[test]
    fn empty_changes_are_rejected() {
        assert!(matches!(
            build_update_sql("users", vec![], "id", 1),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn suspicious_identifiers_are_rejected() {
        let result = build_update_sql(
            "users",
            vec![("email = 'x' --", SqlValue::Bool(true))],
            "id",
            1,
        );
        assert!(matches!(result, Err(AppError::Internal(_))));
    }
}
