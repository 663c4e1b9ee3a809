use async_trait::async_trait;
use interfaces::{Assignment, Query, Row, StoreError, StoreResult, TabularStore};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-process tables for tests and dry runs. Follows the same NULL and date
/// semantics as the Postgres backend.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Row>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_table(&self, table: &str) {
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default();
    }

    /// Append rows, creating the table when needed.
    pub async fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// Snapshot of a table, empty when it does not exist.
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

fn compare_json(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        // NULLs sort last, as Postgres does for ascending order.
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn project(row: &Row, columns: &[String]) -> Row {
    if columns.is_empty() {
        return row.clone();
    }
    columns
        .iter()
        .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
        .collect()
}

#[async_trait]
impl TabularStore for MemoryStore {
    async fn select(&self, query: &Query) -> StoreResult<Vec<Row>> {
        let tables = self.tables.read().await;
        let rows = tables
            .get(&query.table)
            .ok_or_else(|| StoreError::UnknownTable(query.table.clone()))?;

        let mut matched: Vec<&Row> = rows.iter().filter(|row| query.matches(row)).collect();
        for order in query.order.iter().rev() {
            matched.sort_by(|a, b| {
                let a = a.get(&order.column).unwrap_or(&Value::Null);
                let b = b.get(&order.column).unwrap_or(&Value::Null);
                let ord = compare_json(a, b);
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .take(limit)
            .map(|row| project(row, &query.columns))
            .collect())
    }

    async fn update(&self, query: &Query, fields: &[Assignment]) -> StoreResult<Vec<Row>> {
        let mut tables = self.tables.write().await;
        let rows = tables
            .get_mut(&query.table)
            .ok_or_else(|| StoreError::UnknownTable(query.table.clone()))?;

        let mut changed = Vec::new();
        for row in rows.iter_mut().filter(|row| query.matches(row)) {
            for (column, value) in fields {
                row.insert(column.clone(), value.to_json());
            }
            changed.push(row.clone());
        }
        Ok(changed)
    }

    async fn insert(&self, table: &str, fields: &[Assignment]) -> StoreResult<Vec<Row>> {
        let mut tables = self.tables.write().await;
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

        let row: Row = fields
            .iter()
            .map(|(column, value)| (column.clone(), value.to_json()))
            .collect();
        rows.push(row.clone());
        Ok(vec![row])
    }

    async fn count(&self, query: &Query) -> StoreResult<u64> {
        let tables = self.tables.read().await;
        let rows = tables
            .get(&query.table)
            .ok_or_else(|| StoreError::UnknownTable(query.table.clone()))?;
        Ok(rows.iter().filter(|row| query.matches(row)).count() as u64)
    }
}
