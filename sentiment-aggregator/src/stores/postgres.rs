use crate::types::Result;
use async_trait::async_trait;
use interfaces::{Assignment, FieldValue, Filter, Query, Row, StoreError, StoreResult, TabularStore};
use serde_json::Value;
use sqlx::{PgPool, Pool, Postgres, QueryBuilder, Row as _};
use tracing::debug;

/// `TabularStore` over Postgres. Instrument tables are addressed by name, so
/// queries are assembled at runtime with every value bound as a parameter.
pub struct PgStore {
    db: Pool<Postgres>,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db = PgPool::connect(database_url).await?;
        Ok(Self { db })
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn map_err(table: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("42P01") => {
            StoreError::UnknownTable(table.to_string())
        }
        e @ (sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)) => {
            StoreError::Connection(e.to_string())
        }
        other => StoreError::Query {
            table: table.to_string(),
            message: other.to_string(),
        },
    }
}

fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: &FieldValue) {
    match value {
        FieldValue::Date(d) => {
            qb.push_bind(*d);
        }
        FieldValue::Int(i) => {
            qb.push_bind(*i);
        }
        FieldValue::Text(s) => {
            qb.push_bind(s.clone());
        }
        FieldValue::Null => {
            qb.push("NULL");
        }
    }
}

/// Date filters compare on the stored value's date part, so `timestamp` and
/// `text` columns match the same rows a `date` column would.
fn compares_dates(filter: &Filter) -> bool {
    match filter {
        Filter::Eq(_, v) | Filter::Neq(_, v) | Filter::Gte(_, v) | Filter::Lte(_, v) => {
            matches!(v, FieldValue::Date(_))
        }
        Filter::In(_, values) => values.iter().any(|v| matches!(v, FieldValue::Date(_))),
        Filter::NotNull(_) | Filter::IsNull(_) => false,
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filters: &[Filter]) {
    for (i, filter) in filters.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        qb.push(quote_ident(filter.column()));
        if compares_dates(filter) {
            qb.push("::date");
        }
        match filter {
            Filter::Eq(_, v) => {
                qb.push(" = ");
                push_value(qb, v);
            }
            Filter::Neq(_, v) => {
                qb.push(" <> ");
                push_value(qb, v);
            }
            Filter::In(_, values) if values.is_empty() => {
                // Matches nothing.
                qb.push(" IN (NULL)");
            }
            Filter::In(_, values) => {
                qb.push(" IN (");
                for (j, v) in values.iter().enumerate() {
                    if j > 0 {
                        qb.push(", ");
                    }
                    push_value(qb, v);
                }
                qb.push(")");
            }
            Filter::NotNull(_) => {
                qb.push(" IS NOT NULL");
            }
            Filter::IsNull(_) => {
                qb.push(" IS NULL");
            }
            Filter::Gte(_, v) => {
                qb.push(" >= ");
                push_value(qb, v);
            }
            Filter::Lte(_, v) => {
                qb.push(" <= ");
                push_value(qb, v);
            }
        }
    }
}

fn push_assignments(qb: &mut QueryBuilder<'_, Postgres>, fields: &[Assignment]) {
    for (i, (column, value)) in fields.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(quote_ident(column));
        qb.push(" = ");
        push_value(qb, value);
    }
}

fn decode_rows(table: &str, rows: Vec<sqlx::postgres::PgRow>) -> StoreResult<Vec<Row>> {
    rows.into_iter()
        .map(|row| {
            let value: Value = row.try_get("row").map_err(|e| map_err(table, e))?;
            match value {
                Value::Object(map) => Ok(map),
                other => Err(StoreError::InvalidRow {
                    table: table.to_string(),
                    message: format!("expected an object, got {}", other),
                }),
            }
        })
        .collect()
}

#[async_trait]
impl TabularStore for PgStore {
    async fn select(&self, query: &Query) -> StoreResult<Vec<Row>> {
        let columns = if query.columns.is_empty() {
            "*".to_string()
        } else {
            query
                .columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut qb = QueryBuilder::new("SELECT to_jsonb(t) AS row FROM (SELECT ");
        qb.push(columns);
        qb.push(" FROM ");
        qb.push(quote_ident(&query.table));
        push_filters(&mut qb, &query.filters);
        for (i, order) in query.order.iter().enumerate() {
            qb.push(if i == 0 { " ORDER BY " } else { ", " });
            qb.push(quote_ident(&order.column));
            qb.push(if order.ascending { " ASC" } else { " DESC" });
        }
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit as i64);
        }
        qb.push(") t");

        debug!("{}", qb.sql());
        let rows = qb
            .build()
            .fetch_all(&self.db)
            .await
            .map_err(|e| map_err(&query.table, e))?;
        decode_rows(&query.table, rows)
    }

    async fn update(&self, query: &Query, fields: &[Assignment]) -> StoreResult<Vec<Row>> {
        let mut qb = QueryBuilder::new("UPDATE ");
        qb.push(quote_ident(&query.table));
        qb.push(" AS t SET ");
        push_assignments(&mut qb, fields);
        push_filters(&mut qb, &query.filters);
        qb.push(" RETURNING to_jsonb(t) AS row");

        let rows = qb
            .build()
            .fetch_all(&self.db)
            .await
            .map_err(|e| map_err(&query.table, e))?;
        decode_rows(&query.table, rows)
    }

    async fn insert(&self, table: &str, fields: &[Assignment]) -> StoreResult<Vec<Row>> {
        let mut qb = QueryBuilder::new("INSERT INTO ");
        qb.push(quote_ident(table));
        qb.push(" AS t (");
        qb.push(
            fields
                .iter()
                .map(|(c, _)| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
        );
        qb.push(") VALUES (");
        for (i, (_, value)) in fields.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            push_value(&mut qb, value);
        }
        qb.push(") RETURNING to_jsonb(t) AS row");

        let rows = qb
            .build()
            .fetch_all(&self.db)
            .await
            .map_err(|e| map_err(table, e))?;
        decode_rows(table, rows)
    }

    async fn count(&self, query: &Query) -> StoreResult<u64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) AS n FROM ");
        qb.push(quote_ident(&query.table));
        push_filters(&mut qb, &query.filters);

        let row = qb
            .build()
            .fetch_one(&self.db)
            .await
            .map_err(|e| map_err(&query.table, e))?;
        let n: i64 = row.try_get("n").map_err(|e| map_err(&query.table, e))?;
        Ok(n.max(0) as u64)
    }
}
