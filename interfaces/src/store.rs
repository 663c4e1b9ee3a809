use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::cmp::Ordering;

/// One record of a named collection, keyed by column name.
pub type Row = serde_json::Map<String, Value>;

/// A column assignment used by `update` and `insert`.
pub type Assignment = (String, FieldValue);

/// Parse a stored date. Values carrying a time part compare on their date prefix.
pub fn date_value(value: &Value) -> Option<NaiveDate> {
    let raw = value.as_str()?;
    let prefix = raw.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Date(NaiveDate),
    Int(i64),
    Text(String),
    Null,
}

impl FieldValue {
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            FieldValue::Int(i) => Value::from(*i),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Null => Value::Null,
        }
    }

    /// Orders a stored value against this one. `None` when either side is
    /// NULL or the two are not comparable.
    pub fn compare_stored(&self, stored: &Value) -> Option<Ordering> {
        match (self, stored) {
            (FieldValue::Null, _) | (_, Value::Null) => None,
            (FieldValue::Date(d), v) => date_value(v).map(|stored| stored.cmp(d)),
            (FieldValue::Int(i), Value::Number(n)) => {
                n.as_f64().and_then(|n| n.partial_cmp(&(*i as f64)))
            }
            (FieldValue::Text(s), Value::String(v)) => Some(v.as_str().cmp(s.as_str())),
            _ => None,
        }
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(d: NaiveDate) -> Self {
        FieldValue::Date(d)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<u32> for FieldValue {
    fn from(i: u32) -> Self {
        FieldValue::Int(i64::from(i))
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

/// Filter primitives every store backend must support.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, FieldValue),
    Neq(String, FieldValue),
    In(String, Vec<FieldValue>),
    NotNull(String),
    IsNull(String),
    Gte(String, FieldValue),
    Lte(String, FieldValue),
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _)
            | Filter::Neq(c, _)
            | Filter::In(c, _)
            | Filter::NotNull(c)
            | Filter::IsNull(c)
            | Filter::Gte(c, _)
            | Filter::Lte(c, _) => c,
        }
    }

    /// SQL semantics: a NULL (or missing) column only ever matches `IsNull`.
    pub fn matches(&self, row: &Row) -> bool {
        let stored = row.get(self.column()).unwrap_or(&Value::Null);
        match self {
            Filter::IsNull(_) => stored.is_null(),
            Filter::NotNull(_) => !stored.is_null(),
            Filter::Eq(_, v) => v.compare_stored(stored) == Some(Ordering::Equal),
            Filter::Neq(_, v) => {
                !stored.is_null()
                    && *v != FieldValue::Null
                    && v.compare_stored(stored) != Some(Ordering::Equal)
            }
            Filter::In(_, values) => values
                .iter()
                .any(|v| v.compare_stored(stored) == Some(Ordering::Equal)),
            Filter::Gte(_, v) => matches!(
                v.compare_stored(stored),
                Some(Ordering::Greater) | Some(Ordering::Equal)
            ),
            Filter::Lte(_, v) => matches!(
                v.compare_stored(stored),
                Some(Ordering::Less) | Some(Ordering::Equal)
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

/// A filtered, ordered and optionally limited view over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    pub order: Vec<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn eq(mut self, column: &str, value: impl Into<FieldValue>) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.into()));
        self
    }

    pub fn neq(mut self, column: &str, value: impl Into<FieldValue>) -> Self {
        self.filters.push(Filter::Neq(column.to_string(), value.into()));
        self
    }

    pub fn in_<V: Into<FieldValue>>(
        mut self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.filters.push(Filter::In(column.to_string(), values));
        self
    }

    pub fn not_null(mut self, column: &str) -> Self {
        self.filters.push(Filter::NotNull(column.to_string()));
        self
    }

    pub fn is_null(mut self, column: &str) -> Self {
        self.filters.push(Filter::IsNull(column.to_string()));
        self
    }

    pub fn gte(mut self, column: &str, value: impl Into<FieldValue>) -> Self {
        self.filters.push(Filter::Gte(column.to_string(), value.into()));
        self
    }

    pub fn lte(mut self, column: &str, value: impl Into<FieldValue>) -> Self {
        self.filters.push(Filter::Lte(column.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order.push(OrderBy {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Query failed on {table}: {message}")]
    Query { table: String, message: String },

    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Invalid row in {table}: {message}")]
    InvalidRow { table: String, message: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Tabular persistence the aggregation engine reads from and writes to.
///
/// Implementations own their connection handling. Callers never retry on
/// their behalf.
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// Rows matching the query, projected to its columns (all columns when empty).
    async fn select(&self, query: &Query) -> StoreResult<Vec<Row>>;

    /// Apply the assignments to every matching row and return the changed rows.
    /// An empty result means nothing matched.
    async fn update(&self, query: &Query, fields: &[Assignment]) -> StoreResult<Vec<Row>>;

    /// Insert one row and return it as stored.
    async fn insert(&self, table: &str, fields: &[Assignment]) -> StoreResult<Vec<Row>>;

    /// Exact number of rows matching the query's filters.
    async fn count(&self, query: &Query) -> StoreResult<u64>;
}
