//! Remote relational store abstraction.
//!
//! The back-office owns no business data: every read and write goes to a
//! hosted PostgREST-style backend. [`RemoteStore`] is the seam between the
//! domain modules and that backend; [`crate::api::SupabaseClient`] talks
//! HTTP, [`memory::MemoryStore`] keeps rows in process for tests and demos.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub mod memory;

/// Comparison operators supported by the filters we issue.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(String),
    In(Vec<String>),
    Gte(String),
    Lte(String),
    Lt(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
}

/// Row selection for `select` and `update` calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub columns: Option<String>,
    pub filters: Vec<Filter>,
    pub order: Option<(String, bool)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.columns = Some(columns.to_string());
        self
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push(Filter {
            column: column.to_string(),
            op: FilterOp::Eq(value.to_string()),
        });
        self
    }

    pub fn in_list<I, S>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.filters.push(Filter {
            column: column.to_string(),
            op: FilterOp::In(values.into_iter().map(|v| v.to_string()).collect()),
        });
        self
    }

    pub fn gte(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push(Filter {
            column: column.to_string(),
            op: FilterOp::Gte(value.to_string()),
        });
        self
    }

    pub fn lte(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push(Filter {
            column: column.to_string(),
            op: FilterOp::Lte(value.to_string()),
        });
        self
    }

    pub fn lt(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push(Filter {
            column: column.to_string(),
            op: FilterOp::Lt(value.to_string()),
        });
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some((column.to_string(), ascending));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// PostgREST query-string pairs, in a stable order.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(columns) = &self.columns {
            params.push(("select".to_string(), columns.clone()));
        }
        for filter in &self.filters {
            let rendered = match &filter.op {
                FilterOp::Eq(v) => format!("eq.{v}"),
                FilterOp::In(values) => format!("in.({})", values.join(",")),
                FilterOp::Gte(v) => format!("gte.{v}"),
                FilterOp::Lte(v) => format!("lte.{v}"),
                FilterOp::Lt(v) => format!("lt.{v}"),
            };
            params.push((filter.column.clone(), rendered));
        }
        if let Some((column, ascending)) = &self.order {
            let dir = if *ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{column}.{dir}")));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }
}

/// Request/response access to the hosted relations.
///
/// Writes return the affected rows (`Prefer: return=representation`), so an
/// empty vector from `update` means nothing matched.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>>;

    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>>;

    async fn update(&self, table: &str, query: &Query, patch: Value) -> Result<Vec<Value>>;
}

// ---------------------------------------------------------------------------
// Row field helpers
// ---------------------------------------------------------------------------

/// First non-empty string among `keys`. Numeric ids are stringified.
pub fn value_str(v: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        match v.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.trim().to_string()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

/// First numeric value among `keys`; numeric strings (Postgres `numeric`
/// columns arrive as text) are parsed.
pub fn value_f64(v: &Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        match v.get(*key) {
            Some(Value::Number(n)) => return n.as_f64(),
            Some(Value::String(s)) => {
                if let Ok(parsed) = s.trim().parse::<f64>() {
                    return Some(parsed);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn value_i64(v: &Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        match v.get(*key) {
            Some(Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    return Some(i);
                }
                if let Some(f) = n.as_f64() {
                    return Some(f.round() as i64);
                }
            }
            Some(Value::String(s)) => {
                if let Ok(parsed) = s.trim().parse::<i64>() {
                    return Some(parsed);
                }
            }
            _ => {}
        }
    }
    None
}
