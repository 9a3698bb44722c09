//! In-process [`RemoteStore`] used by tests and by `--fixture` runs of the CLI.
//!
//! Rows are plain JSON objects grouped by table name. Filters follow the
//! PostgREST semantics we rely on: `eq`/`in` compare text renderings,
//! range operators compare numerically when both sides parse as numbers,
//! chronologically when both are RFC 3339 timestamps, lexically otherwise.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::DateTime;
use serde_json::Value;
use uuid::Uuid;

use super::{value_str, FilterOp, Query, RemoteStore};
use crate::error::{Error, Result};

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents of `table`.
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.insert(table.to_string(), rows);
        }
    }

    /// Build a store from a fixture document shaped `{ "table": [rows...] }`.
    pub fn from_fixture(doc: Value) -> Result<Self> {
        let Value::Object(tables) = doc else {
            return Err(Error::Validation(
                "fixture must be an object of table name -> rows".into(),
            ));
        };
        let store = Self::new();
        for (table, rows) in tables {
            match rows {
                Value::Array(rows) => store.seed(&table, rows),
                _ => {
                    return Err(Error::Validation(format!(
                        "fixture table {table} must be an array"
                    )))
                }
            }
        }
        Ok(store)
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .map(|t| t.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Make subsequent reads fail as if the backend were unreachable.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, AtomicOrdering::SeqCst);
    }

    /// Make subsequent inserts/updates fail as if the backend were unreachable.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, AtomicOrdering::SeqCst);
    }

    /// Number of insert/update calls received, including failed ones.
    pub fn write_count(&self) -> usize {
        self.writes.load(AtomicOrdering::SeqCst)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<Value>>>> {
        self.tables
            .lock()
            .map_err(|e| Error::Remote(format!("memory store poisoned: {e}")))
    }

    fn begin_write(&self) -> Result<()> {
        self.writes.fetch_add(1, AtomicOrdering::SeqCst);
        if self.fail_writes.load(AtomicOrdering::SeqCst) {
            return Err(Error::Remote("Cannot reach backend (simulated)".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        if self.fail_reads.load(AtomicOrdering::SeqCst) {
            return Err(Error::Remote("Cannot reach backend (simulated)".into()));
        }
        let tables = self.lock()?;
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|rows| rows.iter().filter(|r| matches(r, query)).cloned().collect())
            .unwrap_or_default();
        if let Some((column, ascending)) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare_column(a, b, column);
                if *ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>> {
        self.begin_write()?;
        let incoming = match row {
            Value::Array(rows) => rows,
            other => vec![other],
        };
        let mut inserted = Vec::with_capacity(incoming.len());
        for mut row in incoming {
            let Value::Object(ref mut obj) = row else {
                return Err(Error::Validation("insert expects JSON objects".into()));
            };
            obj.entry("id")
                .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
            inserted.push(row);
        }
        let mut tables = self.lock()?;
        tables
            .entry(table.to_string())
            .or_default()
            .extend(inserted.iter().cloned());
        Ok(inserted)
    }

    async fn update(&self, table: &str, query: &Query, patch: Value) -> Result<Vec<Value>> {
        self.begin_write()?;
        let Value::Object(patch) = patch else {
            return Err(Error::Validation("update expects a JSON object".into()));
        };
        let mut tables = self.lock()?;
        let mut updated = Vec::new();
        if let Some(rows) = tables.get_mut(table) {
            for row in rows.iter_mut().filter(|r| matches(r, query)) {
                if let Value::Object(obj) = row {
                    for (k, v) in &patch {
                        obj.insert(k.clone(), v.clone());
                    }
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }
}

fn matches(row: &Value, query: &Query) -> bool {
    query.filters.iter().all(|filter| {
        let Some(actual) = value_str(row, &[filter.column.as_str()]) else {
            return false;
        };
        match &filter.op {
            FilterOp::Eq(expected) => actual == *expected,
            FilterOp::In(values) => values.iter().any(|v| *v == actual),
            FilterOp::Gte(bound) => compare_text(&actual, bound) != Ordering::Less,
            FilterOp::Lte(bound) => compare_text(&actual, bound) != Ordering::Greater,
            FilterOp::Lt(bound) => compare_text(&actual, bound) == Ordering::Less,
        }
    })
}

fn compare_text(a: &str, b: &str) -> Ordering {
    if let (Ok(x), Ok(y)) = (a.parse::<f64>(), b.parse::<f64>()) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    if let (Ok(x), Ok(y)) = (
        DateTime::parse_from_rfc3339(a),
        DateTime::parse_from_rfc3339(b),
    ) {
        return x.cmp(&y);
    }
    a.cmp(b)
}

fn compare_column(a: &Value, b: &Value, column: &str) -> Ordering {
    match (value_str(a, &[column]), value_str(b, &[column])) {
        (Some(x), Some(y)) => compare_text(&x, &y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.seed(
            "orders",
            vec![
                json!({ "id": "o1", "status": "pending", "total_amount": 90, "created_at": "2026-10-01T10:00:00Z" }),
                json!({ "id": "o2", "status": "ready", "total_amount": 250, "created_at": "2026-10-03T10:00:00Z" }),
                json!({ "id": "o3", "status": "pending", "total_amount": 1200, "created_at": "2026-10-02T10:00:00Z" }),
            ],
        );
        store
    }

    #[tokio::test]
    async fn select_filters_orders_and_limits() {
        let store = store();
        let rows = store
            .select(
                "orders",
                &Query::new()
                    .eq("status", "pending")
                    .order_by("total_amount", false)
                    .limit(1),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "o3");
    }

    #[tokio::test]
    async fn range_filters_compare_numbers_numerically() {
        let store = store();
        let rows = store
            .select("orders", &Query::new().gte("total_amount", 100).lte("total_amount", 300))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "o2");
    }

    #[tokio::test]
    async fn timestamps_compare_chronologically() {
        let store = MemoryStore::new();
        store.seed(
            "orders",
            vec![
                json!({ "id": "late", "created_at": "2026-10-31T23:59:59.500Z" }),
                json!({ "id": "cairo", "created_at": "2026-11-01T01:30:00+02:00" }),
                json!({ "id": "next", "created_at": "2026-11-01T00:00:00Z" }),
            ],
        );
        let rows = store
            .select(
                "orders",
                &Query::new()
                    .gte("created_at", "2026-10-31T00:00:00Z")
                    .lt("created_at", "2026-11-01T00:00:00Z"),
            )
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["late", "cairo"]);
    }

    #[tokio::test]
    async fn update_returns_only_matched_rows() {
        let store = store();
        let updated = store
            .update("orders", &Query::new().eq("id", "o2"), json!({ "status": "shipped" }))
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0]["status"], "shipped");

        let none = store
            .update("orders", &Query::new().eq("id", "nope"), json!({ "status": "shipped" }))
            .await
            .unwrap();
        assert!(none.is_empty());
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn insert_assigns_missing_ids() {
        let store = MemoryStore::new();
        let inserted = store
            .insert("expenses", json!([{ "amount": 10 }, { "id": "e2", "amount": 5 }]))
            .await
            .unwrap();
        assert_eq!(inserted.len(), 2);
        assert!(inserted[0]["id"].as_str().is_some());
        assert_eq!(inserted[1]["id"], "e2");
        assert_eq!(store.rows("expenses").len(), 2);
    }

    #[tokio::test]
    async fn injected_write_failure_leaves_rows_untouched() {
        let store = store();
        store.set_fail_writes(true);
        let err = store
            .update("orders", &Query::new().eq("id", "o1"), json!({ "status": "confirmed" }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Remote(_)));
        assert_eq!(store.rows("orders")[0]["status"], "pending");
    }
}
