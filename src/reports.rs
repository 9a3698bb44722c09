//! Financial reporting over a date range.
//!
//! Gross sales count delivered orders only; cancelled orders are reported
//! separately by value. Net profit is gross sales minus expenses and
//! salaries paid in the same range.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::order_status::OrderStatus;
use crate::orders::{count_by_status, Order, ORDERS_TABLE};
use crate::remote::{value_f64, value_str, Query, RemoteStore};

pub const EXPENSES_TABLE: &str = "expenses";
pub const SALARIES_TABLE: &str = "salaries";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if to < from {
            return Err(Error::Validation(format!(
                "report range ends ({to}) before it starts ({from})"
            )));
        }
        Ok(Self { from, to })
    }

    /// Inclusive lower bound for timestamp columns.
    pub fn start_ts(&self) -> String {
        format!("{}T00:00:00Z", self.from)
    }

    /// Exclusive upper bound for timestamp columns: midnight after `to`.
    /// Stored timestamps carry sub-second precision, so an inclusive
    /// `23:59:59` bound would miss the final second.
    pub fn end_ts_exclusive(&self) -> String {
        match self.to.succ_opt() {
            Some(next) => format!("{next}T00:00:00Z"),
            None => format!("{}T23:59:59.999999Z", self.to),
        }
    }

    fn orders_query(&self) -> Query {
        Query::new()
            .gte("created_at", self.start_ts())
            .lt("created_at", self.end_ts_exclusive())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialReport {
    pub range: DateRange,
    pub order_count: usize,
    pub orders_by_status: BTreeMap<OrderStatus, usize>,
    pub gross_sales: f64,
    pub average_order_value: f64,
    pub cancelled_value: f64,
    pub expenses_total: f64,
    pub expenses_by_category: BTreeMap<String, f64>,
    pub salaries_total: f64,
    pub net_profit: f64,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn build_report(
    range: DateRange,
    orders: &[Order],
    expenses: &[Value],
    salaries: &[Value],
) -> FinancialReport {
    let delivered: Vec<&Order> = orders
        .iter()
        .filter(|o| o.status == OrderStatus::Delivered)
        .collect();
    let gross_sales: f64 = delivered.iter().map(|o| o.total_amount).sum();
    let cancelled_value: f64 = orders
        .iter()
        .filter(|o| o.status == OrderStatus::Cancelled)
        .map(|o| o.total_amount)
        .sum();
    let average_order_value = if delivered.is_empty() {
        0.0
    } else {
        gross_sales / delivered.len() as f64
    };

    let mut expenses_by_category: BTreeMap<String, f64> = BTreeMap::new();
    for expense in expenses {
        let amount = value_f64(expense, &["amount"]).unwrap_or(0.0);
        let category =
            value_str(expense, &["category"]).unwrap_or_else(|| "uncategorized".to_string());
        *expenses_by_category.entry(category).or_insert(0.0) += amount;
    }
    for value in expenses_by_category.values_mut() {
        *value = round2(*value);
    }
    let expenses_total: f64 = expenses
        .iter()
        .filter_map(|e| value_f64(e, &["amount"]))
        .sum();
    let salaries_total: f64 = salaries
        .iter()
        .filter_map(|s| value_f64(s, &["amount", "net_amount"]))
        .sum();

    FinancialReport {
        range,
        order_count: orders.len(),
        orders_by_status: count_by_status(orders),
        gross_sales: round2(gross_sales),
        average_order_value: round2(average_order_value),
        cancelled_value: round2(cancelled_value),
        expenses_total: round2(expenses_total),
        expenses_by_category,
        salaries_total: round2(salaries_total),
        net_profit: round2(gross_sales - expenses_total - salaries_total),
    }
}

/// Load orders, expenses and salaries for `range` and build the report.
pub async fn fetch_report(store: &dyn RemoteStore, range: DateRange) -> Result<FinancialReport> {
    let order_rows = store
        .select(ORDERS_TABLE, &range.orders_query())
        .await?;
    let mut orders = Vec::with_capacity(order_rows.len());
    for row in &order_rows {
        match Order::from_row(row) {
            Ok(order) => orders.push(order),
            Err(e) => warn!(error = %e, "order excluded from report"),
        }
    }

    let expenses = store
        .select(
            EXPENSES_TABLE,
            &Query::new()
                .gte("expense_date", range.from)
                .lte("expense_date", range.to),
        )
        .await?;
    let salaries = store
        .select(
            SALARIES_TABLE,
            &Query::new()
                .gte("payment_date", range.from)
                .lte("payment_date", range.to),
        )
        .await?;
    debug!(
        orders = orders.len(),
        expenses = expenses.len(),
        salaries = salaries.len(),
        "report inputs loaded"
    );

    Ok(build_report(range, &orders, &expenses, &salaries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::MemoryStore;
    use serde_json::json;

    fn october() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 10, 31).unwrap(),
        )
        .unwrap()
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.seed(
            ORDERS_TABLE,
            vec![
                json!({ "id": "o1", "status": "delivered", "total_amount": 300, "created_at": "2026-10-02T12:00:00Z" }),
                json!({ "id": "o2", "status": "delivered", "total_amount": "150.50", "created_at": "2026-10-31T22:00:00Z" }),
                json!({ "id": "o3", "status": "cancelled", "total_amount": 80, "created_at": "2026-10-05T12:00:00Z" }),
                json!({ "id": "o4", "status": "preparing", "total_amount": 60, "created_at": "2026-10-06T12:00:00Z" }),
                json!({ "id": "o5", "status": "delivered", "total_amount": 999, "created_at": "2026-11-01T00:00:01Z" }),
            ],
        );
        store.seed(
            EXPENSES_TABLE,
            vec![
                json!({ "id": "e1", "amount": 40, "category": "rent", "expense_date": "2026-10-01" }),
                json!({ "id": "e2", "amount": 10.25, "category": "utilities", "expense_date": "2026-10-15" }),
                json!({ "id": "e3", "amount": 5, "expense_date": "2026-10-20" }),
                json!({ "id": "e4", "amount": 500, "category": "rent", "expense_date": "2026-09-30" }),
            ],
        );
        store.seed(
            SALARIES_TABLE,
            vec![json!({ "id": "s1", "employee_id": "emp-1", "amount": 200, "payment_date": "2026-10-28" })],
        );
        store
    }

    #[test]
    fn range_must_be_ordered() {
        let a = NaiveDate::from_ymd_opt(2026, 10, 2).unwrap();
        let b = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        assert!(DateRange::new(a, b).is_err());
        assert!(DateRange::new(a, a).is_ok());
    }

    #[test]
    fn order_range_is_half_open_at_the_next_midnight() {
        assert_eq!(
            october().orders_query().to_params(),
            vec![
                ("created_at".to_string(), "gte.2026-10-01T00:00:00Z".to_string()),
                ("created_at".to_string(), "lt.2026-11-01T00:00:00Z".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn orders_in_the_final_second_are_included() {
        let store = MemoryStore::new();
        store.seed(
            ORDERS_TABLE,
            vec![
                json!({ "id": "a", "status": "delivered", "total_amount": 10, "created_at": "2026-10-31T23:59:59.500Z" }),
                json!({ "id": "b", "status": "delivered", "total_amount": 99, "created_at": "2026-11-01T00:00:00Z" }),
            ],
        );
        let report = fetch_report(&store, october()).await.unwrap();
        assert_eq!(report.order_count, 1);
        assert_eq!(report.gross_sales, 10.0);
    }

    #[tokio::test]
    async fn report_counts_only_delivered_sales() {
        let store = seeded();
        let report = fetch_report(&store, october()).await.unwrap();

        assert_eq!(report.order_count, 4);
        assert_eq!(report.gross_sales, 450.5);
        assert_eq!(report.average_order_value, 225.25);
        assert_eq!(report.cancelled_value, 80.0);
        assert_eq!(report.orders_by_status[&OrderStatus::Delivered], 2);
        assert_eq!(report.orders_by_status[&OrderStatus::Preparing], 1);

        assert_eq!(report.expenses_total, 55.25);
        assert_eq!(report.expenses_by_category["rent"], 40.0);
        assert_eq!(report.expenses_by_category["uncategorized"], 5.0);
        assert_eq!(report.salaries_total, 200.0);
        assert_eq!(report.net_profit, 195.25);
    }

    #[test]
    fn empty_period_reports_zeroes() {
        let report = build_report(october(), &[], &[], &[]);
        assert_eq!(report.gross_sales, 0.0);
        assert_eq!(report.average_order_value, 0.0);
        assert_eq!(report.net_profit, 0.0);
        assert!(report.orders_by_status.values().all(|n| *n == 0));
    }

    #[tokio::test]
    async fn backend_failure_propagates() {
        let store = seeded();
        store.set_fail_reads(true);
        assert!(matches!(
            fetch_report(&store, october()).await,
            Err(Error::Remote(_))
        ));
    }
}
