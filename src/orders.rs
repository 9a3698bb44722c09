//! Order lifecycle operations against the hosted `orders` relation.
//!
//! Status changes are pessimistic: the caller's [`Order`] is only advanced
//! after the backend acknowledges the write. A rejected or failed
//! transition leaves it exactly as it was. There is no concurrency check
//! against other writers; the last write wins.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::db::{self, DbState};
use crate::error::{Error, Result};
use crate::order_status::OrderStatus;
use crate::remote::{value_f64, value_str, Query, RemoteStore};

pub const ORDERS_TABLE: &str = "orders";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: String,
    pub status: OrderStatus,
    pub total_amount: f64,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub neighborhood_id: Option<String>,
    pub payment_method: Option<String>,
    pub status_note: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Order {
    /// Build from a backend row. `id` and a recognisable `status` are
    /// required; everything else is optional.
    pub fn from_row(row: &Value) -> Result<Self> {
        let id = value_str(row, &["id"])
            .ok_or_else(|| Error::Remote("order row without id".into()))?;
        let status = value_str(row, &["status"])
            .ok_or_else(|| Error::UnknownStatus(String::new()))?
            .parse::<OrderStatus>()?;
        Ok(Self {
            id,
            status,
            total_amount: value_f64(row, &["total_amount", "total"]).unwrap_or(0.0),
            customer_name: value_str(row, &["customer_name"]),
            customer_phone: value_str(row, &["customer_phone"]),
            neighborhood_id: value_str(row, &["neighborhood_id"]),
            payment_method: value_str(row, &["payment_method"]),
            status_note: value_str(row, &["status_note"]),
            created_at: value_str(row, &["created_at"]),
            updated_at: value_str(row, &["updated_at"]),
        })
    }

    pub fn allowed_next(&self) -> &'static [OrderStatus] {
        self.status.allowed_next()
    }
}

/// What a confirmed transition changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionReceipt {
    pub order_id: String,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub note: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Filter for [`OrderWorkflow::list_orders`].
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub created_from: Option<String>,
    pub created_to: Option<String>,
    pub limit: Option<usize>,
}

pub struct OrderWorkflow {
    store: Arc<dyn RemoteStore>,
    journal: Option<Arc<DbState>>,
}

impl OrderWorkflow {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            journal: None,
        }
    }

    /// Also record confirmed transitions in the local journal.
    pub fn with_journal(mut self, db: Arc<DbState>) -> Self {
        self.journal = Some(db);
        self
    }

    pub async fn fetch_order(&self, order_id: &str) -> Result<Order> {
        let rows = self
            .store
            .select(ORDERS_TABLE, &Query::new().eq("id", order_id).limit(1))
            .await?;
        let row = rows
            .first()
            .ok_or_else(|| Error::NotFound(format!("order {order_id}")))?;
        Order::from_row(row)
    }

    /// Newest first. Rows with an unrecognised status are skipped.
    pub async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let mut query = Query::new().order_by("created_at", false);
        if let Some(status) = filter.status {
            query = query.eq("status", status.as_str());
        }
        if let Some(from) = &filter.created_from {
            query = query.gte("created_at", from);
        }
        if let Some(to) = &filter.created_to {
            query = query.lte("created_at", to);
        }
        if let Some(limit) = filter.limit {
            query = query.limit(limit);
        }

        let rows = self.store.select(ORDERS_TABLE, &query).await?;
        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            match Order::from_row(row) {
                Ok(order) => orders.push(order),
                Err(e) => warn!(error = %e, "skipping unreadable order row"),
            }
        }
        Ok(orders)
    }

    /// Apply `target` to `order`.
    ///
    /// Rejected without any backend call when the transition table does not
    /// allow it. Otherwise issues one update of `status` and `updated_at`
    /// (and `status_note` when a note is given) and, once the backend
    /// confirms, advances `order` in place.
    pub async fn transition(
        &self,
        order: &mut Order,
        target: OrderStatus,
        note: Option<&str>,
    ) -> Result<TransitionReceipt> {
        let from = order.status;
        if !from.can_transition_to(target) {
            warn!(order_id = %order.id, %from, to = %target, "rejected status transition");
            return Err(Error::InvalidTransition { from, to: target });
        }

        let note = note.map(str::trim).filter(|n| !n.is_empty());
        let now = Utc::now();
        let mut patch = json!({
            "status": target.as_str(),
            "updated_at": now.to_rfc3339(),
        });
        if let Some(note) = note {
            patch["status_note"] = Value::String(note.to_string());
        }

        let updated = match self
            .store
            .update(ORDERS_TABLE, &Query::new().eq("id", &order.id), patch)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(order_id = %order.id, %from, to = %target, error = %e, "status update failed");
                return Err(e);
            }
        };
        if updated.is_empty() {
            warn!(order_id = %order.id, "status update matched no order");
            return Err(Error::NotFound(format!("order {}", order.id)));
        }

        order.status = target;
        order.updated_at = Some(now.to_rfc3339());
        if let Some(note) = note {
            order.status_note = Some(note.to_string());
        }
        info!(order_id = %order.id, %from, to = %target, "order status updated");

        if let Some(journal) = &self.journal {
            let recorded = journal
                .lock()
                .and_then(|conn| db::record_transition(&conn, &order.id, from, target, note));
            if let Err(e) = recorded {
                warn!(order_id = %order.id, error = %e, "failed to journal status transition");
            }
        }

        Ok(TransitionReceipt {
            order_id: order.id.clone(),
            from,
            to: target,
            note: note.map(str::to_string),
            updated_at: now,
        })
    }

    /// Fetch the order by id, then [`transition`](Self::transition) it.
    pub async fn transition_by_id(
        &self,
        order_id: &str,
        target: OrderStatus,
        note: Option<&str>,
    ) -> Result<(Order, TransitionReceipt)> {
        let mut order = self.fetch_order(order_id).await?;
        let receipt = self.transition(&mut order, target, note).await?;
        Ok((order, receipt))
    }
}

/// Number of orders per status; statuses with no orders are included with 0.
pub fn count_by_status(orders: &[Order]) -> BTreeMap<OrderStatus, usize> {
    let mut counts: BTreeMap<OrderStatus, usize> =
        OrderStatus::ALL.iter().map(|s| (*s, 0)).collect();
    for order in orders {
        *counts.entry(order.status).or_insert(0) += 1;
    }
    counts
}
