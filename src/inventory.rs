//! Inventory count sessions.
//!
//! A session snapshots the backend stock levels as expected quantities,
//! collects physical counts locally (SQLite) while staff walk the shelves,
//! then on approval writes the counted quantities back to `products` and
//! logs one `inventory_adjustments` row per changed product.
//!
//! Approval writes absolute quantities and stamps each line once its stock
//! write and adjustment row have landed, so approving again after a partial
//! failure only touches the remaining products. While the backend writes are
//! in flight the session is `approving`, which rejects a second approval.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DbState;
use crate::error::{Error, Result};
use crate::remote::{value_f64, value_i64, value_str, Query, RemoteStore};

pub const PRODUCTS_TABLE: &str = "products";
pub const ADJUSTMENTS_TABLE: &str = "inventory_adjustments";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Approving,
    Approved,
    Cancelled,
}

impl SessionStatus {
    fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Approving => "approving",
            SessionStatus::Approved => "approved",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "open" => Ok(SessionStatus::Open),
            "approving" => Ok(SessionStatus::Approving),
            "approved" => Ok(SessionStatus::Approved),
            "cancelled" => Ok(SessionStatus::Cancelled),
            other => Err(Error::Database(format!("unknown session status {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountLine {
    pub product_id: String,
    pub product_name: String,
    pub expected: i64,
    pub actual: Option<i64>,
    pub unit_cost: Option<f64>,
    /// Set once approval has written this product's stock and adjustment.
    pub adjusted_at: Option<String>,
}

impl CountLine {
    /// `actual - expected`; `None` until the product has been counted.
    pub fn variance(&self) -> Option<i64> {
        self.actual.map(|a| a - self.expected)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountSession {
    pub id: String,
    pub status: SessionStatus,
    pub note: Option<String>,
    pub approved_by: Option<String>,
    pub started_at: String,
    pub closed_at: Option<String>,
    pub lines: Vec<CountLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub total_lines: usize,
    pub counted_lines: usize,
    pub uncounted_lines: usize,
    pub lines_with_variance: usize,
    /// Units missing across all short lines (positive number).
    pub shortage_units: i64,
    /// Units found beyond expectation across all over lines.
    pub surplus_units: i64,
    /// Sum of `variance * unit_cost` over counted lines with a cost.
    pub variance_value: f64,
}

pub fn summarize(session: &CountSession) -> SessionSummary {
    let mut summary = SessionSummary {
        total_lines: session.lines.len(),
        counted_lines: 0,
        uncounted_lines: 0,
        lines_with_variance: 0,
        shortage_units: 0,
        surplus_units: 0,
        variance_value: 0.0,
    };
    for line in &session.lines {
        let Some(variance) = line.variance() else {
            summary.uncounted_lines += 1;
            continue;
        };
        summary.counted_lines += 1;
        if variance != 0 {
            summary.lines_with_variance += 1;
        }
        if variance < 0 {
            summary.shortage_units += -variance;
        } else {
            summary.surplus_units += variance;
        }
        if let Some(cost) = line.unit_cost {
            summary.variance_value += variance as f64 * cost;
        }
    }
    summary.variance_value = (summary.variance_value * 100.0).round() / 100.0;
    summary
}

// ---------------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------------

/// Snapshot current stock into a new open session.
pub async fn start_session(
    db: &DbState,
    store: &dyn RemoteStore,
    note: Option<&str>,
) -> Result<CountSession> {
    let rows = store
        .select(
            PRODUCTS_TABLE,
            &Query::new()
                .select("id,name,stock_quantity,unit_cost")
                .order_by("name", true),
        )
        .await?;

    let lines: Vec<CountLine> = rows
        .iter()
        .filter_map(|row| {
            let product_id = value_str(row, &["id"])?;
            Some(CountLine {
                product_name: value_str(row, &["name"]).unwrap_or_else(|| product_id.clone()),
                product_id,
                expected: value_i64(row, &["stock_quantity"]).unwrap_or(0),
                actual: None,
                unit_cost: value_f64(row, &["unit_cost"]),
                adjusted_at: None,
            })
        })
        .collect();
    if lines.is_empty() {
        return Err(Error::Validation("no products to count".into()));
    }

    let session_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    let note = note.map(str::trim).filter(|n| !n.is_empty());

    let mut conn = db.lock()?;
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO inventory_sessions (id, status, note, started_at) VALUES (?1, 'open', ?2, ?3)",
        params![session_id, note, now],
    )?;
    for line in &lines {
        tx.execute(
            "INSERT INTO inventory_count_lines
                (session_id, product_id, product_name, expected_qty, unit_cost)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id,
                line.product_id,
                line.product_name,
                line.expected,
                line.unit_cost
            ],
        )?;
    }
    tx.commit()?;
    info!(session_id = %session_id, products = lines.len(), "inventory count started");

    load_session_locked(&conn, &session_id)
}

pub fn load_session(db: &DbState, session_id: &str) -> Result<CountSession> {
    let conn = db.lock()?;
    load_session_locked(&conn, session_id)
}

fn load_session_locked(conn: &Connection, session_id: &str) -> Result<CountSession> {
    let header = conn
        .query_row(
            "SELECT id, status, note, approved_by, started_at, closed_at
             FROM inventory_sessions WHERE id = ?1",
            params![session_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("inventory session {session_id}")))?;

    let mut stmt = conn.prepare(
        "SELECT product_id, product_name, expected_qty, actual_qty, unit_cost, adjusted_at
         FROM inventory_count_lines
         WHERE session_id = ?1
         ORDER BY product_name, product_id",
    )?;
    let rows = stmt.query_map(params![session_id], |row| {
        Ok(CountLine {
            product_id: row.get(0)?,
            product_name: row.get(1)?,
            expected: row.get(2)?,
            actual: row.get(3)?,
            unit_cost: row.get(4)?,
            adjusted_at: row.get(5)?,
        })
    })?;
    let lines = rows.collect::<rusqlite::Result<Vec<_>>>()?;

    let (id, status, note, approved_by, started_at, closed_at) = header;
    Ok(CountSession {
        id,
        status: SessionStatus::parse(&status)?,
        note,
        approved_by,
        started_at,
        closed_at,
        lines,
    })
}

fn require_open(conn: &Connection, session_id: &str) -> Result<()> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM inventory_sessions WHERE id = ?1",
            params![session_id],
            |row| row.get(0),
        )
        .optional()?;
    match status.as_deref() {
        None => Err(Error::NotFound(format!("inventory session {session_id}"))),
        Some("open") => Ok(()),
        Some(other) => Err(Error::Validation(format!(
            "inventory session {session_id} is {other}"
        ))),
    }
}

/// Record the physical count for one product; recounting overwrites.
pub fn record_count(db: &DbState, session_id: &str, product_id: &str, actual: i64) -> Result<()> {
    if actual < 0 {
        return Err(Error::Validation("counted quantity cannot be negative".into()));
    }
    let conn = db.lock()?;
    require_open(&conn, session_id)?;
    let changed = conn.execute(
        "UPDATE inventory_count_lines SET actual_qty = ?1, counted_at = ?2
         WHERE session_id = ?3 AND product_id = ?4",
        params![actual, Utc::now().to_rfc3339(), session_id, product_id],
    )?;
    if changed == 0 {
        return Err(Error::NotFound(format!(
            "product {product_id} in session {session_id}"
        )));
    }
    Ok(())
}

pub fn cancel_session(db: &DbState, session_id: &str) -> Result<()> {
    let conn = db.lock()?;
    require_open(&conn, session_id)?;
    conn.execute(
        "UPDATE inventory_sessions SET status = ?1, closed_at = ?2 WHERE id = ?3",
        params![
            SessionStatus::Cancelled.as_str(),
            Utc::now().to_rfc3339(),
            session_id
        ],
    )?;
    info!(session_id, "inventory count cancelled");
    Ok(())
}

/// Push counted quantities to the backend and close the session.
///
/// Every line must be counted. The session is claimed as `approving` before
/// the first backend call and returns to `open` if any write fails; lines
/// already stamped `adjusted_at` are skipped on the next attempt.
pub async fn approve_session(
    db: &DbState,
    store: &dyn RemoteStore,
    session_id: &str,
    approved_by: &str,
) -> Result<SessionSummary> {
    let session = {
        let conn = db.lock()?;
        let session = load_session_locked(&conn, session_id)?;
        if session.status != SessionStatus::Open {
            return Err(Error::Validation(format!(
                "inventory session {session_id} is {}",
                session.status.as_str()
            )));
        }
        let uncounted = session.lines.iter().filter(|l| l.actual.is_none()).count();
        if uncounted > 0 {
            return Err(Error::Validation(format!(
                "{uncounted} product(s) still uncounted"
            )));
        }
        let claimed = conn.execute(
            "UPDATE inventory_sessions SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![
                SessionStatus::Approving.as_str(),
                session_id,
                SessionStatus::Open.as_str()
            ],
        )?;
        if claimed == 0 {
            return Err(Error::Validation(format!(
                "inventory session {session_id} is no longer open"
            )));
        }
        session
    };

    match push_adjustments(db, store, &session, approved_by).await {
        Ok(now) => {
            let conn = db.lock()?;
            conn.execute(
                "UPDATE inventory_sessions SET status = ?1, approved_by = ?2, closed_at = ?3 WHERE id = ?4",
                params![SessionStatus::Approved.as_str(), approved_by, now, session_id],
            )?;
            let summary = summarize(&session);
            info!(
                session_id,
                adjusted = summary.lines_with_variance,
                "inventory count approved"
            );
            Ok(summary)
        }
        Err(e) => {
            let reopened = db.lock().and_then(|conn| {
                conn.execute(
                    "UPDATE inventory_sessions SET status = ?1 WHERE id = ?2",
                    params![SessionStatus::Open.as_str(), session_id],
                )
                .map_err(Error::from)
            });
            if let Err(reopen_err) = reopened {
                warn!(session_id, error = %reopen_err, "could not reopen session after failed approval");
            }
            Err(e)
        }
    }
}

/// Write stock and adjustment rows for every changed, not yet adjusted line.
/// Returns the approval timestamp.
async fn push_adjustments(
    db: &DbState,
    store: &dyn RemoteStore,
    session: &CountSession,
    approved_by: &str,
) -> Result<String> {
    let session_id = session.id.as_str();
    let now = Utc::now().to_rfc3339();
    for line in &session.lines {
        if line.adjusted_at.is_some() {
            continue;
        }
        let (Some(actual), Some(variance)) = (line.actual, line.variance()) else {
            continue;
        };
        if variance == 0 {
            continue;
        }
        let updated = store
            .update(
                PRODUCTS_TABLE,
                &Query::new().eq("id", &line.product_id),
                json!({ "stock_quantity": actual, "updated_at": now }),
            )
            .await
            .inspect_err(|e| {
                warn!(session_id, product_id = %line.product_id, error = %e, "stock update failed");
            })?;
        if updated.is_empty() {
            warn!(product_id = %line.product_id, "product vanished before approval");
            continue;
        }
        store
            .insert(
                ADJUSTMENTS_TABLE,
                json!({
                    "product_id": line.product_id,
                    "session_id": session_id,
                    "expected_quantity": line.expected,
                    "actual_quantity": actual,
                    "variance": variance,
                    "approved_by": approved_by,
                    "created_at": now,
                }),
            )
            .await?;
        let conn = db.lock()?;
        conn.execute(
            "UPDATE inventory_count_lines SET adjusted_at = ?1
             WHERE session_id = ?2 AND product_id = ?3",
            params![now, session_id, line.product_id],
        )?;
    }
    Ok(now)
}
