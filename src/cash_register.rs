//! Cash register reconciliation.
//!
//! Expected drawer cash is the opening float plus cash sales, minus cash
//! refunds, paid-out expenses and withdrawals. Closing a register session
//! stores the counted amount alongside the expectation and the variance.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::remote::{value_f64, value_str, Query, RemoteStore};

pub const REGISTER_SESSIONS_TABLE: &str = "cash_register_sessions";

/// Differences smaller than one cent count as balanced.
const BALANCE_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegisterTotals {
    pub opening_amount: f64,
    pub cash_sales: f64,
    pub cash_refunds: f64,
    pub expenses: f64,
    pub withdrawals: f64,
}

impl RegisterTotals {
    pub fn from_row(row: &Value) -> Self {
        let num = |keys: &[&str]| value_f64(row, keys).unwrap_or(0.0);
        Self {
            opening_amount: num(&["opening_amount", "opening_cash"]),
            cash_sales: num(&["cash_sales", "total_cash_sales"]),
            cash_refunds: num(&["cash_refunds", "total_refunds"]),
            expenses: num(&["expenses", "total_expenses"]),
            withdrawals: num(&["withdrawals", "cash_drops"]),
        }
    }

    pub fn expected_cash(&self) -> f64 {
        round_cents(
            self.opening_amount + self.cash_sales
                - self.cash_refunds
                - self.expenses
                - self.withdrawals,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Balanced,
    Over,
    Short,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub expected: f64,
    pub counted: f64,
    pub variance: f64,
    pub outcome: Outcome,
}

fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn reconcile(totals: &RegisterTotals, counted: f64) -> Reconciliation {
    let expected = totals.expected_cash();
    let variance = round_cents(counted - expected);
    let outcome = if variance.abs() < BALANCE_TOLERANCE {
        Outcome::Balanced
    } else if variance > 0.0 {
        Outcome::Over
    } else {
        Outcome::Short
    };
    Reconciliation {
        expected,
        counted: round_cents(counted),
        variance: if outcome == Outcome::Balanced { 0.0 } else { variance },
        outcome,
    }
}

/// Reconcile an open register session against the counted cash and close it.
pub async fn close_register(
    store: &dyn RemoteStore,
    session_id: &str,
    counted: f64,
) -> Result<Reconciliation> {
    if !counted.is_finite() || counted < 0.0 {
        return Err(Error::Validation("counted cash must be a non-negative amount".into()));
    }

    let rows = store
        .select(
            REGISTER_SESSIONS_TABLE,
            &Query::new().eq("id", session_id).limit(1),
        )
        .await?;
    let row = rows
        .first()
        .ok_or_else(|| Error::NotFound(format!("register session {session_id}")))?;
    if value_str(row, &["status"]).as_deref() == Some("closed") {
        return Err(Error::Validation(format!(
            "register session {session_id} is already closed"
        )));
    }

    let result = reconcile(&RegisterTotals::from_row(row), counted);
    let patch = json!({
        "closing_amount": result.counted,
        "expected_amount": result.expected,
        "variance": result.variance,
        "status": "closed",
        "closed_at": Utc::now().to_rfc3339(),
    });
    let updated = store
        .update(
            REGISTER_SESSIONS_TABLE,
            &Query::new().eq("id", session_id),
            patch,
        )
        .await?;
    if updated.is_empty() {
        return Err(Error::NotFound(format!("register session {session_id}")));
    }

    if result.outcome == Outcome::Balanced {
        info!(session_id, expected = result.expected, "register closed balanced");
    } else {
        warn!(
            session_id,
            expected = result.expected,
            counted = result.counted,
            variance = result.variance,
            "register closed with variance"
        );
    }
    Ok(result)
}
