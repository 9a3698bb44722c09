//! Employee shift tracking.
//!
//! One active shift per employee. Clocking out closes it and stores the
//! worked minutes so payroll reports don't have to recompute them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{Error, Result};
use crate::remote::{value_i64, value_str, Query, RemoteStore};

pub const SHIFTS_TABLE: &str = "employee_shifts";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Shift {
    pub id: String,
    pub employee_id: String,
    pub check_in: DateTime<Utc>,
    pub check_out: Option<DateTime<Utc>>,
    pub worked_minutes: Option<i64>,
}

impl Shift {
    pub fn from_row(row: &Value) -> Result<Self> {
        let parse_ts = |key: &str| -> Result<Option<DateTime<Utc>>> {
            match value_str(row, &[key]) {
                None => Ok(None),
                Some(raw) => DateTime::parse_from_rfc3339(&raw)
                    .map(|dt| Some(dt.with_timezone(&Utc)))
                    .map_err(|e| Error::Remote(format!("bad {key} timestamp {raw:?}: {e}"))),
            }
        };
        Ok(Self {
            id: value_str(row, &["id"])
                .ok_or_else(|| Error::Remote("shift row without id".into()))?,
            employee_id: value_str(row, &["employee_id"]).unwrap_or_default(),
            check_in: parse_ts("check_in")?
                .ok_or_else(|| Error::Remote("shift row without check_in".into()))?,
            check_out: parse_ts("check_out")?,
            worked_minutes: value_i64(row, &["worked_minutes"]),
        })
    }

    pub fn is_active(&self) -> bool {
        self.check_out.is_none()
    }
}

async fn active_shift(store: &dyn RemoteStore, employee_id: &str) -> Result<Option<Shift>> {
    let rows = store
        .select(
            SHIFTS_TABLE,
            &Query::new()
                .eq("employee_id", employee_id)
                .eq("status", "active")
                .order_by("check_in", false)
                .limit(1),
        )
        .await?;
    rows.first().map(Shift::from_row).transpose()
}

fn normalize_employee_id(raw: &str) -> Result<&str> {
    let employee_id = raw.trim();
    if employee_id.is_empty() {
        return Err(Error::Validation("Missing employee id".into()));
    }
    Ok(employee_id)
}

pub async fn clock_in(store: &dyn RemoteStore, employee_id: &str) -> Result<Shift> {
    let employee_id = normalize_employee_id(employee_id)?;
    if let Some(existing) = active_shift(store, employee_id).await? {
        return Err(Error::Validation(format!(
            "Employee already has an active shift ({})",
            existing.id
        )));
    }

    let rows = store
        .insert(
            SHIFTS_TABLE,
            json!({
                "employee_id": employee_id,
                "check_in": Utc::now().to_rfc3339(),
                "status": "active",
            }),
        )
        .await?;
    let shift = rows
        .first()
        .ok_or_else(|| Error::Remote("backend returned no shift row".into()))
        .and_then(Shift::from_row)?;
    info!(employee_id, shift_id = %shift.id, "shift opened");
    Ok(shift)
}

pub async fn clock_out(store: &dyn RemoteStore, employee_id: &str) -> Result<Shift> {
    let employee_id = normalize_employee_id(employee_id)?;
    let shift = active_shift(store, employee_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("active shift for employee {employee_id}")))?;

    let now = Utc::now();
    let worked = (now - shift.check_in).num_minutes().max(0);
    let rows = store
        .update(
            SHIFTS_TABLE,
            &Query::new().eq("id", &shift.id),
            json!({
                "check_out": now.to_rfc3339(),
                "worked_minutes": worked,
                "status": "closed",
            }),
        )
        .await?;
    let closed = rows
        .first()
        .ok_or_else(|| Error::NotFound(format!("shift {}", shift.id)))
        .and_then(Shift::from_row)?;
    info!(employee_id, shift_id = %closed.id, worked_minutes = worked, "shift closed");
    Ok(closed)
}

/// Total hours over closed shifts, to two decimals.
pub fn worked_hours(shifts: &[Shift]) -> f64 {
    let minutes: i64 = shifts
        .iter()
        .filter(|s| !s.is_active())
        .map(|s| {
            s.worked_minutes.unwrap_or_else(|| {
                s.check_out
                    .map(|out| (out - s.check_in).num_minutes().max(0))
                    .unwrap_or(0)
            })
        })
        .sum();
    (minutes as f64 / 60.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::MemoryStore;

    #[tokio::test]
    async fn clock_in_then_out() {
        let store = MemoryStore::new();
        let shift = clock_in(&store, "emp-1").await.unwrap();
        assert!(shift.is_active());

        let closed = clock_out(&store, "emp-1").await.unwrap();
        assert_eq!(closed.id, shift.id);
        assert!(!closed.is_active());
        assert_eq!(closed.worked_minutes, Some(0));
        assert_eq!(store.rows(SHIFTS_TABLE)[0]["status"], "closed");
    }

    #[tokio::test]
    async fn double_clock_in_is_rejected() {
        let store = MemoryStore::new();
        clock_in(&store, "emp-1").await.unwrap();
        let err = clock_in(&store, "emp-1").await.unwrap_err();
        assert!(matches!(err, Error::Validation(msg) if msg.contains("already")));
        // A different employee is unaffected.
        clock_in(&store, "emp-2").await.unwrap();
    }

    #[tokio::test]
    async fn clock_out_without_shift_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            clock_out(&store, "emp-9").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn employee_id_is_trimmed_on_both_ends() {
        let store = MemoryStore::new();
        let shift = clock_in(&store, " emp-1 ").await.unwrap();
        assert_eq!(shift.employee_id, "emp-1");

        let closed = clock_out(&store, "  emp-1").await.unwrap();
        assert_eq!(closed.id, shift.id);

        assert!(matches!(
            clock_out(&store, "   ").await,
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn worked_hours_skips_open_shifts() {
        let rows = [
            json!({ "id": "s1", "employee_id": "e", "check_in": "2026-10-01T08:00:00Z",
                    "check_out": "2026-10-01T16:30:00Z", "worked_minutes": 510 }),
            json!({ "id": "s2", "employee_id": "e", "check_in": "2026-10-02T08:00:00Z",
                    "check_out": "2026-10-02T12:15:00Z" }),
            json!({ "id": "s3", "employee_id": "e", "check_in": "2026-10-03T08:00:00Z" }),
        ];
        let shifts: Vec<Shift> = rows.iter().map(|r| Shift::from_row(r).unwrap()).collect();
        // 510 + 255 minutes
        assert_eq!(worked_hours(&shifts), 12.75);
    }

    #[test]
    fn malformed_timestamp_is_an_error() {
        let row = json!({ "id": "s1", "check_in": "yesterday" });
        assert!(Shift::from_row(&row).is_err());
    }
}
