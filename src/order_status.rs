//! Order status state machine.
//!
//! Seven states, two of them terminal. The transition table is fixed:
//! every non-terminal state advances one step along the fulfilment chain
//! or drops to `Cancelled`.
//!
//! ```text
//! pending -> confirmed -> preparing -> ready -> shipped -> delivered
//!    \           \             \          \         \
//!     +-----------+-------------+----------+---------+--> cancelled
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Statuses reachable from `self` in exactly one step.
    pub fn allowed_next(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Preparing, Cancelled],
            Preparing => &[Ready, Cancelled],
            Ready => &[Shipped, Cancelled],
            Shipped => &[Delivered, Cancelled],
            Delivered | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        self.allowed_next().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }

    /// Storage representation (the `status` column value).
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Label shown to operators in the Arabic back-office UI.
    pub fn label_ar(self) -> &'static str {
        match self {
            OrderStatus::Pending => "قيد الانتظار",
            OrderStatus::Confirmed => "مؤكد",
            OrderStatus::Preparing => "قيد التحضير",
            OrderStatus::Ready => "جاهز",
            OrderStatus::Shipped => "تم الشحن",
            OrderStatus::Delivered => "تم التوصيل",
            OrderStatus::Cancelled => "ملغي",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = Error;

    /// Parses a stored status. Legacy values written by older dashboards
    /// (`approved`, `canceled`, `declined`, `rejected`) map onto the
    /// current states.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" | "approved" => Ok(OrderStatus::Confirmed),
            "preparing" => Ok(OrderStatus::Preparing),
            "ready" => Ok(OrderStatus::Ready),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" | "canceled" | "declined" | "rejected" => Ok(OrderStatus::Cancelled),
            _ => Err(Error::UnknownStatus(raw.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::OrderStatus::*;
    use super::*;

    #[test]
    fn allowed_next_matches_transition_table() {
        assert_eq!(Pending.allowed_next(), &[Confirmed, Cancelled]);
        assert_eq!(Confirmed.allowed_next(), &[Preparing, Cancelled]);
        assert_eq!(Preparing.allowed_next(), &[Ready, Cancelled]);
        assert_eq!(Ready.allowed_next(), &[Shipped, Cancelled]);
        assert_eq!(Shipped.allowed_next(), &[Delivered, Cancelled]);
        assert!(Delivered.allowed_next().is_empty());
        assert!(Cancelled.allowed_next().is_empty());
    }

    #[test]
    fn only_delivered_and_cancelled_are_terminal() {
        let terminal: Vec<_> = OrderStatus::ALL
            .iter()
            .copied()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal, vec![Delivered, Cancelled]);
    }

    #[test]
    fn every_live_state_can_cancel() {
        for status in OrderStatus::ALL {
            assert_eq!(
                status.can_transition_to(Cancelled),
                !status.is_terminal(),
                "{status} -> cancelled"
            );
        }
    }

    #[test]
    fn no_state_transitions_to_itself() {
        for status in OrderStatus::ALL {
            assert!(!status.can_transition_to(status), "{status} -> {status}");
        }
    }

    #[test]
    fn skipping_steps_is_rejected() {
        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Confirmed.can_transition_to(Delivered));
        assert!(!Delivered.can_transition_to(Pending));
    }

    #[test]
    fn parse_accepts_legacy_aliases() {
        assert_eq!(" Approved ".parse::<OrderStatus>().unwrap(), Confirmed);
        assert_eq!("canceled".parse::<OrderStatus>().unwrap(), Cancelled);
        assert_eq!("REJECTED".parse::<OrderStatus>().unwrap(), Cancelled);
        assert!(matches!(
            "refunded".parse::<OrderStatus>(),
            Err(Error::UnknownStatus(s)) if s == "refunded"
        ));
    }

    #[test]
    fn serde_uses_storage_names() {
        assert_eq!(serde_json::to_value(Preparing).unwrap(), "preparing");
        let parsed: OrderStatus = serde_json::from_value(serde_json::json!("shipped")).unwrap();
        assert_eq!(parsed, Shipped);
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
    }
}
