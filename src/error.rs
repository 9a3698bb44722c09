//! Crate-wide error type.
//!
//! Every fallible operation returns [`Result`]. The variants are
//! coarse: callers mostly need to tell a rejected user action
//! (`InvalidTransition`, `Validation`) apart from "the request failed"
//! (`Remote`, `Database`).

use thiserror::Error;

use crate::order_status::OrderStatus;

#[derive(Debug, Error)]
pub enum Error {
    /// The target status is not reachable in one step from the current one.
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("unknown order status: {0:?}")]
    UnknownStatus(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Transport or backend failure. The message is already user-facing.
    #[error("{0}")]
    Remote(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("local database error: {0}")]
    Database(String),

    #[error("{0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Remote(format!("malformed response payload: {err}"))
    }
}
