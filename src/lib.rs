//! Storefront back-office.
//!
//! Administrative tooling for a storefront whose data lives in a hosted
//! PostgREST backend. The core is the order-status workflow
//! ([`order_status`], [`orders`]): a fixed seven-state machine whose
//! transitions are validated locally and committed with a single remote
//! update. The remaining modules cover delivery locations, inventory counts,
//! cash register closing, employee shifts and financial reports.
//!
//! All backend access goes through [`remote::RemoteStore`];
//! [`api::SupabaseClient`] is the HTTP implementation.

pub mod api;
pub mod cash_register;
pub mod config;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod format;
pub mod inventory;
pub mod locations;
pub mod order_status;
pub mod orders;
pub mod remote;
pub mod reports;
pub mod shifts;
pub mod storage;

pub use error::{Error, Result};
pub use order_status::OrderStatus;
pub use orders::{Order, OrderWorkflow, TransitionReceipt};
