//! Ledger-backed banking core
//!
//! Moves money between accounts, runs the loan request workflow, accrues and
//! collects loan interest, and records deposits and withdrawals. Everything is
//! persisted through a [`store::RecordStore`] with optimistic concurrency.

pub mod account;
pub mod bank;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod loan;
pub mod loan_request;
pub mod notification;
pub mod store;
pub mod telemetry;
pub mod transaction;
pub mod transfer;
pub mod validation;

pub use bank::Bank;
pub use error::{LedgerError, LedgerResult};
