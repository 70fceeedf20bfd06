//! Deposit and withdrawal recorder

mod model;
mod service;

pub use model::*;
pub use service::TransactionService;
