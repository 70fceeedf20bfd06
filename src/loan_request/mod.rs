//! Loan request approval workflow

mod model;
mod service;

pub use model::*;
pub use service::LoanRequestService;
