//! Loan engine

mod model;
mod service;

pub use model::*;
pub use service::LoanService;
pub(crate) use service::check_terms;
