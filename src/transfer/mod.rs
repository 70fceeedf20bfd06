//! Transfer engine

mod model;
mod service;

pub use model::*;
pub use service::TransferService;
