//! Account ledger: balances, registration and activation

mod model;
mod service;
mod token;

pub use model::*;
pub use service::AccountService;
pub use token::{generate_token, hash_token, TOKEN_PLAINTEXT_LEN};
