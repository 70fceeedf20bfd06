//! One-time token generation
//!
//! The plaintext is 16 random bytes in unpadded base32 (26 characters). Only
//! the SHA-256 hex digest is persisted.

use base32::Alphabet;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{Token, TokenScope};

/// Length of every token plaintext handed to a caller
pub const TOKEN_PLAINTEXT_LEN: usize = 26;

/// Create a token for `account_id`, returning the plaintext and the row to store
pub fn generate_token(
    account_id: Uuid,
    scope: TokenScope,
    ttl: Duration,
    now: DateTime<Utc>,
) -> (String, Token) {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let plaintext = base32::encode(Alphabet::Rfc4648 { padding: false }, &bytes);

    let token = Token {
        hash: hash_token(&plaintext),
        account_id,
        scope,
        expiry: now + ttl,
    };
    (plaintext, token)
}

/// Hash a token plaintext for storage and lookup
pub fn hash_token(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}
