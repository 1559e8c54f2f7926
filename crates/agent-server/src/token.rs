//! Random tokens that keep concurrent temp file names apart.

use rand::Rng;

/// Token length in bytes (produces 8 hex characters).
const TOKEN_BYTES: usize = 4;

/// Generates a random lowercase hex token.
pub fn unique_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}
