//! Credentials: signed token codec, scheme-aware token service, CSRF slots,
//! and password hashing.

use rand::RngCore;

pub mod codec;
pub mod password;
pub mod session;
pub mod tokens;

pub use codec::{TokenClaims, TokenCodec};
pub use session::SessionStore;
pub use tokens::TokenService;

/// `bytes` bytes from the OS RNG, hex-encoded.
pub(crate) fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}
