//! Cryptography module for blackbox encryption and encoding.

mod des_ecb;

pub use des_ecb::{decrypt_des_ecb, encrypt_des_ecb, DES_BLOCK_SIZE};

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{Result, SnareError};

/// Version tag every blackbox starts with.
pub const BLACKBOX_VERSION: &str = "0400";

/// Wrap ciphertext as a blackbox: version tag + padded standard base64.
pub fn encode_blackbox(ciphertext: &[u8]) -> String {
    format!("{}{}", BLACKBOX_VERSION, STANDARD.encode(ciphertext))
}

/// Strip the version tag and base64-decode the ciphertext of a blackbox.
pub fn decode_blackbox_payload(blackbox: &str) -> Result<Vec<u8>> {
    let encoded = blackbox.strip_prefix(BLACKBOX_VERSION).ok_or_else(|| {
        SnareError::MalformedBlackbox(format!("missing {} version prefix", BLACKBOX_VERSION))
    })?;

    STANDARD
        .decode(encoded)
        .map_err(|e| SnareError::MalformedBlackbox(format!("invalid base64 payload: {}", e)))
}
