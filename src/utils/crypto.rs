//! Ethereum hashing and address helpers
//!
//! Shared by the deriver, the stealth scheme and the EIP-191 signer.

use bitcoin::secp256k1::PublicKey;
use tiny_keccak::{Hasher, Keccak};

use crate::error::{ShieldError, ShieldResult};

/// Keccak256 hash (used for Ethereum addresses)
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// Convert raw address bytes to checksummed Ethereum address (EIP-55)
pub fn to_checksum_address(address: &[u8]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());

    let mut result = String::from("0x");
    for (i, ch) in lower.chars().enumerate() {
        let byte = hash[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };

        if ch.is_ascii_digit() {
            result.push(ch);
        } else if nibble >= 8 {
            result.push(ch.to_ascii_uppercase());
        } else {
            result.push(ch);
        }
    }

    result
}

/// Ethereum address of a secp256k1 public key
pub fn public_key_to_address(public_key: &PublicKey) -> String {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak256(&uncompressed[1..]);
    to_checksum_address(&hash[12..])
}

/// Validate a `0x` address and return its checksummed form
pub fn normalize_address(address: &str) -> ShieldResult<String> {
    let trimmed = address.trim();

    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| ShieldError::invalid_address(format!("Missing 0x prefix: {}", trimmed)))?;

    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ShieldError::invalid_address(format!(
            "Not a 20-byte hex address: {}",
            trimmed
        )));
    }

    let bytes = hex::decode(hex_part.to_lowercase())?;
    Ok(to_checksum_address(&bytes))
}

/// Case-insensitive address comparison
pub fn same_address(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
