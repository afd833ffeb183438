//! Wallet Module
//!
//! Seed validation, deterministic account derivation (standard and
//! stealth), local signing and the shielded-wallet encryption key.

pub mod derivation;
pub mod seed;
pub mod signer;
pub mod stealth;
mod strategy;

pub use derivation::{derive_standard, eoa_derivation_path, DerivedAccount};
pub use seed::{read_valid_seed, validate_seed, Seed, SeedLength, SeedSource, MAX_SEED_ATTEMPTS};
pub use stealth::{derive_stealth_account, derive_stealth_keys, StealthAccount, StealthKeyMaterial};
pub use strategy::{DerivationStrategy, EphemeralAccount};

use zeroize::Zeroizing;

use crate::utils::keccak256;

/// Encryption key for the shielded-wallet database: keccak256 of the
/// password as 64 hex characters, no `0x`.
pub fn shielded_encryption_key(db_password: &str) -> Zeroizing<String> {
    Zeroizing::new(hex::encode(keccak256(db_password.as_bytes())))
}
