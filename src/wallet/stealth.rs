//! Stealth address scheme
//!
//! Key material comes from a signature over a challenge message, so it
//! can always be rebuilt from the seed plus the PIN:
//!
//! 1. The owner account (`m/44'/60'/0'/0/0`) signs a message binding its
//!    address to an HMAC of the PIN.
//! 2. `spending = keccak256(r)`, `viewing = keccak256(s)`.
//! 3. For each nonce, an ephemeral key is derived from a BIP32 tree seeded
//!    by the viewing key.
//! 4. One-time address `P = S + keccak(e·S)·G`, one-time key
//!    `p = s + keccak(s·E) mod n`.
//!
//! SECURITY: Every private scalar is held in a `Zeroizing` buffer.

use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv};
use bitcoin::secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};
use bitcoin::NetworkKind;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{ShieldError, ShieldResult};
use crate::log_debug;
use crate::utils::{keccak256, public_key_to_address};
use crate::wallet::derivation::derive_standard;
use crate::wallet::seed::Seed;
use crate::wallet::signer::personal_sign;

type HmacSha256 = Hmac<Sha256>;

pub const STEALTH_PURPOSE: u32 = 5564;

/// The chain segment is pinned so stealth addresses are network-agnostic
const STEALTH_CHAIN_SEGMENT: u32 = 0;
const NONCE_SPLIT: u64 = 1 << 31;

/// Largest nonce the two hardened path segments can express
pub const MAX_STEALTH_NONCE: u64 = NONCE_SPLIT * NONCE_SPLIT - 1;

// =============================================================================
// Key Material
// =============================================================================

/// Spending and viewing keys for one owner
pub struct StealthKeyMaterial {
    owner_address: String,
    spending_key: Zeroizing<[u8; 32]>,
    viewing_key: Zeroizing<[u8; 32]>,
    spending_public_key: PublicKey,
}

impl StealthKeyMaterial {
    pub fn owner_address(&self) -> &str {
        &self.owner_address
    }

    pub fn spending_public_key(&self) -> &PublicKey {
        &self.spending_public_key
    }

    fn spending_secret(&self) -> ShieldResult<SecretKey> {
        Ok(SecretKey::from_slice(self.spending_key.as_slice())?)
    }
}

impl fmt::Debug for StealthKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StealthKeyMaterial")
            .field("owner_address", &self.owner_address)
            .field("spending_public_key", &hex::encode(self.spending_public_key.serialize()))
            .field("spending_key", &"[REDACTED]")
            .field("viewing_key", &"[REDACTED]")
            .finish()
    }
}

/// Challenge message the owner signs. The PIN only appears as a keyed hash.
pub fn stealth_message(owner_address: &str, pin: &SecretString) -> ShieldResult<String> {
    if pin.expose_secret().is_empty() {
        return Err(ShieldError::invalid_input("Stealth PIN must not be empty"));
    }

    let mut mac = HmacSha256::new_from_slice(pin.expose_secret().as_bytes())
        .map_err(|e| ShieldError::crypto_error(format!("HMAC init failed: {}", e)))?;
    mac.update(owner_address.to_lowercase().as_bytes());
    let binding = hex::encode(mac.finalize().into_bytes());

    Ok(format!(
        "Sign this message to generate your private payment keys.\n\n\
         Only sign it in software you trust: the signature controls stealth funds.\n\n\
         Address: {}\n\
         Binding: {}",
        owner_address, binding
    ))
}

/// Split a 65-byte signature into spending and viewing keys
pub fn keys_from_signature(
    owner_address: &str,
    signature: &[u8; 65],
) -> ShieldResult<StealthKeyMaterial> {
    let secp = Secp256k1::new();

    let spending_key = Zeroizing::new(keccak256(&signature[..32]));
    let viewing_key = Zeroizing::new(keccak256(&signature[32..64]));

    let spending_secret = SecretKey::from_slice(spending_key.as_slice())
        .map_err(|_| ShieldError::crypto_error("Spending key is not a valid scalar"))?;
    SecretKey::from_slice(viewing_key.as_slice())
        .map_err(|_| ShieldError::crypto_error("Viewing key is not a valid scalar"))?;

    Ok(StealthKeyMaterial {
        owner_address: owner_address.to_string(),
        spending_public_key: spending_secret.public_key(&secp),
        spending_key,
        viewing_key,
    })
}

/// Derive the stealth key material for a seed and PIN
pub fn derive_stealth_keys(seed: &Seed, pin: &SecretString) -> ShieldResult<StealthKeyMaterial> {
    let owner = derive_standard(seed, 0, 0)?;
    let message = stealth_message(&owner.address, pin)?;
    let signature =
        Zeroizing::new(personal_sign(message.as_bytes(), owner.private_key.as_slice())?);

    log_debug!("stealth", "Stealth keys generated", owner_address = &owner.address);
    keys_from_signature(&owner.address, &signature)
}

// =============================================================================
// Per-nonce Derivation
// =============================================================================

fn ephemeral_path(nonce: u64) -> ShieldResult<DerivationPath> {
    if nonce > MAX_STEALTH_NONCE {
        return Err(ShieldError::search_exhausted(format!(
            "Stealth nonce {} is out of range",
            nonce
        )));
    }

    // Both halves are < 2^31 after the range check
    let parent = (nonce / NONCE_SPLIT) as u32;
    let child = (nonce % NONCE_SPLIT) as u32;

    Ok(DerivationPath::from(vec![
        ChildNumber::from_hardened_idx(STEALTH_PURPOSE)?,
        ChildNumber::from_hardened_idx(0)?,
        ChildNumber::from_hardened_idx(STEALTH_CHAIN_SEGMENT)?,
        ChildNumber::from_hardened_idx(0)?,
        ChildNumber::from_hardened_idx(parent)?,
        ChildNumber::from_hardened_idx(child)?,
    ]))
}

/// Ephemeral private key for a nonce
pub fn ephemeral_private_key(keys: &StealthKeyMaterial, nonce: u64) -> ShieldResult<SecretKey> {
    let secp = Secp256k1::new();
    let root = Xpriv::new_master(NetworkKind::Main, keys.viewing_key.as_slice())?;
    let node = root.derive_priv(&secp, &ephemeral_path(nonce)?)?;
    Ok(node.private_key)
}

fn hashed_shared_secret(shared_point: &PublicKey) -> ShieldResult<Scalar> {
    let digest = keccak256(&shared_point.serialize());
    Scalar::from_be_bytes(digest)
        .map_err(|_| ShieldError::crypto_error("Shared secret hash exceeds curve order"))
}

/// Sender side: one-time address for an ephemeral key and a spending public key
pub fn stealth_address(
    ephemeral: &SecretKey,
    spending_public_key: &PublicKey,
) -> ShieldResult<String> {
    let secp = Secp256k1::new();
    let shared = spending_public_key.mul_tweak(&secp, &Scalar::from(*ephemeral))?;
    let tweak = hashed_shared_secret(&shared)?;
    let one_time_public = spending_public_key.add_exp_tweak(&secp, &tweak)?;
    Ok(public_key_to_address(&one_time_public))
}

/// Receiver side: one-time private key for a published ephemeral public key
pub fn stealth_private_key(
    spending: &SecretKey,
    ephemeral_public_key: &PublicKey,
) -> ShieldResult<SecretKey> {
    let secp = Secp256k1::new();
    let shared = ephemeral_public_key.mul_tweak(&secp, &Scalar::from(*spending))?;
    let tweak = hashed_shared_secret(&shared)?;
    Ok(spending.add_tweak(&tweak)?)
}

/// A one-time stealth account at a specific nonce
pub struct StealthAccount {
    pub address: String,
    pub private_key: Zeroizing<[u8; 32]>,
    pub ephemeral_private_key: Zeroizing<[u8; 32]>,
    pub ephemeral_public_key: PublicKey,
    pub nonce: u64,
}

impl StealthAccount {
    /// Constant-time check that the one-time key controls the address
    pub fn verify_ownership(&self) -> bool {
        let secp = Secp256k1::new();
        let Ok(secret) = SecretKey::from_slice(self.private_key.as_slice()) else {
            return false;
        };
        let derived = public_key_to_address(&secret.public_key(&secp)).to_lowercase();
        let expected = self.address.to_lowercase();
        derived.as_bytes().ct_eq(expected.as_bytes()).into()
    }

    pub fn private_key_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("0x{}", hex::encode(self.private_key.as_slice())))
    }
}

impl fmt::Debug for StealthAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StealthAccount")
            .field("address", &self.address)
            .field("nonce", &self.nonce)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Derive the one-time account at `nonce`
pub fn derive_stealth_account(
    keys: &StealthKeyMaterial,
    nonce: u64,
) -> ShieldResult<StealthAccount> {
    let secp = Secp256k1::new();
    let ephemeral = ephemeral_private_key(keys, nonce)?;
    let ephemeral_public_key = ephemeral.public_key(&secp);

    let address = stealth_address(&ephemeral, keys.spending_public_key())?;
    let one_time = stealth_private_key(&keys.spending_secret()?, &ephemeral_public_key)?;

    let account = StealthAccount {
        address,
        private_key: Zeroizing::new(one_time.secret_bytes()),
        ephemeral_private_key: Zeroizing::new(ephemeral.secret_bytes()),
        ephemeral_public_key,
        nonce,
    };

    if !account.verify_ownership() {
        return Err(ShieldError::crypto_error(format!(
            "Stealth key does not control address at nonce {}",
            nonce
        )));
    }

    Ok(account)
}
