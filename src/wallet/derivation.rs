//! Standard key derivation
//!
//! Deterministic EOA derivation along `m/44'/60'/{account}'/0/{index}`.
//! The account segment separates roles (deposit vs. receive); the index
//! segment is what the selector walks.
//!
//! SECURITY: Private keys are returned in `Zeroizing` buffers.

use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv};
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use bitcoin::NetworkKind;
use std::fmt;
use zeroize::Zeroizing;

use crate::error::{ShieldError, ShieldResult};
use crate::utils::public_key_to_address;
use crate::wallet::seed::Seed;

pub const BIP44_PURPOSE: u32 = 44;
pub const ETH_COIN_TYPE: u32 = 60;
const EXTERNAL_CHAIN: u32 = 0;

/// A derived externally-owned account
pub struct DerivedAccount {
    pub address: String,
    pub private_key: Zeroizing<[u8; 32]>,
    pub derivation_path: String,
    pub account_index: u32,
    pub address_index: u32,
}

impl DerivedAccount {
    /// `0x`-prefixed private key, for handing to a signer
    pub fn private_key_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("0x{}", hex::encode(self.private_key.as_slice())))
    }
}

impl fmt::Debug for DerivedAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedAccount")
            .field("address", &self.address)
            .field("derivation_path", &self.derivation_path)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Human-readable path for an account/index pair
pub fn eoa_derivation_path(account_index: u32, address_index: u32) -> String {
    format!(
        "m/{}'/{}'/{}'/{}/{}",
        BIP44_PURPOSE, ETH_COIN_TYPE, account_index, EXTERNAL_CHAIN, address_index
    )
}

fn eoa_path(account_index: u32, address_index: u32) -> ShieldResult<DerivationPath> {
    let children = vec![
        ChildNumber::from_hardened_idx(BIP44_PURPOSE)?,
        ChildNumber::from_hardened_idx(ETH_COIN_TYPE)?,
        ChildNumber::from_hardened_idx(account_index)?,
        ChildNumber::from_normal_idx(EXTERNAL_CHAIN)?,
        ChildNumber::from_normal_idx(address_index)?,
    ];
    Ok(DerivationPath::from(children))
}

/// Derive the account at `(account_index, address_index)`.
///
/// Pure: the same seed and indices always give the same key and address.
pub fn derive_standard(
    seed: &Seed,
    account_index: u32,
    address_index: u32,
) -> ShieldResult<DerivedAccount> {
    derive_standard_from_bytes(seed.seed_bytes(), account_index, address_index)
}

/// Same as [`derive_standard`] for raw BIP39 seed bytes
pub fn derive_standard_from_bytes(
    seed: &[u8],
    account_index: u32,
    address_index: u32,
) -> ShieldResult<DerivedAccount> {
    let secp = Secp256k1::new();
    let master = Xpriv::new_master(NetworkKind::Main, seed)?;
    let path = eoa_path(account_index, address_index)?;

    let child = master.derive_priv(&secp, &path)?;
    let secret_key: SecretKey = child.private_key;
    let address = public_key_to_address(&secret_key.public_key(&secp));

    Ok(DerivedAccount {
        address,
        private_key: Zeroizing::new(secret_key.secret_bytes()),
        derivation_path: eoa_derivation_path(account_index, address_index),
        account_index,
        address_index,
    })
}

/// Narrow a selector index to a non-hardened BIP32 index
pub fn address_index_from(index: u64) -> ShieldResult<u32> {
    u32::try_from(index)
        .ok()
        .filter(|i| *i < (1 << 31))
        .ok_or_else(|| {
            ShieldError::search_exhausted(format!(
                "Address index {} is outside the BIP32 range",
                index
            ))
        })
}
