//! Account-derivation strategies
//!
//! The selector walks indices the same way for both derivation families;
//! only the derive step and the meaning of the index differ.

use std::fmt;

use crate::error::ShieldResult;
use crate::types::AccountRole;
use crate::wallet::derivation::{address_index_from, derive_standard, DerivedAccount};
use crate::wallet::seed::Seed;
use crate::wallet::stealth::{derive_stealth_account, StealthAccount, StealthKeyMaterial};

/// How candidate accounts are produced from an index
#[derive(Clone, Copy)]
pub enum DerivationStrategy<'a> {
    /// `m/44'/60'/{role account}'/0/{index}`
    Standard(&'a Seed),
    /// One-time stealth address at nonce `index`. The role does not
    /// change the derivation.
    Stealth(&'a StealthKeyMaterial),
}

impl<'a> DerivationStrategy<'a> {
    pub fn derive(&self, role: AccountRole, index: u64) -> ShieldResult<EphemeralAccount> {
        match self {
            DerivationStrategy::Standard(seed) => {
                let address_index = address_index_from(index)?;
                let account = derive_standard(seed, role.account_index(), address_index)?;
                Ok(EphemeralAccount::Standard(account))
            }
            DerivationStrategy::Stealth(keys) => {
                Ok(EphemeralAccount::Stealth(derive_stealth_account(keys, index)?))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DerivationStrategy::Standard(_) => "standard",
            DerivationStrategy::Stealth(_) => "stealth",
        }
    }
}

impl fmt::Debug for DerivationStrategy<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivationStrategy::{}", self.name())
    }
}

/// An account produced by either strategy
#[derive(Debug)]
pub enum EphemeralAccount {
    Standard(DerivedAccount),
    Stealth(StealthAccount),
}

impl EphemeralAccount {
    pub fn address(&self) -> &str {
        match self {
            EphemeralAccount::Standard(a) => &a.address,
            EphemeralAccount::Stealth(a) => &a.address,
        }
    }

    /// Raw private key controlling the address
    pub fn private_key(&self) -> &[u8; 32] {
        match self {
            EphemeralAccount::Standard(a) => &a.private_key,
            EphemeralAccount::Stealth(a) => &a.private_key,
        }
    }

    /// Address index (standard) or nonce (stealth)
    pub fn index(&self) -> u64 {
        match self {
            EphemeralAccount::Standard(a) => u64::from(a.address_index),
            EphemeralAccount::Stealth(a) => a.nonce,
        }
    }

    /// Derivation path or `stealth/{nonce}`
    pub fn descriptor(&self) -> String {
        match self {
            EphemeralAccount::Standard(a) => a.derivation_path.clone(),
            EphemeralAccount::Stealth(a) => format!("stealth/{}", a.nonce),
        }
    }
}
