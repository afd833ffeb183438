//! Address freshness probing
//!
//! Three independent chain checks, never cached and not atomic with each
//! other:
//! - transaction count (nonce 0 = never sent anything)
//! - native balance (0 = nothing to move)
//! - explorer history (any transaction to the shield entry contract =
//!   already shielded)
//!
//! Each role only pays for the checks its policy needs.

use crate::error::ShieldResult;
use crate::log_debug;
use crate::rpc::{BlockExplorer, ChainRpc};
use crate::types::{AccountRole, AddressClassification, Wei};
use crate::utils::same_address;

/// Classifies a candidate address for a role
pub trait AddressProbe {
    fn classify_for(&self, address: &str, role: AccountRole) -> ShieldResult<AddressClassification>;
}

/// Live-chain prober
pub struct FreshnessProber<'a> {
    rpc: &'a dyn ChainRpc,
    explorer: &'a dyn BlockExplorer,
    shield_contract: String,
}

impl<'a> FreshnessProber<'a> {
    pub fn new(
        rpc: &'a dyn ChainRpc,
        explorer: &'a dyn BlockExplorer,
        shield_contract: &str,
    ) -> Self {
        Self {
            rpc,
            explorer,
            shield_contract: shield_contract.to_string(),
        }
    }

    pub fn has_sent_transactions(&self, address: &str) -> ShieldResult<bool> {
        Ok(self.rpc.get_transaction_count(address)? > 0)
    }

    pub fn balance(&self, address: &str) -> ShieldResult<Wei> {
        self.rpc.get_balance(address)
    }

    /// Any transaction from the address to the shield entry contract
    pub fn has_shielded(&self, address: &str) -> ShieldResult<bool> {
        let history = self.explorer.transactions(address)?;
        Ok(history.iter().any(|tx| {
            tx.to
                .as_deref()
                .map(|to| same_address(to, &self.shield_contract))
                .unwrap_or(false)
        }))
    }

    /// Run all three checks
    pub fn classify(&self, address: &str) -> ShieldResult<AddressClassification> {
        if self.has_shielded(address)? {
            return Ok(AddressClassification::AlreadyShielded);
        }
        if !self.has_sent_transactions(address)? && self.balance(address)? == 0 {
            return Ok(AddressClassification::Unused);
        }
        Ok(AddressClassification::FundedUnshielded)
    }
}

impl AddressProbe for FreshnessProber<'_> {
    fn classify_for(
        &self,
        address: &str,
        role: AccountRole,
    ) -> ShieldResult<AddressClassification> {
        let classification = match role {
            // A deposit address may already hold the incoming funds; it only
            // has to have never sent anything.
            AccountRole::Deposit => {
                if self.has_sent_transactions(address)? {
                    AddressClassification::FundedUnshielded
                } else {
                    AddressClassification::Unused
                }
            }
            AccountRole::Receive => {
                if self.balance(address)? > 0 {
                    AddressClassification::FundedUnshielded
                } else {
                    AddressClassification::Unused
                }
            }
            AccountRole::AutoShield => {
                if self.has_shielded(address)? {
                    AddressClassification::AlreadyShielded
                } else if self.balance(address)? > 0 {
                    AddressClassification::FundedUnshielded
                } else {
                    AddressClassification::Unused
                }
            }
        };

        log_debug!(
            "probe",
            "Address classified",
            address = address,
            role = role,
            classification = format!("{:?}", classification)
        );
        Ok(classification)
    }
}
