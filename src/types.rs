//! Shared types
//!
//! Data structures that cross module boundaries are defined here so the
//! prober, selector, orchestrators and CLI agree on one vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

use crate::error::{ShieldError, ShieldResult};

/// Amounts are always integer wei.
pub type Wei = u128;

pub const WEI_PER_GWEI: Wei = 1_000_000_000;
pub const WEI_PER_ETH: Wei = 1_000_000_000_000_000_000;

// =============================================================================
// Network Types
// =============================================================================

/// Supported networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    Mainnet,
    Sepolia,
    Polygon,
}

impl Network {
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Mainnet => 1,
            Network::Sepolia => 11155111,
            Network::Polygon => 137,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Sepolia => "sepolia",
            Network::Polygon => "polygon",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Network::Mainnet | Network::Sepolia => "ETH",
            Network::Polygon => "MATIC",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Network {
    type Err = ShieldError;

    fn from_str(s: &str) -> ShieldResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "mainnet" | "ethereum" => Ok(Network::Mainnet),
            "sepolia" => Ok(Network::Sepolia),
            "polygon" => Ok(Network::Polygon),
            other => Err(ShieldError::config_error(format!(
                "Unknown network: {}. Use: mainnet | sepolia | polygon",
                other
            ))),
        }
    }
}

/// Contract addresses the Shielding Engine publishes for a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkContracts {
    /// Entry point every shield transaction is sent to
    pub relay_adapt: String,
    /// Wrapped base token (WETH / WMATIC)
    pub wrapped_base_token: String,
    /// Block the privacy pool was deployed at
    pub deployment_block: u64,
}

// =============================================================================
// Account Roles & Classification
// =============================================================================

/// What a derived account is going to be used for.
///
/// The role picks the BIP44 account index and the freshness policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    /// Intake address for a new deposit: must never have sent a transaction
    Deposit,
    /// Destination of an unshield: must hold no funds
    Receive,
    /// Auto-shield scan: anything not yet shielded
    AutoShield,
}

impl AccountRole {
    /// BIP44 account index the role derives under
    pub fn account_index(&self) -> u32 {
        match self {
            AccountRole::Deposit | AccountRole::AutoShield => 0,
            AccountRole::Receive => 1,
        }
    }

    /// Whether an address with this classification is usable for the role
    pub fn accepts(&self, classification: AddressClassification) -> bool {
        match self {
            AccountRole::Deposit | AccountRole::Receive => {
                classification == AddressClassification::Unused
            }
            AccountRole::AutoShield => classification != AddressClassification::AlreadyShielded,
        }
    }
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountRole::Deposit => write!(f, "deposit"),
            AccountRole::Receive => write!(f, "receive"),
            AccountRole::AutoShield => write!(f, "auto-shield"),
        }
    }
}

/// Freshness of an address, computed from live chain state on every probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressClassification {
    Unused,
    FundedUnshielded,
    AlreadyShielded,
}

// =============================================================================
// Chain Data
// =============================================================================

/// EIP-1559 fee parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeData {
    pub max_fee_per_gas: Wei,
    pub max_priority_fee_per_gas: Wei,
}

impl FeeData {
    /// Used when the node does not report EIP-1559 fields
    pub const FALLBACK: FeeData = FeeData {
        max_fee_per_gas: 20 * WEI_PER_GWEI,
        max_priority_fee_per_gas: WEI_PER_GWEI,
    };
}

/// Mined transaction receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub success: bool,
}

/// A populated EIP-1559 transaction awaiting a signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub to: String,
    pub data: Vec<u8>,
    pub value: Wei,
    pub gas_limit: u64,
    pub max_fee_per_gas: Wei,
    pub max_priority_fee_per_gas: Wei,
}

/// A transaction as reported by the block explorer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerTx {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
}

// =============================================================================
// Shielded Wallet
// =============================================================================

/// Identifier the Shielding Engine tracks the private balance under
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldedWalletHandle {
    pub shielded_address: String,
    pub wallet_id: String,
    #[serde(skip)]
    pub encryption_key: Zeroizing<String>,
}

impl fmt::Debug for ShieldedWalletHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShieldedWalletHandle")
            .field("shielded_address", &self.shielded_address)
            .field("wallet_id", &self.wallet_id)
            .field("encryption_key", &"[REDACTED]")
            .finish()
    }
}

/// Shielded balances split by engine bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldedBalances {
    pub spendable: Wei,
    pub shield_pending: Wei,
}

/// Which shielded operation is being orchestrated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Shield,
    Transfer,
    Unshield,
}

impl OperationKind {
    /// Shielding moves public funds in and needs no zero-knowledge proof
    pub fn requires_proof(&self) -> bool {
        !matches!(self, OperationKind::Shield)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Shield => write!(f, "shield"),
            OperationKind::Transfer => write!(f, "transfer"),
            OperationKind::Unshield => write!(f, "unshield"),
        }
    }
}

/// Final outcome of a confirmed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationReceipt {
    pub kind: OperationKind,
    pub tx_hash: String,
    pub net_amount: Wei,
    pub block_number: u64,
    pub via_broadcaster: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parsing() {
        assert_eq!("Sepolia".parse::<Network>().unwrap(), Network::Sepolia);
        assert_eq!("ethereum".parse::<Network>().unwrap(), Network::Mainnet);
        assert!("goerli".parse::<Network>().is_err());
    }

    #[test]
    fn test_role_policies() {
        assert!(AccountRole::Deposit.accepts(AddressClassification::Unused));
        assert!(!AccountRole::Deposit.accepts(AddressClassification::FundedUnshielded));
        assert!(!AccountRole::Receive.accepts(AddressClassification::FundedUnshielded));
        assert!(AccountRole::AutoShield.accepts(AddressClassification::FundedUnshielded));
        assert!(AccountRole::AutoShield.accepts(AddressClassification::Unused));
        assert!(!AccountRole::AutoShield.accepts(AddressClassification::AlreadyShielded));
    }

    #[test]
    fn test_role_account_indices() {
        assert_eq!(AccountRole::Deposit.account_index(), 0);
        assert_eq!(AccountRole::Receive.account_index(), 1);
    }

    #[test]
    fn test_shield_needs_no_proof() {
        assert!(!OperationKind::Shield.requires_proof());
        assert!(OperationKind::Unshield.requires_proof());
    }
}
