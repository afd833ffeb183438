//! Shielding Engine and Broadcaster Network contracts
//!
//! Proof construction, merkle-tree scanning and the fee-relay protocol
//! live in an external library. The core only talks to them through
//! these traits, which keeps the orchestration logic testable with fakes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ShieldResult;
use crate::types::{
    Network, NetworkContracts, OperationKind, ShieldedWalletHandle, UnsignedTransaction, Wei,
};
use crate::wallet::Seed;

// =============================================================================
// Configuration
// =============================================================================

/// Paths and endpoints handed to the engine at start-up. The engine owns
/// everything under these paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Identifies this client to the engine
    pub wallet_source: String,
    /// Key-value store for the merkle-tree and notes cache
    pub database_path: PathBuf,
    /// Proof-system parameter cache
    pub artifact_dir: PathBuf,
    /// Proof-of-innocence aggregator endpoints
    pub poi_endpoints: Vec<String>,
}

impl EngineConfig {
    pub const DATABASE_FILE: &'static str = "engine.db";
    pub const ARTIFACT_DIR: &'static str = "artifacts";

    /// Derive engine paths from a storage root
    pub fn from_storage_dir(
        storage_dir: &Path,
        wallet_source: &str,
        poi_endpoints: Vec<String>,
    ) -> Self {
        Self {
            wallet_source: wallet_source.to_string(),
            database_path: storage_dir.join(Self::DATABASE_FILE),
            artifact_dir: storage_dir.join(Self::ARTIFACT_DIR),
            poi_endpoints,
        }
    }
}

// =============================================================================
// Wallets & Balances
// =============================================================================

/// How to obtain the shielded wallet
pub enum WalletSource<'a> {
    /// Create (or re-create) from the seed, scanning from `creation_block`
    Seed { seed: &'a Seed, creation_block: u64 },
    /// Load a wallet the engine already stores
    Existing { wallet_id: &'a str },
}

/// Engine balance buckets. Only spendable and pending-shield funds are
/// tracked; the other buckets exist on the engine side (POI review states).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceBucket {
    Spendable,
    ShieldPending,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    pub token: String,
    pub amount: Wei,
}

/// One asynchronous balance notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEvent {
    pub network: Network,
    pub wallet_id: String,
    pub bucket: BalanceBucket,
    pub token_amounts: Vec<TokenAmount>,
}

pub type BalanceCallback = Box<dyn Fn(&BalanceEvent) + Send + Sync>;

// =============================================================================
// Operations
// =============================================================================

/// Parameters of a shield / transfer / unshield, shared by every engine call
/// of the same operation
#[derive(Debug, Clone)]
pub struct OperationRequest<'a> {
    pub kind: OperationKind,
    pub network: Network,
    pub wallet: &'a ShieldedWalletHandle,
    /// Wrapped base token the funds move as
    pub token: String,
    pub amount: Wei,
    /// Shielded address (shield, transfer) or public address (unshield)
    pub recipient: String,
    /// Public account paying gas for direct submission
    pub sender: Option<String>,
    /// Present when a broadcaster submits and is paid from the shielded balance
    pub broadcaster: Option<BroadcasterInfo>,
    pub max_fee_per_gas: Wei,
    pub max_priority_fee_per_gas: Wei,
}

pub trait ShieldingEngine: Send + Sync {
    fn start(&self, config: &EngineConfig) -> ShieldResult<()>;

    /// Connect the engine to a chain provider
    fn load_provider(&self, network: Network, rpc_url: &str) -> ShieldResult<()>;

    fn network_contracts(&self, network: Network) -> ShieldResult<NetworkContracts>;

    fn load_or_create_wallet(
        &self,
        encryption_key: &str,
        source: WalletSource<'_>,
    ) -> ShieldResult<ShieldedWalletHandle>;

    fn estimate_gas(&self, request: &OperationRequest<'_>) -> ShieldResult<u64>;

    /// May take several seconds; reports progress in `0.0..=1.0`
    fn generate_proof(
        &self,
        request: &OperationRequest<'_>,
        on_progress: &dyn Fn(f64),
    ) -> ShieldResult<()>;

    fn populate_transaction(
        &self,
        request: &OperationRequest<'_>,
    ) -> ShieldResult<UnsignedTransaction>;

    /// Triggers an asynchronous balance callback
    fn refresh_balances(&self, network: Network, wallet_ids: &[String]) -> ShieldResult<()>;

    fn on_balance_update(&self, callback: BalanceCallback);

    /// Stop background scanning before exit
    fn stop(&self) -> ShieldResult<()>;
}

// =============================================================================
// Broadcasters
// =============================================================================

/// A fee relay willing to submit for a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcasterInfo {
    pub shielded_address: String,
    pub fee_token: String,
    pub fee_per_unit_gas: Wei,
    pub fees_id: String,
}

pub trait BroadcasterNetwork: Send + Sync {
    fn connect(&self, network: Network) -> ShieldResult<bool>;

    fn find_best_broadcaster(
        &self,
        network: Network,
        token: &str,
    ) -> ShieldResult<Option<BroadcasterInfo>>;

    fn submit(
        &self,
        tx: &UnsignedTransaction,
        broadcaster: &BroadcasterInfo,
        min_gas_price: Wei,
    ) -> ShieldResult<String>;
}
