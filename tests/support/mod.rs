//! In-memory collaborators for flow tests
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use ephemeral_shield::engine::{
    BalanceBucket, BalanceCallback, BalanceEvent, BroadcasterInfo, BroadcasterNetwork, EngineConfig,
    OperationRequest, ShieldingEngine, TokenAmount, WalletSource,
};
use ephemeral_shield::gate::ConnectivityProbe;
use ephemeral_shield::orchestrator::ProofProgress;
use ephemeral_shield::rpc::{BlockExplorer, ChainRpc};
use ephemeral_shield::session::{Session, SessionServices};
use ephemeral_shield::utils::{keccak256, RecordingSleeper};
use ephemeral_shield::wallet::{SeedLength, SeedSource};
use ephemeral_shield::{
    ExplorerTx, FeeData, Network, NetworkContracts, OperationKind, SessionConfig, ShieldError,
    ShieldResult, ShieldedWalletHandle, TxReceipt, UnsignedTransaction, Wei, WEI_PER_GWEI,
};
use secrecy::SecretString;
use zeroize::Zeroizing;

pub const TEST_PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
pub const TEST_PIN: &str = "4821";
pub const RELAY_ADAPT: &str = "0x7e3d929ebd5bdc84d02bd3205c777578f33a214d";
pub const WETH: &str = "0xfff9976782d46cc05630d1f6ebab18b2324d6b14";
pub const SHIELDED_ADDRESS: &str = "0zk1qyqqqqdl645pcpreh6dga7xa3w4dm9c3tzv6ntesk0fy2kzr476pkunpd9kxwatw8qqqqqdl645pcpreh6dga7xa3w4dm9c3tzv6ntesk0fy2kzr476pkcsu8tp";
pub const GAS_ESTIMATE: u64 = 200_000;

// =============================================================================
// Chain
// =============================================================================

/// Balances replay a per-address script; the last value sticks
#[derive(Default)]
pub struct TestChain {
    balances: Mutex<HashMap<String, VecDeque<Wei>>>,
    nonces: Mutex<HashMap<String, u64>>,
    pub sent: Mutex<Vec<String>>,
}

impl TestChain {
    pub fn script_balance(&self, address: &str, answers: &[Wei]) {
        self.balances
            .lock()
            .unwrap()
            .insert(address.to_lowercase(), answers.iter().copied().collect());
    }

    pub fn set_nonce(&self, address: &str, nonce: u64) {
        self.nonces.lock().unwrap().insert(address.to_lowercase(), nonce);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl ChainRpc for TestChain {
    fn get_balance(&self, address: &str) -> ShieldResult<Wei> {
        let mut balances = self.balances.lock().unwrap();
        let Some(script) = balances.get_mut(&address.to_lowercase()) else {
            return Ok(0);
        };
        let value = if script.len() > 1 {
            script.pop_front().unwrap_or(0)
        } else {
            script.front().copied().unwrap_or(0)
        };
        Ok(value)
    }

    fn get_transaction_count(&self, address: &str) -> ShieldResult<u64> {
        Ok(*self.nonces.lock().unwrap().get(&address.to_lowercase()).unwrap_or(&0))
    }

    fn get_fee_data(&self) -> ShieldResult<FeeData> {
        Ok(FeeData {
            max_fee_per_gas: 20 * WEI_PER_GWEI,
            max_priority_fee_per_gas: WEI_PER_GWEI,
        })
    }

    fn send_raw_transaction(&self, raw_tx: &str) -> ShieldResult<String> {
        self.sent.lock().unwrap().push(raw_tx.to_string());
        Ok(format!("0x{}", hex::encode(keccak256(raw_tx.as_bytes()))))
    }

    fn get_transaction_receipt(&self, tx_hash: &str) -> ShieldResult<Option<TxReceipt>> {
        Ok(Some(TxReceipt {
            tx_hash: tx_hash.to_string(),
            block_number: 42,
            success: true,
        }))
    }

    fn chain_id(&self) -> ShieldResult<u64> {
        Ok(Network::Sepolia.chain_id())
    }
}

#[derive(Default)]
pub struct TestExplorer {
    history: Mutex<HashMap<String, Vec<ExplorerTx>>>,
}

impl TestExplorer {
    pub fn add_tx(&self, from: &str, to: &str) {
        let mut history = self.history.lock().unwrap();
        let entries = history.entry(from.to_lowercase()).or_default();
        entries.push(ExplorerTx {
            hash: format!("0x{:064x}", entries.len() + 1),
            from: from.to_string(),
            to: Some(to.to_string()),
        });
    }
}

impl BlockExplorer for TestExplorer {
    fn transactions(&self, address: &str) -> ShieldResult<Vec<ExplorerTx>> {
        Ok(self
            .history
            .lock()
            .unwrap()
            .get(&address.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }
}

// =============================================================================
// Connectivity & seeds
// =============================================================================

/// Replays a connectivity script, repeating the last value
pub struct ScriptedConnectivity {
    script: Mutex<VecDeque<bool>>,
    last: Mutex<bool>,
}

impl ScriptedConnectivity {
    pub fn new(script: &[bool]) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
            last: Mutex::new(true),
        }
    }

    pub fn last_reported(&self) -> bool {
        *self.last.lock().unwrap()
    }
}

impl ConnectivityProbe for ScriptedConnectivity {
    fn is_online(&self) -> bool {
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            *last = next;
        }
        *last
    }
}

/// Seed entries in order; records what connectivity was when each was read
pub struct ScriptedSeeds {
    entries: VecDeque<&'static str>,
    connectivity: Arc<ScriptedConnectivity>,
    pub online_at_read: Vec<bool>,
}

impl ScriptedSeeds {
    pub fn new(entries: &[&'static str], connectivity: Arc<ScriptedConnectivity>) -> Self {
        Self {
            entries: entries.iter().copied().collect(),
            connectivity,
            online_at_read: Vec::new(),
        }
    }
}

impl SeedSource for ScriptedSeeds {
    fn read_seed(&mut self, _length: SeedLength, _attempt: u32) -> ShieldResult<Zeroizing<String>> {
        self.online_at_read.push(self.connectivity.last_reported());
        self.entries
            .pop_front()
            .map(|s| Zeroizing::new(s.to_string()))
            .ok_or_else(|| ShieldError::invalid_input("No more seed entries"))
    }
}

// =============================================================================
// Engine & broadcasters
// =============================================================================

#[derive(Default)]
pub struct TestEngine {
    pub calls: Mutex<Vec<String>>,
    pub requested_amounts: Mutex<Vec<(OperationKind, Wei)>>,
    pub recipients: Mutex<Vec<String>>,
    pub encryption_keys: Mutex<Vec<String>>,
    pub fail_proof: Mutex<bool>,
    spendable: Mutex<Wei>,
    callback: Mutex<Option<BalanceCallback>>,
}

impl TestEngine {
    pub fn set_spendable(&self, amount: Wei) {
        *self.spendable.lock().unwrap() = amount;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

impl ShieldingEngine for TestEngine {
    fn start(&self, _config: &EngineConfig) -> ShieldResult<()> {
        self.record("start");
        Ok(())
    }

    fn load_provider(&self, _network: Network, _rpc_url: &str) -> ShieldResult<()> {
        self.record("load_provider");
        Ok(())
    }

    fn network_contracts(&self, _network: Network) -> ShieldResult<NetworkContracts> {
        self.record("network_contracts");
        Ok(NetworkContracts {
            relay_adapt: RELAY_ADAPT.to_string(),
            wrapped_base_token: WETH.to_string(),
            deployment_block: 5_784_866,
        })
    }

    fn load_or_create_wallet(
        &self,
        encryption_key: &str,
        source: WalletSource<'_>,
    ) -> ShieldResult<ShieldedWalletHandle> {
        match source {
            WalletSource::Seed { creation_block, .. } => {
                self.record(format!("create_wallet@{}", creation_block))
            }
            WalletSource::Existing { wallet_id } => {
                self.record(format!("load_wallet:{}", wallet_id))
            }
        }
        self.encryption_keys.lock().unwrap().push(encryption_key.to_string());
        Ok(ShieldedWalletHandle {
            shielded_address: SHIELDED_ADDRESS.to_string(),
            wallet_id: "wallet-1".to_string(),
            encryption_key: Zeroizing::new(encryption_key.to_string()),
        })
    }

    fn estimate_gas(&self, request: &OperationRequest<'_>) -> ShieldResult<u64> {
        self.record(format!("estimate:{}", request.kind));
        Ok(GAS_ESTIMATE)
    }

    fn generate_proof(
        &self,
        request: &OperationRequest<'_>,
        on_progress: &dyn Fn(f64),
    ) -> ShieldResult<()> {
        self.record(format!("proof:{}", request.kind));
        if *self.fail_proof.lock().unwrap() {
            return Err(ShieldError::new(
                ephemeral_shield::ErrorCode::ProofGenerationFailure,
                "Circuit witness failed",
            ));
        }
        on_progress(0.5);
        on_progress(1.0);
        Ok(())
    }

    fn populate_transaction(
        &self,
        request: &OperationRequest<'_>,
    ) -> ShieldResult<UnsignedTransaction> {
        self.record(format!("populate:{}", request.kind));
        self.requested_amounts.lock().unwrap().push((request.kind, request.amount));
        self.recipients.lock().unwrap().push(request.recipient.clone());
        Ok(UnsignedTransaction {
            to: RELAY_ADAPT.to_string(),
            data: vec![0xde, 0xad],
            value: if request.kind == OperationKind::Shield { request.amount } else { 0 },
            gas_limit: GAS_ESTIMATE,
            max_fee_per_gas: request.max_fee_per_gas,
            max_priority_fee_per_gas: request.max_priority_fee_per_gas,
        })
    }

    fn refresh_balances(&self, network: Network, wallet_ids: &[String]) -> ShieldResult<()> {
        self.record("refresh");
        let spendable = *self.spendable.lock().unwrap();
        if let Some(callback) = self.callback.lock().unwrap().as_ref() {
            for wallet_id in wallet_ids {
                callback(&BalanceEvent {
                    network,
                    wallet_id: wallet_id.clone(),
                    bucket: BalanceBucket::Spendable,
                    token_amounts: vec![TokenAmount {
                        token: WETH.to_string(),
                        amount: spendable,
                    }],
                });
            }
        }
        Ok(())
    }

    fn on_balance_update(&self, callback: BalanceCallback) {
        self.record("on_balance_update");
        *self.callback.lock().unwrap() = Some(callback);
    }

    fn stop(&self) -> ShieldResult<()> {
        self.record("stop");
        Ok(())
    }
}

#[derive(Default)]
pub struct TestBroadcasters {
    pub available: Mutex<Option<BroadcasterInfo>>,
    pub submitted: Mutex<Vec<Wei>>,
}

impl TestBroadcasters {
    pub fn with_broadcaster() -> Self {
        let broadcasters = Self::default();
        *broadcasters.available.lock().unwrap() = Some(BroadcasterInfo {
            shielded_address: "0zk1broadcaster".to_string(),
            fee_token: WETH.to_string(),
            fee_per_unit_gas: 25 * WEI_PER_GWEI,
            fees_id: "fees-1".to_string(),
        });
        broadcasters
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

impl BroadcasterNetwork for TestBroadcasters {
    fn connect(&self, _network: Network) -> ShieldResult<bool> {
        Ok(self.available.lock().unwrap().is_some())
    }

    fn find_best_broadcaster(
        &self,
        _network: Network,
        _token: &str,
    ) -> ShieldResult<Option<BroadcasterInfo>> {
        Ok(self.available.lock().unwrap().clone())
    }

    fn submit(
        &self,
        tx: &UnsignedTransaction,
        _broadcaster: &BroadcasterInfo,
        min_gas_price: Wei,
    ) -> ShieldResult<String> {
        self.submitted.lock().unwrap().push(min_gas_price);
        Ok(format!("0x{}", hex::encode(keccak256(&tx.data))))
    }
}

/// Collects proof progress reports
#[derive(Clone, Default)]
pub struct RecordingProgress(pub Arc<Mutex<Vec<(OperationKind, f64)>>>);

impl ProofProgress for RecordingProgress {
    fn proof_progress(&self, kind: OperationKind, fraction: f64) {
        self.0.lock().unwrap().push((kind, fraction));
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub chain: Arc<TestChain>,
    pub explorer: Arc<TestExplorer>,
    pub engine: Arc<TestEngine>,
    pub broadcasters: Arc<TestBroadcasters>,
    pub connectivity: Arc<ScriptedConnectivity>,
    pub sleeper: Arc<RecordingSleeper>,
}

impl Harness {
    /// Connectivity goes online, offline for key derivation, online again
    pub fn new() -> Self {
        Self::with_broadcasters(TestBroadcasters::with_broadcaster())
    }

    pub fn with_broadcasters(broadcasters: TestBroadcasters) -> Self {
        Self {
            chain: Arc::new(TestChain::default()),
            explorer: Arc::new(TestExplorer::default()),
            engine: Arc::new(TestEngine::default()),
            broadcasters: Arc::new(broadcasters),
            connectivity: Arc::new(ScriptedConnectivity::new(&[true, false, true])),
            sleeper: Arc::new(RecordingSleeper::new()),
        }
    }

    pub fn config() -> SessionConfig {
        SessionConfig::new(
            Network::Sepolia,
            "https://rpc.sepolia.example.org",
            SecretString::from("explorer-key".to_string()),
            SecretString::from("db-password".to_string()),
            SecretString::from(TEST_PIN.to_string()),
            "/tmp/ephemeral-shield-test",
        )
    }

    pub fn session(&self, config: SessionConfig) -> Session {
        let services = SessionServices {
            rpc: self.chain.clone(),
            explorer: self.explorer.clone(),
            engine: self.engine.clone(),
            broadcasters: self.broadcasters.clone(),
            connectivity: self.connectivity.clone(),
            sleeper: self.sleeper.clone(),
        };
        Session::new(config, services).expect("valid test config")
    }

    pub fn seeds(&self, entries: &[&'static str]) -> ScriptedSeeds {
        ScriptedSeeds::new(entries, self.connectivity.clone())
    }

    /// A session that has completed setup
    pub fn ready_session(&self) -> Session {
        let mut session = self.session(Self::config());
        let mut seeds = self.seeds(&[TEST_PHRASE]);
        session
            .setup(&mut seeds, SeedLength::Twelve)
            .expect("setup succeeds");
        session
    }
}
