//! Session flows
//!
//! A `Session` owns the configuration and every external collaborator and
//! runs one flow at a time. `setup` must complete before any flow that
//! touches keys or funds.

use secrecy::ExposeSecret;
use serde::Serialize;
use std::sync::Arc;

use crate::balances::{scan_balances, BalanceObserver};
use crate::config::SessionConfig;
use crate::engine::{BroadcasterNetwork, EngineConfig, ShieldingEngine, WalletSource};
use crate::error::{ShieldError, ShieldResult};
use crate::gate::{
    ConnectivityProbe, GatePrompt, HttpConnectivityProbe, LogPrompt, NetworkGate,
};
use crate::monitor::DepositMonitor;
use crate::orchestrator::{Orchestrator, ProofProgress, Submission};
use crate::probe::FreshnessProber;
use crate::rpc::{BlockExplorer, ChainRpc, EtherscanClient, JsonRpcClient};
use crate::selector::AccountSelector;
use crate::types::{
    AccountRole, NetworkContracts, OperationKind, OperationReceipt, ShieldedBalances,
    ShieldedWalletHandle, Wei,
};
use crate::utils::{format_ether, HttpTimeouts, Sleeper, ThreadSleeper};
use crate::wallet::{
    derive_stealth_keys, read_valid_seed, shielded_encryption_key, DerivationStrategy,
    EphemeralAccount, Seed, SeedLength, SeedSource, StealthKeyMaterial, MAX_SEED_ATTEMPTS,
};
use crate::{log_info, log_warn};

/// Identifies this client to the Shielding Engine
pub const WALLET_SOURCE: &str = "ephemeral-shield";

// =============================================================================
// Collaborators
// =============================================================================

/// Shows the user where to send funds. Addresses are redacted in logs, so
/// the full address only ever reaches this prompt.
pub trait DepositPrompt {
    fn deposit_to(&self, address: &str, account: &str, network: &str);
}

/// Deposit instructions shown on stdout, outside the redacting logger
fn deposit_instructions(address: &str, account: &str, network: &str) -> String {
    format!("Send {} funds to {} ({})", network, address, account)
}

impl DepositPrompt for LogPrompt {
    fn deposit_to(&self, address: &str, account: &str, network: &str) {
        println!("{}", deposit_instructions(address, account, network));
        log_info!("session", "Waiting for deposit", account = account, network = network);
    }
}

impl ProofProgress for LogPrompt {
    fn proof_progress(&self, kind: OperationKind, fraction: f64) {
        log_info!(
            "session",
            "Proof progress",
            kind = kind,
            percent = format!("{:.0}", fraction.clamp(0.0, 1.0) * 100.0)
        );
    }
}

/// Everything a session talks to
pub struct SessionServices {
    pub rpc: Arc<dyn ChainRpc>,
    pub explorer: Arc<dyn BlockExplorer>,
    pub engine: Arc<dyn ShieldingEngine>,
    pub broadcasters: Arc<dyn BroadcasterNetwork>,
    pub connectivity: Arc<dyn ConnectivityProbe>,
    pub sleeper: Arc<dyn Sleeper>,
}

/// Which key family backs an ephemeral deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationMode {
    Standard,
    Stealth,
}

/// State that exists only after `setup`
struct Ready {
    seed: Seed,
    stealth: StealthKeyMaterial,
    wallet: ShieldedWalletHandle,
    contracts: NetworkContracts,
    observer: Arc<BalanceObserver>,
}

/// Result of a deposit-and-shield flow
#[derive(Debug, Clone, Serialize)]
pub struct ShieldOutcome {
    /// `m/44'/60'/0'/0/3` or `stealth/7`
    pub account: String,
    pub address: String,
    pub deposited: Wei,
    pub skipped: u64,
    pub receipt: OperationReceipt,
}

// =============================================================================
// Session
// =============================================================================

pub struct Session {
    config: SessionConfig,
    services: SessionServices,
    gate_prompt: Box<dyn GatePrompt>,
    deposit_prompt: Box<dyn DepositPrompt>,
    proof_progress: Box<dyn ProofProgress>,
    ready: Option<Ready>,
}

impl Session {
    pub fn new(config: SessionConfig, services: SessionServices) -> ShieldResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            services,
            gate_prompt: Box::new(LogPrompt),
            deposit_prompt: Box::new(LogPrompt),
            proof_progress: Box::new(LogPrompt),
            ready: None,
        })
    }

    /// Session backed by the JSON-RPC node and explorer in `config`
    pub fn connect(
        config: SessionConfig,
        engine: Arc<dyn ShieldingEngine>,
        broadcasters: Arc<dyn BroadcasterNetwork>,
    ) -> ShieldResult<Self> {
        config.validate()?;
        let rpc = JsonRpcClient::with_timeouts(&config.rpc_url, HttpTimeouts::default())?;
        let explorer = EtherscanClient::new(
            config.explorer_api_key.expose_secret(),
            config.network.chain_id(),
        )?;
        let connectivity = HttpConnectivityProbe::new(config.connectivity_timeout)?;

        let services = SessionServices {
            rpc: Arc::new(rpc),
            explorer: Arc::new(explorer),
            engine,
            broadcasters,
            connectivity: Arc::new(connectivity),
            sleeper: Arc::new(ThreadSleeper),
        };
        Self::new(config, services)
    }

    pub fn with_prompts(
        mut self,
        gate_prompt: Box<dyn GatePrompt>,
        deposit_prompt: Box<dyn DepositPrompt>,
    ) -> Self {
        self.gate_prompt = gate_prompt;
        self.deposit_prompt = deposit_prompt;
        self
    }

    /// Where transfer and unshield proofs report their progress
    pub fn with_proof_progress(mut self, progress: Box<dyn ProofProgress>) -> Self {
        self.proof_progress = progress;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.ready.is_some()
    }

    pub fn shielded_address(&self) -> Option<&str> {
        self.ready.as_ref().map(|r| r.wallet.shielded_address.as_str())
    }

    fn ready(&self) -> ShieldResult<&Ready> {
        self.ready
            .as_ref()
            .ok_or_else(|| ShieldError::gate_violation("Session setup has not completed"))
    }

    /// Bring the session up through the network-mode gate: online start-up,
    /// offline seed entry and key derivation, back online.
    pub fn setup(
        &mut self,
        seed_source: &mut dyn SeedSource,
        length: SeedLength,
    ) -> ShieldResult<()> {
        if self.ready.is_some() {
            return Err(ShieldError::gate_violation("Session is already set up"));
        }

        let ready = {
            let services = &self.services;
            let config = &self.config;
            let mut gate = NetworkGate::new(
                services.connectivity.as_ref(),
                services.sleeper.as_ref(),
                self.gate_prompt.as_ref(),
                config.connectivity_poll_interval,
            );

            gate.begin()?;
            let contracts = gate.initialize(|| start_engine(services, config))?;

            let (seed, wallet, stealth) = gate.with_secrets(|| {
                let seed = read_valid_seed(seed_source, length, MAX_SEED_ATTEMPTS)?;
                let wallet =
                    open_shielded_wallet(services.engine.as_ref(), config, &seed, &contracts)?;
                let stealth = derive_stealth_keys(&seed, &config.stealth_pin)?;
                Ok((seed, wallet, stealth))
            })?;

            gate.resume_online()?;

            let observer = Arc::new(BalanceObserver::new(&contracts.wrapped_base_token));
            services.engine.on_balance_update(observer.callback());
            gate.finish()?;

            Ready {
                seed,
                stealth,
                wallet,
                contracts,
                observer,
            }
        };

        log_info!("session", "Session ready", network = self.config.network);
        self.ready = Some(ready);
        Ok(())
    }

    fn orchestrator<'s>(&'s self, ready: &'s Ready) -> Orchestrator<'s> {
        Orchestrator::new(
            self.services.engine.as_ref(),
            self.services.broadcasters.as_ref(),
            self.services.rpc.as_ref(),
            self.services.sleeper.as_ref(),
            self.config.network,
            &ready.contracts.wrapped_base_token,
        )
        .with_policy(self.config.amount_policy())
        .with_receipt_interval(self.config.receipt_poll_interval)
        .with_progress(self.proof_progress.as_ref())
    }

    /// Pick a fresh deposit account, wait for funds, shield them
    pub fn ephemeral_deposit(&self, mode: DerivationMode) -> ShieldResult<ShieldOutcome> {
        let ready = self.ready()?;
        let (strategy, start) = match mode {
            DerivationMode::Standard => (DerivationStrategy::Standard(&ready.seed), 0),
            DerivationMode::Stealth => (
                DerivationStrategy::Stealth(&ready.stealth),
                self.config.starting_nonce,
            ),
        };
        self.select_and_shield(ready, strategy, AccountRole::Deposit, start)
    }

    /// Walk stealth addresses from the configured nonce to the first one
    /// not yet shielded, wait for funds if it is empty, shield
    pub fn auto_shield_scan(&self) -> ShieldResult<ShieldOutcome> {
        let ready = self.ready()?;
        self.select_and_shield(
            ready,
            DerivationStrategy::Stealth(&ready.stealth),
            AccountRole::AutoShield,
            self.config.starting_nonce,
        )
    }

    fn select_and_shield(
        &self,
        ready: &Ready,
        strategy: DerivationStrategy<'_>,
        role: AccountRole,
        start: u64,
    ) -> ShieldResult<ShieldOutcome> {
        let services = &self.services;
        let prober = FreshnessProber::new(
            services.rpc.as_ref(),
            services.explorer.as_ref(),
            &ready.contracts.relay_adapt,
        );
        let selected = AccountSelector::new(&prober, services.sleeper.as_ref())
            .with_max_index(self.config.max_index)
            .find_account(strategy, role, start)?;
        let account = selected.account;

        let mut balance = services.rpc.get_balance(account.address())?;
        if balance == 0 {
            self.deposit_prompt.deposit_to(
                account.address(),
                &account.descriptor(),
                self.config.network.name(),
            );
            balance = DepositMonitor::new(
                services.rpc.as_ref(),
                services.sleeper.as_ref(),
                self.config.deposit_poll_interval,
            )
            .await_deposit(account.address())?;
        }

        log_info!(
            "session",
            "Shielding deposit",
            account = account.descriptor(),
            amount_eth = format_ether(balance)
        );
        let receipt = self
            .orchestrator(ready)
            .shield(&ready.wallet, &account, balance)?;

        Ok(ShieldOutcome {
            account: account.descriptor(),
            address: account.address().to_string(),
            deposited: balance,
            skipped: selected.skipped,
            receipt,
        })
    }

    /// Current shielded balances after a refresh
    pub fn balances(&self) -> ShieldResult<ShieldedBalances> {
        let ready = self.ready()?;
        scan_balances(
            self.services.engine.as_ref(),
            &ready.observer,
            self.services.sleeper.as_ref(),
            self.config.network,
            &ready.wallet.wallet_id,
            self.config.balance_settle,
        )
    }

    /// Spendable amount to move: everything, or `amount` if it is covered
    fn spendable_amount(&self, amount: Option<Wei>) -> ShieldResult<Wei> {
        let spendable = self.balances()?.spendable;
        match amount {
            Some(requested) if requested > spendable => {
                Err(ShieldError::insufficient_balance(format!(
                    "Requested {} but only {} is spendable",
                    format_ether(requested),
                    format_ether(spendable)
                )))
            }
            Some(requested) => Ok(requested),
            None => Ok(spendable),
        }
    }

    /// Private transfer through a broadcaster. `None` sends the whole
    /// spendable balance.
    pub fn private_transfer(
        &self,
        recipient: &str,
        amount: Option<Wei>,
    ) -> ShieldResult<OperationReceipt> {
        let ready = self.ready()?;
        let gross = self.spendable_amount(amount)?;
        self.orchestrator(ready)
            .transfer(&ready.wallet, recipient, gross, Submission::Broadcaster)
    }

    /// Withdraw through a broadcaster to the next never-used receive
    /// account of the seed
    pub fn unshield(
        &self,
        amount: Option<Wei>,
    ) -> ShieldResult<(EphemeralAccount, OperationReceipt)> {
        let ready = self.ready()?;
        let gross = self.spendable_amount(amount)?;

        let prober = FreshnessProber::new(
            self.services.rpc.as_ref(),
            self.services.explorer.as_ref(),
            &ready.contracts.relay_adapt,
        );
        let destination = AccountSelector::new(&prober, self.services.sleeper.as_ref())
            .with_max_index(self.config.max_index)
            .find_account(DerivationStrategy::Standard(&ready.seed), AccountRole::Receive, 0)?
            .account;

        log_info!("session", "Unshielding", account = destination.descriptor());
        let receipt = self.orchestrator(ready).unshield(
            &ready.wallet,
            destination.address(),
            gross,
            Submission::Broadcaster,
        )?;
        Ok((destination, receipt))
    }

    pub fn engine(&self) -> Arc<dyn ShieldingEngine> {
        Arc::clone(&self.services.engine)
    }
}

// =============================================================================
// Start-up helpers
// =============================================================================

/// Engine start, provider load and broadcaster discovery. Needs the network.
fn start_engine(
    services: &SessionServices,
    config: &SessionConfig,
) -> ShieldResult<NetworkContracts> {
    let engine_config = EngineConfig::from_storage_dir(
        &config.storage_dir,
        WALLET_SOURCE,
        config.poi_endpoints.clone(),
    );
    services.engine.start(&engine_config)?;
    services.engine.load_provider(config.network, &config.rpc_url)?;
    let contracts = services.engine.network_contracts(config.network)?;

    match services.broadcasters.connect(config.network) {
        Ok(true) => log_info!("session", "Broadcaster network connected", network = config.network),
        Ok(false) => log_warn!("session", "No broadcaster peers yet", network = config.network),
        Err(e) => log_warn!("session", "Broadcaster network unavailable", error = e),
    }

    Ok(contracts)
}

/// Load the configured shielded wallet, or create it from the seed with a
/// scan starting at the pool's deployment block
pub fn open_shielded_wallet(
    engine: &dyn ShieldingEngine,
    config: &SessionConfig,
    seed: &Seed,
    contracts: &NetworkContracts,
) -> ShieldResult<ShieldedWalletHandle> {
    let encryption_key = shielded_encryption_key(config.db_password.expose_secret());
    let source = match config.wallet_id.as_deref() {
        Some(wallet_id) => WalletSource::Existing { wallet_id },
        None => WalletSource::Seed {
            seed,
            creation_block: contracts.deployment_block,
        },
    };
    let wallet = engine.load_or_create_wallet(&encryption_key, source)?;
    log_info!("session", "Shielded wallet open", wallet_id = &wallet.wallet_id);
    Ok(wallet)
}

// =============================================================================
// Shutdown
// =============================================================================

/// Run `on_interrupt` on Ctrl-C, then exit.
///
/// The listener runs on its own thread with a private runtime because the
/// flows themselves are blocking. An in-flight poll or proof is abandoned.
pub fn install_shutdown_handler<F>(on_interrupt: F) -> ShieldResult<()>
where
    F: FnOnce() + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ShieldError::internal(format!("Failed to build signal runtime: {}", e)))?;

    std::thread::Builder::new()
        .name("shutdown".to_string())
        .spawn(move || {
            if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
                log_warn!("session", "Interrupted, shutting down");
                on_interrupt();
                std::process::exit(130);
            }
        })
        .map_err(|e| ShieldError::internal(format!("Failed to spawn shutdown thread: {}", e)))?;

    Ok(())
}

/// Stop background engine activity before the process exits on Ctrl-C
pub fn stop_engine_on_interrupt(engine: Arc<dyn ShieldingEngine>) -> ShieldResult<()> {
    install_shutdown_handler(move || {
        if let Err(e) = engine.stop() {
            log_warn!("session", "Engine stop failed", error = e);
        }
    })
}
