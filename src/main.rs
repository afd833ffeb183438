//! ephemeral-shield: derive, probe and watch ephemeral deposit accounts.
//!
//! Seeds and PINs are read from stdin, one per line, never from flags.
//! Commands that read them wait until the machine is offline unless
//! `--allow-online` is given.

use std::collections::VecDeque;
use std::io::{self, BufRead};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use secrecy::SecretString;
use serde::Serialize;
use zeroize::Zeroizing;

use ephemeral_shield::gate::{
    ConnectivityProbe, ConnectivityTarget, GatePrompt, HttpConnectivityProbe, NetworkGate,
    DEFAULT_GATE_POLL_INTERVAL, DEFAULT_PROBE_TIMEOUT,
};
use ephemeral_shield::log_warn;
use ephemeral_shield::monitor::DepositMonitor;
use ephemeral_shield::probe::FreshnessProber;
use ephemeral_shield::rpc::{ChainRpc, EtherscanClient, JsonRpcClient};
use ephemeral_shield::selector::AccountSelector;
use ephemeral_shield::session::install_shutdown_handler;
use ephemeral_shield::utils::logging::enable_debug;
use ephemeral_shield::utils::{format_ether, normalize_address, parse_ether, ThreadSleeper};
use ephemeral_shield::wallet::seed::normalize_phrase;
use ephemeral_shield::wallet::{
    derive_stealth_account, derive_stealth_keys, read_valid_seed, validate_seed, DerivationStrategy,
    EphemeralAccount, Seed, SeedLength, SeedSource, StealthKeyMaterial, MAX_SEED_ATTEMPTS,
};
use ephemeral_shield::{
    compute_net_amount, AccountRole, AmountPolicy, FeeData, Network, ShieldError, ShieldResult,
    WEI_PER_GWEI,
};

#[derive(Parser)]
#[command(name = "ephemeral-shield")]
#[command(version, about = "Ephemeral deposit accounts for shielded transfers")]
struct Cli {
    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a seed phrase read from stdin
    ValidateSeed(ValidateSeedArgs),
    /// Derive standard accounts for a role
    Derive(DeriveArgs),
    /// Derive stealth accounts (seed, then PIN on stdin)
    Stealth(StealthArgs),
    /// Compute the transferable amount after gas and buffer
    NetAmount(NetAmountArgs),
    /// Report whether the machine is online
    Connectivity(ConnectivityArgs),
    /// Classify an address against live chain state
    Probe(ProbeArgs),
    /// Find the first usable account for a role
    FindAccount(FindAccountArgs),
    /// Block until an address holds funds
    AwaitDeposit(AwaitDepositArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Deposit,
    Receive,
    AutoShield,
}

impl From<RoleArg> for AccountRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Deposit => AccountRole::Deposit,
            RoleArg::Receive => AccountRole::Receive,
            RoleArg::AutoShield => AccountRole::AutoShield,
        }
    }
}

#[derive(Args)]
struct SeedArgs {
    /// Declared seed length (12 or 24 words)
    #[arg(long, default_value_t = 12)]
    words: usize,
}

#[derive(Args)]
struct OfflineArgs {
    /// Read secrets without waiting for the machine to go offline
    #[arg(long)]
    allow_online: bool,

    /// Endpoint probed to detect connectivity (repeatable)
    #[arg(long = "connectivity-endpoint", value_name = "URL")]
    connectivity_endpoints: Vec<String>,

    /// Per-request connectivity timeout in seconds
    #[arg(long, default_value_t = DEFAULT_PROBE_TIMEOUT.as_secs())]
    connectivity_timeout: u64,
}

impl OfflineArgs {
    fn probe(&self) -> ShieldResult<HttpConnectivityProbe> {
        let timeout = Duration::from_secs(self.connectivity_timeout);
        if self.connectivity_endpoints.is_empty() {
            HttpConnectivityProbe::new(timeout)
        } else {
            HttpConnectivityProbe::with_endpoints(self.connectivity_endpoints.clone(), timeout)
        }
    }
}

#[derive(Args)]
struct ChainArgs {
    /// Network (mainnet, sepolia, polygon)
    #[arg(long, env = "NETWORK", default_value = "sepolia")]
    network: String,

    /// JSON-RPC endpoint
    #[arg(long, env = "RPC_URL")]
    rpc_url: String,
}

#[derive(Args)]
struct ExplorerArgs {
    /// Etherscan v2 API key
    #[arg(long, env = "ETHERSCAN_API_KEY", hide_env_values = true)]
    etherscan_api_key: String,

    /// Shield entry contract (relay adapt) for the network
    #[arg(long)]
    shield_contract: String,
}

#[derive(Args)]
struct ValidateSeedArgs {
    #[command(flatten)]
    offline: OfflineArgs,
}

#[derive(Args)]
struct DeriveArgs {
    #[command(flatten)]
    seed: SeedArgs,

    #[command(flatten)]
    offline: OfflineArgs,

    #[arg(long, value_enum, default_value = "deposit")]
    role: RoleArg,

    #[arg(long, default_value_t = 0)]
    start: u64,

    #[arg(long, default_value_t = 1)]
    count: u64,
}

#[derive(Args)]
struct StealthArgs {
    #[command(flatten)]
    seed: SeedArgs,

    #[command(flatten)]
    offline: OfflineArgs,

    #[arg(long, env = "STARTING_NONCE", default_value_t = 0)]
    start_nonce: u64,

    #[arg(long, default_value_t = 1)]
    count: u64,
}

#[derive(Args)]
struct NetAmountArgs {
    /// Gross amount in ETH
    #[arg(long)]
    amount: String,

    /// Gas estimate in units
    #[arg(long)]
    gas: u64,

    /// Max fee per gas in gwei
    #[arg(long)]
    max_fee_gwei: u128,

    #[arg(long, default_value_t = 1)]
    priority_fee_gwei: u128,

    #[arg(long, default_value_t = ephemeral_shield::amount::DEFAULT_FEE_BUFFER_BPS)]
    buffer_bps: u32,

    /// Minimum gross amount in ETH
    #[arg(long, default_value = "0.01")]
    min: String,
}

#[derive(Args)]
struct ConnectivityArgs {
    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_PROBE_TIMEOUT.as_secs())]
    timeout: u64,
}

#[derive(Args)]
struct ProbeArgs {
    #[arg(long)]
    address: String,

    #[command(flatten)]
    chain: ChainArgs,

    #[command(flatten)]
    explorer: ExplorerArgs,
}

#[derive(Args)]
struct FindAccountArgs {
    #[command(flatten)]
    seed: SeedArgs,

    #[arg(long, value_enum, default_value = "deposit")]
    role: RoleArg,

    /// Use stealth addresses (PIN on the line after the seed)
    #[arg(long)]
    stealth: bool,

    /// First address index for standard derivation
    #[arg(long, default_value_t = 0)]
    start: u64,

    /// First nonce for stealth derivation
    #[arg(long, env = "STARTING_NONCE", default_value_t = 0)]
    start_nonce: u64,

    /// Give up past this index
    #[arg(long)]
    max_index: Option<u64>,

    #[command(flatten)]
    chain: ChainArgs,

    #[command(flatten)]
    explorer: ExplorerArgs,

    #[command(flatten)]
    offline: OfflineArgs,
}

impl FindAccountArgs {
    /// `STARTING_NONCE` only shifts stealth searches
    fn start_index(&self) -> u64 {
        if self.stealth {
            self.start_nonce
        } else {
            self.start
        }
    }
}

#[derive(Args)]
struct AwaitDepositArgs {
    #[arg(long)]
    address: String,

    /// Seconds between balance checks
    #[arg(long, env = "POLL_INTERVAL_SECONDS", default_value_t = 15)]
    interval: u64,

    #[command(flatten)]
    chain: ChainArgs,
}

// =============================================================================
// Stdin
// =============================================================================

/// Secret lines from stdin, consumed in order
struct StdinSecrets {
    lines: VecDeque<Zeroizing<String>>,
}

impl StdinSecrets {
    fn read() -> ShieldResult<Self> {
        let mut lines = VecDeque::new();
        for line in io::stdin().lock().lines() {
            let line = Zeroizing::new(line.map_err(|e| {
                ShieldError::invalid_input(format!("Failed to read stdin: {}", e))
            })?);
            if !line.trim().is_empty() {
                lines.push_back(line);
            }
        }
        Ok(Self { lines })
    }

    fn next_secret(&mut self, what: &str) -> ShieldResult<Zeroizing<String>> {
        self.lines
            .pop_front()
            .ok_or_else(|| ShieldError::invalid_input(format!("Expected {} on stdin", what)))
    }

    fn pin(&mut self) -> ShieldResult<SecretString> {
        let line = self.next_secret("a PIN")?;
        Ok(SecretString::from(line.trim().to_string()))
    }
}

impl SeedSource for StdinSecrets {
    fn read_seed(&mut self, _length: SeedLength, _attempt: u32) -> ShieldResult<Zeroizing<String>> {
        self.next_secret("a seed phrase")
    }

    fn report_invalid(&mut self, attempt: u32, remaining: u32) {
        eprintln!("Seed phrase {} rejected, {} attempts left", attempt, remaining);
    }
}

fn read_seed(secrets: &mut StdinSecrets, args: &SeedArgs) -> ShieldResult<Seed> {
    let length = SeedLength::from_word_count(args.words).ok_or_else(|| {
        ShieldError::invalid_input(format!("Unsupported seed length: {} words", args.words))
    })?;
    read_valid_seed(secrets, length, MAX_SEED_ATTEMPTS)
}

// =============================================================================
// Offline gate
// =============================================================================

/// Tells the user on stderr which way to toggle their connection
struct StderrPrompt;

impl GatePrompt for StderrPrompt {
    fn waiting_for(&self, target: ConnectivityTarget, attempt: u64) {
        if attempt > 1 {
            return;
        }
        match target {
            ConnectivityTarget::Offline => {
                eprintln!("Disconnect this machine from the network to continue")
            }
            ConnectivityTarget::Online => {
                eprintln!("Reconnect this machine to the network to continue")
            }
        }
    }
}

/// Run `read` once connectivity is verified absent
fn offline_secrets<T>(
    offline: &OfflineArgs,
    read: impl FnOnce() -> ShieldResult<T>,
) -> ShieldResult<T> {
    if offline.allow_online {
        log_warn!("cli", "Reading secrets without an offline check");
        return read();
    }
    let probe = offline.probe()?;
    let gate = NetworkGate::new(&probe, &ThreadSleeper, &StderrPrompt, DEFAULT_GATE_POLL_INTERVAL);
    gate.wait_for(ConnectivityTarget::Offline);
    read()
}

// =============================================================================
// Output
// =============================================================================

#[derive(Serialize)]
struct AccountLine {
    index: u64,
    account: String,
    address: String,
}

impl From<&EphemeralAccount> for AccountLine {
    fn from(account: &EphemeralAccount) -> Self {
        Self {
            index: account.index(),
            account: account.descriptor(),
            address: account.address().to_string(),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_accounts(json: bool, accounts: &[AccountLine]) -> Result<()> {
    if json {
        return print_json(&accounts);
    }
    for line in accounts {
        println!("{:<6} {:<28} {}", line.index, line.account, line.address);
    }
    Ok(())
}

// =============================================================================
// Commands
// =============================================================================

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        enable_debug();
    }

    match cli.command {
        Commands::ValidateSeed(args) => cmd_validate_seed(cli.json, args),
        Commands::Derive(args) => cmd_derive(cli.json, args),
        Commands::Stealth(args) => cmd_stealth(cli.json, args),
        Commands::NetAmount(args) => cmd_net_amount(cli.json, args),
        Commands::Connectivity(args) => cmd_connectivity(cli.json, args),
        Commands::Probe(args) => cmd_probe(cli.json, args),
        Commands::FindAccount(args) => cmd_find_account(cli.json, args),
        Commands::AwaitDeposit(args) => cmd_await_deposit(cli.json, args),
    }
}

fn cmd_validate_seed(json: bool, args: ValidateSeedArgs) -> Result<()> {
    let phrase = offline_secrets(&args.offline, || {
        StdinSecrets::read()?.next_secret("a seed phrase")
    })?;
    let normalized = normalize_phrase(&phrase);
    let words = normalized.split_whitespace().count();
    let valid = validate_seed(&normalized);

    if json {
        print_json(&serde_json::json!({ "valid": valid, "words": words }))?;
    } else if valid {
        println!("valid ({} words)", words);
    } else {
        println!("invalid ({} words)", words);
    }

    if !valid {
        drop(normalized);
        drop(phrase);
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_derive(json: bool, args: DeriveArgs) -> Result<()> {
    let seed = offline_secrets(&args.offline, || {
        read_seed(&mut StdinSecrets::read()?, &args.seed)
    })?;
    let strategy = DerivationStrategy::Standard(&seed);
    let role = AccountRole::from(args.role);

    let mut lines = Vec::new();
    for index in args.start..args.start.saturating_add(args.count) {
        lines.push(AccountLine::from(&strategy.derive(role, index)?));
    }
    print_accounts(json, &lines)
}

fn cmd_stealth(json: bool, args: StealthArgs) -> Result<()> {
    let keys = offline_secrets(&args.offline, || {
        let mut secrets = StdinSecrets::read()?;
        let seed = read_seed(&mut secrets, &args.seed)?;
        derive_stealth_keys(&seed, &secrets.pin()?)
    })?;

    let mut lines = Vec::new();
    for nonce in args.start_nonce..args.start_nonce.saturating_add(args.count) {
        let account = EphemeralAccount::Stealth(derive_stealth_account(&keys, nonce)?);
        lines.push(AccountLine::from(&account));
    }
    print_accounts(json, &lines)
}

fn cmd_net_amount(json: bool, args: NetAmountArgs) -> Result<()> {
    let gross = parse_ether(&args.amount)?;
    let fees = FeeData {
        max_fee_per_gas: args
            .max_fee_gwei
            .checked_mul(WEI_PER_GWEI)
            .context("Max fee too large")?,
        max_priority_fee_per_gas: args
            .priority_fee_gwei
            .checked_mul(WEI_PER_GWEI)
            .context("Priority fee too large")?,
    };
    let policy = AmountPolicy {
        min_amount: parse_ether(&args.min)?,
        fee_buffer_bps: args.buffer_bps,
    };

    let pending = compute_net_amount(gross, args.gas, &fees, &policy)?;
    if json {
        return print_json(&pending);
    }
    println!("Gross:    {} ETH", format_ether(pending.gross_amount));
    println!("Gas cost: {} ETH", format_ether(pending.gas_cost));
    println!("Buffer:   {} ETH", format_ether(pending.buffer));
    println!("Net:      {} ETH", format_ether(pending.net_amount));
    Ok(())
}

fn cmd_connectivity(json: bool, args: ConnectivityArgs) -> Result<()> {
    let probe = HttpConnectivityProbe::new(Duration::from_secs(args.timeout))?;
    let online = probe.is_online();
    if json {
        print_json(&serde_json::json!({ "online": online }))
    } else {
        println!("{}", if online { "online" } else { "offline" });
        Ok(())
    }
}

/// Open the RPC client and check it serves `network`. Needs the network.
fn connect(network: Network, chain: &ChainArgs) -> ShieldResult<JsonRpcClient> {
    ephemeral_shield::config::validate_rpc_url(&chain.rpc_url)?;
    let rpc = JsonRpcClient::new(&chain.rpc_url)?;

    let reported = rpc.chain_id()?;
    if reported != network.chain_id() {
        return Err(ShieldError::config_error(format!(
            "RPC endpoint is on chain {} but {} is chain {}",
            reported,
            network,
            network.chain_id()
        )));
    }
    Ok(rpc)
}

fn cmd_probe(json: bool, args: ProbeArgs) -> Result<()> {
    let address = normalize_address(&args.address)?;
    let network: Network = args.chain.network.parse()?;
    let rpc = connect(network, &args.chain)?;
    let explorer = EtherscanClient::new(&args.explorer.etherscan_api_key, network.chain_id())?;
    let prober = FreshnessProber::new(&rpc, &explorer, &args.explorer.shield_contract);

    let classification = prober.classify(&address)?;
    let balance = prober.balance(&address)?;
    let sent = prober.has_sent_transactions(&address)?;

    if json {
        return print_json(&serde_json::json!({
            "address": address,
            "classification": classification,
            "balance_wei": balance.to_string(),
            "has_sent_transactions": sent,
        }));
    }
    println!("Classification: {:?}", classification);
    println!("Balance:        {} {}", format_ether(balance), network.symbol());
    println!("Sent txs:       {}", sent);
    Ok(())
}

/// Seed plus stealth keys when the search walks stealth addresses
type FindSecrets = (Seed, Option<StealthKeyMaterial>);

fn cmd_find_account(json: bool, args: FindAccountArgs) -> Result<()> {
    let network: Network = args.chain.network.parse()?;
    let role = AccountRole::from(args.role);
    let sleeper = ThreadSleeper;

    let read_secrets = || -> ShieldResult<FindSecrets> {
        let mut secrets = StdinSecrets::read()?;
        let seed = read_seed(&mut secrets, &args.seed)?;
        let keys = if args.stealth {
            Some(derive_stealth_keys(&seed, &secrets.pin()?)?)
        } else {
            None
        };
        Ok((seed, keys))
    };

    // Chain check online, secrets offline, search online again
    let (rpc, (seed, keys)) = if args.offline.allow_online {
        log_warn!("cli", "Reading secrets without an offline check");
        (connect(network, &args.chain)?, read_secrets()?)
    } else {
        let probe = args.offline.probe()?;
        let mut gate =
            NetworkGate::new(&probe, &sleeper, &StderrPrompt, DEFAULT_GATE_POLL_INTERVAL);
        gate.begin()?;
        let rpc = gate.initialize(|| connect(network, &args.chain))?;
        let secrets = gate.with_secrets(read_secrets)?;
        gate.resume_online()?;
        (rpc, secrets)
    };

    let explorer = EtherscanClient::new(&args.explorer.etherscan_api_key, network.chain_id())?;
    let prober = FreshnessProber::new(&rpc, &explorer, &args.explorer.shield_contract);
    let selector = AccountSelector::new(&prober, &sleeper).with_max_index(args.max_index);

    let strategy = match &keys {
        Some(keys) => DerivationStrategy::Stealth(keys),
        None => DerivationStrategy::Standard(&seed),
    };
    let selected = selector.find_account(strategy, role, args.start_index())?;

    let line = AccountLine::from(&selected.account);
    if json {
        return print_json(&serde_json::json!({
            "account": line,
            "classification": selected.classification,
            "skipped": selected.skipped,
        }));
    }
    println!("Account: {} ({:?})", line.account, selected.classification);
    println!("Address: {}", line.address);
    println!("Skipped: {}", selected.skipped);
    Ok(())
}

fn cmd_await_deposit(json: bool, args: AwaitDepositArgs) -> Result<()> {
    if args.interval == 0 {
        bail!("Poll interval must be non-zero");
    }
    let address = normalize_address(&args.address)?;
    let network: Network = args.chain.network.parse()?;
    let rpc = connect(network, &args.chain)?;
    install_shutdown_handler(|| eprintln!("Stopped waiting for deposit"))?;

    let sleeper = ThreadSleeper;
    let balance = DepositMonitor::new(&rpc, &sleeper, Duration::from_secs(args.interval))
        .await_deposit(&address)?;

    if json {
        return print_json(&serde_json::json!({
            "address": address,
            "balance_wei": balance.to_string(),
        }));
    }
    println!("Deposit received: {} {}", format_ether(balance), network.symbol());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find_account_args(extra: &[&str]) -> FindAccountArgs {
        let mut argv = vec![
            "ephemeral-shield",
            "find-account",
            "--rpc-url",
            "https://rpc.example",
            "--etherscan-api-key",
            "key",
            "--shield-contract",
            "0x00",
        ];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::FindAccount(args) => args,
            _ => panic!("expected find-account"),
        }
    }

    #[test]
    fn test_starting_nonce_only_shifts_stealth_search() {
        std::env::set_var("STARTING_NONCE", "9");

        assert_eq!(find_account_args(&[]).start_index(), 0);
        assert_eq!(find_account_args(&["--start", "4"]).start_index(), 4);
        assert_eq!(find_account_args(&["--stealth"]).start_index(), 9);
        assert_eq!(find_account_args(&["--stealth", "--start-nonce", "2"]).start_index(), 2);

        std::env::remove_var("STARTING_NONCE");
    }

    #[test]
    fn test_offline_args_default_to_gated() {
        let args = find_account_args(&[]);
        assert!(!args.offline.allow_online);
        assert!(args.offline.connectivity_endpoints.is_empty());
        assert_eq!(args.offline.connectivity_timeout, DEFAULT_PROBE_TIMEOUT.as_secs());
    }
}
