//! Session configuration
//!
//! Built by the CLI (flags or environment) and validated once before any
//! component sees it.

use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::amount::{AmountPolicy, DEFAULT_FEE_BUFFER_BPS, MIN_SHIELD_AMOUNT};
use crate::balances::DEFAULT_BALANCE_SETTLE;
use crate::error::{ShieldError, ShieldResult};
use crate::gate::{DEFAULT_GATE_POLL_INTERVAL, DEFAULT_PROBE_TIMEOUT};
use crate::monitor::{DEFAULT_DEPOSIT_POLL_INTERVAL, DEFAULT_RECEIPT_POLL_INTERVAL};
use crate::types::{Network, Wei};

const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1", "[::1]"];

/// Community proof-of-innocence aggregator
pub const DEFAULT_POI_ENDPOINTS: &[&str] = &["https://ppoi-agg.horsewithsixlegs.xyz"];

pub struct SessionConfig {
    pub network: Network,
    pub rpc_url: String,
    pub explorer_api_key: SecretString,
    pub db_password: SecretString,
    /// Load this shielded wallet instead of creating one from the seed
    pub wallet_id: Option<String>,
    pub stealth_pin: SecretString,
    pub starting_nonce: u64,
    pub deposit_poll_interval: Duration,
    pub receipt_poll_interval: Duration,
    pub connectivity_poll_interval: Duration,
    pub connectivity_timeout: Duration,
    pub balance_settle: Duration,
    /// Engine database and artifact cache live below this directory
    pub storage_dir: PathBuf,
    pub poi_endpoints: Vec<String>,
    pub fee_buffer_bps: u32,
    pub min_shield_amount: Wei,
    /// Give up account search past this index
    pub max_index: Option<u64>,
}

impl SessionConfig {
    /// Config with defaults for everything that has one
    pub fn new(
        network: Network,
        rpc_url: impl Into<String>,
        explorer_api_key: SecretString,
        db_password: SecretString,
        stealth_pin: SecretString,
        storage_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            network,
            rpc_url: rpc_url.into(),
            explorer_api_key,
            db_password,
            wallet_id: None,
            stealth_pin,
            starting_nonce: 0,
            deposit_poll_interval: DEFAULT_DEPOSIT_POLL_INTERVAL,
            receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
            connectivity_poll_interval: DEFAULT_GATE_POLL_INTERVAL,
            connectivity_timeout: DEFAULT_PROBE_TIMEOUT,
            balance_settle: DEFAULT_BALANCE_SETTLE,
            storage_dir: storage_dir.into(),
            poi_endpoints: DEFAULT_POI_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
            fee_buffer_bps: DEFAULT_FEE_BUFFER_BPS,
            min_shield_amount: MIN_SHIELD_AMOUNT,
            max_index: None,
        }
    }

    pub fn amount_policy(&self) -> AmountPolicy {
        AmountPolicy {
            min_amount: self.min_shield_amount,
            fee_buffer_bps: self.fee_buffer_bps,
        }
    }

    pub fn validate(&self) -> ShieldResult<()> {
        validate_rpc_url(&self.rpc_url)?;

        for (name, interval) in [
            ("deposit poll interval", self.deposit_poll_interval),
            ("receipt poll interval", self.receipt_poll_interval),
            ("connectivity poll interval", self.connectivity_poll_interval),
            ("connectivity timeout", self.connectivity_timeout),
        ] {
            if interval.is_zero() {
                return Err(ShieldError::config_error(format!("The {} must be non-zero", name)));
            }
        }

        if self.fee_buffer_bps > 10_000 {
            return Err(ShieldError::config_error("Fee buffer cannot exceed 10000 bps"));
        }

        for endpoint in &self.poi_endpoints {
            Url::parse(endpoint).map_err(|e| {
                ShieldError::config_error(format!("Invalid POI endpoint: {}", e))
            })?;
        }

        Ok(())
    }
}

/// RPC URLs must be https; plain http is accepted for a local node only
pub fn validate_rpc_url(raw: &str) -> ShieldResult<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ShieldError::config_error(format!("Invalid RPC URL: {}", e)))?;

    match url.scheme() {
        "https" => Ok(url),
        "http" => {
            let host = url.host_str().unwrap_or_default();
            if LOCAL_HOSTS.contains(&host) {
                Ok(url)
            } else {
                Err(ShieldError::config_error(
                    "RPC URL must use https (http is only allowed for localhost)",
                ))
            }
        }
        other => Err(ShieldError::config_error(format!(
            "Unsupported RPC URL scheme: {}",
            other
        ))),
    }
}
