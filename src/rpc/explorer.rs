//! Etherscan v2 multichain client

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ShieldError, ShieldResult};
use crate::log_debug;
use crate::rpc::BlockExplorer;
use crate::types::ExplorerTx;
use crate::utils::{create_client, is_retryable_status, HttpTimeouts};

pub const ETHERSCAN_V2_URL: &str = "https://api.etherscan.io/v2/api";

/// Only the first page is needed to spot an early shield transaction
const PAGE_SIZE: u32 = 10;

const NO_TRANSACTIONS: &str = "No transactions found";

#[derive(Deserialize)]
struct EtherscanResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Value,
}

#[derive(Deserialize)]
struct EtherscanTx {
    hash: String,
    from: String,
    #[serde(default)]
    to: String,
}

/// Parse a `txlist` response body
pub fn parse_txlist_response(body: &str) -> ShieldResult<Vec<ExplorerTx>> {
    let response: EtherscanResponse = serde_json::from_str(body)?;

    if response.status != "1" {
        let reason = response.result.as_str().unwrap_or_default().to_string();
        if response.message.starts_with(NO_TRANSACTIONS) || reason.starts_with(NO_TRANSACTIONS) {
            return Ok(Vec::new());
        }
        if reason.to_lowercase().contains("invalid api key") {
            return Err(ShieldError::config_error("Explorer rejected the API key"));
        }
        return Err(ShieldError::rpc_unavailable(format!(
            "Explorer error: {}",
            response.message
        ))
        .with_details(reason));
    }

    let txs: Vec<EtherscanTx> = serde_json::from_value(response.result)?;

    Ok(txs
        .into_iter()
        .map(|tx| ExplorerTx {
            hash: tx.hash,
            from: tx.from,
            to: if tx.to.is_empty() { None } else { Some(tx.to) },
        })
        .collect())
}

/// Explorer client bound to one chain
pub struct EtherscanClient {
    base_url: String,
    api_key: String,
    chain_id: u64,
    client: Client,
}

impl EtherscanClient {
    pub fn new(api_key: &str, chain_id: u64) -> ShieldResult<Self> {
        Self::with_base_url(ETHERSCAN_V2_URL, api_key, chain_id)
    }

    pub fn with_base_url(base_url: &str, api_key: &str, chain_id: u64) -> ShieldResult<Self> {
        url::Url::parse(base_url)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            chain_id,
            client: create_client(HttpTimeouts::default())?,
        })
    }

    fn txlist_url(&self, address: &str) -> String {
        format!(
            "{}?chainid={}&module=account&action=txlist&address={}&startblock=0&endblock=99999999&page=1&offset={}&sort=asc&apikey={}",
            self.base_url,
            self.chain_id,
            urlencoding::encode(address),
            PAGE_SIZE,
            urlencoding::encode(&self.api_key)
        )
    }
}

impl BlockExplorer for EtherscanClient {
    fn transactions(&self, address: &str) -> ShieldResult<Vec<ExplorerTx>> {
        log_debug!("explorer", "Fetching history", address = address, chain_id = self.chain_id);

        let response = self.client.get(self.txlist_url(address)).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(if is_retryable_status(status) {
                ShieldError::rpc_unavailable(format!("Explorer returned HTTP {}", status))
            } else {
                ShieldError::config_error(format!("Explorer rejected request with HTTP {}", status))
            });
        }

        let body = response.text()?;
        parse_txlist_response(&body)
    }
}
