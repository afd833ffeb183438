//! Blocking JSON-RPC client

use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{ShieldError, ShieldResult};
use crate::log_debug;
use crate::rpc::ChainRpc;
use crate::types::{FeeData, TxReceipt, Wei};
use crate::utils::{
    create_client, extract_domain, is_retryable_status, parse_hex_quantity, HttpTimeouts,
};

/// How a single call failed
enum CallFailure {
    /// Transport, HTTP or payload problem
    Transport(ShieldError),
    /// The node answered with a JSON-RPC error object
    Node { code: i64, message: String },
}

/// JSON-RPC 2.0 codes for a request the node will never accept
const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

impl CallFailure {
    /// Malformed requests are fatal. Anything else the node reports
    /// (overload, missing state, internal errors) is worth retrying.
    fn into_rpc_error(self, method: &str) -> ShieldError {
        match self {
            CallFailure::Transport(e) => e,
            CallFailure::Node { code, message } => {
                let details = format!("code {}: {}", code, message);
                match code {
                    INVALID_REQUEST | INVALID_PARAMS => {
                        ShieldError::invalid_input(format!("{} rejected its parameters", method))
                            .with_details(details)
                    }
                    METHOD_NOT_FOUND => {
                        ShieldError::config_error(format!("Node does not support {}", method))
                            .with_details(details)
                    }
                    PARSE_ERROR => {
                        ShieldError::parse_error(format!("{} request was not parsed", method))
                            .with_details(details)
                    }
                    _ => ShieldError::rpc_unavailable(format!("{} failed", method))
                        .with_details(details),
                }
            }
        }
    }
}

/// Split a JSON-RPC response body into its result or its error object
fn response_result(method: &str, body: &Value) -> Result<Value, CallFailure> {
    if let Some(error) = body.get("error") {
        return Err(CallFailure::Node {
            code: error["code"].as_i64().unwrap_or(0),
            message: error["message"].as_str().unwrap_or("unknown error").to_string(),
        });
    }

    body.get("result").cloned().ok_or_else(|| {
        CallFailure::Transport(ShieldError::parse_error(format!(
            "{} response has no result",
            method
        )))
    })
}

/// JSON-RPC client for a single node endpoint
pub struct JsonRpcClient {
    url: String,
    client: Client,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(rpc_url: &str) -> ShieldResult<Self> {
        Self::with_timeouts(rpc_url, HttpTimeouts::default())
    }

    pub fn with_timeouts(rpc_url: &str, timeouts: HttpTimeouts) -> ShieldResult<Self> {
        let parsed = url::Url::parse(rpc_url)?;
        Ok(Self {
            url: parsed.to_string(),
            client: create_client(timeouts)?,
            next_id: AtomicU64::new(1),
        })
    }

    fn call_raw(&self, method: &str, params: Value) -> Result<Value, CallFailure> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id
        });

        log_debug!("rpc", "Calling node", method = method, host = extract_domain(&self.url));

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .map_err(|e| CallFailure::Transport(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            let err = if is_retryable_status(status) {
                ShieldError::rpc_unavailable(format!("Node returned HTTP {}", status))
            } else {
                ShieldError::config_error(format!("Node rejected request with HTTP {}", status))
            };
            return Err(CallFailure::Transport(err));
        }

        let body: Value = response.json().map_err(|e| CallFailure::Transport(e.into()))?;
        response_result(method, &body)
    }

    fn call(&self, method: &str, params: Value) -> ShieldResult<Value> {
        self.call_raw(method, params).map_err(|f| f.into_rpc_error(method))
    }

    fn call_quantity(&self, method: &str, params: Value) -> ShieldResult<Wei> {
        let result = self.call(method, params)?;
        let hex = result
            .as_str()
            .ok_or_else(|| ShieldError::parse_error(format!("{} returned a non-string", method)))?;
        parse_hex_quantity(hex)
    }
}

fn quantity_to_u64(value: Wei, what: &str) -> ShieldResult<u64> {
    u64::try_from(value)
        .map_err(|_| ShieldError::parse_error(format!("{} does not fit in u64", what)))
}

/// Build fee data from the latest block and the node's priority fee.
///
/// `maxFeePerGas = 2 * baseFee + priority`. Without a base fee the
/// fallback values are used.
pub fn parse_fee_data(latest_block: &Value, priority_fee: Option<Wei>) -> ShieldResult<FeeData> {
    let priority = priority_fee.unwrap_or(FeeData::FALLBACK.max_priority_fee_per_gas);

    let base_fee = match latest_block.get("baseFeePerGas").and_then(Value::as_str) {
        Some(hex) => parse_hex_quantity(hex)?,
        None => return Ok(FeeData::FALLBACK),
    };

    let max_fee = base_fee
        .checked_mul(2)
        .and_then(|v| v.checked_add(priority))
        .ok_or_else(|| ShieldError::parse_error("Fee data overflow"))?;

    Ok(FeeData {
        max_fee_per_gas: max_fee,
        max_priority_fee_per_gas: priority,
    })
}

/// Parse an `eth_getTransactionReceipt` result (`null` while pending)
pub fn parse_receipt(result: &Value) -> ShieldResult<Option<TxReceipt>> {
    if result.is_null() {
        return Ok(None);
    }

    let field = |name: &str| {
        result
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| ShieldError::parse_error(format!("Receipt is missing {}", name)))
    };

    let tx_hash = field("transactionHash")?.to_string();
    let block_number = quantity_to_u64(parse_hex_quantity(field("blockNumber")?)?, "blockNumber")?;
    let success = parse_hex_quantity(field("status")?)? == 1;

    Ok(Some(TxReceipt {
        tx_hash,
        block_number,
        success,
    }))
}

impl ChainRpc for JsonRpcClient {
    fn get_balance(&self, address: &str) -> ShieldResult<Wei> {
        self.call_quantity("eth_getBalance", json!([address, "latest"]))
    }

    fn get_transaction_count(&self, address: &str) -> ShieldResult<u64> {
        let count = self.call_quantity("eth_getTransactionCount", json!([address, "latest"]))?;
        quantity_to_u64(count, "transaction count")
    }

    fn get_fee_data(&self) -> ShieldResult<FeeData> {
        let block = self.call("eth_getBlockByNumber", json!(["latest", false]))?;

        // Not every node implements eth_maxPriorityFeePerGas
        let priority = match self.call_raw("eth_maxPriorityFeePerGas", json!([])) {
            Ok(value) => {
                let hex = value.as_str().ok_or_else(|| {
                    ShieldError::parse_error("eth_maxPriorityFeePerGas returned a non-string")
                })?;
                Some(parse_hex_quantity(hex)?)
            }
            Err(CallFailure::Node { .. }) => None,
            Err(CallFailure::Transport(e)) => return Err(e),
        };

        parse_fee_data(&block, priority)
    }

    fn send_raw_transaction(&self, raw_tx: &str) -> ShieldResult<String> {
        // Never retried: a rejected submission needs human inspection
        let result = self
            .call_raw("eth_sendRawTransaction", json!([raw_tx]))
            .map_err(|failure| match failure {
                CallFailure::Transport(e) => ShieldError::submission_failed("Broadcast failed")
                    .with_details(e.to_string()),
                CallFailure::Node { code, message } => {
                    ShieldError::submission_failed("Node rejected transaction")
                        .with_details(format!("code {}: {}", code, message))
                }
            })?;

        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ShieldError::parse_error("eth_sendRawTransaction returned a non-string"))
    }

    fn get_transaction_receipt(&self, tx_hash: &str) -> ShieldResult<Option<TxReceipt>> {
        let result = self.call("eth_getTransactionReceipt", json!([tx_hash]))?;
        parse_receipt(&result)
    }

    fn chain_id(&self) -> ShieldResult<u64> {
        let id = self.call_quantity("eth_chainId", json!([]))?;
        quantity_to_u64(id, "chain id")
    }
}
