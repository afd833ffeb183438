//! Chain access
//!
//! Two narrow traits sit between the core logic and the outside world:
//! [`ChainRpc`] for node queries and submission, [`BlockExplorer`] for
//! address history. The prober, monitor and orchestrators only see the
//! traits, so tests drive them with in-memory fakes.

mod explorer;
mod json_rpc;

#[cfg(test)]
pub(crate) mod fakes;

pub use explorer::{parse_txlist_response, EtherscanClient, ETHERSCAN_V2_URL};
pub use json_rpc::{parse_fee_data, parse_receipt, JsonRpcClient};

use std::sync::Arc;

use crate::error::ShieldResult;
use crate::types::{ExplorerTx, FeeData, TxReceipt, Wei};

/// Node-level queries and submission
pub trait ChainRpc: Send + Sync {
    fn get_balance(&self, address: &str) -> ShieldResult<Wei>;

    /// Number of transactions sent from the address
    fn get_transaction_count(&self, address: &str) -> ShieldResult<u64>;

    fn get_fee_data(&self) -> ShieldResult<FeeData>;

    /// Broadcast a signed raw transaction and return its hash
    fn send_raw_transaction(&self, raw_tx: &str) -> ShieldResult<String>;

    /// `None` while the transaction is still pending
    fn get_transaction_receipt(&self, tx_hash: &str) -> ShieldResult<Option<TxReceipt>>;

    fn chain_id(&self) -> ShieldResult<u64>;
}

/// Address history lookups
pub trait BlockExplorer: Send + Sync {
    /// Oldest-first transactions touching the address
    fn transactions(&self, address: &str) -> ShieldResult<Vec<ExplorerTx>>;
}

impl<T: ChainRpc + ?Sized> ChainRpc for Arc<T> {
    fn get_balance(&self, address: &str) -> ShieldResult<Wei> {
        (**self).get_balance(address)
    }

    fn get_transaction_count(&self, address: &str) -> ShieldResult<u64> {
        (**self).get_transaction_count(address)
    }

    fn get_fee_data(&self) -> ShieldResult<FeeData> {
        (**self).get_fee_data()
    }

    fn send_raw_transaction(&self, raw_tx: &str) -> ShieldResult<String> {
        (**self).send_raw_transaction(raw_tx)
    }

    fn get_transaction_receipt(&self, tx_hash: &str) -> ShieldResult<Option<TxReceipt>> {
        (**self).get_transaction_receipt(tx_hash)
    }

    fn chain_id(&self) -> ShieldResult<u64> {
        (**self).chain_id()
    }
}

impl<T: BlockExplorer + ?Sized> BlockExplorer for Arc<T> {
    fn transactions(&self, address: &str) -> ShieldResult<Vec<ExplorerTx>> {
        (**self).transactions(address)
    }
}
