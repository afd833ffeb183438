//! Deposit and confirmation polling
//!
//! Both loops sleep first, then query. They have no timeout: the only way
//! out besides success is a non-transient error or process termination.

use std::time::Duration;

use crate::error::{ShieldError, ShieldResult};
use crate::rpc::ChainRpc;
use crate::types::{TxReceipt, Wei};
use crate::utils::{format_ether, normalize_address, Sleeper};
use crate::{log_debug, log_info, log_warn};

pub const DEFAULT_DEPOSIT_POLL_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(4);

/// Waits for funds to land on an address
pub struct DepositMonitor<'a> {
    rpc: &'a dyn ChainRpc,
    sleeper: &'a dyn Sleeper,
    poll_interval: Duration,
}

impl<'a> DepositMonitor<'a> {
    pub fn new(rpc: &'a dyn ChainRpc, sleeper: &'a dyn Sleeper, poll_interval: Duration) -> Self {
        Self {
            rpc,
            sleeper,
            poll_interval,
        }
    }

    /// Block until the balance is strictly positive and return it.
    /// A malformed address fails before the first poll.
    pub fn await_deposit(&self, address: &str) -> ShieldResult<Wei> {
        let address = normalize_address(address)?;
        log_info!(
            "monitor",
            "Waiting for deposit",
            address = address,
            interval_secs = self.poll_interval.as_secs()
        );

        let mut polls = 0u64;
        loop {
            self.sleeper.sleep(self.poll_interval);
            polls += 1;

            match self.rpc.get_balance(&address) {
                Ok(balance) if balance > 0 => {
                    log_info!(
                        "monitor",
                        "Deposit detected",
                        amount_eth = format_ether(balance),
                        polls = polls
                    );
                    return Ok(balance);
                }
                Ok(_) => log_debug!("monitor", "No deposit yet", polls = polls),
                Err(e) if e.is_transient() => {
                    log_warn!("monitor", "Balance query failed", polls = polls, error = e)
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Poll until a receipt appears. A reverted receipt is a `SubmissionFailure`.
pub fn wait_for_receipt(
    rpc: &dyn ChainRpc,
    sleeper: &dyn Sleeper,
    tx_hash: &str,
    interval: Duration,
) -> ShieldResult<TxReceipt> {
    log_info!("monitor", "Waiting for confirmation", tx_hash = tx_hash);

    loop {
        match rpc.get_transaction_receipt(tx_hash) {
            Ok(Some(receipt)) if receipt.success => {
                log_info!(
                    "monitor",
                    "Transaction confirmed",
                    tx_hash = tx_hash,
                    block = receipt.block_number
                );
                return Ok(receipt);
            }
            Ok(Some(receipt)) => {
                return Err(ShieldError::submission_failed("Transaction reverted")
                    .with_details(format!("{} in block {}", tx_hash, receipt.block_number)));
            }
            Ok(None) => {}
            Err(e) if e.is_transient() => {
                log_warn!("monitor", "Receipt query failed", error = e)
            }
            Err(e) => return Err(e),
        }

        sleeper.sleep(interval);
    }
}
