//! Shield / transfer / unshield orchestration
//!
//! Every operation runs the same fixed sequence:
//!
//! 1. resolve a broadcaster (fee-abstracted submissions only)
//! 2. estimate gas with the engine
//! 3. compute the net amount
//! 4. generate the proof (transfer and unshield only)
//! 5. populate the final transaction
//! 6. submit, signed locally or through the broadcaster
//! 7. wait for confirmation
//!
//! Any step failing aborts the operation. Nothing is retried: a second
//! proof or submission attempt may have side effects a human has to look at.

mod submit;

pub use submit::submit_direct;

use std::time::Duration;

use crate::amount::{compute_net_amount, AmountPolicy};
use crate::engine::{BroadcasterInfo, BroadcasterNetwork, OperationRequest, ShieldingEngine};
use crate::error::{ShieldError, ShieldResult};
use crate::monitor::{wait_for_receipt, DEFAULT_RECEIPT_POLL_INTERVAL};
use crate::rpc::ChainRpc;
use crate::types::{Network, OperationKind, OperationReceipt, ShieldedWalletHandle, Wei};
use crate::utils::{format_ether, Sleeper};
use crate::wallet::EphemeralAccount;
use crate::{log_debug, log_info};

/// Who puts the transaction on chain
pub enum Submission<'a> {
    /// Signed by a public account that pays the gas itself
    Direct(&'a EphemeralAccount),
    /// Relayed; the fee comes out of the shielded balance
    Broadcaster,
}

impl Submission<'_> {
    fn is_broadcaster(&self) -> bool {
        matches!(self, Submission::Broadcaster)
    }
}

/// Receives proof-generation progress as a fraction in `[0, 1]`
pub trait ProofProgress {
    fn proof_progress(&self, kind: OperationKind, fraction: f64);
}

struct Silent;

impl ProofProgress for Silent {
    fn proof_progress(&self, _kind: OperationKind, _fraction: f64) {}
}

pub struct Orchestrator<'a> {
    engine: &'a dyn ShieldingEngine,
    broadcasters: &'a dyn BroadcasterNetwork,
    rpc: &'a dyn ChainRpc,
    sleeper: &'a dyn Sleeper,
    network: Network,
    token: String,
    policy: AmountPolicy,
    receipt_interval: Duration,
    progress: &'a dyn ProofProgress,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        engine: &'a dyn ShieldingEngine,
        broadcasters: &'a dyn BroadcasterNetwork,
        rpc: &'a dyn ChainRpc,
        sleeper: &'a dyn Sleeper,
        network: Network,
        token: &str,
    ) -> Self {
        Self {
            engine,
            broadcasters,
            rpc,
            sleeper,
            network,
            token: token.to_string(),
            policy: AmountPolicy::default(),
            receipt_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
            progress: &Silent,
        }
    }

    pub fn with_policy(mut self, policy: AmountPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_receipt_interval(mut self, interval: Duration) -> Self {
        self.receipt_interval = interval;
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn ProofProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Move the whole balance of a public account into the shielded pool.
    /// The account signs and pays gas; no proof is needed.
    pub fn shield(
        &self,
        wallet: &ShieldedWalletHandle,
        source: &EphemeralAccount,
        balance: Wei,
    ) -> ShieldResult<OperationReceipt> {
        self.run(
            OperationKind::Shield,
            wallet,
            &wallet.shielded_address,
            balance,
            Submission::Direct(source),
        )
    }

    /// Private transfer to another shielded address
    pub fn transfer(
        &self,
        wallet: &ShieldedWalletHandle,
        recipient: &str,
        amount: Wei,
        submission: Submission<'_>,
    ) -> ShieldResult<OperationReceipt> {
        if !recipient.starts_with("0zk") {
            return Err(ShieldError::invalid_address(
                "Transfer recipient must be a shielded 0zk address",
            ));
        }
        self.run(OperationKind::Transfer, wallet, recipient, amount, submission)
    }

    /// Withdraw to a public address
    pub fn unshield(
        &self,
        wallet: &ShieldedWalletHandle,
        destination: &str,
        amount: Wei,
        submission: Submission<'_>,
    ) -> ShieldResult<OperationReceipt> {
        let destination = crate::utils::normalize_address(destination)?;
        self.run(OperationKind::Unshield, wallet, &destination, amount, submission)
    }

    fn resolve_broadcaster(&self) -> ShieldResult<BroadcasterInfo> {
        self.broadcasters
            .find_best_broadcaster(self.network, &self.token)?
            .ok_or_else(|| {
                ShieldError::no_broadcaster(format!(
                    "No broadcaster accepts fees on {}",
                    self.network
                ))
            })
    }

    fn run(
        &self,
        kind: OperationKind,
        wallet: &ShieldedWalletHandle,
        recipient: &str,
        gross: Wei,
        submission: Submission<'_>,
    ) -> ShieldResult<OperationReceipt> {
        if kind == OperationKind::Shield && submission.is_broadcaster() {
            return Err(ShieldError::invalid_input("Shielding is always submitted directly"));
        }

        log_info!(
            "orchestrator",
            "Starting operation",
            kind = kind,
            amount_eth = format_ether(gross)
        );

        // (a)
        let broadcaster = match submission {
            Submission::Broadcaster => Some(self.resolve_broadcaster()?),
            Submission::Direct(_) => None,
        };

        // (b)
        let fees = self.rpc.get_fee_data()?;
        let mut request = OperationRequest {
            kind,
            network: self.network,
            wallet,
            token: self.token.clone(),
            amount: gross,
            recipient: recipient.to_string(),
            sender: match submission {
                Submission::Direct(account) => Some(account.address().to_string()),
                Submission::Broadcaster => None,
            },
            broadcaster: broadcaster.clone(),
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
        };
        let gas = self.engine.estimate_gas(&request)?;

        // (c)
        let pending = compute_net_amount(gross, gas, &fees, &self.policy)?;
        request.amount = pending.net_amount;
        log_info!(
            "orchestrator",
            "Net amount computed",
            gas_units = gas,
            gas_cost_eth = format_ether(pending.gas_cost),
            net_eth = format_ether(pending.net_amount)
        );

        // (d)
        if kind.requires_proof() {
            log_info!("orchestrator", "Generating proof", kind = kind);
            let on_progress = |fraction: f64| self.progress.proof_progress(kind, fraction);
            self.engine.generate_proof(&request, &on_progress)?;
        }

        // (e)
        let tx = self.engine.populate_transaction(&request)?;
        log_debug!("orchestrator", "Transaction populated", gas_limit = tx.gas_limit);

        // (f)
        let tx_hash = match (&submission, &broadcaster) {
            (Submission::Direct(account), _) => {
                submit_direct(self.rpc, account, &tx, self.network.chain_id())?
            }
            (Submission::Broadcaster, Some(info)) => {
                self.broadcasters.submit(&tx, info, fees.max_fee_per_gas)?
            }
            (Submission::Broadcaster, None) => {
                return Err(ShieldError::internal("Broadcaster was not resolved"))
            }
        };
        log_info!("orchestrator", "Transaction submitted", tx_hash = &tx_hash);

        // (g)
        let receipt = wait_for_receipt(self.rpc, self.sleeper, &tx_hash, self.receipt_interval)?;

        Ok(OperationReceipt {
            kind,
            tx_hash: receipt.tx_hash,
            net_amount: pending.net_amount,
            block_number: receipt.block_number,
            via_broadcaster: broadcaster.is_some(),
        })
    }
}
