//! In-memory chain and explorer for unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::error::{ShieldError, ShieldResult};
use crate::rpc::{BlockExplorer, ChainRpc};
use crate::types::{ExplorerTx, FeeData, TxReceipt, Wei};

#[derive(Default)]
pub struct FakeChain {
    balances: Mutex<HashMap<String, Wei>>,
    balance_script: Mutex<VecDeque<ShieldResult<Wei>>>,
    nonces: Mutex<HashMap<String, u64>>,
    nonce_failures: Mutex<VecDeque<ShieldError>>,
    fee_data: Mutex<Option<FeeData>>,
    receipt_script: Mutex<VecDeque<Option<TxReceipt>>>,
    pub sent: Mutex<Vec<String>>,
    pub balance_calls: Mutex<u32>,
    pub receipt_calls: Mutex<u32>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, address: &str, balance: Wei) {
        self.balances.lock().unwrap().insert(address.to_lowercase(), balance);
    }

    pub fn set_nonce(&self, address: &str, nonce: u64) {
        self.nonces.lock().unwrap().insert(address.to_lowercase(), nonce);
    }

    /// Balance answers returned in order before falling back to the map
    pub fn script_balances(&self, answers: Vec<ShieldResult<Wei>>) {
        self.balance_script.lock().unwrap().extend(answers);
    }

    pub fn fail_nonce_once(&self, error: ShieldError) {
        self.nonce_failures.lock().unwrap().push_back(error);
    }

    pub fn set_fee_data(&self, fees: FeeData) {
        *self.fee_data.lock().unwrap() = Some(fees);
    }

    pub fn script_receipts(&self, receipts: Vec<Option<TxReceipt>>) {
        self.receipt_script.lock().unwrap().extend(receipts);
    }

    pub fn balance_calls(&self) -> u32 {
        *self.balance_calls.lock().unwrap()
    }
}

impl ChainRpc for FakeChain {
    fn get_balance(&self, address: &str) -> ShieldResult<Wei> {
        *self.balance_calls.lock().unwrap() += 1;
        if let Some(answer) = self.balance_script.lock().unwrap().pop_front() {
            return answer;
        }
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&address.to_lowercase())
            .copied()
            .unwrap_or(0))
    }

    fn get_transaction_count(&self, address: &str) -> ShieldResult<u64> {
        if let Some(err) = self.nonce_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self
            .nonces
            .lock()
            .unwrap()
            .get(&address.to_lowercase())
            .copied()
            .unwrap_or(0))
    }

    fn get_fee_data(&self) -> ShieldResult<FeeData> {
        Ok(self.fee_data.lock().unwrap().unwrap_or(FeeData::FALLBACK))
    }

    fn send_raw_transaction(&self, raw_tx: &str) -> ShieldResult<String> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(raw_tx.to_string());
        Ok(format!("0x{:064x}", sent.len()))
    }

    fn get_transaction_receipt(&self, tx_hash: &str) -> ShieldResult<Option<TxReceipt>> {
        *self.receipt_calls.lock().unwrap() += 1;
        if let Some(answer) = self.receipt_script.lock().unwrap().pop_front() {
            return Ok(answer);
        }
        Ok(Some(TxReceipt {
            tx_hash: tx_hash.to_string(),
            block_number: 100,
            success: true,
        }))
    }

    fn chain_id(&self) -> ShieldResult<u64> {
        Ok(11155111)
    }
}

#[derive(Default)]
pub struct FakeExplorer {
    history: Mutex<HashMap<String, Vec<ExplorerTx>>>,
    failures: Mutex<VecDeque<ShieldError>>,
    pub calls: Mutex<u32>,
}

impl FakeExplorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tx(&self, from: &str, to: &str) {
        let mut history = self.history.lock().unwrap();
        let entry = history.entry(from.to_lowercase()).or_default();
        let hash = format!("0x{:064x}", entry.len() + 1);
        entry.push(ExplorerTx {
            hash,
            from: from.to_string(),
            to: Some(to.to_string()),
        });
    }

    pub fn fail_once(&self, error: ShieldError) {
        self.failures.lock().unwrap().push_back(error);
    }
}

impl BlockExplorer for FakeExplorer {
    fn transactions(&self, address: &str) -> ShieldResult<Vec<ExplorerTx>> {
        *self.calls.lock().unwrap() += 1;
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self
            .history
            .lock()
            .unwrap()
            .get(&address.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }
}
