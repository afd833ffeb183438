//! Direct submission: sign locally, send raw

use crate::error::ShieldResult;
use crate::log_debug;
use crate::rpc::ChainRpc;
use crate::types::UnsignedTransaction;
use crate::wallet::signer::sign_eip1559_transaction;
use crate::wallet::EphemeralAccount;

/// Sign `tx` with the account's key at its current nonce and broadcast it
pub fn submit_direct(
    rpc: &dyn ChainRpc,
    account: &EphemeralAccount,
    tx: &UnsignedTransaction,
    chain_id: u64,
) -> ShieldResult<String> {
    let nonce = rpc.get_transaction_count(account.address())?;
    log_debug!("submit", "Signing transaction", nonce = nonce, chain_id = chain_id);

    let raw = sign_eip1559_transaction(account.private_key(), tx, nonce, chain_id)?;
    rpc.send_raw_transaction(&raw)
}
