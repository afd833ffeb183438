//! Local signing
//!
//! - EIP-191 `personal_sign`, used to derive stealth keys from a challenge
//!   message. Signatures are RFC 6979 deterministic, so the same key and
//!   message always produce the same `r` and `s`.
//! - EIP-1559 transaction signing for direct submission.
//!
//! Reference: https://eips.ethereum.org/EIPS/eip-191

use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Address, Bytes, Eip1559TransactionRequest, U256};
use ethers_signers::{LocalWallet, Signer, WalletError};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1, SecretKey};
use std::str::FromStr;

use crate::error::ShieldError;
use crate::types::UnsignedTransaction;
use crate::utils::{keccak256, public_key_to_address};

/// Ethereum message prefix for personal_sign
const ETH_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// Error types for local signing
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Address recovery failed: {0}")]
    RecoveryFailed(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error(transparent)]
    Wallet(#[from] WalletError),
}

pub type SigningResult<T> = Result<T, SigningError>;

impl From<SigningError> for ShieldError {
    fn from(e: SigningError) -> Self {
        match e {
            SigningError::InvalidTransaction(_) | SigningError::Wallet(_) => {
                ShieldError::submission_failed(e.to_string())
            }
            _ => ShieldError::crypto_error(e.to_string()),
        }
    }
}

/// Hash a message with the Ethereum personal sign prefix
pub fn personal_sign_hash(message: &[u8]) -> [u8; 32] {
    let prefix = format!("{}{}", ETH_MESSAGE_PREFIX, message.len());
    let mut data = Vec::with_capacity(prefix.len() + message.len());
    data.extend_from_slice(prefix.as_bytes());
    data.extend_from_slice(message);
    keccak256(&data)
}

/// Sign a message using Ethereum personal_sign
///
/// Returns the 65-byte `r || s || v` signature with `v = 27 + recovery id`.
pub fn personal_sign(message: &[u8], private_key: &[u8]) -> SigningResult<[u8; 65]> {
    if private_key.len() != 32 {
        return Err(SigningError::InvalidPrivateKey(format!(
            "Expected 32 bytes, got {}",
            private_key.len()
        )));
    }

    let secp = Secp256k1::new();
    let secret_key = SecretKey::from_slice(private_key)
        .map_err(|e| SigningError::InvalidPrivateKey(e.to_string()))?;

    let msg = Message::from_digest(personal_sign_hash(message));
    let sig = secp.sign_ecdsa_recoverable(&msg, &secret_key);
    let (recovery_id, sig_bytes) = sig.serialize_compact();

    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&sig_bytes);
    out[64] = 27 + recovery_id.to_i32() as u8;
    Ok(out)
}

/// Recover the signer's checksummed address from a personal_sign signature
pub fn recover_address(message: &[u8], signature: &[u8]) -> SigningResult<String> {
    if signature.len() != 65 {
        return Err(SigningError::InvalidSignature(format!(
            "Expected 65 bytes, got {}",
            signature.len()
        )));
    }

    let v = signature[64];
    let recovery_id = if v >= 27 { v - 27 } else { v };
    if recovery_id > 3 {
        return Err(SigningError::InvalidSignature(format!(
            "Invalid recovery id: {}",
            recovery_id
        )));
    }

    let secp = Secp256k1::new();
    let msg = Message::from_digest(personal_sign_hash(message));

    let rec_id = RecoveryId::from_i32(recovery_id as i32)
        .map_err(|e| SigningError::InvalidSignature(e.to_string()))?;
    let recoverable_sig = RecoverableSignature::from_compact(&signature[..64], rec_id)
        .map_err(|e| SigningError::InvalidSignature(e.to_string()))?;

    let public_key = secp
        .recover_ecdsa(&msg, &recoverable_sig)
        .map_err(|e| SigningError::RecoveryFailed(e.to_string()))?;

    Ok(public_key_to_address(&public_key))
}

/// Sign a populated transaction as EIP-1559 and return the raw `0x` hex
pub fn sign_eip1559_transaction(
    private_key: &[u8],
    tx: &UnsignedTransaction,
    nonce: u64,
    chain_id: u64,
) -> SigningResult<String> {
    let wallet = LocalWallet::from_bytes(private_key)?.with_chain_id(chain_id);

    let to = Address::from_str(&tx.to)
        .map_err(|e| SigningError::InvalidTransaction(format!("Bad recipient {}: {}", tx.to, e)))?;

    let request = Eip1559TransactionRequest::new()
        .from(wallet.address())
        .to(to)
        .value(U256::from(tx.value))
        .gas(tx.gas_limit)
        .max_fee_per_gas(U256::from(tx.max_fee_per_gas))
        .max_priority_fee_per_gas(U256::from(tx.max_priority_fee_per_gas))
        .nonce(nonce)
        .chain_id(chain_id)
        .data(Bytes::from(tx.data.clone()));

    let typed: TypedTransaction = request.into();
    let signature = wallet.sign_transaction_sync(&typed)?;
    let raw = typed.rlp_signed(&signature);

    Ok(format!("0x{}", hex::encode(raw.as_ref())))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn sample_tx() -> UnsignedTransaction {
        UnsignedTransaction {
            to: "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".to_string(),
            data: vec![0xde, 0xad, 0xbe, 0xef],
            value: 1_000_000_000_000_000,
            gas_limit: 21_000,
            max_fee_per_gas: 20_000_000_000,
            max_priority_fee_per_gas: 1_000_000_000,
        }
    }

    #[test]
    fn test_personal_sign_and_recover() {
        let private_key = hex::decode(TEST_PRIVATE_KEY).unwrap();
        let message = b"Hello, Ethereum!";

        let sig = personal_sign(message, &private_key).unwrap();
        assert!(sig[64] == 27 || sig[64] == 28);

        let recovered = recover_address(message, &sig).unwrap();
        assert_eq!(recovered, TEST_ADDRESS);
    }

    #[test]
    fn test_personal_sign_is_deterministic() {
        let private_key = hex::decode(TEST_PRIVATE_KEY).unwrap();
        let a = personal_sign(b"same message", &private_key).unwrap();
        let b = personal_sign(b"same message", &private_key).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unicode_message() {
        let private_key = hex::decode(TEST_PRIVATE_KEY).unwrap();
        let message = "Hello 世界".as_bytes();
        let sig = personal_sign(message, &private_key).unwrap();
        assert_eq!(recover_address(message, &sig).unwrap(), TEST_ADDRESS);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(personal_sign(b"test", &[0u8; 16]).is_err());
        assert!(recover_address(b"test", &[0u8; 64]).is_err());

        let mut bad_v = [0u8; 65];
        bad_v[64] = 40;
        assert!(recover_address(b"test", &bad_v).is_err());
    }

    #[test]
    fn test_sign_eip1559_transaction() {
        let private_key = hex::decode(TEST_PRIVATE_KEY).unwrap();
        let raw = sign_eip1559_transaction(&private_key, &sample_tx(), 0, 11155111).unwrap();
        assert!(raw.starts_with("0x02"));

        let again = sign_eip1559_transaction(&private_key, &sample_tx(), 0, 11155111).unwrap();
        assert_eq!(raw, again);

        let next_nonce = sign_eip1559_transaction(&private_key, &sample_tx(), 1, 11155111).unwrap();
        assert_ne!(raw, next_nonce);
    }

    #[test]
    fn test_sign_rejects_bad_recipient() {
        let private_key = hex::decode(TEST_PRIVATE_KEY).unwrap();
        let mut tx = sample_tx();
        tx.to = "not-an-address".to_string();
        let err = sign_eip1559_transaction(&private_key, &tx, 0, 1).unwrap_err();
        assert!(matches!(err, SigningError::InvalidTransaction(_)));
    }
}
