//! Unified error types for the deposit/shield core
//!
//! Every component reports through `ShieldError`. The `ErrorCode` decides
//! how a caller reacts: polling loops retry transient codes, everything
//! else aborts the current operation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for all operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShieldError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ShieldError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors
    pub fn invalid_seed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidSeed, msg)
    }

    pub fn insufficient_balance(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InsufficientBalance, msg)
    }

    pub fn insufficient_for_gas(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InsufficientForGas, msg)
    }

    pub fn no_broadcaster(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NoBroadcasterAvailable, msg)
    }

    pub fn engine_init(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::EngineInitFailure, msg)
    }

    pub fn rpc_unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcUnavailable, msg)
    }

    pub fn proof_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProofGenerationFailure, msg)
    }

    pub fn submission_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SubmissionFailure, msg)
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, msg)
    }

    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidAddress, msg)
    }

    pub fn crypto_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::CryptoError, msg)
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, msg)
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, msg)
    }

    pub fn gate_violation(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::GateViolation, msg)
    }

    pub fn search_exhausted(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SearchExhausted, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }

    /// Transient errors are retried by the polling loops; everything
    /// else is surfaced to the caller.
    pub fn is_transient(&self) -> bool {
        self.code.is_transient()
    }
}

impl fmt::Display for ShieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for ShieldError {}

/// Error codes for categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Seed / input errors
    InvalidSeed,
    InvalidInput,
    InvalidAddress,

    // Amount errors (abort the operation, not the session)
    InsufficientBalance,
    InsufficientForGas,

    // External collaborators
    NoBroadcasterAvailable,
    EngineInitFailure,
    RpcUnavailable,
    ProofGenerationFailure,
    SubmissionFailure,

    // Local failures
    CryptoError,
    ParseError,
    ConfigError,
    GateViolation,
    SearchExhausted,
    Internal,
}

impl ErrorCode {
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorCode::RpcUnavailable)
    }

    /// Amount errors abort the current operation but keep the session alive.
    pub fn is_amount_error(&self) -> bool {
        matches!(
            self,
            ErrorCode::InsufficientBalance | ErrorCode::InsufficientForGas
        )
    }
}

/// Result type alias for all operations
pub type ShieldResult<T> = Result<T, ShieldError>;

// Conversions from common error types

impl From<serde_json::Error> for ShieldError {
    fn from(e: serde_json::Error) -> Self {
        ShieldError::new(ErrorCode::ParseError, e.to_string())
    }
}

impl From<hex::FromHexError> for ShieldError {
    fn from(e: hex::FromHexError) -> Self {
        ShieldError::new(ErrorCode::ParseError, format!("Hex error: {}", e))
    }
}

impl From<reqwest::Error> for ShieldError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ShieldError::rpc_unavailable("Request timed out")
        } else if e.is_connect() {
            ShieldError::rpc_unavailable("Connection failed")
        } else if e.is_decode() {
            ShieldError::parse_error(format!("Malformed response: {}", e))
        } else {
            ShieldError::rpc_unavailable(e.to_string())
        }
    }
}

impl From<url::ParseError> for ShieldError {
    fn from(e: url::ParseError) -> Self {
        ShieldError::config_error(format!("Invalid URL: {}", e))
    }
}

impl From<bitcoin::bip32::Error> for ShieldError {
    fn from(e: bitcoin::bip32::Error) -> Self {
        ShieldError::crypto_error(format!("BIP32 error: {}", e))
    }
}

impl From<bitcoin::secp256k1::Error> for ShieldError {
    fn from(e: bitcoin::secp256k1::Error) -> Self {
        ShieldError::crypto_error(format!("Secp256k1 error: {}", e))
    }
}

impl From<bip39::Error> for ShieldError {
    fn from(e: bip39::Error) -> Self {
        ShieldError::invalid_seed(format!("BIP39 error: {}", e))
    }
}

impl From<ethers_signers::WalletError> for ShieldError {
    fn from(e: ethers_signers::WalletError) -> Self {
        ShieldError::submission_failed(format!("Signing failed: {}", e))
    }
}
