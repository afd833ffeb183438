//! Ephemeral Shield Core Library
//!
//! Moves funds into a privacy pool through single-use public accounts so
//! that the long-lived wallet never appears on chain next to a shield
//! transaction.
//!
//! # Architecture
//!
//! This crate provides:
//! - **wallet**: Seed validation, standard and stealth account derivation, signing
//! - **probe** / **selector**: Freshness checks and ephemeral account selection
//! - **monitor**: Deposit and receipt polling
//! - **gate**: Online / offline sequencing around secret derivation
//! - **amount**: Net transfer amount after gas and buffer
//! - **orchestrator**: Shield, private transfer and unshield pipelines
//! - **engine**: Contracts for the external Shielding Engine and Broadcaster Network
//! - **rpc**: JSON-RPC node and block explorer clients
//! - **session**: End-to-end flows wiring all of the above
//!
//! # Security
//!
//! Seeds, derived private keys and the shielded-wallet key are held in
//! `zeroize` containers and cleared on drop. PINs and passwords are
//! `secrecy::SecretString`. Log fields are redacted by key name.
//!
//! # Example
//!
//! ```rust,ignore
//! use ephemeral_shield::wallet::{DerivationStrategy, Seed};
//! use ephemeral_shield::AccountRole;
//!
//! let seed = Seed::parse(phrase)?;
//! let account = DerivationStrategy::Standard(&seed).derive(AccountRole::Deposit, 0)?;
//! println!("Deposit to {}", account.address());
//! ```

pub mod amount;
pub mod balances;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod monitor;
pub mod orchestrator;
pub mod probe;
pub mod rpc;
pub mod selector;
pub mod session;
pub mod types;
pub mod utils;
pub mod wallet;

pub use error::{ErrorCode, ShieldError, ShieldResult};
pub use types::*;

pub use amount::{compute_net_amount, AmountPolicy, PendingTransfer};
pub use balances::{scan_balances, BalanceObserver};
pub use config::SessionConfig;
pub use gate::{GatePhase, NetworkGate};
pub use monitor::{wait_for_receipt, DepositMonitor};
pub use orchestrator::{Orchestrator, ProofProgress, Submission};
pub use probe::{AddressProbe, FreshnessProber};
pub use selector::{AccountSelector, SelectedAccount};
pub use session::{DerivationMode, Session, SessionServices, ShieldOutcome};
