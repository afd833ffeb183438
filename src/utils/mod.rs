//! Utilities Module
//!
//! Common utilities used across the crate.

pub mod clock;
pub mod crypto;
mod http;
pub mod logging;
pub mod units;

pub use clock::*;
pub use crypto::*;
pub use http::*;
pub use units::*;
