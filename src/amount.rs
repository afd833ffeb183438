//! Transfer amount calculation
//!
//! `net = gross - gas_cost - buffer`, with `gas_cost = gas * max_fee` and
//! `buffer = gas_cost * bps / 10_000`. All arithmetic is checked integer
//! wei; there is no floating point anywhere in the path.

use serde::Serialize;

use crate::error::{ShieldError, ShieldResult};
use crate::types::{FeeData, Wei};
use crate::utils::format_ether;

/// Smallest gross amount worth moving (0.01 ETH)
pub const MIN_SHIELD_AMOUNT: Wei = 10_000_000_000_000_000;

/// One fifth of the gas cost
pub const DEFAULT_FEE_BUFFER_BPS: u32 = 2_000;

const BPS_DENOMINATOR: Wei = 10_000;

/// Thresholds the calculator enforces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountPolicy {
    pub min_amount: Wei,
    pub fee_buffer_bps: u32,
}

impl Default for AmountPolicy {
    fn default() -> Self {
        Self {
            min_amount: MIN_SHIELD_AMOUNT,
            fee_buffer_bps: DEFAULT_FEE_BUFFER_BPS,
        }
    }
}

/// Result of one calculation, consumed immediately by an orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingTransfer {
    pub gross_amount: Wei,
    pub gas_estimate: u64,
    pub max_fee_per_gas: Wei,
    pub gas_cost: Wei,
    pub fee_buffer_bps: u32,
    pub buffer: Wei,
    pub net_amount: Wei,
}

/// Compute the transferable amount.
///
/// Fails with `InsufficientBalance` below the policy minimum (checked
/// first, independent of gas) and with `InsufficientForGas` when gas plus
/// buffer eats the whole amount.
pub fn compute_net_amount(
    gross_amount: Wei,
    gas_estimate: u64,
    fees: &FeeData,
    policy: &AmountPolicy,
) -> ShieldResult<PendingTransfer> {
    if Wei::from(policy.fee_buffer_bps) > BPS_DENOMINATOR {
        return Err(ShieldError::invalid_input(format!(
            "Fee buffer of {} bps exceeds 100%",
            policy.fee_buffer_bps
        )));
    }

    if gross_amount < policy.min_amount {
        return Err(ShieldError::insufficient_balance(format!(
            "Balance {} is below the minimum of {}",
            format_ether(gross_amount),
            format_ether(policy.min_amount)
        )));
    }

    let overflow = || ShieldError::invalid_input("Gas parameters overflow");

    let gas_cost = Wei::from(gas_estimate)
        .checked_mul(fees.max_fee_per_gas)
        .ok_or_else(overflow)?;
    let buffer = gas_cost
        .checked_mul(Wei::from(policy.fee_buffer_bps))
        .ok_or_else(overflow)?
        / BPS_DENOMINATOR;
    let total_cost = gas_cost.checked_add(buffer).ok_or_else(overflow)?;

    if total_cost >= gross_amount {
        return Err(ShieldError::insufficient_for_gas(format!(
            "Balance {} does not cover gas and buffer of {}",
            format_ether(gross_amount),
            format_ether(total_cost)
        ))
        .with_details(format!(
            "gas {} x max fee {} wei + {} bps",
            gas_estimate, fees.max_fee_per_gas, policy.fee_buffer_bps
        )));
    }

    Ok(PendingTransfer {
        gross_amount,
        gas_estimate,
        max_fee_per_gas: fees.max_fee_per_gas,
        gas_cost,
        fee_buffer_bps: policy.fee_buffer_bps,
        buffer,
        net_amount: gross_amount - total_cost,
    })
}
