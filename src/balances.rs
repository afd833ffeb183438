//! Shielded balance observer
//!
//! The engine reports balances through an asynchronous callback. The
//! observer is the single writer (the callback) with any number of
//! readers, owned by the session and injected where balances are needed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::engine::{BalanceBucket, BalanceCallback, BalanceEvent, ShieldingEngine};
use crate::error::ShieldResult;
use crate::types::{Network, ShieldedBalances, Wei};
use crate::utils::{format_ether, same_address, Sleeper};
use crate::{log_debug, log_info, log_warn};

pub const DEFAULT_BALANCE_SETTLE: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct BalanceObserver {
    token: String,
    state: RwLock<ShieldedBalances>,
    updates: AtomicU64,
}

impl BalanceObserver {
    /// Track balances of `token` (the wrapped base token)
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            state: RwLock::new(ShieldedBalances::default()),
            updates: AtomicU64::new(0),
        }
    }

    /// Apply one engine notification. Events totalling zero are ignored so
    /// a late empty event cannot wipe a known balance.
    pub fn on_event(&self, event: &BalanceEvent) {
        let total: Wei = event
            .token_amounts
            .iter()
            .filter(|t| same_address(&t.token, &self.token))
            .fold(0, |acc: Wei, t| acc.saturating_add(t.amount));

        if total == 0 {
            return;
        }

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        match event.bucket {
            BalanceBucket::Spendable => state.spendable = total,
            BalanceBucket::ShieldPending => state.shield_pending = total,
            BalanceBucket::Other => return,
        }
        self.updates.fetch_add(1, Ordering::SeqCst);

        log_debug!(
            "balances",
            "Balance update",
            bucket = format!("{:?}", event.bucket),
            amount_eth = format_ether(total)
        );
    }

    pub fn snapshot(&self) -> ShieldedBalances {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of applied updates
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::SeqCst)
    }

    /// Callback to register with the engine
    pub fn callback(self: &Arc<Self>) -> BalanceCallback {
        let observer = Arc::clone(self);
        Box::new(move |event| observer.on_event(event))
    }
}

/// Ask the engine to refresh, wait for the callback to settle, then read.
///
/// A transient refresh failure returns the last known balances; anything
/// else propagates.
pub fn scan_balances(
    engine: &dyn ShieldingEngine,
    observer: &BalanceObserver,
    sleeper: &dyn Sleeper,
    network: Network,
    wallet_id: &str,
    settle: Duration,
) -> ShieldResult<ShieldedBalances> {
    match engine.refresh_balances(network, &[wallet_id.to_string()]) {
        Ok(()) => sleeper.sleep(settle),
        Err(e) if e.is_transient() => {
            log_warn!("balances", "Refresh failed, using last known balances", error = e);
            return Ok(observer.snapshot());
        }
        Err(e) => return Err(e),
    }

    let balances = observer.snapshot();
    log_info!(
        "balances",
        "Shielded balances",
        spendable_eth = format_ether(balances.spendable),
        pending_eth = format_ether(balances.shield_pending)
    );
    Ok(balances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TokenAmount;

    const WETH: &str = "0xfFf9976782d46CC05630D1f6eBAb18b2324d6B14";

    fn event(bucket: BalanceBucket, amounts: &[(&str, Wei)]) -> BalanceEvent {
        BalanceEvent {
            network: Network::Sepolia,
            wallet_id: "wallet".to_string(),
            bucket,
            token_amounts: amounts
                .iter()
                .map(|(token, amount)| TokenAmount {
                    token: token.to_string(),
                    amount: *amount,
                })
                .collect(),
        }
    }

    #[test]
    fn test_buckets_are_tracked_separately() {
        let observer = BalanceObserver::new(WETH);
        observer.on_event(&event(BalanceBucket::Spendable, &[(WETH, 100)]));
        observer.on_event(&event(BalanceBucket::ShieldPending, &[(&WETH.to_lowercase(), 40)]));

        assert_eq!(
            observer.snapshot(),
            ShieldedBalances {
                spendable: 100,
                shield_pending: 40
            }
        );
        assert_eq!(observer.update_count(), 2);
    }

    #[test]
    fn test_zero_and_foreign_events_are_ignored() {
        let observer = BalanceObserver::new(WETH);
        observer.on_event(&event(BalanceBucket::Spendable, &[(WETH, 100)]));
        observer.on_event(&event(BalanceBucket::Spendable, &[(WETH, 0)]));
        observer.on_event(&event(
            BalanceBucket::Spendable,
            &[("0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238", 5)],
        ));
        observer.on_event(&event(BalanceBucket::Other, &[(WETH, 9)]));

        assert_eq!(observer.snapshot().spendable, 100);
        assert_eq!(observer.update_count(), 1);
    }

    #[test]
    fn test_callback_writes_through() {
        let observer = Arc::new(BalanceObserver::new(WETH));
        let callback = observer.callback();
        callback(&event(BalanceBucket::Spendable, &[(WETH, 7), (WETH, 3)]));
        assert_eq!(observer.snapshot().spendable, 10);
    }
}
