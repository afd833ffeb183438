//! Ephemeral account selection
//!
//! Walks indices upward from a starting point, deriving and probing each
//! candidate until one fits the role. Disqualified candidates advance the
//! index by exactly one. Transient probe failures retry the same index
//! after a pause; anything else ends the search.

use std::time::Duration;

use crate::error::{ShieldError, ShieldResult};
use crate::probe::AddressProbe;
use crate::types::{AccountRole, AddressClassification};
use crate::utils::Sleeper;
use crate::wallet::{DerivationStrategy, EphemeralAccount};
use crate::{log_debug, log_info, log_warn};

/// Pause before re-probing after a transient failure
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(3);

/// An account the selector settled on
#[derive(Debug)]
pub struct SelectedAccount {
    pub account: EphemeralAccount,
    pub classification: AddressClassification,
    /// Candidates rejected before this one
    pub skipped: u64,
}

pub struct AccountSelector<'a> {
    probe: &'a dyn AddressProbe,
    sleeper: &'a dyn Sleeper,
    retry_interval: Duration,
    max_index: Option<u64>,
}

impl<'a> AccountSelector<'a> {
    pub fn new(probe: &'a dyn AddressProbe, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            probe,
            sleeper,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_index: None,
        }
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Stop with `SearchExhausted` past this index. Unbounded by default.
    pub fn with_max_index(mut self, max_index: Option<u64>) -> Self {
        self.max_index = max_index;
        self
    }

    pub fn find_account(
        &self,
        strategy: DerivationStrategy<'_>,
        role: AccountRole,
        start_index: u64,
    ) -> ShieldResult<SelectedAccount> {
        log_info!(
            "selector",
            "Searching for account",
            strategy = strategy.name(),
            role = role,
            start_index = start_index
        );

        let mut index = start_index;
        let mut skipped = 0u64;

        loop {
            if let Some(max) = self.max_index {
                if index > max {
                    return Err(ShieldError::search_exhausted(format!(
                        "No {} account found up to index {}",
                        role, max
                    )));
                }
            }

            let account = strategy.derive(role, index)?;

            match self.probe.classify_for(account.address(), role) {
                Ok(classification) if role.accepts(classification) => {
                    log_info!(
                        "selector",
                        "Account selected",
                        index = index,
                        address = account.address(),
                        skipped = skipped
                    );
                    return Ok(SelectedAccount {
                        account,
                        classification,
                        skipped,
                    });
                }
                Ok(classification) => {
                    log_debug!(
                        "selector",
                        "Candidate rejected",
                        index = index,
                        classification = format!("{:?}", classification)
                    );
                    skipped += 1;
                    index = index.checked_add(1).ok_or_else(|| {
                        ShieldError::search_exhausted("Index space exhausted")
                    })?;
                }
                Err(e) if e.is_transient() => {
                    log_warn!("selector", "Probe failed, retrying", index = index, error = e);
                    self.sleeper.sleep(self.retry_interval);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::utils::RecordingSleeper;
    use crate::wallet::{derive_standard, Seed};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    const TEST_PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    /// Reports `Unused` only for the listed addresses
    struct StubProbe {
        fresh: Vec<String>,
        shielded: Vec<String>,
        failures: Mutex<VecDeque<ShieldError>>,
        probed: Mutex<Vec<String>>,
    }

    impl StubProbe {
        fn new(fresh: Vec<String>) -> Self {
            Self {
                fresh,
                shielded: Vec::new(),
                failures: Mutex::new(VecDeque::new()),
                probed: Mutex::new(Vec::new()),
            }
        }

        fn probed(&self) -> Vec<String> {
            self.probed.lock().unwrap().clone()
        }
    }

    impl AddressProbe for StubProbe {
        fn classify_for(
            &self,
            address: &str,
            _role: AccountRole,
        ) -> ShieldResult<AddressClassification> {
            self.probed.lock().unwrap().push(address.to_string());
            if let Some(err) = self.failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            if self.shielded.iter().any(|a| a == address) {
                Ok(AddressClassification::AlreadyShielded)
            } else if self.fresh.iter().any(|a| a == address) {
                Ok(AddressClassification::Unused)
            } else {
                Ok(AddressClassification::FundedUnshielded)
            }
        }
    }

    fn addresses(seed: &Seed, account: u32, count: u32) -> Vec<String> {
        (0..count)
            .map(|i| derive_standard(seed, account, i).unwrap().address)
            .collect()
    }

    #[test]
    fn test_terminates_at_first_unused_index() {
        let seed = Seed::parse(TEST_PHRASE).unwrap();
        let addrs = addresses(&seed, 0, 10);
        let probe = StubProbe::new(vec![addrs[7].clone()]);
        let sleeper = RecordingSleeper::new();

        let selected = AccountSelector::new(&probe, &sleeper)
            .find_account(DerivationStrategy::Standard(&seed), AccountRole::Deposit, 0)
            .unwrap();

        assert_eq!(selected.account.index(), 7);
        assert_eq!(selected.account.address(), addrs[7]);
        assert_eq!(selected.skipped, 7);
        assert_eq!(probe.probed(), addrs[..8].to_vec());
        assert_eq!(sleeper.count(), 0);
    }

    #[test]
    fn test_start_index_is_honored() {
        let seed = Seed::parse(TEST_PHRASE).unwrap();
        let addrs = addresses(&seed, 0, 10);
        let probe = StubProbe::new(vec![addrs[2].clone(), addrs[6].clone()]);
        let sleeper = RecordingSleeper::new();

        let selected = AccountSelector::new(&probe, &sleeper)
            .find_account(DerivationStrategy::Standard(&seed), AccountRole::Deposit, 3)
            .unwrap();
        assert_eq!(selected.account.index(), 6);
        assert_eq!(probe.probed().len(), 4);
    }

    #[test]
    fn test_receive_role_uses_receive_account() {
        let seed = Seed::parse(TEST_PHRASE).unwrap();
        let receive_addrs = addresses(&seed, 1, 3);
        let probe = StubProbe::new(vec![receive_addrs[1].clone()]);
        let sleeper = RecordingSleeper::new();

        let selected = AccountSelector::new(&probe, &sleeper)
            .find_account(DerivationStrategy::Standard(&seed), AccountRole::Receive, 0)
            .unwrap();
        assert_eq!(selected.account.descriptor(), "m/44'/60'/1'/0/1");
    }

    #[test]
    fn test_transient_failure_retries_same_index() {
        let seed = Seed::parse(TEST_PHRASE).unwrap();
        let addrs = addresses(&seed, 0, 2);
        let probe = StubProbe::new(vec![addrs[0].clone()]);
        probe.failures.lock().unwrap().push_back(ShieldError::rpc_unavailable("timeout"));
        probe.failures.lock().unwrap().push_back(ShieldError::rpc_unavailable("timeout"));
        let sleeper = RecordingSleeper::new();

        let selected = AccountSelector::new(&probe, &sleeper)
            .with_retry_interval(Duration::from_secs(7))
            .find_account(DerivationStrategy::Standard(&seed), AccountRole::Deposit, 0)
            .unwrap();

        assert_eq!(selected.account.index(), 0);
        assert_eq!(probe.probed(), vec![addrs[0].clone(); 3]);
        assert_eq!(sleeper.calls(), vec![Duration::from_secs(7); 2]);
    }

    #[test]
    fn test_fatal_failure_stops_search() {
        let seed = Seed::parse(TEST_PHRASE).unwrap();
        let probe = StubProbe::new(Vec::new());
        probe.failures.lock().unwrap().push_back(ShieldError::config_error("bad key"));
        let sleeper = RecordingSleeper::new();

        let err = AccountSelector::new(&probe, &sleeper)
            .find_account(DerivationStrategy::Standard(&seed), AccountRole::Deposit, 0)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigError);
    }

    #[test]
    fn test_bound_reports_exhaustion() {
        let seed = Seed::parse(TEST_PHRASE).unwrap();
        let probe = StubProbe::new(Vec::new());
        let sleeper = RecordingSleeper::new();

        let err = AccountSelector::new(&probe, &sleeper)
            .with_max_index(Some(4))
            .find_account(DerivationStrategy::Standard(&seed), AccountRole::Deposit, 0)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SearchExhausted);
        assert_eq!(probe.probed().len(), 5);
    }

    #[test]
    fn test_auto_shield_skips_only_shielded() {
        let seed = Seed::parse(TEST_PHRASE).unwrap();
        let addrs = addresses(&seed, 0, 4);
        let mut probe = StubProbe::new(Vec::new());
        probe.shielded = addrs[..2].to_vec();
        let sleeper = RecordingSleeper::new();

        let selected = AccountSelector::new(&probe, &sleeper)
            .find_account(DerivationStrategy::Standard(&seed), AccountRole::AutoShield, 0)
            .unwrap();
        assert_eq!(selected.account.index(), 2);
        assert_eq!(selected.classification, AddressClassification::FundedUnshielded);

        let by_address: HashMap<_, _> =
            addrs.iter().enumerate().map(|(i, a)| (a.clone(), i)).collect();
        assert_eq!(by_address[selected.account.address()], 2);
    }
}
