//! Network-mode gate
//!
//! Forces a session through
//! `Uninitialized -> OnlineRequired -> OfflineRequired -> OnlineResumed -> Done`.
//! Engine start-up happens online, seed entry and key derivation happen
//! only while connectivity is verified absent, and funds move only after
//! connectivity is back.
//!
//! Probe failures are the steady state while the user toggles their
//! connection, so the wait loops have no exit other than reaching the
//! target state.

use reqwest::blocking::Client;
use std::fmt;
use std::time::Duration;

use crate::error::{ShieldError, ShieldResult};
use crate::utils::{create_client, HttpTimeouts, Sleeper};
use crate::{log_debug, log_info, log_warn};

pub const DEFAULT_PROBE_ENDPOINTS: [&str; 3] = [
    "https://www.cloudflare.com",
    "https://www.google.com",
    "https://1.1.1.1",
];
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_GATE_POLL_INTERVAL: Duration = Duration::from_secs(3);

// =============================================================================
// Connectivity Probe
// =============================================================================

pub trait ConnectivityProbe: Send + Sync {
    /// True when at least one well-known endpoint answers
    fn is_online(&self) -> bool;
}

/// HEAD requests to public endpoints, issued in parallel
pub struct HttpConnectivityProbe {
    client: Client,
    endpoints: Vec<String>,
}

impl HttpConnectivityProbe {
    pub fn new(timeout: Duration) -> ShieldResult<Self> {
        Self::with_endpoints(
            DEFAULT_PROBE_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
            timeout,
        )
    }

    pub fn with_endpoints(endpoints: Vec<String>, timeout: Duration) -> ShieldResult<Self> {
        if endpoints.is_empty() {
            return Err(ShieldError::config_error("At least one probe endpoint is required"));
        }
        Ok(Self {
            client: create_client(HttpTimeouts::probe(timeout))?,
            endpoints,
        })
    }
}

impl ConnectivityProbe for HttpConnectivityProbe {
    fn is_online(&self) -> bool {
        std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .endpoints
                .iter()
                .map(|endpoint| {
                    let client = &self.client;
                    // Any HTTP answer counts; DNS and connect errors mean unreachable
                    scope.spawn(move || client.head(endpoint.as_str()).send().is_ok())
                })
                .collect();

            handles
                .into_iter()
                .map(|h| h.join().unwrap_or(false))
                .fold(false, |any, ok| any || ok)
        })
    }
}

// =============================================================================
// Gate State Machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    Uninitialized,
    OnlineRequired,
    OfflineRequired,
    OnlineResumed,
    Done,
}

impl fmt::Display for GatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GatePhase::Uninitialized => "uninitialized",
            GatePhase::OnlineRequired => "online-required",
            GatePhase::OfflineRequired => "offline-required",
            GatePhase::OnlineResumed => "online-resumed",
            GatePhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Connectivity the gate is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityTarget {
    Online,
    Offline,
}

impl ConnectivityTarget {
    fn wants_online(&self) -> bool {
        matches!(self, ConnectivityTarget::Online)
    }
}

/// Tells the user what to do while the gate waits
pub trait GatePrompt {
    /// `attempt` starts at 1 for each wait
    fn waiting_for(&self, target: ConnectivityTarget, attempt: u64);
}

/// Prompt that only logs
pub struct LogPrompt;

impl GatePrompt for LogPrompt {
    fn waiting_for(&self, target: ConnectivityTarget, attempt: u64) {
        if attempt == 1 {
            log_info!("gate", "Waiting for connectivity change", target = format!("{:?}", target));
        }
    }
}

pub struct NetworkGate<'a> {
    probe: &'a dyn ConnectivityProbe,
    sleeper: &'a dyn Sleeper,
    prompt: &'a dyn GatePrompt,
    poll_interval: Duration,
    phase: GatePhase,
    secrets_derived: bool,
}

impl<'a> NetworkGate<'a> {
    pub fn new(
        probe: &'a dyn ConnectivityProbe,
        sleeper: &'a dyn Sleeper,
        prompt: &'a dyn GatePrompt,
        poll_interval: Duration,
    ) -> Self {
        Self {
            probe,
            sleeper,
            prompt,
            poll_interval,
            phase: GatePhase::Uninitialized,
            secrets_derived: false,
        }
    }

    pub fn phase(&self) -> GatePhase {
        self.phase
    }

    fn expect_phase(&self, expected: GatePhase, action: &str) -> ShieldResult<()> {
        if self.phase != expected {
            return Err(ShieldError::gate_violation(format!(
                "Cannot {} in phase {}",
                action, self.phase
            ))
            .with_details(format!("expected {}", expected)));
        }
        Ok(())
    }

    fn transition(&mut self, next: GatePhase) {
        log_info!("gate", "Phase change", phase = self.phase, next_phase = next);
        self.phase = next;
    }

    /// Poll until the probe reports `target`. Returns the number of probes.
    pub fn wait_for(&self, target: ConnectivityTarget) -> u64 {
        let mut attempt = 0u64;
        loop {
            attempt += 1;
            if self.probe.is_online() == target.wants_online() {
                log_debug!("gate", "Connectivity reached", attempts = attempt);
                return attempt;
            }
            self.prompt.waiting_for(target, attempt);
            self.sleeper.sleep(self.poll_interval);
        }
    }

    /// `Uninitialized -> OnlineRequired`, once connectivity is present
    pub fn begin(&mut self) -> ShieldResult<()> {
        self.expect_phase(GatePhase::Uninitialized, "begin")?;
        self.wait_for(ConnectivityTarget::Online);
        self.transition(GatePhase::OnlineRequired);
        Ok(())
    }

    /// Run the network-dependent start-up. Only success moves the gate to
    /// `OfflineRequired`; a failure leaves it in `OnlineRequired`.
    pub fn initialize<T>(&mut self, init: impl FnOnce() -> ShieldResult<T>) -> ShieldResult<T> {
        self.expect_phase(GatePhase::OnlineRequired, "initialize")?;
        match init() {
            Ok(value) => {
                self.transition(GatePhase::OfflineRequired);
                Ok(value)
            }
            Err(e) => {
                log_warn!("gate", "Online initialization failed", error = e);
                Err(e)
            }
        }
    }

    /// Compute secrets. Connectivity is re-verified absent immediately
    /// before `derive` runs.
    pub fn with_secrets<T>(&mut self, derive: impl FnOnce() -> ShieldResult<T>) -> ShieldResult<T> {
        self.expect_phase(GatePhase::OfflineRequired, "derive secrets")?;
        self.wait_for(ConnectivityTarget::Offline);

        let value = derive()?;
        self.secrets_derived = true;
        Ok(value)
    }

    /// `OfflineRequired -> OnlineResumed`, once secrets exist and
    /// connectivity is back
    pub fn resume_online(&mut self) -> ShieldResult<()> {
        self.expect_phase(GatePhase::OfflineRequired, "resume online")?;
        if !self.secrets_derived {
            return Err(ShieldError::gate_violation(
                "Cannot resume online before keys are derived",
            ));
        }
        self.wait_for(ConnectivityTarget::Online);
        self.transition(GatePhase::OnlineResumed);
        Ok(())
    }

    /// Guard for fund-moving operations
    pub fn require_online(&self) -> ShieldResult<()> {
        self.expect_phase(GatePhase::OnlineResumed, "move funds")
    }

    pub fn finish(&mut self) -> ShieldResult<()> {
        self.expect_phase(GatePhase::OnlineResumed, "finish")?;
        self.transition(GatePhase::Done);
        Ok(())
    }
}
