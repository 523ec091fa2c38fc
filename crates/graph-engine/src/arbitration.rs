//! Frontend arbitration
//!
//! While a frontend declares itself in control of devices, the engine keeps
//! computing but suppresses device commands. The claim decays: if heartbeats
//! stop for the timeout window the engine takes control back on its own, so a
//! crashed browser tab cannot leave the house unmanaged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct FrontendArbiter {
    active: AtomicBool,
    last_seen: Mutex<Instant>,
    timeout: Duration,
}

impl Default for FrontendArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrontendArbiter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            active: AtomicBool::new(false),
            last_seen: Mutex::new(Instant::now()),
            timeout,
        }
    }

    /// Frontend takes or releases control of device commands
    pub fn set_active(&self, active: bool) {
        self.touch();
        let previous = self.active.swap(active, Ordering::SeqCst);
        if previous != active {
            if active {
                tracing::info!("frontend took over device control");
            } else {
                tracing::info!("frontend released device control");
            }
        }
    }

    /// Keep an active claim alive; ignored when no claim is held
    pub fn heartbeat(&self) {
        if self.active.load(Ordering::SeqCst) {
            self.touch();
        }
    }

    /// Whether device commands should currently be suppressed.
    ///
    /// Expiry is evaluated here rather than on a timer: the first check after
    /// the heartbeat window lapses flips the flag back and logs the takeover.
    #[must_use]
    pub fn is_active(&self) -> bool {
        if !self.active.load(Ordering::SeqCst) {
            return false;
        }
        let expired = self
            .last_seen
            .lock()
            .map(|seen| seen.elapsed() > self.timeout)
            .unwrap_or(true);
        if expired {
            self.active.store(false, Ordering::SeqCst);
            tracing::warn!(
                timeout_secs = self.timeout.as_secs(),
                "frontend heartbeat timed out, resuming device control"
            );
            return false;
        }
        true
    }

    fn touch(&self) {
        if let Ok(mut seen) = self.last_seen.lock() {
            *seen = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn inactive_by_default() {
        let arbiter = FrontendArbiter::new();
        assert!(!arbiter.is_active());
    }

    #[test]
    fn claim_and_release() {
        let arbiter = FrontendArbiter::new();
        arbiter.set_active(true);
        assert!(arbiter.is_active());
        arbiter.set_active(false);
        assert!(!arbiter.is_active());
    }

    #[test]
    fn heartbeat_keeps_claim_alive() {
        let arbiter = FrontendArbiter::with_timeout(Duration::from_millis(200));
        arbiter.set_active(true);
        for _ in 0..4 {
            thread::sleep(Duration::from_millis(50));
            arbiter.heartbeat();
        }
        assert!(arbiter.is_active());
    }

    #[test]
    fn stale_claim_expires_on_check() {
        let arbiter = FrontendArbiter::with_timeout(Duration::from_millis(20));
        arbiter.set_active(true);
        thread::sleep(Duration::from_millis(80));
        assert!(!arbiter.is_active());
        // Expiry cleared the claim; later heartbeats do not revive it
        arbiter.heartbeat();
        assert!(!arbiter.is_active());
    }
}
