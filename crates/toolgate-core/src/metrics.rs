//! Global atomic counters for toolgate.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Monotonic counters. No allocation, no locking.
pub struct Metrics {
    tool_calls: AtomicU64,
    tool_failures: AtomicU64,
    hash_mismatches: AtomicU64,
    session_faults: AtomicU64,
    credential_requests: AtomicU64,
    truncations: AtomicU64,
    policy_sync_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            tool_calls: AtomicU64::new(0),
            tool_failures: AtomicU64::new(0),
            hash_mismatches: AtomicU64::new(0),
            session_faults: AtomicU64::new(0),
            credential_requests: AtomicU64::new(0),
            truncations: AtomicU64::new(0),
            policy_sync_failures: AtomicU64::new(0),
        }
    }

    fn bump(counter: &AtomicU64, name: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = name, "counter incremented");
    }

    pub fn inc_tool_calls(&self) {
        Self::bump(&self.tool_calls, "tool_calls");
    }

    pub fn inc_tool_failures(&self) {
        Self::bump(&self.tool_failures, "tool_failures");
    }

    pub fn inc_hash_mismatches(&self) {
        Self::bump(&self.hash_mismatches, "hash_mismatches");
    }

    pub fn inc_session_faults(&self) {
        Self::bump(&self.session_faults, "session_faults");
    }

    pub fn inc_credential_requests(&self) {
        Self::bump(&self.credential_requests, "credential_requests");
    }

    pub fn inc_truncations(&self) {
        Self::bump(&self.truncations, "truncations");
    }

    pub fn inc_policy_sync_failures(&self) {
        Self::bump(&self.policy_sync_failures, "policy_sync_failures");
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a run, CLI exit) rather than
    /// on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            tool_calls = self.tool_calls(),
            tool_failures = self.tool_failures(),
            hash_mismatches = self.hash_mismatches(),
            session_faults = self.session_faults(),
            credential_requests = self.credential_requests(),
            truncations = self.truncations(),
            policy_sync_failures = self.policy_sync_failures(),
        );
    }

    pub fn tool_calls(&self) -> u64 {
        self.tool_calls.load(Ordering::Relaxed)
    }

    pub fn tool_failures(&self) -> u64 {
        self.tool_failures.load(Ordering::Relaxed)
    }

    pub fn hash_mismatches(&self) -> u64 {
        self.hash_mismatches.load(Ordering::Relaxed)
    }

    pub fn session_faults(&self) -> u64 {
        self.session_faults.load(Ordering::Relaxed)
    }

    pub fn credential_requests(&self) -> u64 {
        self.credential_requests.load(Ordering::Relaxed)
    }

    pub fn truncations(&self) -> u64 {
        self.truncations.load(Ordering::Relaxed)
    }

    pub fn policy_sync_failures(&self) -> u64 {
        self.policy_sync_failures.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.tool_calls,
            &self.tool_failures,
            &self.hash_mismatches,
            &self.session_faults,
            &self.credential_requests,
            &self.truncations,
            &self.policy_sync_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        assert_eq!(m.tool_calls(), 0);
        m.inc_tool_calls();
        m.inc_tool_calls();
        assert_eq!(m.tool_calls(), 2);

        m.inc_hash_mismatches();
        assert_eq!(m.hash_mismatches(), 1);

        m.inc_session_faults();
        m.inc_truncations();
        m.inc_truncations();
        assert_eq!(m.session_faults(), 1);
        assert_eq!(m.truncations(), 2);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_tool_calls();
        m.inc_tool_failures();
        m.inc_credential_requests();
        m.inc_policy_sync_failures();
        m.reset();
        assert_eq!(m.tool_calls(), 0);
        assert_eq!(m.tool_failures(), 0);
        assert_eq!(m.credential_requests(), 0);
        assert_eq!(m.policy_sync_failures(), 0);
    }
}
