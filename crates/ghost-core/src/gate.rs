//! Single-session admission gate.
//!
//! The editor process is attended by the user at the terminal, so only one
//! session may own it at a time. [`AdmissionGate`] is a cheaply clonable
//! handle to one shared `active` flag: every clone observes the same state.
//! Construct exactly one per server and pass it to whoever needs it.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// Shared single-slot guard answering "is a session active".
#[derive(Clone, Default)]
pub struct AdmissionGate {
    active: Arc<RwLock<bool>>,
}

impl AdmissionGate {
    /// Create an inactive gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to mark the gate active.
    ///
    /// Returns `false` without blocking when a session already holds it.
    pub fn claim(&self) -> bool {
        let mut active = self.active.write();
        if *active {
            return false;
        }
        *active = true;
        true
    }

    /// Mark the gate inactive. Releasing an inactive gate is a no-op.
    pub fn release(&self) {
        *self.active.write() = false;
    }

    /// Whether a session currently holds the gate.
    pub fn is_active(&self) -> bool {
        *self.active.read()
    }

    /// Claim the gate and return a guard that releases it on drop.
    pub fn try_lease(&self) -> Option<GateLease> {
        self.claim().then(|| GateLease { gate: self.clone() })
    }
}

impl fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Proof of a successful claim. Dropping it releases the gate.
#[derive(Debug)]
#[must_use = "dropping the lease releases the gate immediately"]
pub struct GateLease {
    gate: AdmissionGate,
}

impl Drop for GateLease {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_gate_is_inactive() {
        let gate = AdmissionGate::new();
        assert!(!gate.is_active());
    }

    #[test]
    fn claim_then_second_claim_fails() {
        let gate = AdmissionGate::new();
        assert!(gate.claim());
        assert!(gate.is_active());
        assert!(!gate.claim());
        assert!(gate.is_active());
    }

    #[test]
    fn release_permits_next_claim() {
        let gate = AdmissionGate::new();
        assert!(gate.claim());
        gate.release();
        assert!(!gate.is_active());
        assert!(gate.claim());
    }

    #[test]
    fn release_is_idempotent() {
        let gate = AdmissionGate::new();
        gate.release();
        gate.release();
        assert!(!gate.is_active());

        assert!(gate.claim());
        gate.release();
        gate.release();
        assert!(!gate.is_active());
    }

    #[test]
    fn clones_share_state() {
        let gate = AdmissionGate::new();
        let other = gate.clone();
        assert!(gate.claim());
        assert!(other.is_active());
        assert!(!other.claim());
        other.release();
        assert!(!gate.is_active());
    }

    #[test]
    fn lease_releases_on_drop() {
        let gate = AdmissionGate::new();
        let lease = gate.try_lease().unwrap();
        assert!(gate.is_active());
        assert!(gate.try_lease().is_none());
        drop(lease);
        assert!(!gate.is_active());
        assert!(gate.try_lease().is_some());
    }

    #[test]
    fn concurrent_claims_admit_exactly_one() {
        let gate = AdmissionGate::new();
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let gate = gate.clone();
                std::thread::spawn(move || gate.claim())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(gate.is_active());
    }

    #[tokio::test]
    async fn concurrent_leases_across_tasks() {
        let gate = AdmissionGate::new();
        let mut set = Vec::new();
        for _ in 0..16 {
            let gate = gate.clone();
            set.push(tokio::spawn(async move { gate.try_lease() }));
        }

        let mut leases = Vec::new();
        for handle in set {
            if let Some(lease) = handle.await.unwrap() {
                leases.push(lease);
            }
        }
        assert_eq!(leases.len(), 1);
        drop(leases);
        assert!(!gate.is_active());
    }

    #[test]
    fn debug_shows_state() {
        let gate = AdmissionGate::new();
        assert!(format!("{gate:?}").contains("false"));
        assert!(gate.claim());
        assert!(format!("{gate:?}").contains("true"));
    }
}
