//! Request-id deduplication for withdrawals.
//!
//! Each request id moves through `unseen -> in-flight -> recorded`. The
//! recorded state lives in the ledger store (one payout per key); this guard
//! tracks the in-flight window so a key cannot be worked on by two requests
//! at once, even for different accounts.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::ledger::LedgerStore;
use crate::models::payout::Payout;

/// Where a request id stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestState {
    Unseen,
    InFlight,
    /// A payout (pending, recorded or unsettled) exists for the key.
    Recorded(Payout),
}

/// Tracks request ids currently being processed.
#[derive(Debug, Default)]
pub struct IdempotencyGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Marks a request id as in flight until dropped.
#[derive(Debug)]
pub struct InFlight {
    key: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl IdempotencyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports the state of `key` against the guard and the store.
    pub fn state(&self, store: &LedgerStore, key: &str) -> RequestState {
        if let Some(payout) = store.payout(key) {
            return RequestState::Recorded(payout);
        }
        if self.in_flight.lock().contains(key) {
            return RequestState::InFlight;
        }
        RequestState::Unseen
    }

    /// Claims `key` for the caller.
    ///
    /// Returns `None` if another request already holds it.
    pub fn claim(&self, key: &str) -> Option<InFlight> {
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(key.to_string()) {
            return None;
        }
        Some(InFlight {
            key: key.to_string(),
            in_flight: Arc::clone(&self.in_flight),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccountId;
    use rust_decimal_macros::dec;

    #[test]
    fn claim_is_exclusive_until_released() {
        let guard = IdempotencyGuard::new();
        let store = LedgerStore::new();
        assert_eq!(guard.state(&store, "req-1"), RequestState::Unseen);

        let ticket = guard.claim("req-1").unwrap();
        assert!(guard.claim("req-1").is_none());
        assert_eq!(guard.state(&store, "req-1"), RequestState::InFlight);

        drop(ticket);
        assert!(guard.claim("req-1").is_some());
    }

    #[test]
    fn recorded_payout_wins_over_in_flight() {
        let guard = IdempotencyGuard::new();
        let store = LedgerStore::new();
        let _ticket = guard.claim("req-2").unwrap();
        store
            .put_intent(Payout::intent(AccountId(1), dec!(10), "req-2"))
            .unwrap();
        assert!(matches!(
            guard.state(&store, "req-2"),
            RequestState::Recorded(_)
        ));
    }
}
