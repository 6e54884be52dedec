//! Atomic scope: the only place wallet balances change.
//!
//! A [`Scope`] holds the exclusive lock of every wallet it may touch for its
//! whole lifetime. Credits and debits are staged against a working balance;
//! [`Scope::commit`] publishes balances, ledger entries and payout records in
//! one step. Dropping a scope without committing discards everything.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

use super::LedgerStore;
use super::journal::JournalRecord;
use crate::models::payout::{Payout, PayoutState};
use crate::models::wallet::{EntryKind, Wallet, WalletTransaction};
use crate::models::{AccountId, is_valid_amount};
use crate::{PayvineError, Result};

/// A wallet locked by a scope together with its uncommitted balance.
struct LockedWallet {
    guard: OwnedMutexGuard<Wallet>,
    working: Decimal,
}

/// Unit of work over a fixed set of locked wallets.
pub struct Scope<'a> {
    store: &'a LedgerStore,
    locked: BTreeMap<AccountId, LockedWallet>,
    entries: Vec<WalletTransaction>,
    payouts: Vec<Payout>,
    committed: bool,
}

impl<'a> Scope<'a> {
    pub(super) fn new(store: &'a LedgerStore, guards: Vec<OwnedMutexGuard<Wallet>>) -> Self {
        let locked = guards
            .into_iter()
            .map(|guard| {
                let working = guard.balance;
                (guard.account, LockedWallet { guard, working })
            })
            .collect();
        Self {
            store,
            locked,
            entries: Vec::new(),
            payouts: Vec::new(),
            committed: false,
        }
    }

    /// Balance of a locked wallet including staged changes.
    pub fn balance(&self, account: AccountId) -> Result<Decimal> {
        self.locked
            .get(&account)
            .map(|w| w.working)
            .ok_or(PayvineError::WalletNotLocked(account))
    }

    /// Stages a credit. Always succeeds for a positive amount on a locked wallet.
    pub fn credit(
        &mut self,
        account: AccountId,
        amount: Decimal,
        description: impl Into<String>,
        order_ref: Option<u64>,
    ) -> Result<WalletTransaction> {
        self.apply(account, EntryKind::Credit, amount, description.into(), order_ref)
    }

    /// Stages a debit.
    ///
    /// # Errors
    ///
    /// Returns [`PayvineError::InsufficientBalance`] when `amount` exceeds the
    /// working balance; nothing is staged in that case.
    pub fn debit(
        &mut self,
        account: AccountId,
        amount: Decimal,
        description: impl Into<String>,
        order_ref: Option<u64>,
    ) -> Result<WalletTransaction> {
        self.apply(account, EntryKind::Debit, amount, description.into(), order_ref)
    }

    fn apply(
        &mut self,
        account: AccountId,
        kind: EntryKind,
        amount: Decimal,
        description: String,
        order_ref: Option<u64>,
    ) -> Result<WalletTransaction> {
        if !is_valid_amount(amount) {
            return Err(PayvineError::InvalidAmount(amount));
        }
        let wallet = self
            .locked
            .get_mut(&account)
            .ok_or(PayvineError::WalletNotLocked(account))?;

        match kind {
            EntryKind::Credit => wallet.working += amount,
            EntryKind::Debit => {
                if amount > wallet.working {
                    return Err(PayvineError::InsufficientBalance {
                        requested: amount,
                        available: wallet.working,
                    });
                }
                wallet.working -= amount;
            }
        }

        let entry = WalletTransaction {
            id: self.store.next_entry_id.fetch_add(1, Ordering::Relaxed),
            account,
            kind,
            amount,
            description,
            timestamp: Utc::now(),
            order_ref,
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// Stages the final payout record for its idempotency key.
    ///
    /// A pending intent for the same key is replaced on commit.
    pub fn record_payout(&mut self, payout: Payout) -> Result<()> {
        let key = &payout.idempotency_key;
        let clashes_committed = self
            .store
            .payout(key)
            .is_some_and(|p| p.state != PayoutState::Pending);
        let clashes_staged = self.payouts.iter().any(|p| &p.idempotency_key == key);
        if clashes_committed || clashes_staged {
            return Err(PayvineError::DuplicateRequest(key.clone()));
        }
        self.payouts.push(payout);
        Ok(())
    }

    /// Entries staged so far, in staging order.
    pub fn staged(&self) -> &[WalletTransaction] {
        &self.entries
    }

    /// Publishes every staged change and releases the wallet locks.
    ///
    /// On a journaled store the changes are written to the journal first.
    ///
    /// # Errors
    ///
    /// Returns the journal's I/O error; the scope is then rolled back.
    pub fn commit(mut self) -> Result<Vec<WalletTransaction>> {
        if !self.entries.is_empty() || !self.payouts.is_empty() {
            let store = self.store;
            store.write_ahead(|| JournalRecord::Commit {
                entries: self.entries.clone(),
                payouts: self.payouts.clone(),
            })?;
        }

        let now = Utc::now();
        let entries = std::mem::take(&mut self.entries);
        let payouts = std::mem::take(&mut self.payouts);
        let mut locked = std::mem::take(&mut self.locked);

        for wallet in locked.values_mut() {
            if wallet.guard.balance != wallet.working {
                wallet.guard.balance = wallet.working;
                wallet.guard.updated_at = now;
            }
        }

        {
            let mut history = self.store.history.lock();
            for entry in &entries {
                history.entry(entry.account).or_default().push(entry.clone());
            }
        }
        if !payouts.is_empty() {
            let mut records = self.store.payouts.lock();
            for payout in payouts {
                records.insert(payout.idempotency_key.clone(), payout);
            }
        }
        self.committed = true;
        drop(locked);

        info!(entries = entries.len(), "ledger scope committed");
        Ok(entries)
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        if !self.committed && (!self.entries.is_empty() || !self.payouts.is_empty()) {
            debug!(
                entries = self.entries.len(),
                payouts = self.payouts.len(),
                "ledger scope rolled back"
            );
        }
    }
}
