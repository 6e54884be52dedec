//! Ledger store: wallet balances, per-wallet history and payout records.
//!
//! Each wallet sits behind its own async mutex, which plays the role of a
//! row lock. Mutations only happen through a [`Scope`] obtained from
//! [`LedgerStore::begin`]; reads wait for any scope holding the wallet so
//! they always observe committed state.
//!
//! The store can be written to and restored from a JSON snapshot whose first
//! line is the CRC32 of the body. A store opened with [`LedgerStore::open`]
//! additionally writes every change through to an append-only [`journal`]
//! before publishing it.

pub mod journal;
pub mod scope;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::AccountId;
use crate::models::payout::{Payout, PayoutState};
use crate::models::wallet::{Wallet, WalletTransaction};
use crate::{PayvineError, Result};
use journal::{Journal, JournalRecord};
pub use scope::Scope;

type WalletCell = Arc<tokio::sync::Mutex<Wallet>>;

/// In-process ledger shared by every request.
#[derive(Debug)]
pub struct LedgerStore {
    wallets: Mutex<BTreeMap<AccountId, WalletCell>>,
    history: Mutex<HashMap<AccountId, Vec<WalletTransaction>>>,
    payouts: Mutex<HashMap<String, Payout>>,
    next_entry_id: AtomicU64,
    journal: Option<Journal>,
}

/// Serializable image of the whole store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub wallets: Vec<Wallet>,
    /// Every committed entry, ordered by id.
    pub entries: Vec<WalletTransaction>,
    pub payouts: Vec<Payout>,
    pub next_entry_id: u64,
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore {
    pub fn new() -> Self {
        Self {
            wallets: Mutex::new(BTreeMap::new()),
            history: Mutex::new(HashMap::new()),
            payouts: Mutex::new(HashMap::new()),
            next_entry_id: AtomicU64::new(1),
            journal: None,
        }
    }

    /// Opens a store backed by the journal at `path`, replaying whatever it
    /// already holds.
    ///
    /// # Errors
    ///
    /// Returns [`PayvineError::LedgerCorrupt`] if a record fails its checksum
    /// or the replayed balances are inconsistent.
    pub fn open(path: &Path) -> Result<Self> {
        let (journal, records) = Journal::open(path)?;
        let replayed = records.len();

        let mut entries = Vec::new();
        let mut payouts: HashMap<String, Payout> = HashMap::new();
        for record in records {
            match record {
                JournalRecord::Commit {
                    entries: committed,
                    payouts: recorded,
                } => {
                    entries.extend(committed);
                    for payout in recorded {
                        payouts.insert(payout.idempotency_key.clone(), payout);
                    }
                }
                JournalRecord::Payout { payout } => {
                    payouts.insert(payout.idempotency_key.clone(), payout);
                }
                JournalRecord::Discard { idempotency_key } => {
                    payouts.remove(&idempotency_key);
                }
            }
        }
        entries.sort_by_key(|e| e.id);

        let mut wallets: BTreeMap<AccountId, Wallet> = BTreeMap::new();
        for entry in &entries {
            let wallet = wallets
                .entry(entry.account)
                .or_insert_with(|| Wallet::open(entry.account));
            wallet.balance += entry.signed_amount();
            wallet.updated_at = entry.timestamp;
        }
        let next_entry_id = entries.last().map_or(1, |e| e.id + 1);
        let mut payouts: Vec<Payout> = payouts.into_values().collect();
        payouts.sort_by(|a, b| a.idempotency_key.cmp(&b.idempotency_key));

        let mut store = Self::from_snapshot(LedgerSnapshot {
            wallets: wallets.into_values().collect(),
            entries,
            payouts,
            next_entry_id,
        })?;
        info!(path = %journal.path().display(), records = replayed, "ledger journal replayed");
        store.journal = Some(journal);
        Ok(store)
    }

    /// Writes a record to the journal, if any, before the change is published.
    fn write_ahead(&self, record: impl FnOnce() -> JournalRecord) -> Result<()> {
        match &self.journal {
            Some(journal) => journal.append(&record()),
            None => Ok(()),
        }
    }

    /// Returns the wallet cell for `account`, creating an empty wallet on
    /// first access.
    fn cell(&self, account: AccountId) -> WalletCell {
        self.wallets
            .lock()
            .entry(account)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(Wallet::open(account))))
            .clone()
    }

    /// Opens an atomic scope over the given wallets.
    ///
    /// Locks are taken in ascending account order, so two scopes can never
    /// wait on each other in a cycle. Missing wallets are created.
    pub async fn begin<I>(&self, accounts: I) -> Scope<'_>
    where
        I: IntoIterator<Item = AccountId>,
    {
        let ordered: BTreeSet<AccountId> = accounts.into_iter().collect();
        let mut guards = Vec::with_capacity(ordered.len());
        for account in ordered {
            guards.push(self.cell(account).lock_owned().await);
        }
        Scope::new(self, guards)
    }

    /// Committed wallet state (get-or-create).
    pub async fn wallet(&self, account: AccountId) -> Wallet {
        let cell = self.cell(account);
        let wallet = cell.lock().await;
        wallet.clone()
    }

    pub async fn balance(&self, account: AccountId) -> Decimal {
        self.wallet(account).await.balance
    }

    /// Ledger entries of one wallet, newest first.
    pub fn history(&self, account: AccountId) -> Vec<WalletTransaction> {
        self.history
            .lock()
            .get(&account)
            .map(|entries| entries.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    pub fn payout(&self, idempotency_key: &str) -> Option<Payout> {
        self.payouts.lock().get(idempotency_key).cloned()
    }

    /// Payouts of one account, newest first.
    pub fn payouts_for(&self, account: AccountId) -> Vec<Payout> {
        let mut payouts: Vec<Payout> = self
            .payouts
            .lock()
            .values()
            .filter(|p| p.account == account)
            .cloned()
            .collect();
        payouts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        payouts
    }

    /// Intents whose provider outcome is still unknown.
    pub fn pending_payouts(&self) -> Vec<Payout> {
        let mut pending: Vec<Payout> = self
            .payouts
            .lock()
            .values()
            .filter(|p| p.state == PayoutState::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        pending
    }

    /// Persists a pending payout intent outside of any scope.
    pub(crate) fn put_intent(&self, intent: Payout) -> Result<()> {
        let mut payouts = self.payouts.lock();
        if payouts.contains_key(&intent.idempotency_key) {
            return Err(PayvineError::DuplicateRequest(intent.idempotency_key));
        }
        self.write_ahead(|| JournalRecord::Payout {
            payout: intent.clone(),
        })?;
        payouts.insert(intent.idempotency_key.clone(), intent);
        Ok(())
    }

    /// Removes an intent the provider never acted on.
    pub(crate) fn discard_intent(&self, idempotency_key: &str) -> Result<()> {
        let mut payouts = self.payouts.lock();
        if payouts
            .get(idempotency_key)
            .is_some_and(|p| p.state == PayoutState::Pending)
        {
            self.write_ahead(|| JournalRecord::Discard {
                idempotency_key: idempotency_key.to_string(),
            })?;
            payouts.remove(idempotency_key);
        }
        Ok(())
    }

    /// Replaces a pending intent with an unsettled record.
    pub(crate) fn mark_unsettled(&self, payout: Payout) -> Result<()> {
        debug_assert_eq!(payout.state, PayoutState::Unsettled);
        let mut payouts = self.payouts.lock();
        self.write_ahead(|| JournalRecord::Payout {
            payout: payout.clone(),
        })?;
        payouts.insert(payout.idempotency_key.clone(), payout);
        Ok(())
    }

    /// Number of committed ledger entries across all wallets.
    pub fn entry_count(&self) -> usize {
        self.history.lock().values().map(Vec::len).sum()
    }

    /// Checks that every wallet balance equals credits minus debits of its
    /// history.
    ///
    /// # Errors
    ///
    /// Returns [`PayvineError::LedgerCorrupt`] naming the first mismatching
    /// wallet.
    pub async fn audit(&self) -> Result<()> {
        let snapshot = self.snapshot().await;
        verify(&snapshot)
    }

    /// Takes a consistent image of the store.
    ///
    /// Every wallet lock is held (in ascending order) while histories and
    /// payouts are copied, so no scope can commit halfway through.
    pub async fn snapshot(&self) -> LedgerSnapshot {
        let cells: Vec<WalletCell> = self.wallets.lock().values().cloned().collect();
        let mut guards = Vec::with_capacity(cells.len());
        for cell in cells {
            guards.push(cell.lock_owned().await);
        }

        let wallets: Vec<Wallet> = guards.iter().map(|g| (**g).clone()).collect();
        let held: BTreeSet<AccountId> = wallets.iter().map(|w| w.account).collect();
        // Wallets created after the cells were collected are not part of this image.
        let mut entries: Vec<WalletTransaction> = self
            .history
            .lock()
            .iter()
            .filter(|(account, _)| held.contains(account))
            .flat_map(|(_, entries)| entries.iter().cloned())
            .collect();
        entries.sort_by_key(|e| e.id);
        let mut payouts: Vec<Payout> = self.payouts.lock().values().cloned().collect();
        payouts.sort_by(|a, b| a.idempotency_key.cmp(&b.idempotency_key));

        LedgerSnapshot {
            wallets,
            entries,
            payouts,
            next_entry_id: self.next_entry_id.load(Ordering::Relaxed),
        }
    }

    /// Rebuilds a store from a snapshot after verifying it.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Self> {
        verify(&snapshot)?;

        let store = Self::new();
        {
            let mut wallets = store.wallets.lock();
            for wallet in snapshot.wallets {
                wallets.insert(wallet.account, Arc::new(tokio::sync::Mutex::new(wallet)));
            }
        }
        {
            let mut history = store.history.lock();
            for entry in snapshot.entries {
                history.entry(entry.account).or_default().push(entry);
            }
        }
        {
            let mut payouts = store.payouts.lock();
            for payout in snapshot.payouts {
                payouts.insert(payout.idempotency_key.clone(), payout);
            }
        }
        store
            .next_entry_id
            .store(snapshot.next_entry_id, Ordering::Relaxed);
        Ok(store)
    }

    /// Writes a checksummed snapshot to `path`.
    pub async fn save_snapshot(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot().await;
        let body = serde_json::to_string(&snapshot)?;
        let checksum = crc32fast::hash(body.as_bytes());
        tokio::fs::write(path, format!("{checksum:08x}\n{body}")).await?;
        info!(
            path = %path.display(),
            wallets = snapshot.wallets.len(),
            entries = snapshot.entries.len(),
            "ledger snapshot saved"
        );
        Ok(())
    }

    /// Loads a store from a snapshot written by [`save_snapshot`](Self::save_snapshot).
    ///
    /// # Errors
    ///
    /// Returns [`PayvineError::LedgerCorrupt`] if the checksum does not match
    /// or the balances disagree with the entries.
    pub fn load_snapshot(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let (header, body) = contents
            .split_once('\n')
            .ok_or_else(|| PayvineError::LedgerCorrupt("missing checksum header".into()))?;
        let expected = u32::from_str_radix(header.trim(), 16)
            .map_err(|e| PayvineError::LedgerCorrupt(format!("bad checksum header: {e}")))?;
        let actual = crc32fast::hash(body.as_bytes());
        if expected != actual {
            warn!(path = %path.display(), expected, actual, "snapshot checksum mismatch");
            return Err(PayvineError::LedgerCorrupt(format!(
                "checksum mismatch: header {expected:08x}, body {actual:08x}"
            )));
        }
        let snapshot: LedgerSnapshot = serde_json::from_str(body)?;
        Self::from_snapshot(snapshot)
    }
}

/// Balance conservation check over a snapshot.
fn verify(snapshot: &LedgerSnapshot) -> Result<()> {
    let mut sums: HashMap<AccountId, Decimal> = HashMap::new();
    for entry in &snapshot.entries {
        *sums.entry(entry.account).or_default() += entry.signed_amount();
    }
    for wallet in &snapshot.wallets {
        let expected = sums.remove(&wallet.account).unwrap_or_default();
        if wallet.balance != expected {
            return Err(PayvineError::LedgerCorrupt(format!(
                "wallet {} balance {} but entries sum to {expected}",
                wallet.account, wallet.balance
            )));
        }
        if wallet.balance < Decimal::ZERO {
            return Err(PayvineError::LedgerCorrupt(format!(
                "wallet {} has negative balance {}",
                wallet.account, wallet.balance
            )));
        }
    }
    if let Some((account, _)) = sums.into_iter().next() {
        return Err(PayvineError::LedgerCorrupt(format!(
            "entries reference missing wallet {account}"
        )));
    }
    Ok(())
}
