//! Wallet balances and ledger entries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::AccountId;

/// Balance holder, one per account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub account: AccountId,
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// An empty wallet created on first access.
    pub fn open(account: AccountId) -> Self {
        Self {
            account,
            balance: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }
}

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Credit,
    Debit,
}

/// Immutable ledger entry. Never mutated or removed once committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: u64,
    pub account: AccountId,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub order_ref: Option<u64>,
}

impl WalletTransaction {
    /// The entry's effect on the balance: positive for credits.
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            EntryKind::Credit => self.amount,
            EntryKind::Debit => -self.amount,
        }
    }
}
