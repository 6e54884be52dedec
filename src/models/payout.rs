//! Payout records produced by the withdrawal flow.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::AccountId;

/// Provider status recorded when the response carries none.
pub const DEFAULT_PAYOUT_STATUS: &str = "initiated";

/// Local lifecycle of a payout record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutState {
    /// Intent written before the provider call; outcome unknown.
    Pending,
    /// Provider accepted and the wallet was debited.
    Recorded,
    /// Provider accepted but the wallet could not cover amount + fee + tax.
    Unsettled,
}

/// A withdrawal attempt, unique per idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub account: AccountId,
    pub amount: Decimal,
    pub fee: Decimal,
    pub tax: Decimal,
    /// Total debited from the wallet: amount + fee + tax.
    pub final_amount: Decimal,
    /// Provider status string, kept verbatim.
    pub status: String,
    pub state: PayoutState,
    pub provider_payout_id: Option<String>,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

impl Payout {
    /// Pending intent persisted before the provider is called.
    pub fn intent(account: AccountId, amount: Decimal, idempotency_key: &str) -> Self {
        Self {
            account,
            amount,
            fee: Decimal::ZERO,
            tax: Decimal::ZERO,
            final_amount: amount,
            status: "pending".to_string(),
            state: PayoutState::Pending,
            provider_payout_id: None,
            idempotency_key: idempotency_key.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Outcome of a withdrawal call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutResult {
    pub payout: Payout,
    /// `true` when the request id was seen before and nothing was done.
    pub replayed: bool,
}

impl PayoutResult {
    /// Message shown to the account holder.
    pub fn message(&self) -> String {
        if self.replayed {
            format!("Withdrawal of {} already processed.", self.payout.amount)
        } else {
            format!(
                "Withdrawal of {} initiated successfully. Fees {} + Tax {} applied. Total deducted: {}.",
                self.payout.amount, self.payout.fee, self.payout.tax, self.payout.final_amount
            )
        }
    }
}
