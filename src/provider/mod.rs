//! External payout provider and payment gateway seams.
//!
//! The core never talks to a bank directly. Withdrawals go through a
//! [`PayoutProvider`]; checkout asks a [`PaymentGateway`](crate::gateway::PaymentGateway)
//! whether a payment was captured. Two implementations ship with the crate:
//! the HTTP [`razorpay::RazorpayXClient`] and the in-process
//! [`simulated::SimulatedProvider`].

pub mod razorpay;
pub mod simulated;

use std::future::Future;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::from_minor_units;

/// Failure reported by, or while talking to, an external provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The provider answered but refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The response could not be understood or lacked a payout id.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The provider could not be reached.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// A payout request as sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutRequest {
    /// Registered fund-account id of the recipient.
    pub destination: String,
    pub amount: Decimal,
    /// Client idempotency key, forwarded as the provider reference.
    pub reference: String,
}

/// Provider response to a payout request. Fee and tax are in minor units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderPayout {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub fees: Option<i64>,
    #[serde(default)]
    pub tax: Option<i64>,
    #[serde(default)]
    pub reference_id: Option<String>,
}

impl ProviderPayout {
    /// Fee converted to ledger units.
    pub fn fee(&self) -> Decimal {
        from_minor_units(self.fees.unwrap_or(0))
    }

    /// Tax converted to ledger units.
    pub fn tax(&self) -> Decimal {
        from_minor_units(self.tax.unwrap_or(0))
    }

    /// The payout id, or an error when the provider did not assign one.
    pub fn require_id(&self) -> Result<&str, ProviderError> {
        self.id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ProviderError::Malformed("response carries no payout id".into()))
    }
}

/// Sends money from the platform account to a registered destination.
///
/// Implementations make no idempotency promise; callers dedupe by reference
/// before calling [`initiate_payout`](Self::initiate_payout).
pub trait PayoutProvider: Send + Sync {
    fn initiate_payout(
        &self,
        request: &PayoutRequest,
    ) -> impl Future<Output = Result<ProviderPayout, ProviderError>> + Send;

    /// Looks up a payout previously initiated with `reference`.
    fn find_payout(
        &self,
        reference: &str,
    ) -> impl Future<Output = Result<Option<ProviderPayout>, ProviderError>> + Send;
}
