//! Crate-level error types.
//!
//! [`PayvineError`] unifies every failure of the ledger, commission, checkout
//! and payout paths behind a single enum so callers can match on the variant
//! they care about while still using the `?` operator for easy propagation.

use rust_decimal::Decimal;

use crate::models::AccountId;
use crate::provider::ProviderError;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PayvineError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum PayvineError {
    /// Amount is zero, negative, or has more precision than the ledger keeps.
    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// A withdrawal was submitted without a client request identifier.
    #[error("missing request_id")]
    MissingRequestId,

    #[error("insufficient wallet balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    /// The provider's fee and tax pushed the total above the balance.
    #[error("insufficient wallet balance for fees: required {required}, available {available}")]
    InsufficientBalanceForFees {
        required: Decimal,
        available: Decimal,
    },

    #[error("no payout destination registered for account {0}")]
    PayoutDestinationMissing(AccountId),

    #[error("payout destination already registered for account {0}")]
    PayoutDestinationExists(AccountId),

    /// The payout provider or payment gateway rejected or failed the call.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The request id is already recorded for another account or is in flight.
    #[error("duplicate request: {0}")]
    DuplicateRequest(String),

    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    /// A scope tried to mutate a wallet it did not lock when it began.
    #[error("wallet {0} is not locked by this scope")]
    WalletNotLocked(AccountId),

    /// Empty cart or a line with zero quantity.
    #[error("invalid cart: {0}")]
    InvalidCart(String),

    #[error("product not found: {0}")]
    ProductNotFound(u64),

    #[error("product {product} has {available} in stock, {requested} requested")]
    OutOfStock {
        product: u64,
        requested: u32,
        available: u32,
    },

    #[error("invalid payment signature")]
    SignatureMismatch,

    #[error("payment not captured yet (status: {0})")]
    PaymentNotCaptured(String),

    /// A ledger snapshot or live store failed an integrity check.
    #[error("ledger corrupt: {0}")]
    LedgerCorrupt(String),

    /// Configuration could not be read or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl PayvineError {
    /// Returns the text shown to an end user.
    ///
    /// Balance and duplicate conditions are described; provider and internal
    /// failures collapse to a generic message so provider details stay in the
    /// logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidAmount(_) => "Invalid amount.".to_string(),
            Self::MissingRequestId => "Missing request_id.".to_string(),
            Self::InsufficientBalance { .. } => "Insufficient wallet balance.".to_string(),
            Self::InsufficientBalanceForFees { .. } => {
                "Insufficient wallet balance for fees.".to_string()
            }
            Self::PayoutDestinationMissing(_) => "Banking details not found.".to_string(),
            Self::PayoutDestinationExists(_) => "Bank details already submitted.".to_string(),
            Self::DuplicateRequest(_) => {
                "This withdrawal request was already processed.".to_string()
            }
            Self::AccountNotFound(_) => "Account not found.".to_string(),
            Self::InvalidCart(_) => "Your cart is invalid.".to_string(),
            Self::ProductNotFound(_) => "Product not found.".to_string(),
            Self::OutOfStock { available, .. } => {
                format!("Only {available} item(s) available in stock.")
            }
            Self::SignatureMismatch => "Invalid payment signature.".to_string(),
            Self::PaymentNotCaptured(_) => "Payment not captured yet.".to_string(),
            _ => "Something went wrong. Please try again later.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn balance_errors_are_descriptive() {
        let err = PayvineError::InsufficientBalance {
            requested: dec!(100),
            available: dec!(40.50),
        };
        assert_eq!(
            err.to_string(),
            "insufficient wallet balance: requested 100, available 40.50"
        );
        assert_eq!(err.user_message(), "Insufficient wallet balance.");
    }

    #[test]
    fn provider_details_do_not_leak() {
        let err = PayvineError::Provider(ProviderError::Rejected(
            "BAD_REQUEST_ERROR: fund account inactive".into(),
        ));
        assert!(err.to_string().contains("fund account inactive"));
        assert!(!err.user_message().contains("fund account"));
    }
}
