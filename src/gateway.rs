//! Payment gateway callback verification.
//!
//! After checkout the gateway hands the client `{payment_id, order_id,
//! signature}`. The signature is the hex HMAC-SHA256 of
//! `"{order_id}|{payment_id}"` keyed with the webhook secret; only a valid
//! signature on a payment the gateway reports as `"captured"` may finalize an
//! order.

use std::collections::HashMap;
use std::future::Future;

use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use sha2::Sha256;

use crate::models::order::PaymentCapture;
use crate::provider::ProviderError;
use crate::{PayvineError, Result};

/// Gateway status of a payment that may be turned into an order.
pub const CAPTURED: &str = "captured";

/// Source of truth for payment status.
pub trait PaymentGateway: Send + Sync {
    fn fetch_payment_status(
        &self,
        payment_id: &str,
    ) -> impl Future<Output = std::result::Result<String, ProviderError>> + Send;
}

/// Computes the hex signature the gateway attaches to a capture.
///
/// # Errors
///
/// Returns [`PayvineError::Config`] if the secret is rejected as an HMAC key.
pub fn sign_capture(secret: &str, order_id: &str, payment_id: &str) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| PayvineError::Config(format!("invalid webhook secret: {e}")))?;
    mac.update(format!("{order_id}|{payment_id}").as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks a capture's signature in constant time.
///
/// # Errors
///
/// Returns [`PayvineError::SignatureMismatch`] for a wrong or non-hex
/// signature.
pub fn verify_capture(secret: &str, capture: &PaymentCapture) -> Result<()> {
    let provided = hex::decode(capture.signature.trim()).map_err(|_| PayvineError::SignatureMismatch)?;
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| PayvineError::Config(format!("invalid webhook secret: {e}")))?;
    mac.update(format!("{}|{}", capture.order_id, capture.payment_id).as_bytes());
    mac.verify_slice(&provided)
        .map_err(|_| PayvineError::SignatureMismatch)
}

/// Gateway backed by a local table of payment statuses.
#[derive(Debug, Default)]
pub struct SimulatedGateway {
    statuses: Mutex<HashMap<String, String>>,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, payment_id: &str, status: &str) {
        self.statuses
            .lock()
            .insert(payment_id.to_string(), status.to_string());
    }
}

impl PaymentGateway for SimulatedGateway {
    async fn fetch_payment_status(
        &self,
        payment_id: &str,
    ) -> std::result::Result<String, ProviderError> {
        self.statuses
            .lock()
            .get(payment_id)
            .cloned()
            .ok_or_else(|| ProviderError::Rejected(format!("unknown payment {payment_id}")))
    }
}
