//! RazorpayX REST client for payouts and payment status.
//!
//! Payouts are posted to `/payouts` with HTTP basic auth. Amounts travel in
//! minor units and the client idempotency key is sent both as
//! `reference_id` and as the `X-Payout-Idempotency` header.

use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{info, warn};
use zeroize::Zeroizing;

use super::{PayoutProvider, PayoutRequest, ProviderError, ProviderPayout};
use crate::config::ProviderConfig;
use crate::gateway::PaymentGateway;
use crate::models::to_minor_units;
use crate::{PayvineError, Result};

/// Purpose tag attached to every payout.
const PAYOUT_PURPOSE: &str = "payout";

/// Body of `POST /payouts`.
#[derive(Debug, Serialize)]
struct CreatePayoutBody<'a> {
    account_number: &'a str,
    fund_account_id: &'a str,
    amount: i64,
    currency: &'a str,
    mode: &'a str,
    purpose: &'a str,
    queue_if_low_balance: bool,
    reference_id: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct PayoutCollection {
    #[serde(default)]
    items: Vec<ProviderPayout>,
}

#[derive(Debug, serde::Deserialize)]
struct PaymentEntity {
    status: String,
}

/// HTTP client for the payout provider and payment gateway.
pub struct RazorpayXClient {
    http: Client,
    base_url: String,
    key_id: String,
    key_secret: Zeroizing<String>,
    source_account: String,
    mode: String,
    currency: String,
}

impl RazorpayXClient {
    /// Builds a client from provider configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PayvineError::Config`] when no credentials are configured,
    /// or a TLS/HTTP error if the client cannot be built.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let credentials = config.credentials.as_ref().ok_or_else(|| {
            PayvineError::Config("payout provider credentials are not configured".to_string())
        })?;

        let builder = Client::builder().timeout(std::time::Duration::from_secs(10));
        let builder = match &config.ca_bundle {
            Some(path) => builder.use_preconfigured_tls(crate::tls::build_tls_config(path)?),
            None => builder,
        };
        let http = builder
            .build()
            .map_err(|e| PayvineError::Tls(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key_id: credentials.key_id.clone(),
            key_secret: credentials.key_secret.clone(),
            source_account: credentials.source_account.clone(),
            mode: config.payout_mode.clone(),
            currency: config.currency.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Turns a non-success response into a [`ProviderError::Rejected`].
    async fn check(response: reqwest::Response) -> std::result::Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(%status, body = %body, "provider rejected request");
        Err(ProviderError::Rejected(format!("HTTP {status}")))
    }
}

impl PayoutProvider for RazorpayXClient {
    async fn initiate_payout(
        &self,
        request: &PayoutRequest,
    ) -> std::result::Result<ProviderPayout, ProviderError> {
        let amount = to_minor_units(request.amount).ok_or_else(|| {
            ProviderError::Rejected(format!("amount {} not representable", request.amount))
        })?;
        let body = CreatePayoutBody {
            account_number: &self.source_account,
            fund_account_id: &request.destination,
            amount,
            currency: &self.currency,
            mode: &self.mode,
            purpose: PAYOUT_PURPOSE,
            queue_if_low_balance: true,
            reference_id: &request.reference,
        };

        info!(reference = %request.reference, amount, "initiating provider payout");
        let response = self
            .http
            .post(self.url("payouts"))
            .basic_auth(&self.key_id, Some(self.key_secret.as_str()))
            .header("X-Payout-Idempotency", &request.reference)
            .json(&body)
            .send()
            .await?;
        let payout: ProviderPayout = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        Ok(payout)
    }

    async fn find_payout(
        &self,
        reference: &str,
    ) -> std::result::Result<Option<ProviderPayout>, ProviderError> {
        let response = self
            .http
            .get(self.url("payouts"))
            .basic_auth(&self.key_id, Some(self.key_secret.as_str()))
            .query(&[
                ("account_number", self.source_account.as_str()),
                ("reference_id", reference),
            ])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let collection: PayoutCollection = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        Ok(collection.items.into_iter().next())
    }
}

impl PaymentGateway for RazorpayXClient {
    async fn fetch_payment_status(
        &self,
        payment_id: &str,
    ) -> std::result::Result<String, ProviderError> {
        let response = self
            .http
            .get(self.url(&format!("payments/{payment_id}")))
            .basic_auth(&self.key_id, Some(self.key_secret.as_str()))
            .send()
            .await?;
        let payment: PaymentEntity = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        Ok(payment.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderCredentials;

    fn provider_config(credentials: Option<ProviderCredentials>) -> ProviderConfig {
        ProviderConfig {
            base_url: "https://api.razorpay.com/v1/".to_string(),
            credentials,
            payout_mode: "IMPS".to_string(),
            currency: "INR".to_string(),
            ca_bundle: None,
        }
    }

    #[test]
    fn requires_credentials() {
        let err = RazorpayXClient::from_config(&provider_config(None))
            .err()
            .unwrap();
        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn trims_trailing_slash() {
        let client = RazorpayXClient::from_config(&provider_config(Some(ProviderCredentials {
            key_id: "rzp_test".into(),
            key_secret: Zeroizing::new("s".into()),
            source_account: "2323230012900444".into(),
        })))
        .unwrap();
        assert_eq!(client.url("payouts"), "https://api.razorpay.com/v1/payouts");
    }

    #[test]
    fn payout_body_uses_minor_units() {
        let body = CreatePayoutBody {
            account_number: "2323230012900444",
            fund_account_id: "fa_1",
            amount: to_minor_units(rust_decimal_macros::dec!(100.50)).unwrap(),
            currency: "INR",
            mode: "IMPS",
            purpose: PAYOUT_PURPOSE,
            queue_if_low_balance: true,
            reference_id: "req-1",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["amount"], 10050);
        assert_eq!(json["reference_id"], "req-1");
    }
}
