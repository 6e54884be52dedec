//! Application configuration loaded from environment variables.
//!
//! The company account **must** be provided via `PAYVINE_COMPANY_ACCOUNT`;
//! it receives every commission share nobody else is entitled to.
//!
//! Provider credentials are optional. When `PAYVINE_PROVIDER_KEY_ID` and
//! `PAYVINE_PROVIDER_KEY_SECRET` are both set the payout flow talks to the
//! HTTP provider, otherwise it runs against the simulated one.

use std::path::PathBuf;

use zeroize::Zeroizing;

use crate::models::AccountId;

/// Default payout provider endpoint.
const DEFAULT_PROVIDER_URL: &str = "https://api.razorpay.com/v1";

const DEFAULT_PAYOUT_MODE: &str = "IMPS";
const DEFAULT_CURRENCY: &str = "INR";

/// Top-level application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub company_account: AccountId,
    pub provider: ProviderConfig,
    /// Key for payment capture signatures.
    pub webhook_secret: Option<Zeroizing<String>>,
    /// Where the ledger snapshot is read from and written to.
    pub snapshot_path: Option<PathBuf>,
    /// Append-only ledger journal. Takes precedence over the snapshot when
    /// loading.
    pub journal_path: Option<PathBuf>,
}

/// Payout provider configuration values.
#[derive(Debug)]
pub struct ProviderConfig {
    pub base_url: String,
    pub credentials: Option<ProviderCredentials>,
    pub payout_mode: String,
    pub currency: String,
    /// PEM bundle pinning the provider's CA.
    pub ca_bundle: Option<PathBuf>,
}

/// Credentials and source account for the HTTP provider.
#[derive(Debug)]
pub struct ProviderCredentials {
    pub key_id: String,
    pub key_secret: Zeroizing<String>,
    /// Platform account number payouts are drawn from.
    pub source_account: String,
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`PayvineError::Config`](crate::PayvineError::Config) if the
/// company account is missing or not a number, if only one of the two
/// credential variables is set, or if credentials are set without
/// `PAYVINE_SOURCE_ACCOUNT`.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let company_account = non_empty_var("PAYVINE_COMPANY_ACCOUNT")
        .ok_or_else(|| {
            crate::PayvineError::Config("PAYVINE_COMPANY_ACCOUNT is not set".to_string())
        })?
        .parse::<AccountId>()
        .map_err(|e| {
            crate::PayvineError::Config(format!("PAYVINE_COMPANY_ACCOUNT is not an account id: {e}"))
        })?;

    let key_id = non_empty_var("PAYVINE_PROVIDER_KEY_ID");
    let key_secret = non_empty_var("PAYVINE_PROVIDER_KEY_SECRET");

    let credentials = match (key_id, key_secret) {
        (Some(_), None) => {
            return Err(crate::PayvineError::Config(
                "PAYVINE_PROVIDER_KEY_ID is set but PAYVINE_PROVIDER_KEY_SECRET is missing"
                    .to_string(),
            ));
        }
        (None, Some(_)) => {
            return Err(crate::PayvineError::Config(
                "PAYVINE_PROVIDER_KEY_SECRET is set but PAYVINE_PROVIDER_KEY_ID is missing"
                    .to_string(),
            ));
        }
        (Some(key_id), Some(key_secret)) => {
            let source_account = non_empty_var("PAYVINE_SOURCE_ACCOUNT").ok_or_else(|| {
                crate::PayvineError::Config(
                    "provider credentials are set but PAYVINE_SOURCE_ACCOUNT is missing"
                        .to_string(),
                )
            })?;
            Some(ProviderCredentials {
                key_id,
                key_secret: Zeroizing::new(key_secret),
                source_account,
            })
        }
        (None, None) => None,
    };

    Ok(AppConfig {
        company_account,
        provider: ProviderConfig {
            base_url: non_empty_var("PAYVINE_PROVIDER_URL")
                .unwrap_or_else(|| DEFAULT_PROVIDER_URL.to_string()),
            credentials,
            payout_mode: non_empty_var("PAYVINE_PAYOUT_MODE")
                .unwrap_or_else(|| DEFAULT_PAYOUT_MODE.to_string()),
            currency: non_empty_var("PAYVINE_CURRENCY")
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            ca_bundle: non_empty_var("PAYVINE_CA_BUNDLE").map(PathBuf::from),
        },
        webhook_secret: non_empty_var("PAYVINE_WEBHOOK_SECRET").map(Zeroizing::new),
        snapshot_path: non_empty_var("PAYVINE_SNAPSHOT_PATH").map(PathBuf::from),
        journal_path: non_empty_var("PAYVINE_JOURNAL_PATH").map(PathBuf::from),
    })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}
