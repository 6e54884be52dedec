//! Live payout provider tests.
//!
//! These tests call the provider's test-mode API and require network access
//! plus `PAYVINE_PROVIDER_KEY_ID`, `PAYVINE_PROVIDER_KEY_SECRET` and
//! `PAYVINE_SOURCE_ACCOUNT`.
//! Run with: `cargo test --features integration-tests`

#![cfg(feature = "integration-tests")]

use payvine::config::fetch_config;
use payvine::provider::PayoutProvider;
use payvine::provider::razorpay::RazorpayXClient;

fn client() -> RazorpayXClient {
    let config = fetch_config().expect("configuration");
    RazorpayXClient::from_config(&config.provider).expect("provider credentials")
}

#[tokio::test]
async fn test_unknown_reference_is_not_found() {
    let found = client()
        .find_payout("payvine-it-never-sent")
        .await
        .expect("lookup succeeds");
    assert!(found.is_none());
}
