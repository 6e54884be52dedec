//! Referral commission distribution and wallet payout ledger.
//!
//! Sales split a per-product commission pool across the buyer's placement
//! ancestors, sponsor and the company account. Earnings accumulate in
//! per-account wallets backed by an append-only ledger, and are withdrawn
//! through an external payout provider exactly once per client request id.

pub mod checkout;
pub mod commission;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod idempotency;
pub mod ledger;
pub mod models;
pub mod payout;
pub mod provider;
pub mod tls;

pub use error::{PayvineError, Result};
