//! Shared models for accounts, wallets, payouts and orders.
//!
//! Also holds the money helpers that convert between the ledger's decimal
//! unit and the minor currency units used by payment providers.

pub mod account;
pub mod order;
pub mod payout;
pub mod wallet;

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Number of decimal places the ledger keeps for every amount.
pub const LEDGER_SCALE: u32 = 2;

/// Identity of an account that can hold a wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(AccountId)
    }
}

/// Converts a provider amount in minor units (paise, cents) into ledger units.
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, LEDGER_SCALE)
}

/// Converts a ledger amount into minor units.
///
/// Returns `None` when the amount carries more precision than the ledger
/// scale or does not fit an `i64`.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    let scaled = amount * Decimal::from(10_i64.pow(LEDGER_SCALE));
    if !scaled.fract().is_zero() {
        return None;
    }
    i64::try_from(scaled.trunc()).ok()
}

/// Returns `true` when `amount` carries no more precision than the ledger keeps.
pub fn fits_ledger_scale(amount: Decimal) -> bool {
    amount.normalize().scale() <= LEDGER_SCALE
}

/// Returns `true` when `amount` is positive and representable at ledger scale.
pub fn is_valid_amount(amount: Decimal) -> bool {
    amount > Decimal::ZERO && fits_ledger_scale(amount)
}
