//! Products, carts and finalized orders.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::AccountId;

/// A sellable product with its per-unit commission pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    pub price: Decimal,
    /// Pool split across the buyer's referral tree for every unit sold.
    pub commission_amount: Option<Decimal>,
    pub stock: u32,
}

/// One line of a cart being checked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product: u64,
    pub quantity: u32,
}

/// Signed callback delivered by the payment gateway after checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCapture {
    pub payment_id: String,
    pub order_id: String,
    pub signature: String,
}

/// How an order was paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum PaymentMethod {
    Gateway {
        gateway_order_id: String,
        payment_id: String,
    },
    Wallet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product: u64,
    pub quantity: u32,
    pub unit_price: Decimal,
}

/// A finalized, paid order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub buyer: AccountId,
    pub items: Vec<OrderItem>,
    pub amount_paid: Decimal,
    pub payment: PaymentMethod,
    pub created_at: DateTime<Utc>,
}
