//! Order finalization.
//!
//! An order is finalized either after a signed, captured gateway payment or
//! by debiting the buyer's wallet. Both paths run the same step: validate the
//! cart against the catalog, plan the commission for every unit, then apply
//! the wallet debit (if any) and every credit inside one ledger scope. Stock
//! is only decremented once that scope has committed, so a failure anywhere
//! leaves wallets, stock and the order list unchanged.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::commission::{self, CommissionCredit, CommissionDistributor};
use crate::gateway::{CAPTURED, PaymentGateway, verify_capture};
use crate::idempotency::IdempotencyGuard;
use crate::ledger::LedgerStore;
use crate::models::{AccountId, fits_ledger_scale};
use crate::models::account::AccountDirectory;
use crate::models::order::{CartLine, Order, OrderItem, PaymentCapture, PaymentMethod, Product};
use crate::{PayvineError, Result};

/// Products available for sale.
///
/// The lock is held for the whole of a finalization so stock checks and
/// decrements cannot interleave.
#[derive(Debug, Default)]
pub struct Catalog {
    products: AsyncMutex<HashMap<u64, Product>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a product.
    ///
    /// # Errors
    ///
    /// Returns [`PayvineError::InvalidAmount`] when the price or commission
    /// pool is negative or finer than ledger precision.
    pub async fn insert(&self, product: Product) -> Result<()> {
        let amounts = std::iter::once(product.price).chain(product.commission_amount);
        for amount in amounts {
            if amount < Decimal::ZERO || !fits_ledger_scale(amount) {
                return Err(PayvineError::InvalidAmount(amount));
            }
        }
        self.products.lock().await.insert(product.id, product);
        Ok(())
    }

    pub async fn product(&self, id: u64) -> Option<Product> {
        self.products.lock().await.get(&id).cloned()
    }

    pub async fn stock(&self, id: u64) -> Option<u32> {
        self.products.lock().await.get(&id).map(|p| p.stock)
    }
}

/// Cart line resolved against the catalog.
struct PricedLine {
    item: OrderItem,
    commission: Vec<CommissionCredit>,
}

/// Turns paid carts into orders and commission credits.
pub struct OrderFinalizer<G> {
    store: Arc<LedgerStore>,
    directory: Arc<AccountDirectory>,
    catalog: Arc<Catalog>,
    distributor: CommissionDistributor,
    gateway: G,
    webhook_secret: Option<Zeroizing<String>>,
    payments: IdempotencyGuard,
    processed: Mutex<HashMap<String, u64>>,
    orders: Mutex<Vec<Order>>,
    next_order_id: AtomicU64,
}

impl<G: PaymentGateway> OrderFinalizer<G> {
    pub fn new(
        store: Arc<LedgerStore>,
        directory: Arc<AccountDirectory>,
        catalog: Arc<Catalog>,
        distributor: CommissionDistributor,
        gateway: G,
        webhook_secret: Option<Zeroizing<String>>,
    ) -> Self {
        Self {
            store,
            directory,
            catalog,
            distributor,
            gateway,
            webhook_secret,
            payments: IdempotencyGuard::new(),
            processed: Mutex::new(HashMap::new()),
            orders: Mutex::new(Vec::new()),
            next_order_id: AtomicU64::new(1),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Finalizes an order paid through the payment gateway.
    ///
    /// # Errors
    ///
    /// - [`PayvineError::DuplicateRequest`] if the payment id was already
    ///   turned into an order or is being processed
    /// - [`PayvineError::SignatureMismatch`] for a forged callback
    /// - [`PayvineError::PaymentNotCaptured`] unless the gateway reports the
    ///   payment as captured
    /// - any cart or ledger error from finalization
    pub async fn finalize_gateway_payment(
        &self,
        buyer: AccountId,
        cart: &[CartLine],
        capture: &PaymentCapture,
    ) -> Result<Order> {
        let payment_id = capture.payment_id.as_str();
        let _ticket = self
            .payments
            .claim(payment_id)
            .ok_or_else(|| PayvineError::DuplicateRequest(payment_id.to_string()))?;
        if let Some(order) = self.processed.lock().get(payment_id) {
            warn!(payment_id, order, "payment already finalized");
            return Err(PayvineError::DuplicateRequest(payment_id.to_string()));
        }

        let secret = self
            .webhook_secret
            .as_ref()
            .ok_or_else(|| PayvineError::Config("webhook secret is not configured".to_string()))?;
        if let Err(err) = verify_capture(secret, capture) {
            warn!(%buyer, payment_id, "payment signature rejected");
            return Err(err);
        }

        let status = self.gateway.fetch_payment_status(payment_id).await?;
        if status != CAPTURED {
            return Err(PayvineError::PaymentNotCaptured(status));
        }

        let order = self
            .finalize(
                buyer,
                cart,
                PaymentMethod::Gateway {
                    gateway_order_id: capture.order_id.clone(),
                    payment_id: payment_id.to_string(),
                },
            )
            .await?;
        self.processed
            .lock()
            .insert(payment_id.to_string(), order.id);
        Ok(order)
    }

    /// Finalizes an order paid from the buyer's own wallet.
    ///
    /// The debit and every commission credit commit together.
    pub async fn pay_with_wallet(&self, buyer: AccountId, cart: &[CartLine]) -> Result<Order> {
        self.finalize(buyer, cart, PaymentMethod::Wallet).await
    }

    async fn finalize(
        &self,
        buyer: AccountId,
        cart: &[CartLine],
        payment: PaymentMethod,
    ) -> Result<Order> {
        self.directory.require(buyer)?;
        if cart.is_empty() {
            return Err(PayvineError::InvalidCart("cart is empty".to_string()));
        }

        let mut products = self.catalog.products.lock().await;

        let mut requested: HashMap<u64, u32> = HashMap::new();
        let mut lines = Vec::with_capacity(cart.len());
        for line in cart {
            if line.quantity == 0 {
                return Err(PayvineError::InvalidCart(format!(
                    "zero quantity for product {}",
                    line.product
                )));
            }
            let product = products
                .get(&line.product)
                .ok_or(PayvineError::ProductNotFound(line.product))?;
            let wanted = requested.entry(line.product).or_insert(0);
            *wanted = wanted.saturating_add(line.quantity);
            if *wanted > product.stock {
                return Err(PayvineError::OutOfStock {
                    product: product.id,
                    requested: *wanted,
                    available: product.stock,
                });
            }

            let commission = match product.commission_amount {
                Some(pool) if pool > Decimal::ZERO => {
                    self.distributor.plan(&self.directory, buyer, pool)?
                }
                _ => Vec::new(),
            };
            lines.push(PricedLine {
                item: OrderItem {
                    product: product.id,
                    quantity: line.quantity,
                    unit_price: product.price,
                },
                commission,
            });
        }

        let total: Decimal = lines
            .iter()
            .map(|l| l.item.unit_price * Decimal::from(l.item.quantity))
            .sum();
        let pays_from_wallet = matches!(payment, PaymentMethod::Wallet);

        let mut participants: BTreeSet<AccountId> = lines
            .iter()
            .flat_map(|l| l.commission.iter().map(|c| c.beneficiary))
            .collect();
        if pays_from_wallet {
            participants.insert(buyer);
        }

        let order_id = self.next_order_id.fetch_add(1, Ordering::Relaxed);
        let mut scope = self.store.begin(participants).await;

        if pays_from_wallet && total > Decimal::ZERO {
            scope.debit(
                buyer,
                total,
                format!("Order #{order_id} paid via Wallet"),
                Some(order_id),
            )?;
        }
        for line in &lines {
            for _ in 0..line.item.quantity {
                commission::apply(&mut scope, &line.commission, Some(order_id))?;
            }
        }
        let entries = scope.commit()?;

        for line in &lines {
            if let Some(product) = products.get_mut(&line.item.product) {
                product.stock -= line.item.quantity;
            }
        }
        drop(products);

        let order = Order {
            id: order_id,
            buyer,
            items: lines.into_iter().map(|l| l.item).collect(),
            amount_paid: total,
            payment,
            created_at: Utc::now(),
        };
        self.orders.lock().push(order.clone());
        info!(
            order = order.id,
            %buyer,
            amount = %total,
            entries = entries.len(),
            wallet = pays_from_wallet,
            "order finalized"
        );
        Ok(order)
    }

    pub fn order(&self, id: u64) -> Option<Order> {
        self.orders.lock().iter().find(|o| o.id == id).cloned()
    }

    /// Orders placed by `buyer`, newest first.
    pub fn orders_for(&self, buyer: AccountId) -> Vec<Order> {
        self.orders
            .lock()
            .iter()
            .rev()
            .filter(|o| o.buyer == buyer)
            .cloned()
            .collect()
    }

    /// Order created from a gateway payment, if any.
    pub fn order_for_payment(&self, payment_id: &str) -> Option<Order> {
        let id = *self.processed.lock().get(payment_id)?;
        self.order(id)
    }
}
