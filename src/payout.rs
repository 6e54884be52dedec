//! Withdrawal orchestration.
//!
//! A withdrawal locks the account's wallet, replays any payout already
//! recorded for the request id, checks the balance, persists a pending
//! intent, calls the provider once, and finally debits amount + fee + tax and
//! records the payout in the same scope.
//!
//! The provider call is the one step that cannot be rolled back. The pending
//! intent written before it lets [`PayoutOrchestrator::reconcile_pending`]
//! settle or discard payouts whose process died mid-flight.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::idempotency::{IdempotencyGuard, RequestState};
use crate::ledger::{LedgerStore, Scope};
use crate::models::account::AccountDirectory;
use crate::models::payout::{DEFAULT_PAYOUT_STATUS, Payout, PayoutResult, PayoutState};
use crate::models::{AccountId, is_valid_amount};
use crate::provider::{PayoutProvider, PayoutRequest, ProviderError, ProviderPayout};
use crate::{PayvineError, Result};

/// Counts from one [`PayoutOrchestrator::reconcile_pending`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Provider had the payout and the wallet was debited.
    pub settled: usize,
    /// Provider had the payout but the wallet could not cover it.
    pub unsettled: usize,
    /// Provider never saw the payout; the intent was dropped.
    pub discarded: usize,
    /// Provider lookup failed; the intent stays pending.
    pub failed: usize,
}

/// Runs withdrawals against a payout provider.
pub struct PayoutOrchestrator<P> {
    store: Arc<LedgerStore>,
    directory: Arc<AccountDirectory>,
    provider: P,
    guard: IdempotencyGuard,
}

impl<P: PayoutProvider> PayoutOrchestrator<P> {
    pub fn new(store: Arc<LedgerStore>, directory: Arc<AccountDirectory>, provider: P) -> Self {
        Self {
            store,
            directory,
            provider,
            guard: IdempotencyGuard::new(),
        }
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn guard(&self) -> &IdempotencyGuard {
        &self.guard
    }

    /// Withdraws `amount` from `account`'s wallet to its payout destination.
    ///
    /// Calling again with the same `request_id` returns the recorded payout
    /// with `replayed = true` and touches nothing.
    ///
    /// # Errors
    ///
    /// - [`PayvineError::MissingRequestId`] / [`PayvineError::InvalidAmount`]
    ///   for malformed input
    /// - [`PayvineError::InsufficientBalance`] before the provider is called
    /// - [`PayvineError::PayoutDestinationMissing`] without a destination
    /// - [`PayvineError::Provider`] when the provider fails; the wallet is
    ///   untouched
    /// - [`PayvineError::InsufficientBalanceForFees`] when fee and tax push
    ///   the total above the balance; the payout is kept as unsettled
    /// - [`PayvineError::DuplicateRequest`] when the id belongs to another
    ///   account or is being processed concurrently
    pub async fn withdraw(
        &self,
        account: AccountId,
        amount: Decimal,
        request_id: &str,
    ) -> Result<PayoutResult> {
        let request_id = request_id.trim();
        if request_id.is_empty() {
            return Err(PayvineError::MissingRequestId);
        }
        if !is_valid_amount(amount) {
            return Err(PayvineError::InvalidAmount(amount));
        }
        self.directory.require(account)?;

        let scope = self.store.begin([account]).await;

        match self.guard.state(&self.store, request_id) {
            RequestState::Recorded(existing) if existing.account != account => {
                warn!(
                    %account,
                    request_id,
                    owner = %existing.account,
                    "request id owned by another account"
                );
                return Err(PayvineError::DuplicateRequest(request_id.to_string()));
            }
            RequestState::Recorded(existing) => {
                info!(%account, request_id, status = %existing.status, "withdrawal replayed");
                return Ok(PayoutResult {
                    payout: existing,
                    replayed: true,
                });
            }
            RequestState::InFlight => {
                warn!(%account, request_id, "request id already in flight");
                return Err(PayvineError::DuplicateRequest(request_id.to_string()));
            }
            RequestState::Unseen => {}
        }
        let _ticket = self
            .guard
            .claim(request_id)
            .ok_or_else(|| PayvineError::DuplicateRequest(request_id.to_string()))?;

        let available = scope.balance(account)?;
        if available < amount {
            return Err(PayvineError::InsufficientBalance {
                requested: amount,
                available,
            });
        }

        let destination = self
            .directory
            .payout_destination(account)?
            .ok_or(PayvineError::PayoutDestinationMissing(account))?;

        let intent = Payout::intent(account, amount, request_id);
        self.store.put_intent(intent.clone())?;

        let request = PayoutRequest {
            destination,
            amount,
            reference: request_id.to_string(),
        };
        let outcome = self
            .provider
            .initiate_payout(&request)
            .await
            .and_then(|response| {
                response.require_id()?;
                Ok(response)
            });
        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                warn!(%account, request_id, error = %err, "payout provider call failed");
                if let Err(discard_err) = self.store.discard_intent(request_id) {
                    warn!(request_id, error = %discard_err, "failed to discard payout intent");
                }
                return Err(err.into());
            }
        };

        let payout = self.settle(scope, intent, &response)?;
        Ok(PayoutResult {
            payout,
            replayed: false,
        })
    }

    /// Debits amount + fee + tax and records the payout, or keeps it as
    /// unsettled when the wallet cannot cover the total.
    fn settle(
        &self,
        mut scope: Scope<'_>,
        intent: Payout,
        response: &ProviderPayout,
    ) -> Result<Payout> {
        let account = intent.account;
        let amount = intent.amount;
        let fee = response.fee();
        let tax = response.tax();
        let total = amount + fee + tax;

        let mut payout = Payout {
            fee,
            tax,
            final_amount: total,
            status: response
                .status
                .clone()
                .unwrap_or_else(|| DEFAULT_PAYOUT_STATUS.to_string()),
            state: PayoutState::Recorded,
            provider_payout_id: response.id.clone(),
            ..intent
        };

        if fee < Decimal::ZERO || tax < Decimal::ZERO {
            payout.state = PayoutState::Unsettled;
            self.store.mark_unsettled(payout)?;
            return Err(ProviderError::Malformed(format!(
                "negative charges: fee {fee}, tax {tax}"
            ))
            .into());
        }

        let available = scope.balance(account)?;
        if available < total {
            warn!(
                %account,
                request_id = %payout.idempotency_key,
                %total,
                %available,
                "payout sent but wallet cannot cover fees; kept unsettled"
            );
            payout.state = PayoutState::Unsettled;
            self.store.mark_unsettled(payout)?;
            return Err(PayvineError::InsufficientBalanceForFees {
                required: total,
                available,
            });
        }

        scope.debit(
            account,
            total,
            format!("Payout {amount} + Fee {fee} + Tax {tax}"),
            None,
        )?;
        scope.record_payout(payout.clone())?;
        scope.commit()?;

        info!(
            %account,
            request_id = %payout.idempotency_key,
            %amount,
            %fee,
            %tax,
            %total,
            "withdrawal recorded"
        );
        Ok(payout)
    }

    /// Settles or discards every pending intent by asking the provider what
    /// happened to it.
    pub async fn reconcile_pending(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for intent in self.store.pending_payouts() {
            let key = intent.idempotency_key.clone();
            let Some(_ticket) = self.guard.claim(&key) else {
                continue;
            };

            match self.provider.find_payout(&key).await {
                Err(err) => {
                    warn!(request_id = %key, error = %err, "reconcile lookup failed");
                    report.failed += 1;
                }
                Ok(None) => match self.store.discard_intent(&key) {
                    Ok(()) => {
                        info!(request_id = %key, "provider never received payout; intent dropped");
                        report.discarded += 1;
                    }
                    Err(err) => {
                        warn!(request_id = %key, error = %err, "failed to discard payout intent");
                        report.failed += 1;
                    }
                },
                Ok(Some(response)) => {
                    let scope = self.store.begin([intent.account]).await;
                    let still_pending = self
                        .store
                        .payout(&key)
                        .is_some_and(|p| p.state == PayoutState::Pending);
                    if !still_pending {
                        continue;
                    }
                    match self.settle(scope, intent, &response) {
                        Ok(_) => report.settled += 1,
                        Err(err) => {
                            warn!(request_id = %key, error = %err, "reconciled payout left unsettled");
                            report.unsettled += 1;
                        }
                    }
                }
            }
        }

        if report != ReconcileReport::default() {
            info!(?report, "payout reconciliation finished");
        }
        report
    }
}
