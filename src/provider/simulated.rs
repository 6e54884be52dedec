//! Paper payout provider that settles payouts locally.
//!
//! When no provider credentials are configured the binary runs against this
//! engine. It answers with the same [`ProviderPayout`] shape the HTTP
//! provider returns (fees and tax in minor units), so the payout flow cannot
//! tell the difference.

use std::collections::HashMap;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::debug;

use super::{PayoutProvider, PayoutRequest, ProviderError, ProviderPayout};

/// IMPS fee charged per payout, in minor units (2.00).
const DEFAULT_FEE_MINOR: i64 = 200;

/// GST on the fee, in minor units (0.36).
const DEFAULT_TAX_MINOR: i64 = 36;

/// A payout the engine has accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedPayout {
    pub id: String,
    pub destination: String,
    pub amount: Decimal,
    pub reference: String,
    pub fees: i64,
    pub tax: i64,
}

#[derive(Debug)]
struct EngineState {
    next_payout_id: u64,
    calls: usize,
    fail_next: Option<ProviderError>,
    omit_id_next: bool,
    stall_next: bool,
    accepted: Vec<SimulatedPayout>,
    by_reference: HashMap<String, usize>,
}

/// In-process stand-in for the payout provider.
#[derive(Debug)]
pub struct SimulatedProvider {
    fee_minor: i64,
    tax_minor: i64,
    status: String,
    state: Mutex<EngineState>,
}

impl SimulatedProvider {
    /// Creates an engine charging the default IMPS fee and tax.
    #[must_use]
    pub fn new() -> Self {
        Self::with_charges(DEFAULT_FEE_MINOR, DEFAULT_TAX_MINOR)
    }

    /// Creates an engine charging the given fee and tax (minor units).
    #[must_use]
    pub fn with_charges(fee_minor: i64, tax_minor: i64) -> Self {
        Self {
            fee_minor,
            tax_minor,
            status: "processing".to_string(),
            state: Mutex::new(EngineState {
                next_payout_id: 1,
                calls: 0,
                fail_next: None,
                omit_id_next: false,
                stall_next: false,
                accepted: Vec::new(),
                by_reference: HashMap::new(),
            }),
        }
    }

    /// Makes the next [`initiate_payout`](PayoutProvider::initiate_payout)
    /// call fail with `error`.
    pub fn fail_next(&self, error: ProviderError) {
        self.state.lock().fail_next = Some(error);
    }

    /// Makes the next call answer without a payout id.
    pub fn omit_id_next(&self) {
        self.state.lock().omit_id_next = true;
    }

    /// Makes the next call accept the payout and then never answer, like a
    /// process that dies before the response arrives.
    pub fn stall_next(&self) {
        self.state.lock().stall_next = true;
    }

    /// Number of `initiate_payout` calls received, successful or not.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.state.lock().calls
    }

    /// Payouts accepted so far.
    #[must_use]
    pub fn accepted(&self) -> Vec<SimulatedPayout> {
        self.state.lock().accepted.clone()
    }

    /// Records a payout as if it had been accepted by an earlier process.
    pub fn preload(&self, request: &PayoutRequest) -> ProviderPayout {
        self.accept(&mut self.state.lock(), request)
    }

    fn accept(&self, state: &mut EngineState, request: &PayoutRequest) -> ProviderPayout {
        let id = format!("pout_SIM{:06}", state.next_payout_id);
        state.next_payout_id += 1;
        let payout = SimulatedPayout {
            id: id.clone(),
            destination: request.destination.clone(),
            amount: request.amount,
            reference: request.reference.clone(),
            fees: self.fee_minor,
            tax: self.tax_minor,
        };
        state
            .by_reference
            .insert(request.reference.clone(), state.accepted.len());
        state.accepted.push(payout.clone());
        self.response(&payout)
    }

    fn response(&self, payout: &SimulatedPayout) -> ProviderPayout {
        ProviderPayout {
            id: Some(payout.id.clone()),
            status: Some(self.status.clone()),
            fees: Some(payout.fees),
            tax: Some(payout.tax),
            reference_id: Some(payout.reference.clone()),
        }
    }
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PayoutProvider for SimulatedProvider {
    async fn initiate_payout(
        &self,
        request: &PayoutRequest,
    ) -> Result<ProviderPayout, ProviderError> {
        let (response, stall) = {
            let mut state = self.state.lock();
            state.calls += 1;
            if let Some(error) = state.fail_next.take() {
                return Err(error);
            }
            if std::mem::take(&mut state.omit_id_next) {
                return Ok(ProviderPayout {
                    status: Some("failed".to_string()),
                    ..Default::default()
                });
            }
            let stall = std::mem::take(&mut state.stall_next);
            (self.accept(&mut state, request), stall)
        };
        debug!(reference = %request.reference, amount = %request.amount, "simulated payout accepted");
        if stall {
            std::future::pending::<()>().await;
        }
        Ok(response)
    }

    async fn find_payout(&self, reference: &str) -> Result<Option<ProviderPayout>, ProviderError> {
        let state = self.state.lock();
        Ok(state
            .by_reference
            .get(reference)
            .map(|&i| self.response(&state.accepted[i])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(reference: &str) -> PayoutRequest {
        PayoutRequest {
            destination: "fa_sim".into(),
            amount: dec!(100),
            reference: reference.into(),
        }
    }

    #[tokio::test]
    async fn accepts_with_default_charges() {
        let engine = SimulatedProvider::new();
        let resp = engine.initiate_payout(&request("r1")).await.unwrap();
        assert_eq!(resp.require_id().unwrap(), "pout_SIM000001");
        assert_eq!(resp.fee() + resp.tax(), dec!(2.36));
        assert_eq!(engine.calls(), 1);
    }

    #[tokio::test]
    async fn fail_next_applies_once() {
        let engine = SimulatedProvider::new();
        engine.fail_next(ProviderError::Rejected("inactive".into()));
        assert!(engine.initiate_payout(&request("r1")).await.is_err());
        assert!(engine.initiate_payout(&request("r2")).await.is_ok());
        assert_eq!(engine.calls(), 2);
        assert_eq!(engine.accepted().len(), 1);
    }

    #[tokio::test]
    async fn omitted_id_is_reported_as_malformed() {
        let engine = SimulatedProvider::new();
        engine.omit_id_next();
        let resp = engine.initiate_payout(&request("r1")).await.unwrap();
        assert!(resp.require_id().is_err());
        assert!(engine.accepted().is_empty());
    }

    #[tokio::test]
    async fn stalled_call_still_accepts() {
        let engine = SimulatedProvider::new();
        engine.stall_next();
        let req = request("r1");
        let call = engine.initiate_payout(&req);
        let waited = tokio::time::timeout(std::time::Duration::from_millis(20), call).await;
        assert!(waited.is_err());
        assert_eq!(engine.accepted().len(), 1);
        assert!(engine.find_payout("r1").await.unwrap().is_some());
        assert!(engine.initiate_payout(&request("r2")).await.is_ok());
    }

    #[tokio::test]
    async fn finds_by_reference() {
        let engine = SimulatedProvider::with_charges(0, 0);
        engine.initiate_payout(&request("r7")).await.unwrap();
        let found = engine.find_payout("r7").await.unwrap().unwrap();
        assert_eq!(found.reference_id.as_deref(), Some("r7"));
        assert!(engine.find_payout("r8").await.unwrap().is_none());
    }
}
