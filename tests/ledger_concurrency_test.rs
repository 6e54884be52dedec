//! Commission credits and withdrawals racing on the same wallet.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::task::JoinSet;

use payvine::commission::CommissionDistributor;
use payvine::ledger::LedgerStore;
use payvine::models::AccountId;
use payvine::payout::PayoutOrchestrator;
use payvine::provider::simulated::SimulatedProvider;

use common::{COMPANY, chain_directory, fund, leaf};

const UPLINE: AccountId = AccountId(2);
const SALES: u64 = 20;
const WITHDRAWALS: u64 = 10;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_credits_and_withdrawals_interleave_without_losing_updates() {
    let store = Arc::new(LedgerStore::new());
    let directory = Arc::new(chain_directory(3));
    let distributor = Arc::new(CommissionDistributor::new(COMPANY));
    let orch = Arc::new(PayoutOrchestrator::new(
        Arc::clone(&store),
        Arc::clone(&directory),
        SimulatedProvider::with_charges(0, 0),
    ));
    let buyer = leaf(3);
    fund(&store, UPLINE, dec!(50)).await;

    let mut sales = JoinSet::new();
    let mut withdrawals = JoinSet::new();
    for i in 0..SALES {
        let store = Arc::clone(&store);
        let directory = Arc::clone(&directory);
        let distributor = Arc::clone(&distributor);
        sales.spawn(async move {
            let plan = distributor.plan(&directory, buyer, dec!(120))?;
            let mut scope = store.begin(plan.iter().map(|c| c.beneficiary)).await;
            distributor.distribute(&mut scope, &directory, buyer, dec!(120), Some(i))?;
            scope.commit()
        });

        if i < WITHDRAWALS {
            let orch = Arc::clone(&orch);
            withdrawals.spawn(async move {
                orch.withdraw(UPLINE, dec!(5), &format!("wd-{i}")).await
            });
        }
    }

    while let Some(joined) = sales.join_next().await {
        joined.unwrap().unwrap();
    }
    while let Some(joined) = withdrawals.join_next().await {
        assert!(!joined.unwrap().unwrap().replayed);
    }

    // Each 120 pool splits into five credits; the second upline gets one
    // 10.00 share.
    let credited = dec!(10) * Decimal::from(SALES);
    let debited = dec!(5) * Decimal::from(WITHDRAWALS);
    assert_eq!(store.balance(UPLINE).await, dec!(50) + credited - debited);

    let history = store.history(UPLINE);
    assert_eq!(history.len() as u64, 1 + SALES + WITHDRAWALS);
    let net: Decimal = history.iter().map(|e| e.signed_amount()).sum();
    assert_eq!(net, store.balance(UPLINE).await);

    assert_eq!(store.balance(AccountId(3)).await, dec!(20) * Decimal::from(SALES));
    assert_eq!(store.balance(COMPANY).await, dec!(90) * Decimal::from(SALES));
    assert_eq!(orch.provider().calls() as u64, WITHDRAWALS);

    let ids: HashSet<u64> = [COMPANY, UPLINE, AccountId(3)]
        .into_iter()
        .flat_map(|a| store.history(a))
        .map(|e| e.id)
        .collect();
    assert_eq!(ids.len() as u64, 1 + SALES * 5 + WITHDRAWALS);
    store.audit().await.unwrap();
}
