//! Commission split properties over random trees and pools.

mod common;

use proptest::prelude::*;
use rust_decimal::Decimal;

use payvine::commission::{self, CommissionDistributor, CreditReason, MAX_UPLINES};
use payvine::ledger::LedgerStore;
use payvine::models::AccountId;
use payvine::models::account::{Account, AccountDirectory};

use common::{COMPANY, chain_directory, leaf};

fn pool_from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

proptest! {
    #[test]
    fn credits_always_sum_to_pool(depth in 0u64..16, cents in 0i64..100_000_000) {
        let directory = chain_directory(depth);
        let buyer = if depth == 0 { COMPANY } else { leaf(depth) };
        let pool = pool_from_cents(cents);

        let plan = CommissionDistributor::new(COMPANY)
            .plan(&directory, buyer, pool)
            .unwrap();

        let total: Decimal = plan.iter().map(|c| c.amount).sum();
        prop_assert_eq!(total, pool);
        prop_assert!(plan.iter().all(|c| c.amount >= Decimal::ZERO));
        prop_assert!(plan.iter().all(|c| c.amount.scale() <= 2));

        let uplines = plan
            .iter()
            .filter(|c| matches!(c.reason, CreditReason::Upline(_)))
            .count();
        prop_assert!(uplines <= MAX_UPLINES);
        prop_assert!(uplines as u64 <= depth);
    }

    #[test]
    fn applied_credits_match_ledger(depth in 1u64..14, cents in 1i64..10_000_000) {
        let directory = chain_directory(depth);
        let pool = pool_from_cents(cents);
        let store = LedgerStore::new();

        tokio_test::block_on(async {
            let plan = CommissionDistributor::new(COMPANY)
                .plan(&directory, leaf(depth), pool)
                .unwrap();
            let mut scope = store.begin(plan.iter().map(|c| c.beneficiary)).await;
            commission::apply(&mut scope, &plan, Some(1)).unwrap();
            scope.commit().unwrap();

            let snapshot = store.snapshot().await;
            let credited: Decimal = snapshot.wallets.iter().map(|w| w.balance).sum();
            assert_eq!(credited, pool);
            store.audit().await.unwrap();
        });
    }
}

#[test]
fn test_deep_tree_pays_exactly_ten_uplines() {
    let directory = chain_directory(30);
    let plan = CommissionDistributor::new(COMPANY)
        .plan(&directory, leaf(30), Decimal::from(1200))
        .unwrap();

    let levels: Vec<u8> = plan
        .iter()
        .filter_map(|c| match c.reason {
            CreditReason::Upline(level) => Some(level),
            _ => None,
        })
        .collect();
    assert_eq!(levels, (1..=10).collect::<Vec<u8>>());
    assert!(plan.iter().all(|c| c.beneficiary != COMPANY || c.reason == CreditReason::Company));
    assert_eq!(plan.last().unwrap().amount, Decimal::from(100));
}

#[test]
fn test_fifteen_ancestors_pay_ten() {
    // accounts 15..=2 plus the company above the buyer
    let directory = chain_directory(15);
    let plan = CommissionDistributor::new(COMPANY)
        .plan(&directory, leaf(15), Decimal::from(120))
        .unwrap();

    let uplines: Vec<_> = plan
        .iter()
        .filter(|c| matches!(c.reason, CreditReason::Upline(_)))
        .map(|c| c.beneficiary)
        .collect();
    assert_eq!(uplines, (6..=15).rev().map(AccountId).collect::<Vec<_>>());
    assert_eq!(plan.iter().map(|c| c.amount).sum::<Decimal>(), Decimal::from(120));
}

#[test]
fn test_buyer_without_parent_or_sponsor() {
    let directory = AccountDirectory::new();
    directory.register(Account::root(COMPANY)).unwrap();
    directory.register(Account::root(AccountId(9))).unwrap();

    let plan = CommissionDistributor::new(COMPANY)
        .plan(&directory, AccountId(9), Decimal::from(60))
        .unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].beneficiary, COMPANY);
    assert_eq!(plan[0].amount, Decimal::from(60));
}

#[test]
fn test_sponsor_outside_placement_line() {
    let directory = chain_directory(3);
    directory
        .register(Account {
            id: AccountId(20),
            sponsor: Some(AccountId(2)),
            placement_parent: Some(AccountId(4)),
            payout_destination: None,
        })
        .unwrap();

    let plan = CommissionDistributor::new(COMPANY)
        .plan(&directory, AccountId(20), Decimal::from(120))
        .unwrap();
    let beneficiaries: Vec<_> = plan.iter().map(|c| (c.beneficiary, c.reason)).collect();
    assert_eq!(
        beneficiaries,
        vec![
            (AccountId(4), CreditReason::Upline(1)),
            (AccountId(3), CreditReason::Upline(2)),
            (AccountId(2), CreditReason::Upline(3)),
            (COMPANY, CreditReason::Upline(4)),
            (AccountId(2), CreditReason::Sponsor),
            (COMPANY, CreditReason::Company),
        ]
    );
}
