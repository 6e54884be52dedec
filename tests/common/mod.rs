//! Shared test utilities and fixtures.

#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;

use payvine::ledger::LedgerStore;
use payvine::models::AccountId;
use payvine::models::account::{Account, AccountDirectory};
use payvine::payout::PayoutOrchestrator;
use payvine::provider::simulated::SimulatedProvider;

/// Company account receiving leftover commission.
pub const COMPANY: AccountId = AccountId(1);

/// Company root plus a placement chain `2 -> 3 -> ... -> depth + 1`, each
/// account sponsored by its parent and holding a payout destination.
pub fn chain_directory(depth: u64) -> AccountDirectory {
    let directory = AccountDirectory::new();
    directory
        .register(Account::root(COMPANY))
        .expect("register company");
    for id in 2..=depth + 1 {
        directory
            .register(Account {
                id: AccountId(id),
                sponsor: Some(AccountId(id - 1)),
                placement_parent: Some(AccountId(id - 1)),
                payout_destination: Some(format!("fa_{id}")),
            })
            .expect("register member");
    }
    directory
}

/// Id of the deepest account of [`chain_directory`].
pub fn leaf(depth: u64) -> AccountId {
    AccountId(depth + 1)
}

/// Credits `amount` to `account` in its own scope.
pub async fn fund(store: &LedgerStore, account: AccountId, amount: Decimal) {
    let mut scope = store.begin([account]).await;
    scope
        .credit(account, amount, "Wallet top-up", None)
        .expect("credit");
    scope.commit().expect("commit");
}

/// Orchestrator over a fresh store with `account` funded.
pub async fn funded_orchestrator(
    depth: u64,
    account: AccountId,
    amount: Decimal,
    provider: SimulatedProvider,
) -> Arc<PayoutOrchestrator<SimulatedProvider>> {
    let store = Arc::new(LedgerStore::new());
    fund(&store, account, amount).await;
    Arc::new(PayoutOrchestrator::new(
        store,
        Arc::new(chain_directory(depth)),
        provider,
    ))
}
