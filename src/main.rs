use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use payvine::checkout::{Catalog, OrderFinalizer};
use payvine::commission::CommissionDistributor;
use payvine::config::{AppConfig, fetch_config};
use payvine::credentials::populate_env_from_keychain;
use payvine::gateway::SimulatedGateway;
use payvine::ledger::LedgerStore;
use payvine::models::AccountId;
use payvine::models::account::{Account, AccountDirectory};
use payvine::models::order::{CartLine, Product};
use payvine::payout::PayoutOrchestrator;
use payvine::provider::PayoutProvider;
use payvine::provider::razorpay::RazorpayXClient;
use payvine::provider::simulated::SimulatedProvider;
use payvine::{PayvineError, Result};

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt::init();

    // Environment is only mutated before the runtime starts its threads.
    populate_env_from_keychain();
    let app_config = fetch_config()?;

    tokio::runtime::Runtime::new()?.block_on(run(app_config))
}

async fn run(app_config: AppConfig) -> Result<()> {
    let store = match (&app_config.journal_path, &app_config.snapshot_path) {
        (Some(journal), _) => LedgerStore::open(journal)?,
        (None, Some(path)) if path.exists() => LedgerStore::load_snapshot(path)?,
        _ => LedgerStore::new(),
    };
    let store = Arc::new(store);
    store.audit().await?;

    let directory = Arc::new(demo_directory(app_config.company_account)?);

    if app_config.provider.credentials.is_some() {
        let client = RazorpayXClient::from_config(&app_config.provider)?;
        demo(&app_config, store, directory, client).await
    } else {
        info!("no provider credentials configured, using simulated payouts");
        demo(&app_config, store, directory, SimulatedProvider::new()).await
    }
}

/// Company root with a three-level line below it.
fn demo_directory(company: AccountId) -> Result<AccountDirectory> {
    let directory = AccountDirectory::new();
    directory.register(Account::root(company))?;

    let mut parent = company;
    for offset in 1..=3 {
        let id = AccountId(company.0.saturating_add(offset));
        directory.register(Account {
            id,
            sponsor: Some(parent),
            placement_parent: Some(parent),
            payout_destination: Some(format!("fa_demo_{id}")),
        })?;
        parent = id;
    }
    Ok(directory)
}

async fn demo<P: PayoutProvider>(
    app_config: &AppConfig,
    store: Arc<LedgerStore>,
    directory: Arc<AccountDirectory>,
    provider: P,
) -> Result<()> {
    let company = app_config.company_account;
    let earner = AccountId(company.0.saturating_add(2));
    let buyer = AccountId(company.0.saturating_add(3));

    let catalog = Arc::new(Catalog::new());
    catalog
        .insert(Product {
            id: 1,
            name: "Wellness kit".to_string(),
            price: Decimal::from(1200),
            commission_amount: Some(Decimal::from(240)),
            stock: 100,
        })
        .await?;

    {
        let mut scope = store.begin([buyer]).await;
        scope.credit(buyer, Decimal::from(1200), "Wallet top-up", None)?;
        scope.commit()?;
    }

    let finalizer = OrderFinalizer::new(
        Arc::clone(&store),
        Arc::clone(&directory),
        catalog,
        CommissionDistributor::new(company),
        SimulatedGateway::new(),
        app_config.webhook_secret.clone(),
    );
    let order = finalizer
        .pay_with_wallet(buyer, &[CartLine { product: 1, quantity: 1 }])
        .await?;
    info!(order = order.id, amount = %order.amount_paid, "demo order placed");

    let orchestrator = PayoutOrchestrator::new(Arc::clone(&store), directory, provider);
    let report = orchestrator.reconcile_pending().await;
    info!(?report, "pending payouts reconciled");

    for attempt in 0..2 {
        match orchestrator
            .withdraw(earner, Decimal::from(30), "demo-withdrawal-1")
            .await
        {
            Ok(result) => info!(attempt, replayed = result.replayed, "{}", result.message()),
            Err(err @ PayvineError::Provider(_)) => {
                warn!(attempt, error = %err, "{}", err.user_message());
                break;
            }
            Err(err) => warn!(attempt, error = %err, "{}", err.user_message()),
        }
    }

    for account in [company, earner, buyer] {
        info!(%account, balance = %store.balance(account).await, "wallet");
    }

    store.audit().await?;
    if let Some(path) = &app_config.snapshot_path {
        store.save_snapshot(path).await?;
        info!(path = %path.display(), "ledger snapshot saved");
    }
    Ok(())
}
