//! Commission distribution across the referral tree.
//!
//! A sale's commission pool is cut into twelve equal shares: up to ten for
//! the buyer's placement ancestors, one for the sponsor, and one base share
//! for the company. Shares nobody is entitled to, plus the remainder left by
//! truncating the share to ledger precision, go to the company account so the
//! credits always add up to the pool exactly.

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, warn};

use crate::ledger::Scope;
use crate::models::account::AccountDirectory;
use crate::models::wallet::WalletTransaction;
use crate::models::{AccountId, LEDGER_SCALE, fits_ledger_scale};
use crate::{PayvineError, Result};

/// Number of shares the pool is divided into.
pub const SHARE_DIVISOR: u32 = 12;

/// Maximum number of placement ancestors paid per sale.
pub const MAX_UPLINES: usize = 10;

/// Why a beneficiary is credited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditReason {
    /// Placement ancestor at the given depth (1 = direct parent).
    Upline(u8),
    Sponsor,
    Company,
}

impl CreditReason {
    /// Ledger entry description for this reason.
    pub fn description(self) -> &'static str {
        match self {
            Self::Upline(_) => "commission",
            Self::Sponsor => "Sponsor commission",
            Self::Company => "Company share of commission",
        }
    }
}

impl fmt::Display for CreditReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upline(level) => write!(f, "upline level {level}"),
            Self::Sponsor => write!(f, "sponsor"),
            Self::Company => write!(f, "company"),
        }
    }
}

/// One planned credit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissionCredit {
    pub beneficiary: AccountId,
    pub amount: Decimal,
    pub reason: CreditReason,
}

/// Splits commission pools and applies them to the ledger.
#[derive(Debug, Clone)]
pub struct CommissionDistributor {
    company: AccountId,
}

impl CommissionDistributor {
    /// Creates a distributor routing leftover shares to `company`.
    pub fn new(company: AccountId) -> Self {
        Self { company }
    }

    pub fn company(&self) -> AccountId {
        self.company
    }

    /// Computes the credits for one unit sold to `buyer`.
    ///
    /// A zero pool yields no credits.
    ///
    /// # Errors
    ///
    /// Returns [`PayvineError::InvalidAmount`] for a negative pool or one
    /// finer than ledger precision, and [`PayvineError::AccountNotFound`]
    /// when the buyer or any account on its chain is not registered.
    pub fn plan(
        &self,
        directory: &AccountDirectory,
        buyer: AccountId,
        pool: Decimal,
    ) -> Result<Vec<CommissionCredit>> {
        if pool < Decimal::ZERO || !fits_ledger_scale(pool) {
            return Err(PayvineError::InvalidAmount(pool));
        }
        let buyer = directory.require(buyer)?;
        if pool.is_zero() {
            return Ok(Vec::new());
        }

        let share = (pool / Decimal::from(SHARE_DIVISOR))
            .round_dp_with_strategy(LEDGER_SCALE, RoundingStrategy::ToZero);
        let mut credits = Vec::with_capacity(MAX_UPLINES + 2);

        if !share.is_zero() {
            let mut current = buyer.placement_parent;
            let mut level = 0;
            while let Some(ancestor) = current {
                if level == MAX_UPLINES {
                    break;
                }
                level += 1;
                if ancestor == buyer.id {
                    warn!(account = %buyer.id, "placement chain loops back to the buyer");
                }
                credits.push(CommissionCredit {
                    beneficiary: ancestor,
                    amount: share,
                    reason: CreditReason::Upline(level as u8),
                });
                current = directory.placement_parent(ancestor)?;
            }

            if let Some(sponsor) = buyer.sponsor {
                directory.require(sponsor)?;
                credits.push(CommissionCredit {
                    beneficiary: sponsor,
                    amount: share,
                    reason: CreditReason::Sponsor,
                });
            }
        }

        let paid: Decimal = credits.iter().map(|c| c.amount).sum();
        credits.push(CommissionCredit {
            beneficiary: self.company,
            amount: pool - paid,
            reason: CreditReason::Company,
        });
        debug!(
            buyer = %buyer.id,
            %pool,
            %share,
            beneficiaries = credits.len(),
            "commission planned"
        );
        Ok(credits)
    }

    /// Plans and applies one unit's commission inside `scope`.
    ///
    /// Every beneficiary's wallet must already be locked by the scope; a
    /// failure leaves the scope to be dropped by the caller, which discards
    /// every credit of the enclosing order.
    pub fn distribute(
        &self,
        scope: &mut Scope<'_>,
        directory: &AccountDirectory,
        buyer: AccountId,
        pool: Decimal,
        order_ref: Option<u64>,
    ) -> Result<Vec<WalletTransaction>> {
        let plan = self.plan(directory, buyer, pool)?;
        apply(scope, &plan, order_ref)
    }
}

/// Credits every planned share through the scope.
pub fn apply(
    scope: &mut Scope<'_>,
    plan: &[CommissionCredit],
    order_ref: Option<u64>,
) -> Result<Vec<WalletTransaction>> {
    plan.iter()
        .filter(|c| !c.amount.is_zero())
        .map(|c| scope.credit(c.beneficiary, c.amount, c.reason.description(), order_ref))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerStore;
    use crate::models::account::Account;
    use rust_decimal_macros::dec;

    const COMPANY: AccountId = AccountId(1);

    /// Company root plus a straight placement chain 2 -> 3 -> ... -> n+1,
    /// each sponsored by its parent.
    fn chain(n: u64) -> AccountDirectory {
        let dir = AccountDirectory::new();
        dir.register(Account::root(COMPANY)).unwrap();
        for id in 2..=n + 1 {
            dir.register(Account {
                id: AccountId(id),
                sponsor: Some(AccountId(id - 1)),
                placement_parent: Some(AccountId(id - 1)),
                payout_destination: None,
            })
            .unwrap();
        }
        dir
    }

    fn total(plan: &[CommissionCredit]) -> Decimal {
        plan.iter().map(|c| c.amount).sum()
    }

    #[test]
    fn orphan_buyer_sends_everything_to_company() {
        let dir = AccountDirectory::new();
        dir.register(Account::root(COMPANY)).unwrap();
        dir.register(Account::root(AccountId(50))).unwrap();

        let plan = CommissionDistributor::new(COMPANY)
            .plan(&dir, AccountId(50), dec!(120))
            .unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].beneficiary, COMPANY);
        assert_eq!(plan[0].amount, dec!(120));
        assert_eq!(plan[0].reason, CreditReason::Company);
    }

    #[test]
    fn direct_child_of_company() {
        let dir = chain(1);
        let plan = CommissionDistributor::new(COMPANY)
            .plan(&dir, AccountId(2), dec!(120))
            .unwrap();
        // company as upline, company as sponsor, company remainder
        assert_eq!(plan.len(), 3);
        assert!(plan.iter().all(|c| c.beneficiary == COMPANY));
        assert_eq!(plan[2].amount, dec!(100));
        assert_eq!(total(&plan), dec!(120));
    }

    #[test]
    fn upline_walk_stops_at_ten() {
        let dir = chain(16);
        let plan = CommissionDistributor::new(COMPANY)
            .plan(&dir, AccountId(17), dec!(120))
            .unwrap();
        let uplines: Vec<_> = plan
            .iter()
            .filter(|c| matches!(c.reason, CreditReason::Upline(_)))
            .collect();
        assert_eq!(uplines.len(), MAX_UPLINES);
        assert_eq!(uplines[0].beneficiary, AccountId(16));
        assert_eq!(uplines[9].beneficiary, AccountId(7));
        assert_eq!(uplines[9].reason, CreditReason::Upline(10));
        // base company share only: 120 - 11 * 10
        assert_eq!(plan.last().unwrap().amount, dec!(10));
    }

    #[test]
    fn truncation_remainder_goes_to_company() {
        let dir = chain(3);
        let plan = CommissionDistributor::new(COMPANY)
            .plan(&dir, AccountId(4), dec!(100))
            .unwrap();
        // share = 8.33; 3 uplines (3, 2, company) + sponsor paid
        assert_eq!(plan[0].amount, dec!(8.33));
        assert_eq!(plan.last().unwrap().amount, dec!(100) - dec!(8.33) * dec!(4));
        assert_eq!(total(&plan), dec!(100));
    }

    #[test]
    fn tiny_pool_pays_only_company() {
        let dir = chain(3);
        let plan = CommissionDistributor::new(COMPANY)
            .plan(&dir, AccountId(4), dec!(0.11))
            .unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].amount, dec!(0.11));
    }

    #[test]
    fn zero_pool_is_noop_and_negative_rejected() {
        let dir = chain(2);
        let distributor = CommissionDistributor::new(COMPANY);
        assert!(distributor.plan(&dir, AccountId(3), dec!(0)).unwrap().is_empty());
        assert!(matches!(
            distributor.plan(&dir, AccountId(3), dec!(-1)),
            Err(PayvineError::InvalidAmount(_))
        ));
    }

    #[tokio::test]
    async fn pool_finer_than_ledger_is_rejected() {
        let dir = chain(3);
        let distributor = CommissionDistributor::new(COMPANY);
        assert!(matches!(
            distributor.plan(&dir, AccountId(4), dec!(12.345)),
            Err(PayvineError::InvalidAmount(pool)) if pool == dec!(12.345)
        ));

        let store = LedgerStore::new();
        let mut scope = store.begin([AccountId(3), AccountId(2), COMPANY]).await;
        assert!(
            distributor
                .distribute(&mut scope, &dir, AccountId(4), dec!(12.345), None)
                .is_err()
        );
        assert!(scope.staged().is_empty());

        // trailing zeros are not extra precision
        let plan = distributor.plan(&dir, AccountId(4), dec!(12.3400)).unwrap();
        assert_eq!(plan.iter().map(|c| c.amount).sum::<Decimal>(), dec!(12.34));
    }

    #[test]
    fn unknown_buyer_is_reported() {
        let dir = chain(1);
        assert!(matches!(
            CommissionDistributor::new(COMPANY).plan(&dir, AccountId(99), dec!(12)),
            Err(PayvineError::AccountNotFound(AccountId(99)))
        ));
    }

    #[test]
    fn self_parent_cycle_terminates() {
        let dir = AccountDirectory::new();
        dir.register(Account::root(COMPANY)).unwrap();
        dir.register(Account {
            id: AccountId(5),
            sponsor: None,
            placement_parent: Some(AccountId(5)),
            payout_destination: None,
        })
        .unwrap();
        let plan = CommissionDistributor::new(COMPANY)
            .plan(&dir, AccountId(5), dec!(12))
            .unwrap();
        assert_eq!(plan.len(), MAX_UPLINES + 1);
        assert_eq!(total(&plan), dec!(12));
    }

    #[tokio::test]
    async fn distribute_credits_each_beneficiary() {
        let dir = chain(2);
        let store = LedgerStore::new();
        let distributor = CommissionDistributor::new(COMPANY);
        let plan = distributor.plan(&dir, AccountId(3), dec!(24)).unwrap();

        let mut scope = store.begin(plan.iter().map(|c| c.beneficiary)).await;
        let entries = distributor
            .distribute(&mut scope, &dir, AccountId(3), dec!(24), Some(7))
            .unwrap();
        scope.commit().unwrap();

        assert_eq!(entries.len(), 4);
        // parent 2 gets upline + sponsor shares
        assert_eq!(store.balance(AccountId(2)).await, dec!(4));
        assert_eq!(store.balance(COMPANY).await, dec!(20));
        let history = store.history(AccountId(2));
        assert!(history.iter().any(|e| e.description == "Sponsor commission"));
        assert!(history.iter().all(|e| e.order_ref == Some(7)));
    }
}
