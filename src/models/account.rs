//! Accounts and the referral/placement relations between them.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::AccountId;
use crate::{PayvineError, Result};

/// An identity capable of holding a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// The account that referred this one.
    pub sponsor: Option<AccountId>,
    /// The account this one is nested under in the commission tree.
    pub placement_parent: Option<AccountId>,
    /// Provider fund-account id used for payouts.
    pub payout_destination: Option<String>,
}

impl Account {
    /// A root account with no sponsor and no placement parent.
    pub fn root(id: AccountId) -> Self {
        Self {
            id,
            sponsor: None,
            placement_parent: None,
            payout_destination: None,
        }
    }
}

/// Registry of accounts, shared between the checkout and payout paths.
#[derive(Debug, Default)]
pub struct AccountDirectory {
    accounts: RwLock<HashMap<AccountId, Account>>,
}

impl AccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account.
    ///
    /// # Errors
    ///
    /// Returns [`PayvineError::AccountNotFound`] if the sponsor or placement
    /// parent is not registered yet.
    pub fn register(&self, account: Account) -> Result<()> {
        let mut accounts = self.accounts.write();
        for related in [account.sponsor, account.placement_parent].into_iter().flatten() {
            if related != account.id && !accounts.contains_key(&related) {
                return Err(PayvineError::AccountNotFound(related));
            }
        }
        accounts.insert(account.id, account);
        Ok(())
    }

    pub fn get(&self, id: AccountId) -> Option<Account> {
        self.accounts.read().get(&id).cloned()
    }

    pub fn contains(&self, id: AccountId) -> bool {
        self.accounts.read().contains_key(&id)
    }

    /// Returns the account or [`PayvineError::AccountNotFound`].
    pub fn require(&self, id: AccountId) -> Result<Account> {
        self.get(id).ok_or(PayvineError::AccountNotFound(id))
    }

    pub fn placement_parent(&self, id: AccountId) -> Result<Option<AccountId>> {
        Ok(self.require(id)?.placement_parent)
    }

    pub fn sponsor(&self, id: AccountId) -> Result<Option<AccountId>> {
        Ok(self.require(id)?.sponsor)
    }

    /// Records the provider fund-account id that payouts for `id` go to.
    ///
    /// A destination is registered once; a second call returns
    /// [`PayvineError::PayoutDestinationExists`] and keeps the first.
    pub fn set_payout_destination(&self, id: AccountId, destination: String) -> Result<()> {
        let mut accounts = self.accounts.write();
        let account = accounts
            .get_mut(&id)
            .ok_or(PayvineError::AccountNotFound(id))?;
        if account.payout_destination.is_some() {
            return Err(PayvineError::PayoutDestinationExists(id));
        }
        account.payout_destination = Some(destination);
        Ok(())
    }

    pub fn payout_destination(&self, id: AccountId) -> Result<Option<String>> {
        Ok(self.require(id)?.payout_destination)
    }

    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }
}
