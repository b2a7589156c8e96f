use crate::domain::account::{Account, AccountId, AccountOwner, LedgerEffect};
use crate::domain::money::Money;
use crate::domain::ports::AccountStoreRef;
use crate::error::{MarketError, Result};
use rust_decimal::Decimal;
use tracing::{info, instrument};

/// Account opening and the four ledger primitives.
///
/// Every primitive is a single `apply_effect` call, which the store executes
/// as one locked read-check-write of the account row.
#[derive(Clone)]
pub struct LedgerService {
    accounts: AccountStoreRef,
}

impl LedgerService {
    pub fn new(accounts: AccountStoreRef) -> Self {
        Self { accounts }
    }

    #[instrument(skip_all, fields(owner = %owner))]
    pub async fn open_account(&self, owner: AccountOwner) -> Result<Account> {
        let account = self.accounts.create_account(owner).await?;
        info!(account_id = %account.id, "Account opened");
        Ok(account)
    }

    pub async fn account(&self, id: AccountId) -> Result<Account> {
        self.accounts
            .get_account(id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("account {id}")))
    }

    pub async fn account_for(&self, owner: AccountOwner) -> Result<Account> {
        self.accounts
            .find_account(owner)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("account for {owner}")))
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        self.accounts.all_accounts().await
    }

    /// `balance += amount`
    pub async fn increase_balance(&self, id: AccountId, amount: Decimal) -> Result<Account> {
        self.apply(id, LedgerEffect::Credit(Money::positive(amount)?)).await
    }

    /// `balance -= amount`, failing with `InsufficientBalance`.
    pub async fn decrease_balance(&self, id: AccountId, amount: Decimal) -> Result<Account> {
        self.apply(id, LedgerEffect::Debit(Money::positive(amount)?)).await
    }

    /// Moves `amount` from `balance` to `frozen_amount`.
    pub async fn freeze_amount(&self, id: AccountId, amount: Decimal) -> Result<Account> {
        self.apply(id, LedgerEffect::Freeze(Money::positive(amount)?)).await
    }

    /// Moves `amount` from `frozen_amount` back to `balance`.
    pub async fn unfreeze_amount(&self, id: AccountId, amount: Decimal) -> Result<Account> {
        self.apply(id, LedgerEffect::Unfreeze(Money::positive(amount)?)).await
    }

    #[instrument(skip_all, fields(account_id = %id, effect = ?effect))]
    async fn apply(&self, id: AccountId, effect: LedgerEffect) -> Result<Account> {
        let account = self.accounts.apply_effect(id, effect).await?;
        info!(
            balance = %account.balance,
            frozen = %account.frozen_amount,
            "Ledger updated"
        );
        Ok(account)
    }
}
