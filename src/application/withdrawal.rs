use crate::domain::account::{AccountOwner, LedgerEffect};
use crate::domain::actor::{Actor, UserId};
use crate::domain::config::SystemConfig;
use crate::domain::money::Money;
use crate::domain::ports::{AccountStoreRef, ConfigStoreRef, WithdrawalStoreRef};
use crate::domain::withdrawal::{Withdrawal, WithdrawalId, WithdrawalStatus};
use crate::error::{MarketError, Result};
use rust_decimal::Decimal;
use tracing::{info, instrument};

/// User payouts: request with an up-front freeze, then admin review.
#[derive(Clone)]
pub struct WithdrawalService {
    accounts: AccountStoreRef,
    withdrawals: WithdrawalStoreRef,
    config: ConfigStoreRef,
}

impl WithdrawalService {
    pub fn new(accounts: AccountStoreRef, withdrawals: WithdrawalStoreRef, config: ConfigStoreRef) -> Self {
        Self {
            accounts,
            withdrawals,
            config,
        }
    }

    /// Requests a payout from the actor's own account.
    ///
    /// The amount is frozen in the same store call that records the request,
    /// so a failed freeze leaves no withdrawal behind.
    #[instrument(skip_all, fields(user = %actor.user_id, amount = %amount))]
    pub async fn create(
        &self,
        actor: &Actor,
        amount: Decimal,
        account_info: serde_json::Value,
    ) -> Result<Withdrawal> {
        let config = SystemConfig::from_entries(&self.config.config_entries().await?)?;
        let amount = Money::positive(amount)?;
        let account = self
            .accounts
            .find_account(AccountOwner::User(actor.user_id))
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("account for user {}", actor.user_id)))?;

        let request = Withdrawal::request(
            actor.user_id,
            account.id,
            amount,
            config.min_withdrawal_amount,
            account_info,
        )?;
        let (withdrawal, account) = self.withdrawals.open_withdrawal(request).await?;
        info!(
            withdrawal_id = %withdrawal.id,
            balance = %account.balance,
            frozen = %account.frozen_amount,
            "Withdrawal requested"
        );
        Ok(withdrawal)
    }

    #[instrument(skip_all, fields(withdrawal_id = %id, admin = %admin.user_id))]
    pub async fn mark_processing(&self, id: WithdrawalId, admin: &Actor) -> Result<Withdrawal> {
        self.review(id, |w| w.mark_processing(admin).map(|()| None)).await
    }

    /// Completes the payout: the frozen amount leaves the account for good.
    #[instrument(skip_all, fields(withdrawal_id = %id, admin = %admin.user_id))]
    pub async fn approve(&self, id: WithdrawalId, admin: &Actor) -> Result<Withdrawal> {
        self.review(id, |w| w.approve(admin).map(Some)).await
    }

    /// Declines the payout and releases the frozen amount.
    #[instrument(skip_all, fields(withdrawal_id = %id, admin = %admin.user_id))]
    pub async fn reject(&self, id: WithdrawalId, admin: &Actor, reason: String) -> Result<Withdrawal> {
        self.review(id, |w| w.reject(admin, reason).map(Some)).await
    }

    pub async fn get(&self, id: WithdrawalId) -> Result<Withdrawal> {
        self.withdrawals
            .get_withdrawal(id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("withdrawal {id}")))
    }

    pub async fn list_for_user(&self, user: UserId) -> Result<Vec<Withdrawal>> {
        self.withdrawals.withdrawals_by_user(user).await
    }

    async fn review<F>(&self, id: WithdrawalId, decide: F) -> Result<Withdrawal>
    where
        F: FnOnce(&mut Withdrawal) -> Result<Option<LedgerEffect>>,
    {
        let mut withdrawal = self.get(id).await?;
        let expected: WithdrawalStatus = withdrawal.status;
        let effect = decide(&mut withdrawal)?;

        if !self
            .withdrawals
            .resolve_withdrawal(&withdrawal, expected, effect)
            .await?
        {
            return Err(MarketError::InvalidTransition(format!(
                "withdrawal {id} was reviewed concurrently"
            )));
        }
        info!(from = %expected, to = %withdrawal.status, "Withdrawal reviewed");
        Ok(withdrawal)
    }
}
