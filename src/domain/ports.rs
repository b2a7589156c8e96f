//! Persistence ports.
//!
//! Every method is one atomic unit against the backing store. Methods that
//! touch more than one record (`open_withdrawal`, `resolve_withdrawal`,
//! `record_commission`) must commit all of their writes or none of them.

use super::account::{Account, AccountId, AccountOwner, LedgerEffect};
use super::actor::{TenantId, UserId};
use super::commission::Commission;
use super::order::{Order, OrderId, OrderStatus};
use super::payment::{Payment, PaymentStatus};
use super::withdrawal::{Withdrawal, WithdrawalId, WithdrawalStatus};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fails with `AlreadyExists` when `owner` already has an account.
    async fn create_account(&self, owner: AccountOwner) -> Result<Account>;
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>>;
    async fn find_account(&self, owner: AccountOwner) -> Result<Option<Account>>;
    async fn all_accounts(&self) -> Result<Vec<Account>>;
    /// Read-check-write of one account row; `NotFound` when absent.
    async fn apply_effect(&self, id: AccountId, effect: LedgerEffect) -> Result<Account>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Assigns the id. Fails with `Conflict` when `order_no` is taken.
    async fn insert_order(&self, order: Order) -> Result<Order>;
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;
    async fn find_order_by_no(&self, order_no: &str) -> Result<Option<Order>>;
    /// Overwrites the stored order only if its status is still `expected`.
    /// Returns `false` when another writer got there first.
    async fn replace_order_if(&self, order: &Order, expected: OrderStatus) -> Result<bool>;
    async fn orders_by_tenant(&self, tenant: TenantId) -> Result<Vec<Order>>;
    async fn orders_by_assignee(&self, user: UserId) -> Result<Vec<Order>>;
}

#[async_trait]
pub trait CommissionStore: Send + Sync {
    async fn find_commission(&self, order: OrderId) -> Result<Option<Commission>>;
    /// Inserts the commission and credits `platform_revenue` to the platform
    /// account (opening it if needed). `AlreadyExists` when the order already
    /// has a commission.
    async fn record_commission(&self, commission: Commission) -> Result<(Commission, Account)>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Assigns the id. `AlreadyExists` when the order already has a payment.
    async fn insert_payment(&self, payment: Payment) -> Result<Payment>;
    async fn find_payment(&self, order: OrderId) -> Result<Option<Payment>>;
    async fn replace_payment_if(&self, payment: &Payment, expected: PaymentStatus) -> Result<bool>;
}

#[async_trait]
pub trait WithdrawalStore: Send + Sync {
    /// Freezes the amount on the withdrawal's account and inserts the request.
    async fn open_withdrawal(&self, withdrawal: Withdrawal) -> Result<(Withdrawal, Account)>;
    async fn get_withdrawal(&self, id: WithdrawalId) -> Result<Option<Withdrawal>>;
    async fn withdrawals_by_user(&self, user: UserId) -> Result<Vec<Withdrawal>>;
    /// Writes the new status together with `effect` on the withdrawal's
    /// account, only if the stored status is still `expected`.
    async fn resolve_withdrawal(
        &self,
        withdrawal: &Withdrawal,
        expected: WithdrawalStatus,
        effect: Option<LedgerEffect>,
    ) -> Result<bool>;
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn config_entries(&self) -> Result<HashMap<String, String>>;
    async fn set_config(&self, key: &str, value: &str) -> Result<()>;
}

/// Everything a single transactional datastore provides.
pub trait MarketStore:
    AccountStore + OrderStore + CommissionStore + PaymentStore + WithdrawalStore + ConfigStore
{
}

impl<T> MarketStore for T where
    T: AccountStore + OrderStore + CommissionStore + PaymentStore + WithdrawalStore + ConfigStore
{
}

pub type AccountStoreRef = Arc<dyn AccountStore>;
pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type CommissionStoreRef = Arc<dyn CommissionStore>;
pub type PaymentStoreRef = Arc<dyn PaymentStore>;
pub type WithdrawalStoreRef = Arc<dyn WithdrawalStore>;
pub type ConfigStoreRef = Arc<dyn ConfigStore>;

