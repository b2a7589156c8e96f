use crate::domain::account::{Account, AccountId, AccountOwner, LedgerEffect};
use crate::domain::actor::{TenantId, UserId};
use crate::domain::commission::{Commission, CommissionId};
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::payment::{Payment, PaymentId, PaymentStatus};
use crate::domain::ports::{
    AccountStore, CommissionStore, ConfigStore, OrderStore, PaymentStore, WithdrawalStore,
};
use crate::domain::withdrawal::{Withdrawal, WithdrawalId, WithdrawalStatus};
use crate::error::{MarketError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    accounts: BTreeMap<AccountId, Account>,
    account_owners: HashMap<AccountOwner, AccountId>,
    orders: BTreeMap<OrderId, Order>,
    order_numbers: HashSet<String>,
    commissions: BTreeMap<CommissionId, Commission>,
    commission_orders: HashMap<OrderId, CommissionId>,
    payments: BTreeMap<PaymentId, Payment>,
    payment_orders: HashMap<OrderId, PaymentId>,
    withdrawals: BTreeMap<WithdrawalId, Withdrawal>,
    config: HashMap<String, String>,
    last_id: u64,
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    fn insert_account(&mut self, owner: AccountOwner) -> Result<Account> {
        if self.account_owners.contains_key(&owner) {
            return Err(MarketError::AlreadyExists(format!("account for {owner}")));
        }
        let account = Account::new(AccountId(self.next_id()), owner);
        self.account_owners.insert(owner, account.id);
        self.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    /// Applies the effect to a copy; the caller commits it with `put_account`.
    fn staged_effect(&self, id: AccountId, effect: LedgerEffect) -> Result<Account> {
        let mut account = self
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| MarketError::NotFound(format!("account {id}")))?;
        account.apply(effect)?;
        Ok(account)
    }

    fn put_account(&mut self, account: Account) {
        self.accounts.insert(account.id, account);
    }
}

/// A thread-safe in-memory datastore implementing every port.
///
/// All tables sit behind a single `RwLock`, so each port method runs under one
/// write guard and behaves like a serialisable database transaction. Clones
/// share the same tables.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with configuration entries.
    pub fn with_config<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let tables = Tables {
            config: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            ..Tables::default()
        };
        Self {
            tables: Arc::new(RwLock::new(tables)),
        }
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn create_account(&self, owner: AccountOwner) -> Result<Account> {
        self.tables.write().await.insert_account(owner)
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        Ok(self.tables.read().await.accounts.get(&id).cloned())
    }

    async fn find_account(&self, owner: AccountOwner) -> Result<Option<Account>> {
        let tables = self.tables.read().await;
        Ok(tables
            .account_owners
            .get(&owner)
            .and_then(|id| tables.accounts.get(id))
            .cloned())
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.tables.read().await.accounts.values().cloned().collect())
    }

    async fn apply_effect(&self, id: AccountId, effect: LedgerEffect) -> Result<Account> {
        let mut tables = self.tables.write().await;
        let account = tables.staged_effect(id, effect)?;
        tables.put_account(account.clone());
        Ok(account)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert_order(&self, mut order: Order) -> Result<Order> {
        let mut tables = self.tables.write().await;
        if tables.order_numbers.contains(&order.order_no) {
            return Err(MarketError::Conflict(format!(
                "order number {} already used",
                order.order_no
            )));
        }
        order.id = OrderId(tables.next_id());
        tables.order_numbers.insert(order.order_no.clone());
        tables.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn find_order_by_no(&self, order_no: &str) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .find(|o| o.order_no == order_no)
            .cloned())
    }

    async fn replace_order_if(&self, order: &Order, expected: OrderStatus) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.orders.get_mut(&order.id) {
            Some(stored) if stored.status == expected => {
                *stored = order.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(MarketError::NotFound(format!("order {}", order.id))),
        }
    }

    async fn orders_by_tenant(&self, tenant: TenantId) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .filter(|o| o.tenant_id == tenant)
            .cloned()
            .collect())
    }

    async fn orders_by_assignee(&self, user: UserId) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .filter(|o| o.assignee_user_id == Some(user))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CommissionStore for InMemoryStore {
    async fn find_commission(&self, order: OrderId) -> Result<Option<Commission>> {
        let tables = self.tables.read().await;
        Ok(tables
            .commission_orders
            .get(&order)
            .and_then(|id| tables.commissions.get(id))
            .cloned())
    }

    async fn record_commission(&self, mut commission: Commission) -> Result<(Commission, Account)> {
        let mut tables = self.tables.write().await;
        if tables.commission_orders.contains_key(&commission.order_id) {
            return Err(MarketError::AlreadyExists(format!(
                "commission for order {}",
                commission.order_id
            )));
        }

        let existing = tables.account_owners.get(&AccountOwner::Platform).copied();
        let platform = match existing {
            Some(id) => id,
            None => tables.insert_account(AccountOwner::Platform)?.id,
        };
        let account = if commission.platform_revenue.is_zero() {
            tables
                .accounts
                .get(&platform)
                .cloned()
                .ok_or_else(|| MarketError::internal("platform account vanished"))?
        } else {
            tables.staged_effect(platform, LedgerEffect::Credit(commission.platform_revenue))?
        };

        commission.id = CommissionId(tables.next_id());
        tables.put_account(account.clone());
        tables.commission_orders.insert(commission.order_id, commission.id);
        tables.commissions.insert(commission.id, commission.clone());
        Ok((commission, account))
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn insert_payment(&self, mut payment: Payment) -> Result<Payment> {
        let mut tables = self.tables.write().await;
        if tables.payment_orders.contains_key(&payment.order_id) {
            return Err(MarketError::AlreadyExists(format!(
                "payment for order {}",
                payment.order_id
            )));
        }
        payment.id = PaymentId(tables.next_id());
        tables.payment_orders.insert(payment.order_id, payment.id);
        tables.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn find_payment(&self, order: OrderId) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payment_orders
            .get(&order)
            .and_then(|id| tables.payments.get(id))
            .cloned())
    }

    async fn replace_payment_if(&self, payment: &Payment, expected: PaymentStatus) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.payments.get_mut(&payment.id) {
            Some(stored) if stored.status == expected => {
                *stored = payment.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(MarketError::NotFound(format!("payment {}", payment.id))),
        }
    }
}

#[async_trait]
impl WithdrawalStore for InMemoryStore {
    async fn open_withdrawal(&self, mut withdrawal: Withdrawal) -> Result<(Withdrawal, Account)> {
        let mut tables = self.tables.write().await;
        let account = tables.staged_effect(withdrawal.account_id, withdrawal.reservation())?;
        withdrawal.id = WithdrawalId(tables.next_id());
        tables.put_account(account.clone());
        tables.withdrawals.insert(withdrawal.id, withdrawal.clone());
        Ok((withdrawal, account))
    }

    async fn get_withdrawal(&self, id: WithdrawalId) -> Result<Option<Withdrawal>> {
        Ok(self.tables.read().await.withdrawals.get(&id).cloned())
    }

    async fn withdrawals_by_user(&self, user: UserId) -> Result<Vec<Withdrawal>> {
        let tables = self.tables.read().await;
        Ok(tables
            .withdrawals
            .values()
            .filter(|w| w.user_id == user)
            .cloned()
            .collect())
    }

    async fn resolve_withdrawal(
        &self,
        withdrawal: &Withdrawal,
        expected: WithdrawalStatus,
        effect: Option<LedgerEffect>,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.withdrawals.get(&withdrawal.id) {
            Some(stored) if stored.status == expected => {}
            Some(_) => return Ok(false),
            None => return Err(MarketError::NotFound(format!("withdrawal {}", withdrawal.id))),
        }
        if let Some(effect) = effect {
            let account = tables.staged_effect(withdrawal.account_id, effect)?;
            tables.put_account(account);
        }
        tables.withdrawals.insert(withdrawal.id, withdrawal.clone());
        Ok(true)
    }
}

#[async_trait]
impl ConfigStore for InMemoryStore {
    async fn config_entries(&self) -> Result<HashMap<String, String>> {
        Ok(self.tables.read().await.config.clone())
    }

    async fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.tables
            .write()
            .await
            .config
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
