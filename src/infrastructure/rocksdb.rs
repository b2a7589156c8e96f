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
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, Transaction, TransactionDB,
    TransactionDBOptions,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Column Family for account rows.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for orders.
pub const CF_ORDERS: &str = "orders";
/// Column Family for commissions.
pub const CF_COMMISSIONS: &str = "commissions";
/// Column Family for payments.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for withdrawal requests.
pub const CF_WITHDRAWALS: &str = "withdrawals";
/// Column Family for uniqueness indexes and the id sequence.
pub const CF_INDEXES: &str = "indexes";
/// Column Family for system configuration entries.
pub const CF_CONFIG: &str = "config";

const COLUMN_FAMILIES: [&str; 7] = [
    CF_ACCOUNTS,
    CF_ORDERS,
    CF_COMMISSIONS,
    CF_PAYMENTS,
    CF_WITHDRAWALS,
    CF_INDEXES,
    CF_CONFIG,
];

const SEQUENCE_KEY: &[u8] = b"seq";

type Txn<'a> = Transaction<'a, TransactionDB>;

/// A persistent store backed by a pessimistic RocksDB `TransactionDB`.
///
/// Each port method runs in one RocksDB transaction. Rows are read with
/// `get_for_update`, which takes an exclusive row lock until commit, so
/// concurrent read-check-write cycles on the same account or order serialise
/// the way `SELECT ... FOR UPDATE` would.
///
/// `Clone` shares the underlying `Arc<TransactionDB>`.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<TransactionDB>,
}

impl RocksDBStore {
    /// Opens or creates a database at `path` with all column families present.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = TransactionDB::open_cf_descriptors(
            &opts,
            &TransactionDBOptions::default(),
            path,
            descriptors,
        )?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| MarketError::internal(format!("{name} column family not found")))
    }

    fn scan<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let cf = self.cf(name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    fn get<T: DeserializeOwned>(&self, name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn next_id(&self, txn: &Txn<'_>) -> Result<u64> {
        let cf = self.cf(CF_INDEXES)?;
        let last: u64 = read_locked(txn, cf, SEQUENCE_KEY)?.unwrap_or(0);
        let next = last + 1;
        write(txn, cf, SEQUENCE_KEY, &next)?;
        Ok(next)
    }

    fn locked_account(&self, txn: &Txn<'_>, id: AccountId) -> Result<Account> {
        read_locked(txn, self.cf(CF_ACCOUNTS)?, &id.0.to_be_bytes())?
            .ok_or_else(|| MarketError::NotFound(format!("account {id}")))
    }

    fn apply_locked(&self, txn: &Txn<'_>, id: AccountId, effect: LedgerEffect) -> Result<Account> {
        let mut account = self.locked_account(txn, id)?;
        account.apply(effect)?;
        write(txn, self.cf(CF_ACCOUNTS)?, &account.id.0.to_be_bytes(), &account)?;
        Ok(account)
    }

    fn insert_account(&self, txn: &Txn<'_>, owner: AccountOwner) -> Result<Account> {
        let indexes = self.cf(CF_INDEXES)?;
        let owner_key = owner_key(owner);
        if read_locked::<u64>(txn, indexes, owner_key.as_bytes())?.is_some() {
            return Err(MarketError::AlreadyExists(format!("account for {owner}")));
        }
        let account = Account::new(AccountId(self.next_id(txn)?), owner);
        write(txn, indexes, owner_key.as_bytes(), &account.id.0)?;
        write(txn, self.cf(CF_ACCOUNTS)?, &account.id.0.to_be_bytes(), &account)?;
        Ok(account)
    }
}

fn read_locked<T: DeserializeOwned>(txn: &Txn<'_>, cf: &ColumnFamily, key: &[u8]) -> Result<Option<T>> {
    match txn.get_for_update_cf(cf, key, true)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn write<T: Serialize>(txn: &Txn<'_>, cf: &ColumnFamily, key: &[u8], value: &T) -> Result<()> {
    txn.put_cf(cf, key, serde_json::to_vec(value)?)?;
    Ok(())
}

fn owner_key(owner: AccountOwner) -> String {
    format!("owner:{owner}")
}

fn order_no_key(order_no: &str) -> String {
    format!("order_no:{order_no}")
}

fn commission_key(order: OrderId) -> String {
    format!("commission:{order}")
}

fn payment_key(order: OrderId) -> String {
    format!("payment:{order}")
}

#[async_trait]
impl AccountStore for RocksDBStore {
    async fn create_account(&self, owner: AccountOwner) -> Result<Account> {
        let txn = self.db.transaction();
        let account = self.insert_account(&txn, owner)?;
        txn.commit()?;
        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        self.get(CF_ACCOUNTS, &id.0.to_be_bytes())
    }

    async fn find_account(&self, owner: AccountOwner) -> Result<Option<Account>> {
        match self.get::<u64>(CF_INDEXES, owner_key(owner).as_bytes())? {
            Some(id) => self.get(CF_ACCOUNTS, &id.to_be_bytes()),
            None => Ok(None),
        }
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        self.scan(CF_ACCOUNTS)
    }

    async fn apply_effect(&self, id: AccountId, effect: LedgerEffect) -> Result<Account> {
        let txn = self.db.transaction();
        let account = self.apply_locked(&txn, id, effect)?;
        txn.commit()?;
        Ok(account)
    }
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn insert_order(&self, mut order: Order) -> Result<Order> {
        let txn = self.db.transaction();
        let indexes = self.cf(CF_INDEXES)?;
        let no_key = order_no_key(&order.order_no);
        if read_locked::<u64>(&txn, indexes, no_key.as_bytes())?.is_some() {
            return Err(MarketError::Conflict(format!(
                "order number {} already used",
                order.order_no
            )));
        }
        order.id = OrderId(self.next_id(&txn)?);
        write(&txn, indexes, no_key.as_bytes(), &order.id.0)?;
        write(&txn, self.cf(CF_ORDERS)?, &order.id.0.to_be_bytes(), &order)?;
        txn.commit()?;
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        self.get(CF_ORDERS, &id.0.to_be_bytes())
    }

    async fn find_order_by_no(&self, order_no: &str) -> Result<Option<Order>> {
        match self.get::<u64>(CF_INDEXES, order_no_key(order_no).as_bytes())? {
            Some(id) => self.get(CF_ORDERS, &id.to_be_bytes()),
            None => Ok(None),
        }
    }

    async fn replace_order_if(&self, order: &Order, expected: OrderStatus) -> Result<bool> {
        let txn = self.db.transaction();
        let cf = self.cf(CF_ORDERS)?;
        let key = order.id.0.to_be_bytes();
        let stored: Order = read_locked(&txn, cf, &key)?
            .ok_or_else(|| MarketError::NotFound(format!("order {}", order.id)))?;
        if stored.status != expected {
            return Ok(false);
        }
        write(&txn, cf, &key, order)?;
        txn.commit()?;
        Ok(true)
    }

    async fn orders_by_tenant(&self, tenant: TenantId) -> Result<Vec<Order>> {
        let orders: Vec<Order> = self.scan(CF_ORDERS)?;
        Ok(orders.into_iter().filter(|o| o.tenant_id == tenant).collect())
    }

    async fn orders_by_assignee(&self, user: UserId) -> Result<Vec<Order>> {
        let orders: Vec<Order> = self.scan(CF_ORDERS)?;
        Ok(orders
            .into_iter()
            .filter(|o| o.assignee_user_id == Some(user))
            .collect())
    }
}

#[async_trait]
impl CommissionStore for RocksDBStore {
    async fn find_commission(&self, order: OrderId) -> Result<Option<Commission>> {
        match self.get::<u64>(CF_INDEXES, commission_key(order).as_bytes())? {
            Some(id) => self.get(CF_COMMISSIONS, &id.to_be_bytes()),
            None => Ok(None),
        }
    }

    async fn record_commission(&self, mut commission: Commission) -> Result<(Commission, Account)> {
        let txn = self.db.transaction();
        let indexes = self.cf(CF_INDEXES)?;
        let key = commission_key(commission.order_id);
        if read_locked::<u64>(&txn, indexes, key.as_bytes())?.is_some() {
            return Err(MarketError::AlreadyExists(format!(
                "commission for order {}",
                commission.order_id
            )));
        }

        let platform = match read_locked::<u64>(&txn, indexes, owner_key(AccountOwner::Platform).as_bytes())? {
            Some(id) => AccountId(id),
            None => self.insert_account(&txn, AccountOwner::Platform)?.id,
        };
        let account = if commission.platform_revenue.is_zero() {
            self.locked_account(&txn, platform)?
        } else {
            self.apply_locked(&txn, platform, LedgerEffect::Credit(commission.platform_revenue))?
        };

        commission.id = CommissionId(self.next_id(&txn)?);
        write(&txn, indexes, key.as_bytes(), &commission.id.0)?;
        write(&txn, self.cf(CF_COMMISSIONS)?, &commission.id.0.to_be_bytes(), &commission)?;
        txn.commit()?;
        Ok((commission, account))
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn insert_payment(&self, mut payment: Payment) -> Result<Payment> {
        let txn = self.db.transaction();
        let indexes = self.cf(CF_INDEXES)?;
        let key = payment_key(payment.order_id);
        if read_locked::<u64>(&txn, indexes, key.as_bytes())?.is_some() {
            return Err(MarketError::AlreadyExists(format!(
                "payment for order {}",
                payment.order_id
            )));
        }
        payment.id = PaymentId(self.next_id(&txn)?);
        write(&txn, indexes, key.as_bytes(), &payment.id.0)?;
        write(&txn, self.cf(CF_PAYMENTS)?, &payment.id.0.to_be_bytes(), &payment)?;
        txn.commit()?;
        Ok(payment)
    }

    async fn find_payment(&self, order: OrderId) -> Result<Option<Payment>> {
        match self.get::<u64>(CF_INDEXES, payment_key(order).as_bytes())? {
            Some(id) => self.get(CF_PAYMENTS, &id.to_be_bytes()),
            None => Ok(None),
        }
    }

    async fn replace_payment_if(&self, payment: &Payment, expected: PaymentStatus) -> Result<bool> {
        let txn = self.db.transaction();
        let cf = self.cf(CF_PAYMENTS)?;
        let key = payment.id.0.to_be_bytes();
        let stored: Payment = read_locked(&txn, cf, &key)?
            .ok_or_else(|| MarketError::NotFound(format!("payment {}", payment.id)))?;
        if stored.status != expected {
            return Ok(false);
        }
        write(&txn, cf, &key, payment)?;
        txn.commit()?;
        Ok(true)
    }
}

#[async_trait]
impl WithdrawalStore for RocksDBStore {
    async fn open_withdrawal(&self, mut withdrawal: Withdrawal) -> Result<(Withdrawal, Account)> {
        let txn = self.db.transaction();
        let account = self.apply_locked(&txn, withdrawal.account_id, withdrawal.reservation())?;
        withdrawal.id = WithdrawalId(self.next_id(&txn)?);
        write(&txn, self.cf(CF_WITHDRAWALS)?, &withdrawal.id.0.to_be_bytes(), &withdrawal)?;
        txn.commit()?;
        Ok((withdrawal, account))
    }

    async fn get_withdrawal(&self, id: WithdrawalId) -> Result<Option<Withdrawal>> {
        self.get(CF_WITHDRAWALS, &id.0.to_be_bytes())
    }

    async fn withdrawals_by_user(&self, user: UserId) -> Result<Vec<Withdrawal>> {
        let withdrawals: Vec<Withdrawal> = self.scan(CF_WITHDRAWALS)?;
        Ok(withdrawals.into_iter().filter(|w| w.user_id == user).collect())
    }

    async fn resolve_withdrawal(
        &self,
        withdrawal: &Withdrawal,
        expected: WithdrawalStatus,
        effect: Option<LedgerEffect>,
    ) -> Result<bool> {
        let txn = self.db.transaction();
        let cf = self.cf(CF_WITHDRAWALS)?;
        let key = withdrawal.id.0.to_be_bytes();
        let stored: Withdrawal = read_locked(&txn, cf, &key)?
            .ok_or_else(|| MarketError::NotFound(format!("withdrawal {}", withdrawal.id)))?;
        if stored.status != expected {
            return Ok(false);
        }
        if let Some(effect) = effect {
            self.apply_locked(&txn, withdrawal.account_id, effect)?;
        }
        write(&txn, cf, &key, withdrawal)?;
        txn.commit()?;
        Ok(true)
    }
}

#[async_trait]
impl ConfigStore for RocksDBStore {
    async fn config_entries(&self) -> Result<HashMap<String, String>> {
        let cf = self.cf(CF_CONFIG)?;
        let mut entries = HashMap::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| MarketError::Internal(Box::new(e)))?;
            entries.insert(key, serde_json::from_slice(&value)?);
        }
        Ok(entries)
    }

    async fn set_config(&self, key: &str, value: &str) -> Result<()> {
        let cf = self.cf(CF_CONFIG)?;
        self.db.put_cf(cf, key.as_bytes(), serde_json::to_vec(value)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::actor::Actor;
    use crate::domain::commission::FeeSchedule;
    use crate::domain::money::Money;
    use crate::domain::order::OrderDraft;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    async fn funded_account(store: &RocksDBStore, user: u64, amount: rust_decimal::Decimal) -> Account {
        let account = store
            .create_account(AccountOwner::User(UserId(user)))
            .await
            .unwrap();
        store
            .apply_effect(account.id, LedgerEffect::Credit(Money::new(amount)))
            .await
            .unwrap()
    }

    async fn completed_order(store: &RocksDBStore, order_no: &str) -> Order {
        let mut order = Order::create(
            TenantId(1),
            &Actor::tenant_staff(10, 1),
            order_no.to_string(),
            OrderDraft::with_amount(dec!(100)),
        )
        .unwrap();
        let worker = Actor::worker(20, Some(2));
        order.claim(&worker).unwrap();
        order.start(&worker).unwrap();
        order.complete(&worker).unwrap();
        store.insert_order(order).await.unwrap()
    }

    fn withdrawal(account: &Account, amount: rust_decimal::Decimal) -> Withdrawal {
        let AccountOwner::User(user) = account.owner else {
            panic!("withdrawals belong to users");
        };
        Withdrawal::request(
            user,
            account.id,
            Money::new(amount),
            Money::new(dec!(10)),
            serde_json::json!({"iban": "XX"}),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");
        for name in COLUMN_FAMILIES {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_rocksdb_ledger_round_trip() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let owner = AccountOwner::User(UserId(1));
        let account = store.create_account(owner).await.unwrap();
        assert!(matches!(
            store.create_account(owner).await,
            Err(MarketError::AlreadyExists(_))
        ));

        store
            .apply_effect(account.id, LedgerEffect::Credit(Money::new(dec!(100))))
            .await
            .unwrap();
        let err = store
            .apply_effect(account.id, LedgerEffect::Debit(Money::new(dec!(100.01))))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InsufficientBalance { .. }));

        let stored = store.find_account(owner).await.unwrap().unwrap();
        assert_eq!(stored.balance, Money::new(dec!(100)));
        assert_eq!(store.all_accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rocksdb_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            let order = Order::create(
                TenantId(1),
                &Actor::tenant_staff(10, 1),
                "HP7".into(),
                OrderDraft::with_amount(dec!(42)),
            )
            .unwrap();
            store.insert_order(order).await.unwrap();
            store.set_config("commission_rate", "0.2").await.unwrap();
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        let orders = store.orders_by_tenant(TenantId(1)).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_no, "HP7");
        let by_no = store.find_order_by_no("HP7").await.unwrap();
        assert_eq!(by_no.map(|o| o.id), Some(orders[0].id));
        assert!(store.find_order_by_no("HP8").await.unwrap().is_none());
        let entries = store.config_entries().await.unwrap();
        assert_eq!(entries.get("commission_rate").map(String::as_str), Some("0.2"));
    }

    #[tokio::test]
    async fn test_rocksdb_failed_freeze_leaves_no_withdrawal() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let account = funded_account(&store, 1, dec!(50)).await;

        let err = store
            .open_withdrawal(withdrawal(&account, dec!(60)))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InsufficientBalance { .. }));
        assert!(store.withdrawals_by_user(UserId(1)).await.unwrap().is_empty());
        let stored = store.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(stored.balance, Money::new(dec!(50)));
        assert_eq!(stored.frozen_amount, Money::ZERO);

        let (opened, frozen) = store
            .open_withdrawal(withdrawal(&account, dec!(20)))
            .await
            .unwrap();
        assert_eq!(frozen.balance, Money::new(dec!(30)));
        assert_eq!(frozen.frozen_amount, Money::new(dec!(20)));
        assert_eq!(store.get_withdrawal(opened.id).await.unwrap(), Some(opened));
    }

    #[tokio::test]
    async fn test_rocksdb_resolve_withdrawal_applies_effect() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let admin = Actor::platform_admin(1);
        let account = funded_account(&store, 1, dec!(100)).await;

        let (mut approved, _) = store
            .open_withdrawal(withdrawal(&account, dec!(30)))
            .await
            .unwrap();
        let (mut rejected, _) = store
            .open_withdrawal(withdrawal(&account, dec!(20)))
            .await
            .unwrap();

        let effect = approved.approve(&admin).unwrap();
        assert!(store
            .resolve_withdrawal(&approved, WithdrawalStatus::Pending, Some(effect))
            .await
            .unwrap());
        let effect = rejected.reject(&admin, "wrong iban".into()).unwrap();
        assert!(store
            .resolve_withdrawal(&rejected, WithdrawalStatus::Pending, Some(effect))
            .await
            .unwrap());

        let stored = store.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(stored.balance, Money::new(dec!(70)));
        assert_eq!(stored.frozen_amount, Money::ZERO);
        let stored_approved = store.get_withdrawal(approved.id).await.unwrap().unwrap();
        assert_eq!(stored_approved.status, WithdrawalStatus::Completed);
        let stored_rejected = store.get_withdrawal(rejected.id).await.unwrap().unwrap();
        assert_eq!(stored_rejected.status, WithdrawalStatus::Rejected);

        // A stale resolution neither writes the row nor moves money again.
        assert!(!store
            .resolve_withdrawal(&rejected, WithdrawalStatus::Pending, Some(effect))
            .await
            .unwrap());
        let stored = store.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(stored.balance, Money::new(dec!(70)));
    }

    #[tokio::test]
    async fn test_rocksdb_commission_is_recorded_once() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let order = completed_order(&store, "HP1").await;
        let quote = FeeSchedule::default().quote(order.amount).unwrap();
        let commission = Commission::from_quote(order.id, &order.order_no, dec!(0.10), &quote);

        let (recorded, platform) = store.record_commission(commission.clone()).await.unwrap();
        assert_eq!(platform.owner, AccountOwner::Platform);
        assert_eq!(platform.balance, Money::new(dec!(10)));
        assert_eq!(store.find_commission(order.id).await.unwrap(), Some(recorded));

        assert!(matches!(
            store.record_commission(commission).await,
            Err(MarketError::AlreadyExists(_))
        ));
        let platform = store
            .find_account(AccountOwner::Platform)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(platform.balance, Money::new(dec!(10)));
        assert_eq!(store.all_accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rocksdb_payment_is_unique_and_compare_and_set() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let order = completed_order(&store, "HP1").await;

        let payment = store
            .insert_payment(Payment::for_order(&order).unwrap())
            .await
            .unwrap();
        assert!(matches!(
            store.insert_payment(Payment::for_order(&order).unwrap()).await,
            Err(MarketError::AlreadyExists(_))
        ));

        let mut paid = payment.clone();
        paid.mark_paid("GW-1".into()).unwrap();
        assert!(store
            .replace_payment_if(&paid, PaymentStatus::Pending)
            .await
            .unwrap());
        let mut failed = payment;
        failed.mark_failed(Some("GW-2".into())).unwrap();
        assert!(!store
            .replace_payment_if(&failed, PaymentStatus::Pending)
            .await
            .unwrap());

        let stored = store.find_payment(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Paid);
        assert_eq!(stored.transaction_no.as_deref(), Some("GW-1"));
    }

    #[tokio::test]
    async fn test_rocksdb_stale_order_write_is_refused() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let order = Order::create(
            TenantId(1),
            &Actor::tenant_staff(10, 1),
            "HP1".into(),
            OrderDraft::with_amount(dec!(100)),
        )
        .unwrap();
        let order = store.insert_order(order).await.unwrap();

        let mut first = order.clone();
        first.claim(&Actor::worker(5, Some(2))).unwrap();
        let mut second = order;
        second.claim(&Actor::worker(6, Some(3))).unwrap();

        assert!(store
            .replace_order_if(&first, OrderStatus::Pending)
            .await
            .unwrap());
        assert!(!store
            .replace_order_if(&second, OrderStatus::Pending)
            .await
            .unwrap());
        let stored = store.get_order(first.id).await.unwrap().unwrap();
        assert_eq!(stored.assignee_user_id, Some(UserId(5)));
        assert_eq!(store.orders_by_assignee(UserId(6)).await.unwrap().len(), 0);
    }
}
