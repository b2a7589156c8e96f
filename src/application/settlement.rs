use super::commission::CommissionEngine;
use crate::domain::commission::Commission;
use crate::domain::order::{Order, OrderId};
use crate::domain::payment::{Payment, PaymentStatus, SettlementOutcome, internal_transaction_no};
use crate::domain::ports::{OrderStoreRef, PaymentStoreRef};
use crate::error::{MarketError, Result};
use tracing::{debug, info, instrument, warn};

/// Payment state of an order and, once paid, its commission.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub payment: Payment,
    pub commission: Option<Commission>,
}

/// Bridges order completion to commission extraction.
///
/// Every entry point is idempotent: the payment row is unique per order and
/// the commission engine refuses to charge an order twice, so callers may
/// simply retry after any failure.
#[derive(Clone)]
pub struct SettlementService {
    orders: OrderStoreRef,
    payments: PaymentStoreRef,
    engine: CommissionEngine,
}

impl SettlementService {
    pub fn new(orders: OrderStoreRef, payments: PaymentStoreRef, engine: CommissionEngine) -> Self {
        Self {
            orders,
            payments,
            engine,
        }
    }

    pub fn engine(&self) -> &CommissionEngine {
        &self.engine
    }

    pub async fn payment_for(&self, order_id: OrderId) -> Result<Option<Payment>> {
        self.payments.find_payment(order_id).await
    }

    /// Settles a completed order inside the platform: raises the payment if
    /// needed, marks it paid and books the commission.
    #[instrument(skip_all, fields(order_id = %order_id))]
    pub async fn settle_order(&self, order_id: OrderId) -> Result<Settlement> {
        let order = self.load_order(order_id).await?;
        let payment = self.ensure_payment(&order).await?;
        let payment = match payment.status {
            PaymentStatus::Pending | PaymentStatus::Failed => {
                self.mark_paid(payment, internal_transaction_no(&order.order_no))
                    .await?
            }
            _ => payment,
        };
        self.charge_if_paid(payment).await
    }

    /// Applies an external settlement signal.
    #[instrument(skip_all, fields(order_id = %order_id, transaction_no = %transaction_no, outcome = ?outcome))]
    pub async fn handle_callback(
        &self,
        order_id: OrderId,
        transaction_no: String,
        outcome: SettlementOutcome,
    ) -> Result<Settlement> {
        let order = self.load_order(order_id).await?;
        let payment = self.ensure_payment(&order).await?;

        match (outcome, payment.status) {
            (_, PaymentStatus::Paid) => {
                debug!("Payment already paid, acknowledging callback");
                self.charge_if_paid(payment).await
            }
            (_, PaymentStatus::Refunded) => Err(MarketError::InvalidTransition(format!(
                "payment for order {} was refunded",
                order.order_no
            ))),
            (SettlementOutcome::Success, _) => {
                let payment = self.mark_paid(payment, transaction_no).await?;
                self.charge_if_paid(payment).await
            }
            (SettlementOutcome::Failed, PaymentStatus::Failed) => {
                debug!("Payment already failed, acknowledging callback");
                Ok(Settlement {
                    payment,
                    commission: None,
                })
            }
            (SettlementOutcome::Failed, PaymentStatus::Pending) => {
                let mut failed = payment;
                failed.mark_failed(Some(transaction_no))?;
                let payment = self.store_payment(failed, PaymentStatus::Pending).await?;
                warn!(status = %payment.status, "Settlement failed");
                Ok(Settlement {
                    payment,
                    commission: None,
                })
            }
        }
    }

    async fn load_order(&self, order_id: OrderId) -> Result<Order> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("order {order_id}")))
    }

    async fn ensure_payment(&self, order: &Order) -> Result<Payment> {
        if let Some(payment) = self.payments.find_payment(order.id).await? {
            return Ok(payment);
        }
        match self.payments.insert_payment(Payment::for_order(order)?).await {
            Ok(payment) => {
                info!(payment_id = %payment.id, amount = %payment.amount, "Payment raised");
                Ok(payment)
            }
            // A concurrent settlement raised it between our lookup and insert.
            Err(MarketError::AlreadyExists(_)) => self.reload_payment(order.id).await,
            Err(e) => Err(e),
        }
    }

    async fn mark_paid(&self, payment: Payment, transaction_no: String) -> Result<Payment> {
        let expected = payment.status;
        let mut paid = payment;
        paid.mark_paid(transaction_no)?;
        let payment = self.store_payment(paid, expected).await?;
        info!(transaction_no = ?payment.transaction_no, "Payment settled");
        Ok(payment)
    }

    /// Compare-and-set write; on a lost race returns whatever the winner stored.
    async fn store_payment(&self, payment: Payment, expected: PaymentStatus) -> Result<Payment> {
        if self.payments.replace_payment_if(&payment, expected).await? {
            Ok(payment)
        } else {
            self.reload_payment(payment.order_id).await
        }
    }

    async fn reload_payment(&self, order_id: OrderId) -> Result<Payment> {
        self.payments
            .find_payment(order_id)
            .await?
            .ok_or_else(|| MarketError::internal(format!("payment for order {order_id} vanished")))
    }

    async fn charge_if_paid(&self, payment: Payment) -> Result<Settlement> {
        if payment.status != PaymentStatus::Paid {
            return Ok(Settlement {
                payment,
                commission: None,
            });
        }
        let commission = match self.engine.calculate_and_create(payment.order_id).await {
            Ok(commission) => commission,
            Err(MarketError::AlreadyExists(_)) => self
                .engine
                .commission_for(payment.order_id)
                .await?
                .ok_or_else(|| {
                    MarketError::internal(format!(
                        "commission for order {} vanished",
                        payment.order_id
                    ))
                })?,
            Err(e) => return Err(e),
        };
        Ok(Settlement {
            payment,
            commission: Some(commission),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::AccountOwner;
    use crate::domain::actor::{Actor, TenantId};
    use crate::domain::money::Money;
    use crate::domain::order::OrderDraft;
    use crate::domain::ports::{AccountStore, OrderStore};
    use crate::infrastructure::in_memory::InMemoryStore;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn service(store: &InMemoryStore) -> SettlementService {
        let store = Arc::new(store.clone());
        let engine = CommissionEngine::new(store.clone(), store.clone(), store.clone());
        SettlementService::new(store.clone(), store, engine)
    }

    async fn completed_order(store: &InMemoryStore) -> Order {
        let mut order = Order::create(
            TenantId(1),
            &Actor::tenant_staff(10, 1),
            "HP100".into(),
            OrderDraft::with_amount(dec!(100)),
        )
        .unwrap();
        let worker = Actor::worker(20, Some(2));
        order.claim(&worker).unwrap();
        order.start(&worker).unwrap();
        order.complete(&worker).unwrap();
        store.insert_order(order).await.unwrap()
    }

    async fn platform_balance(store: &InMemoryStore) -> Money {
        store
            .find_account(AccountOwner::Platform)
            .await
            .unwrap()
            .map(|a| a.balance)
            .unwrap_or(Money::ZERO)
    }

    #[tokio::test]
    async fn test_settle_order_is_idempotent() {
        let store = InMemoryStore::new();
        let settlement = service(&store);
        let order = completed_order(&store).await;

        let first = settlement.settle_order(order.id).await.unwrap();
        assert_eq!(first.payment.status, PaymentStatus::Paid);
        assert!(first.payment.transaction_no.as_deref().unwrap().starts_with("INT-HP100-"));
        let commission = first.commission.unwrap();
        assert_eq!(commission.commission_amount, Money::new(dec!(10)));

        let second = settlement.settle_order(order.id).await.unwrap();
        assert_eq!(second.payment.id, first.payment.id);
        assert_eq!(second.commission.unwrap().id, commission.id);
        assert_eq!(platform_balance(&store).await, Money::new(dec!(10)));
    }

    #[tokio::test]
    async fn test_failed_callback_then_success() {
        let store = InMemoryStore::new();
        let settlement = service(&store);
        let order = completed_order(&store).await;

        let failed = settlement
            .handle_callback(order.id, "GW-1".into(), SettlementOutcome::Failed)
            .await
            .unwrap();
        assert_eq!(failed.payment.status, PaymentStatus::Failed);
        assert!(failed.commission.is_none());
        assert_eq!(platform_balance(&store).await, Money::ZERO);

        let paid = settlement
            .handle_callback(order.id, "GW-2".into(), SettlementOutcome::Success)
            .await
            .unwrap();
        assert_eq!(paid.payment.status, PaymentStatus::Paid);
        assert_eq!(paid.payment.transaction_no.as_deref(), Some("GW-2"));
        assert!(paid.commission.is_some());

        // Late duplicate callbacks change nothing.
        let again = settlement
            .handle_callback(order.id, "GW-3".into(), SettlementOutcome::Failed)
            .await
            .unwrap();
        assert_eq!(again.payment.status, PaymentStatus::Paid);
        assert_eq!(again.payment.transaction_no.as_deref(), Some("GW-2"));
        assert_eq!(platform_balance(&store).await, Money::new(dec!(10)));
    }

    #[tokio::test]
    async fn test_settlement_requires_completed_order() {
        let store = InMemoryStore::new();
        let settlement = service(&store);
        let open = Order::create(
            TenantId(1),
            &Actor::tenant_staff(10, 1),
            "HPOPEN".into(),
            OrderDraft::with_amount(dec!(100)),
        )
        .unwrap();
        let open = store.insert_order(open).await.unwrap();

        assert!(matches!(
            settlement.settle_order(open.id).await,
            Err(MarketError::InvalidTransition(_))
        ));
        assert!(settlement.payment_for(open.id).await.unwrap().is_none());
        assert!(matches!(
            settlement.settle_order(OrderId(404)).await,
            Err(MarketError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_settlements_charge_once() {
        let store = InMemoryStore::new();
        let settlement = service(&store);
        let order = completed_order(&store).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let settlement = settlement.clone();
            let order_id = order.id;
            handles.push(tokio::spawn(async move { settlement.settle_order(order_id).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(platform_balance(&store).await, Money::new(dec!(10)));
    }
}
