use super::settlement::{Settlement, SettlementService};
use crate::domain::actor::{Actor, TenantId, UserId};
use crate::domain::order::{Order, OrderDraft, OrderId, OrderNumberSource, OrderPatch, OrderStatus};
use crate::domain::ports::OrderStoreRef;
use crate::error::{MarketError, Result};
use std::sync::Arc;
use tracing::{info, instrument, warn};

const ORDER_NO_ATTEMPTS: usize = 5;

/// Result of a successful completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub order: Order,
    pub settlement: Settlement,
}

/// Drives orders through their lifecycle.
///
/// Each transition loads the order, lets the entity validate and mutate it,
/// then writes it back only if the stored status is still the one the
/// transition started from.
#[derive(Clone)]
pub struct OrderService {
    orders: OrderStoreRef,
    numbers: Arc<dyn OrderNumberSource>,
    settlement: SettlementService,
}

impl OrderService {
    pub fn new(
        orders: OrderStoreRef,
        numbers: Arc<dyn OrderNumberSource>,
        settlement: SettlementService,
    ) -> Self {
        Self {
            orders,
            numbers,
            settlement,
        }
    }

    #[instrument(skip_all, fields(tenant = %tenant, actor = %actor.user_id))]
    pub async fn create(&self, tenant: TenantId, actor: &Actor, draft: OrderDraft) -> Result<Order> {
        for attempt in 1..=ORDER_NO_ATTEMPTS {
            let order = Order::create(tenant, actor, self.numbers.next_order_no(), draft.clone())?;
            match self.orders.insert_order(order).await {
                Ok(order) => {
                    info!(order_id = %order.id, order_no = %order.order_no, amount = %order.amount, "Order created");
                    return Ok(order);
                }
                Err(MarketError::Conflict(reason)) => {
                    warn!(attempt, %reason, "Order number taken, regenerating");
                }
                Err(e) => return Err(e),
            }
        }
        Err(MarketError::internal(format!(
            "no free order number after {ORDER_NO_ATTEMPTS} attempts"
        )))
    }

    #[instrument(skip_all, fields(order_id = %order_id, dispatcher = %dispatcher.user_id, assignee = %assignee.user_id))]
    pub async fn assign(&self, order_id: OrderId, dispatcher: &Actor, assignee: &Actor) -> Result<Order> {
        self.transition(order_id, "assign", |order| order.assign(dispatcher, assignee))
            .await
    }

    #[instrument(skip_all, fields(order_id = %order_id, worker = %worker.user_id))]
    pub async fn claim(&self, order_id: OrderId, worker: &Actor) -> Result<Order> {
        self.transition(order_id, "claim", |order| order.claim(worker)).await
    }

    #[instrument(skip_all, fields(order_id = %order_id, actor = %actor.user_id))]
    pub async fn start(&self, order_id: OrderId, actor: &Actor) -> Result<Order> {
        self.transition(order_id, "start", |order| order.start(actor)).await
    }

    /// Commits the completion, then settles the order.
    ///
    /// The completion stands even when settlement fails; the error is then
    /// `SettlementPending` and [`OrderService::settle`] can be retried.
    #[instrument(skip_all, fields(order_id = %order_id, actor = %actor.user_id))]
    pub async fn complete(&self, order_id: OrderId, actor: &Actor) -> Result<Completion> {
        let order = self
            .transition(order_id, "complete", |order| order.complete(actor))
            .await?;
        let settlement = self.settle_completed(order.id).await?;
        Ok(Completion { order, settlement })
    }

    /// Retries settlement of a completed order.
    ///
    /// A missing order is `NotFound` and an order that is not completed is
    /// `InvalidTransition`; only failures past that point are
    /// `SettlementPending`.
    #[instrument(skip_all, fields(order_id = %order_id))]
    pub async fn settle(&self, order_id: OrderId) -> Result<Settlement> {
        let order = self.get(order_id).await?;
        if order.status != OrderStatus::Completed {
            return Err(MarketError::InvalidTransition(format!(
                "order {} is {}, only completed orders settle",
                order.order_no, order.status
            )));
        }
        self.settle_completed(order.id).await
    }

    async fn settle_completed(&self, order_id: OrderId) -> Result<Settlement> {
        self.settlement.settle_order(order_id).await.map_err(|e| {
            warn!(order_id = %order_id, error = %e, "Settlement left pending");
            MarketError::SettlementPending {
                order_id: order_id.0,
                source: Box::new(e),
            }
        })
    }

    #[instrument(skip_all, fields(order_id = %order_id, actor = %actor.user_id))]
    pub async fn cancel(&self, order_id: OrderId, actor: &Actor, reason: Option<String>) -> Result<Order> {
        self.transition(order_id, "cancel", |order| order.cancel(actor, reason))
            .await
    }

    #[instrument(skip_all, fields(order_id = %order_id, actor = %actor.user_id))]
    pub async fn update(&self, order_id: OrderId, actor: &Actor, patch: OrderPatch) -> Result<Order> {
        self.transition(order_id, "update", |order| order.apply_patch(actor, patch))
            .await
    }

    pub async fn get(&self, order_id: OrderId) -> Result<Order> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("order {order_id}")))
    }

    pub async fn find_by_order_no(&self, order_no: &str) -> Result<Order> {
        self.orders
            .find_order_by_no(order_no)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("order {order_no}")))
    }

    pub async fn list_by_tenant(&self, tenant: TenantId) -> Result<Vec<Order>> {
        self.orders.orders_by_tenant(tenant).await
    }

    pub async fn list_by_assignee(&self, user: UserId) -> Result<Vec<Order>> {
        self.orders.orders_by_assignee(user).await
    }

    async fn transition<F>(&self, order_id: OrderId, operation: &str, change: F) -> Result<Order>
    where
        F: FnOnce(&mut Order) -> Result<()>,
    {
        let mut order = self.get(order_id).await?;
        let expected: OrderStatus = order.status;
        change(&mut order)?;

        if !self.orders.replace_order_if(&order, expected).await? {
            return Err(MarketError::InvalidTransition(format!(
                "order {} changed concurrently, {operation} not applied",
                order.order_no
            )));
        }
        info!(order_no = %order.order_no, from = %expected, to = %order.status, "Order {operation}");
        Ok(order)
    }
}
