//! Order entity and its lifecycle.
//!
//! ```text
//! pending ──assign/claim──▶ assigned ──start──▶ in_progress ──complete──▶ completed
//!    │                         │                     │
//!    └─────────────cancel──────┴─────────────────────┴──────▶ cancelled
//! ```
//!
//! Each transition checks the current status first (`InvalidTransition`),
//! then the actor (`Forbidden`). Methods mutate only on success.

use super::actor::{Actor, Role, TenantId, UserId};
use super::money::Money;
use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

id_newtype!(OrderId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Statuses in which an assignee must be present.
    pub fn has_assignee(&self) -> bool {
        matches!(
            self,
            OrderStatus::Assigned | OrderStatus::InProgress | OrderStatus::Completed
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Assigned => "assigned",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Caller-supplied fields of a new order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub amount: Decimal,
    pub distance: Decimal,
    pub weight: Decimal,
    pub volume: Decimal,
    pub pickup_address: String,
    pub delivery_address: String,
    pub remark: Option<String>,
}

impl OrderDraft {
    pub fn with_amount(amount: Decimal) -> Self {
        Self {
            amount,
            ..Self::default()
        }
    }
}

/// Editable fields; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderPatch {
    pub amount: Option<Decimal>,
    pub distance: Option<Decimal>,
    pub weight: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub pickup_address: Option<String>,
    pub delivery_address: Option<String>,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_no: String,
    pub tenant_id: TenantId,
    pub creator_id: UserId,
    pub assignee_user_id: Option<UserId>,
    pub assignee_tenant_id: Option<TenantId>,
    pub amount: Money,
    pub distance: Decimal,
    pub weight: Decimal,
    pub volume: Decimal,
    pub pickup_address: String,
    pub delivery_address: String,
    pub remark: Option<String>,
    pub status: OrderStatus,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub assign_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub complete_time: Option<DateTime<Utc>>,
    pub cancel_time: Option<DateTime<Utc>>,
}

fn non_negative(field: &str, value: Decimal) -> Result<Decimal> {
    if value < Decimal::ZERO {
        Err(MarketError::Validation(format!(
            "{field} must not be negative, got {value}"
        )))
    } else {
        Ok(value)
    }
}

impl Order {
    /// Creates a `pending` order after checking that `actor` may post for `tenant`.
    /// The store assigns `id`.
    pub fn create(tenant: TenantId, actor: &Actor, order_no: String, draft: OrderDraft) -> Result<Self> {
        if !actor.is_member_of(tenant) && !actor.is_platform_admin() {
            return Err(MarketError::Forbidden(format!(
                "user {} cannot post orders for tenant {tenant}",
                actor.user_id
            )));
        }
        let now = Utc::now();
        Ok(Self {
            id: OrderId(0),
            order_no,
            tenant_id: tenant,
            creator_id: actor.user_id,
            assignee_user_id: None,
            assignee_tenant_id: None,
            amount: Money::positive(draft.amount)?,
            distance: non_negative("distance", draft.distance)?,
            weight: non_negative("weight", draft.weight)?,
            volume: non_negative("volume", draft.volume)?,
            pickup_address: draft.pickup_address,
            delivery_address: draft.delivery_address,
            remark: draft.remark,
            status: OrderStatus::Pending,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
            assign_time: None,
            start_time: None,
            complete_time: None,
            cancel_time: None,
        })
    }

    /// Platform dispatch: a platform admin hands the order to a worker.
    pub fn assign(&mut self, dispatcher: &Actor, assignee: &Actor) -> Result<()> {
        self.expect_status(OrderStatus::Pending, "assign")?;
        if !dispatcher.is_platform_admin() {
            return Err(MarketError::Forbidden(format!(
                "user {} cannot dispatch orders",
                dispatcher.user_id
            )));
        }
        self.accept_worker(assignee)
    }

    /// Direct claim: a worker takes a pending order for themself.
    pub fn claim(&mut self, worker: &Actor) -> Result<()> {
        self.expect_status(OrderStatus::Pending, "claim")?;
        self.accept_worker(worker)
    }

    fn accept_worker(&mut self, worker: &Actor) -> Result<()> {
        if worker.role != Role::Worker {
            return Err(MarketError::Forbidden(format!(
                "user {} is not a worker",
                worker.user_id
            )));
        }
        if worker.tenant_id == Some(self.tenant_id) {
            return Err(MarketError::Forbidden(format!(
                "worker {} belongs to tenant {}, which posted order {}",
                worker.user_id, self.tenant_id, self.order_no
            )));
        }
        let now = Utc::now();
        self.assignee_user_id = Some(worker.user_id);
        self.assignee_tenant_id = worker.tenant_id;
        self.assign_time = Some(now);
        self.status = OrderStatus::Assigned;
        self.updated_at = now;
        Ok(())
    }

    pub fn start(&mut self, actor: &Actor) -> Result<()> {
        self.expect_status(OrderStatus::Assigned, "start")?;
        self.expect_assignee(actor)?;
        let now = Utc::now();
        self.start_time = Some(now);
        self.status = OrderStatus::InProgress;
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(&mut self, actor: &Actor) -> Result<()> {
        self.expect_status(OrderStatus::InProgress, "complete")?;
        self.expect_assignee(actor)?;
        let now = Utc::now();
        self.complete_time = Some(now);
        self.status = OrderStatus::Completed;
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, actor: &Actor, reason: Option<String>) -> Result<()> {
        self.expect_open("cancel")?;
        self.expect_owner(actor)?;
        let now = Utc::now();
        self.assignee_user_id = None;
        self.assignee_tenant_id = None;
        self.cancel_reason = reason;
        self.cancel_time = Some(now);
        self.status = OrderStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    pub fn apply_patch(&mut self, actor: &Actor, patch: OrderPatch) -> Result<()> {
        self.expect_open("update")?;
        self.expect_owner(actor)?;

        // Validate everything before touching any field.
        let amount = patch.amount.map(Money::positive).transpose()?;
        let distance = patch.distance.map(|v| non_negative("distance", v)).transpose()?;
        let weight = patch.weight.map(|v| non_negative("weight", v)).transpose()?;
        let volume = patch.volume.map(|v| non_negative("volume", v)).transpose()?;

        if let Some(amount) = amount {
            self.amount = amount;
        }
        if let Some(distance) = distance {
            self.distance = distance;
        }
        if let Some(weight) = weight {
            self.weight = weight;
        }
        if let Some(volume) = volume {
            self.volume = volume;
        }
        if let Some(pickup) = patch.pickup_address {
            self.pickup_address = pickup;
        }
        if let Some(delivery) = patch.delivery_address {
            self.delivery_address = delivery;
        }
        if patch.remark.is_some() {
            self.remark = patch.remark;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    fn expect_status(&self, expected: OrderStatus, operation: &str) -> Result<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(MarketError::InvalidTransition(format!(
                "cannot {operation} order {} in status {} (requires {expected})",
                self.order_no, self.status
            )))
        }
    }

    fn expect_open(&self, operation: &str) -> Result<()> {
        if self.status.is_terminal() {
            Err(MarketError::InvalidTransition(format!(
                "cannot {operation} order {} in terminal status {}",
                self.order_no, self.status
            )))
        } else {
            Ok(())
        }
    }

    fn expect_assignee(&self, actor: &Actor) -> Result<()> {
        if actor.is_platform_admin() || self.assignee_user_id == Some(actor.user_id) {
            Ok(())
        } else {
            Err(MarketError::Forbidden(format!(
                "user {} is not the assignee of order {}",
                actor.user_id, self.order_no
            )))
        }
    }

    fn expect_owner(&self, actor: &Actor) -> Result<()> {
        if actor.is_platform_admin() || actor.is_member_of(self.tenant_id) {
            Ok(())
        } else {
            Err(MarketError::Forbidden(format!(
                "user {} cannot modify order {} of tenant {}",
                actor.user_id, self.order_no, self.tenant_id
            )))
        }
    }
}

/// Source of human-readable order numbers.
pub trait OrderNumberSource: Send + Sync {
    fn next_order_no(&self) -> String;
}

/// `HP` + UTC `YYYYMMDDHHMMSS` + six random digits.
///
/// Collisions are possible; callers retry on a uniqueness conflict.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomOrderNumbers;

impl OrderNumberSource for RandomOrderNumbers {
    fn next_order_no(&self) -> String {
        let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
        format!("HP{}{suffix:06}", Utc::now().format("%Y%m%d%H%M%S"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pending_order(tenant: u64) -> Order {
        Order::create(
            TenantId(tenant),
            &Actor::tenant_staff(100, tenant),
            "HP0001".to_string(),
            OrderDraft::with_amount(dec!(100)),
        )
        .unwrap()
    }

    fn assert_assignee_invariant(order: &Order) {
        assert_eq!(order.assignee_user_id.is_some(), order.status.has_assignee());
    }

    #[test]
    fn test_create_requires_tenant_membership() {
        let err = Order::create(
            TenantId(1),
            &Actor::tenant_staff(5, 2),
            "HP1".into(),
            OrderDraft::with_amount(dec!(10)),
        )
        .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));

        let err = Order::create(
            TenantId(1),
            &Actor::worker(5, Some(1)),
            "HP1".into(),
            OrderDraft::with_amount(dec!(10)),
        )
        .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));

        let order = pending_order(1);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.amount, Money::new(dec!(100)));
        assert_assignee_invariant(&order);
    }

    #[test]
    fn test_create_validates_draft() {
        let actor = Actor::tenant_admin(1, 1);
        let err = Order::create(TenantId(1), &actor, "HP1".into(), OrderDraft::with_amount(dec!(0)))
            .unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));

        let draft = OrderDraft {
            weight: dec!(-3),
            ..OrderDraft::with_amount(dec!(10))
        };
        let err = Order::create(TenantId(1), &actor, "HP1".into(), draft).unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));
    }

    #[test]
    fn test_claim_blocks_same_tenant_worker() {
        let mut order = pending_order(1);
        let err = order.claim(&Actor::worker(7, Some(1))).unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_assignee_invariant(&order);

        order.claim(&Actor::worker(8, Some(2))).unwrap();
        assert_eq!(order.status, OrderStatus::Assigned);
        assert_eq!(order.assignee_user_id, Some(UserId(8)));
        assert_eq!(order.assignee_tenant_id, Some(TenantId(2)));
        assert!(order.assign_time.is_some());
        assert_assignee_invariant(&order);
    }

    #[test]
    fn test_assign_requires_platform_dispatcher_and_worker() {
        let mut order = pending_order(1);
        let worker = Actor::worker(8, None);

        let err = order.assign(&Actor::tenant_admin(100, 1), &worker).unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));

        let err = order
            .assign(&Actor::platform_admin(1), &Actor::tenant_staff(9, 2))
            .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));

        order.assign(&Actor::platform_admin(1), &worker).unwrap();
        assert_eq!(order.status, OrderStatus::Assigned);

        let err = order.assign(&Actor::platform_admin(1), &worker).unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition(_)));
    }

    #[test]
    fn test_start_on_pending_is_invalid_transition() {
        let mut order = pending_order(1);
        let err = order.start(&Actor::worker(8, Some(2))).unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition(_)));
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_full_lifecycle_and_assignee_checks() {
        let mut order = pending_order(1);
        let worker = Actor::worker(8, Some(2));
        let stranger = Actor::worker(9, Some(3));
        order.claim(&worker).unwrap();

        assert!(matches!(order.start(&stranger), Err(MarketError::Forbidden(_))));
        order.start(&worker).unwrap();
        assert_eq!(order.status, OrderStatus::InProgress);

        assert!(matches!(order.complete(&stranger), Err(MarketError::Forbidden(_))));
        order.complete(&Actor::platform_admin(1)).unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert!(order.complete_time.is_some());
        assert_assignee_invariant(&order);

        assert!(matches!(
            order.complete(&worker),
            Err(MarketError::InvalidTransition(_))
        ));
        assert!(matches!(
            order.cancel(&Actor::platform_admin(1), None),
            Err(MarketError::InvalidTransition(_))
        ));
        assert!(matches!(
            order.apply_patch(&Actor::platform_admin(1), OrderPatch::default()),
            Err(MarketError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_cancel_clears_assignee() {
        let mut order = pending_order(1);
        order.claim(&Actor::worker(8, Some(2))).unwrap();

        let err = order.cancel(&Actor::worker(8, Some(2)), None).unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));

        order
            .cancel(&Actor::tenant_admin(101, 1), Some("truck broke down".into()))
            .unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.cancel_reason.as_deref(), Some("truck broke down"));
        assert_assignee_invariant(&order);
    }

    #[test]
    fn test_patch_is_all_or_nothing() {
        let mut order = pending_order(1);
        let actor = Actor::tenant_staff(100, 1);
        let bad = OrderPatch {
            amount: Some(dec!(250)),
            volume: Some(dec!(-1)),
            ..OrderPatch::default()
        };
        assert!(matches!(
            order.apply_patch(&actor, bad),
            Err(MarketError::Validation(_))
        ));
        assert_eq!(order.amount, Money::new(dec!(100)));

        let good = OrderPatch {
            amount: Some(dec!(250)),
            pickup_address: Some("Dock 4".into()),
            ..OrderPatch::default()
        };
        order.apply_patch(&actor, good).unwrap();
        assert_eq!(order.amount, Money::new(dec!(250)));
        assert_eq!(order.pickup_address, "Dock 4");
        assert_eq!(order.order_no, "HP0001");
    }

    #[test]
    fn test_random_order_numbers_shape() {
        let no = RandomOrderNumbers.next_order_no();
        assert!(no.starts_with("HP"));
        assert_eq!(no.len(), 2 + 14 + 6);
        assert!(no[2..].chars().all(|c| c.is_ascii_digit()));
    }
}
