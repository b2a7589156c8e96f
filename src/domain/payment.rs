use super::actor::{TenantId, UserId};
use super::money::Money;
use super::order::{Order, OrderId, OrderStatus};
use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

id_newtype!(PaymentId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        };
        f.write_str(name)
    }
}

/// Outcome reported by the external settlement callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementOutcome {
    Success,
    Failed,
}

/// Settlement record of one completed order; at most one per order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub payer_id: TenantId,
    pub payee_id: UserId,
    pub amount: Money,
    pub status: PaymentStatus,
    pub transaction_no: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Builds the pending payment for a completed order. The store assigns `id`.
    pub fn for_order(order: &Order) -> Result<Self> {
        if order.status != OrderStatus::Completed {
            return Err(MarketError::InvalidTransition(format!(
                "order {} is {}, payments are only raised for completed orders",
                order.order_no, order.status
            )));
        }
        let payee_id = order.assignee_user_id.ok_or_else(|| {
            MarketError::internal(format!("completed order {} has no assignee", order.order_no))
        })?;
        let now = Utc::now();
        Ok(Self {
            id: PaymentId(0),
            order_id: order.id,
            payer_id: order.tenant_id,
            payee_id,
            amount: order.amount,
            status: PaymentStatus::Pending,
            transaction_no: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// `pending | failed -> paid`. A failed payment may be re-settled.
    pub fn mark_paid(&mut self, transaction_no: String) -> Result<()> {
        match self.status {
            PaymentStatus::Pending | PaymentStatus::Failed => {
                let now = Utc::now();
                self.status = PaymentStatus::Paid;
                self.transaction_no = Some(transaction_no);
                self.paid_at = Some(now);
                self.updated_at = now;
                Ok(())
            }
            other => Err(self.invalid("mark paid", other)),
        }
    }

    /// `pending -> failed`.
    pub fn mark_failed(&mut self, transaction_no: Option<String>) -> Result<()> {
        match self.status {
            PaymentStatus::Pending => {
                self.status = PaymentStatus::Failed;
                if transaction_no.is_some() {
                    self.transaction_no = transaction_no;
                }
                self.updated_at = Utc::now();
                Ok(())
            }
            other => Err(self.invalid("mark failed", other)),
        }
    }

    fn invalid(&self, operation: &str, status: PaymentStatus) -> MarketError {
        MarketError::InvalidTransition(format!(
            "cannot {operation} payment for order {} in status {status}",
            self.order_id
        ))
    }
}

/// Transaction number for payments settled inside the platform.
pub fn internal_transaction_no(order_no: &str) -> String {
    format!("INT-{order_no}-{}", Utc::now().format("%Y%m%d%H%M%S"))
}
