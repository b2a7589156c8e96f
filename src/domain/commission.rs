use super::money::Money;
use super::order::OrderId;
use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::config::DEFAULT_COMMISSION_RATE;

id_newtype!(CommissionId);

/// The one fee formula every money-affecting path goes through.
///
/// `total = commission + service + information + insurance`, never more than
/// the order amount. Service and insurance fees are rate based and clamped to
/// their configured floor/ceiling; a zero rate means no fee at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub commission_rate: Decimal,
    pub service_fee_rate: Decimal,
    pub service_fee_min: Money,
    pub service_fee_max: Option<Money>,
    pub information_fee: Money,
    pub insurance_fee_rate: Decimal,
    pub insurance_fee_min: Money,
    pub insurance_fee_max: Option<Money>,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            commission_rate: DEFAULT_COMMISSION_RATE,
            service_fee_rate: Decimal::ZERO,
            service_fee_min: Money::ZERO,
            service_fee_max: None,
            information_fee: Money::ZERO,
            insurance_fee_rate: Decimal::ZERO,
            insurance_fee_min: Money::ZERO,
            insurance_fee_max: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub order_amount: Money,
    pub commission: Money,
    pub service_fee: Money,
    pub information_fee: Money,
    pub insurance_fee: Money,
    pub total_fee: Money,
    pub worker_income: Money,
}

impl FeeSchedule {
    /// Fails with `Validation` when a fee or the fee total is out of range.
    pub fn quote(&self, amount: Money) -> Result<FeeBreakdown> {
        let commission = rated(amount, self.commission_rate)?;
        let service_fee = rated_fee(
            amount,
            self.service_fee_rate,
            self.service_fee_min,
            self.service_fee_max,
        )?;
        let insurance_fee = rated_fee(
            amount,
            self.insurance_fee_rate,
            self.insurance_fee_min,
            self.insurance_fee_max,
        )?;
        let information_fee = self.information_fee;

        let total_fee = [service_fee, information_fee, insurance_fee]
            .into_iter()
            .try_fold(commission, Money::checked_add)
            .ok_or_else(|| MarketError::Validation(format!("fees on {amount} overflow")))?
            .min(amount);
        let worker_income = amount.checked_sub(total_fee).unwrap_or(Money::ZERO);

        Ok(FeeBreakdown {
            order_amount: amount,
            commission,
            service_fee,
            information_fee,
            insurance_fee,
            total_fee,
            worker_income,
        })
    }
}

fn rated(amount: Money, rate: Decimal) -> Result<Money> {
    amount
        .apply_rate(rate)
        .ok_or_else(|| MarketError::Validation(format!("{amount} at rate {rate} overflows")))
}

fn rated_fee(amount: Money, rate: Decimal, min: Money, max: Option<Money>) -> Result<Money> {
    if rate.is_zero() {
        return Ok(Money::ZERO);
    }
    Ok(rated(amount, rate)?.clamp_between(min, max))
}

/// The platform's cut of one completed order. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commission {
    pub id: CommissionId,
    pub order_id: OrderId,
    pub order_amount: Money,
    pub commission_rate: Decimal,
    pub commission_amount: Money,
    pub service_fee: Money,
    pub information_fee: Money,
    pub insurance_fee: Money,
    /// Everything credited to the platform account for this order.
    pub platform_revenue: Money,
    /// Recorded for downstream payout; not credited by the commission engine.
    pub worker_income: Money,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Commission {
    /// Builds an unsaved commission; the store assigns `id`.
    pub fn from_quote(order_id: OrderId, order_no: &str, rate: Decimal, quote: &FeeBreakdown) -> Self {
        Self {
            id: CommissionId(0),
            order_id,
            order_amount: quote.order_amount,
            commission_rate: rate,
            commission_amount: quote.commission,
            service_fee: quote.service_fee,
            information_fee: quote.information_fee,
            insurance_fee: quote.insurance_fee,
            platform_revenue: quote.total_fee,
            worker_income: quote.worker_income,
            description: format!(
                "Order {order_no}: commission {} at rate {rate}",
                quote.commission
            ),
            created_at: Utc::now(),
        }
    }
}
