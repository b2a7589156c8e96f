use crate::domain::commission::{Commission, FeeBreakdown};
use crate::domain::config::SystemConfig;
use crate::domain::money::Money;
use crate::domain::order::{OrderId, OrderStatus};
use crate::domain::ports::{CommissionStoreRef, ConfigStoreRef, OrderStoreRef};
use crate::error::{MarketError, Result};
use rust_decimal::Decimal;
use tracing::{info, instrument};

/// Computes the platform's cut of a completed order and books it.
///
/// Configuration is re-read on every call so a rate change applies to the
/// very next completion.
#[derive(Clone)]
pub struct CommissionEngine {
    orders: OrderStoreRef,
    commissions: CommissionStoreRef,
    config: ConfigStoreRef,
}

impl CommissionEngine {
    pub fn new(orders: OrderStoreRef, commissions: CommissionStoreRef, config: ConfigStoreRef) -> Self {
        Self {
            orders,
            commissions,
            config,
        }
    }

    pub async fn current_config(&self) -> Result<SystemConfig> {
        SystemConfig::from_entries(&self.config.config_entries().await?)
    }

    /// Fee preview for an arbitrary amount under the current configuration.
    pub async fn quote(&self, amount: Decimal) -> Result<FeeBreakdown> {
        let config = self.current_config().await?;
        config.fees.quote(Money::positive(amount)?)
    }

    pub async fn commission_for(&self, order_id: OrderId) -> Result<Option<Commission>> {
        self.commissions.find_commission(order_id).await
    }

    /// Books the commission of a completed order and credits the platform.
    ///
    /// Fails with `AlreadyExists` if the order was already charged; callers on
    /// a retry path treat that as success.
    #[instrument(skip_all, fields(order_id = %order_id))]
    pub async fn calculate_and_create(&self, order_id: OrderId) -> Result<Commission> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("order {order_id}")))?;
        if order.status != OrderStatus::Completed {
            return Err(MarketError::InvalidTransition(format!(
                "order {} is {}, commission is charged on completion",
                order.order_no, order.status
            )));
        }
        if self.commissions.find_commission(order_id).await?.is_some() {
            return Err(MarketError::AlreadyExists(format!(
                "commission for order {}",
                order.order_no
            )));
        }

        let config = self.current_config().await?;
        let quote = config.fees.quote(order.amount)?;
        let commission = Commission::from_quote(
            order.id,
            &order.order_no,
            config.fees.commission_rate,
            &quote,
        );

        let (commission, platform) = self.commissions.record_commission(commission).await?;
        info!(
            commission = %commission.commission_amount,
            platform_revenue = %commission.platform_revenue,
            worker_income = %commission.worker_income,
            platform_balance = %platform.balance,
            "Commission recorded"
        );
        Ok(commission)
    }
}
