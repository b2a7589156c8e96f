//! Withdrawal requests.
//!
//! `pending -> processing` is an optional review checkpoint. Both `pending`
//! and `processing` resolve to exactly one of `completed` (frozen funds are
//! debited) or `rejected` (frozen funds are released).

use super::account::{AccountId, LedgerEffect};
use super::actor::{Actor, UserId};
use super::money::Money;
use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

id_newtype!(WithdrawalId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Rejected,
}

impl WithdrawalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalStatus::Completed | WithdrawalStatus::Rejected)
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Processing => "processing",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub user_id: UserId,
    pub account_id: AccountId,
    pub amount: Money,
    /// Payout destination, opaque to the core.
    pub account_info: serde_json::Value,
    pub status: WithdrawalStatus,
    pub remark: Option<String>,
    pub processed_by: Option<UserId>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Withdrawal {
    /// Builds an unsaved `pending` request. The store assigns `id` and freezes
    /// `amount` on `account_id` in the same atomic unit as the insert.
    pub fn request(
        user_id: UserId,
        account_id: AccountId,
        amount: Money,
        minimum: Money,
        account_info: serde_json::Value,
    ) -> Result<Self> {
        if amount.is_zero() {
            return Err(MarketError::Validation(
                "withdrawal amount must be positive".to_string(),
            ));
        }
        if amount < minimum {
            return Err(MarketError::Validation(format!(
                "withdrawal amount {amount} is below the minimum of {minimum}"
            )));
        }
        Ok(Self {
            id: WithdrawalId(0),
            user_id,
            account_id,
            amount,
            account_info,
            status: WithdrawalStatus::Pending,
            remark: None,
            processed_by: None,
            processed_at: None,
            created_at: Utc::now(),
        })
    }

    /// Ledger effect that must accompany the insert.
    pub fn reservation(&self) -> LedgerEffect {
        LedgerEffect::Freeze(self.amount)
    }

    pub fn mark_processing(&mut self, admin: &Actor) -> Result<()> {
        if self.status != WithdrawalStatus::Pending {
            return Err(self.invalid("start processing"));
        }
        self.stamp(admin, WithdrawalStatus::Processing)
    }

    /// Returns the ledger effect that must commit together with the new status.
    pub fn approve(&mut self, admin: &Actor) -> Result<LedgerEffect> {
        self.expect_unresolved("approve")?;
        self.stamp(admin, WithdrawalStatus::Completed)?;
        Ok(LedgerEffect::SettleFrozen(self.amount))
    }

    /// Returns the ledger effect that must commit together with the new status.
    pub fn reject(&mut self, admin: &Actor, reason: String) -> Result<LedgerEffect> {
        self.expect_unresolved("reject")?;
        self.stamp(admin, WithdrawalStatus::Rejected)?;
        self.remark = Some(reason);
        Ok(LedgerEffect::Unfreeze(self.amount))
    }

    fn expect_unresolved(&self, operation: &str) -> Result<()> {
        if self.status.is_terminal() {
            Err(self.invalid(operation))
        } else {
            Ok(())
        }
    }

    fn stamp(&mut self, admin: &Actor, status: WithdrawalStatus) -> Result<()> {
        if !admin.is_platform_admin() {
            return Err(MarketError::Forbidden(format!(
                "user {} cannot review withdrawals",
                admin.user_id
            )));
        }
        self.status = status;
        self.processed_by = Some(admin.user_id);
        self.processed_at = Some(Utc::now());
        Ok(())
    }

    fn invalid(&self, operation: &str) -> MarketError {
        MarketError::InvalidTransition(format!(
            "cannot {operation} withdrawal {} in status {}",
            self.id, self.status
        ))
    }
}
