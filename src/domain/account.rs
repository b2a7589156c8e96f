use super::actor::{TenantId, UserId};
use super::money::Money;
use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

id_newtype!(AccountId);

/// Who an account belongs to. Exactly one owner per account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum AccountOwner {
    User(UserId),
    Tenant(TenantId),
    Platform,
}

impl fmt::Display for AccountOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountOwner::User(id) => write!(f, "user:{id}"),
            AccountOwner::Tenant(id) => write!(f, "tenant:{id}"),
            AccountOwner::Platform => f.write_str("platform"),
        }
    }
}

impl FromStr for AccountOwner {
    type Err = MarketError;

    /// Parses the `Display` form: `user:<id>`, `tenant:<id>` or `platform`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "platform" {
            return Ok(AccountOwner::Platform);
        }
        let invalid = || MarketError::Validation(format!("unknown account owner `{s}`"));
        let (kind, id) = s.split_once(':').ok_or_else(invalid)?;
        let id: u64 = id.trim().parse().map_err(|_| invalid())?;
        match kind {
            "user" => Ok(AccountOwner::User(UserId(id))),
            "tenant" => Ok(AccountOwner::Tenant(TenantId(id))),
            _ => Err(invalid()),
        }
    }
}

/// A single balance mutation. Stores apply these atomically per account row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "amount", rename_all = "snake_case")]
pub enum LedgerEffect {
    /// `balance += amount`
    Credit(Money),
    /// `balance -= amount`
    Debit(Money),
    /// `balance -> frozen_amount`
    Freeze(Money),
    /// `frozen_amount -> balance`
    Unfreeze(Money),
    /// `frozen_amount -= amount`, the permanent half of a freeze.
    SettleFrozen(Money),
}

impl LedgerEffect {
    pub fn amount(&self) -> Money {
        match *self {
            LedgerEffect::Credit(m)
            | LedgerEffect::Debit(m)
            | LedgerEffect::Freeze(m)
            | LedgerEffect::Unfreeze(m)
            | LedgerEffect::SettleFrozen(m) => m,
        }
    }
}

/// The ledger record of one owner.
///
/// `balance` is the spendable amount; `frozen_amount` is reserved for pending
/// withdrawals and is not included in `balance`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Account {
    pub id: AccountId,
    pub owner: AccountOwner,
    pub balance: Money,
    pub frozen_amount: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(id: AccountId, owner: AccountOwner) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner,
            balance: Money::ZERO,
            frozen_amount: Money::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies `effect` or leaves the account untouched on error.
    pub fn apply(&mut self, effect: LedgerEffect) -> Result<()> {
        let amount = effect.amount();
        if amount.is_zero() {
            return Err(MarketError::Validation(
                "ledger amount must be positive".to_string(),
            ));
        }
        match effect {
            LedgerEffect::Credit(amount) => self.increase_balance(amount)?,
            LedgerEffect::Debit(amount) => self.decrease_balance(amount)?,
            LedgerEffect::Freeze(amount) => self.freeze(amount)?,
            LedgerEffect::Unfreeze(amount) => self.unfreeze(amount)?,
            LedgerEffect::SettleFrozen(amount) => self.settle_frozen(amount)?,
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    fn increase_balance(&mut self, amount: Money) -> Result<()> {
        self.balance = self.add_checked(self.balance, amount, "balance")?;
        Ok(())
    }

    fn decrease_balance(&mut self, amount: Money) -> Result<()> {
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or_else(|| self.insufficient_balance(amount))?;
        Ok(())
    }

    fn freeze(&mut self, amount: Money) -> Result<()> {
        let balance = self
            .balance
            .checked_sub(amount)
            .ok_or_else(|| self.insufficient_balance(amount))?;
        let frozen = self.add_checked(self.frozen_amount, amount, "frozen amount")?;
        self.balance = balance;
        self.frozen_amount = frozen;
        Ok(())
    }

    fn unfreeze(&mut self, amount: Money) -> Result<()> {
        let frozen = self
            .frozen_amount
            .checked_sub(amount)
            .ok_or_else(|| self.insufficient_frozen(amount))?;
        let balance = self.add_checked(self.balance, amount, "balance")?;
        self.frozen_amount = frozen;
        self.balance = balance;
        Ok(())
    }

    fn settle_frozen(&mut self, amount: Money) -> Result<()> {
        self.frozen_amount = self
            .frozen_amount
            .checked_sub(amount)
            .ok_or_else(|| self.insufficient_frozen(amount))?;
        Ok(())
    }

    fn add_checked(&self, current: Money, amount: Money, field: &str) -> Result<Money> {
        current.checked_add(amount).ok_or_else(|| {
            MarketError::Validation(format!(
                "adding {amount} would overflow the {field} of account {}",
                self.id
            ))
        })
    }

    fn insufficient_balance(&self, requested: Money) -> MarketError {
        MarketError::InsufficientBalance {
            requested: requested.to_string(),
            available: self.balance.to_string(),
        }
    }

    fn insufficient_frozen(&self, requested: Money) -> MarketError {
        MarketError::InsufficientFrozen {
            requested: requested.to_string(),
            frozen: self.frozen_amount.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn funded(balance: rust_decimal::Decimal) -> Account {
        let mut account = Account::new(AccountId(1), AccountOwner::User(UserId(1)));
        account.balance = Money::new(balance);
        account
    }

    #[test]
    fn test_owner_parses_its_display_form() {
        for owner in [
            AccountOwner::User(UserId(4)),
            AccountOwner::Tenant(TenantId(2)),
            AccountOwner::Platform,
        ] {
            assert_eq!(owner.to_string().parse::<AccountOwner>().unwrap(), owner);
        }
        assert!("user:x".parse::<AccountOwner>().is_err());
        assert!("bank:1".parse::<AccountOwner>().is_err());
        assert!("".parse::<AccountOwner>().is_err());
    }

    #[test]
    fn test_credit_and_debit() {
        let mut account = funded(dec!(10));
        account.apply(LedgerEffect::Credit(Money::new(dec!(5.5)))).unwrap();
        assert_eq!(account.balance, Money::new(dec!(15.5)));

        account.apply(LedgerEffect::Debit(Money::new(dec!(15.5)))).unwrap();
        assert_eq!(account.balance, Money::ZERO);
    }

    #[test]
    fn test_debit_insufficient_leaves_account_untouched() {
        let mut account = funded(dec!(10));
        let before = account.clone();
        let result = account.apply(LedgerEffect::Debit(Money::new(dec!(10.01))));
        assert!(matches!(result, Err(MarketError::InsufficientBalance { .. })));
        assert_eq!(account, before);
    }

    #[test]
    fn test_freeze_moves_funds_out_of_balance() {
        let mut account = funded(dec!(100));
        account.apply(LedgerEffect::Freeze(Money::new(dec!(40)))).unwrap();
        assert_eq!(account.balance, Money::new(dec!(60)));
        assert_eq!(account.frozen_amount, Money::new(dec!(40)));

        let result = account.apply(LedgerEffect::Freeze(Money::new(dec!(60.01))));
        assert!(matches!(result, Err(MarketError::InsufficientBalance { .. })));
        assert_eq!(account.frozen_amount, Money::new(dec!(40)));
    }

    #[test]
    fn test_freeze_then_unfreeze_restores_exactly() {
        let mut account = funded(dec!(33.33));
        for _ in 0..100 {
            account.apply(LedgerEffect::Freeze(Money::new(dec!(0.07)))).unwrap();
            account.apply(LedgerEffect::Unfreeze(Money::new(dec!(0.07)))).unwrap();
        }
        assert_eq!(account.balance, Money::new(dec!(33.33)));
        assert_eq!(account.frozen_amount, Money::ZERO);
    }

    #[test]
    fn test_unfreeze_and_settle_require_frozen_funds() {
        let mut account = funded(dec!(100));
        assert!(matches!(
            account.apply(LedgerEffect::Unfreeze(Money::new(dec!(1)))),
            Err(MarketError::InsufficientFrozen { .. })
        ));
        assert!(matches!(
            account.apply(LedgerEffect::SettleFrozen(Money::new(dec!(1)))),
            Err(MarketError::InsufficientFrozen { .. })
        ));

        account.apply(LedgerEffect::Freeze(Money::new(dec!(40)))).unwrap();
        account.apply(LedgerEffect::SettleFrozen(Money::new(dec!(40)))).unwrap();
        assert_eq!(account.balance, Money::new(dec!(60)));
        assert_eq!(account.frozen_amount, Money::ZERO);
    }

    #[test]
    fn test_credit_overflow_is_rejected_without_change() {
        let top = dec!(792281625142643375935439503.35);
        let mut account = funded(top);

        let result = account.apply(LedgerEffect::Credit(Money::new(dec!(0.01))));
        assert!(matches!(result, Err(MarketError::Validation(_))));
        assert_eq!(account.balance, Money::new(top));

        account.frozen_amount = Money::new(dec!(5));
        let result = account.apply(LedgerEffect::Unfreeze(Money::new(dec!(1))));
        assert!(matches!(result, Err(MarketError::Validation(_))));
        assert_eq!(account.balance, Money::new(top));
        assert_eq!(account.frozen_amount, Money::new(dec!(5)));
    }

    #[test]
    fn test_zero_amount_rejected() {
        let mut account = funded(dec!(1));
        assert!(matches!(
            account.apply(LedgerEffect::Credit(Money::ZERO)),
            Err(MarketError::Validation(_))
        ));
    }

    #[test]
    fn test_owner_serialization() {
        let json = serde_json::to_string(&AccountOwner::Tenant(TenantId(3))).unwrap();
        assert_eq!(json, r#"{"type":"tenant","id":3}"#);
        let json = serde_json::to_string(&AccountOwner::Platform).unwrap();
        assert_eq!(json, r#"{"type":"platform"}"#);
    }
}
