//! Typed system configuration.
//!
//! The configuration store hands back raw `key -> value` strings. They are
//! parsed and validated here, once per load, so business code only ever sees
//! `SystemConfig`.

use super::commission::FeeSchedule;
use super::money::Money;
use crate::error::{MarketError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, warn};

pub const COMMISSION_RATE: &str = "commission_rate";
pub const SERVICE_FEE_RATE: &str = "service_fee_rate";
pub const SERVICE_FEE_MIN: &str = "service_fee_min";
pub const SERVICE_FEE_MAX: &str = "service_fee_max";
pub const INFORMATION_FEE: &str = "information_fee";
pub const INSURANCE_FEE_RATE: &str = "insurance_fee_rate";
pub const INSURANCE_FEE_MIN: &str = "insurance_fee_min";
pub const INSURANCE_FEE_MAX: &str = "insurance_fee_max";
pub const MIN_WITHDRAWAL_AMOUNT: &str = "min_withdrawal_amount";

/// Platform cut applied when `commission_rate` is not configured.
pub const DEFAULT_COMMISSION_RATE: Decimal = dec!(0.10);
/// Smallest withdrawal accepted when `min_withdrawal_amount` is not configured.
pub const DEFAULT_MIN_WITHDRAWAL_AMOUNT: Decimal = dec!(10.00);

const KNOWN_KEYS: [&str; 9] = [
    COMMISSION_RATE,
    SERVICE_FEE_RATE,
    SERVICE_FEE_MIN,
    SERVICE_FEE_MAX,
    INFORMATION_FEE,
    INSURANCE_FEE_RATE,
    INSURANCE_FEE_MIN,
    INSURANCE_FEE_MAX,
    MIN_WITHDRAWAL_AMOUNT,
];

#[derive(Debug, Clone, PartialEq)]
pub struct SystemConfig {
    pub fees: FeeSchedule,
    pub min_withdrawal_amount: Money,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            fees: FeeSchedule::default(),
            min_withdrawal_amount: Money::new(DEFAULT_MIN_WITHDRAWAL_AMOUNT),
        }
    }
}

impl SystemConfig {
    /// Parses and validates raw entries.
    ///
    /// Missing `commission_rate` and `min_withdrawal_amount` fall back to their
    /// documented defaults with a warning. The optional fee components silently
    /// default to zero. Malformed or out-of-range values are errors.
    pub fn from_entries(entries: &HashMap<String, String>) -> Result<Self> {
        for key in entries.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                debug!(key = %key, "Ignoring unknown configuration key");
            }
        }

        let reader = EntryReader { entries };

        let commission_rate = match reader.rate(COMMISSION_RATE)? {
            Some(rate) => rate,
            None => {
                warn!(
                    key = COMMISSION_RATE,
                    default = %DEFAULT_COMMISSION_RATE,
                    "Configuration missing, applying default"
                );
                DEFAULT_COMMISSION_RATE
            }
        };
        let min_withdrawal_amount = match reader.money(MIN_WITHDRAWAL_AMOUNT)? {
            Some(amount) => amount,
            None => {
                warn!(
                    key = MIN_WITHDRAWAL_AMOUNT,
                    default = %DEFAULT_MIN_WITHDRAWAL_AMOUNT,
                    "Configuration missing, applying default"
                );
                Money::new(DEFAULT_MIN_WITHDRAWAL_AMOUNT)
            }
        };

        let fees = FeeSchedule {
            commission_rate,
            service_fee_rate: reader.rate(SERVICE_FEE_RATE)?.unwrap_or_default(),
            service_fee_min: reader.money(SERVICE_FEE_MIN)?.unwrap_or_default(),
            service_fee_max: reader.money(SERVICE_FEE_MAX)?,
            information_fee: reader.money(INFORMATION_FEE)?.unwrap_or_default(),
            insurance_fee_rate: reader.rate(INSURANCE_FEE_RATE)?.unwrap_or_default(),
            insurance_fee_min: reader.money(INSURANCE_FEE_MIN)?.unwrap_or_default(),
            insurance_fee_max: reader.money(INSURANCE_FEE_MAX)?,
        };
        check_bounds(SERVICE_FEE_MAX, fees.service_fee_min, fees.service_fee_max)?;
        check_bounds(INSURANCE_FEE_MAX, fees.insurance_fee_min, fees.insurance_fee_max)?;

        Ok(Self {
            fees,
            min_withdrawal_amount,
        })
    }
}

fn check_bounds(key: &str, min: Money, max: Option<Money>) -> Result<()> {
    match max {
        Some(max) if max < min => Err(MarketError::InvalidConfiguration {
            key: key.to_string(),
            reason: format!("maximum {max} is below minimum {min}"),
        }),
        _ => Ok(()),
    }
}

struct EntryReader<'a> {
    entries: &'a HashMap<String, String>,
}

impl EntryReader<'_> {
    fn decimal(&self, key: &str) -> Result<Option<Decimal>> {
        let Some(raw) = self.entries.get(key) else {
            return Ok(None);
        };
        Decimal::from_str(raw.trim())
            .map(Some)
            .map_err(|e| MarketError::InvalidConfiguration {
                key: key.to_string(),
                reason: format!("`{raw}` is not a decimal: {e}"),
            })
    }

    fn rate(&self, key: &str) -> Result<Option<Decimal>> {
        match self.decimal(key)? {
            Some(rate) if rate < Decimal::ZERO || rate > Decimal::ONE => {
                Err(MarketError::InvalidConfiguration {
                    key: key.to_string(),
                    reason: format!("rate {rate} is outside [0, 1]"),
                })
            }
            other => Ok(other),
        }
    }

    fn money(&self, key: &str) -> Result<Option<Money>> {
        match self.decimal(key)? {
            Some(value) if value < Decimal::ZERO => Err(MarketError::InvalidConfiguration {
                key: key.to_string(),
                reason: format!("amount {value} is negative"),
            }),
            other => Ok(other.map(Money::new)),
        }
    }
}
