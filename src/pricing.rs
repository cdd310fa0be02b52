use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationError;

/// Money amounts are carried at cent precision.
pub const MONEY_SCALE: u32 = 2;

/// Tax rates are stored as `numeric(5,4)`.
pub const TAX_RATE_SCALE: u32 = 4;

/// Largest unit or cost price a `numeric(12,2)` column holds.
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

/// Largest line total or order amount a `numeric(14,2)` column holds.
pub const MAX_ORDER_AMOUNT: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 2);

/// An order amount that does not fit its column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("order amount exceeds the maximum of {}", MAX_ORDER_AMOUNT)]
pub struct AmountOverflow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

fn bounded(amount: Option<Decimal>) -> Result<Decimal, AmountOverflow> {
    amount
        .map(round_money)
        .filter(|value| *value <= MAX_ORDER_AMOUNT)
        .ok_or(AmountOverflow)
}

pub fn line_total(quantity: i32, unit_price: Decimal) -> Result<Decimal, AmountOverflow> {
    bounded(Decimal::from(quantity).checked_mul(unit_price))
}

/// Sums `(quantity, unit_price)` lines and applies `tax_rate`.
pub fn compute_totals<I>(lines: I, tax_rate: Decimal) -> Result<OrderTotals, AmountOverflow>
where
    I: IntoIterator<Item = (i32, Decimal)>,
{
    let mut subtotal = Decimal::ZERO;
    for (quantity, unit_price) in lines {
        subtotal = bounded(subtotal.checked_add(line_total(quantity, unit_price)?))?;
    }
    let tax_amount = bounded(subtotal.checked_mul(tax_rate))?;

    Ok(OrderTotals {
        subtotal,
        tax_amount,
        total: bounded(subtotal.checked_add(tax_amount))?,
    })
}

/// `SO-YYYYMMDD-XXXXXX` with an uppercase alphanumeric suffix.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| char::from(c).to_ascii_uppercase())
        .collect();
    format!("SO-{}-{}", now.format("%Y%m%d"), suffix)
}

/// `validator` hook for prices and costs.
pub fn validate_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("must not be negative".into());
        return Err(err);
    }
    if amount.scale() > MONEY_SCALE {
        let mut err = ValidationError::new("money_scale");
        err.message = Some("at most two decimal places".into());
        return Err(err);
    }
    if *amount > MAX_UNIT_PRICE {
        let mut err = ValidationError::new("money_range");
        err.message = Some(format!("must not exceed {}", MAX_UNIT_PRICE).into());
        return Err(err);
    }
    Ok(())
}

/// `validator` hook for tax rates, a fraction in `0..=1` with at most four
/// decimal places.
pub fn validate_tax_rate(rate: &Decimal) -> Result<(), ValidationError> {
    if *rate < Decimal::ZERO || *rate > Decimal::ONE {
        let mut err = ValidationError::new("tax_rate_range");
        err.message = Some("must be between 0 and 1".into());
        return Err(err);
    }
    if rate.normalize().scale() > TAX_RATE_SCALE {
        let mut err = ValidationError::new("tax_rate_scale");
        err.message = Some("at most four decimal places".into());
        return Err(err);
    }
    Ok(())
}
