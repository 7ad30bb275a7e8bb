//! Money
//!
//! Amounts are stored and serialized as minor units of the cart's currency.
//! Arithmetic on them happens on [`Money`] in that currency and is rounded back
//! to minor units half away from zero.

use rust_decimal::Decimal;
use rusty_money::{
    Money, MoneyError, Round,
    iso::{self, Currency},
};
use thiserror::Error;

/// An amount in an ISO 4217 currency.
pub type Amount = Money<'static, Currency>;

/// Money arithmetic failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmountError {
    /// The amount does not fit in minor units.
    #[error("amount overflowed")]
    Overflow,

    /// A result below zero.
    #[error("amount must not be negative")]
    Negative,

    /// Any other arithmetic failure.
    #[error("money arithmetic failed: {0}")]
    Money(String),
}

impl From<MoneyError> for AmountError {
    fn from(err: MoneyError) -> Self {
        match err {
            MoneyError::Overflow => Self::Overflow,
            other => Self::Money(other.to_string()),
        }
    }
}

/// Look up an ISO 4217 currency by its alphabetic code, ignoring case.
#[must_use]
pub fn currency(code: &str) -> Option<&'static Currency> {
    iso::find(&code.trim().to_uppercase())
}

/// `minor` units of `currency`.
///
/// # Errors
///
/// Returns [`AmountError::Overflow`] if `minor` does not fit the decimal range.
pub fn from_minor(minor: u64, currency: &'static Currency) -> Result<Amount, AmountError> {
    let minor = i64::try_from(minor).map_err(|_err| AmountError::Overflow)?;

    Ok(Money::try_from_minor(minor, currency)?)
}

/// Round `amount` to its currency's minor unit and return it as minor units.
///
/// # Errors
///
/// Returns [`AmountError::Negative`] below zero or [`AmountError::Overflow`] if
/// the result does not fit.
pub fn to_minor(amount: &Amount) -> Result<u64, AmountError> {
    let minor = amount
        .round(amount.currency().exponent, Round::HalfUp)
        .try_to_minor_units()?;

    u64::try_from(minor).map_err(|_err| AmountError::Negative)
}

/// `percentage` percent of `amount`, rounded to a minor unit half away from
/// zero.
///
/// # Errors
///
/// Returns [`AmountError::Overflow`] if the product cannot be represented.
pub fn percent_of(percentage: Decimal, amount: &Amount) -> Result<Amount, AmountError> {
    let fraction = percentage
        .checked_div(Decimal::ONE_HUNDRED)
        .ok_or(AmountError::Overflow)?;

    Ok(amount
        .mul(fraction)?
        .round(amount.currency().exponent, Round::HalfUp))
}

/// The smaller of two amounts in the same currency.
///
/// # Errors
///
/// Returns [`AmountError::Money`] on a currency mismatch.
pub fn min(left: Amount, right: Amount) -> Result<Amount, AmountError> {
    Ok(if left.gt(&right)? { right } else { left })
}
