//! Conversions between Bolívares and the two quoted currencies.

use crate::core::locale::{format_amount, round_currency};
use crate::core::rates::{Currency, RateSnapshot};
use rust_decimal::Decimal;
use std::fmt::Display;
use std::str::FromStr;

pub const LOCAL_UNIT: &str = "Bs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    UsdToLocal,
    EurToLocal,
    LocalToUsd,
    LocalToEur,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::UsdToLocal,
        Direction::EurToLocal,
        Direction::LocalToUsd,
        Direction::LocalToEur,
    ];

    pub fn currency(&self) -> Currency {
        match self {
            Direction::UsdToLocal | Direction::LocalToUsd => Currency::Usd,
            Direction::EurToLocal | Direction::LocalToEur => Currency::Eur,
        }
    }

    pub fn source_unit(&self) -> &'static str {
        match self {
            Direction::UsdToLocal => "USD",
            Direction::EurToLocal => "EUR",
            Direction::LocalToUsd | Direction::LocalToEur => LOCAL_UNIT,
        }
    }

    pub fn target_unit(&self) -> &'static str {
        match self {
            Direction::UsdToLocal | Direction::EurToLocal => LOCAL_UNIT,
            Direction::LocalToUsd => "USD",
            Direction::LocalToEur => "EUR",
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} → {}", self.source_unit(), self.target_unit())
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "USD" => Ok(Direction::UsdToLocal),
            "EUR" => Ok(Direction::EurToLocal),
            "BS" | "BS-USD" => Ok(Direction::LocalToUsd),
            "BS-EUR" => Ok(Direction::LocalToEur),
            _ => Err(anyhow::anyhow!("Invalid conversion direction: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedAmount {
    pub direction: Direction,
    pub amount: Decimal,
    pub formatted: String,
}

impl ConvertedAmount {
    fn new(direction: Direction, amount: Decimal) -> Self {
        let amount = round_currency(amount);
        Self {
            direction,
            formatted: format!("{} {}", format_amount(amount), direction.target_unit()),
            amount,
        }
    }

    fn zero(direction: Direction) -> Self {
        Self::new(direction, Decimal::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}

/// The four conversion outputs, always all present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult {
    pub usd_to_local: ConvertedAmount,
    pub eur_to_local: ConvertedAmount,
    pub local_to_usd: ConvertedAmount,
    pub local_to_eur: ConvertedAmount,
}

impl ConversionResult {
    /// `"0,00"` plus the unit in every direction.
    pub fn zero() -> Self {
        Self {
            usd_to_local: ConvertedAmount::zero(Direction::UsdToLocal),
            eur_to_local: ConvertedAmount::zero(Direction::EurToLocal),
            local_to_usd: ConvertedAmount::zero(Direction::LocalToUsd),
            local_to_eur: ConvertedAmount::zero(Direction::LocalToEur),
        }
    }

    pub fn get(&self, direction: Direction) -> &ConvertedAmount {
        match direction {
            Direction::UsdToLocal => &self.usd_to_local,
            Direction::EurToLocal => &self.eur_to_local,
            Direction::LocalToUsd => &self.local_to_usd,
            Direction::LocalToEur => &self.local_to_eur,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConvertedAmount> {
        Direction::ALL.into_iter().map(|d| self.get(d))
    }
}

impl Default for ConversionResult {
    fn default() -> Self {
        Self::zero()
    }
}

fn positive_rate(snapshot: &RateSnapshot, currency: Currency) -> Option<Decimal> {
    snapshot
        .quote(currency)
        .map(|q| q.value())
        .filter(|rate| *rate > Decimal::ZERO)
}

/// Converts `amount` in one direction, unrounded.
///
/// `None` when the rate is missing or non-positive, or the result overflows.
pub fn convert(amount: Decimal, direction: Direction, snapshot: &RateSnapshot) -> Option<Decimal> {
    let rate = positive_rate(snapshot, direction.currency())?;
    match direction {
        Direction::UsdToLocal | Direction::EurToLocal => amount.checked_mul(rate),
        Direction::LocalToUsd | Direction::LocalToEur => amount.checked_div(rate),
    }
}

/// Computes all four directions for `amount`.
///
/// Both rates must be present and positive and the amount positive; otherwise
/// the zero-state is returned.
pub fn convert_all(amount: Decimal, snapshot: &RateSnapshot) -> ConversionResult {
    let rates_usable = positive_rate(snapshot, Currency::Usd).is_some()
        && positive_rate(snapshot, Currency::Eur).is_some();
    if !rates_usable || amount <= Decimal::ZERO {
        return ConversionResult::zero();
    }

    let converted = |direction| match convert(amount, direction, snapshot) {
        Some(value) => ConvertedAmount::new(direction, value),
        None => ConvertedAmount::zero(direction),
    };

    ConversionResult {
        usd_to_local: converted(Direction::UsdToLocal),
        eur_to_local: converted(Direction::EurToLocal),
        local_to_usd: converted(Direction::LocalToUsd),
        local_to_eur: converted(Direction::LocalToEur),
    }
}
