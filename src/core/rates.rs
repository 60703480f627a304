//! Exchange-rate snapshot types and the acquisition abstraction

use crate::core::locale::{format_amount, round_currency};
use crate::core::value_date;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Currency {
    Usd,
    Eur,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Currency::Usd => "DÓLAR (USD)",
            Currency::Eur => "EURO (EUR)",
        }
    }
}

/// One quoted rate in Bolívares. `display_text` is always derived from `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    value: Decimal,
    display_text: String,
}

impl Quote {
    /// Returns `None` for negative values.
    pub fn new(value: Decimal) -> Option<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return None;
        }
        let value = round_currency(value);
        Some(Self {
            display_text: format_amount(value),
            value,
        })
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn display_text(&self) -> &str {
        &self.display_text
    }
}

/// Immutable result of one scrape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateSnapshot {
    pub value_date: NaiveDate,
    pub observed_date: NaiveDate,
    pub date_adjusted: bool,
    pub usd: Option<Quote>,
    pub eur: Option<Quote>,
}

impl RateSnapshot {
    /// Builds a snapshot observed at `observed_at` (local civil time).
    pub fn new(observed_at: NaiveDateTime, usd: Option<Decimal>, eur: Option<Decimal>) -> Self {
        let observed_date = observed_at.date();
        let value_date = value_date::value_date(observed_at);
        Self {
            value_date,
            observed_date,
            date_adjusted: value_date != observed_date,
            usd: usd.and_then(Quote::new),
            eur: eur.and_then(Quote::new),
        }
    }

    pub fn quote(&self, currency: Currency) -> Option<&Quote> {
        match currency {
            Currency::Usd => self.usd.as_ref(),
            Currency::Eur => self.eur.as_ref(),
        }
    }

    pub fn value_date_text(&self) -> String {
        value_date::describe(self.value_date)
    }

    pub fn short_date(&self) -> String {
        value_date::short_date(self.value_date)
    }

    /// True when neither anchor could be read.
    pub fn is_empty(&self) -> bool {
        self.usd.is_none() && self.eur.is_none()
    }
}

/// Failures that prevent a snapshot from being produced at all.
///
/// Messages are user-facing and end up in the JSON `error` field.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Transport failure, timeout, empty body or non-200 status.
    #[error("Error: {0}")]
    Network(String),

    /// The body could not be treated as markup.
    #[error("Error: Falló el análisis del contenido")]
    ParseFailure(String),
}

impl FetchError {
    pub fn http_status(code: u16) -> Self {
        FetchError::Network(format!("No se pudo conectar al BCV (HTTP {code})"))
    }

    pub fn empty_response() -> Self {
        FetchError::Network("No se recibió respuesta del BCV".to_string())
    }

    pub fn timeout() -> Self {
        FetchError::Network("Tiempo de espera agotado al consultar el BCV".to_string())
    }
}

#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_rates(&self) -> Result<RateSnapshot, FetchError>;
}
