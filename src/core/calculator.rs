//! Accumulator calculator whose display feeds the currency conversions.

use crate::core::cache::SnapshotReader;
use crate::core::conversion::{self, ConversionResult, Direction};
use crate::core::locale::{
    DECIMAL_SEPARATOR, display_from_decimal, format_amount, format_display, parse_display,
    round_currency,
};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::debug;

/// Shown instead of a number after an undefined operation.
pub const ERROR_DISPLAY: &str = "Error";

/// Longest operand accepted from digit entry.
pub const MAX_ENTRY_DIGITS: usize = 15;

/// Decimal places kept on arithmetic results before trailing zeros are dropped.
const RESULT_SCALE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operator {
    /// `None` on division by zero or overflow.
    pub fn apply(&self, lhs: Decimal, rhs: Decimal) -> Option<Decimal> {
        match self {
            Operator::Add => lhs.checked_add(rhs),
            Operator::Subtract => lhs.checked_sub(rhs),
            Operator::Multiply => lhs.checked_mul(rhs),
            Operator::Divide if rhs.is_zero() => None,
            Operator::Divide => lhs.checked_div(rhs),
        }
    }
}

impl FromStr for Operator {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(Operator::Add),
            "-" => Ok(Operator::Subtract),
            "*" | "x" | "×" => Ok(Operator::Multiply),
            "/" | "÷" => Ok(Operator::Divide),
            _ => Err(anyhow::anyhow!("Invalid operator: {}", s)),
        }
    }
}

/// A single calculator event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Digit(char),
    Operator(Operator),
    Calculate,
    Clear,
    Backspace,
    Convert(Direction),
}

impl FromStr for Key {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if c.is_ascii_digit() || c == '.' || c == DECIMAL_SEPARATOR {
                return Ok(Key::Digit(c));
            }
        }
        match s.to_lowercase().as_str() {
            "=" => Ok(Key::Calculate),
            "c" => Ok(Key::Clear),
            "<" | "⌫" => Ok(Key::Backspace),
            other => {
                if let Ok(op) = other.parse::<Operator>() {
                    return Ok(Key::Operator(op));
                }
                other
                    .strip_prefix('@')
                    .ok_or_else(|| anyhow::anyhow!("Invalid key: {}", s))?
                    .parse::<Direction>()
                    .map(Key::Convert)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculatorState {
    pub display_value: String,
    pub pending_operand: String,
    pub pending_operator: Option<Operator>,
    pub awaiting_new_entry: bool,
}

impl Default for CalculatorState {
    fn default() -> Self {
        Self {
            display_value: "0".to_string(),
            pending_operand: String::new(),
            pending_operator: None,
            awaiting_new_entry: false,
        }
    }
}

impl CalculatorState {
    pub fn is_error(&self) -> bool {
        self.display_value == ERROR_DISPLAY
    }

    /// Numeric value of the display; the error sentinel counts as zero.
    pub fn current_value(&self) -> Decimal {
        parse_display(&self.display_value).unwrap_or(Decimal::ZERO)
    }

    fn push_digit(&mut self, key: char) {
        let is_separator = key == '.' || key == DECIMAL_SEPARATOR;
        if !key.is_ascii_digit() && !is_separator {
            return;
        }

        if self.awaiting_new_entry || self.is_error() {
            self.display_value = if is_separator {
                format!("0{DECIMAL_SEPARATOR}")
            } else {
                key.to_string()
            };
            self.awaiting_new_entry = false;
            return;
        }

        if is_separator {
            if self.display_value.contains(DECIMAL_SEPARATOR) {
                return;
            }
            self.display_value.push(DECIMAL_SEPARATOR);
            return;
        }

        let digits = self
            .display_value
            .chars()
            .filter(|c| c.is_ascii_digit())
            .count();
        if digits >= MAX_ENTRY_DIGITS {
            return;
        }
        self.display_value = format_display(&format!("{}{key}", self.display_value));
    }

    fn choose_operator(&mut self, op: Operator) {
        if self.display_value == "0" || self.is_error() {
            return;
        }
        if self.pending_operator.is_some() {
            self.calculate();
            if self.is_error() {
                return;
            }
        }
        self.pending_operator = Some(op);
        self.pending_operand = self.display_value.clone();
        self.awaiting_new_entry = true;
    }

    fn calculate(&mut self) {
        let Some(op) = self.pending_operator else {
            return;
        };
        if self.awaiting_new_entry {
            return;
        }
        let (Some(lhs), Some(rhs)) = (
            parse_display(&self.pending_operand),
            parse_display(&self.display_value),
        ) else {
            return;
        };

        self.display_value = match op.apply(lhs, rhs) {
            Some(result) => display_from_decimal(result.round_dp(RESULT_SCALE)),
            None => ERROR_DISPLAY.to_string(),
        };
        debug!(?op, %lhs, %rhs, display = %self.display_value, "Calculated");
        self.pending_operator = None;
        self.pending_operand.clear();
        self.awaiting_new_entry = true;
    }

    fn backspace(&mut self) {
        if self.is_error() {
            self.display_value = "0".to_string();
            return;
        }
        let mut trimmed = self.display_value.clone();
        trimmed.pop();
        self.display_value = if trimmed.is_empty() || trimmed == "-" {
            "0".to_string()
        } else {
            format_display(&trimmed)
        };
    }

    fn convert(&mut self, direction: Direction, converted: Option<Decimal>) {
        let Some(amount) = converted.map(round_currency) else {
            return;
        };
        if amount <= Decimal::ZERO {
            return;
        }
        debug!(%direction, %amount, "Converted display");
        self.display_value = format_amount(amount);
        self.pending_operator = None;
        self.pending_operand.clear();
        self.awaiting_new_entry = true;
    }
}

/// Calculator session bound to the latest published rates.
pub struct Calculator {
    state: CalculatorState,
    rates: SnapshotReader,
    conversions: ConversionResult,
}

impl Calculator {
    pub fn new(rates: SnapshotReader) -> Self {
        let mut calculator = Self {
            state: CalculatorState::default(),
            rates,
            conversions: ConversionResult::zero(),
        };
        calculator.refresh_conversions();
        calculator
    }

    /// Applies one event and recomputes every conversion output.
    pub fn press(&mut self, key: Key) {
        match key {
            Key::Digit(d) => self.state.push_digit(d),
            Key::Operator(op) => self.state.choose_operator(op),
            Key::Calculate => self.state.calculate(),
            Key::Clear => self.state = CalculatorState::default(),
            Key::Backspace => self.state.backspace(),
            Key::Convert(direction) => {
                let amount = self.state.current_value();
                let converted = if amount > Decimal::ZERO {
                    self.rates
                        .latest()
                        .and_then(|snapshot| conversion::convert(amount, direction, &snapshot))
                } else {
                    None
                };
                self.state.convert(direction, converted);
            }
        }
        self.refresh_conversions();
    }

    pub fn digit(&mut self, d: char) {
        self.press(Key::Digit(d));
    }

    pub fn choose_operator(&mut self, op: Operator) {
        self.press(Key::Operator(op));
    }

    pub fn calculate(&mut self) {
        self.press(Key::Calculate);
    }

    pub fn clear(&mut self) {
        self.press(Key::Clear);
    }

    pub fn backspace(&mut self) {
        self.press(Key::Backspace);
    }

    pub fn convert(&mut self, direction: Direction) {
        self.press(Key::Convert(direction));
    }

    /// Recomputes the conversions from the current display and latest rates.
    pub fn refresh_conversions(&mut self) {
        self.conversions = match self.rates.latest() {
            Some(snapshot) => conversion::convert_all(self.state.current_value(), &snapshot),
            None => ConversionResult::zero(),
        };
    }

    pub fn display_value(&self) -> &str {
        &self.state.display_value
    }

    pub fn conversions(&self) -> &ConversionResult {
        &self.conversions
    }

    pub fn state(&self) -> &CalculatorState {
        &self.state
    }
}
