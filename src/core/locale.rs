//! Venezuelan number formatting: `.` groups thousands, `,` separates decimals.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

pub const THOUSANDS_SEPARATOR: char = '.';
pub const DECIMAL_SEPARATOR: char = ',';

/// Rounds a currency amount to cents, halves away from zero (41.005 -> 41.01).
pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Formats an amount with exactly two decimals, e.g. `1234.5` -> `"1.234,50"`.
pub fn format_amount(value: Decimal) -> String {
    let fixed = format!("{:.2}", round_currency(value));
    let (sign, digits) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, "00"));
    let sign = if int_part.trim_start_matches('0').is_empty()
        && frac_part.trim_start_matches('0').is_empty()
    {
        ""
    } else {
        sign
    };
    format!(
        "{sign}{}{DECIMAL_SEPARATOR}{frac_part}",
        group_thousands(int_part)
    )
}

/// Normalizes a numeral in display form.
///
/// Grouping separators are recomputed, leading zeros dropped and only the first
/// decimal separator kept, so applying it twice gives the same string.
pub fn format_display(text: &str) -> String {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let mut int_digits = String::new();
    let mut frac_digits: Option<String> = None;
    for c in body.chars() {
        if c.is_ascii_digit() {
            match frac_digits.as_mut() {
                Some(frac) => frac.push(c),
                None => int_digits.push(c),
            }
        } else if c == DECIMAL_SEPARATOR && frac_digits.is_none() {
            frac_digits = Some(String::new());
        }
    }

    let int_digits = match int_digits.trim_start_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };
    let has_value = int_digits != "0"
        || frac_digits
            .as_deref()
            .is_some_and(|f| f.chars().any(|c| c != '0'));

    let mut out = String::new();
    if negative && has_value {
        out.push('-');
    }
    out.push_str(&group_thousands(int_digits));
    if let Some(frac) = frac_digits {
        out.push(DECIMAL_SEPARATOR);
        out.push_str(&frac);
    }
    out
}

/// Undoes display formatting: `"1.234,5"` -> `1234.5`.
pub fn parse_display(text: &str) -> Option<Decimal> {
    let plain: String = text
        .trim()
        .chars()
        .filter(|c| *c != THOUSANDS_SEPARATOR)
        .map(|c| if c == DECIMAL_SEPARATOR { '.' } else { c })
        .collect();
    let plain = plain.strip_suffix('.').unwrap_or(&plain);
    if plain.is_empty() || plain == "-" {
        return None;
    }
    Decimal::from_str(plain).ok()
}

/// Renders a computed number in display form without padding: `8` -> `"8"`.
pub fn display_from_decimal(value: Decimal) -> String {
    let plain = value.normalize().to_string();
    format_display(&plain.replace('.', &DECIMAL_SEPARATOR.to_string()))
}

/// Parses user input that may be written either way: `"1.234,5"` or `"1234.5"`.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let trimmed = text.trim();
    if trimmed.contains(DECIMAL_SEPARATOR) {
        parse_display(trimmed)
    } else {
        Decimal::from_str(trimmed).ok()
    }
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(THOUSANDS_SEPARATOR);
        }
        out.push(c);
    }
    out
}
