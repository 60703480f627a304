use chrono::{Days, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Parses a rate as printed by the BCV page, e.g. `"41,23"` or `" 1.234,56780000 "`.
///
/// The page uses `,` for decimals; `.` is treated as grouping only when a `,`
/// is also present. Negative or non-numeric text yields `None`.
pub fn parse_rate_text(text: &str) -> Option<Decimal> {
    let compact: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    if compact.is_empty() {
        return None;
    }
    let normalized = if compact.contains(',') {
        compact.replace('.', "").replace(',', ".")
    } else {
        compact
    };
    Decimal::from_str(&normalized)
        .ok()
        .filter(|value| !value.is_sign_negative() || value.is_zero())
}

/// Next local instant strictly after `now` that falls on one of `slots`,
/// rolling over to tomorrow when every slot has passed today.
pub fn next_slot(now: NaiveDateTime, slots: &[NaiveTime]) -> Option<NaiveDateTime> {
    let today = now.date();
    let tomorrow = today.checked_add_days(Days::new(1))?;
    slots
        .iter()
        .map(|slot| {
            let candidate = today.and_time(*slot);
            if candidate <= now {
                tomorrow.and_time(*slot)
            } else {
                candidate
            }
        })
        .min()
}
