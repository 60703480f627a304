//! Value-date rule for BCV quotes.
//!
//! Rates published on Friday afternoon and over the weekend are effective the
//! following Monday. "Now" is evaluated in Caracas civil time (UTC-4, no DST).

use chrono::{
    DateTime, Datelike, Days, FixedOffset, NaiveDate, NaiveDateTime, Offset, Timelike, Utc,
    Weekday,
};

pub const CARACAS_UTC_OFFSET_HOURS: i32 = -4;

/// Hour on Friday from which the published rate belongs to the next Monday.
pub const FRIDAY_CUTOFF_HOUR: u32 = 12;

const WEEKDAYS: [&str; 7] = [
    "lunes",
    "martes",
    "miércoles",
    "jueves",
    "viernes",
    "sábado",
    "domingo",
];

const MONTHS: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

pub fn caracas_offset() -> FixedOffset {
    offset_from_hours(CARACAS_UTC_OFFSET_HOURS).unwrap_or_else(|| Utc.fix())
}

pub fn offset_from_hours(hours: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(hours * 3600)
}

/// Local wall-clock time for `now` at the given offset.
pub fn local_time(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDateTime {
    now.with_timezone(&offset).naive_local()
}

/// The date a rate observed at `local` is officially effective for.
pub fn value_date(local: NaiveDateTime) -> NaiveDate {
    let today = local.date();
    let shift_to_monday = match today.weekday() {
        Weekday::Fri => local.hour() >= FRIDAY_CUTOFF_HOUR,
        Weekday::Sat | Weekday::Sun => true,
        _ => false,
    };
    if !shift_to_monday {
        return today;
    }
    let days_ahead = 7 - u64::from(today.weekday().num_days_from_monday());
    today.checked_add_days(Days::new(days_ahead)).unwrap_or(today)
}

/// `"Fecha valor: jueves, 20 de noviembre de 2025"`
pub fn describe(date: NaiveDate) -> String {
    let weekday = WEEKDAYS[date.weekday().num_days_from_monday() as usize];
    let month = MONTHS[date.month0() as usize];
    format!(
        "Fecha valor: {weekday}, {} de {month} de {}",
        date.day(),
        date.year()
    )
}

/// `"20/11/2025"`
pub fn short_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}
