//! Core business logic: rates, conversions and the calculator

pub mod cache;
pub mod calculator;
pub mod clock;
pub mod config;
pub mod conversion;
pub mod locale;
pub mod log;
pub mod rates;
pub mod value_date;

// Re-export main types for cleaner imports
pub use cache::{SnapshotCache, SnapshotReader};
pub use calculator::{Calculator, CalculatorState, Key, Operator};
pub use clock::{Clock, FixedClock, SystemClock};
pub use conversion::{ConversionResult, Direction, convert_all};
pub use rates::{Currency, FetchError, Quote, RateSnapshot, RateSource};
