//! Strategy signals.
//!
//! Pure functions with no I/O:
//! - Delta evaluation between the spot and perp legs
//! - Funding favorability and annualization

pub mod delta;
pub mod funding;

pub use delta::{evaluate, DeltaResult};
pub use funding::{annualized_apr_pct, is_funding_favorable, DEFAULT_FUNDING_PERIODS_PER_DAY};
