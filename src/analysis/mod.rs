//! Analysis modules.
//!
//! Pure transforms over report rows that have already been fetched:
//! reconciliation and summaries, roster flags, chart/funnel data, and
//! assembly of the final report.

pub mod activity;
pub mod aggregator;
pub mod kpi;
pub mod roster;

pub use activity::*;
pub use aggregator::*;
pub use kpi::*;
pub use roster::*;
