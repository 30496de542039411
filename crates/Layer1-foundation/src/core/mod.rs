//! Core Module - shared types and traits
//!
//! - `types.rs`: data types used by config and the budget engine (ThrottleLevel)
//! - `traits.rs`: interfaces injected into Layer2 (Clock)

mod traits;
mod types;

pub use traits::{Clock, ManualClock, SystemClock};
pub use types::{percent_of_limit, ThrottleLevel};
