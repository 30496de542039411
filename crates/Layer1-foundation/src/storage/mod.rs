//! Storage module for Tollgate
//!
//! - `json`: JSON - typed records written atomically (ledger, markets, config)

mod json;

pub use json::{JsonStore, APP_DIR_NAME};
