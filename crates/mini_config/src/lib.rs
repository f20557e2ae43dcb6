//! Mini compiler configuration: `mini.toml` loading, defaults and lookup.

mod config;

pub use config::*;
