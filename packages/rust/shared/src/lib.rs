//! Shared types, error model, and configuration for FeedBuilder.
//!
//! This crate is the foundation depended on by all other FeedBuilder crates.
//! It provides:
//! - [`FeedBuilderError`]: the unified error type
//! - Domain types ([`ProductRecord`], [`RunStatus`])
//! - Configuration ([`AppConfig`], [`FtpCredentials`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CONFIG_FILE_NAME, FilterConfig, FtpConfig, FtpCredentials, InputConfig,
    OutputConfig, PricingConfig, SchemaConfig, init_config, load_config, load_config_from,
    read_list, read_optional_list,
};
pub use error::{FeedBuilderError, Result};
pub use types::{ProductRecord, RunOutcome, RunStatus, parse_decimal, parse_int};
