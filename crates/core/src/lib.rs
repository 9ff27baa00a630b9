//! # grove-core
//!
//! Configuration primitives shared by every grove crate: the
//! [`AppConfigTrait`] contract, deployment [`Environment`], the
//! [`ConfigSource`] provenance record and the [`ConfigError`] type.

pub mod config;

pub use config::{
    env_flag, env_parse, env_string, AppConfigTrait, ConfigError, ConfigSource, ConfigValidator,
    Environment, IdentifierValidator, RangeValidator,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get crate version
pub fn version() -> &'static str {
    VERSION
}
