//! Key-value backend implementations

pub mod memory;

#[cfg(feature = "dynamodb")]
pub mod dynamodb;

pub use memory::*;

#[cfg(feature = "dynamodb")]
pub use dynamodb::*;
