pub mod app_config;
pub mod env;
pub mod sources;
pub mod validation;

pub use app_config::*;
pub use env::*;
pub use sources::*;
pub use validation::*;
