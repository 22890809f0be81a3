//! Configuration, storage paths, and logging setup for the seller assistant.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, MarketplaceConfig, OutreachTuning, DEFAULT_LOG_LEVEL, DEFAULT_MARKETPLACE_URL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
