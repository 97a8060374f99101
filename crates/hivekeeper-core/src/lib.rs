pub mod config;
pub mod duration;

pub use config::{ConfigError, HivekeeperConfig};
pub use duration::parse_duration;
