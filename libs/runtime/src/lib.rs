//! Application runtime: configuration loading and logging initialization
//! for the Schemat server.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, CliArgs, LayerConfig, LoggingConfig, Section, ServerConfig, SiteConfig,
    StoreConfig,
};
