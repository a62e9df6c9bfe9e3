//! Configuration Module
//!
//! Configuration loading for the currency service.

mod settings;

pub use settings::{
    ConfigError, DeliveryMode, FeedSettings, ServerSettings, ServiceConfig, StreamingSettings,
};
