//! Error type for channel configuration.
//!
//! Every failure the configuration layer can report is a [`ConfigError`]. None of them involve the
//! NI-DAQmx driver: they are detected either when a [`crate::DeviceConfig`] is built / parsed, or when a
//! caller asks for a channel the device does not expose.

use thiserror::Error;

use crate::channel::Category;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// Malformed channel or device specification (inverted voltage range, non-positive sample rate, ...).
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Channel '{channel}' is not a valid {category} channel of device {device}")]
    InvalidChannel {
        device: String,
        category: Category,
        channel: String,
    },

    #[error("Device {device} does not support {category}")]
    UnsupportedCategory { device: String, category: Category },

    #[error("Failed to parse device configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to read device configuration: {0}")]
    Io(#[from] std::io::Error),
}
