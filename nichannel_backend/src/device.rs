//! Implements the typed configuration tree of an NI device. See [`DeviceConfig`] for details.
//!
//! A device configuration is a tree `device → category → channel → field`:
//!
//! - Device-wide options: the DAQmx device name, the (optional) buffer size override and the empirically
//!   determined offset added to voltages read back with on-demand analog reads.
//! - One optional map per [`Category`]. A category which is `None` is not supported by the device model
//!   (e.g. an AO-only module has no `digital_input`); a category which is present but empty is supported
//!   but has no configured channels.
//!
//! Channel maps are [`IndexMap`]s so that channel order in the configuration file is preserved.
//!
//! ## Device models
//! Presets for the supported card families are provided by [`DeviceConfig::ni6259`] (multifunction card,
//! also the [`Default`]) and [`DeviceConfig::ni9263`] (4-channel AO module).
//!
//! ## Loading
//! [`DeviceConfig::from_toml_str`] and [`DeviceConfig::load`] parse a TOML document. Missing options take
//! their default values. The whole tree is checked once with [`DeviceConfig::check`] right after parsing.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::channel::*;
use crate::error::ConfigError;

fn default_device() -> String {
    String::from("Dev1")
}
fn default_override_buffer_size() -> i64 {
    -1
}
fn default_ao_read_offset() -> f64 {
    0.005
}

/// Validated description of one NI device and the channels it exposes.
///
/// # Fields
/// - `device`: DAQmx device name as shown in NI MAX (e.g. `Dev1`, `cDAQ9184-1BA7633Mod4`).
/// - `override_buffer_size`: manual buffer size override, unused if `-1`.
/// - `ao_read_offset`: offset (V) added to every sample returned by on-demand voltage reads.
/// - `analog_output`, `analog_input`, `digital_input`, `digital_output`: per-category channel maps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_override_buffer_size")]
    pub override_buffer_size: i64,
    #[serde(default = "default_ao_read_offset")]
    pub ao_read_offset: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analog_output: Option<IndexMap<String, AnalogChannel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analog_input: Option<IndexMap<String, AnalogChannel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digital_input: Option<IndexMap<String, CounterChannel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digital_output: Option<IndexMap<String, DigitalOutChannel>>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::ni6259()
    }
}

impl DeviceConfig {
    /// Device with no channel categories at all. Mostly useful as a starting point for builders.
    pub fn empty(device: &str) -> Self {
        Self {
            device: device.to_string(),
            override_buffer_size: default_override_buffer_size(),
            ao_read_offset: default_ao_read_offset(),
            analog_output: None,
            analog_input: None,
            digital_input: None,
            digital_output: None,
        }
    }

    /// NI 6259 multifunction card: `ao0..ao3`, `ai0..ai4`, counter `ctr0` and digital line `do0`
    /// (`port0/line8`), all at 1kHz and ±10V.
    pub fn ni6259() -> Self {
        let mut cfg = Self::empty(&default_device());
        cfg.analog_output = Some(
            (0..4)
                .map(|i| (format!("ao{i}"), AnalogChannel::with_defaults(i)))
                .collect(),
        );
        cfg.analog_input = Some(
            (0..5)
                .map(|i| (format!("ai{i}"), AnalogChannel::with_defaults(i)))
                .collect(),
        );
        cfg.digital_input = Some(IndexMap::from([(
            String::from("ctr0"),
            CounterChannel::default(),
        )]));
        cfg.digital_output = Some(IndexMap::from([(
            String::from("do0"),
            DigitalOutChannel::default(),
        )]));
        cfg
    }

    /// NI 9263 C-series module: 4 analog outputs, nothing else.
    pub fn ni9263() -> Self {
        let mut cfg = Self::empty("cDAQ9184-1BA7633Mod4");
        cfg.analog_output = Some(
            (0..4)
                .map(|i| (format!("ao{i}"), AnalogChannel::with_defaults(i)))
                .collect(),
        );
        cfg
    }

    /// Parses and checks a TOML device configuration.
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(src)?;
        cfg.check()?;
        Ok(cfg)
    }

    /// Reads, parses and checks the TOML device configuration at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let src = std::fs::read_to_string(path.as_ref())?;
        let cfg = Self::from_toml_str(&src)?;
        log::debug!(
            "Loaded configuration of device {} from {}",
            cfg.device,
            path.as_ref().display()
        );
        Ok(cfg)
    }

    /// Checks every device-wide option and every channel of the tree.
    ///
    /// Within one category, two channels may not point to the same physical line.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.device.is_empty() || self.device.contains(|c: char| matches!(c, '\0' | '/' | ',')) {
            return Err(ConfigError::Configuration(format!(
                "Invalid device name {:?}",
                self.device
            )));
        }
        if self.override_buffer_size != -1 && self.override_buffer_size <= 0 {
            return Err(ConfigError::Configuration(format!(
                "override_buffer_size must be -1 (unused) or positive, got {}",
                self.override_buffer_size
            )));
        }
        if !self.ao_read_offset.is_finite() {
            return Err(ConfigError::Configuration(format!(
                "ao_read_offset must be finite, got {}",
                self.ao_read_offset
            )));
        }
        check_category(Category::AnalogOutput, &self.analog_output, |c| c.channel)?;
        check_category(Category::AnalogInput, &self.analog_input, |c| c.channel)?;
        check_category(Category::DigitalInput, &self.digital_input, |c| c.input_channel)?;
        check_category(Category::DigitalOutput, &self.digital_output, |c| c.channel)?;
        Ok(())
    }

    pub fn supports(&self, category: Category) -> bool {
        match category {
            Category::AnalogOutput => self.analog_output.is_some(),
            Category::AnalogInput => self.analog_input.is_some(),
            Category::DigitalInput => self.digital_input.is_some(),
            Category::DigitalOutput => self.digital_output.is_some(),
        }
    }

    /// Names of the channels configured under `category`, in configuration order.
    pub fn channel_names(&self, category: Category) -> Result<Vec<&str>, ConfigError> {
        fn keys<C>(map: &IndexMap<String, C>) -> Vec<&str> {
            map.keys().map(|k| k.as_str()).collect()
        }
        let names = match category {
            Category::AnalogOutput => self.analog_output.as_ref().map(keys),
            Category::AnalogInput => self.analog_input.as_ref().map(keys),
            Category::DigitalInput => self.digital_input.as_ref().map(keys),
            Category::DigitalOutput => self.digital_output.as_ref().map(keys),
        };
        names.ok_or_else(|| self.unsupported(category))
    }

    /// Checks that `name` is a channel of `category` on this device.
    ///
    /// Fails with [`ConfigError::UnsupportedCategory`] if the device model has no such category, and with
    /// [`ConfigError::InvalidChannel`] if the category exists but does not list `name`.
    pub fn validate(&self, category: Category, name: &str) -> Result<(), ConfigError> {
        if self.channel_names(category)?.contains(&name) {
            Ok(())
        } else {
            Err(self.invalid(category, name))
        }
    }

    pub fn analog_output(&self, name: &str) -> Result<&AnalogChannel, ConfigError> {
        self.lookup(Category::AnalogOutput, self.analog_output.as_ref(), name)
    }
    pub fn analog_input(&self, name: &str) -> Result<&AnalogChannel, ConfigError> {
        self.lookup(Category::AnalogInput, self.analog_input.as_ref(), name)
    }
    pub fn digital_input(&self, name: &str) -> Result<&CounterChannel, ConfigError> {
        self.lookup(Category::DigitalInput, self.digital_input.as_ref(), name)
    }
    pub fn digital_output(&self, name: &str) -> Result<&DigitalOutChannel, ConfigError> {
        self.lookup(Category::DigitalOutput, self.digital_output.as_ref(), name)
    }

    fn lookup<'a, C>(
        &self,
        category: Category,
        map: Option<&'a IndexMap<String, C>>,
        name: &str,
    ) -> Result<&'a C, ConfigError> {
        map.ok_or_else(|| self.unsupported(category))?
            .get(name)
            .ok_or_else(|| self.invalid(category, name))
    }

    fn unsupported(&self, category: Category) -> ConfigError {
        ConfigError::UnsupportedCategory {
            device: self.device.clone(),
            category,
        }
    }

    fn invalid(&self, category: Category, name: &str) -> ConfigError {
        ConfigError::InvalidChannel {
            device: self.device.clone(),
            category,
            channel: name.to_string(),
        }
    }
}

fn check_category<C: BaseChannel>(
    category: Category,
    chans: &Option<IndexMap<String, C>>,
    physical_idx: impl Fn(&C) -> u32,
) -> Result<(), ConfigError> {
    let Some(chans) = chans else {
        return Ok(());
    };
    let mut seen = HashSet::new();
    for (name, chan) in chans {
        chan.validate(name)?;
        if !seen.insert(physical_idx(chan)) {
            return Err(ConfigError::Configuration(format!(
                "{category} channel {name} reuses physical channel {} of another entry",
                physical_idx(chan)
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn presets_pass_check() {
        DeviceConfig::ni6259().check().unwrap();
        DeviceConfig::ni9263().check().unwrap();
        assert_eq!(DeviceConfig::default(), DeviceConfig::ni6259());
    }

    #[test]
    /// An AO-only module reports the missing categories as unsupported rather than as bad channel names.
    fn unsupported_category() {
        let cfg = DeviceConfig::ni9263();
        assert!(matches!(
            cfg.validate(Category::DigitalInput, "ctr0"),
            Err(ConfigError::UnsupportedCategory { .. })
        ));
        assert!(matches!(
            cfg.analog_input("ai0"),
            Err(ConfigError::UnsupportedCategory { .. })
        ));
        cfg.validate(Category::AnalogOutput, "ao3").unwrap();
    }

    #[test]
    fn invalid_channel() {
        let cfg = DeviceConfig::ni6259();
        match cfg.validate(Category::AnalogInput, "ai9") {
            Err(ConfigError::InvalidChannel {
                category, channel, ..
            }) => {
                assert_eq!(category, Category::AnalogInput);
                assert_eq!(channel, "ai9");
            }
            other => panic!("Expected InvalidChannel, got {other:?}"),
        }
        // Right name, wrong category
        assert!(cfg.validate(Category::AnalogOutput, "ai0").is_err());
    }

    #[test]
    fn empty_category_is_supported() {
        let mut cfg = DeviceConfig::empty("Dev2");
        cfg.digital_output = Some(IndexMap::new());
        assert!(cfg.supports(Category::DigitalOutput));
        assert!(cfg.channel_names(Category::DigitalOutput).unwrap().is_empty());
        assert!(matches!(
            cfg.validate(Category::DigitalOutput, "do0"),
            Err(ConfigError::InvalidChannel { .. })
        ));
    }

    #[test]
    fn check_rejects_bad_device_options() {
        let mut cfg = DeviceConfig::ni6259();
        cfg.device = String::new();
        assert!(cfg.check().is_err());

        let mut cfg = DeviceConfig::ni6259();
        cfg.override_buffer_size = 0;
        assert!(cfg.check().is_err());

        let mut cfg = DeviceConfig::ni6259();
        cfg.override_buffer_size = 4096;
        cfg.check().unwrap();
    }

    #[test]
    fn check_rejects_shared_physical_channel() {
        let mut cfg = DeviceConfig::ni6259();
        if let Some(ao) = cfg.analog_output.as_mut() {
            ao.insert(String::from("ao_dup"), AnalogChannel::with_defaults(1));
        }
        let err = cfg.check().unwrap_err();
        assert!(err.to_string().contains("ao_dup"));
    }

    #[test]
    fn check_rejects_inverted_range() {
        let mut cfg = DeviceConfig::ni6259();
        if let Some(ai) = cfg.analog_input.as_mut() {
            ai[0].min_voltage = 10.;
            ai[0].max_voltage = -10.;
        }
        assert!(matches!(cfg.check(), Err(ConfigError::Configuration(_))));
    }
}
