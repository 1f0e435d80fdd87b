//! Static description of the physical channels exposed by an NI device.
//!
//! Channels are grouped by [`Category`], mirroring the four groups of lines on an NI multifunction card:
//! analog outputs (`aoN`), analog inputs (`aiN`), counter inputs (`ctrN`, listed under `digital_input`)
//! and digital output lines (`port0/lineN`).
//!
//! Each category has its own channel struct. All of them implement [`BaseChannel`], which gives uniform
//! access to the sample rate (tasks spanning several channels require one common rate) and to validation.
//!
//! Field names and default values follow the settings tree used by existing experiment scripts, so a
//! configuration written for those scripts deserializes unchanged:
//!
//! ```toml
//! [analog_output.ao0]
//! channel = 0
//! sample_rate = 1000.0
//! min_voltage = -10.0
//! max_voltage = 10.0
//!
//! [digital_input.ctr0]
//! input_channel = 0
//! counter_PFI_channel = 8
//! clock_PFI_channel = 13
//! clock_counter_channel = 1
//! sample_rate = 1000.0
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;

/// Channel groups of a device. A device model may not support every category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    AnalogOutput,
    AnalogInput,
    DigitalInput,
    DigitalOutput,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::AnalogOutput => "analog_output",
            Category::AnalogInput => "analog_input",
            Category::DigitalInput => "digital_input",
            Category::DigitalOutput => "digital_output",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Common behavior of every channel description.
pub trait BaseChannel {
    fn samp_rate(&self) -> f64;

    /// Checks the static invariants of the channel. `name` is only used for error messages.
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        check_samp_rate(name, self.samp_rate())
    }
}

fn check_samp_rate(name: &str, samp_rate: f64) -> Result<(), ConfigError> {
    if !(samp_rate.is_finite() && samp_rate > 0.) {
        return Err(ConfigError::Configuration(format!(
            "Channel {name}: sample_rate must be a positive number, got {samp_rate}"
        )));
    }
    Ok(())
}

fn default_samp_rate() -> f64 {
    1000.0
}
fn default_min_voltage() -> f64 {
    -10.0
}
fn default_max_voltage() -> f64 {
    10.0
}
fn default_counter_pfi() -> u32 {
    8
}
fn default_clock_pfi() -> u32 {
    13
}
fn default_clock_counter() -> u32 {
    1
}
fn default_do_line() -> u32 {
    8
}

/// Analog output or analog input channel (`aoN` / `aiN`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalogChannel {
    /// Physical channel index, i.e. `N` in `aoN`.
    #[serde(default)]
    pub channel: u32,
    #[serde(default = "default_samp_rate")]
    pub sample_rate: f64,
    #[serde(default = "default_min_voltage")]
    pub min_voltage: f64,
    #[serde(default = "default_max_voltage")]
    pub max_voltage: f64,
}

impl AnalogChannel {
    /// Builds a validated analog channel.
    ///
    /// Fails with [`ConfigError::Configuration`] if `sample_rate` is not positive or if
    /// `min_voltage >= max_voltage`.
    pub fn new(
        channel: u32,
        sample_rate: f64,
        min_voltage: f64,
        max_voltage: f64,
    ) -> Result<Self, ConfigError> {
        let chan = Self {
            channel,
            sample_rate,
            min_voltage,
            max_voltage,
        };
        chan.validate(&format!("#{channel}"))?;
        Ok(chan)
    }

    /// Channel with the default ±10V range at 1kHz.
    pub fn with_defaults(channel: u32) -> Self {
        Self {
            channel,
            sample_rate: default_samp_rate(),
            min_voltage: default_min_voltage(),
            max_voltage: default_max_voltage(),
        }
    }
}

impl BaseChannel for AnalogChannel {
    fn samp_rate(&self) -> f64 {
        self.sample_rate
    }
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        check_samp_rate(name, self.sample_rate)?;
        if !(self.min_voltage < self.max_voltage) {
            return Err(ConfigError::Configuration(format!(
                "Channel {name}: min_voltage {} must be below max_voltage {}",
                self.min_voltage, self.max_voltage
            )));
        }
        Ok(())
    }
}

/// Counter input channel. Used both for hardware-clocked edge counting and for gated
/// (pulse-width) counting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CounterChannel {
    /// Counter used to count edges, i.e. `N` in `ctrN`.
    #[serde(default)]
    pub input_channel: u32,
    /// PFI line carrying the counted signal. Used as counter timebase for gated counting.
    #[serde(rename = "counter_PFI_channel", default = "default_counter_pfi")]
    pub counter_pfi_channel: u32,
    /// PFI line on which the internal sample clock is output (and looped back).
    #[serde(rename = "clock_PFI_channel", default = "default_clock_pfi")]
    pub clock_pfi_channel: u32,
    /// Counter which generates the internal sample clock.
    #[serde(default = "default_clock_counter")]
    pub clock_counter_channel: u32,
    #[serde(default = "default_samp_rate")]
    pub sample_rate: f64,
}

impl CounterChannel {
    pub fn new(
        input_channel: u32,
        counter_pfi_channel: u32,
        clock_pfi_channel: u32,
        clock_counter_channel: u32,
        sample_rate: f64,
    ) -> Result<Self, ConfigError> {
        let chan = Self {
            input_channel,
            counter_pfi_channel,
            clock_pfi_channel,
            clock_counter_channel,
            sample_rate,
        };
        chan.validate(&format!("ctr{input_channel}"))?;
        Ok(chan)
    }
}

impl Default for CounterChannel {
    fn default() -> Self {
        Self {
            input_channel: 0,
            counter_pfi_channel: default_counter_pfi(),
            clock_pfi_channel: default_clock_pfi(),
            clock_counter_channel: default_clock_counter(),
            sample_rate: default_samp_rate(),
        }
    }
}

impl BaseChannel for CounterChannel {
    fn samp_rate(&self) -> f64 {
        self.sample_rate
    }
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        check_samp_rate(name, self.sample_rate)?;
        if self.input_channel == self.clock_counter_channel {
            return Err(ConfigError::Configuration(format!(
                "Channel {name}: counting counter ctr{} cannot also generate the sample clock",
                self.input_channel
            )));
        }
        Ok(())
    }
}

/// Single digital output line on `port0`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DigitalOutChannel {
    /// Line number, i.e. `N` in `port0/lineN`.
    #[serde(default = "default_do_line")]
    pub channel: u32,
    #[serde(default = "default_samp_rate")]
    pub sample_rate: f64,
}

impl DigitalOutChannel {
    pub fn new(channel: u32, sample_rate: f64) -> Result<Self, ConfigError> {
        let chan = Self {
            channel,
            sample_rate,
        };
        chan.validate(&format!("port0/line{channel}"))?;
        Ok(chan)
    }
}

impl Default for DigitalOutChannel {
    fn default() -> Self {
        Self {
            channel: default_do_line(),
            sample_rate: default_samp_rate(),
        }
    }
}

impl BaseChannel for DigitalOutChannel {
    fn samp_rate(&self) -> f64 {
        self.sample_rate
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn inverted_voltage_range() {
        let err = AnalogChannel::new(0, 1000., 5., -5.).unwrap_err();
        assert!(matches!(err, ConfigError::Configuration(_)));
        // Degenerate range is rejected too
        assert!(AnalogChannel::new(0, 1000., 1., 1.).is_err());
    }

    #[test]
    fn non_positive_samp_rate() {
        assert!(AnalogChannel::new(0, 0., -10., 10.).is_err());
        assert!(AnalogChannel::new(0, f64::NAN, -10., 10.).is_err());
        assert!(DigitalOutChannel::new(8, -1.).is_err());
        assert!(CounterChannel::new(0, 8, 13, 1, 0.).is_err());
    }

    #[test]
    fn counter_clock_collision() {
        let err = CounterChannel::new(1, 8, 13, 1, 1000.).unwrap_err();
        assert!(err.to_string().contains("ctr1"));
        assert!(CounterChannel::new(0, 8, 13, 1, 1000.).is_ok());
    }

    #[test]
    fn category_names() {
        assert_eq!(Category::DigitalInput.to_string(), "digital_input");
        assert_eq!(Category::AnalogOutput.as_str(), "analog_output");
    }
}
