// Physical channel / terminal name builders and channel key normalization.
//
// DAQmx distinguishes channel paths (`Dev1/ao0`) from terminal paths, which take a leading slash
// (`/Dev1/PFI13`). Multiple channels in one task are given as a comma-separated list.
use regex::Regex;

use crate::error::ConfigError;

pub fn ao_chan(device: &str, channel: u32) -> String {
    format!("{device}/ao{channel}")
}

pub fn ai_chan(device: &str, channel: u32) -> String {
    format!("{device}/ai{channel}")
}

// Internal channel reading back the voltage generated on `aoN`
pub fn ao_readback_chan(device: &str, channel: u32) -> String {
    format!("{device}/_ao{channel}_vs_aognd")
}

pub fn counter_chan(device: &str, counter: u32) -> String {
    format!("{device}/ctr{counter}")
}

pub fn pfi_terminal(device: &str, line: u32) -> String {
    format!("/{device}/PFI{line}")
}

pub fn do_line(device: &str, line: u32) -> String {
    format!("{device}/port0/line{line}")
}

pub fn join_chans(chans: &[String]) -> String {
    chans.join(",")
}

/// Brings a user-supplied channel key to the canonical `prefix(number)` form.
///
/// Both `"ao1"` and `"1"` become `"ao1"` for `prefix = "ao"`. Keys not made of an optional prefix and a
/// number (custom channel names) are returned unchanged.
pub fn normalize_channel_name(prefix: &str, key: &str) -> Result<String, ConfigError> {
    let re = Regex::new(&format!(r"^(?:{})?(\d+)$", regex::escape(prefix)))
        .map_err(|err| ConfigError::Configuration(err.to_string()))?;
    let key = key.trim();
    Ok(match re.captures(key) {
        Some(caps) => format!("{prefix}{}", &caps[1]),
        None => key.to_string(),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn normalize_keys() {
        assert_eq!(normalize_channel_name("ao", "ao3").unwrap(), "ao3");
        assert_eq!(normalize_channel_name("ao", "3").unwrap(), "ao3");
        assert_eq!(normalize_channel_name("do", " 0 ").unwrap(), "do0");
        // Custom names pass through, the registry decides whether they exist
        assert_eq!(normalize_channel_name("ao", "piezo_x").unwrap(), "piezo_x");
        assert_eq!(normalize_channel_name("ao", "ai1").unwrap(), "ai1");
    }

    #[test]
    fn terminal_paths() {
        assert_eq!(pfi_terminal("Dev1", 13), "/Dev1/PFI13");
        assert_eq!(counter_chan("Dev1", 1), "Dev1/ctr1");
        assert_eq!(do_line("Dev1", 8), "Dev1/port0/line8");
        assert_eq!(ao_readback_chan("Dev1", 2), "Dev1/_ao2_vs_aognd");
        assert_eq!(
            join_chans(&[ao_chan("Dev1", 0), ao_chan("Dev1", 1)]),
            "Dev1/ao0,Dev1/ao1"
        );
    }
}
