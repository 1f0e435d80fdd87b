//! Channel configuration for National Instrument (NI) DAQmx devices.
//!
//! This crate holds the hardware-free half of the backend: the typed description of which analog,
//! counter and digital channels a device exposes ([`DeviceConfig`]), their static attributes
//! (sample rates, voltage ranges, PFI routing) and the validation rules applied to them. It never talks
//! to the driver; `nitask_backend` builds DAQmx tasks on top of it.

pub mod channel;
pub mod device;
pub mod error;
pub mod utils;

pub use channel::*;
pub use device::*;
pub use error::*;
pub use utils::*;
