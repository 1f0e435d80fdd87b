//! Task lifecycle layer on top of the National Instrument (NI) DAQmx driver.
//!
//! Builds analog output, analog input, digital output, free-running counter and gated counter tasks
//! from the channel configuration of `nichannel_backend`, runs them and tears them down. Hardware is
//! reached through the [`DaqmxDriver`] trait: [`NiDaqmx`] for the real driver, [`SimDaqmx`] for tests
//! and dry runs. [`Daq`] is the entry point.

pub mod device;
pub mod error;
pub mod nidaqmx;
#[cfg(feature = "python")]
pub mod python;
pub mod registry;
pub mod sim;
pub mod task;

pub use crate::device::*;
pub use crate::error::*;
pub use crate::nidaqmx::*;
pub use crate::registry::*;
pub use crate::sim::*;
pub use crate::task::*;

#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[pymodule]
fn nitask_backend(py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<python::PyDaq>()?;
    m.add("DaqException", py.get_type::<python::DaqException>())?;
    Ok(())
}
