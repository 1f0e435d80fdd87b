//! Python bindings: the `Daq` class used by experiment scripts.
//!
//! Task identifiers cross the boundary as plain strings. Waveforms go in as 2-D numpy arrays (one row
//! per channel); acquired samples come back as 1-D numpy arrays. Every [`DaqError`] is raised as
//! `DaqException`. Blocking operations release the GIL.

use indexmap::IndexMap;
use numpy::{PyArray1, PyReadonlyArray2};
use pyo3::create_exception;
use pyo3::exceptions::PyException;
use pyo3::prelude::*;
use std::collections::HashMap;

use nichannel_backend::DeviceConfig;

use crate::device::Daq;
use crate::error::DaqError;
use crate::nidaqmx::NiDaqmx;
use crate::registry::TaskId;
use crate::task::Waveform;

create_exception!(nitask_backend, DaqException, PyException);

fn to_py_err(err: DaqError) -> PyErr {
    DaqException::new_err(err.to_string())
}

#[pyclass(name = "Daq")]
pub struct PyDaq {
    inner: Daq<NiDaqmx>,
}

#[pymethods]
impl PyDaq {
    /// Loads the device configuration (NI 6259 defaults without a path) and connects to the driver.
    #[new]
    #[pyo3(signature = (config_path=None))]
    fn new(config_path: Option<&str>) -> PyResult<Self> {
        let cfg = match config_path {
            Some(path) => DeviceConfig::load(path).map_err(|e| to_py_err(e.into()))?,
            None => DeviceConfig::default(),
        };
        let driver = NiDaqmx::connect().map_err(to_py_err)?;
        let inner = Daq::new(cfg, driver).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    #[staticmethod]
    fn probe() -> bool {
        NiDaqmx::probe()
    }

    #[getter]
    fn device(&self) -> String {
        self.inner.config().device.clone()
    }

    #[pyo3(signature = (channels, waveform, clock_source=None))]
    fn ao_init(
        &self,
        channels: Vec<&str>,
        waveform: PyReadonlyArray2<f64>,
        clock_source: Option<&str>,
    ) -> PyResult<String> {
        let waveform = Waveform::Multi(waveform.as_array().to_owned());
        self.inner
            .ao_init(&channels, waveform, clock_source)
            .map(|id| id.to_string())
            .map_err(to_py_err)
    }

    fn ai_init(&self, channel: &str, samples: usize) -> PyResult<String> {
        self.inner
            .ai_init(channel, samples)
            .map(|id| id.to_string())
            .map_err(to_py_err)
    }

    fn do_init(&self, channels: Vec<&str>) -> PyResult<String> {
        self.inner
            .do_init(&channels)
            .map(|id| id.to_string())
            .map_err(to_py_err)
    }

    #[pyo3(signature = (channel, samples, continuous=false))]
    fn counter_init(&self, channel: &str, samples: usize, continuous: bool) -> PyResult<String> {
        self.inner
            .counter_init(channel, samples, continuous)
            .map(|id| id.to_string())
            .map_err(to_py_err)
    }

    fn gated_counter_init(&self, channel: &str, samples: usize) -> PyResult<String> {
        self.inner
            .gated_counter_init(channel, samples)
            .map(|id| id.to_string())
            .map_err(to_py_err)
    }

    fn run(&self, id: &str) -> PyResult<()> {
        self.inner.run(&TaskId::from(id)).map_err(to_py_err)
    }

    fn wait(&self, py: Python, id: &str) -> PyResult<()> {
        let id = TaskId::from(id);
        py.allow_threads(|| self.inner.wait(&id)).map_err(to_py_err)
    }

    fn read_analog<'py>(&self, py: Python<'py>, id: &str) -> PyResult<&'py PyArray1<f64>> {
        let id = TaskId::from(id);
        let samples = py
            .allow_threads(|| self.inner.read_analog(&id))
            .map_err(to_py_err)?;
        Ok(PyArray1::from_vec(py, samples))
    }

    fn read_counter<'py>(&self, py: Python<'py>, id: &str) -> PyResult<&'py PyArray1<f64>> {
        let id = TaskId::from(id);
        let samples = py
            .allow_threads(|| self.inner.read_counter(&id))
            .map_err(to_py_err)?;
        Ok(PyArray1::from_vec(py, samples))
    }

    fn write_digital(&self, id: &str, values: Vec<bool>) -> PyResult<()> {
        self.inner
            .write_digital(&TaskId::from(id), &values)
            .map_err(to_py_err)
    }

    fn stop(&self, id: &str) -> PyResult<()> {
        self.inner.stop(&TaskId::from(id)).map_err(to_py_err)
    }

    fn sample_clock_terminal(&self, id: &str) -> PyResult<Option<String>> {
        self.inner
            .sample_clock_terminal(&TaskId::from(id))
            .map_err(to_py_err)
    }

    fn live_tasks(&self) -> Vec<String> {
        self.inner
            .live_tasks()
            .iter()
            .map(|id| id.to_string())
            .collect()
    }

    fn set_analog_voltages(&self, py: Python, voltages: HashMap<String, f64>) -> PyResult<()> {
        let voltages: IndexMap<String, f64> = voltages.into_iter().collect();
        py.allow_threads(|| self.inner.set_analog_voltages(&voltages))
            .map_err(to_py_err)
    }

    fn get_analog_voltages(&self, channels: Vec<&str>) -> PyResult<HashMap<String, f64>> {
        self.inner
            .get_analog_voltages(&channels)
            .map(|voltages| voltages.into_iter().collect())
            .map_err(to_py_err)
    }

    fn set_digital_output(&self, values: HashMap<String, bool>) -> PyResult<()> {
        let values: IndexMap<String, bool> = values.into_iter().collect();
        self.inner.set_digital_output(&values).map_err(to_py_err)
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn product_type(&self) -> PyResult<String> {
        self.inner.product_type().map_err(to_py_err)
    }

    fn reset_device(&self) -> PyResult<()> {
        self.inner.reset_device().map_err(to_py_err)
    }

    fn shutdown(&self) -> PyResult<()> {
        self.inner.shutdown().map_err(to_py_err)
    }
}
