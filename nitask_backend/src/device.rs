//! Device-level facade over the task lifecycle. See [`Daq`] for details.
//!
//! ## Overview
//!
//! A [`Daq`] owns one device configuration, one driver and the registry of the tasks created on that
//! device. It exposes two layers:
//!
//! - **Task primitives**: `ao_init`, `ai_init`, `do_init`, `counter_init`, `gated_counter_init`, `run`,
//!   `wait`, `read_analog`, `read_counter`, `write_digital`, `stop`. Identifiers returned by the inits are
//!   handed back to the other primitives.
//! - **One-shot helpers** built from the primitives: [`Daq::set_analog_voltages`],
//!   [`Daq::get_analog_voltages`] and [`Daq::set_digital_output`].
//!
//! All methods take `&self`. The registry sits behind a single lock held for the whole of each operation,
//! so operations on one device never interleave their driver calls.
//!
//! Live tasks are stopped and cleared by [`Daq::shutdown`], which also runs when the `Daq` is dropped.

use indexmap::IndexMap;
use parking_lot::Mutex;

use nichannel_backend::*;

use crate::error::DaqError;
use crate::nidaqmx::*;
use crate::registry::*;
use crate::task::*;

pub struct Daq<D: DaqmxDriver> {
    cfg: DeviceConfig,
    driver: D,
    registry: Mutex<TaskRegistry>,
}

impl<D: DaqmxDriver> Daq<D> {
    /// Checks `cfg` and binds it to `driver`. No driver call is made.
    pub fn new(cfg: DeviceConfig, driver: D) -> Result<Self, DaqError> {
        cfg.check()?;
        log::info!("Bound device {} to DAQmx driver", cfg.device);
        Ok(Self {
            cfg,
            driver,
            registry: Mutex::new(TaskRegistry::new()),
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.cfg
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    fn with_engine<T, F>(&self, f: F) -> Result<T, DaqError>
    where
        F: FnOnce(&mut TaskEngine<'_, D>) -> Result<T, DaqError>,
    {
        let mut registry = self.registry.lock();
        let mut engine = TaskEngine::new(&self.driver, &self.cfg, &mut registry);
        f(&mut engine)
    }

    pub fn ao_init(
        &self,
        channels: &[&str],
        waveform: impl Into<Waveform>,
        clock_source: Option<&str>,
    ) -> Result<TaskId, DaqError> {
        let waveform = waveform.into();
        self.with_engine(|engine| engine.ao_init(channels, waveform, clock_source))
    }

    pub fn ai_init(&self, channel: &str, samples: usize) -> Result<TaskId, DaqError> {
        self.with_engine(|engine| engine.ai_init(channel, samples))
    }

    pub fn do_init(&self, channels: &[&str]) -> Result<TaskId, DaqError> {
        self.with_engine(|engine| engine.do_init(channels))
    }

    pub fn counter_init(
        &self,
        channel: &str,
        samples: usize,
        continuous: bool,
    ) -> Result<TaskId, DaqError> {
        self.with_engine(|engine| engine.counter_init(channel, samples, continuous))
    }

    pub fn gated_counter_init(&self, channel: &str, samples: usize) -> Result<TaskId, DaqError> {
        self.with_engine(|engine| engine.gated_counter_init(channel, samples))
    }

    pub fn run(&self, id: &TaskId) -> Result<(), DaqError> {
        self.with_engine(|engine| engine.run(id))
    }

    pub fn wait(&self, id: &TaskId) -> Result<(), DaqError> {
        self.with_engine(|engine| engine.wait(id))
    }

    pub fn read_analog(&self, id: &TaskId) -> Result<Vec<f64>, DaqError> {
        self.with_engine(|engine| engine.read_analog(id))
    }

    pub fn read_counter(&self, id: &TaskId) -> Result<Vec<f64>, DaqError> {
        self.with_engine(|engine| engine.read_counter(id))
    }

    pub fn write_digital(&self, id: &TaskId, values: &[bool]) -> Result<(), DaqError> {
        self.with_engine(|engine| engine.write_digital(id, values))
    }

    pub fn stop(&self, id: &TaskId) -> Result<(), DaqError> {
        self.with_engine(|engine| engine.stop(id))
    }

    pub fn sample_clock_terminal(&self, id: &TaskId) -> Result<Option<String>, DaqError> {
        self.with_engine(|engine| engine.sample_clock_terminal(id))
    }

    /// Snapshot of the record of a live task.
    pub fn task(&self, id: &TaskId) -> Result<TaskRecord, DaqError> {
        self.registry.lock().get(id).cloned()
    }

    pub fn live_tasks(&self) -> Vec<TaskId> {
        self.registry.lock().ids()
    }

    /// Drives each analog output to a constant voltage.
    ///
    /// Keys are analog output channel names, either full (`"ao0"`) or bare indices (`"0"`). A two-sample
    /// waveform per channel is generated with a finite AO task which is run to completion and stopped.
    /// The task is stopped even when running or waiting fails.
    pub fn set_analog_voltages(&self, voltages: &IndexMap<String, f64>) -> Result<(), DaqError> {
        if voltages.is_empty() {
            return Ok(());
        }
        let names = voltages
            .keys()
            .map(|k| normalize_channel_name("ao", k))
            .collect::<Result<Vec<_>, _>>()?;
        let names: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
        let values: Vec<f64> = voltages.values().copied().collect();
        let waveform = hold_waveform(&values);

        self.with_engine(|engine| {
            let id = engine.ao_init(&names, Waveform::Multi(waveform), None)?;
            let res = engine.run(&id).and_then(|_| engine.wait(&id));
            let stopped = engine.stop(&id);
            res.and(stopped)
        })
    }

    /// Reads the present voltage of each channel with an on-demand single-sample read.
    ///
    /// Analog output names read back the generated voltage through the internal `_aoN_vs_aognd` channel;
    /// analog input names are read directly. `ao_read_offset` is added to every value.
    pub fn get_analog_voltages(&self, channels: &[&str]) -> Result<IndexMap<String, f64>, DaqError> {
        let mut targets = Vec::with_capacity(channels.len());
        for &name in channels {
            let target = if let Ok(chan) = self.cfg.analog_output(name) {
                ao_readback_chan(&self.cfg.device, chan.channel)
            } else if let Ok(chan) = self.cfg.analog_input(name) {
                ai_chan(&self.cfg.device, chan.channel)
            } else {
                let category = if name.starts_with("ai") {
                    Category::AnalogInput
                } else {
                    Category::AnalogOutput
                };
                let device = self.cfg.device.clone();
                let err = if self.cfg.supports(category) {
                    ConfigError::InvalidChannel {
                        device,
                        category,
                        channel: name.to_string(),
                    }
                } else {
                    ConfigError::UnsupportedCategory { device, category }
                };
                return Err(err.into());
            };
            targets.push((name, target));
        }

        let offset = self.cfg.ao_read_offset;
        self.with_engine(|engine| {
            targets
                .into_iter()
                .map(|(name, physical_chan)| {
                    let raw = engine.on_demand_voltage(&physical_chan)?;
                    Ok::<_, DaqError>((name.to_string(), raw + offset))
                })
                .collect()
        })
    }

    /// Sets digital output lines. Keys are `"doN"` names or bare indices.
    pub fn set_digital_output(&self, values: &IndexMap<String, bool>) -> Result<(), DaqError> {
        if values.is_empty() {
            return Ok(());
        }
        let names = values
            .keys()
            .map(|k| normalize_channel_name("do", k))
            .collect::<Result<Vec<_>, _>>()?;
        let names: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
        let levels: Vec<bool> = values.values().copied().collect();

        self.with_engine(|engine| {
            let id = engine.do_init(&names)?;
            let res = engine
                .run(&id)
                .and_then(|_| engine.write_digital(&id, &levels));
            let stopped = engine.stop(&id);
            res.and(stopped)
        })
    }

    /// Whether the device answers a product type query. Never fails.
    pub fn is_connected(&self) -> bool {
        match self.product_type() {
            Ok(_) => true,
            Err(err) => {
                log::debug!("Device {} not reachable: {err}", self.cfg.device);
                false
            }
        }
    }

    pub fn product_type(&self) -> Result<String, DaqError> {
        let _guard = self.registry.lock();
        let mut product_type = String::new();
        daqmx_call(&self.driver, || {
            self.driver
                .get_dev_product_type(&self.cfg.device, &mut product_type)
        })?;
        Ok(product_type)
    }

    /// Stops every live task, then resets the device to its power-on state.
    pub fn reset_device(&self) -> Result<(), DaqError> {
        self.with_engine(|engine| {
            let stopped = engine.stop_all();
            daqmx_call(engine.driver, || engine.driver.reset_device(&engine.cfg.device))?;
            log::info!("Reset device {}", engine.cfg.device);
            stopped
        })
    }

    /// Stops and clears every live task. Failures are logged and the first one is returned; the registry
    /// is empty afterwards either way.
    pub fn shutdown(&self) -> Result<(), DaqError> {
        self.with_engine(|engine| {
            if !engine.registry.is_empty() {
                log::info!(
                    "Shutting down {} live task(s) on {}",
                    engine.registry.len(),
                    engine.cfg.device
                );
            }
            engine.stop_all()
        })
    }
}

impl<D: DaqmxDriver> Drop for Daq<D> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::warn!("Device {} shutdown incomplete: {err}", self.cfg.device);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::*;
    use indexmap::indexmap;

    fn daq() -> Daq<SimDaqmx> {
        Daq::new(DeviceConfig::ni6259(), SimDaqmx::new()).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let mut cfg = DeviceConfig::ni6259();
        cfg.device = String::from("Dev1/ao0");
        assert!(matches!(
            Daq::new(cfg, SimDaqmx::new()),
            Err(DaqError::Config(_))
        ));
    }

    #[test]
    /// Bare indices are accepted and the task leaves nothing behind.
    fn set_analog_voltages_bare_keys() {
        let daq = daq();
        daq.set_analog_voltages(&indexmap! { String::from("1") => 2.5 })
            .unwrap();
        assert!(daq.live_tasks().is_empty());
        assert!(daq.driver().live_handles().is_empty());
        let (_, task) = daq.driver().tasks().pop().unwrap();
        assert_eq!(task.analog_written, vec![2.5, 2.5]);
    }

    #[test]
    fn set_analog_voltages_stops_on_wait_failure() {
        let daq = daq();
        daq.driver().fail_on("DAQmxWaitUntilTaskDone", -200560);
        let res = daq.set_analog_voltages(&indexmap! { String::from("ao0") => 1. });
        assert!(matches!(res, Err(DaqError::AcquisitionTimeout { .. })));
        assert!(daq.live_tasks().is_empty());
        assert!(daq.driver().live_handles().is_empty());
    }

    #[test]
    fn get_analog_voltages_paths() {
        let daq = daq();
        daq.driver().set_analog_value(0.5);
        let res = daq.get_analog_voltages(&["ao2", "ai1"]).unwrap();
        assert_eq!(res.keys().collect::<Vec<_>>(), vec!["ao2", "ai1"]);
        let chans: Vec<SimChannel> = daq
            .driver()
            .tasks()
            .into_iter()
            .flat_map(|(_, t)| t.channels)
            .collect();
        assert!(matches!(&chans[0], SimChannel::AiVoltage { chans, .. } if chans == "Dev1/_ao2_vs_aognd"));
        assert!(matches!(&chans[1], SimChannel::AiVoltage { chans, .. } if chans == "Dev1/ai1"));
        // Transient tasks are cleared and never registered
        assert!(daq.driver().live_handles().is_empty());
        assert!(daq.live_tasks().is_empty());
    }

    #[test]
    fn set_digital_output_writes_lines() {
        let daq = daq();
        daq.set_digital_output(&indexmap! { String::from("0") => true })
            .unwrap();
        let (_, task) = daq.driver().tasks().pop().unwrap();
        assert_eq!(task.digital_written, vec![1]);
        assert!(task.cleared);
        assert!(daq.set_digital_output(&indexmap! { String::from("do3") => true }).is_err());
    }

    #[test]
    fn connection_state() {
        let daq = daq();
        assert!(daq.is_connected());
        assert_eq!(daq.product_type().unwrap(), "PCI-6259");
        daq.driver().set_connected(false);
        assert!(!daq.is_connected());
    }

    #[test]
    fn reset_stops_live_tasks() {
        let daq = daq();
        daq.ai_init("ai0", 10).unwrap();
        daq.reset_device().unwrap();
        assert!(daq.live_tasks().is_empty());
        assert_eq!(daq.driver().resets(), 1);
    }
}
