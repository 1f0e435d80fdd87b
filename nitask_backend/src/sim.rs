//! In-memory stand-in for the NI-DAQmx driver.
//!
//! [`SimDaqmx`] implements [`DaqmxDriver`] without hardware: it hands out task handles, remembers what was
//! configured on each of them (channels, timing, counter attributes, written buffers) and logs every call
//! by its DAQmx C-function name. Reads return a configurable analog value and counter samples.
//!
//! Failures are injected per function with [`SimDaqmx::fail_on`]; the call then returns the given status
//! code instead of doing anything. This is how rollback and timeout paths are exercised.

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::nidaqmx::*;

/// Status returned for calls on an unknown or cleared handle (`DAQmxErrorInvalidTask`)
pub const SIM_INVALID_TASK: CInt32 = -200088;
/// Status returned by every call while the simulated device is disconnected (`DAQmxErrorInvalidDeviceID`)
pub const SIM_DEVICE_NOT_FOUND: CInt32 = -200220;

#[derive(Clone, Debug, PartialEq)]
pub enum SimChannel {
    AoVoltage {
        chans: String,
        min: f64,
        max: f64,
        units: CInt32,
    },
    AiVoltage {
        chans: String,
        terminal_config: CInt32,
        min: f64,
        max: f64,
        units: CInt32,
    },
    DoLines {
        lines: String,
        line_grouping: CInt32,
    },
    CiCountEdges {
        counter: String,
        edge: CInt32,
        initial_count: u32,
        count_direction: CInt32,
    },
    CiPulseWidth {
        counter: String,
        min: f64,
        max: f64,
        units: CInt32,
        starting_edge: CInt32,
    },
    CoPulseFreq {
        counter: String,
        units: CInt32,
        idle_state: CInt32,
        initial_delay: f64,
        freq: f64,
        duty_cycle: f64,
    },
}

impl SimChannel {
    fn num_chans(&self) -> usize {
        match self {
            SimChannel::AoVoltage { chans, .. } | SimChannel::AiVoltage { chans, .. } => {
                chans.split(',').count()
            }
            SimChannel::DoLines { lines, .. } => lines.split(',').count(),
            _ => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SimTiming {
    SampleClock {
        source: String,
        rate: f64,
        active_edge: CInt32,
        sample_mode: CInt32,
        samps_per_chan: u64,
    },
    Implicit {
        sample_mode: CInt32,
        samps_per_chan: u64,
    },
}

/// What the simulated driver knows about one task handle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimTask {
    pub name: String,
    pub channels: Vec<SimChannel>,
    pub timing: Option<SimTiming>,
    pub timebase_src: Option<String>,
    pub dup_count_prevent: Option<bool>,
    pub analog_written: Vec<f64>,
    pub digital_written: Vec<u8>,
    pub started: bool,
    pub cleared: bool,
}

impl SimTask {
    fn num_chans(&self) -> usize {
        self.channels.iter().map(|c| c.num_chans()).sum::<usize>().max(1)
    }
}

struct SimState {
    next_handle: usize,
    tasks: IndexMap<TaskHandle, SimTask>,
    calls: Vec<(&'static str, Option<TaskHandle>)>,
    failures: HashMap<&'static str, CInt32>,
    analog_value: f64,
    counter_samples: Vec<f64>,
    product_type: String,
    connected: bool,
    resets: usize,
}

impl SimState {
    // Logs the call and returns the status it must fail with, if any
    fn enter(&mut self, func: &'static str, handle: Option<TaskHandle>) -> Option<CInt32> {
        self.calls.push((func, handle));
        if !self.connected {
            return Some(SIM_DEVICE_NOT_FOUND);
        }
        self.failures.get(func).copied()
    }

    fn live_task_mut(&mut self, handle: TaskHandle) -> Option<&mut SimTask> {
        self.tasks.get_mut(&handle).filter(|task| !task.cleared)
    }
}

/// Clones share the same simulated device, so a test can keep inspecting the driver after handing a
/// clone to a [`crate::Daq`].
#[derive(Clone)]
pub struct SimDaqmx {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimDaqmx {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDaqmx {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                next_handle: 1,
                tasks: IndexMap::new(),
                calls: Vec::new(),
                failures: HashMap::new(),
                analog_value: 0.,
                counter_samples: Vec::new(),
                product_type: String::from("PCI-6259"),
                connected: true,
                resets: 0,
            })),
        }
    }

    /// Makes every subsequent call of `func` (e.g. `"DAQmxStartTask"`) return `code`.
    pub fn fail_on(&self, func: &'static str, code: CInt32) {
        self.state.lock().failures.insert(func, code);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Value returned for every sample of an analog read.
    pub fn set_analog_value(&self, value: f64) {
        self.state.lock().analog_value = value;
    }

    /// Samples returned by counter reads. Reads past the end return the sample index.
    pub fn set_counter_samples(&self, samples: Vec<f64>) {
        self.state.lock().counter_samples = samples;
    }

    pub fn set_product_type(&self, product_type: &str) {
        self.state.lock().product_type = product_type.to_string();
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    /// Names of all calls made so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.iter().map(|(f, _)| *f).collect()
    }

    /// Names of the calls made on `handle`, in order.
    pub fn calls_on(&self, handle: TaskHandle) -> Vec<&'static str> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|(_, h)| *h == Some(handle))
            .map(|(f, _)| *f)
            .collect()
    }

    pub fn call_count(&self, func: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|(f, _)| *f == func)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn task(&self, handle: TaskHandle) -> Option<SimTask> {
        self.state.lock().tasks.get(&handle).cloned()
    }

    /// Every handle ever created, in creation order, cleared ones included.
    pub fn tasks(&self) -> Vec<(TaskHandle, SimTask)> {
        self.state
            .lock()
            .tasks
            .iter()
            .map(|(h, t)| (*h, t.clone()))
            .collect()
    }

    /// Handles created and not cleared yet.
    pub fn live_handles(&self) -> Vec<TaskHandle> {
        self.state
            .lock()
            .tasks
            .iter()
            .filter(|(_, t)| !t.cleared)
            .map(|(h, _)| *h)
            .collect()
    }

    pub fn resets(&self) -> usize {
        self.state.lock().resets
    }

    fn task_call<F>(&self, func: &'static str, handle: TaskHandle, f: F) -> DaqmxStatus
    where
        F: FnOnce(&mut SimTask),
    {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(func, Some(handle)) {
            return code.into();
        }
        match state.live_task_mut(handle) {
            Some(task) => {
                f(task);
                DaqmxStatus::Success
            }
            None => DaqmxStatus::Error(SIM_INVALID_TASK),
        }
    }
}

impl DaqmxDriver for SimDaqmx {
    fn create_task(&self, name: &str, handle: &mut TaskHandle) -> DaqmxStatus {
        let mut state = self.state.lock();
        if let Some(code) = state.enter("DAQmxCreateTask", None) {
            return code.into();
        }
        let new_handle = TaskHandle::from_raw(state.next_handle);
        state.next_handle += 1;
        state.tasks.insert(
            new_handle,
            SimTask {
                name: name.to_string(),
                ..Default::default()
            },
        );
        // Later calls on this handle are attributed to it
        if let Some(last) = state.calls.last_mut() {
            last.1 = Some(new_handle);
        }
        *handle = new_handle;
        DaqmxStatus::Success
    }

    fn start_task(&self, handle: TaskHandle) -> DaqmxStatus {
        self.task_call("DAQmxStartTask", handle, |task| task.started = true)
    }

    fn stop_task(&self, handle: TaskHandle) -> DaqmxStatus {
        self.task_call("DAQmxStopTask", handle, |task| task.started = false)
    }

    fn clear_task(&self, handle: TaskHandle) -> DaqmxStatus {
        self.task_call("DAQmxClearTask", handle, |task| {
            task.started = false;
            task.cleared = true;
        })
    }

    fn wait_until_task_done(&self, handle: TaskHandle, _timeout: f64) -> DaqmxStatus {
        self.task_call("DAQmxWaitUntilTaskDone", handle, |_| {})
    }

    fn create_ao_voltage_chan(
        &self,
        handle: TaskHandle,
        physical_chan: &str,
        min_val: f64,
        max_val: f64,
        units: CInt32,
    ) -> DaqmxStatus {
        self.task_call("DAQmxCreateAOVoltageChan", handle, |task| {
            task.channels.push(SimChannel::AoVoltage {
                chans: physical_chan.to_string(),
                min: min_val,
                max: max_val,
                units,
            })
        })
    }

    fn create_ai_voltage_chan(
        &self,
        handle: TaskHandle,
        physical_chan: &str,
        terminal_config: CInt32,
        min_val: f64,
        max_val: f64,
        units: CInt32,
    ) -> DaqmxStatus {
        self.task_call("DAQmxCreateAIVoltageChan", handle, |task| {
            task.channels.push(SimChannel::AiVoltage {
                chans: physical_chan.to_string(),
                terminal_config,
                min: min_val,
                max: max_val,
                units,
            })
        })
    }

    fn create_do_chan(
        &self,
        handle: TaskHandle,
        lines: &str,
        line_grouping: CInt32,
    ) -> DaqmxStatus {
        self.task_call("DAQmxCreateDOChan", handle, |task| {
            task.channels.push(SimChannel::DoLines {
                lines: lines.to_string(),
                line_grouping,
            })
        })
    }

    fn create_ci_count_edges_chan(
        &self,
        handle: TaskHandle,
        counter: &str,
        edge: CInt32,
        initial_count: u32,
        count_direction: CInt32,
    ) -> DaqmxStatus {
        self.task_call("DAQmxCreateCICountEdgesChan", handle, |task| {
            task.channels.push(SimChannel::CiCountEdges {
                counter: counter.to_string(),
                edge,
                initial_count,
                count_direction,
            })
        })
    }

    fn create_ci_pulse_width_chan(
        &self,
        handle: TaskHandle,
        counter: &str,
        min_val: f64,
        max_val: f64,
        units: CInt32,
        starting_edge: CInt32,
    ) -> DaqmxStatus {
        self.task_call("DAQmxCreateCIPulseWidthChan", handle, |task| {
            task.channels.push(SimChannel::CiPulseWidth {
                counter: counter.to_string(),
                min: min_val,
                max: max_val,
                units,
                starting_edge,
            })
        })
    }

    fn create_co_pulse_chan_freq(
        &self,
        handle: TaskHandle,
        counter: &str,
        units: CInt32,
        idle_state: CInt32,
        initial_delay: f64,
        freq: f64,
        duty_cycle: f64,
    ) -> DaqmxStatus {
        self.task_call("DAQmxCreateCOPulseChanFreq", handle, |task| {
            task.channels.push(SimChannel::CoPulseFreq {
                counter: counter.to_string(),
                units,
                idle_state,
                initial_delay,
                freq,
                duty_cycle,
            })
        })
    }

    fn cfg_samp_clk_timing(
        &self,
        handle: TaskHandle,
        source: &str,
        rate: f64,
        active_edge: CInt32,
        sample_mode: CInt32,
        samps_per_chan: u64,
    ) -> DaqmxStatus {
        self.task_call("DAQmxCfgSampClkTiming", handle, |task| {
            task.timing = Some(SimTiming::SampleClock {
                source: source.to_string(),
                rate,
                active_edge,
                sample_mode,
                samps_per_chan,
            })
        })
    }

    fn cfg_implicit_timing(
        &self,
        handle: TaskHandle,
        sample_mode: CInt32,
        samps_per_chan: u64,
    ) -> DaqmxStatus {
        self.task_call("DAQmxCfgImplicitTiming", handle, |task| {
            task.timing = Some(SimTiming::Implicit {
                sample_mode,
                samps_per_chan,
            })
        })
    }

    fn set_ci_ctr_timebase_src(
        &self,
        handle: TaskHandle,
        _chan: &str,
        source: &str,
    ) -> DaqmxStatus {
        self.task_call("DAQmxSetCICtrTimebaseSrc", handle, |task| {
            task.timebase_src = Some(source.to_string())
        })
    }

    fn set_ci_dup_count_prevent(
        &self,
        handle: TaskHandle,
        _chan: &str,
        enable: bool,
    ) -> DaqmxStatus {
        self.task_call("DAQmxSetCIDupCountPrevent", handle, |task| {
            task.dup_count_prevent = Some(enable)
        })
    }

    fn write_analog_f64(
        &self,
        handle: TaskHandle,
        samps_per_chan: CInt32,
        _auto_start: bool,
        _timeout: f64,
        _data_layout: u32,
        data: &[f64],
        samps_written: &mut CInt32,
    ) -> DaqmxStatus {
        let status = self.task_call("DAQmxWriteAnalogF64", handle, |task| {
            task.analog_written = data.to_vec()
        });
        if status == DaqmxStatus::Success {
            *samps_written = samps_per_chan;
        }
        status
    }

    fn write_digital_lines(
        &self,
        handle: TaskHandle,
        samps_per_chan: CInt32,
        _auto_start: bool,
        _timeout: f64,
        _data_layout: u32,
        data: &[u8],
        samps_written: &mut CInt32,
    ) -> DaqmxStatus {
        let status = self.task_call("DAQmxWriteDigitalLines", handle, |task| {
            task.digital_written = data.to_vec()
        });
        if status == DaqmxStatus::Success {
            *samps_written = samps_per_chan;
        }
        status
    }

    fn read_analog_f64(
        &self,
        handle: TaskHandle,
        samps_per_chan: CInt32,
        _timeout: f64,
        _fill_mode: u32,
        data: &mut [f64],
        samps_read: &mut CInt32,
    ) -> DaqmxStatus {
        let mut state = self.state.lock();
        if let Some(code) = state.enter("DAQmxReadAnalogF64", Some(handle)) {
            return code.into();
        }
        let value = state.analog_value;
        let Some(task) = state.live_task_mut(handle) else {
            return DaqmxStatus::Error(SIM_INVALID_TASK);
        };
        let num_chans = task.num_chans();
        let capacity = data.len() / num_chans;
        let per_chan = if samps_per_chan < 0 {
            capacity
        } else {
            capacity.min(samps_per_chan as usize)
        };
        data[..per_chan * num_chans].fill(value);
        *samps_read = per_chan as CInt32;
        DaqmxStatus::Success
    }

    fn read_counter_f64(
        &self,
        handle: TaskHandle,
        samps_per_chan: CInt32,
        _timeout: f64,
        data: &mut [f64],
        samps_read: &mut CInt32,
    ) -> DaqmxStatus {
        let mut state = self.state.lock();
        if let Some(code) = state.enter("DAQmxReadCounterF64", Some(handle)) {
            return code.into();
        }
        let samples = state.counter_samples.clone();
        if state.live_task_mut(handle).is_none() {
            return DaqmxStatus::Error(SIM_INVALID_TASK);
        }
        // Read-all-available returns whatever was "acquired"
        let count = if samps_per_chan < 0 {
            samples.len().min(data.len())
        } else {
            data.len().min(samps_per_chan as usize)
        };
        for (i, slot) in data.iter_mut().take(count).enumerate() {
            *slot = samples.get(i).copied().unwrap_or(i as f64);
        }
        *samps_read = count as CInt32;
        DaqmxStatus::Success
    }

    fn get_error_string(&self, code: CInt32) -> String {
        match code {
            DAQMX_ERROR_SAMPLES_NOT_YET_AVAILABLE => String::from(
                "Some or all of the samples requested have not yet been acquired.",
            ),
            DAQMX_ERROR_OPERATION_TIMED_OUT => String::from("Operation timed out."),
            SIM_INVALID_TASK => String::from("Task specified is invalid or does not exist."),
            SIM_DEVICE_NOT_FOUND => String::from("Device identifier is invalid."),
            _ => format!("Simulated DAQmx status {code}"),
        }
    }

    fn get_dev_product_type(&self, _device: &str, product_type: &mut String) -> DaqmxStatus {
        let mut state = self.state.lock();
        if let Some(code) = state.enter("DAQmxGetDevProductType", None) {
            return code.into();
        }
        *product_type = state.product_type.clone();
        DaqmxStatus::Success
    }

    fn reset_device(&self, _device: &str) -> DaqmxStatus {
        let mut state = self.state.lock();
        if let Some(code) = state.enter("DAQmxResetDevice", None) {
            return code.into();
        }
        state.resets += 1;
        for task in state.tasks.values_mut() {
            task.started = false;
        }
        DaqmxStatus::Success
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn handles_are_distinct_and_clearable() {
        let sim = SimDaqmx::new();
        let (mut a, mut b) = (TaskHandle::default(), TaskHandle::default());
        assert_eq!(sim.create_task("", &mut a), DaqmxStatus::Success);
        assert_eq!(sim.create_task("", &mut b), DaqmxStatus::Success);
        assert_ne!(a, b);
        assert!(!a.is_null());

        assert_eq!(sim.clear_task(a), DaqmxStatus::Success);
        assert_eq!(sim.start_task(a), DaqmxStatus::Error(SIM_INVALID_TASK));
        assert_eq!(sim.live_handles(), vec![b]);
        assert_eq!(sim.calls_on(a), vec!["DAQmxCreateTask", "DAQmxClearTask", "DAQmxStartTask"]);
    }

    #[test]
    fn injected_failure() {
        let sim = SimDaqmx::new();
        let mut handle = TaskHandle::default();
        sim.create_task("", &mut handle);
        sim.fail_on("DAQmxStartTask", -200479);
        assert_eq!(sim.start_task(handle), DaqmxStatus::Error(-200479));
        assert!(!sim.task(handle).unwrap().started);
        sim.clear_failures();
        assert_eq!(sim.start_task(handle), DaqmxStatus::Success);
        assert_eq!(sim.call_count("DAQmxStartTask"), 2);
    }

    #[test]
    /// Reads fill one value per channel and sample, bounded by the buffer.
    fn analog_read_fills_buffer() {
        let sim = SimDaqmx::new();
        sim.set_analog_value(1.25);
        let mut handle = TaskHandle::default();
        sim.create_task("", &mut handle);
        sim.create_ai_voltage_chan(handle, "Dev1/ai0,Dev1/ai1", -1, -10., 10., DAQMX_VAL_VOLTS);
        let mut buf = vec![0.; 8];
        let mut read = 0;
        sim.read_analog_f64(handle, 3, 1., 0, &mut buf, &mut read);
        assert_eq!(read, 3);
        assert_eq!(buf, vec![1.25, 1.25, 1.25, 1.25, 1.25, 1.25, 0., 0.]);
    }

    #[test]
    fn disconnected_device() {
        let sim = SimDaqmx::new();
        sim.set_connected(false);
        let mut product = String::new();
        assert_eq!(
            sim.get_dev_product_type("Dev1", &mut product),
            DaqmxStatus::Error(SIM_DEVICE_NOT_FOUND)
        );
        assert!(product.is_empty());
    }
}
