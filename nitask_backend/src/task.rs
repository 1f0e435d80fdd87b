//! Task lifecycle: configuration, run, read / write, wait and teardown of DAQmx tasks.
//!
//! ## Overview
//!
//! [`NiTask`] wraps a single DAQmx task handle. Its methods are thin wrappers around [`DaqmxDriver`]
//! calls and return [`DaqmxError`]s through [`daqmx_call`]. A `NiTask` clears its handle when dropped,
//! so a task whose configuration fails halfway never leaks: the half-built handle is cleared as soon as
//! the error propagates out of the init routine. Once a task is fully configured, ownership of the handle
//! moves to the [`TaskRegistry`] via [`NiTask::into_handle`].
//!
//! [`TaskEngine`] implements the lifecycle on top of a device configuration and a registry:
//!
//! | operation | task kind | notes |
//! |---|---|---|
//! | [`TaskEngine::ao_init`] | AO | waveform written, not started |
//! | [`TaskEngine::ai_init`] | AI | single channel, finite |
//! | [`TaskEngine::do_init`] | DO | on-demand line writes |
//! | [`TaskEngine::counter_init`] | counter | edge counter + internal clock generator (started at init) |
//! | [`TaskEngine::gated_counter_init`] | gated counter | pulse width in timebase ticks, external gate |
//! | [`TaskEngine::run`] / [`TaskEngine::wait`] / [`TaskEngine::stop`] | any | |
//! | [`TaskEngine::read_analog`] / [`TaskEngine::read_counter`] / [`TaskEngine::write_digital`] | | running tasks only |
//!
//! Every init validates its arguments against the [`DeviceConfig`] before issuing the first driver call.
//! Task identifiers are only allocated once the hardware is fully configured.

use ndarray::{Array1, Array2, Axis};

use nichannel_backend::*;

use crate::error::DaqError;
use crate::nidaqmx::*;
use crate::registry::*;

/// Timeout used for on-demand (single sample) reads and writes
pub const ON_DEMAND_TIMEOUT: f64 = 10.;

/// Range of every analog voltage channel, in volts. Configured channel ranges do not narrow it.
pub const VOLTAGE_RANGE: (f64, f64) = (-10., 10.);

/// Completion timeout of an AO / AI task of `samples` samples at `rate` Hz.
pub fn analog_timeout(samples: usize, rate: f64) -> f64 {
    4. * samples as f64 / rate + 1.
}

/// Completion timeout of a free-running counter acquiring `samples` samples at `rate` Hz.
pub fn counter_timeout(samples: usize, rate: f64) -> f64 {
    5. * samples as f64 / rate
}

/// Waveform holding each of `values` for two samples, one row per channel.
pub fn hold_waveform(values: &[f64]) -> Array2<f64> {
    Array2::from_shape_fn((values.len(), 2), |(row, _)| values[row])
}

/// Output data for an AO task: one row per channel, one column per sample.
#[derive(Clone, Debug, PartialEq)]
pub enum Waveform {
    Single(Array1<f64>),
    Multi(Array2<f64>),
}

impl Waveform {
    pub fn into_rows(self) -> Array2<f64> {
        match self {
            Waveform::Single(arr) => arr.insert_axis(Axis(0)),
            Waveform::Multi(arr) => arr,
        }
    }
}

impl From<Array1<f64>> for Waveform {
    fn from(arr: Array1<f64>) -> Self {
        Waveform::Single(arr)
    }
}

impl From<Array2<f64>> for Waveform {
    fn from(arr: Array2<f64>) -> Self {
        Waveform::Multi(arr)
    }
}

impl From<Vec<f64>> for Waveform {
    fn from(samples: Vec<f64>) -> Self {
        Waveform::Single(Array1::from(samples))
    }
}

/// Owner of one DAQmx task handle.
///
/// The handle is cleared on drop unless it was handed over with [`NiTask::into_handle`].
///
/// # Examples
///
/// ```ignore
/// let task = NiTask::new(driver)?;
/// task.create_ai_chan("Dev1/ai0", -10., 10.)?;
/// let handle = task.into_handle();
/// ```
pub struct NiTask<'a, D: DaqmxDriver + ?Sized> {
    driver: &'a D,
    handle: TaskHandle,
    released: bool,
}

impl<'a, D: DaqmxDriver + ?Sized> NiTask<'a, D> {
    pub fn new(driver: &'a D) -> Result<Self, DaqmxError> {
        let mut handle = TaskHandle::default();
        daqmx_call(driver, || driver.create_task("", &mut handle))?;
        Ok(Self {
            driver,
            handle,
            released: false,
        })
    }

    pub fn handle(&self) -> TaskHandle {
        self.handle
    }

    /// Gives up ownership: the handle will not be cleared on drop.
    pub fn into_handle(mut self) -> TaskHandle {
        self.released = true;
        self.handle
    }

    /// Clears the handle now, reporting failure instead of only logging it.
    pub fn clear(mut self) -> Result<(), DaqmxError> {
        self.released = true;
        daqmx_call(self.driver, || self.driver.clear_task(self.handle))
    }

    pub fn start(&self) -> Result<(), DaqmxError> {
        daqmx_call(self.driver, || self.driver.start_task(self.handle))
    }

    pub fn create_ao_chan(&self, chans: &str, min: f64, max: f64) -> Result<(), DaqmxError> {
        daqmx_call(self.driver, || {
            self.driver
                .create_ao_voltage_chan(self.handle, chans, min, max, DAQMX_VAL_VOLTS)
        })
    }

    pub fn create_ai_chan(&self, chans: &str, min: f64, max: f64) -> Result<(), DaqmxError> {
        daqmx_call(self.driver, || {
            self.driver.create_ai_voltage_chan(
                self.handle,
                chans,
                DAQMX_VAL_CFG_DEFAULT,
                min,
                max,
                DAQMX_VAL_VOLTS,
            )
        })
    }

    pub fn create_do_chan(&self, lines: &str) -> Result<(), DaqmxError> {
        daqmx_call(self.driver, || {
            self.driver
                .create_do_chan(self.handle, lines, DAQMX_VAL_CHANPERLINE)
        })
    }

    pub fn create_ci_count_edges_chan(&self, counter: &str) -> Result<(), DaqmxError> {
        daqmx_call(self.driver, || {
            self.driver.create_ci_count_edges_chan(
                self.handle,
                counter,
                DAQMX_VAL_RISING,
                0,
                DAQMX_VAL_COUNTUP,
            )
        })
    }

    /// Pulse-width channel measuring in timebase ticks (0 to 100000).
    pub fn create_ci_pulse_width_chan(&self, counter: &str) -> Result<(), DaqmxError> {
        daqmx_call(self.driver, || {
            self.driver.create_ci_pulse_width_chan(
                self.handle,
                counter,
                0.,
                100000.,
                DAQMX_VAL_TICKS,
                DAQMX_VAL_RISING,
            )
        })
    }

    /// 50% duty cycle square wave at `freq` Hz, idle low.
    pub fn create_co_pulse_chan_freq(&self, counter: &str, freq: f64) -> Result<(), DaqmxError> {
        daqmx_call(self.driver, || {
            self.driver.create_co_pulse_chan_freq(
                self.handle,
                counter,
                DAQMX_VAL_HZ,
                DAQMX_VAL_LOW,
                0.,
                freq,
                0.5,
            )
        })
    }

    pub fn cfg_sample_clk(
        &self,
        clk_src: &str,
        samp_rate: f64,
        sample_mode: CInt32,
        seq_len: usize,
    ) -> Result<(), DaqmxError> {
        daqmx_call(self.driver, || {
            self.driver.cfg_samp_clk_timing(
                self.handle,
                clk_src,
                samp_rate,
                DAQMX_VAL_RISING,
                sample_mode,
                seq_len as u64,
            )
        })
    }

    pub fn cfg_implicit_timing(&self, sample_mode: CInt32, seq_len: usize) -> Result<(), DaqmxError> {
        daqmx_call(self.driver, || {
            self.driver
                .cfg_implicit_timing(self.handle, sample_mode, seq_len as u64)
        })
    }

    pub fn set_ctr_timebase_src(&self, counter: &str, src: &str) -> Result<(), DaqmxError> {
        daqmx_call(self.driver, || {
            self.driver.set_ci_ctr_timebase_src(self.handle, counter, src)
        })
    }

    pub fn set_dup_count_prevent(&self, counter: &str, enable: bool) -> Result<(), DaqmxError> {
        daqmx_call(self.driver, || {
            self.driver.set_ci_dup_count_prevent(self.handle, counter, enable)
        })
    }

    /// Reads up to `samps_per_chan` samples per channel into `buf`. Returns the number of samples per
    /// channel read.
    pub fn read_analog(
        &self,
        samps_per_chan: i32,
        timeout: f64,
        buf: &mut [f64],
    ) -> Result<usize, DaqmxError> {
        let mut nread: CInt32 = 0;
        daqmx_call(self.driver, || {
            self.driver.read_analog_f64(
                self.handle,
                samps_per_chan,
                timeout,
                DAQMX_VAL_GROUPBYCHANNEL,
                buf,
                &mut nread,
            )
        })?;
        Ok(nread.max(0) as usize)
    }

    /// Writes one row per channel of `samps_per_chan` samples. Returns the number of samples per channel
    /// written.
    pub fn write_analog(
        &self,
        samps_per_chan: CInt32,
        signal_arr: &Array2<f64>,
    ) -> Result<usize, DaqmxError> {
        let mut nwritten: CInt32 = 0;
        // GroupByChannel expects the samples of each channel contiguous: row-major
        let data: Vec<f64> = signal_arr.iter().copied().collect();
        daqmx_call(self.driver, || {
            self.driver.write_analog_f64(
                self.handle,
                samps_per_chan,
                false,
                DAQMX_VAL_WAITINFINITELY,
                DAQMX_VAL_GROUPBYCHANNEL,
                &data,
                &mut nwritten,
            )
        })?;
        Ok(nwritten as usize)
    }
}

impl<'a, D: DaqmxDriver + ?Sized> Drop for NiTask<'a, D> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        log::warn!("Clearing abandoned DAQmx task {}", self.handle);
        if let Err(err) = daqmx_call(self.driver, || self.driver.clear_task(self.handle)) {
            log::warn!("Failed to clear abandoned DAQmx task {}: {err}", self.handle);
        }
    }
}

fn bad_request(msg: String) -> DaqError {
    DaqError::Config(ConfigError::Configuration(msg))
}

/// Per-channel sample count as passed to the driver reads and writes.
fn samps_per_chan(samples: usize) -> Result<CInt32, DaqError> {
    if samples == 0 {
        return Err(bad_request(String::from("Sample count must be positive")));
    }
    CInt32::try_from(samples).map_err(|_| {
        bad_request(format!(
            "Sample count {samples} exceeds the driver limit of {}",
            CInt32::MAX
        ))
    })
}

/// Resolves the common sample rate of `channels`.
fn common_rate<C: BaseChannel>(channels: &[&str], chans: &[&C]) -> Result<f64, DaqError> {
    let rates: Vec<f64> = chans.iter().map(|c| c.samp_rate()).collect();
    match rates.first() {
        None => Err(bad_request(String::from("At least one channel is required"))),
        Some(&rate) if rates.iter().all(|&r| r == rate) => Ok(rate),
        Some(_) => Err(DaqError::MismatchedSampleRate {
            channels: channels.iter().map(|c| c.to_string()).collect(),
            rates,
        }),
    }
}

fn map_timeout(id: &TaskId, timeout: f64, res: Result<(), DaqmxError>) -> Result<(), DaqError> {
    res.map_err(|err| {
        if err.is_timeout() {
            DaqError::AcquisitionTimeout {
                id: id.clone(),
                timeout,
                source: err,
            }
        } else {
            DaqError::Driver(err)
        }
    })
}

fn expect_state(id: &TaskId, rec: &TaskRecord, expected: TaskState) -> Result<(), DaqError> {
    if rec.state != expected {
        return Err(DaqError::InvalidTaskState {
            id: id.clone(),
            state: rec.state.to_string(),
            expected: expected.to_string(),
        });
    }
    Ok(())
}

fn expect_kind(id: &TaskId, rec: &TaskRecord, kinds: &[TaskKind]) -> Result<(), DaqError> {
    if !kinds.contains(&rec.kind) {
        return Err(DaqError::InvalidTaskState {
            id: id.clone(),
            state: format!("a {} task", rec.kind),
            expected: kinds
                .iter()
                .map(|k| format!("a {k} task"))
                .collect::<Vec<_>>()
                .join(" or "),
        });
    }
    Ok(())
}

/// Stops then clears secondary and primary handles of a removed record. Every step is attempted; the
/// first failure is returned.
fn release_record<D: DaqmxDriver + ?Sized>(
    driver: &D,
    id: &TaskId,
    rec: &TaskRecord,
) -> Result<(), DaqError> {
    let mut first_err: Option<DaqmxError> = None;
    for handle in rec.secondary.into_iter().chain(std::iter::once(rec.primary)) {
        let stop = daqmx_call(driver, || driver.stop_task(handle));
        let clear = daqmx_call(driver, || driver.clear_task(handle));
        for res in [stop, clear] {
            if let Err(err) = res {
                first_err.get_or_insert(err);
            }
        }
    }
    match first_err {
        None => {
            log::info!("Stopped task {id}");
            Ok(())
        }
        Some(err) => {
            log::warn!("Task {id} removed, but its teardown failed: {err}");
            Err(err.into())
        }
    }
}

/// Lifecycle operations on the tasks of one device.
///
/// Borrows the driver, the device configuration and the registry for the duration of one operation.
pub struct TaskEngine<'a, D: DaqmxDriver + ?Sized> {
    pub driver: &'a D,
    pub cfg: &'a DeviceConfig,
    pub registry: &'a mut TaskRegistry,
}

impl<'a, D: DaqmxDriver + ?Sized> TaskEngine<'a, D> {
    pub fn new(driver: &'a D, cfg: &'a DeviceConfig, registry: &'a mut TaskRegistry) -> Self {
        Self {
            driver,
            cfg,
            registry,
        }
    }

    fn register(&mut self, task: NiTask<'_, D>, record: TaskRecord) -> Result<TaskId, DaqError> {
        let id = self.registry.allocate(record.kind);
        let chans = record.physical_chans.clone();
        self.registry.put(id.clone(), record)?;
        task.into_handle();
        log::info!("Created task {id} on {chans}");
        Ok(id)
    }

    /// Configures a finite, hardware-timed analog output task and writes `waveform` to its buffer.
    ///
    /// `waveform` has one row per channel (a 1-D waveform for a single channel) and one column per
    /// sample. `clock_source` is an optional sample clock terminal; the onboard clock is used otherwise.
    /// The task is not started.
    pub fn ao_init(
        &mut self,
        channels: &[&str],
        waveform: Waveform,
        clock_source: Option<&str>,
    ) -> Result<TaskId, DaqError> {
        let chans = channels
            .iter()
            .map(|name| self.cfg.analog_output(name))
            .collect::<Result<Vec<_>, _>>()?;
        let rate = common_rate(channels, &chans)?;

        let waveform = waveform.into_rows();
        if waveform.nrows() != chans.len() {
            return Err(DaqError::InvalidWaveform(format!(
                "{} rows for {} channels",
                waveform.nrows(),
                chans.len()
            )));
        }
        let samples = waveform.ncols();
        if samples == 0 {
            return Err(DaqError::InvalidWaveform(String::from("no samples")));
        }
        let samps_per_read = samps_per_chan(samples)?;
        let (min, max) = VOLTAGE_RANGE;
        for (name, row) in channels.iter().zip(waveform.outer_iter()) {
            if row.iter().any(|v| !v.is_finite() || *v < min || *v > max) {
                return Err(DaqError::InvalidWaveform(format!(
                    "{name} samples must lie within [{min}, {max}] V"
                )));
            }
        }
        let physical_chans = join_chans(
            &chans
                .iter()
                .map(|c| ao_chan(&self.cfg.device, c.channel))
                .collect::<Vec<_>>(),
        );

        log::debug!("Configuring AO task on {physical_chans}: {samples} samples at {rate}Hz");
        let task = NiTask::new(self.driver)?;
        task.create_ao_chan(&physical_chans, min, max)?;
        task.cfg_sample_clk(
            clock_source.unwrap_or(""),
            rate,
            DAQMX_VAL_FINITESAMPS,
            samples,
        )?;
        task.write_analog(samps_per_read, &waveform)?;

        let record = TaskRecord {
            kind: TaskKind::AnalogOutput,
            primary: task.handle(),
            secondary: None,
            samples,
            sample_rate: Some(rate),
            samps_per_read,
            num_channels: chans.len(),
            timeout: analog_timeout(samples, rate),
            state: TaskState::Configured,
            physical_chans,
            clock_terminal: None,
        };
        self.register(task, record)
    }

    /// Configures a finite acquisition of `samples` samples on a single analog input channel.
    pub fn ai_init(&mut self, channel: &str, samples: usize) -> Result<TaskId, DaqError> {
        let chan = self.cfg.analog_input(channel)?;
        let samps_per_read = samps_per_chan(samples)?;
        let rate = chan.samp_rate();
        let physical_chans = ai_chan(&self.cfg.device, chan.channel);
        let (min, max) = VOLTAGE_RANGE;

        log::debug!("Configuring AI task on {physical_chans}: {samples} samples at {rate}Hz");
        let task = NiTask::new(self.driver)?;
        task.create_ai_chan(&physical_chans, min, max)?;
        task.cfg_sample_clk("", rate, DAQMX_VAL_FINITESAMPS, samples)?;

        let record = TaskRecord {
            kind: TaskKind::AnalogInput,
            primary: task.handle(),
            secondary: None,
            samples,
            sample_rate: Some(rate),
            samps_per_read,
            num_channels: 1,
            timeout: analog_timeout(samples, rate),
            state: TaskState::Configured,
            physical_chans,
            clock_terminal: None,
        };
        self.register(task, record)
    }

    /// Configures an on-demand digital output task, one DAQmx channel per line.
    pub fn do_init(&mut self, channels: &[&str]) -> Result<TaskId, DaqError> {
        let chans = channels
            .iter()
            .map(|name| self.cfg.digital_output(name))
            .collect::<Result<Vec<_>, _>>()?;
        let rate = common_rate(channels, &chans)?;
        let physical_chans = join_chans(
            &chans
                .iter()
                .map(|c| do_line(&self.cfg.device, c.channel))
                .collect::<Vec<_>>(),
        );

        log::debug!("Configuring DO task on {physical_chans}");
        let task = NiTask::new(self.driver)?;
        task.create_do_chan(&physical_chans)?;

        let record = TaskRecord {
            kind: TaskKind::DigitalOutput,
            primary: task.handle(),
            secondary: None,
            samples: 1,
            sample_rate: Some(rate),
            samps_per_read: 1,
            num_channels: chans.len(),
            timeout: ON_DEMAND_TIMEOUT,
            state: TaskState::Configured,
            physical_chans,
            clock_terminal: None,
        };
        self.register(task, record)
    }

    /// Configures an edge counter sampled on a clock generated by a second counter.
    ///
    /// The clock generator (`ctr{clock_counter_channel}`) outputs a continuous square wave at the channel's
    /// sample rate on `PFI{clock_PFI_channel}`, which is the sample clock of the edge counter
    /// (`ctr{input_channel}`). The clock is started here; `run` starts the counter. With `continuous`,
    /// the counter keeps sampling and every read returns all samples available so far.
    pub fn counter_init(
        &mut self,
        channel: &str,
        samples: usize,
        continuous: bool,
    ) -> Result<TaskId, DaqError> {
        let chan = self.cfg.digital_input(channel)?;
        let finite_samps = samps_per_chan(samples)?;
        let rate = chan.samp_rate();
        let device = &self.cfg.device;
        let clock_counter = counter_chan(device, chan.clock_counter_channel);
        let input_counter = counter_chan(device, chan.input_channel);
        let clock_terminal = pfi_terminal(device, chan.clock_pfi_channel);
        let sample_mode = if continuous {
            DAQMX_VAL_CONTSAMPS
        } else {
            DAQMX_VAL_FINITESAMPS
        };

        log::debug!(
            "Configuring counter task on {input_counter} clocked by {clock_counter} via {clock_terminal} at {rate}Hz"
        );
        let clock = NiTask::new(self.driver)?;
        clock.create_co_pulse_chan_freq(&clock_counter, rate)?;
        clock.cfg_implicit_timing(DAQMX_VAL_CONTSAMPS, samples)?;

        let counter = NiTask::new(self.driver)?;
        counter.create_ci_count_edges_chan(&input_counter)?;
        counter.cfg_sample_clk(&clock_terminal, rate, sample_mode, samples)?;
        clock.start()?;

        let record = TaskRecord {
            kind: TaskKind::Counter,
            primary: counter.handle(),
            secondary: Some(clock.handle()),
            samples,
            sample_rate: Some(rate),
            samps_per_read: if continuous {
                DAQMX_VAL_READALLAVAILABLE
            } else {
                finite_samps
            },
            num_channels: 1,
            timeout: counter_timeout(samples, rate),
            state: TaskState::Configured,
            physical_chans: input_counter,
            clock_terminal: Some(clock_terminal),
        };
        let id = self.register(counter, record)?;
        clock.into_handle();
        Ok(id)
    }

    /// Configures a pulse-width counter whose samples are delimited by an external gate.
    ///
    /// Widths are counted in ticks of the timebase on `PFI{counter_PFI_channel}`. Duplicate-count
    /// prevention is always enabled so that a gate period without timebase edges yields a zero sample
    /// instead of being dropped. The task waits for the gate indefinitely.
    pub fn gated_counter_init(&mut self, channel: &str, samples: usize) -> Result<TaskId, DaqError> {
        let chan = self.cfg.digital_input(channel)?;
        let samps_per_read = samps_per_chan(samples)?;
        let input_counter = counter_chan(&self.cfg.device, chan.input_channel);
        let timebase = pfi_terminal(&self.cfg.device, chan.counter_pfi_channel);

        log::debug!("Configuring gated counter task on {input_counter} with timebase {timebase}");
        let task = NiTask::new(self.driver)?;
        task.create_ci_pulse_width_chan(&input_counter)?;
        task.cfg_implicit_timing(DAQMX_VAL_FINITESAMPS, samples)?;
        task.set_ctr_timebase_src(&input_counter, &timebase)?;
        task.set_dup_count_prevent(&input_counter, true)?;

        let record = TaskRecord {
            kind: TaskKind::GatedCounter,
            primary: task.handle(),
            secondary: None,
            samples,
            sample_rate: None,
            samps_per_read,
            num_channels: 1,
            timeout: DAQMX_VAL_WAITINFINITELY,
            state: TaskState::Configured,
            physical_chans: input_counter,
            clock_terminal: None,
        };
        self.register(task, record)
    }

    pub fn run(&mut self, id: &TaskId) -> Result<(), DaqError> {
        let driver = self.driver;
        let rec = self.registry.get_mut(id)?;
        expect_state(id, rec, TaskState::Configured)?;
        daqmx_call(driver, || driver.start_task(rec.primary))?;
        rec.state = TaskState::Running;
        log::debug!("Started task {id}");
        Ok(())
    }

    /// Blocks until a running task finished or its timeout elapsed.
    pub fn wait(&mut self, id: &TaskId) -> Result<(), DaqError> {
        let rec = self.registry.get(id)?;
        expect_state(id, rec, TaskState::Running)?;
        map_timeout(
            id,
            rec.timeout,
            daqmx_call(self.driver, || {
                self.driver.wait_until_task_done(rec.primary, rec.timeout)
            }),
        )
    }

    /// Reads the samples of a running analog input task, channel after channel.
    pub fn read_analog(&mut self, id: &TaskId) -> Result<Vec<f64>, DaqError> {
        let rec = self.registry.get(id)?;
        expect_kind(id, rec, &[TaskKind::AnalogInput])?;
        expect_state(id, rec, TaskState::Running)?;
        let mut buf = vec![0.; rec.samples * rec.num_channels];
        let mut nread: CInt32 = 0;
        map_timeout(
            id,
            rec.timeout,
            daqmx_call(self.driver, || {
                self.driver.read_analog_f64(
                    rec.primary,
                    rec.samps_per_read,
                    rec.timeout,
                    DAQMX_VAL_GROUPBYCHANNEL,
                    &mut buf,
                    &mut nread,
                )
            }),
        )?;
        buf.truncate(nread.max(0) as usize * rec.num_channels);
        Ok(buf)
    }

    /// Reads the samples of a running counter or gated counter task.
    ///
    /// Continuous counters return whatever was acquired since the previous read, up to the requested
    /// sample count.
    pub fn read_counter(&mut self, id: &TaskId) -> Result<Vec<f64>, DaqError> {
        let rec = self.registry.get(id)?;
        expect_kind(id, rec, &[TaskKind::Counter, TaskKind::GatedCounter])?;
        expect_state(id, rec, TaskState::Running)?;
        let mut buf = vec![0.; rec.samples];
        let mut nread: CInt32 = 0;
        map_timeout(
            id,
            rec.timeout,
            daqmx_call(self.driver, || {
                self.driver.read_counter_f64(
                    rec.primary,
                    rec.samps_per_read,
                    rec.timeout,
                    &mut buf,
                    &mut nread,
                )
            }),
        )?;
        buf.truncate(nread.max(0) as usize);
        Ok(buf)
    }

    /// Drives the lines of a running digital output task, one value per line.
    pub fn write_digital(&mut self, id: &TaskId, values: &[bool]) -> Result<(), DaqError> {
        let rec = self.registry.get(id)?;
        expect_kind(id, rec, &[TaskKind::DigitalOutput])?;
        expect_state(id, rec, TaskState::Running)?;
        if values.len() != rec.num_channels {
            return Err(DaqError::InvalidWaveform(format!(
                "{} values for {} lines",
                values.len(),
                rec.num_channels
            )));
        }
        let data: Vec<u8> = values.iter().map(|&v| v as u8).collect();
        let mut nwritten: CInt32 = 0;
        daqmx_call(self.driver, || {
            self.driver.write_digital_lines(
                rec.primary,
                1,
                false,
                rec.timeout,
                DAQMX_VAL_GROUPBYCHANNEL,
                &data,
                &mut nwritten,
            )
        })?;
        Ok(())
    }

    /// Removes the task from the registry, then stops and clears its handles.
    ///
    /// The task is gone after this call even if the driver reported a failure during teardown.
    pub fn stop(&mut self, id: &TaskId) -> Result<(), DaqError> {
        let rec = self.registry.remove(id)?;
        release_record(self.driver, id, &rec)
    }

    /// Reads a single sample from `physical_chan` with a transient task that never enters the registry.
    pub fn on_demand_voltage(&mut self, physical_chan: &str) -> Result<f64, DaqError> {
        let (min, max) = VOLTAGE_RANGE;
        let task = NiTask::new(self.driver)?;
        task.create_ai_chan(physical_chan, min, max)?;
        let mut buf = [0.];
        // A short read is reported by the driver as a timeout
        task.read_analog(1, ON_DEMAND_TIMEOUT, &mut buf)?;
        task.clear()?;
        Ok(buf[0])
    }

    /// Terminal carrying the sample clock of the task, if it exports one (free-running counters).
    pub fn sample_clock_terminal(&self, id: &TaskId) -> Result<Option<String>, DaqError> {
        Ok(self.registry.get(id)?.clock_terminal.clone())
    }

    /// Stops every live task, most recent first. Returns the first teardown failure.
    pub fn stop_all(&mut self) -> Result<(), DaqError> {
        let mut first_err = None;
        for (id, rec) in self.registry.drain() {
            if let Err(err) = release_record(self.driver, &id, &rec) {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
