//! Provides the boundary to the NI-DAQmx C library.
//!
//! ## Overview
//!
//! The rest of the crate never calls DAQmx C-functions directly. Instead it talks to a [`DaqmxDriver`]:
//! a narrow trait with one method per DAQmx C-function used by this backend (task creation, channel
//! creation, timing, read / write, start / stop / clear, error-string lookup and a device query).
//! Every method returns the raw signed status code of the call, wrapped in a [`DaqmxStatus`]:
//! zero is success, a positive code is a warning, a negative code is an error.
//!
//! [`daqmx_call`] turns a status into a `Result`. **Both warnings and errors are treated as failures**:
//! the code is looked up with `DAQmxGetErrorString` and returned as a [`DaqmxError`].
//!
//! Two implementations exist:
//! - [`NiDaqmx`]: the real binding. The DAQmx shared library is loaded at runtime, so a machine without the
//!   driver can still build and run everything else. Use [`NiDaqmx::probe`] to check availability and
//!   [`NiDaqmx::connect`] to obtain a driver (fails with [`DaqError::DriverUnavailable`]).
//! - [`crate::sim::SimDaqmx`]: an in-memory simulation used by the tests and for dry runs.
//!
//! ## Constants and Types
//!
//! Type aliases (`CConstStr`, `CInt32`, ...) and `DAQMX_VAL_*` constants map to their counterparts in
//! `NIDAQmx.h`.
//!
//! ## Further Reading
//!
//! [NI-DAQmx C Reference](https://www.ni.com/docs/en-US/bundle/ni-daqmx-c-api-ref/page/cdaqmx/help_file_title.html).

use libloading::Library;
use std::ffi::{CStr, CString};
use std::fmt;

use crate::error::DaqError;

type CConstStr = *const libc::c_char;
type CCharBuf = *mut libc::c_char;
type CFloat64 = libc::c_double;
type CUint32 = libc::c_uint;
type CUint64 = libc::c_ulonglong;
type CBool32 = libc::c_uint;
pub type CInt32 = libc::c_int;
type RawTaskHandle = *mut libc::c_void;

pub const DAQMX_VAL_CFG_DEFAULT: CInt32 = -1;
pub const DAQMX_VAL_VOLTS: CInt32 = 10348;
pub const DAQMX_VAL_RISING: CInt32 = 10280;
pub const DAQMX_VAL_FINITESAMPS: CInt32 = 10178;
pub const DAQMX_VAL_CONTSAMPS: CInt32 = 10123;
pub const DAQMX_VAL_GROUPBYCHANNEL: CBool32 = 0;
pub const DAQMX_VAL_WAITINFINITELY: CFloat64 = -1.0;
pub const DAQMX_VAL_CHANPERLINE: CInt32 = 0;
pub const DAQMX_VAL_COUNTUP: CInt32 = 10128;
pub const DAQMX_VAL_HZ: CInt32 = 10373;
pub const DAQMX_VAL_LOW: CInt32 = 10214;
pub const DAQMX_VAL_TICKS: CInt32 = 10304;
/// Read-all-available for continuous acquisitions
pub const DAQMX_VAL_READALLAVAILABLE: CInt32 = -1;

// Error codes reported when a read or a wait runs out of time
pub const DAQMX_ERROR_SAMPLES_NOT_YET_AVAILABLE: CInt32 = -200284;
pub const DAQMX_ERROR_OPERATION_TIMED_OUT: CInt32 = -200474;
pub const DAQMX_ERROR_WAIT_UNTIL_DONE_DOES_NOT_INDICATE_DONE: CInt32 = -200560;

pub fn is_timeout_code(code: CInt32) -> bool {
    matches!(
        code,
        DAQMX_ERROR_SAMPLES_NOT_YET_AVAILABLE
            | DAQMX_ERROR_OPERATION_TIMED_OUT
            | DAQMX_ERROR_WAIT_UNTIL_DONE_DOES_NOT_INDICATE_DONE
    )
}

/// Environment variable overriding the location of the DAQmx shared library.
pub const NIDAQ_DLL_PATH_ENV: &str = "NIDAQ_DLL_PATH";

/// Opaque DAQmx task handle.
///
/// The driver hands out pointers; they are stored as integers so that records holding them can move
/// between threads. Only the driver implementation ever converts them back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TaskHandle(usize);

impl TaskHandle {
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }
    pub fn as_raw(&self) -> usize {
        self.0
    }
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Outcome of a single DAQmx C-function call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DaqmxStatus {
    Success,
    Warning(CInt32),
    Error(CInt32),
}

impl From<CInt32> for DaqmxStatus {
    fn from(code: CInt32) -> Self {
        match code {
            0 => DaqmxStatus::Success,
            c if c > 0 => DaqmxStatus::Warning(c),
            c => DaqmxStatus::Error(c),
        }
    }
}

impl DaqmxStatus {
    pub fn code(&self) -> CInt32 {
        match *self {
            DaqmxStatus::Success => 0,
            DaqmxStatus::Warning(c) | DaqmxStatus::Error(c) => c,
        }
    }
}

/// Non-zero status returned by a DAQmx call, together with the driver's description of it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DaqmxError {
    pub code: CInt32,
    pub message: String,
}

impl DaqmxError {
    pub fn is_warning(&self) -> bool {
        self.code > 0
    }
    pub fn is_timeout(&self) -> bool {
        is_timeout_code(self.code)
    }
}

impl fmt::Display for DaqmxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = if self.is_warning() { "warning" } else { "error" };
        write!(f, "DAQmx {kind} {}: {}", self.code, self.message)
    }
}

impl std::error::Error for DaqmxError {}

/// One method per DAQmx C-function used by the backend.
///
/// Arguments follow the C signatures (minus the ones this backend always leaves empty, such as
/// `nameToAssignToChannel` and `customScaleName`). Output parameters are `&mut` references.
/// Implementations must not interpret status codes: that is the job of [`daqmx_call`].
pub trait DaqmxDriver: Send + Sync {
    fn create_task(&self, name: &str, handle: &mut TaskHandle) -> DaqmxStatus;
    fn start_task(&self, handle: TaskHandle) -> DaqmxStatus;
    fn stop_task(&self, handle: TaskHandle) -> DaqmxStatus;
    fn clear_task(&self, handle: TaskHandle) -> DaqmxStatus;
    fn wait_until_task_done(&self, handle: TaskHandle, timeout: f64) -> DaqmxStatus;

    fn create_ao_voltage_chan(
        &self,
        handle: TaskHandle,
        physical_chan: &str,
        min_val: f64,
        max_val: f64,
        units: CInt32,
    ) -> DaqmxStatus;
    fn create_ai_voltage_chan(
        &self,
        handle: TaskHandle,
        physical_chan: &str,
        terminal_config: CInt32,
        min_val: f64,
        max_val: f64,
        units: CInt32,
    ) -> DaqmxStatus;
    fn create_do_chan(&self, handle: TaskHandle, lines: &str, line_grouping: CInt32)
        -> DaqmxStatus;
    fn create_ci_count_edges_chan(
        &self,
        handle: TaskHandle,
        counter: &str,
        edge: CInt32,
        initial_count: u32,
        count_direction: CInt32,
    ) -> DaqmxStatus;
    fn create_ci_pulse_width_chan(
        &self,
        handle: TaskHandle,
        counter: &str,
        min_val: f64,
        max_val: f64,
        units: CInt32,
        starting_edge: CInt32,
    ) -> DaqmxStatus;
    #[allow(clippy::too_many_arguments)]
    fn create_co_pulse_chan_freq(
        &self,
        handle: TaskHandle,
        counter: &str,
        units: CInt32,
        idle_state: CInt32,
        initial_delay: f64,
        freq: f64,
        duty_cycle: f64,
    ) -> DaqmxStatus;

    fn cfg_samp_clk_timing(
        &self,
        handle: TaskHandle,
        source: &str,
        rate: f64,
        active_edge: CInt32,
        sample_mode: CInt32,
        samps_per_chan: u64,
    ) -> DaqmxStatus;
    fn cfg_implicit_timing(
        &self,
        handle: TaskHandle,
        sample_mode: CInt32,
        samps_per_chan: u64,
    ) -> DaqmxStatus;
    fn set_ci_ctr_timebase_src(&self, handle: TaskHandle, chan: &str, source: &str)
        -> DaqmxStatus;
    fn set_ci_dup_count_prevent(&self, handle: TaskHandle, chan: &str, enable: bool)
        -> DaqmxStatus;

    #[allow(clippy::too_many_arguments)]
    fn write_analog_f64(
        &self,
        handle: TaskHandle,
        samps_per_chan: CInt32,
        auto_start: bool,
        timeout: f64,
        data_layout: u32,
        data: &[f64],
        samps_written: &mut CInt32,
    ) -> DaqmxStatus;
    #[allow(clippy::too_many_arguments)]
    fn write_digital_lines(
        &self,
        handle: TaskHandle,
        samps_per_chan: CInt32,
        auto_start: bool,
        timeout: f64,
        data_layout: u32,
        data: &[u8],
        samps_written: &mut CInt32,
    ) -> DaqmxStatus;
    fn read_analog_f64(
        &self,
        handle: TaskHandle,
        samps_per_chan: CInt32,
        timeout: f64,
        fill_mode: u32,
        data: &mut [f64],
        samps_read: &mut CInt32,
    ) -> DaqmxStatus;
    fn read_counter_f64(
        &self,
        handle: TaskHandle,
        samps_per_chan: CInt32,
        timeout: f64,
        data: &mut [f64],
        samps_read: &mut CInt32,
    ) -> DaqmxStatus;

    /// Driver description of `code`. Never fails; unknown codes get a generic text.
    fn get_error_string(&self, code: CInt32) -> String;
    fn get_dev_product_type(&self, device: &str, product_type: &mut String) -> DaqmxStatus;
    fn reset_device(&self, device: &str) -> DaqmxStatus;
}

/// Calls a DAQmx function and converts its status code.
///
/// Every DAQmx C-function returns an `int32`. Zero means success. Any other value, **including positive
/// warning codes**, is converted to a [`DaqmxError`] carrying the code and the description obtained from
/// [`DaqmxDriver::get_error_string`]. The error is also logged.
///
/// # Examples
///
/// ```ignore
/// daqmx_call(driver, || driver.start_task(handle))?;
/// ```
pub fn daqmx_call<D, F>(driver: &D, func: F) -> Result<(), DaqmxError>
where
    D: DaqmxDriver + ?Sized,
    F: FnOnce() -> DaqmxStatus,
{
    match func() {
        DaqmxStatus::Success => Ok(()),
        status => {
            let code = status.code();
            let err = DaqmxError {
                code,
                message: driver.get_error_string(code),
            };
            log::error!("{err}");
            Err(err)
        }
    }
}

/// Location of the DAQmx shared library: `NIDAQ_DLL_PATH` if set, the platform default otherwise.
pub fn default_library_path() -> String {
    if let Ok(path) = std::env::var(NIDAQ_DLL_PATH_ENV) {
        return path;
    }
    if cfg!(windows) {
        String::from("nicaiu.dll")
    } else {
        String::from("libnidaqmx.so")
    }
}

type CreateTaskFn = unsafe extern "C" fn(CConstStr, *mut RawTaskHandle) -> CInt32;
type TaskFn = unsafe extern "C" fn(RawTaskHandle) -> CInt32;
type WaitFn = unsafe extern "C" fn(RawTaskHandle, CFloat64) -> CInt32;
type CreateAOVoltageChanFn = unsafe extern "C" fn(
    RawTaskHandle,
    CConstStr,
    CConstStr,
    CFloat64,
    CFloat64,
    CInt32,
    CConstStr,
) -> CInt32;
type CreateAIVoltageChanFn = unsafe extern "C" fn(
    RawTaskHandle,
    CConstStr,
    CConstStr,
    CInt32,
    CFloat64,
    CFloat64,
    CInt32,
    CConstStr,
) -> CInt32;
type CreateDOChanFn = unsafe extern "C" fn(RawTaskHandle, CConstStr, CConstStr, CInt32) -> CInt32;
type CreateCICountEdgesChanFn =
    unsafe extern "C" fn(RawTaskHandle, CConstStr, CConstStr, CInt32, CUint32, CInt32) -> CInt32;
type CreateCIPulseWidthChanFn = unsafe extern "C" fn(
    RawTaskHandle,
    CConstStr,
    CConstStr,
    CFloat64,
    CFloat64,
    CInt32,
    CInt32,
    CConstStr,
) -> CInt32;
type CreateCOPulseChanFreqFn = unsafe extern "C" fn(
    RawTaskHandle,
    CConstStr,
    CConstStr,
    CInt32,
    CInt32,
    CFloat64,
    CFloat64,
    CFloat64,
) -> CInt32;
type CfgSampClkTimingFn =
    unsafe extern "C" fn(RawTaskHandle, CConstStr, CFloat64, CInt32, CInt32, CUint64) -> CInt32;
type CfgImplicitTimingFn = unsafe extern "C" fn(RawTaskHandle, CInt32, CUint64) -> CInt32;
type SetStrAttrFn = unsafe extern "C" fn(RawTaskHandle, CConstStr, CConstStr) -> CInt32;
type SetBoolAttrFn = unsafe extern "C" fn(RawTaskHandle, CConstStr, CBool32) -> CInt32;
type WriteAnalogF64Fn = unsafe extern "C" fn(
    RawTaskHandle,
    CInt32,
    CBool32,
    CFloat64,
    CBool32,
    *const CFloat64,
    *mut CInt32,
    *mut CBool32,
) -> CInt32;
type WriteDigitalLinesFn = unsafe extern "C" fn(
    RawTaskHandle,
    CInt32,
    CBool32,
    CFloat64,
    CBool32,
    *const u8,
    *mut CInt32,
    *mut CBool32,
) -> CInt32;
type ReadAnalogF64Fn = unsafe extern "C" fn(
    RawTaskHandle,
    CInt32,
    CFloat64,
    CBool32,
    *mut CFloat64,
    CUint32,
    *mut CInt32,
    *mut CBool32,
) -> CInt32;
type ReadCounterF64Fn = unsafe extern "C" fn(
    RawTaskHandle,
    CInt32,
    CFloat64,
    *mut CFloat64,
    CUint32,
    *mut CInt32,
    *mut CBool32,
) -> CInt32;
type GetErrorStringFn = unsafe extern "C" fn(CInt32, CCharBuf, CUint32) -> CInt32;
type GetDevProductTypeFn = unsafe extern "C" fn(CConstStr, CCharBuf, CUint32) -> CInt32;
type ResetDeviceFn = unsafe extern "C" fn(CConstStr) -> CInt32;

struct DaqmxApi {
    create_task: CreateTaskFn,
    start_task: TaskFn,
    stop_task: TaskFn,
    clear_task: TaskFn,
    wait_until_task_done: WaitFn,
    create_ao_voltage_chan: CreateAOVoltageChanFn,
    create_ai_voltage_chan: CreateAIVoltageChanFn,
    create_do_chan: CreateDOChanFn,
    create_ci_count_edges_chan: CreateCICountEdgesChanFn,
    create_ci_pulse_width_chan: CreateCIPulseWidthChanFn,
    create_co_pulse_chan_freq: CreateCOPulseChanFreqFn,
    cfg_samp_clk_timing: CfgSampClkTimingFn,
    cfg_implicit_timing: CfgImplicitTimingFn,
    set_ci_ctr_timebase_src: SetStrAttrFn,
    set_ci_dup_count_prevent: SetBoolAttrFn,
    write_analog_f64: WriteAnalogF64Fn,
    write_digital_lines: WriteDigitalLinesFn,
    read_analog_f64: ReadAnalogF64Fn,
    read_counter_f64: ReadCounterF64Fn,
    get_error_string: GetErrorStringFn,
    get_dev_product_type: GetDevProductTypeFn,
    reset_device: ResetDeviceFn,
}

unsafe fn sym<T: Copy>(lib: &Library, name: &[u8]) -> Result<T, libloading::Error> {
    Ok(*lib.get::<T>(name)?)
}

impl DaqmxApi {
    unsafe fn resolve(lib: &Library) -> Result<Self, libloading::Error> {
        Ok(Self {
            create_task: sym(lib, b"DAQmxCreateTask\0")?,
            start_task: sym(lib, b"DAQmxStartTask\0")?,
            stop_task: sym(lib, b"DAQmxStopTask\0")?,
            clear_task: sym(lib, b"DAQmxClearTask\0")?,
            wait_until_task_done: sym(lib, b"DAQmxWaitUntilTaskDone\0")?,
            create_ao_voltage_chan: sym(lib, b"DAQmxCreateAOVoltageChan\0")?,
            create_ai_voltage_chan: sym(lib, b"DAQmxCreateAIVoltageChan\0")?,
            create_do_chan: sym(lib, b"DAQmxCreateDOChan\0")?,
            create_ci_count_edges_chan: sym(lib, b"DAQmxCreateCICountEdgesChan\0")?,
            create_ci_pulse_width_chan: sym(lib, b"DAQmxCreateCIPulseWidthChan\0")?,
            create_co_pulse_chan_freq: sym(lib, b"DAQmxCreateCOPulseChanFreq\0")?,
            cfg_samp_clk_timing: sym(lib, b"DAQmxCfgSampClkTiming\0")?,
            cfg_implicit_timing: sym(lib, b"DAQmxCfgImplicitTiming\0")?,
            set_ci_ctr_timebase_src: sym(lib, b"DAQmxSetCICtrTimebaseSrc\0")?,
            set_ci_dup_count_prevent: sym(lib, b"DAQmxSetCIDupCountPrevent\0")?,
            write_analog_f64: sym(lib, b"DAQmxWriteAnalogF64\0")?,
            write_digital_lines: sym(lib, b"DAQmxWriteDigitalLines\0")?,
            read_analog_f64: sym(lib, b"DAQmxReadAnalogF64\0")?,
            read_counter_f64: sym(lib, b"DAQmxReadCounterF64\0")?,
            get_error_string: sym(lib, b"DAQmxGetErrorString\0")?,
            get_dev_product_type: sym(lib, b"DAQmxGetDevProductType\0")?,
            reset_device: sym(lib, b"DAQmxResetDevice\0")?,
        })
    }
}

/// Runtime-loaded binding to the NI-DAQmx C library.
///
/// The library stays loaded for the lifetime of this value; dropping it unloads the driver. Tasks
/// must be cleared before that, which [`crate::Daq`] does on shutdown.
pub struct NiDaqmx {
    api: DaqmxApi,
    // Keeps the resolved function pointers valid
    _lib: Library,
}

impl NiDaqmx {
    /// Whether the DAQmx library can be loaded from [`default_library_path`].
    pub fn probe() -> bool {
        Self::connect().is_ok()
    }

    pub fn connect() -> Result<Self, DaqError> {
        Self::connect_to(&default_library_path())
    }

    /// Loads the DAQmx library at `path` and resolves every function used by the backend.
    pub fn connect_to(path: &str) -> Result<Self, DaqError> {
        let unavailable = |err: libloading::Error| DaqError::DriverUnavailable {
            path: path.to_string(),
            reason: err.to_string(),
        };
        let lib = unsafe { Library::new(path) }.map_err(unavailable)?;
        let api = unsafe { DaqmxApi::resolve(&lib) }.map_err(unavailable)?;
        log::info!("Loaded NI-DAQmx driver from {path}");
        Ok(Self { api, _lib: lib })
    }
}

// Inputs are channel paths built from validated configuration; interior NULs are dropped rather
// than letting the conversion fail.
fn cstr(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

fn raw(handle: TaskHandle) -> RawTaskHandle {
    handle.as_raw() as RawTaskHandle
}

fn buf_to_string(buf: &[libc::c_char]) -> String {
    unsafe { CStr::from_ptr(buf.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

impl DaqmxDriver for NiDaqmx {
    fn create_task(&self, name: &str, handle: &mut TaskHandle) -> DaqmxStatus {
        let name_cstr = cstr(name);
        let mut raw_handle: RawTaskHandle = std::ptr::null_mut();
        let code = unsafe { (self.api.create_task)(name_cstr.as_ptr(), &mut raw_handle) };
        *handle = TaskHandle::from_raw(raw_handle as usize);
        code.into()
    }
    fn start_task(&self, handle: TaskHandle) -> DaqmxStatus {
        unsafe { (self.api.start_task)(raw(handle)) }.into()
    }
    fn stop_task(&self, handle: TaskHandle) -> DaqmxStatus {
        unsafe { (self.api.stop_task)(raw(handle)) }.into()
    }
    fn clear_task(&self, handle: TaskHandle) -> DaqmxStatus {
        unsafe { (self.api.clear_task)(raw(handle)) }.into()
    }
    fn wait_until_task_done(&self, handle: TaskHandle, timeout: f64) -> DaqmxStatus {
        unsafe { (self.api.wait_until_task_done)(raw(handle), timeout) }.into()
    }

    fn create_ao_voltage_chan(
        &self,
        handle: TaskHandle,
        physical_chan: &str,
        min_val: f64,
        max_val: f64,
        units: CInt32,
    ) -> DaqmxStatus {
        let chan_cstr = cstr(physical_chan);
        let assigned_name_cstr = cstr("");
        unsafe {
            (self.api.create_ao_voltage_chan)(
                raw(handle),
                chan_cstr.as_ptr(),
                assigned_name_cstr.as_ptr(),
                min_val,
                max_val,
                units,
                std::ptr::null(),
            )
        }
        .into()
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
        let chan_cstr = cstr(physical_chan);
        let assigned_name_cstr = cstr("");
        unsafe {
            (self.api.create_ai_voltage_chan)(
                raw(handle),
                chan_cstr.as_ptr(),
                assigned_name_cstr.as_ptr(),
                terminal_config,
                min_val,
                max_val,
                units,
                std::ptr::null(),
            )
        }
        .into()
    }

    fn create_do_chan(
        &self,
        handle: TaskHandle,
        lines: &str,
        line_grouping: CInt32,
    ) -> DaqmxStatus {
        let lines_cstr = cstr(lines);
        let assigned_name_cstr = cstr("");
        unsafe {
            (self.api.create_do_chan)(
                raw(handle),
                lines_cstr.as_ptr(),
                assigned_name_cstr.as_ptr(),
                line_grouping,
            )
        }
        .into()
    }

    fn create_ci_count_edges_chan(
        &self,
        handle: TaskHandle,
        counter: &str,
        edge: CInt32,
        initial_count: u32,
        count_direction: CInt32,
    ) -> DaqmxStatus {
        let counter_cstr = cstr(counter);
        let assigned_name_cstr = cstr("");
        unsafe {
            (self.api.create_ci_count_edges_chan)(
                raw(handle),
                counter_cstr.as_ptr(),
                assigned_name_cstr.as_ptr(),
                edge,
                initial_count as CUint32,
                count_direction,
            )
        }
        .into()
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
        let counter_cstr = cstr(counter);
        let assigned_name_cstr = cstr("");
        let scale_cstr = cstr("");
        unsafe {
            (self.api.create_ci_pulse_width_chan)(
                raw(handle),
                counter_cstr.as_ptr(),
                assigned_name_cstr.as_ptr(),
                min_val,
                max_val,
                units,
                starting_edge,
                scale_cstr.as_ptr(),
            )
        }
        .into()
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
        let counter_cstr = cstr(counter);
        let assigned_name_cstr = cstr("");
        unsafe {
            (self.api.create_co_pulse_chan_freq)(
                raw(handle),
                counter_cstr.as_ptr(),
                assigned_name_cstr.as_ptr(),
                units,
                idle_state,
                initial_delay,
                freq,
                duty_cycle,
            )
        }
        .into()
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
        let src_cstr = cstr(source);
        unsafe {
            (self.api.cfg_samp_clk_timing)(
                raw(handle),
                src_cstr.as_ptr(),
                rate,
                active_edge,
                sample_mode,
                samps_per_chan as CUint64,
            )
        }
        .into()
    }

    fn cfg_implicit_timing(
        &self,
        handle: TaskHandle,
        sample_mode: CInt32,
        samps_per_chan: u64,
    ) -> DaqmxStatus {
        unsafe {
            (self.api.cfg_implicit_timing)(raw(handle), sample_mode, samps_per_chan as CUint64)
        }
        .into()
    }

    fn set_ci_ctr_timebase_src(
        &self,
        handle: TaskHandle,
        chan: &str,
        source: &str,
    ) -> DaqmxStatus {
        let chan_cstr = cstr(chan);
        let src_cstr = cstr(source);
        unsafe {
            (self.api.set_ci_ctr_timebase_src)(raw(handle), chan_cstr.as_ptr(), src_cstr.as_ptr())
        }
        .into()
    }

    fn set_ci_dup_count_prevent(
        &self,
        handle: TaskHandle,
        chan: &str,
        enable: bool,
    ) -> DaqmxStatus {
        let chan_cstr = cstr(chan);
        unsafe {
            (self.api.set_ci_dup_count_prevent)(raw(handle), chan_cstr.as_ptr(), enable as CBool32)
        }
        .into()
    }

    fn write_analog_f64(
        &self,
        handle: TaskHandle,
        samps_per_chan: CInt32,
        auto_start: bool,
        timeout: f64,
        data_layout: u32,
        data: &[f64],
        samps_written: &mut CInt32,
    ) -> DaqmxStatus {
        unsafe {
            (self.api.write_analog_f64)(
                raw(handle),
                samps_per_chan,
                auto_start as CBool32,
                timeout,
                data_layout as CBool32,
                data.as_ptr(),
                samps_written as *mut CInt32,
                std::ptr::null_mut(),
            )
        }
        .into()
    }

    fn write_digital_lines(
        &self,
        handle: TaskHandle,
        samps_per_chan: CInt32,
        auto_start: bool,
        timeout: f64,
        data_layout: u32,
        data: &[u8],
        samps_written: &mut CInt32,
    ) -> DaqmxStatus {
        unsafe {
            (self.api.write_digital_lines)(
                raw(handle),
                samps_per_chan,
                auto_start as CBool32,
                timeout,
                data_layout as CBool32,
                data.as_ptr(),
                samps_written as *mut CInt32,
                std::ptr::null_mut(),
            )
        }
        .into()
    }

    fn read_analog_f64(
        &self,
        handle: TaskHandle,
        samps_per_chan: CInt32,
        timeout: f64,
        fill_mode: u32,
        data: &mut [f64],
        samps_read: &mut CInt32,
    ) -> DaqmxStatus {
        unsafe {
            (self.api.read_analog_f64)(
                raw(handle),
                samps_per_chan,
                timeout,
                fill_mode as CBool32,
                data.as_mut_ptr(),
                data.len() as CUint32,
                samps_read as *mut CInt32,
                std::ptr::null_mut(),
            )
        }
        .into()
    }

    fn read_counter_f64(
        &self,
        handle: TaskHandle,
        samps_per_chan: CInt32,
        timeout: f64,
        data: &mut [f64],
        samps_read: &mut CInt32,
    ) -> DaqmxStatus {
        unsafe {
            (self.api.read_counter_f64)(
                raw(handle),
                samps_per_chan,
                timeout,
                data.as_mut_ptr(),
                data.len() as CUint32,
                samps_read as *mut CInt32,
                std::ptr::null_mut(),
            )
        }
        .into()
    }

    fn get_error_string(&self, code: CInt32) -> String {
        let mut err_buff = [0 as libc::c_char; 2048];
        let status = unsafe {
            (self.api.get_error_string)(code, err_buff.as_mut_ptr(), err_buff.len() as CUint32)
        };
        if status < 0 {
            return format!("unknown DAQmx status code {code}");
        }
        buf_to_string(&err_buff)
    }

    fn get_dev_product_type(&self, device: &str, product_type: &mut String) -> DaqmxStatus {
        let device_cstr = cstr(device);
        let mut buf = [0 as libc::c_char; 256];
        let code = unsafe {
            (self.api.get_dev_product_type)(
                device_cstr.as_ptr(),
                buf.as_mut_ptr(),
                buf.len() as CUint32,
            )
        };
        if code >= 0 {
            *product_type = buf_to_string(&buf);
        }
        code.into()
    }

    fn reset_device(&self, device: &str) -> DaqmxStatus {
        let device_cstr = cstr(device);
        unsafe { (self.api.reset_device)(device_cstr.as_ptr()) }.into()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::SimDaqmx;

    #[test]
    fn status_from_code() {
        assert_eq!(DaqmxStatus::from(0), DaqmxStatus::Success);
        assert_eq!(DaqmxStatus::from(200015), DaqmxStatus::Warning(200015));
        assert_eq!(DaqmxStatus::from(-200077), DaqmxStatus::Error(-200077));
        assert_eq!(DaqmxStatus::Error(-1).code(), -1);
    }

    #[test]
    /// Warnings are failures too, and the description comes from the driver lookup.
    fn daqmx_call_converts_warnings() {
        let driver = SimDaqmx::new();
        let err = daqmx_call(&driver, || DaqmxStatus::from(200015)).unwrap_err();
        assert!(err.is_warning());
        assert_eq!(err.code, 200015);
        assert_eq!(err.message, driver.get_error_string(200015));
        assert!(err.to_string().starts_with("DAQmx warning 200015"));

        let err = daqmx_call(&driver, || DaqmxStatus::from(-200284)).unwrap_err();
        assert!(!err.is_warning());
        assert!(err.is_timeout());

        daqmx_call(&driver, || DaqmxStatus::Success).unwrap();
    }

    #[test]
    fn missing_library_is_unavailable() {
        let err = NiDaqmx::connect_to("/nonexistent/libnidaqmx.so")
            .err()
            .unwrap();
        assert!(matches!(err, DaqError::DriverUnavailable { .. }));
    }
}
