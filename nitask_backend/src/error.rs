//! Error type of the task layer.

use thiserror::Error;

use nichannel_backend::ConfigError;

use crate::nidaqmx::DaqmxError;
use crate::registry::TaskId;

#[derive(Error, Debug)]
pub enum DaqError {
    /// Channel lookup or configuration failure. Raised before any driver call.
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Channels {channels:?} do not share a sample rate (got {rates:?})")]
    MismatchedSampleRate { channels: Vec<String>, rates: Vec<f64> },

    #[error("Invalid waveform: {0}")]
    InvalidWaveform(String),

    #[error(transparent)]
    Driver(#[from] DaqmxError),

    #[error("NI-DAQmx driver unavailable at {path}: {reason}")]
    DriverUnavailable { path: String, reason: String },

    #[error("Unknown task {0}")]
    UnknownTask(TaskId),

    #[error("Task {0} already exists")]
    DuplicateTask(TaskId),

    #[error("Task handle {handle} is already owned by task {owner}")]
    HandleInUse { handle: String, owner: TaskId },

    #[error("Task {id} is {state}, expected {expected}")]
    InvalidTaskState {
        id: TaskId,
        state: String,
        expected: String,
    },

    #[error("Task {id} timed out after {timeout}s: {source}")]
    AcquisitionTimeout {
        id: TaskId,
        timeout: f64,
        source: DaqmxError,
    },
}
