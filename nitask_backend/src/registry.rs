//! Bookkeeping of live DAQmx tasks.
//!
//! The [`TaskRegistry`] maps every task identifier handed out to callers onto the [`TaskRecord`] holding
//! its driver handle(s) and acquisition parameters. Identifiers are the task kind prefix followed by a
//! zero-padded per-kind counter (`ao000`, `ai001`, `ctr000`, ...). Counters only ever move forward, so an
//! identifier is never reused, even after its task was stopped.
//!
//! The registry owns handles but never talks to the driver: clearing them is the job of
//! [`crate::task`]. It enforces that no handle is owned by two records.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;

use crate::error::DaqError;
use crate::nidaqmx::TaskHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskKind {
    AnalogOutput,
    AnalogInput,
    DigitalOutput,
    /// Edge counter sampled on an internally generated clock
    Counter,
    /// Pulse-width counter sampled on an external gate
    GatedCounter,
}

impl TaskKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            TaskKind::AnalogOutput => "ao",
            TaskKind::AnalogInput => "ai",
            TaskKind::DigitalOutput => "do",
            TaskKind::Counter => "ctr",
            TaskKind::GatedCounter => "gatedctr",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Identifier of a task, e.g. `ai000`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(kind: TaskKind, seq: usize) -> Self {
        Self(format!("{}{:03}", kind.prefix(), seq))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Channels, timing and (for outputs) buffer configured; not started
    Configured,
    Running,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskState::Configured => f.write_str("configured"),
            TaskState::Running => f.write_str("running"),
        }
    }
}

/// Everything needed to run, read and tear down one configured task.
///
/// # Fields
/// - `primary`: handle started by `run` and read from.
/// - `secondary`: clock generator of a free-running counter. Lives and dies with `primary`; never exposed
///   as a task of its own.
/// - `samples`: requested samples per channel.
/// - `sample_rate`: resolved sample clock rate in Hz, `None` for tasks without a sample clock.
/// - `samps_per_read`: samples per channel requested from each read, `-1` reads everything available.
/// - `timeout`: seconds to wait for completion, negative waits forever.
/// - `physical_chans`: comma-separated DAQmx channel string the task was built on.
/// - `clock_terminal`: terminal carrying the task's sample clock, for tasks whose clock other tasks can share.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskRecord {
    pub kind: TaskKind,
    pub primary: TaskHandle,
    pub secondary: Option<TaskHandle>,
    pub samples: usize,
    pub sample_rate: Option<f64>,
    pub samps_per_read: i32,
    pub num_channels: usize,
    pub timeout: f64,
    pub state: TaskState,
    pub physical_chans: String,
    pub clock_terminal: Option<String>,
}

impl TaskRecord {
    pub fn handles(&self) -> impl Iterator<Item = TaskHandle> + '_ {
        std::iter::once(self.primary).chain(self.secondary)
    }
}

#[derive(Default, Debug)]
pub struct TaskRegistry {
    tasks: IndexMap<TaskId, TaskRecord>,
    counters: HashMap<TaskKind, usize>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next identifier for `kind`. Reserved identifiers are burnt even if the task is
    /// never inserted.
    pub fn allocate(&mut self, kind: TaskKind) -> TaskId {
        let seq = self.counters.entry(kind).or_insert(0);
        let id = TaskId::new(kind, *seq);
        *seq += 1;
        id
    }

    pub fn put(&mut self, id: TaskId, record: TaskRecord) -> Result<(), DaqError> {
        if self.tasks.contains_key(&id) {
            return Err(DaqError::DuplicateTask(id));
        }
        for handle in record.handles() {
            if let Some(owner) = self.owner_of(handle) {
                return Err(DaqError::HandleInUse {
                    handle: handle.to_string(),
                    owner: owner.clone(),
                });
            }
        }
        self.tasks.insert(id, record);
        Ok(())
    }

    pub fn get(&self, id: &TaskId) -> Result<&TaskRecord, DaqError> {
        self.tasks
            .get(id)
            .ok_or_else(|| DaqError::UnknownTask(id.clone()))
    }

    pub fn get_mut(&mut self, id: &TaskId) -> Result<&mut TaskRecord, DaqError> {
        self.tasks
            .get_mut(id)
            .ok_or_else(|| DaqError::UnknownTask(id.clone()))
    }

    pub fn remove(&mut self, id: &TaskId) -> Result<TaskRecord, DaqError> {
        self.tasks
            .shift_remove(id)
            .ok_or_else(|| DaqError::UnknownTask(id.clone()))
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    /// Live task identifiers in creation order.
    pub fn ids(&self) -> Vec<TaskId> {
        self.tasks.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Removes and returns every live record, most recent first. Identifier counters are kept.
    pub fn drain(&mut self) -> Vec<(TaskId, TaskRecord)> {
        let mut drained: Vec<_> = self.tasks.drain(..).collect();
        drained.reverse();
        drained
    }

    pub fn owner_of(&self, handle: TaskHandle) -> Option<&TaskId> {
        self.tasks
            .iter()
            .find(|(_, rec)| rec.handles().any(|h| h == handle))
            .map(|(id, _)| id)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn record(kind: TaskKind, primary: usize, secondary: Option<usize>) -> TaskRecord {
        TaskRecord {
            kind,
            primary: TaskHandle::from_raw(primary),
            secondary: secondary.map(TaskHandle::from_raw),
            samples: 10,
            sample_rate: Some(1000.),
            samps_per_read: 10,
            num_channels: 1,
            timeout: 1.04,
            state: TaskState::Configured,
            physical_chans: String::from("Dev1/ai0"),
            clock_terminal: None,
        }
    }

    #[test]
    fn id_format() {
        assert_eq!(TaskId::new(TaskKind::AnalogInput, 0).as_str(), "ai000");
        assert_eq!(TaskId::new(TaskKind::GatedCounter, 12).as_str(), "gatedctr012");
        assert_eq!(TaskId::new(TaskKind::Counter, 1234).as_str(), "ctr1234");
    }

    #[test]
    /// Counters are per kind and never rewind after removal.
    fn allocate_is_monotonic() {
        let mut reg = TaskRegistry::new();
        let a0 = reg.allocate(TaskKind::AnalogOutput);
        let i0 = reg.allocate(TaskKind::AnalogInput);
        reg.put(a0.clone(), record(TaskKind::AnalogOutput, 1, None))
            .unwrap();
        reg.remove(&a0).unwrap();
        let a1 = reg.allocate(TaskKind::AnalogOutput);
        assert_eq!((a0.as_str(), a1.as_str(), i0.as_str()), ("ao000", "ao001", "ai000"));
    }

    #[test]
    fn put_rejects_duplicates() {
        let mut reg = TaskRegistry::new();
        let id = reg.allocate(TaskKind::Counter);
        reg.put(id.clone(), record(TaskKind::Counter, 1, Some(2)))
            .unwrap();
        assert!(matches!(
            reg.put(id.clone(), record(TaskKind::Counter, 3, None)),
            Err(DaqError::DuplicateTask(_))
        ));

        // The secondary handle of a counter is owned too
        let other = reg.allocate(TaskKind::AnalogInput);
        match reg.put(other.clone(), record(TaskKind::AnalogInput, 2, None)) {
            Err(DaqError::HandleInUse { owner, .. }) => assert_eq!(owner, id),
            res => panic!("Expected HandleInUse, got {res:?}"),
        }
        assert!(!reg.contains(&other));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn remove_twice_is_unknown() {
        let mut reg = TaskRegistry::new();
        let id = reg.allocate(TaskKind::AnalogInput);
        reg.put(id.clone(), record(TaskKind::AnalogInput, 5, None))
            .unwrap();
        assert_eq!(reg.remove(&id).unwrap().primary, TaskHandle::from_raw(5));
        assert!(matches!(reg.remove(&id), Err(DaqError::UnknownTask(_))));
        assert!(matches!(reg.get(&id), Err(DaqError::UnknownTask(_))));
        assert!(reg.owner_of(TaskHandle::from_raw(5)).is_none());
    }

    #[test]
    fn drain_empties_in_reverse_order() {
        let mut reg = TaskRegistry::new();
        for raw in 1..4 {
            let id = reg.allocate(TaskKind::AnalogInput);
            reg.put(id, record(TaskKind::AnalogInput, raw, None)).unwrap();
        }
        let drained: Vec<String> = reg.drain().into_iter().map(|(id, _)| id.to_string()).collect();
        assert_eq!(drained, vec!["ai002", "ai001", "ai000"]);
        assert!(reg.is_empty());
        assert_eq!(reg.allocate(TaskKind::AnalogInput).as_str(), "ai003");
    }
}
