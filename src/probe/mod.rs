//! Kernel probe lifecycle and access to the probe's tables.
//!
//! The probe (see `probe/ctrace.bpf.c`) maintains three tables in the kernel:
//!
//! - `pid_to_container`: PID to container id, filled by the cgroup attach and
//!   fork hooks, emptied by the exit hook and pre-seeded from the cgroup
//!   filesystem when a [`Session`] opens.
//! - `container_capability_count`: `(container, capability)` to the number of
//!   granted capability checks.
//! - `container_syscall_count`: `(container, syscall)` to the number of syscall
//!   entries.
//!
//! Counters only ever grow while the probe is attached. User space reads them
//! through the [`ProbeMaps`] trait and never locks: every table operation is
//! atomic for a single key, which is all the monitor relies on.
mod error;
mod kernel;
#[cfg(test)]
pub(crate) mod memory;
mod session;

use std::collections::HashMap;

use crate::container::{ContainerID, ProcessId};
use crate::lookup::NameKind;

pub use error::{Error, Result};
pub use kernel::{DEFAULT_PROBE_OBJECT, KernelProbe};
pub use session::Session;

/// Per-name counters of a single container.
pub type Counts = HashMap<String, u64>;

/// Load-time switches of the kernel probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeOptions {
    /// Also count syscalls issued by the container runtime while it sets up the container.
    pub trace_runtime_calls: bool,
    /// Emit a human readable line per event to the kernel trace pipe.
    pub debug_logging: bool,
}

/// A single row of a counter table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterEntry {
    pub container_id: ContainerID,
    pub key: i32,
    pub count: u64,
}

/// Raw access to the kernel probe's tables.
///
/// [`KernelProbe`] talks to the real maps; tests use an in-memory table.
pub trait ProbeMaps {
    /// Returns every PID to container mapping.
    fn pid_entries(&self) -> Result<Vec<(ProcessId, ContainerID)>>;

    /// Maps `pid` to `container_id`, replacing any previous mapping.
    fn insert_pid(&mut self, pid: ProcessId, container_id: &ContainerID) -> Result<()>;

    /// Removes the mapping of `pid`. Removing a missing PID is not an error.
    fn remove_pid(&mut self, pid: ProcessId) -> Result<()>;

    /// Returns every row of the counter table for `kind`.
    fn counter_entries(&self, kind: NameKind) -> Result<Vec<CounterEntry>>;

    /// Removes one row of the counter table for `kind`. Removing a missing row
    /// is not an error.
    fn remove_counter(&mut self, kind: NameKind, container_id: &ContainerID, key: i32)
    -> Result<()>;

    /// Drops the probe's runtime bookkeeping for `container_id`. Missing
    /// entries are not an error.
    fn remove_runtime_state(&mut self, container_id: &ContainerID) -> Result<()>;

    /// Stores the name of `key` for the probe's debug output.
    fn insert_name(&mut self, kind: NameKind, key: i32, name: &str) -> Result<()>;
}
