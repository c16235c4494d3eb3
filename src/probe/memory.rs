//! In-memory stand-in for the kernel tables.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::container::{ContainerID, ProcessId};
use crate::lookup::{Lookup, NameKind, NameRegistry};

use super::{CounterEntry, ProbeMaps, Result};

#[derive(Debug, Default)]
pub(crate) struct InMemoryProbe {
    pub pids: BTreeMap<ProcessId, ContainerID>,
    pub capabilities: BTreeMap<(ContainerID, i32), u64>,
    pub syscalls: BTreeMap<(ContainerID, i32), u64>,
    pub runtime_state: BTreeSet<ContainerID>,
    pub capability_names: BTreeMap<i32, String>,
    pub syscall_names: BTreeMap<i32, String>,
}

impl InMemoryProbe {
    fn table(&self, kind: NameKind) -> &BTreeMap<(ContainerID, i32), u64> {
        match kind {
            NameKind::Capability => &self.capabilities,
            NameKind::Syscall => &self.syscalls,
        }
    }

    fn table_mut(&mut self, kind: NameKind) -> &mut BTreeMap<(ContainerID, i32), u64> {
        match kind {
            NameKind::Capability => &mut self.capabilities,
            NameKind::Syscall => &mut self.syscalls,
        }
    }

    /// Adds `n` to a counter, the way the probe's hooks do.
    pub fn record(&mut self, kind: NameKind, container_id: &ContainerID, key: i32, n: u64) {
        *self
            .table_mut(kind)
            .entry((container_id.clone(), key))
            .or_default() += n;
    }
}

impl ProbeMaps for InMemoryProbe {
    fn pid_entries(&self) -> Result<Vec<(ProcessId, ContainerID)>> {
        Ok(self
            .pids
            .iter()
            .map(|(pid, id)| (*pid, id.clone()))
            .collect())
    }

    fn insert_pid(&mut self, pid: ProcessId, container_id: &ContainerID) -> Result<()> {
        self.pids.insert(pid, container_id.clone());
        Ok(())
    }

    fn remove_pid(&mut self, pid: ProcessId) -> Result<()> {
        self.pids.remove(&pid);
        Ok(())
    }

    fn counter_entries(&self, kind: NameKind) -> Result<Vec<CounterEntry>> {
        Ok(self
            .table(kind)
            .iter()
            .map(|((container_id, key), count)| CounterEntry {
                container_id: container_id.clone(),
                key: *key,
                count: *count,
            })
            .collect())
    }

    fn remove_counter(
        &mut self,
        kind: NameKind,
        container_id: &ContainerID,
        key: i32,
    ) -> Result<()> {
        self.table_mut(kind).remove(&(container_id.clone(), key));
        Ok(())
    }

    fn remove_runtime_state(&mut self, container_id: &ContainerID) -> Result<()> {
        self.runtime_state.remove(container_id);
        Ok(())
    }

    fn insert_name(&mut self, kind: NameKind, key: i32, name: &str) -> Result<()> {
        let names = match kind {
            NameKind::Capability => &mut self.capability_names,
            NameKind::Syscall => &mut self.syscall_names,
        };
        names.insert(key, name.to_owned());
        Ok(())
    }
}

/// A 64 character container id made of `c`.
pub(crate) fn id(c: char) -> ContainerID {
    ContainerID::new(c.to_string().repeat(64)).unwrap()
}

/// A small registry covering the ids used in tests.
pub(crate) fn registry() -> Arc<NameRegistry> {
    let capabilities = Lookup::new(
        NameKind::Capability,
        [(0, "CAP_CHOWN"), (12, "CAP_NET_ADMIN"), (13, "CAP_NET_RAW")],
    );
    let syscalls = Lookup::new(
        NameKind::Syscall,
        [(0, "read"), (1, "write"), (2, "open"), (96, "gettimeofday")],
    );
    Arc::new(NameRegistry::new(capabilities, syscalls))
}
