//! Snapshots of the probe's counters and what changed between them.
mod error;

use std::collections::{BTreeSet, HashMap};

use crate::container::ContainerID;
use crate::probe::{Counts, ProbeMaps, Session};

pub use error::{Error, Result};

/// Counters of every known container at one poll instant.
pub type Snapshot = HashMap<ContainerID, Counts>;

/// Names that are new or changed since the previous snapshot, per container.
pub type Diff = HashMap<ContainerID, BTreeSet<String>>;

/// Polls a [`Session`] and keeps the latest capability and syscall diffs.
#[derive(Debug, Default)]
pub struct ContainerMonitor {
    capabilities: Snapshot,
    syscalls: Snapshot,
    capabilities_diff: Diff,
    syscalls_diff: Diff,
}

impl ContainerMonitor {
    /// Creates a monitor and takes the first snapshot.
    ///
    /// Every container present at this point is reported in full by the first
    /// queries.
    pub fn new<P: ProbeMaps>(session: &Session<P>) -> Result<Self> {
        let mut monitor = Self::default();
        monitor.update(session)?;
        Ok(monitor)
    }

    /// Takes a fresh snapshot and replaces the stored diffs.
    ///
    /// Containers are taken from [`Session::container_ids`]. A container without
    /// counters gets an empty entry.
    pub fn update<P: ProbeMaps>(&mut self, session: &Session<P>) -> Result<()> {
        let ids = session.container_ids()?;
        let mut all_capabilities = session.all_capabilities_counts()?;
        let mut all_syscalls = session.all_syscalls_counts()?;

        let mut capabilities = Snapshot::with_capacity(ids.len());
        let mut syscalls = Snapshot::with_capacity(ids.len());
        for id in ids {
            capabilities.insert(
                id.clone(),
                all_capabilities.remove(&id).unwrap_or_default(),
            );
            syscalls.insert(id.clone(), all_syscalls.remove(&id).unwrap_or_default());
        }

        self.capabilities_diff = diff(&self.capabilities, &capabilities);
        self.syscalls_diff = diff(&self.syscalls, &syscalls);
        self.capabilities = capabilities;
        self.syscalls = syscalls;
        log::trace!("Updated snapshot of {} containers", self.syscalls.len());
        Ok(())
    }

    /// Capabilities new or changed in the latest update.
    pub fn last_capabilities(&self, container_id: &ContainerID) -> Result<&BTreeSet<String>> {
        self.capabilities_diff
            .get(container_id)
            .ok_or_else(|| Error::NotFound(container_id.clone()))
    }

    /// Syscalls new or changed in the latest update.
    pub fn last_syscalls(&self, container_id: &ContainerID) -> Result<&BTreeSet<String>> {
        self.syscalls_diff
            .get(container_id)
            .ok_or_else(|| Error::NotFound(container_id.clone()))
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, container_id: &ContainerID) -> bool {
        self.syscalls.contains_key(container_id)
    }
}

/// Computes the names of `new` that are missing from `old` or whose count changed.
///
/// A container missing from `old` reports all of its names. Containers missing
/// from `new` get no entry.
pub fn diff(old: &Snapshot, new: &Snapshot) -> Diff {
    new.iter()
        .map(|(id, counts)| {
            let changed = match old.get(id) {
                None => counts.keys().cloned().collect(),
                Some(previous) => counts
                    .iter()
                    .filter(|(name, count)| previous.get(*name) != Some(*count))
                    .map(|(name, _)| name.clone())
                    .collect(),
            };
            (id.clone(), changed)
        })
        .collect()
}
