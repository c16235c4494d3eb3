use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::cgroup::PidResolver;
use crate::container::{ContainerID, ProcessId};
use crate::lookup::{NameKind, NameRegistry};

use super::{Counts, KernelProbe, ProbeMaps, ProbeOptions, Result};

/// One attach/detach cycle of the kernel probe.
///
/// The probe is detached when the session is closed or dropped, so every exit
/// path of the program releases the kernel resources.
#[derive(Debug)]
pub struct Session<P: ProbeMaps> {
    probe: P,
    registry: Arc<NameRegistry>,
}

impl Session<KernelProbe> {
    /// Loads and attaches the probe, then seeds it with the already running containers.
    ///
    /// # Errors
    ///
    /// Fails if the probe cannot be loaded or attached, or seeding fails. The
    /// probe is released again in both cases.
    pub fn open(
        probe_object: impl AsRef<Path>,
        options: ProbeOptions,
        registry: Arc<NameRegistry>,
        resolver: &PidResolver,
    ) -> Result<Self> {
        let probe = KernelProbe::load(probe_object, options)?;
        Self::with_probe(probe, options, registry, resolver)
    }
}

impl<P: ProbeMaps> Session<P> {
    /// Wraps an attached probe and seeds its PID table.
    ///
    /// The probe's hooks only see processes joining a cgroup after the probe
    /// was attached, so the PIDs of running containers are copied in from the
    /// cgroup filesystem. With `debug_logging` the name tables used by the
    /// probe's trace output are filled as well.
    pub fn with_probe(
        mut probe: P,
        options: ProbeOptions,
        registry: Arc<NameRegistry>,
        resolver: &PidResolver,
    ) -> Result<Self> {
        let mut seeded = 0;
        for (container_id, pids) in resolver.containers_pids()? {
            for pid in pids {
                probe.insert_pid(pid, &container_id)?;
                seeded += 1;
            }
        }
        log::debug!("Seeded {} pids of running containers", seeded);

        if options.debug_logging {
            for kind in [NameKind::Capability, NameKind::Syscall] {
                for (id, name) in registry.get(kind).iter() {
                    let Ok(key) = i32::try_from(id) else {
                        continue;
                    };
                    probe.insert_name(kind, key, name)?;
                }
            }
        }

        Ok(Self { probe, registry })
    }

    /// Detaches the probe.
    pub fn close(self) {
        drop(self);
    }

    /// Returns every container the probe knows about.
    ///
    /// This is the union of the containers in the PID table and those in the
    /// syscall counters, as counters can outlive the container's last process.
    pub fn container_ids(&self) -> Result<HashSet<ContainerID>> {
        let mut ids: HashSet<ContainerID> = self
            .probe
            .pid_entries()?
            .into_iter()
            .map(|(_, container_id)| container_id)
            .collect();
        ids.extend(
            self.probe
                .counter_entries(NameKind::Syscall)?
                .into_iter()
                .map(|entry| entry.container_id),
        );
        Ok(ids)
    }

    pub fn pid_to_container(&self) -> Result<HashMap<ProcessId, ContainerID>> {
        Ok(self.probe.pid_entries()?.into_iter().collect())
    }

    /// Returns the capability counters of one container, keyed by capability name.
    ///
    /// Scans the whole table. Use [`Session::all_counts`] when reading many containers.
    ///
    /// # Errors
    ///
    /// Fails with a lookup error if the table holds a capability number the
    /// registry does not know.
    pub fn capabilities_counts(&self, container_id: &ContainerID) -> Result<Counts> {
        self.counts(NameKind::Capability, container_id)
    }

    /// Returns the syscall counters of one container, keyed by syscall name.
    pub fn syscalls_counts(&self, container_id: &ContainerID) -> Result<Counts> {
        self.counts(NameKind::Syscall, container_id)
    }

    fn counts(&self, kind: NameKind, container_id: &ContainerID) -> Result<Counts> {
        let lookup = self.registry.get(kind);
        let mut counts = Counts::new();
        for entry in self.probe.counter_entries(kind)? {
            if &entry.container_id != container_id {
                continue;
            }
            let name = lookup.name(i64::from(entry.key))?;
            counts.insert(name.to_owned(), entry.count);
        }
        Ok(counts)
    }

    /// Returns the capability counters of every container.
    pub fn all_capabilities_counts(&self) -> Result<HashMap<ContainerID, Counts>> {
        self.all_counts(NameKind::Capability)
    }

    /// Returns the syscall counters of every container.
    pub fn all_syscalls_counts(&self) -> Result<HashMap<ContainerID, Counts>> {
        self.all_counts(NameKind::Syscall)
    }

    /// Returns the counters of every container in one scan of the table.
    pub fn all_counts(&self, kind: NameKind) -> Result<HashMap<ContainerID, Counts>> {
        let lookup = self.registry.get(kind);
        let mut all: HashMap<ContainerID, Counts> = HashMap::new();
        for entry in self.probe.counter_entries(kind)? {
            let name = lookup.name(i64::from(entry.key))?;
            all.entry(entry.container_id)
                .or_default()
                .insert(name.to_owned(), entry.count);
        }
        Ok(all)
    }

    /// Drops all kernel state of a container: its PID mappings and counters.
    ///
    /// Unfollowing a container the probe does not know is a no-op.
    pub fn unfollow(&mut self, container_id: &ContainerID) -> Result<()> {
        let mut removed = 0;
        for (pid, owner) in self.probe.pid_entries()? {
            if &owner == container_id {
                self.probe.remove_pid(pid)?;
                removed += 1;
            }
        }
        for kind in [NameKind::Capability, NameKind::Syscall] {
            for entry in self.probe.counter_entries(kind)? {
                if &entry.container_id == container_id {
                    self.probe.remove_counter(kind, container_id, entry.key)?;
                    removed += 1;
                }
            }
        }
        self.probe.remove_runtime_state(container_id)?;
        log::debug!(
            "Unfollowed container `{}` ({} entries)",
            container_id.short(),
            removed
        );
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn probe_mut(&mut self) -> &mut P {
        &mut self.probe
    }
}
