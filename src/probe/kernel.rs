use std::path::Path;

use aya::maps::{HashMap, MapData, MapError};
use aya::programs::{KProbe, RawTracePoint};
use aya::{Ebpf, EbpfLoader, Pod};

use crate::container::{CONTAINER_ID_LEN, ContainerID, ProcessId};
use crate::lookup::NameKind;

use super::{CounterEntry, Error, ProbeMaps, ProbeOptions, Result};

/// Where the compiled probe is installed by default.
pub const DEFAULT_PROBE_OBJECT: &str = "/usr/lib/ctrace/ctrace.bpf.o";

const PID_TO_CONTAINER: &str = "pid_to_container";
const CAPABILITY_COUNT: &str = "container_capability_count";
const SYSCALL_COUNT: &str = "container_syscall_count";
const RUNTIME_HAS_RUN: &str = "runtime_has_run";
const RUNTIME_NOT_FINISHED: &str = "runtime_not_finished";
const RUNTIME_PID: &str = "runtime_pid";
const CAPABILITY_NAMES: &str = "capability_names";
const SYSCALL_NAMES: &str = "syscall_names";

const TRACE_RUNTIME_CALLS: &str = "TRACE_RUNTIME_CALLS";
const DEBUG_LOGGING: &str = "DEBUG_LOGGING";

/// `(program, raw tracepoint)` pairs attached on load.
const RAW_TRACEPOINTS: &[(&str, &str)] = &[
    ("ctrace_cgroup_attach_task", "cgroup_attach_task"),
    ("ctrace_sched_process_fork", "sched_process_fork"),
    ("ctrace_sched_process_exit", "sched_process_exit"),
    ("ctrace_sys_enter", "sys_enter"),
];

/// `(program, kernel symbol)` pairs attached on load.
const KPROBES: &[(&str, &str)] = &[("ctrace_cap_capable", "cap_capable")];

/// Length of the name buffers in the debug name tables, without the NUL.
const NAME_MAX_LEN: usize = 32;

/// `struct container` of the probe.
#[repr(C)]
#[derive(Clone, Copy)]
struct RawContainer {
    id: [u8; CONTAINER_ID_LEN + 1],
}

// SAFETY: plain byte array, identical layout on both sides.
unsafe impl Pod for RawContainer {}

impl From<&ContainerID> for RawContainer {
    fn from(container_id: &ContainerID) -> Self {
        let mut id = [0u8; CONTAINER_ID_LEN + 1];
        let src = container_id.as_str().as_bytes();
        let len = src.len().min(CONTAINER_ID_LEN);
        id[..len].copy_from_slice(&src[..len]);
        Self { id }
    }
}

/// `struct container_key` of the probe. The padding is spelled out so keys
/// built here hash to the same bytes as keys built by the probe.
#[repr(C)]
#[derive(Clone, Copy)]
struct RawCounterKey {
    container: RawContainer,
    _pad: [u8; 3],
    key: i32,
}

// SAFETY: `#[repr(C)]` with explicit padding, every byte is initialized.
unsafe impl Pod for RawCounterKey {}

/// `struct string` of the probe.
#[repr(C)]
#[derive(Clone, Copy)]
struct RawName {
    value: [u8; NAME_MAX_LEN + 1],
}

// SAFETY: plain byte array.
unsafe impl Pod for RawName {}

fn counter_map(kind: NameKind) -> &'static str {
    match kind {
        NameKind::Capability => CAPABILITY_COUNT,
        NameKind::Syscall => SYSCALL_COUNT,
    }
}

fn names_map(kind: NameKind) -> &'static str {
    match kind {
        NameKind::Capability => CAPABILITY_NAMES,
        NameKind::Syscall => SYSCALL_NAMES,
    }
}

fn map_error(map: &'static str) -> impl Fn(MapError) -> Error {
    move |source| Error::Map {
        map,
        source: Box::new(source),
    }
}

/// The loaded and attached kernel probe.
///
/// Dropping the probe detaches all programs and releases its maps.
pub struct KernelProbe {
    ebpf: Ebpf,
}

impl std::fmt::Debug for KernelProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelProbe").finish_non_exhaustive()
    }
}

impl KernelProbe {
    /// Loads the compiled probe at `path` and attaches all of its programs.
    ///
    /// # Errors
    ///
    /// Fails if the object cannot be loaded or any program cannot be attached.
    /// Everything attached up to that point is released again.
    pub fn load(path: impl AsRef<Path>, options: ProbeOptions) -> Result<Self> {
        let path = path.as_ref();
        let trace_runtime_calls = u8::from(options.trace_runtime_calls);
        let debug_logging = u8::from(options.debug_logging);

        log::debug!("Loading kernel probe `{}` ({:?})", path.display(), options);
        let mut ebpf = EbpfLoader::new()
            .set_global(TRACE_RUNTIME_CALLS, &trace_runtime_calls, true)
            .set_global(DEBUG_LOGGING, &debug_logging, true)
            .load_file(path)
            .map_err(|source| Error::Load {
                path: path.to_path_buf(),
                source: Box::new(source),
            })?;

        for &(program, tracepoint) in RAW_TRACEPOINTS {
            attach_raw_tracepoint(&mut ebpf, program, tracepoint)?;
        }
        for &(program, symbol) in KPROBES {
            attach_kprobe(&mut ebpf, program, symbol)?;
        }
        log::info!("Attached kernel probe `{}`", path.display());

        Ok(Self { ebpf })
    }

    fn hash_map<K: Pod, V: Pod>(&self, name: &'static str) -> Result<HashMap<&MapData, K, V>> {
        let map = self.ebpf.map(name).ok_or(Error::MapNotFound(name))?;
        HashMap::try_from(map).map_err(map_error(name))
    }

    fn hash_map_mut<K: Pod, V: Pod>(
        &mut self,
        name: &'static str,
    ) -> Result<HashMap<&mut MapData, K, V>> {
        let map = self.ebpf.map_mut(name).ok_or(Error::MapNotFound(name))?;
        HashMap::try_from(map).map_err(map_error(name))
    }
}

impl Drop for KernelProbe {
    fn drop(&mut self) {
        log::info!("Detaching kernel probe");
    }
}

fn attach_raw_tracepoint(
    ebpf: &mut Ebpf,
    program: &'static str,
    tracepoint: &'static str,
) -> Result<()> {
    let attach_err = |source| Error::Attach {
        program,
        target: tracepoint,
        source: Box::new(source),
    };
    let prog: &mut RawTracePoint = ebpf
        .program_mut(program)
        .ok_or(Error::ProgramNotFound(program))?
        .try_into()
        .map_err(|source| Error::ProgramType {
            program,
            source: Box::new(source),
        })?;
    prog.load().map_err(attach_err)?;
    prog.attach(tracepoint).map_err(attach_err)?;
    log::debug!("attached raw tracepoint {}", tracepoint);
    Ok(())
}

fn attach_kprobe(ebpf: &mut Ebpf, program: &'static str, symbol: &'static str) -> Result<()> {
    let attach_err = |source| Error::Attach {
        program,
        target: symbol,
        source: Box::new(source),
    };
    let prog: &mut KProbe = ebpf
        .program_mut(program)
        .ok_or(Error::ProgramNotFound(program))?
        .try_into()
        .map_err(|source| Error::ProgramType {
            program,
            source: Box::new(source),
        })?;
    prog.load().map_err(attach_err)?;
    prog.attach(symbol, 0).map_err(attach_err)?;
    log::debug!("attached kprobe {}", symbol);
    Ok(())
}

/// Collects all entries of a map the kernel is writing to concurrently.
///
/// A key removed by the kernel between being listed and being read shows up
/// as `KeyNotFound` and is skipped.
fn collect_entries<K: Pod, V: Pod>(
    map: &HashMap<&MapData, K, V>,
    name: &'static str,
) -> Result<Vec<(K, V)>> {
    let mut entries = Vec::new();
    for item in map.iter() {
        match item {
            Ok(entry) => entries.push(entry),
            Err(MapError::KeyNotFound) => continue,
            Err(source) => return Err(map_error(name)(source)),
        }
    }
    Ok(entries)
}

/// Treats deleting an absent key as success.
fn ignore_missing(result: std::result::Result<(), MapError>) -> std::result::Result<(), MapError> {
    match result {
        Err(MapError::KeyNotFound) => Ok(()),
        Err(MapError::SyscallError(err)) if err.io_error.kind() == std::io::ErrorKind::NotFound => {
            Ok(())
        }
        other => other,
    }
}

impl ProbeMaps for KernelProbe {
    fn pid_entries(&self) -> Result<Vec<(ProcessId, ContainerID)>> {
        let map = self.hash_map::<u32, RawContainer>(PID_TO_CONTAINER)?;
        let entries = collect_entries(&map, PID_TO_CONTAINER)?
            .into_iter()
            .filter_map(|(pid, raw)| match ContainerID::from_nul_terminated(&raw.id) {
                Ok(container_id) => Some((pid, container_id)),
                Err(err) => {
                    log::trace!("skipping pid {} with {}", pid, err);
                    None
                }
            })
            .collect();
        Ok(entries)
    }

    fn insert_pid(&mut self, pid: ProcessId, container_id: &ContainerID) -> Result<()> {
        let mut map = self.hash_map_mut::<u32, RawContainer>(PID_TO_CONTAINER)?;
        map.insert(pid, RawContainer::from(container_id), 0)
            .map_err(map_error(PID_TO_CONTAINER))
    }

    fn remove_pid(&mut self, pid: ProcessId) -> Result<()> {
        let mut map = self.hash_map_mut::<u32, RawContainer>(PID_TO_CONTAINER)?;
        ignore_missing(map.remove(&pid)).map_err(map_error(PID_TO_CONTAINER))
    }

    fn counter_entries(&self, kind: NameKind) -> Result<Vec<CounterEntry>> {
        let name = counter_map(kind);
        let map = self.hash_map::<RawCounterKey, u64>(name)?;
        let entries = collect_entries(&map, name)?
            .into_iter()
            .filter_map(|(raw, count)| {
                let container_id = ContainerID::from_nul_terminated(&raw.container.id).ok()?;
                Some(CounterEntry {
                    container_id,
                    key: raw.key,
                    count,
                })
            })
            .collect();
        Ok(entries)
    }

    fn remove_counter(
        &mut self,
        kind: NameKind,
        container_id: &ContainerID,
        key: i32,
    ) -> Result<()> {
        let name = counter_map(kind);
        let mut map = self.hash_map_mut::<RawCounterKey, u64>(name)?;
        let raw = RawCounterKey {
            container: RawContainer::from(container_id),
            _pad: [0; 3],
            key,
        };
        ignore_missing(map.remove(&raw)).map_err(map_error(name))
    }

    fn remove_runtime_state(&mut self, container_id: &ContainerID) -> Result<()> {
        let raw = RawContainer::from(container_id);
        for name in [RUNTIME_HAS_RUN, RUNTIME_NOT_FINISHED] {
            let mut map = self.hash_map_mut::<RawContainer, u8>(name)?;
            ignore_missing(map.remove(&raw)).map_err(map_error(name))?;
        }
        let mut map = self.hash_map_mut::<RawContainer, u32>(RUNTIME_PID)?;
        ignore_missing(map.remove(&raw)).map_err(map_error(RUNTIME_PID))
    }

    fn insert_name(&mut self, kind: NameKind, key: i32, name: &str) -> Result<()> {
        let map_name = names_map(kind);
        let mut map = self.hash_map_mut::<i32, RawName>(map_name)?;
        let mut value = [0u8; NAME_MAX_LEN + 1];
        let len = name.len().min(NAME_MAX_LEN);
        value[..len].copy_from_slice(&name.as_bytes()[..len]);
        map.insert(key, RawName { value }, 0)
            .map_err(map_error(map_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_layouts_match_probe() {
        assert_eq!(std::mem::size_of::<RawContainer>(), 65);
        assert_eq!(std::mem::size_of::<RawCounterKey>(), 72);
        assert_eq!(std::mem::size_of::<RawName>(), 33);
    }

    #[test]
    fn test_raw_container_truncates_and_terminates() {
        let long = ContainerID::new("f".repeat(80)).unwrap();
        let raw = RawContainer::from(&long);
        assert_eq!(&raw.id[..64], "f".repeat(64).as_bytes());
        assert_eq!(raw.id[64], 0);

        let short = ContainerID::new("abc").unwrap();
        let raw = RawContainer::from(&short);
        assert_eq!(ContainerID::from_nul_terminated(&raw.id).unwrap(), short);
    }
}
