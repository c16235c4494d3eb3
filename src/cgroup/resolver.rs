use std::collections::HashMap;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::container::{self, ContainerID, ProcessId};
use crate::fsutil;

use super::{Error, Result};

/// Cgroup v1 `pids` controller directory Docker places its containers in.
pub const DEFAULT_CGROUP_DIR: &str = "/sys/fs/cgroup/pids/docker";

/// Name of the file listing the PIDs of a cgroup.
const TASKS_FILE: &str = "tasks";

/// Maps containers to the PIDs currently in their cgroup.
#[derive(Debug, Clone)]
pub struct PidResolver {
    cgroup_dir: PathBuf,
}

impl Default for PidResolver {
    fn default() -> Self {
        Self::new(DEFAULT_CGROUP_DIR)
    }
}

impl PidResolver {
    pub fn new(cgroup_dir: impl Into<PathBuf>) -> Self {
        Self {
            cgroup_dir: cgroup_dir.into(),
        }
    }

    /// Returns the PIDs of every container cgroup below the cgroup directory.
    ///
    /// A missing cgroup directory yields an empty map, as does a missing
    /// `tasks` file for a single container.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadDir`] if the directory exists but cannot be listed and
    /// [`Error::File`] if a `tasks` file exists but cannot be read.
    pub fn containers_pids(&self) -> Result<HashMap<ContainerID, Vec<ProcessId>>> {
        let entries = match std::fs::read_dir(&self.cgroup_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::warn!(
                    "cgroup directory `{}` does not exist, no running containers to seed",
                    self.cgroup_dir.display()
                );
                return Ok(HashMap::new());
            }
            Err(source) => {
                return Err(Error::ReadDir {
                    path: self.cgroup_dir.clone(),
                    source,
                });
            }
        };

        let mut mapping = HashMap::new();
        for entry in entries {
            let entry = entry.map_err(|source| Error::ReadDir {
                path: self.cgroup_dir.clone(),
                source,
            })?;
            let Some(container_id) = extract_container_id(&entry.file_name()) else {
                continue;
            };
            let pids = read_pids_from(&entry.path())?;
            log::trace!("container `{}` has pids {:?}", container_id.short(), pids);
            mapping.insert(container_id, pids);
        }

        log::debug!(
            "Resolved {} containers below `{}`",
            mapping.len(),
            self.cgroup_dir.display()
        );
        Ok(mapping)
    }
}

/// Reads the PIDs listed in the `tasks` file of the cgroup at `path`.
fn read_pids_from(path: &Path) -> Result<Vec<ProcessId>> {
    let tasks = path.join(TASKS_FILE);
    let Some(lines) = fsutil::read_lines_if_exists(&tasks)? else {
        log::debug!("missing tasks file `{}`", tasks.display());
        return Ok(Vec::new());
    };

    let mut pids = Vec::with_capacity(lines.len());
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.parse::<ProcessId>() {
            Ok(pid) => pids.push(pid),
            Err(err) => log::warn!("invalid pid `{}` in `{}`: {}", line, tasks.display(), err),
        }
    }

    Ok(pids)
}

/// Returns the container id if the cgroup directory name is a full container id.
#[inline]
fn extract_container_id(name: &OsStr) -> Option<ContainerID> {
    let name = name.as_bytes();
    if !container::is_canonical_id(name) {
        return None;
    }
    ContainerID::new(std::str::from_utf8(name).ok()?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const ID_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const ID_B: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn write_tasks(root: &Path, id: &str, contents: &str) {
        let dir = root.join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(TASKS_FILE), contents).unwrap();
    }

    #[test]
    fn test_extract_valid_container_id() {
        let id = extract_container_id(OsStr::new(ID_B)).unwrap();
        assert_eq!(id.as_str(), ID_B);
    }

    #[test]
    fn test_extract_invalid_container_id() {
        assert!(extract_container_id(OsStr::new("cgroup.procs")).is_none());
        assert!(extract_container_id(OsStr::new(&ID_B[..12])).is_none());
        assert!(extract_container_id(OsStr::new(&ID_B.replace('a', "z"))).is_none());
    }

    #[test]
    fn test_containers_pids() {
        let root = tempfile::tempdir().unwrap();
        write_tasks(root.path(), ID_A, "10\n11\n\n");
        write_tasks(root.path(), ID_B, "42\n");
        fs::write(root.path().join("tasks"), "1\n").unwrap();
        fs::create_dir_all(root.path().join("not-a-container")).unwrap();

        let pids = PidResolver::new(root.path()).containers_pids().unwrap();
        assert_eq!(pids.len(), 2);
        assert_eq!(pids[ID_A], vec![10, 11]);
        assert_eq!(pids[ID_B], vec![42]);
    }

    #[test]
    fn test_missing_tasks_file_is_empty() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join(ID_A)).unwrap();

        let pids = PidResolver::new(root.path()).containers_pids().unwrap();
        assert_eq!(pids[ID_A], Vec::<ProcessId>::new());
    }

    #[test]
    fn test_invalid_pid_lines_are_skipped() {
        let root = tempfile::tempdir().unwrap();
        write_tasks(root.path(), ID_A, "7\nnope\n8\n");

        let pids = PidResolver::new(root.path()).containers_pids().unwrap();
        assert_eq!(pids[ID_A], vec![7, 8]);
    }

    #[test]
    fn test_missing_cgroup_dir() {
        let root = tempfile::tempdir().unwrap();
        let resolver = PidResolver::new(root.path().join("docker"));
        assert!(resolver.containers_pids().unwrap().is_empty());
    }
}
