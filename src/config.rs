//! Runtime configuration, read from `CTRACE_*` environment variables.
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use crate::cgroup::DEFAULT_CGROUP_DIR;
use crate::discovery::{DEFAULT_DOCKER_SOCKET, DEFAULT_POLL_TIMEOUT};
use crate::fsutil;
use crate::lookup::{self, NameRegistry};
use crate::probe::{DEFAULT_PROBE_OBJECT, ProbeOptions};
use crate::trace::{DEFAULT_OUTPUT_LABEL, DEFAULT_STALE_GRACE};

pub const DOCKER_SOCKET_VAR: &str = "CTRACE_DOCKER_SOCKET";
pub const CGROUP_DIR_VAR: &str = "CTRACE_CGROUP_DIR";
pub const PROBE_OBJECT_VAR: &str = "CTRACE_PROBE_OBJECT";
pub const CAPABILITY_HEADER_VAR: &str = "CTRACE_CAPABILITY_HEADER";
pub const SYSCALL_HEADER_VAR: &str = "CTRACE_SYSCALL_HEADER";
pub const POLL_TIMEOUT_VAR: &str = "CTRACE_POLL_TIMEOUT_SECS";
pub const STALE_GRACE_VAR: &str = "CTRACE_STALE_GRACE_SECS";
pub const OUTPUT_LABEL_VAR: &str = "CTRACE_OUTPUT_LABEL";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid value `{value}` for `{var}`: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceConfig {
    pub docker_socket: PathBuf,
    pub cgroup_dir: PathBuf,
    pub probe_object: PathBuf,
    pub capability_header: PathBuf,
    pub syscall_header: PathBuf,
    pub poll_timeout: Duration,
    pub stale_grace: Duration,
    pub output_label: String,
    pub probe: ProbeOptions,
}

impl TraceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|var| std::env::var_os(var))
    }

    /// Builds the configuration from `lookup`, using defaults for unset variables.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let path = |var: &str, default: &dyn Fn() -> PathBuf| {
            lookup(var).map(PathBuf::from).unwrap_or_else(default)
        };
        let seconds = |var: &'static str, default: Duration| -> Result<Duration> {
            let Some(value) = lookup(var) else {
                return Ok(default);
            };
            let value = value.to_string_lossy();
            match value.trim().parse::<u64>() {
                Ok(0) => Err(Error::InvalidValue {
                    var,
                    value: value.into_owned(),
                    reason: "must be at least one second".to_owned(),
                }),
                Ok(secs) => Ok(Duration::from_secs(secs)),
                Err(err) => Err(Error::InvalidValue {
                    var,
                    value: value.into_owned(),
                    reason: err.to_string(),
                }),
            }
        };

        let output_label = match lookup(OUTPUT_LABEL_VAR) {
            None => DEFAULT_OUTPUT_LABEL.to_owned(),
            Some(label) => {
                let label = label.to_string_lossy().into_owned();
                if !label.contains('.') {
                    return Err(Error::InvalidValue {
                        var: OUTPUT_LABEL_VAR,
                        value: label,
                        reason: "labels without a namespace are never reported".to_owned(),
                    });
                }
                label
            }
        };

        Ok(Self {
            docker_socket: path(DOCKER_SOCKET_VAR, &|| DEFAULT_DOCKER_SOCKET.into()),
            cgroup_dir: path(CGROUP_DIR_VAR, &|| DEFAULT_CGROUP_DIR.into()),
            probe_object: path(PROBE_OBJECT_VAR, &|| DEFAULT_PROBE_OBJECT.into()),
            capability_header: path(CAPABILITY_HEADER_VAR, &default_capability_header),
            syscall_header: path(SYSCALL_HEADER_VAR, &default_syscall_header),
            poll_timeout: seconds(POLL_TIMEOUT_VAR, DEFAULT_POLL_TIMEOUT)?,
            stale_grace: seconds(STALE_GRACE_VAR, DEFAULT_STALE_GRACE)?,
            output_label,
            probe: ProbeOptions::default(),
        })
    }

    /// Loads the capability and syscall tables from the configured headers.
    pub fn name_registry(&self) -> lookup::Result<NameRegistry> {
        NameRegistry::from_headers(&self.capability_header, &self.syscall_header)
    }
}

fn default_capability_header() -> PathBuf {
    let mut candidates = Vec::new();
    if let Ok(release) = std::fs::read_to_string("/proc/sys/kernel/osrelease") {
        candidates.push(
            PathBuf::from("/usr/src")
                .join(format!("linux-headers-{}", release.trim()))
                .join("include/uapi/linux/capability.h"),
        );
    }
    candidates.push(PathBuf::from("/usr/include/linux/capability.h"));
    fsutil::first_existing(&candidates).unwrap_or_else(|| "/usr/include/linux/capability.h".into())
}

fn default_syscall_header() -> PathBuf {
    let candidates = [
        PathBuf::from("/usr/include")
            .join(format!("{}-linux-gnu", std::env::consts::ARCH))
            .join("asm/unistd_64.h"),
        PathBuf::from("/usr/include/asm/unistd_64.h"),
    ];
    fsutil::first_existing(&candidates).unwrap_or_else(|| "/usr/include/asm/unistd_64.h".into())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<TraceConfig> {
        let vars: HashMap<String, OsString> = vars
            .iter()
            .map(|(key, value)| ((*key).to_owned(), OsString::from(value)))
            .collect();
        TraceConfig::from_vars(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.docker_socket, PathBuf::from("/var/run/docker.sock"));
        assert_eq!(config.cgroup_dir, PathBuf::from("/sys/fs/cgroup/pids/docker"));
        assert_eq!(config.poll_timeout, Duration::from_secs(15));
        assert_eq!(config.stale_grace, Duration::from_secs(15));
        assert_eq!(config.output_label, "ctrace.output-file");
        assert_eq!(config.probe, ProbeOptions::default());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            (DOCKER_SOCKET_VAR, "/run/docker.sock"),
            (CAPABILITY_HEADER_VAR, "/tmp/capability.h"),
            (POLL_TIMEOUT_VAR, " 2 "),
            (OUTPUT_LABEL_VAR, "com.example.trace"),
        ])
        .unwrap();
        assert_eq!(config.docker_socket, PathBuf::from("/run/docker.sock"));
        assert_eq!(config.capability_header, PathBuf::from("/tmp/capability.h"));
        assert_eq!(config.poll_timeout, Duration::from_secs(2));
        assert_eq!(config.output_label, "com.example.trace");
    }

    #[test]
    fn test_invalid_values() {
        for vars in [
            [(POLL_TIMEOUT_VAR, "soon")],
            [(STALE_GRACE_VAR, "0")],
            [(OUTPUT_LABEL_VAR, "trace")],
        ] {
            assert!(matches!(config(&vars), Err(Error::InvalidValue { .. })));
        }
    }
}
