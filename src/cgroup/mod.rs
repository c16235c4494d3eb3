//! Container to PID resolution through the cgroup filesystem.
//!
//! The kernel probe only observes cgroup attach, fork, and exit events that
//! happen after it is loaded. Containers that were already running at that
//! point are discovered here by walking the Docker cgroup directory once and
//! reading the member PIDs of every container cgroup.
//!
//! # Layout
//!
//! ```text
//! /sys/fs/cgroup/pids/docker/
//! ├── <64-hex-id>/tasks
//! └── <64-hex-id>/tasks
//! ```
//!
//! A container cgroup without a `tasks` file (the container is being torn
//! down) resolves to an empty PID list.
mod error;
mod resolver;

pub use error::{Error, Result};
pub use resolver::{DEFAULT_CGROUP_DIR, PidResolver};
