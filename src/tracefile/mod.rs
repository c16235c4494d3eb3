//! Trace-files: the persisted capabilities and syscalls of a workload.
//!
//! ```text
//! ARCH
//! x86_64
//!
//! CAPABILITIES
//! net_raw
//!
//! SYSCALLS
//! read
//! write
//! ```
mod diff;
mod error;
mod options;

use std::collections::BTreeSet;
use std::fmt;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::fsutil::{self, FileError};
use crate::trace::{OutputSink, SinkOpener};

pub use diff::TracefileDiff;
pub use error::{Error, Result};
pub use options::{SeccompProfile, cap_options, expand_paths, seccomp_option, shell_quote};

pub const ARCH_SECTION: &str = "ARCH";
pub const CAPABILITIES_SECTION: &str = "CAPABILITIES";
pub const SYSCALLS_SECTION: &str = "SYSCALLS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracefile {
    pub arch: String,
    pub capabilities: BTreeSet<String>,
    pub syscalls: BTreeSet<String>,
}

impl Default for Tracefile {
    fn default() -> Self {
        Self {
            arch: std::env::consts::ARCH.to_owned(),
            capabilities: BTreeSet::new(),
            syscalls: BTreeSet::new(),
        }
    }
}

impl Tracefile {
    /// Parses a trace-file.
    ///
    /// A line consisting only of upper case letters starts a section. Blank
    /// lines and the content of unknown sections are ignored.
    pub fn parse<R: BufRead>(reader: R) -> std::io::Result<Self> {
        let mut tracefile = Self::default();
        let mut section = None;
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if is_section_header(line) {
                section = Some(line.to_owned());
                continue;
            }
            match section.as_deref() {
                Some(ARCH_SECTION) => tracefile.arch = line.to_owned(),
                Some(CAPABILITIES_SECTION) => {
                    tracefile.capabilities.insert(line.to_owned());
                }
                Some(SYSCALLS_SECTION) => {
                    tracefile.syscalls.insert(line.to_owned());
                }
                _ => {}
            }
        }
        Ok(tracefile)
    }

    /// Reads the trace-file at `path`, or returns `None` if there is none.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.is_file() {
            return Ok(None);
        }
        let reader = fsutil::open_file_reader(path)?;
        Self::parse(reader)
            .map(Some)
            .map_err(|source| FileError::new("read", path, source).into())
    }

    /// Reads the trace-file at `path`, or returns an empty one.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::load(path)?.unwrap_or_default())
    }

    pub fn add<'a>(
        &mut self,
        capabilities: impl IntoIterator<Item = &'a String>,
        syscalls: impl IntoIterator<Item = &'a String>,
    ) {
        self.capabilities.extend(capabilities.into_iter().cloned());
        self.syscalls.extend(syscalls.into_iter().cloned());
    }

    /// Writes the trace-file, creating missing parent directories.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        fsutil::write_file(path, self.to_string())?;
        Ok(())
    }
}

fn is_section_header(line: &str) -> bool {
    line.chars().any(|c| c.is_ascii_uppercase()) && !line.chars().any(|c| c.is_lowercase())
}

impl fmt::Display for Tracefile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{ARCH_SECTION}")?;
        writeln!(f, "{}", self.arch)?;
        writeln!(f)?;
        writeln!(f, "{CAPABILITIES_SECTION}")?;
        for capability in &self.capabilities {
            writeln!(f, "{capability}")?;
        }
        writeln!(f)?;
        writeln!(f, "{SYSCALLS_SECTION}")?;
        for syscall in &self.syscalls {
            writeln!(f, "{syscall}")?;
        }
        Ok(())
    }
}

/// Accumulates a container's names into a trace-file.
///
/// Every write merges into the current file content, so several containers
/// labelled with the same file add up.
#[derive(Debug, Clone)]
pub struct TracefileSink {
    path: PathBuf,
}

impl TracefileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl OutputSink for TracefileSink {
    type Error = Error;

    fn write(
        &mut self,
        capabilities: &BTreeSet<String>,
        syscalls: &BTreeSet<String>,
    ) -> Result<()> {
        let mut tracefile = Tracefile::load_or_default(&self.path)?;
        tracefile.add(capabilities, syscalls);
        tracefile.write(&self.path)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracefileOpener;

impl SinkOpener for TracefileOpener {
    type Sink = TracefileSink;

    fn open(&mut self, target: &str) -> TracefileSink {
        TracefileSink::new(target)
    }
}
