//! Command line interface.
use std::collections::BTreeSet;
use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::config::TraceConfig;
use crate::lookup::{Lookup, NameRegistry};
use crate::tracefile::{self, Tracefile, TracefileDiff};

/// `EX_NOINPUT` of sysexits.h.
pub const EXIT_NO_INPUT: u8 = 66;

#[derive(Debug, Parser)]
#[command(name = "ctrace", version, about = "Trace capabilities and syscalls of docker containers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Trace containers labelled with an output file
    Trace {
        /// Write probe events to /sys/kernel/debug/tracing/trace_pipe
        #[arg(long)]
        debug: bool,
        /// Also trace the container runtime while it sets up a container
        #[arg(long)]
        trace_runtime: bool,
    },
    /// Generate `docker run` options restricted to the traced behaviour
    Options {
        /// Where to write the seccomp profile
        #[arg(short, long, default_value = "seccomp.json")]
        output: PathBuf,
        /// Trace-files or directories containing trace-files
        #[arg(required = true)]
        tracefiles: Vec<PathBuf>,
    },
    /// Compare two trace-files
    Diff { old: PathBuf, new: PathBuf },
    /// Look up a capability by id or name
    Capability { query: Option<String> },
    /// Look up a syscall by id or name
    Syscall { query: Option<String> },
}

/// Runs a command and returns the process exit code.
pub async fn run(cli: Cli) -> Result<u8, Box<dyn Error>> {
    let mut stdout = std::io::stdout();
    match cli.command {
        Command::Trace {
            debug,
            trace_runtime,
        } => {
            let mut config = TraceConfig::from_env()?;
            config.probe.debug_logging |= debug;
            config.probe.trace_runtime_calls |= trace_runtime;
            crate::run_trace(config).await?;
            Ok(0)
        }
        Command::Options { output, tracefiles } => options(&output, &tracefiles, &mut stdout),
        Command::Diff { old, new } => diff(&old, &new, &mut stdout),
        Command::Capability { query } => {
            let registry = registry()?;
            lookup(registry.capabilities(), query.as_deref(), &mut stdout)
        }
        Command::Syscall { query } => {
            let registry = registry()?;
            lookup(registry.syscalls(), query.as_deref(), &mut stdout)
        }
    }
}

fn registry() -> Result<NameRegistry, Box<dyn Error>> {
    Ok(TraceConfig::from_env()?.name_registry()?)
}

/// Prints the `docker run` options allowing what the trace-files recorded.
pub fn options<P: AsRef<Path>>(
    output: &Path,
    paths: &[P],
    out: &mut impl Write,
) -> Result<u8, Box<dyn Error>> {
    let paths = tracefile::expand_paths(paths)?;
    if paths.is_empty() {
        writeln!(out, "No Tracefile found")?;
        return Ok(EXIT_NO_INPUT);
    }

    let mut capabilities = BTreeSet::new();
    let mut syscalls = BTreeSet::new();
    for path in &paths {
        let tracefile = Tracefile::load_or_default(path)?;
        capabilities.extend(tracefile.capabilities);
        syscalls.extend(tracefile.syscalls);
    }

    let mut options = tracefile::cap_options(&capabilities);
    options.push(tracefile::seccomp_option(output, &syscalls)?);
    writeln!(out, "{}", options.join(" "))?;
    Ok(0)
}

/// Prints the difference of two trace-files. Exits with 1 if they differ.
pub fn diff(old: &Path, new: &Path, out: &mut impl Write) -> Result<u8, Box<dyn Error>> {
    let (old, new) = match (Tracefile::load(old)?, Tracefile::load(new)?) {
        (None, None) => {
            writeln!(out, "No Tracefile found")?;
            return Ok(EXIT_NO_INPUT);
        }
        (old, new) => (old.unwrap_or_default(), new.unwrap_or_default()),
    };

    let diff = TracefileDiff::new(&old, &new);
    if diff.is_empty() {
        return Ok(0);
    }
    writeln!(out, "{diff}")?;
    Ok(1)
}

/// Prints every entry, the name of a numeric query or the id of a name.
pub fn lookup(lookup: &Lookup, query: Option<&str>, out: &mut impl Write) -> Result<u8, Box<dyn Error>> {
    let Some(query) = query else {
        for (id, name) in lookup.iter() {
            writeln!(out, "{id} {name}")?;
        }
        return Ok(0);
    };

    let found = match query.trim().parse::<i64>() {
        Ok(id) => lookup.name(id).map(str::to_owned),
        Err(_) => lookup.id(query).map(|id| id.to_string()),
    };
    match found {
        Ok(found) => {
            writeln!(out, "{found}")?;
            Ok(0)
        }
        Err(err) => {
            log::debug!("{err}");
            Ok(1)
        }
    }
}
