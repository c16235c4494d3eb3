//! ctrace: records the capabilities and syscalls used by docker containers.
//!
//! A kernel probe counts capability checks and syscalls per container. The
//! trace loop follows the docker event feed and writes what every labelled
//! container used to its trace-file, from which restrictive `docker run`
//! options are derived.

use std::sync::Arc;

use cgroup::PidResolver;
use config::TraceConfig;
use discovery::{BoundedWaitStream, DockerEventStream};
use probe::Session;
use tokio::signal::unix::{Signal, SignalKind, signal};
use trace::{StaleReaper, TraceController};
use tracefile::TracefileOpener;

pub mod cgroup;
pub mod cli;
pub mod config;
pub mod container;
pub mod discovery;
pub mod error;
pub mod fsutil;
pub mod lookup;
pub mod monitor;
pub mod probe;
pub mod trace;
pub mod tracefile;

/// Traces containers until the event feed fails or the process is interrupted.
///
/// # Errors
///
/// Fails if the name tables cannot be loaded, the docker socket is missing,
/// the probe cannot be attached, or the trace loop fails. The probe is
/// detached on every path.
pub async fn run_trace(config: TraceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let registry = Arc::new(config.name_registry()?);
    let docker = DockerEventStream::new(&config.docker_socket)?;
    let resolver = PidResolver::new(&config.cgroup_dir);

    let session = Session::open(&config.probe_object, config.probe, registry, &resolver)
        .inspect_err(|err| {
            if err.is_resource_unavailable() {
                log::error!("Kernel probe unavailable, ctrace needs root and a kernel with BTF");
            }
        })?;
    let mut controller = TraceController::new(
        session,
        TracefileOpener,
        &config.output_label,
        StaleReaper::new(config.stale_grace),
    )?;

    let mut signals = ShutdownSignals::new()?;
    let mut events = BoundedWaitStream::spawn(docker.events(None, None), config.poll_timeout);
    let result = tokio::select! {
        result = controller.run(&mut events) => result,
        signal = signals.recv() => {
            log::info!("{signal} received, shutting down");
            Ok(())
        }
    };
    controller.close();
    Ok(result?)
}

/// SIGINT and SIGTERM, either of which ends a trace.
struct ShutdownSignals {
    interrupt: Signal,
    terminate: Signal,
}

impl ShutdownSignals {
    fn new() -> std::io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Waits for the next shutdown signal and returns its name.
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

#[cfg(test)]
mod tests {
    use std::process::Command;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_sigterm_ends_trace() {
        let mut signals = ShutdownSignals::new().unwrap();

        let status = Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let received = tokio::time::timeout(Duration::from_secs(5), signals.recv())
            .await
            .unwrap();
        assert_eq!(received, "SIGTERM");
    }
}
