use std::collections::{BTreeSet, HashMap};

use tokio::time::Instant;

use crate::container::ContainerID;
use crate::discovery::{self, BoundedWaitStream, ContainerEvent, ContainerStatus, Tick};
use crate::error::ResultOkLogExt;
use crate::monitor::{self, ContainerMonitor};
use crate::probe::{ProbeMaps, Session};

use super::{OutputSink, Result, SinkOpener, StaleReaper};

/// Container label naming the output of a traced container.
pub const DEFAULT_OUTPUT_LABEL: &str = "ctrace.output-file";

/// Runs one tick per lifecycle event or timeout.
///
/// Containers started with the output label are traced: each tick writes the
/// capabilities and syscalls they used since the previous tick to their sink.
/// A stopped container gets one last write. Containers that stay in the
/// probe's tables without being traced are unfollowed after a grace period.
pub struct TraceController<P: ProbeMaps, O: SinkOpener> {
    session: Session<P>,
    monitor: ContainerMonitor,
    opener: O,
    label: String,
    traced: HashMap<ContainerID, O::Sink>,
    stopped: HashMap<ContainerID, O::Sink>,
    reaper: StaleReaper,
}

impl<P: ProbeMaps, O: SinkOpener> TraceController<P, O> {
    pub fn new(
        session: Session<P>,
        opener: O,
        label: impl Into<String>,
        reaper: StaleReaper,
    ) -> Result<Self> {
        let monitor = ContainerMonitor::new(&session)?;
        Ok(Self {
            session,
            monitor,
            opener,
            label: label.into(),
            traced: HashMap::new(),
            stopped: HashMap::new(),
            reaper,
        })
    }

    /// Ticks until the event stream ends or fails.
    pub async fn run(
        &mut self,
        events: &mut BoundedWaitStream<ContainerEvent, discovery::Error>,
    ) -> Result<()> {
        while let Some(tick) = events.next().await {
            self.tick(tick?, Instant::now())?;
        }
        log::info!("Container event stream ended");
        Ok(())
    }

    pub fn tick(&mut self, tick: Tick<ContainerEvent>, now: Instant) -> Result<()> {
        self.monitor.update(&self.session)?;
        if let Tick::Event(event) = tick {
            self.apply(event);
        }
        self.flush();
        self.reap(now)
    }

    fn apply(&mut self, event: ContainerEvent) {
        match event.status {
            ContainerStatus::Started => {
                let Some(target) = event.labels.get(&self.label) else {
                    log::debug!(
                        "Ignoring container `{}` without `{}` label",
                        event.container_id.short(),
                        self.label
                    );
                    return;
                };
                let sink = self.opener.open(target);
                self.stopped.remove(&event.container_id);
                println!("New container {}", event.container_id);
                self.traced.insert(event.container_id, sink);
            }
            ContainerStatus::Stopped => {
                if let Some(sink) = self.traced.remove(&event.container_id) {
                    println!("Stopped container {}", event.container_id);
                    self.stopped.insert(event.container_id, sink);
                }
            }
        }
    }

    fn flush(&mut self) {
        let empty = BTreeSet::new();
        let sinks = self.traced.iter_mut().chain(self.stopped.iter_mut());
        for (container_id, sink) in sinks {
            let capabilities = match self.monitor.last_capabilities(container_id) {
                Ok(names) => names,
                Err(monitor::Error::NotFound(_)) => &empty,
                Err(err) => {
                    log::error!("{err}");
                    continue;
                }
            };
            let syscalls = self.monitor.last_syscalls(container_id).unwrap_or(&empty);
            sink.write(capabilities, syscalls).ok_log_with(|| {
                format!("failed to write trace of container `{}`", container_id.short())
            });
        }
        self.stopped.clear();
    }

    fn reap(&mut self, now: Instant) -> Result<()> {
        let kernel_ids = self.session.container_ids()?;
        let traced = &self.traced;
        let stale = self
            .reaper
            .reap(now, &kernel_ids, |id| traced.contains_key(id));
        for container_id in stale {
            log::info!("Unfollowing stale container `{}`", container_id.short());
            self.session.unfollow(&container_id)?;
        }
        Ok(())
    }

    pub fn is_traced(&self, container_id: &ContainerID) -> bool {
        self.traced.contains_key(container_id)
    }

    #[cfg(test)]
    pub(crate) fn traced_count(&self) -> usize {
        self.traced.len()
    }

    /// Stops tracing and detaches the probe.
    pub fn close(self) {
        log::debug!("Closing trace with {} traced containers", self.traced.len());
        self.session.close();
    }

    #[cfg(test)]
    fn session_mut(&mut self) -> &mut Session<P> {
        &mut self.session
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures_util::stream;

    use super::*;
    use crate::cgroup::PidResolver;
    use crate::discovery::Labels;
    use crate::lookup::NameKind;
    use crate::probe::ProbeOptions;
    use crate::probe::memory::{InMemoryProbe, id, registry};
    use crate::trace::Error;

    const GRACE: Duration = Duration::from_secs(15);

    type Writes = Arc<Mutex<Vec<(String, BTreeSet<String>, BTreeSet<String>)>>>;

    #[derive(Default)]
    struct RecordingOpener {
        writes: Writes,
    }

    struct RecordingSink {
        target: String,
        writes: Writes,
    }

    impl SinkOpener for RecordingOpener {
        type Sink = RecordingSink;

        fn open(&mut self, target: &str) -> RecordingSink {
            RecordingSink {
                target: target.to_owned(),
                writes: Arc::clone(&self.writes),
            }
        }
    }

    impl OutputSink for RecordingSink {
        type Error = std::io::Error;

        fn write(
            &mut self,
            capabilities: &BTreeSet<String>,
            syscalls: &BTreeSet<String>,
        ) -> std::io::Result<()> {
            if self.target == "broken" {
                return Err(std::io::Error::other("disk full"));
            }
            self.writes.lock().unwrap().push((
                self.target.clone(),
                capabilities.clone(),
                syscalls.clone(),
            ));
            Ok(())
        }
    }

    fn names(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| (*name).to_owned()).collect()
    }

    fn controller(probe: InMemoryProbe) -> (TraceController<InMemoryProbe, RecordingOpener>, Writes) {
        let cgroups = tempfile::tempdir().unwrap();
        let session = Session::with_probe(
            probe,
            ProbeOptions::default(),
            registry(),
            &PidResolver::new(cgroups.path()),
        )
        .unwrap();
        let opener = RecordingOpener::default();
        let writes = Arc::clone(&opener.writes);
        let controller = TraceController::new(
            session,
            opener,
            DEFAULT_OUTPUT_LABEL,
            StaleReaper::new(GRACE),
        )
        .unwrap();
        (controller, writes)
    }

    fn started(c: char, output: Option<&str>) -> Tick<ContainerEvent> {
        let mut labels = Labels::new();
        labels.insert("com.example.team".to_owned(), "infra".to_owned());
        if let Some(output) = output {
            labels.insert(DEFAULT_OUTPUT_LABEL.to_owned(), output.to_owned());
        }
        Tick::Event(ContainerEvent {
            status: ContainerStatus::Started,
            container_id: id(c),
            labels,
        })
    }

    fn stopped(c: char) -> Tick<ContainerEvent> {
        Tick::Event(ContainerEvent {
            status: ContainerStatus::Stopped,
            container_id: id(c),
            labels: Labels::new(),
        })
    }

    fn take(writes: &Writes) -> Vec<(String, BTreeSet<String>, BTreeSet<String>)> {
        std::mem::take(&mut *writes.lock().unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_container_is_flushed_every_tick() {
        let mut probe = InMemoryProbe::default();
        probe.pids.insert(1, id('a'));
        let (mut controller, writes) = controller(probe);
        let now = Instant::now();

        let probe = controller.session_mut().probe_mut();
        probe.record(NameKind::Syscall, &id('a'), 0, 1);
        probe.record(NameKind::Capability, &id('a'), 13, 1);

        controller.tick(started('a', Some("/out/a")), now).unwrap();
        assert!(controller.is_traced(&id('a')));
        assert_eq!(
            take(&writes),
            [("/out/a".to_owned(), names(&["net_raw"]), names(&["read"]))]
        );

        controller.tick(Tick::Idle, now).unwrap();
        assert_eq!(
            take(&writes),
            [("/out/a".to_owned(), names(&[]), names(&[]))]
        );

        controller
            .session_mut()
            .probe_mut()
            .record(NameKind::Syscall, &id('a'), 1, 1);
        controller.tick(Tick::Idle, now).unwrap();
        assert_eq!(
            take(&writes),
            [("/out/a".to_owned(), names(&[]), names(&["write"]))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_container_without_label_is_not_traced() {
        let (mut controller, writes) = controller(InMemoryProbe::default());
        controller
            .tick(started('a', None), Instant::now())
            .unwrap();
        assert!(!controller.is_traced(&id('a')));
        assert!(take(&writes).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_traced_container_without_kernel_state_gets_empty_write() {
        let (mut controller, writes) = controller(InMemoryProbe::default());
        controller
            .tick(started('a', Some("/out/a")), Instant::now())
            .unwrap();
        assert_eq!(
            take(&writes),
            [("/out/a".to_owned(), names(&[]), names(&[]))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_container_gets_final_flush_then_is_reaped() {
        let mut probe = InMemoryProbe::default();
        probe.pids.insert(1, id('a'));
        probe.record(NameKind::Syscall, &id('a'), 0, 1);
        let (mut controller, writes) = controller(probe);
        let start = Instant::now();

        controller.tick(started('a', Some("/out/a")), start).unwrap();
        take(&writes);

        controller
            .session_mut()
            .probe_mut()
            .record(NameKind::Syscall, &id('a'), 2, 1);
        let stop = start + Duration::from_secs(60);
        controller.tick(stopped('a'), stop).unwrap();
        assert!(!controller.is_traced(&id('a')));
        assert_eq!(
            take(&writes),
            [("/out/a".to_owned(), names(&[]), names(&["open"]))]
        );

        controller
            .tick(Tick::Idle, stop + GRACE - Duration::from_secs(1))
            .unwrap();
        assert!(take(&writes).is_empty());
        assert!(controller.session_mut().container_ids().unwrap().contains(&id('a')));

        controller.tick(Tick::Idle, stop + GRACE).unwrap();
        assert!(controller.session_mut().container_ids().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_untraced_kernel_container_is_reaped_after_grace() {
        let mut probe = InMemoryProbe::default();
        probe.pids.insert(1, id('b'));
        probe.record(NameKind::Syscall, &id('b'), 0, 1);
        let (mut controller, _writes) = controller(probe);
        let start = Instant::now();

        controller.tick(Tick::Idle, start).unwrap();
        controller
            .tick(Tick::Idle, start + GRACE - Duration::from_millis(1))
            .unwrap();
        assert_eq!(
            controller.session_mut().container_ids().unwrap(),
            HashSet::from([id('b')])
        );

        controller.tick(Tick::Idle, start + GRACE).unwrap();
        assert!(controller.session_mut().container_ids().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_traced_container_is_never_reaped() {
        let mut probe = InMemoryProbe::default();
        probe.pids.insert(1, id('a'));
        let (mut controller, _writes) = controller(probe);
        let start = Instant::now();

        controller.tick(Tick::Idle, start).unwrap();
        controller
            .tick(started('a', Some("/out/a")), start + Duration::from_secs(10))
            .unwrap();
        controller
            .tick(Tick::Idle, start + GRACE * 10)
            .unwrap();
        assert!(controller.session_mut().container_ids().unwrap().contains(&id('a')));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_failure_does_not_stop_other_sinks() {
        let (mut controller, writes) = controller(InMemoryProbe::default());
        let now = Instant::now();
        controller.tick(started('a', Some("broken")), now).unwrap();
        controller.tick(started('b', Some("/out/b")), now).unwrap();
        assert_eq!(controller.traced_count(), 2);
        assert!(take(&writes).iter().all(|(target, _, _)| target == "/out/b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_kernel_id_aborts_tick() {
        let mut probe = InMemoryProbe::default();
        probe.record(NameKind::Syscall, &id('a'), 999, 1);
        let cgroups = tempfile::tempdir().unwrap();
        let session = Session::with_probe(
            probe,
            ProbeOptions::default(),
            registry(),
            &PidResolver::new(cgroups.path()),
        )
        .unwrap();
        let result = TraceController::new(
            session,
            RecordingOpener::default(),
            DEFAULT_OUTPUT_LABEL,
            StaleReaper::new(GRACE),
        );
        assert!(matches!(result, Err(Error::Monitor(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_events_end() {
        let (mut controller, writes) = controller(InMemoryProbe::default());
        let events = stream::iter(vec![
            Ok(ContainerEvent {
                status: ContainerStatus::Started,
                container_id: id('a'),
                labels: Labels::from([(DEFAULT_OUTPUT_LABEL.to_owned(), "/out/a".to_owned())]),
            }),
            Ok(ContainerEvent {
                status: ContainerStatus::Stopped,
                container_id: id('a'),
                labels: Labels::new(),
            }),
        ]);
        let mut events = BoundedWaitStream::spawn(events, GRACE);

        controller.run(&mut events).await.unwrap();
        assert_eq!(take(&writes).len(), 2);
        assert_eq!(controller.traced_count(), 0);
        controller.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_propagates_stream_failure() {
        let (mut controller, _writes) = controller(InMemoryProbe::default());
        let events = stream::iter(vec![Err(discovery::Error::SocketNotFound(
            "/var/run/docker.sock".into(),
        ))]);
        let mut events = BoundedWaitStream::spawn(events, GRACE);

        let err = controller.run(&mut events).await.unwrap_err();
        assert!(matches!(err, Error::Events(_)));
    }
}
