use std::collections::BTreeSet;

/// Receives the names a traced container used since the previous write.
pub trait OutputSink {
    type Error: std::error::Error;

    fn write(
        &mut self,
        capabilities: &BTreeSet<String>,
        syscalls: &BTreeSet<String>,
    ) -> Result<(), Self::Error>;
}

/// Opens the sink named by a container's output label.
pub trait SinkOpener {
    type Sink: OutputSink;

    fn open(&mut self, target: &str) -> Self::Sink;
}
