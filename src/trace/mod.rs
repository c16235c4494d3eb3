//! The trace loop: reconciles container lifecycle events with the probe's state.
mod controller;
mod error;
mod reaper;
mod sink;

pub use controller::{DEFAULT_OUTPUT_LABEL, TraceController};
pub use error::{Error, Result};
pub use reaper::{DEFAULT_STALE_GRACE, StaleReaper};
pub use sink::{OutputSink, SinkOpener};
