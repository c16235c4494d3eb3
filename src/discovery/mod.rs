//! Container lifecycle events.
//!
//! [`DockerEventStream`] turns the Docker Engine event feed into
//! [`ContainerEvent`]s and [`BoundedWaitStream`] makes sure the consumer wakes
//! up periodically even when the feed is quiet.
mod bounded;
mod docker;
mod error;

use std::collections::BTreeMap;

use crate::container::ContainerID;

pub use bounded::{BoundedWaitStream, DEFAULT_POLL_TIMEOUT, Tick};
pub use docker::{DEFAULT_DOCKER_SOCKET, DockerEventStream};
pub use error::{Error, Result};

pub type Labels = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Started,
    Stopped,
}

/// A normalized container lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEvent {
    pub status: ContainerStatus,
    pub container_id: ContainerID,
    /// Namespaced labels of the container, see [`namespaced_labels`].
    pub labels: Labels,
}

/// Keeps only labels whose key contains a namespace separator.
///
/// The runtime attaches unnamespaced attributes such as `name` or `image` to
/// its events; user labels are expected to look like `com.example.key`.
pub fn namespaced_labels<I>(labels: I) -> Labels
where
    I: IntoIterator<Item = (String, String)>,
{
    labels
        .into_iter()
        .filter(|(key, _)| key.contains('.'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaced_labels() {
        let labels = namespaced_labels([
            ("name".to_owned(), "web".to_owned()),
            ("image".to_owned(), "nginx".to_owned()),
            ("ctrace.output-file".to_owned(), "/tmp/web".to_owned()),
            ("com.example.team".to_owned(), "infra".to_owned()),
        ]);
        assert_eq!(labels.len(), 2);
        assert!(labels.keys().all(|key| key.contains('.')));
        assert_eq!(labels["ctrace.output-file"], "/tmp/web");
    }
}
