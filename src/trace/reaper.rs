use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::time::Instant;

use crate::container::ContainerID;

pub const DEFAULT_STALE_GRACE: Duration = Duration::from_secs(15);

/// Picks containers that linger in kernel state without being traced.
///
/// A container's timer starts when it is first seen untraced and is cleared
/// whenever it is traced, so leaving the traced state starts a fresh grace
/// period.
#[derive(Debug)]
pub struct StaleReaper {
    grace: Duration,
    first_seen: HashMap<ContainerID, Instant>,
}

impl Default for StaleReaper {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_GRACE)
    }
}

impl StaleReaper {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            first_seen: HashMap::new(),
        }
    }

    /// Returns the containers untraced for at least the grace period and forgets them.
    ///
    /// `kernel_ids` are the containers currently known to the probe. Records
    /// of containers that left kernel state are dropped.
    pub fn reap<F>(
        &mut self,
        now: Instant,
        kernel_ids: &HashSet<ContainerID>,
        is_traced: F,
    ) -> Vec<ContainerID>
    where
        F: Fn(&ContainerID) -> bool,
    {
        self.first_seen
            .retain(|id, _| kernel_ids.contains(id) && !is_traced(id));
        for id in kernel_ids {
            if !is_traced(id) {
                self.first_seen.entry(id.clone()).or_insert(now);
            }
        }

        let mut stale: Vec<ContainerID> = self
            .first_seen
            .iter()
            .filter(|(_, first_seen)| now.duration_since(**first_seen) >= self.grace)
            .map(|(id, _)| id.clone())
            .collect();
        stale.sort();
        for id in &stale {
            self.first_seen.remove(id);
        }
        stale
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self, container_id: &ContainerID) -> bool {
        self.first_seen.contains_key(container_id)
    }
}
