use std::sync::atomic::{AtomicU64, Ordering};

/// Where a read should be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Primary,
    /// Zero-based position in the replica list.
    Replica(usize),
}

/// Round-robin choice of replica, driven by one shared counter.
///
/// The atomic increment is the only synchronisation: two concurrent selections
/// always observe different counter values. The counter wraps on overflow.
#[derive(Debug)]
pub struct ReplicaSelector {
    counter: AtomicU64,
    replicas: usize,
}

impl ReplicaSelector {
    #[must_use]
    pub fn new(replicas: usize) -> Self {
        Self {
            counter: AtomicU64::new(0),
            replicas,
        }
    }

    #[must_use]
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Pick the backend for the next read. With no replicas every read goes to
    /// the primary and the counter is left alone.
    pub fn next(&self) -> Route {
        if self.replicas == 0 {
            return Route::Primary;
        }
        let ticket = self.counter.fetch_add(1, Ordering::Relaxed);
        Route::Replica(pick(ticket, self.replicas))
    }

    /// Number of replica routing decisions taken so far (modulo 2^64).
    #[must_use]
    pub fn routed(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    fn starting_at(replicas: usize, counter: u64) -> Self {
        Self {
            counter: AtomicU64::new(counter),
            replicas,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn pick(ticket: u64, replicas: usize) -> usize {
    // the remainder is < replicas, so it always fits back into usize
    (ticket % replicas as u64) as usize
}
