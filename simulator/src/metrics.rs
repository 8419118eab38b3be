use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time counter values, served from `/metrics`.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub matches_created: u64,
    pub matches_completed: u64,
}

#[derive(Default)]
pub struct Metrics {
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    matches_created: AtomicU64,
    matches_completed: AtomicU64,
}

impl Metrics {
    pub(crate) fn inc_connections_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_connections_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_messages_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_messages_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_matches_created(&self) {
        self.matches_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_matches_completed(&self) {
        self.matches_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            matches_created: self.matches_created.load(Ordering::Relaxed),
            matches_completed: self.matches_completed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::default();
        metrics.inc_connections_opened();
        metrics.inc_connections_opened();
        metrics.inc_messages_sent();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_opened, 2);
        assert_eq!(snapshot.messages_sent, 1);
        assert_eq!(snapshot.matches_completed, 0);
    }
}
