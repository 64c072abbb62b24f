use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

/// Process-wide client counters.
pub struct ClientMetrics {
    produce_requests_total: AtomicU64,
    produce_messages_total: AtomicU64,
    produce_bytes_total: AtomicU64,
    fetch_requests_total: AtomicU64,
    fetch_messages_total: AtomicU64,
    fetch_bytes_total: AtomicU64,
    fetch_unparsed_bytes_total: AtomicU64,
    reconnects_total: AtomicU64,
    read_timeouts_total: AtomicU64,
}

/// Point-in-time copy of [`ClientMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub produce_requests_total: u64,
    pub produce_messages_total: u64,
    pub produce_bytes_total: u64,
    pub fetch_requests_total: u64,
    pub fetch_messages_total: u64,
    pub fetch_bytes_total: u64,
    pub fetch_unparsed_bytes_total: u64,
    pub reconnects_total: u64,
    pub read_timeouts_total: u64,
}

impl ClientMetrics {
    fn new() -> Self {
        Self {
            produce_requests_total: AtomicU64::new(0),
            produce_messages_total: AtomicU64::new(0),
            produce_bytes_total: AtomicU64::new(0),
            fetch_requests_total: AtomicU64::new(0),
            fetch_messages_total: AtomicU64::new(0),
            fetch_bytes_total: AtomicU64::new(0),
            fetch_unparsed_bytes_total: AtomicU64::new(0),
            reconnects_total: AtomicU64::new(0),
            read_timeouts_total: AtomicU64::new(0),
        }
    }

    pub fn record_produce(&self, messages: usize, bytes: usize) {
        self.produce_requests_total.fetch_add(1, Ordering::Relaxed);
        self.produce_messages_total
            .fetch_add(messages as u64, Ordering::Relaxed);
        self.produce_bytes_total
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_fetch(&self, messages: usize, bytes: usize, unparsed: usize) {
        self.fetch_requests_total.fetch_add(1, Ordering::Relaxed);
        self.fetch_messages_total
            .fetch_add(messages as u64, Ordering::Relaxed);
        self.fetch_bytes_total
            .fetch_add(bytes as u64, Ordering::Relaxed);
        self.fetch_unparsed_bytes_total
            .fetch_add(unparsed as u64, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_timeout(&self) {
        self.read_timeouts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            produce_requests_total: self.produce_requests_total.load(Ordering::Relaxed),
            produce_messages_total: self.produce_messages_total.load(Ordering::Relaxed),
            produce_bytes_total: self.produce_bytes_total.load(Ordering::Relaxed),
            fetch_requests_total: self.fetch_requests_total.load(Ordering::Relaxed),
            fetch_messages_total: self.fetch_messages_total.load(Ordering::Relaxed),
            fetch_bytes_total: self.fetch_bytes_total.load(Ordering::Relaxed),
            fetch_unparsed_bytes_total: self.fetch_unparsed_bytes_total.load(Ordering::Relaxed),
            reconnects_total: self.reconnects_total.load(Ordering::Relaxed),
            read_timeouts_total: self.read_timeouts_total.load(Ordering::Relaxed),
        }
    }

    pub fn render_prometheus(&self) -> String {
        let snap = self.snapshot();
        let rows = [
            ("thorstream_client_produce_requests_total", snap.produce_requests_total),
            ("thorstream_client_produce_messages_total", snap.produce_messages_total),
            ("thorstream_client_produce_bytes_total", snap.produce_bytes_total),
            ("thorstream_client_fetch_requests_total", snap.fetch_requests_total),
            ("thorstream_client_fetch_messages_total", snap.fetch_messages_total),
            ("thorstream_client_fetch_bytes_total", snap.fetch_bytes_total),
            (
                "thorstream_client_fetch_unparsed_bytes_total",
                snap.fetch_unparsed_bytes_total,
            ),
            ("thorstream_client_reconnects_total", snap.reconnects_total),
            ("thorstream_client_read_timeouts_total", snap.read_timeouts_total),
        ];
        let mut out = String::new();
        for (name, value) in rows {
            out.push_str(&format!("# TYPE {} counter\n", name));
            out.push_str(&format!("{} {}\n", name, value));
        }
        out
    }
}

static METRICS: OnceLock<ClientMetrics> = OnceLock::new();

pub fn metrics() -> &'static ClientMetrics {
    METRICS.get_or_init(ClientMetrics::new)
}
