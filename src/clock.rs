use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;

    fn now_secs(&self) -> u64 {
        self.now_millis() / 1_000
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually driven clock for deterministic ordering.
#[derive(Default)]
pub struct FixedClock {
    millis: AtomicU64,
}

impl FixedClock {
    pub fn at_secs(secs: u64) -> Self {
        Self {
            millis: AtomicU64::new(secs.saturating_mul(1_000)),
        }
    }

    pub fn advance_secs(&self, secs: u64) {
        self.millis.fetch_add(secs.saturating_mul(1_000), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}
