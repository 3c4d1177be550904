use std::sync::atomic::{AtomicI64, Ordering};

/// Source of "now" in unix seconds for ticket issuance and expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 { chrono::Utc::now().timestamp() }
}

/// Clock that only moves when told to. Used to simulate elapsed session time.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self { Self { now: AtomicI64::new(start) } }

    pub fn set(&self, now: i64) { self.now.store(now, Ordering::SeqCst); }

    pub fn advance(&self, secs: i64) { self.now.fetch_add(secs, Ordering::SeqCst); }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 { self.now.load(Ordering::SeqCst) }
}
