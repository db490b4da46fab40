//! Pluggable wall-clock provider
//!
//! All timing flows through one clock seam so tests can drive schedules and
//! the drift guard without sleeping. The scheduler tolerates provider jumps
//! (suspend/resume, manual clock changes) via its re-sync path.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, FixedOffset, Local, Offset, TimeZone, Utc};

pub type SharedClock = Arc<dyn Clock>;

pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current wall-clock time in unix milliseconds.
    fn now_ms(&self) -> i64 {
        self.now_utc().timestamp_millis()
    }

    /// UTC offset used for "local midnight" anchor computation.
    fn local_offset(&self) -> FixedOffset;
}

/// System clock in the host's local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_offset(&self) -> FixedOffset {
        Local::now().offset().fix()
    }
}

/// Manually driven clock for tests. Always reports a UTC local offset so
/// anchor math in tests is timezone-independent.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    pub fn set_ms(&self, ms: i64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, delta: i64) {
        self.now_ms.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.now_ms.load(Ordering::SeqCst))
            .single()
            .unwrap_or_default()
    }

    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(0).expect("zero offset is always valid")
    }
}
