use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Local wall-clock time as epoch milliseconds.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn local_now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as i64
}

/// Drift implied by one round-trip sample: server time minus the estimated
/// local time at the midpoint of the round trip.
#[must_use]
pub const fn drift_from_sample(server_time_ms: i64, sent_at_ms: i64, received_at_ms: i64) -> i64 {
    server_time_ms - (sent_at_ms + (received_at_ms - sent_at_ms) / 2)
}

/// Estimated offset between the local clock and the server clock.
///
/// The offset starts at zero and is overwritten by each calibration; the
/// last calibration wins. Readers and the calibration writer are not
/// synchronized beyond the atomic store - a request issued concurrently with
/// a calibration may observe either value, which the server's tolerance
/// window absorbs.
#[derive(Debug, Default)]
pub struct ServerClock {
    offset_ms: AtomicI64,
}

impl ServerClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current offset in milliseconds (zero until first calibration).
    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::Relaxed)
    }

    pub fn set_offset_ms(&self, offset_ms: i64) {
        self.offset_ms.store(offset_ms, Ordering::Relaxed);
    }

    /// Forget any calibration and fall back to the raw local clock.
    pub fn reset(&self) {
        self.set_offset_ms(0);
    }

    /// Record one calibration round trip.
    pub fn record_sample(&self, server_time_ms: i64, sent_at_ms: i64, received_at_ms: i64) {
        self.set_offset_ms(drift_from_sample(server_time_ms, sent_at_ms, received_at_ms));
    }

    /// Drift-adjusted timestamp for an outgoing request, in epoch
    /// milliseconds.
    #[allow(clippy::cast_sign_loss)]
    pub fn timestamp_ms(&self) -> u64 {
        (local_now_ms() + self.offset_ms()).max(0) as u64
    }
}
