use core::time::Duration;

/// Radio abstraction for broadcast advertising. The implementation owns
/// timing, channels and its own retry policy; the lifecycle machine only
/// starts and stops.
pub trait RadioBackend {
    type Error;

    /// Start advertising `payload` (a complete AD set, at most 31 bytes).
    /// `interval_hint` is advisory; trigger-based beacons advertise fast and
    /// briefly.
    fn start(&mut self, payload: &[u8], interval_hint: Duration) -> Result<(), Self::Error>;

    /// Stop advertising. Idempotent.
    fn stop(&mut self) -> Result<(), Self::Error>;
}

/// Entropy source for seeding the replay counter.
pub trait EntropySource {
    type Error;

    /// Fill `buf` with cryptographically random bytes.
    fn fill_bytes(&mut self, buf: &mut [u8]) -> Result<(), Self::Error>;
}
