use std::time::Duration;

/// Timed acquisitions and waits with less than this much time left spin instead of parking.
///
/// Parking for a handful of microseconds costs more than it saves and overshoots the deadline on most platforms.
pub const SPIN_FOR_TIMEOUT_THRESHOLD: Duration = Duration::from_nanos(1000);
