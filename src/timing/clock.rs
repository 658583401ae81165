use std::time::Instant;

/// Monotonic performance clock in floating-point milliseconds.
///
/// The scheduler itself never reads a clock: every entry point takes the
/// current time as a parameter, so tests drive it with plain numbers. The
/// engine thread uses this as the one real time source.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}
