use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide advisory memory-pressure signal. Consumers only read it;
/// whatever monitors the process (platform hooks, an ops endpoint) flips it.
/// Never locked, never blocking.
#[derive(Clone, Default)]
pub struct MemoryPressure {
    high: Arc<AtomicBool>,
}

impl MemoryPressure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_high(&self) -> bool {
        self.high.load(Ordering::Relaxed)
    }

    pub fn set_high(&self, high: bool) {
        self.high.store(high, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_signal() {
        let pressure = MemoryPressure::new();
        let reader = pressure.clone();
        assert!(!reader.is_high());

        pressure.set_high(true);
        assert!(reader.is_high());

        pressure.set_high(false);
        assert!(!reader.is_high());
    }
}
