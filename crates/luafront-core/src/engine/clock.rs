use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::config::timing::DEFAULT_FRAME_HERTZ;

/// Frame rate published by the scripts of one session.
///
/// Clones share the same value: scripts write it through `SetHertz`, the
/// scheduler reads it after every tick.
#[derive(Debug, Clone)]
pub struct FrameClock {
    hertz: Arc<AtomicU32>,
}

impl FrameClock {
    pub fn new(hertz: u32) -> Self {
        Self {
            hertz: Arc::new(AtomicU32::new(hertz.max(1))),
        }
    }

    pub fn hertz(&self) -> u32 {
        self.hertz.load(Ordering::Relaxed)
    }

    /// Publish a new rate. Zero is clamped to 1 Hz.
    pub fn set_hertz(&self, hertz: u32) {
        self.hertz.store(hertz.max(1), Ordering::Relaxed);
    }

    /// Whole-millisecond tick interval, never below 1 ms (60 Hz → 16 ms).
    pub fn interval(&self) -> Duration {
        Duration::from_millis((1000 / u64::from(self.hertz())).max(1))
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_HERTZ)
    }
}
