use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Last user interaction, in epoch milliseconds.
///
/// Interaction sources (keystrokes, commands, UI events) call [`touch`];
/// the dispatcher reads [`idle_for`] when a refresh fails.
///
/// [`touch`]: ActivityMonitor::touch
/// [`idle_for`]: ActivityMonitor::idle_for
#[derive(Debug)]
pub struct ActivityMonitor {
    last: AtomicI64,
}

impl Default for ActivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityMonitor {
    /// Construction counts as an interaction.
    pub fn new() -> Self {
        Self {
            last: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    pub fn touch(&self) {
        self.touch_at(Utc::now().timestamp_millis());
    }

    /// Record an interaction at `epoch_millis`. Older timestamps never move
    /// the marker backwards.
    pub fn touch_at(&self, epoch_millis: i64) {
        self.last.fetch_max(epoch_millis, Ordering::Relaxed);
    }

    /// Overwrite the marker, including backwards.
    pub fn set_last_activity(&self, epoch_millis: i64) {
        self.last.store(epoch_millis, Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> i64 {
        self.last.load(Ordering::Relaxed)
    }

    pub fn idle_for(&self, now_millis: i64) -> Duration {
        let idle = now_millis.saturating_sub(self.last_activity()).max(0);
        Duration::from_millis(idle as u64)
    }

    pub fn idle(&self) -> Duration {
        self.idle_for(Utc::now().timestamp_millis())
    }
}
