// Threshold counting - "N actions per 60s" rules.
//
// Fixed-window counters keyed by (guild, module, actor). Windows are
// ephemeral in-memory state; losing them on restart is acceptable.

use super::antinuke_models::ModuleKind;
use dashmap::DashMap;
use std::time::{Duration, Instant};

pub const THRESHOLD_WINDOW: Duration = Duration::from_secs(60);

#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
struct WindowKey {
    guild_id: u64,
    module: ModuleKind,
    actor_id: u64,
}

#[derive(Clone, Copy, Debug)]
struct Window {
    started: Instant,
    count: u32,
}

pub struct ThresholdCounter {
    windows: DashMap<WindowKey, Window>,
    window: Duration,
}

impl ThresholdCounter {
    pub fn new() -> Self {
        Self::with_window(THRESHOLD_WINDOW)
    }

    /// Custom window length, for tests.
    pub fn with_window(window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            window,
        }
    }

    /// Record one qualifying event and report whether the configured
    /// threshold has been met within the current window.
    ///
    /// A threshold of `None` or 0 means "no counting gate": always true,
    /// nothing recorded.
    pub fn record_and_check(
        &self,
        guild_id: u64,
        module: ModuleKind,
        actor_id: u64,
        threshold: Option<u32>,
    ) -> bool {
        let threshold = match threshold {
            None | Some(0) => return true,
            Some(t) => t,
        };

        let key = WindowKey {
            guild_id,
            module,
            actor_id,
        };
        let now = Instant::now();

        let mut entry = self.windows.entry(key).or_insert(Window {
            started: now,
            count: 0,
        });
        // Expired window: start a fresh one instead of scanning for cleanup.
        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }
        entry.count = entry.count.saturating_add(1);

        entry.count >= threshold
    }
}

impl Default for ThresholdCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_threshold_always_passes() {
        let counter = ThresholdCounter::new();
        assert!(counter.record_and_check(1, ModuleKind::MassMention, 7, None));
        assert!(counter.record_and_check(1, ModuleKind::ChannelDelete, 7, Some(0)));
    }

    #[test]
    fn nth_event_is_first_to_pass_and_later_ones_keep_passing() {
        let counter = ThresholdCounter::new();
        let t = Some(3);
        assert!(!counter.record_and_check(1, ModuleKind::Kick, 7, t));
        assert!(!counter.record_and_check(1, ModuleKind::Kick, 7, t));
        assert!(counter.record_and_check(1, ModuleKind::Kick, 7, t));
        // "at least", not "exactly"
        assert!(counter.record_and_check(1, ModuleKind::Kick, 7, t));
        assert!(counter.record_and_check(1, ModuleKind::Kick, 7, t));
    }

    #[test]
    fn counters_are_independent_per_actor_and_module() {
        let counter = ThresholdCounter::new();
        let t = Some(2);
        assert!(!counter.record_and_check(1, ModuleKind::Kick, 7, t));
        // Different actor, same module: separate window
        assert!(!counter.record_and_check(1, ModuleKind::Kick, 8, t));
        // Different module, same actor: separate window
        assert!(!counter.record_and_check(1, ModuleKind::Ban, 7, t));
        assert!(counter.record_and_check(1, ModuleKind::Kick, 7, t));
    }

    #[test]
    fn window_expiry_resets_the_count() {
        let counter = ThresholdCounter::with_window(Duration::from_millis(10));
        let t = Some(2);
        assert!(!counter.record_and_check(1, ModuleKind::Kick, 7, t));
        std::thread::sleep(Duration::from_millis(15));
        // Old increment expired with its window
        assert!(!counter.record_and_check(1, ModuleKind::Kick, 7, t));
        assert!(counter.record_and_check(1, ModuleKind::Kick, 7, t));
    }
}
