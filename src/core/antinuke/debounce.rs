// Debounce gate - at most one punishment cycle per (guild, module) within
// the claim window.
//
// A nuke burst (ten channels deleted in one second) produces ten near
// identical incidents; exactly one of them may punish and log. Losers are
// dropped, not queued.

use super::antinuke_models::ModuleKind;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

pub const DEBOUNCE_TTL: Duration = Duration::from_secs(5);

pub struct DebounceGate {
    claims: DashMap<(u64, ModuleKind), Instant>,
    ttl: Duration,
}

impl DebounceGate {
    pub fn new() -> Self {
        Self::with_ttl(DEBOUNCE_TTL)
    }

    /// Custom claim window, for tests.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            claims: DashMap::new(),
            ttl,
        }
    }

    /// True iff this call is the first to claim (guild, module) within the
    /// TTL. The entry API makes the check-and-claim atomic under concurrent
    /// event delivery.
    pub fn try_claim(&self, guild_id: u64, module: ModuleKind) -> bool {
        let now = Instant::now();
        match self.claims.entry((guild_id, module)) {
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
            Entry::Occupied(mut slot) => {
                if now.duration_since(*slot.get()) >= self.ttl {
                    slot.insert(now);
                    true
                } else {
                    false
                }
            }
        }
    }
}

impl Default for DebounceGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_claim_wins_duplicates_lose() {
        let gate = DebounceGate::new();
        assert!(gate.try_claim(1, ModuleKind::ChannelDelete));
        assert!(!gate.try_claim(1, ModuleKind::ChannelDelete));
        assert!(!gate.try_claim(1, ModuleKind::ChannelDelete));
    }

    #[test]
    fn modules_claim_independently() {
        let gate = DebounceGate::new();
        assert!(gate.try_claim(1, ModuleKind::ChannelDelete));
        assert!(gate.try_claim(1, ModuleKind::RoleDelete));
        assert!(gate.try_claim(2, ModuleKind::ChannelDelete));
    }

    #[test]
    fn claim_expires_after_ttl() {
        let gate = DebounceGate::with_ttl(Duration::from_millis(10));
        assert!(gate.try_claim(1, ModuleKind::Ban));
        assert!(!gate.try_claim(1, ModuleKind::Ban));
        std::thread::sleep(Duration::from_millis(15));
        assert!(gate.try_claim(1, ModuleKind::Ban));
    }

    #[test]
    fn concurrent_claims_admit_exactly_one() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let gate = Arc::new(DebounceGate::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let winners = Arc::clone(&winners);
                std::thread::spawn(move || {
                    if gate.try_claim(1, ModuleKind::ChannelDelete) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
