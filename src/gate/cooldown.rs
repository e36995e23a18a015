//! Per-author cooldown timestamps with bounded memory.
//!
//! Thread-safe, in-memory. Entries older than the cooldown period carry no
//! information and are dropped by `sweep()`, lazily on lookup, and before any
//! capacity eviction.
//!
//! Times carry their UTC offset, so elapsed time stays correct when the
//! local clock is set back.

use chrono::{DateTime, FixedOffset, TimeDelta};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Default cap on tracked authors.
pub const DEFAULT_COOLDOWN_CAPACITY: usize = 10_000;

/// Author ID → time of the bot's last non-forced response to them.
///
/// Cleanup strategies:
/// - Lazy removal in `active_since()` once an entry has outlived the period
/// - Periodic `sweep()` driven by the runtime
/// - Oldest-first eviction when `max_entries` is reached
pub struct CooldownStore {
    data: Mutex<HashMap<String, DateTime<FixedOffset>>>,
    period: TimeDelta,
    max_entries: usize,
}

impl CooldownStore {
    pub fn new(period: TimeDelta, max_entries: usize) -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            period,
            max_entries: max_entries.max(1),
        }
    }

    pub fn period(&self) -> TimeDelta {
        self.period
    }

    /// Time of the last recorded response to `author_id` if it is still
    /// cooling down at `now`. An expired entry is dropped on the way out.
    pub fn active_since(
        &self,
        author_id: &str,
        now: DateTime<FixedOffset>,
    ) -> Option<DateTime<FixedOffset>> {
        let mut data = self.data.lock();
        match data.get(author_id).copied() {
            Some(last) if now - last >= self.period => {
                data.remove(author_id);
                None
            }
            other => other,
        }
    }

    /// Record that the bot just decided to respond to `author_id`.
    pub fn record(&self, author_id: &str, now: DateTime<FixedOffset>) {
        let mut data = self.data.lock();

        if data.len() >= self.max_entries && !data.contains_key(author_id) {
            let period = self.period;
            data.retain(|_, last| now - *last < period);
        }

        if data.len() >= self.max_entries && !data.contains_key(author_id) {
            if let Some(oldest) = data
                .iter()
                .min_by_key(|(_, last)| **last)
                .map(|(author, _)| author.clone())
            {
                data.remove(&oldest);
            }
        }

        data.insert(author_id.to_string(), now);
    }

    /// Drop every entry whose cooldown has elapsed. Returns how many were removed.
    pub fn sweep(&self, now: DateTime<FixedOffset>) -> usize {
        let mut data = self.data.lock();
        let before = data.len();
        let period = self.period;
        data.retain(|_, last| now - *last < period);
        before - data.len()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(second: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 1, 10, 0, second)
            .unwrap()
    }

    #[test]
    fn cooldown_records_and_reads_back() {
        let store = CooldownStore::new(TimeDelta::seconds(30), 8);
        assert!(store.active_since("alice", at(5)).is_none());
        store.record("alice", at(5));
        assert_eq!(store.active_since("alice", at(6)), Some(at(5)));
    }

    #[test]
    fn cooldown_rerecord_overwrites() {
        let store = CooldownStore::new(TimeDelta::seconds(30), 8);
        store.record("alice", at(5));
        store.record("alice", at(40));
        assert_eq!(store.active_since("alice", at(41)), Some(at(40)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn active_since_drops_expired_entry() {
        let store = CooldownStore::new(TimeDelta::seconds(30), 8);
        store.record("alice", at(0));
        assert_eq!(store.active_since("alice", at(29)), Some(at(0)));
        assert_eq!(store.active_since("alice", at(30)), None);
        assert!(store.is_empty());
    }

    #[test]
    fn sweep_removes_only_expired() {
        let store = CooldownStore::new(TimeDelta::seconds(30), 8);
        store.record("old", at(0));
        store.record("fresh", at(20));
        assert_eq!(store.sweep(at(35)), 1);
        assert_eq!(store.len(), 1);
        assert!(store.active_since("fresh", at(35)).is_some());
    }

    #[test]
    fn capacity_prefers_dropping_expired_entries() {
        let store = CooldownStore::new(TimeDelta::seconds(30), 2);
        store.record("a", at(0));
        store.record("b", at(40));
        store.record("c", at(45));
        assert_eq!(store.len(), 2);
        assert!(store.active_since("a", at(45)).is_none());
        assert!(store.active_since("b", at(45)).is_some());
        assert!(store.active_since("c", at(45)).is_some());
    }

    #[test]
    fn capacity_evicts_oldest_when_all_active() {
        let store = CooldownStore::new(TimeDelta::seconds(30), 2);
        store.record("a", at(1));
        store.record("b", at(2));
        store.record("c", at(3));
        assert_eq!(store.len(), 2);
        assert!(store.active_since("a", at(3)).is_none());
        assert!(store.active_since("b", at(3)).is_some());
        assert!(store.active_since("c", at(3)).is_some());
    }

    #[test]
    fn capacity_clamped_to_one() {
        let store = CooldownStore::new(TimeDelta::seconds(30), 0);
        store.record("only", at(1));
        assert_eq!(store.len(), 1);
        store.record("next", at(2));
        assert_eq!(store.len(), 1);
        assert!(store.active_since("next", at(2)).is_some());
    }

    #[test]
    fn clock_set_back_does_not_extend_cooldown() {
        let store = CooldownStore::new(TimeDelta::seconds(30), 8);
        let daylight = FixedOffset::west_opt(4 * 3600).unwrap();
        let standard = FixedOffset::west_opt(5 * 3600).unwrap();
        store.record(
            "alice",
            daylight.with_ymd_and_hms(2024, 11, 3, 1, 59, 50).unwrap(),
        );

        // Wall clock reads earlier, but 45 real seconds have passed.
        let later = standard.with_ymd_and_hms(2024, 11, 3, 1, 0, 35).unwrap();
        assert_eq!(store.sweep(later), 1);
        assert!(store.is_empty());
    }
}
