use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use clusterscope_types::ResourceKey;

/// Per-pod high-watermark of the last delivered record's timestamp
///
/// Entries live for as long as the tracker does. Removing a pod's worker does
/// not clear its cursor, so a pod that reappears resumes where it left off.
#[derive(Debug, Default)]
pub struct CursorTracker {
    cursors: Mutex<HashMap<ResourceKey, DateTime<Utc>>>,
}

impl CursorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the cursor for `key` if `timestamp` is later than the stored one
    pub fn update(&self, key: &ResourceKey, timestamp: DateTime<Utc>) {
        let mut cursors = self.cursors.lock();
        match cursors.get_mut(key) {
            Some(last) if timestamp <= *last => {}
            Some(last) => *last = timestamp,
            None => {
                cursors.insert(key.clone(), timestamp);
            }
        }
    }

    /// The stored watermark for `key`
    pub fn last(&self, key: &ResourceKey) -> Option<DateTime<Utc>> {
        self.cursors.lock().get(key).copied()
    }

    /// Where a reconnect should start: strictly after the last delivered record
    pub fn resume_point(&self, key: &ResourceKey) -> Option<DateTime<Utc>> {
        self.last(key).map(|last| last + Duration::nanoseconds(1))
    }

    /// Drop the cursor for `key`, e.g. when a pod name is known to be reused
    pub fn forget(&self, key: &ResourceKey) -> Option<DateTime<Utc>> {
        self.cursors.lock().remove(key)
    }

    pub fn len(&self) -> usize {
        self.cursors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 19, 12, 0, secs).unwrap()
    }

    #[test]
    fn test_unknown_key_has_no_resume_point() {
        let tracker = CursorTracker::new();
        assert_eq!(tracker.resume_point(&ResourceKey::new("default", "api-0")), None);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_cursor_never_moves_backwards() {
        let tracker = CursorTracker::new();
        let key = ResourceKey::new("default", "api-0");

        tracker.update(&key, at(5));
        tracker.update(&key, at(3));
        assert_eq!(tracker.last(&key), Some(at(5)));

        tracker.update(&key, at(5));
        tracker.update(&key, at(7));
        assert_eq!(tracker.last(&key), Some(at(7)));
    }

    #[test]
    fn test_resume_point_is_one_nanosecond_later() {
        let tracker = CursorTracker::new();
        let key = ResourceKey::new("default", "api-0");
        tracker.update(&key, at(1));

        let resume = tracker.resume_point(&key).unwrap();
        assert!(resume > at(1));
        assert_eq!(resume - at(1), Duration::nanoseconds(1));
    }

    #[test]
    fn test_keys_are_independent_and_forgettable() {
        let tracker = CursorTracker::new();
        let a = ResourceKey::new("default", "a");
        let b = ResourceKey::new("other", "a");
        tracker.update(&a, at(1));
        tracker.update(&b, at(9));

        assert_eq!(tracker.last(&a), Some(at(1)));
        assert_eq!(tracker.forget(&b), Some(at(9)));
        assert_eq!(tracker.last(&b), None);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_concurrent_updates_keep_maximum() {
        let tracker = Arc::new(CursorTracker::new());
        let key = ResourceKey::new("default", "api-0");

        let handles: Vec<_> = (0..8u32)
            .map(|t| {
                let tracker = Arc::clone(&tracker);
                let key = key.clone();
                std::thread::spawn(move || {
                    for s in 0..50u32 {
                        // Interleave ascending and descending writers
                        let secs = if t % 2 == 0 { s } else { 49 - s };
                        tracker.update(&key, at(secs));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.last(&key), Some(at(49)));
    }
}
