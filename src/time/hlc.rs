// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Hybrid Logical Clock (HLC) implementation.
//!
//! HLC combines physical time with a logical counter so that every reading is
//! strictly greater than the previous one, even under concurrent access.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use super::Clock;

/// Hybrid Logical Clock.
pub struct HlcClock {
    last_timestamp: AtomicU64,
}

impl HlcClock {
    /// Creates a new clock.
    pub fn new() -> Self {
        Self {
            last_timestamp: AtomicU64::new(0),
        }
    }

    fn physical_time_nanos() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    }
}

impl Default for HlcClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for HlcClock {
    fn now_nanos(&self) -> u64 {
        loop {
            let physical = Self::physical_time_nanos();
            let last = self.last_timestamp.load(Ordering::Acquire);
            let new_ts = physical.max(last.saturating_add(1));

            match self.last_timestamp.compare_exchange(
                last,
                new_ts,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return new_ts,
                Err(_) => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hlc_strictly_increasing() {
        let hlc = HlcClock::new();
        let mut last = hlc.now_nanos();
        for _ in 0..1000 {
            let current = hlc.now_nanos();
            assert!(current > last, "HLC must be strictly increasing");
            last = current;
        }
    }

    #[test]
    fn test_hlc_concurrent_unique() {
        use std::collections::HashSet;
        use std::sync::Arc;
        use std::thread;

        let hlc = Arc::new(HlcClock::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let hlc = Arc::clone(&hlc);
                thread::spawn(move || (0..1000).map(|_| hlc.now_nanos()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for ts in handle.join().expect("thread panicked") {
                assert!(seen.insert(ts), "duplicate HLC reading {ts}");
            }
        }
        assert_eq!(seen.len(), 4000);
    }
}
