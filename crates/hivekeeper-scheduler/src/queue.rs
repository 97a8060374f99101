//! Delta event queue.
//!
//! Maps a countdown to the hives due when it reaches zero. Hives sharing a
//! countdown share a bucket and keep their insertion order inside it.
//! Advancing the queue subtracts the elapsed time from every countdown and
//! hands back the hives whose countdown ran out.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use hivekeeper_state::HiveId;

use crate::error::{SchedulerError, SchedulerResult};

#[derive(Debug, Default)]
pub struct DeltaQueue {
    buckets: BTreeMap<Duration, Vec<HiveId>>,
    /// hive → key of the bucket holding it.
    index: HashMap<HiveId, Duration>,
}

impl DeltaQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `hive` to expire after `interval`. The hive must not be
    /// queued already.
    pub fn add(&mut self, hive: HiveId, interval: Duration) -> SchedulerResult<()> {
        if self.index.contains_key(&hive) {
            return Err(SchedulerError::AlreadyScheduled(hive));
        }
        self.insert(hive, interval);
        Ok(())
    }

    /// Drop `hive` from whichever bucket holds it. Returns false if absent.
    pub fn remove(&mut self, hive: HiveId) -> bool {
        let Some(key) = self.index.remove(&hive) else {
            return false;
        };
        if let Some(bucket) = self.buckets.get_mut(&key) {
            bucket.retain(|&h| h != hive);
            if bucket.is_empty() {
                self.buckets.remove(&key);
            }
        }
        true
    }

    /// Reschedule `hive` to expire after `interval`, queued or not.
    pub fn update(&mut self, hive: HiveId, interval: Duration) {
        self.remove(hive);
        self.insert(hive, interval);
    }

    /// Subtract `elapsed` from every countdown and return the hives whose
    /// countdown reached zero, earliest bucket first.
    pub fn advance(&mut self, elapsed: Duration) -> Vec<HiveId> {
        let mut expired = Vec::new();
        let mut remaining = BTreeMap::new();
        for (key, hives) in std::mem::take(&mut self.buckets) {
            if key <= elapsed {
                expired.extend(hives);
            } else {
                remaining.insert(key - elapsed, hives);
            }
        }

        self.buckets = remaining;
        self.index = self
            .buckets
            .iter()
            .flat_map(|(&key, hives)| hives.iter().map(move |&hive| (hive, key)))
            .collect();
        expired
    }

    /// Smallest countdown.
    pub fn peek_min(&self) -> SchedulerResult<Duration> {
        self.buckets
            .keys()
            .next()
            .copied()
            .ok_or(SchedulerError::EmptyQueue)
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of queued hives.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn contains(&self, hive: HiveId) -> bool {
        self.index.contains_key(&hive)
    }

    /// Countdown of `hive`, if queued.
    pub fn remaining(&self, hive: HiveId) -> Option<Duration> {
        self.index.get(&hive).copied()
    }

    /// Snapshot of `(hive, countdown)` pairs in expiry order.
    pub fn hives(&self) -> Vec<(HiveId, Duration)> {
        self.buckets
            .iter()
            .flat_map(|(&key, hives)| hives.iter().map(move |&hive| (hive, key)))
            .collect()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.index.clear();
    }

    fn insert(&mut self, hive: HiveId, interval: Duration) {
        self.buckets.entry(interval).or_default().push(hive);
        self.index.insert(hive, interval);
    }
}
