//! # Summary
//!
//! Ordered key-value store binding each key to the `(value, resolution)`
//! pair produced by the Paxos instance that last set it, plus an index on
//! resolution so a lagging replica's catch-up scan stays linear in the
//! size of what it actually needs. Overwrites are monotone in resolution
//! (I2): a write only lands if its resolution is strictly greater than
//! what is already stored.
//!
//! The map itself lives entirely in memory; an optional snapshot file
//! (`durability::Snapshot`, adapted from the teacher's `storage` module)
//! gives crash recovery without pulling in an embedded database the
//! teacher never depended on.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde_derive::{Deserialize, Serialize};

use crate::durability::Snapshot;
use crate::error::Result;

/// Sentinel resolution marking a value installed administratively, prior
/// to any consensus instance resolving. Used once, at `initialize`, to
/// seed the config key.
pub const ADMINISTRATIVE_RESOLUTION: i64 = -1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Record {
    value: String,
    resolution: i64,
}

/// Ordered map from key to `(value, resolution)`, indexed on resolution.
#[derive(Default, Serialize, Deserialize)]
pub struct DurableMap {
    records: BTreeMap<String, Record>,
    #[serde(skip)]
    by_resolution: BTreeSet<(i64, String)>,
    #[serde(skip)]
    snapshot: Option<Snapshot<BTreeMap<String, Record>>>,
}

impl DurableMap {
    /// Creates an in-memory map with no backing snapshot file (the
    /// `:memory:` mode of the original implementation).
    pub fn in_memory() -> Self {
        DurableMap::default()
    }

    /// Creates a map backed by a bincode snapshot file at `path`, loading
    /// any existing state found there.
    pub fn with_snapshot(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let snapshot = Snapshot::new(path)?;
        let records = snapshot.load().unwrap_or_default();
        let by_resolution = records
            .iter()
            .map(|(k, r)| (r.resolution, k.clone()))
            .collect();
        Ok(DurableMap {
            records,
            by_resolution,
            snapshot: Some(snapshot),
        })
    }

    /// Point lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.records.get(key).map(|r| r.value.as_str())
    }

    /// Resolution of the current value for `key`.
    pub fn get_resolution(&self, key: &str) -> Option<i64> {
        self.records.get(key).map(|r| r.resolution)
    }

    /// Inserts `key` if absent, or overwrites it if `resolution` is
    /// strictly greater than the stored resolution. Returns whether the
    /// write landed.
    pub fn put_if_newer(&mut self, key: &str, value: &str, resolution: i64) -> bool {
        let wrote = match self.records.get(key) {
            None => true,
            Some(existing) => resolution > existing.resolution,
        };

        if wrote {
            if let Some(existing) = self.records.get(key) {
                self.by_resolution.remove(&(existing.resolution, key.to_string()));
            }
            self.records.insert(
                key.to_string(),
                Record {
                    value: value.to_string(),
                    resolution,
                },
            );
            self.by_resolution.insert((resolution, key.to_string()));
            self.persist();
        }

        wrote
    }

    /// Maximum stored resolution, or -1 if empty (I3).
    pub fn max_resolution(&self) -> i64 {
        self.by_resolution
            .iter()
            .next_back()
            .map(|(r, _)| *r)
            .unwrap_or(ADMINISTRATIVE_RESOLUTION)
    }

    /// Entries with resolution strictly greater than `after_exclusive`
    /// and strictly less than `upper_exclusive` (defaulting to +inf),
    /// ordered by resolution ascending (P5).
    pub fn scan_by_resolution(
        &self,
        after_exclusive: i64,
        upper_exclusive: Option<i64>,
    ) -> Vec<(String, String, i64)> {
        let upper = upper_exclusive.unwrap_or(i64::MAX);
        self.by_resolution
            .range((after_exclusive + 1, String::new())..)
            .take_while(|(resolution, _)| *resolution < upper)
            .map(|(resolution, key)| {
                let value = self.records[key].value.clone();
                (key.clone(), value, *resolution)
            })
            .collect()
    }

    fn persist(&mut self) {
        if let Some(snapshot) = &mut self.snapshot {
            if let Err(error) = snapshot.save(&self.records) {
                log::error!("failed to persist durable map snapshot: {error}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_if_newer_rejects_equal_or_lesser_resolution() {
        let mut map = DurableMap::in_memory();
        assert!(map.put_if_newer("x", "1", 0));
        assert!(!map.put_if_newer("x", "2", 0));
        assert!(!map.put_if_newer("x", "2", -1));
        assert_eq!(map.get("x"), Some("1"));
        assert!(map.put_if_newer("x", "2", 1));
        assert_eq!(map.get("x"), Some("2"));
    }

    #[test]
    fn max_resolution_is_minus_one_when_empty() {
        let map = DurableMap::in_memory();
        assert_eq!(map.max_resolution(), ADMINISTRATIVE_RESOLUTION);
    }

    #[test]
    fn max_resolution_tracks_highest_write() {
        let mut map = DurableMap::in_memory();
        map.put_if_newer("a", "1", 3);
        map.put_if_newer("b", "1", 7);
        map.put_if_newer("c", "1", 5);
        assert_eq!(map.max_resolution(), 7);
    }

    #[test]
    fn scan_by_resolution_is_ordered_and_bounded() {
        let mut map = DurableMap::in_memory();
        map.put_if_newer("a", "1", 0);
        map.put_if_newer("b", "1", 2);
        map.put_if_newer("c", "1", 4);
        map.put_if_newer("d", "1", 6);

        let scanned = map.scan_by_resolution(0, None);
        let resolutions: Vec<i64> = scanned.iter().map(|(_, _, r)| *r).collect();
        assert_eq!(resolutions, vec![2, 4, 6]);

        let bounded = map.scan_by_resolution(0, Some(4));
        let bounded_resolutions: Vec<i64> = bounded.iter().map(|(_, _, r)| *r).collect();
        assert_eq!(bounded_resolutions, vec![2]);
    }

    #[test]
    fn scan_after_exclusive_excludes_boundary() {
        let mut map = DurableMap::in_memory();
        map.put_if_newer("a", "1", 5);
        assert!(map.scan_by_resolution(5, None).is_empty());
        assert_eq!(map.scan_by_resolution(4, None).len(), 1);
    }
}
