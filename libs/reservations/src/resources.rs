//! Named integer resource amounts.

use std::collections::btree_map::{self, BTreeMap};

use serde::{Deserialize, Serialize};

/// Virtual CPU count.
pub const VCPUS: &str = "vcpus";

/// Memory in MiB.
pub const MEMORY_MB: &str = "memory_mb";

/// Local disk in GiB.
pub const LOCAL_GB: &str = "local_gb";

/// Mapping of resource name to a signed amount.
///
/// Keys are open strings so new resource kinds need no code change. A
/// resource that is not present reads as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceMap(BTreeMap<String, i64>);

impl ResourceMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Amount of `resource`, zero when absent.
    pub fn get(&self, resource: &str) -> i64 {
        self.0.get(resource).copied().unwrap_or(0)
    }

    /// Whether `resource` has an entry (even a zero one).
    pub fn contains(&self, resource: &str) -> bool {
        self.0.contains_key(resource)
    }

    /// Set the amount of `resource`, returning the previous entry.
    pub fn insert(&mut self, resource: impl Into<String>, amount: i64) -> Option<i64> {
        self.0.insert(resource.into(), amount)
    }

    /// Add every amount of `other` into this map.
    pub fn add(&mut self, other: &ResourceMap) {
        for (resource, amount) in other.iter() {
            *self.0.entry(resource.to_string()).or_insert(0) += amount;
        }
    }

    /// Every key of `self`, reduced by the matching amount in `other`.
    ///
    /// Keys present only in `other` are ignored. Results may go negative.
    pub fn minus(&self, other: &ResourceMap) -> ResourceMap {
        self.0
            .iter()
            .map(|(resource, amount)| (resource.clone(), amount - other.get(resource)))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, i64)> for ResourceMap {
    fn from_iter<I: IntoIterator<Item = (K, i64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl<K: Into<String>> Extend<(K, i64)> for ResourceMap {
    fn extend<I: IntoIterator<Item = (K, i64)>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().map(|(k, v)| (k.into(), v)));
    }
}

impl IntoIterator for ResourceMap {
    type Item = (String, i64);
    type IntoIter = btree_map::IntoIter<String, i64>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<BTreeMap<String, i64>> for ResourceMap {
    fn from(map: BTreeMap<String, i64>) -> Self {
        Self(map)
    }
}
