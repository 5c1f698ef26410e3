//! Keyed reconciliation of a tracked collection against a desired key list.
//!
//! Managers that mirror a declared member list (bridge ports, LAG members,
//! ...) keep their live entries in an ordered map. On every reload the
//! declared list is diffed against that map; the manager then creates the
//! `added` entries and destroys the `removed` ones itself. Keys found on
//! both sides are left alone so unchanged entries never flicker.

use std::collections::{BTreeMap, BTreeSet};

/// Outcome of [`reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation<K> {
    /// Desired keys with no tracked entry, in declaration order.
    pub added: Vec<K>,
    /// Tracked keys that are no longer desired, in key order.
    pub removed: Vec<K>,
}

impl<K> Reconciliation<K> {
    /// Returns true if nothing has to be created or destroyed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl<K> Default for Reconciliation<K> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
        }
    }
}

/// Diffs `current` against the `desired` keys.
///
/// Duplicate desired keys are collapsed to their first occurrence. Entries
/// for which `retain` returns true are never reported as removed, even
/// when their key is not desired.
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
/// use sonic_cfgmgr_common::reconcile;
///
/// let mut current = BTreeMap::new();
/// current.insert("eth0".to_string(), false);
/// current.insert("eth1".to_string(), false);
///
/// let plan = reconcile(&current, ["eth1".to_string(), "eth2".to_string()], |_| false);
/// assert_eq!(plan.added, vec!["eth2".to_string()]);
/// assert_eq!(plan.removed, vec!["eth0".to_string()]);
/// ```
pub fn reconcile<K, V, I, F>(current: &BTreeMap<K, V>, desired: I, retain: F) -> Reconciliation<K>
where
    K: Ord + Clone,
    I: IntoIterator<Item = K>,
    F: Fn(&V) -> bool,
{
    let mut wanted = BTreeSet::new();
    let mut added = Vec::new();

    for key in desired {
        if !wanted.insert(key.clone()) {
            continue;
        }
        if !current.contains_key(&key) {
            added.push(key);
        }
    }

    let removed = current
        .iter()
        .filter(|(key, value)| !wanted.contains(*key) && !retain(value))
        .map(|(key, _)| key.clone())
        .collect();

    Reconciliation { added, removed }
}
