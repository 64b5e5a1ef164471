//! Named secondary indices over entities of one type.

use super::Entity;
use crate::{Uri, Value};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Key extractor. `None` leaves the entity out of the index.
pub(super) type Extractor = Rc<dyn Fn(&Entity) -> Option<Value>>;

pub(super) struct SecondaryIndex {
    pub(super) kind: String,
    pub(super) extract: Extractor,
    /// key -> (creation serial -> uri); first match = oldest entity.
    buckets: BTreeMap<Value, BTreeMap<u64, Uri>>,
    keys: BTreeMap<Uri, (Value, u64)>,
}

impl SecondaryIndex {
    pub(super) fn new(kind: String, extract: Extractor) -> Self {
        Self {
            kind,
            extract,
            buckets: BTreeMap::new(),
            keys: BTreeMap::new(),
        }
    }

    /// Place `uri` under `key`, moving it out of any previous bucket.
    ///
    /// Returns `true` when the index contents changed.
    pub(super) fn place(&mut self, uri: &Uri, seq: u64, key: Option<Value>) -> bool {
        let previous = self.keys.get(uri).map(|(k, _)| k.clone());
        if previous == key {
            return false;
        }
        self.evict(uri);
        if let Some(key) = key {
            self.buckets
                .entry(key.clone())
                .or_default()
                .insert(seq, uri.clone());
            self.keys.insert(uri.clone(), (key, seq));
        }
        true
    }

    /// Drop `uri` from the index. Returns `true` if it was present.
    pub(super) fn evict(&mut self, uri: &Uri) -> bool {
        let Some((key, seq)) = self.keys.remove(uri) else {
            return false;
        };
        if let Some(bucket) = self.buckets.get_mut(&key) {
            bucket.remove(&seq);
            if bucket.is_empty() {
                self.buckets.remove(&key);
            }
        }
        true
    }

    pub(super) fn first(&self, key: &Value) -> Option<&Uri> {
        self.buckets.get(key).and_then(|bucket| bucket.values().next())
    }

    pub(super) fn all(&self, key: &Value) -> Vec<Uri> {
        self.buckets
            .get(key)
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(super) fn key_of(&self, uri: &Uri) -> Option<&Value> {
        self.keys.get(uri).map(|(key, _)| key)
    }
}
