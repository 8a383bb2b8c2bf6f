//! Keyed, append-only value histories.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kstring::KString;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::storage::KeyValueStorage;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreValue<T> {
    pub value: T,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreEntry<T> {
    pub initial: T,
    values: Vec<StoreValue<T>>,
}

impl<T> StoreEntry<T> {
    fn new(initial: T) -> Self {
        StoreEntry { initial, values: Vec::new() }
    }

    /// The history, oldest first; `initial` is not part of it.
    pub fn values(&self) -> &[StoreValue<T>] {
        &self.values
    }

    pub fn last_value(&self) -> &T {
        match self.values.last() {
            Some(v) => &v.value,
            None => &self.initial,
        }
    }

    /// `None` until the first update.
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.values.last().map(|v| v.modified)
    }
}

pub struct Store<T = Value> {
    entries: BTreeMap<KString, StoreEntry<T>>,
    mirror: Option<Box<dyn KeyValueStorage>>,
}

impl<T> Default for Store<T> {
    fn default() -> Self {
        Store { entries: BTreeMap::new(), mirror: None }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("entries", &self.entries)
            .field("mirror", &self.mirror.is_some())
            .finish()
    }
}

impl<T: Serialize> Store<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every successful update is also written, as JSON, to
    /// `mirror` under the entry's key.
    pub fn set_mirror(&mut self, mirror: Box<dyn KeyValueStorage>) {
        self.mirror = Some(mirror);
    }

    pub fn has_mirror(&self) -> bool {
        self.mirror.is_some()
    }

    /// False (and no change) if `key` already exists.
    pub fn register(&mut self, key: &str, initial: T) -> bool {
        if self.entries.contains_key(key) {
            debug!("store: key {key:?} already registered");
            return false
        }
        self.entries.insert(KString::from_ref(key), StoreEntry::new(initial));
        true
    }

    /// Append `transform(last value)` to the history of `key`.
    /// Returns the new value, or `None` if `key` is not registered.
    pub fn update(&mut self, key: &str, transform: impl FnOnce(&T) -> T) -> Option<&T> {
        let value = match self.entries.get(key) {
            Some(e) => transform(e.last_value()),
            None => {
                debug!("store: update of unknown key {key:?}");
                return None
            }
        };
        self.append(key, value)
    }

    /// Append `value` to the history of `key`; `update` for a value
    /// computed elsewhere.
    pub fn append(&mut self, key: &str, value: T) -> Option<&T> {
        let entry = match self.entries.get_mut(key) {
            Some(e) => e,
            None => {
                debug!("store: update of unknown key {key:?}");
                return None
            }
        };
        if let Some(mirror) = &mut self.mirror {
            // The in-memory update stands regardless.
            match serde_json::to_value(&value) {
                Ok(json) => if let Err(e) = mirror.set(key, &json) {
                    warn!("store: could not mirror {key:?}: {e}");
                },
                Err(e) => warn!("store: could not serialize {key:?} for mirror: {e}"),
            }
        }
        entry.values.push(StoreValue { value, modified: Utc::now() });
        Some(entry.last_value())
    }

    pub fn read(&self, key: &str) -> Option<&StoreEntry<T>> {
        self.entries.get(key)
    }

    pub fn read_latest(&self, key: &str) -> Option<&T> {
        self.entries.get(key).map(StoreEntry::last_value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};
    use anyhow::Result;
    use proptest::prelude::*;
    use serde_json::json;

    use crate::storage::{MemoryStorage, StorageError};

    #[test]
    fn t_register_update_read() {
        let mut s: Store = Store::new();
        assert!(s.register("users", json!([])));
        assert!(!s.register("users", json!(["x"])));
        assert_eq!(s.read_latest("users"), Some(&json!([])));
        assert_eq!(s.read("users").unwrap().modified(), None);

        let v = s.update("users", |old| {
            let mut a = old.as_array().cloned().unwrap_or_default();
            a.push(json!("Kyle"));
            Value::Array(a)
        });
        assert_eq!(v, Some(&json!(["Kyle"])));
        let e = s.read("users").unwrap();
        assert_eq!(e.initial, json!([]));
        assert_eq!(e.values().len(), 1);
        assert!(e.modified().is_some());
        assert_eq!(s.keys().collect::<Vec<_>>(), ["users"]);
    }

    #[test]
    fn t_unknown_key() {
        let mut s: Store<u32> = Store::new();
        s.register("a", 1);
        assert_eq!(s.update("b", |_| panic!("not called")), None);
        assert_eq!(s.append("b", 2), None);
        assert!(!s.contains_key("b"));
        assert_eq!(s.read_latest("a"), Some(&1));
        assert_eq!(s.append("a", 5), Some(&5));
        assert_eq!(s.read("a").map(|e| e.values().len()), Some(1));
    }

    #[test]
    fn t_mirror() -> Result<()> {
        let storage = Rc::new(RefCell::new(MemoryStorage::new()));
        let mut s: Store = Store::new();
        s.set_mirror(Box::new(storage.clone()));
        s.register("n", json!(0));
        assert_eq!(storage.get("n")?, None);
        s.update("n", |v| json!(v.as_i64().unwrap_or(0) + 1));
        assert_eq!(storage.get("n")?, Some(json!(1)));
        Ok(())
    }

    struct Broken;
    impl KeyValueStorage for Broken {
        fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
            Err(StorageError::NotAnObject { key: key.into() })
        }
        fn set(&mut self, key: &str, _: &Value) -> Result<(), StorageError> {
            Err(StorageError::NotAnObject { key: key.into() })
        }
        fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
            Err(StorageError::NotAnObject { key: key.into() })
        }
    }

    #[test]
    fn t_mirror_failure_is_not_reported() {
        let mut s: Store<u8> = Store::new();
        s.set_mirror(Box::new(Broken));
        s.register("k", 1);
        assert_eq!(s.update("k", |v| v + 1), Some(&2));
        assert_eq!(s.read("k").unwrap().values().len(), 1);
    }

    proptest! {
        #[test]
        fn t_append_only(ops in proptest::collection::vec((any::<bool>(), any::<i16>()), 0..40)) {
            let mut s: Store<i64> = Store::new();
            s.register("k", 0);
            let mut expected_len = 0;
            for (known, delta) in ops {
                let key = if known { "k" } else { "unknown" };
                let before = s.read("k").unwrap().clone();
                let r = s.update(key, |v| v + i64::from(delta)).copied();
                let after = s.read("k").unwrap();
                if known {
                    expected_len += 1;
                    prop_assert_eq!(r, Some(before.last_value() + i64::from(delta)));
                    prop_assert_eq!(&after.values()[..before.values().len()], before.values());
                } else {
                    prop_assert_eq!(r, None);
                    prop_assert_eq!(after, &before);
                }
                prop_assert_eq!(after.values().len(), expected_len);
                prop_assert_eq!(Some(after.last_value()),
                                after.values().last().map(|v| &v.value).or(Some(&0)));
                prop_assert!(!s.contains_key("unknown"));
            }
        }
    }
}
