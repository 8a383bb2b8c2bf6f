//! Persistent key-value storage that a store can mirror into, and
//! the keyed helper that treats one storage key as a JSON object.

use std::{cell::RefCell,
          collections::BTreeMap,
          fs,
          io,
          path::{Path, PathBuf},
          rc::Rc};

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage file {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("storage data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("data under key {key:?} is not a JSON object")]
    NotAnObject { key: String },
}

pub trait KeyValueStorage {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    fn set(&mut self, key: &str, value: &Value) -> Result<(), StorageError>;
    /// Whether there was something to remove.
    fn remove(&mut self, key: &str) -> Result<bool, StorageError>;
}

/// Shared handle, so that a store mirror and the code that set it up
/// can both reach the same storage.
impl<S: KeyValueStorage> KeyValueStorage for Rc<RefCell<S>> {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.borrow().get(key)
    }
    fn set(&mut self, key: &str, value: &Value) -> Result<(), StorageError> {
        self.borrow_mut().set(key, value)
    }
    fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
        self.borrow_mut().remove(key)
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    items: BTreeMap<String, Value>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.items.get(key).cloned())
    }
    fn set(&mut self, key: &str, value: &Value) -> Result<(), StorageError> {
        self.items.insert(key.into(), value.clone());
        Ok(())
    }
    fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
        Ok(self.items.remove(key).is_some())
    }
}

/// All keys in one JSON object file. Every write rewrites the file
/// via a temporary file and rename.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// The file is created on the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStorage { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StorageError {
        StorageError::Io { path: self.path.clone(), source }
    }

    fn load(&self) -> Result<Map<String, Value>, StorageError> {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice(&bytes)? {
                Value::Object(m) => Ok(m),
                _ => Err(StorageError::NotAnObject {
                    key: self.path.to_string_lossy().into_owned()
                }),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn save(&self, items: &Map<String, Value>) -> Result<(), StorageError> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, serde_json::to_vec_pretty(items)?)
            .map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.load()?.remove(key))
    }
    fn set(&mut self, key: &str, value: &Value) -> Result<(), StorageError> {
        let mut items = self.load()?;
        items.insert(key.into(), value.clone());
        self.save(&items)
    }
    fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
        let mut items = self.load()?;
        if items.remove(key).is_some() {
            self.save(&items)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// One storage key holding a JSON object, read and written as a
/// whole (`*_data`) or per field (`*_item`).
#[derive(Debug, Clone)]
pub struct KeyStore<S> {
    storage: S,
    key: String,
}

impl<S: KeyValueStorage> KeyStore<S> {
    pub fn new(storage: S, key: &str) -> Self {
        KeyStore { storage, key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn into_inner(self) -> S {
        self.storage
    }

    /// The object under the key; empty if nothing is stored yet.
    pub fn get_data(&self) -> Result<Map<String, Value>, StorageError> {
        match self.storage.get(&self.key)? {
            None => Ok(Map::new()),
            Some(Value::Object(m)) => Ok(m),
            Some(_) => Err(StorageError::NotAnObject { key: self.key.clone() }),
        }
    }

    pub fn set_data(&mut self, data: Map<String, Value>) -> Result<(), StorageError> {
        self.storage.set(&self.key, &Value::Object(data))
    }

    pub fn remove_data(&mut self) -> Result<bool, StorageError> {
        self.storage.remove(&self.key)
    }

    pub fn get_item(&self, name: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.get_data()?.remove(name))
    }

    pub fn set_item(&mut self, name: &str, value: Value) -> Result<(), StorageError> {
        let mut data = self.get_data()?;
        data.insert(name.into(), value);
        self.set_data(data)
    }

    pub fn remove_item(&mut self, name: &str) -> Result<bool, StorageError> {
        let mut data = self.get_data()?;
        if data.remove(name).is_some() {
            self.set_data(data)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Field access through the generic interface, so a `KeyStore` can
/// serve as a store mirror.
impl<S: KeyValueStorage> KeyValueStorage for KeyStore<S> {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.get_item(key)
    }
    fn set(&mut self, key: &str, value: &Value) -> Result<(), StorageError> {
        self.set_item(key, value.clone())
    }
    fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
        self.remove_item(key)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;

    #[test]
    fn t_memory() -> Result<()> {
        let mut s = MemoryStorage::new();
        assert_eq!(s.get("a")?, None);
        s.set("a", &json!([1, 2]))?;
        assert_eq!(s.get("a")?, Some(json!([1, 2])));
        assert!(s.remove("a")?);
        assert!(!s.remove("a")?);
        assert!(s.is_empty());
        Ok(())
    }

    #[test]
    fn t_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("storage.json");
        let mut s = FileStorage::new(&path);
        assert_eq!(s.get("users")?, None);
        assert!(!s.remove("users")?);
        assert!(!path.exists());

        s.set("users", &json!([{"name": "Kyle"}]))?;
        s.set("n", &json!(3))?;
        let s2 = FileStorage::new(&path);
        assert_eq!(s2.get("users")?, Some(json!([{"name": "Kyle"}])));
        assert!(s.remove("n")?);
        assert_eq!(s2.get("n")?, None);
        Ok(())
    }

    #[test]
    fn t_file_errors() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("storage.json");
        fs::write(&path, "[1]")?;
        assert!(matches!(FileStorage::new(&path).get("x"),
                         Err(StorageError::NotAnObject { .. })));
        fs::write(&path, "{")?;
        assert!(matches!(FileStorage::new(&path).get("x"), Err(StorageError::Json(_))));
        let mut s = FileStorage::new(dir.path().join("missing-dir").join("s.json"));
        assert!(matches!(s.set("x", &json!(1)), Err(StorageError::Io { .. })));
        Ok(())
    }

    #[test]
    fn t_key_store() -> Result<()> {
        let shared = Rc::new(RefCell::new(MemoryStorage::new()));
        let mut ks = KeyStore::new(shared.clone(), "app");
        assert!(ks.get_data()?.is_empty());
        ks.set_item("theme", json!("dark"))?;
        ks.set_item("count", json!(2))?;
        assert_eq!(ks.get_item("theme")?, Some(json!("dark")));
        assert_eq!(shared.get("app")?, Some(json!({"theme": "dark", "count": 2})));
        assert!(ks.remove_item("theme")?);
        assert!(!ks.remove_item("theme")?);
        assert!(ks.remove_data()?);
        assert_eq!(shared.get("app")?, None);

        shared.borrow_mut().set("app", &json!("scalar"))?;
        assert!(matches!(ks.get_item("x"), Err(StorageError::NotAnObject { .. })));
        Ok(())
    }
}
