//! An app: named node functions grouped into families, the app's
//! configuration, and its store.

use std::{cell::RefCell, collections::BTreeMap, fmt, rc::Rc};

use anyhow::Result;
use kstring::KString;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::{storage::{KeyStore, KeyValueStorage},
            store::{Store, StoreEntry}};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("global applications require a name in their config")]
    GlobalWithoutName,
    #[error("unknown node family {0:?}")]
    UnknownFamily(String),
    #[error("no node {name:?} in family {family:?}")]
    MissingNode { family: String, name: String },
    #[error("node {family}.{name} did not reply synchronously")]
    NoSynchronousReply { family: String, name: String },
    #[error("node {family}.{name} failed: {message}")]
    NodeFailure { family: String, name: String, message: String },
    #[error("invalid app config: {0}")]
    Config(#[from] serde_json::Error),
}

/// `name` and `global` are reserved; every other key is the initial
/// value of the store entry of that name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub global: bool,
    #[serde(flatten)]
    pub state: Map<String, Value>,
}

impl AppConfig {
    pub fn from_value(value: Value) -> Result<Self, AppError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn named(name: &str) -> Self {
        AppConfig { name: Some(name.into()), ..Default::default() }
    }

    pub fn with_state(mut self, key: &str, initial: Value) -> Self {
        self.state.insert(key.into(), initial);
        self
    }
}

/// Where a node sends its result, now or later.
pub struct Reply(Box<dyn FnOnce(Result<Value>)>);

impl Reply {
    pub fn new(f: impl FnOnce(Result<Value>) + 'static) -> Self {
        Reply(Box::new(f))
    }

    /// For calls whose result nobody waits for.
    pub fn ignore() -> Self {
        Reply::new(|r| if let Err(e) = r {
            debug!("ignored node failure: {e:#}");
        })
    }

    pub fn send(self, result: Result<Value>) {
        (self.0)(result)
    }

    pub fn ok(self, value: Value) {
        self.send(Ok(value))
    }

    pub fn err(self, error: anyhow::Error) {
        self.send(Err(error))
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Reply")
    }
}

pub type NodeFn = Rc<dyn Fn(&App, Value, Reply)>;

lazy_static!{
    /// The schemas every app starts out with.
    static ref DEFAULT_SCHEMAS: BTreeMap<KString, Vec<KString>> = {
        let mut schemas = BTreeMap::new();
        schemas.insert(KString::from_static("default"),
                       ["events", "renderers", "actions"]
                       .into_iter().map(KString::from_static).collect());
        schemas.insert(KString::from_static("app"),
                       ["events", "actions", "common", "modules", "core"]
                       .into_iter().map(KString::from_static).collect());
        schemas
    };
}

struct AppInner {
    config: AppConfig,
    schemas: RefCell<BTreeMap<KString, Vec<KString>>>,
    nodes: RefCell<BTreeMap<KString, BTreeMap<KString, NodeFn>>>,
    store: RefCell<Store>,
}

/// Cheap to clone; clones share everything.
#[derive(Clone)]
pub struct App(Rc<AppInner>);

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("name", &self.0.config.name)
            .field("families", &self.0.nodes.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self, AppError> {
        if config.global && config.name.as_deref().map_or(true, str::is_empty) {
            return Err(AppError::GlobalWithoutName)
        }
        let mut store = Store::new();
        for (key, initial) in &config.state {
            store.register(key, initial.clone());
        }
        Ok(App(Rc::new(AppInner {
            config,
            schemas: RefCell::new(DEFAULT_SCHEMAS.clone()),
            nodes: RefCell::new(BTreeMap::new()),
            store: RefCell::new(store),
        })))
    }

    pub fn name(&self) -> Option<&str> {
        self.0.config.name.as_deref()
    }

    pub fn is_global(&self) -> bool {
        self.0.config.global
    }

    /// Create the families listed by the schema `name`; unknown
    /// schemas are ignored.
    pub fn schema(&self, name: &str) -> &Self {
        let families = self.0.schemas.borrow().get(name).cloned();
        match families {
            Some(families) => {
                for f in families {
                    self.augment(&[f.as_str()]);
                }
            }
            None => debug!("app: unknown schema {name:?}"),
        }
        self
    }

    /// Existing schemas are kept.
    pub fn add_schema(&self, name: &str, families: &[&str]) -> &Self {
        let mut schemas = self.0.schemas.borrow_mut();
        if schemas.contains_key(name) {
            debug!("app: schema {name:?} exists already");
        } else {
            schemas.insert(KString::from_ref(name),
                           families.iter().map(|f| KString::from_ref(f)).collect());
        }
        self
    }

    /// Create the given families if missing.
    pub fn augment(&self, families: &[&str]) -> &Self {
        let mut nodes = self.0.nodes.borrow_mut();
        for f in families {
            nodes.entry(KString::from_ref(f)).or_default();
        }
        self
    }

    pub fn families(&self) -> Vec<String> {
        self.0.nodes.borrow().keys().map(|k| k.to_string()).collect()
    }

    /// Node names of `family`, or `None` if there is no such family.
    pub fn family(&self, family: &str) -> Option<Vec<String>> {
        self.0.nodes.borrow().get(family)
            .map(|nodes| nodes.keys().map(|k| k.to_string()).collect())
    }

    /// A builder adding nodes to `family`.
    pub fn configure(&self, family: &str) -> Result<Configurator<'_>, AppError> {
        if !self.0.nodes.borrow().contains_key(family) {
            return Err(AppError::UnknownFamily(family.into()))
        }
        Ok(Configurator { app: self, family: KString::from_ref(family) })
    }

    /// False if the family does not exist or already has a node
    /// `name` (which is then kept).
    pub fn add_node(&self, family: &str, name: &str,
                    f: impl Fn(&App, Value, Reply) + 'static) -> bool {
        let mut nodes = self.0.nodes.borrow_mut();
        match nodes.get_mut(family) {
            Some(fam) if !fam.contains_key(name) => {
                fam.insert(KString::from_ref(name), Rc::new(f));
                true
            }
            Some(_) => {
                debug!("app: node {family}.{name} exists already");
                false
            }
            None => {
                debug!("app: no family {family:?} for node {name:?}");
                false
            }
        }
    }

    pub fn get_node(&self, family: &str, name: &str) -> Option<NodeFn> {
        self.0.nodes.borrow().get(family)?.get(name).cloned()
    }

    pub fn node_exists(&self, family: &str, name: &str) -> bool {
        self.get_node(family, name).is_some()
    }

    /// Call a node; it may reply right away or later.
    pub fn call_node(&self, family: &str, name: &str, params: Value,
                     reply: impl FnOnce(Result<Value>) + 'static) -> Result<(), AppError> {
        let node = self.get_node(family, name).ok_or_else(|| AppError::MissingNode {
            family: family.into(),
            name: name.into(),
        })?;
        node(self, params, Reply::new(reply));
        Ok(())
    }

    /// Call a node that replies before returning.
    pub fn call_node_sync(&self, family: &str, name: &str, params: Value)
                          -> Result<Value, AppError> {
        let slot: Rc<RefCell<Option<Result<Value>>>> = Default::default();
        let s = slot.clone();
        self.call_node(family, name, params, move |r| *s.borrow_mut() = Some(r))?;
        let result = slot.borrow_mut().take();
        match result {
            Some(Ok(v)) => Ok(v),
            Some(Err(e)) => Err(AppError::NodeFailure {
                family: family.into(),
                name: name.into(),
                message: format!("{e:#}"),
            }),
            None => Err(AppError::NoSynchronousReply {
                family: family.into(),
                name: name.into(),
            }),
        }
    }

    /// Any config key, including `name` and `global`.
    pub fn get_config(&self, key: &str) -> Option<Value> {
        let config = &self.0.config;
        match key {
            "name" => config.name.clone().map(Value::String),
            "global" => Some(Value::Bool(config.global)),
            _ => config.state.get(key).cloned(),
        }
    }

    pub fn register_store(&self, key: &str, initial: Value) -> bool {
        self.0.store.borrow_mut().register(key, initial)
    }

    /// `None` if `key` is not registered. `transform` runs with the
    /// store released, so it may read (or update) the store itself.
    pub fn update_store(&self, key: &str, transform: impl FnOnce(&Value) -> Value)
                        -> Option<Value> {
        let last = self.0.store.borrow().read_latest(key).cloned();
        let last = match last {
            Some(v) => v,
            None => {
                debug!("app: update of unknown store key {key:?}");
                return None
            }
        };
        let value = transform(&last);
        self.0.store.borrow_mut().append(key, value).cloned()
    }

    pub fn get_store(&self, key: &str) -> Option<StoreEntry<Value>> {
        self.0.store.borrow().read(key).cloned()
    }

    pub fn get_store_data(&self, key: &str) -> Option<Value> {
        self.0.store.borrow().read_latest(key).cloned()
    }

    pub fn store_keys(&self) -> Vec<String> {
        self.0.store.borrow().keys().map(String::from).collect()
    }

    /// Mirror every store update into `storage`, as fields of the
    /// object stored under `name`.
    pub fn sync_storage(&self, name: &str, storage: impl KeyValueStorage + 'static) -> &Self {
        self.0.store.borrow_mut().set_mirror(Box::new(KeyStore::new(storage, name)));
        self
    }
}

/// Returned by `App::configure`.
pub struct Configurator<'a> {
    app: &'a App,
    family: KString,
}

impl<'a> Configurator<'a> {
    /// Add a node to the family; a name that exists already is
    /// ignored.
    pub fn node(self, name: &str, f: impl Fn(&App, Value, Reply) + 'static) -> Self {
        self.app.add_node(&self.family, name, f);
        self
    }

    pub fn configure(self, family: &str) -> Result<Configurator<'a>, AppError> {
        self.app.configure(family)
    }
}

/// Explicit registry for apps that are meant to be reachable by
/// name.
#[derive(Debug, Default)]
pub struct Apps {
    apps: BTreeMap<String, App>,
}

impl Apps {
    pub fn new() -> Self {
        Self::default()
    }

    /// The app needs a name; an app registered earlier under the same
    /// name stays and is returned.
    pub fn register(&mut self, app: App) -> Result<App, AppError> {
        let name = match app.name() {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => return Err(AppError::GlobalWithoutName),
        };
        Ok(self.apps.entry(name).or_insert(app).clone())
    }

    /// Create an app from `config` and register it.
    pub fn create(&mut self, config: AppConfig) -> Result<App, AppError> {
        self.register(App::new(config)?)
    }

    pub fn get(&self, name: &str) -> Option<App> {
        self.apps.get(name).cloned()
    }
}
