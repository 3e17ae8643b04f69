//! In-process store
//!
//! Holds objects in memory with the same not-found contract as a real
//! server. Every call is appended to a log, and failures can be injected
//! per call kind and target, which makes it the store of choice for
//! exercising sync passes without a server.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use crate::object::{
    Collection, KvContainer, KvContainerItem, ObjectRef, PackagedUnit, RemoteObject, SimpleRecord,
};
use crate::{Error, RemoteStore, Result};

/// Kind of store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Load,
    Save,
    Destroy,
    List,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load => write!(f, "load"),
            Self::Save => write!(f, "save"),
            Self::Destroy => write!(f, "destroy"),
            Self::List => write!(f, "list"),
        }
    }
}

/// One logged call: its kind and the target rendered as a server path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub kind: CallKind,
    pub target: String,
}

impl fmt::Display for StoreCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.target)
    }
}

#[derive(Debug, Default)]
struct State {
    records: BTreeMap<(Collection, String), Value>,
    units: BTreeMap<String, BTreeMap<String, PackagedUnit>>,
    containers: BTreeMap<String, BTreeMap<String, Value>>,
    calls: Vec<StoreCall>,
    failures: Vec<(CallKind, String)>,
}

impl State {
    fn record_call(&mut self, kind: CallKind, target: String) -> Result<()> {
        let injected = self
            .failures
            .iter()
            .any(|(k, t)| *k == kind && *t == target);
        self.calls.push(StoreCall {
            kind,
            target: target.clone(),
        });
        if injected {
            return Err(Error::Status {
                method: kind.to_string(),
                url: target,
                status: 500,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn put(&mut self, object: &RemoteObject) -> Result<()> {
        match object {
            RemoteObject::Record(record) => {
                if !record.collection.holds_records() {
                    return Err(Error::invalid(
                        object.reference(),
                        "collection does not hold plain records",
                    ));
                }
                self.records
                    .insert((record.collection, record.name.clone()), record.body.clone());
            }
            RemoteObject::Unit(unit) => {
                self.units
                    .entry(unit.name.clone())
                    .or_default()
                    .insert(unit.version.clone(), unit.clone());
            }
            RemoteObject::Container(container) => {
                self.containers.entry(container.name.clone()).or_default();
            }
            RemoteObject::Item(item) => {
                let container = self
                    .containers
                    .get_mut(&item.container)
                    .ok_or_else(|| Error::not_found(ObjectRef::container(&item.container)))?;
                container.insert(item.key.clone(), item.payload.clone());
            }
        }
        Ok(())
    }
}

/// In-memory [`RemoteStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep going
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert an object without logging a call.
    pub fn seed(&self, object: RemoteObject) -> Result<()> {
        self.state().put(&object)
    }

    /// Make every `kind` call on `target` (rendered as a server path, e.g.
    /// `roles/web`) fail with a server error until cleared.
    pub fn fail_on(&self, kind: CallKind, target: impl Into<String>) {
        self.state().failures.push((kind, target.into()));
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    /// Calls of one kind, rendered as targets.
    pub fn calls_of(&self, kind: CallKind) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.target.clone())
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn record(&self, collection: Collection, name: &str) -> Option<Value> {
        self.state()
            .records
            .get(&(collection, name.to_string()))
            .cloned()
    }

    pub fn unit(&self, name: &str, version: &str) -> Option<PackagedUnit> {
        self.state()
            .units
            .get(name)
            .and_then(|versions| versions.get(version))
            .cloned()
    }

    pub fn unit_versions(&self, name: &str) -> Vec<String> {
        self.state()
            .units
            .get(name)
            .map(|versions| versions.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Keys held by a container, or `None` if the container does not exist.
    pub fn container_items(&self, name: &str) -> Option<Vec<String>> {
        self.state()
            .containers
            .get(name)
            .map(|items| items.keys().cloned().collect())
    }

    pub fn item(&self, container: &str, key: &str) -> Option<Value> {
        self.state()
            .containers
            .get(container)
            .and_then(|items| items.get(key))
            .cloned()
    }
}

impl RemoteStore for MemoryStore {
    fn load(&self, target: &ObjectRef) -> Result<RemoteObject> {
        let mut state = self.state();
        state.record_call(CallKind::Load, target.to_string())?;

        let missing = || Error::not_found(target);
        match target {
            ObjectRef::Record { collection, name } => {
                let body = state
                    .records
                    .get(&(*collection, name.clone()))
                    .ok_or_else(missing)?;
                Ok(RemoteObject::Record(SimpleRecord {
                    collection: *collection,
                    name: name.clone(),
                    body: body.clone(),
                }))
            }
            ObjectRef::Unit { name, version } => {
                let versions = state.units.get(name).ok_or_else(missing)?;
                // Without a version, the last key in map order stands in for "latest"
                let unit = match version {
                    Some(v) => versions.get(v),
                    None => versions.values().next_back(),
                };
                unit.cloned().map(RemoteObject::Unit).ok_or_else(missing)
            }
            ObjectRef::Container { name } => {
                let items = state.containers.get(name).ok_or_else(missing)?;
                Ok(RemoteObject::Container(KvContainer {
                    name: name.clone(),
                    items: items.keys().cloned().collect(),
                }))
            }
            ObjectRef::Item { container, key } => {
                let payload = state
                    .containers
                    .get(container)
                    .and_then(|items| items.get(key))
                    .ok_or_else(missing)?;
                Ok(RemoteObject::Item(KvContainerItem {
                    container: container.clone(),
                    key: key.clone(),
                    payload: payload.clone(),
                }))
            }
        }
    }

    fn save(&self, object: &RemoteObject) -> Result<()> {
        let mut state = self.state();
        state.record_call(CallKind::Save, object.reference().to_string())?;
        state.put(object)
    }

    fn destroy(&self, target: &ObjectRef) -> Result<()> {
        let mut state = self.state();
        state.record_call(CallKind::Destroy, target.to_string())?;

        let removed = match target {
            ObjectRef::Record { collection, name } => state
                .records
                .remove(&(*collection, name.clone()))
                .is_some(),
            ObjectRef::Unit {
                name,
                version: None,
            } => state.units.remove(name).is_some(),
            ObjectRef::Unit {
                name,
                version: Some(version),
            } => {
                let removed = state
                    .units
                    .get_mut(name)
                    .and_then(|versions| versions.remove(version))
                    .is_some();
                if state.units.get(name).is_some_and(|v| v.is_empty()) {
                    state.units.remove(name);
                }
                removed
            }
            ObjectRef::Container { name } => state.containers.remove(name).is_some(),
            ObjectRef::Item { container, key } => state
                .containers
                .get_mut(container)
                .and_then(|items| items.remove(key))
                .is_some(),
        };

        if removed {
            Ok(())
        } else {
            Err(Error::not_found(target))
        }
    }

    fn list(&self, collection: Collection) -> Result<Vec<String>> {
        let mut state = self.state();
        state.record_call(CallKind::List, collection.to_string())?;

        let names = match collection {
            Collection::Cookbooks => state.units.keys().cloned().collect(),
            Collection::DataBags => state.containers.keys().cloned().collect(),
            _ => state
                .records
                .keys()
                .filter(|(c, _)| *c == collection)
                .map(|(_, name)| name.clone())
                .collect(),
        };
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn role(name: &str) -> RemoteObject {
        RemoteObject::Record(SimpleRecord {
            collection: Collection::Roles,
            name: name.into(),
            body: json!({ "name": name }),
        })
    }

    #[test]
    fn destroy_missing_record_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .destroy(&ObjectRef::record(Collection::Roles, "web"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn save_then_load_record() {
        let store = MemoryStore::new();
        store.save(&role("web")).unwrap();

        let loaded = store
            .load(&ObjectRef::record(Collection::Roles, "web"))
            .unwrap();
        assert_eq!(loaded, role("web"));
        assert_eq!(store.calls_of(CallKind::Save), vec!["roles/web"]);
    }

    #[test]
    fn item_save_requires_container() {
        let store = MemoryStore::new();
        let item = RemoteObject::Item(KvContainerItem {
            container: "alerts".into(),
            key: "high".into(),
            payload: json!({ "id": "high" }),
        });

        assert!(store.save(&item).unwrap_err().is_not_found());

        store
            .save(&RemoteObject::Container(KvContainer {
                name: "alerts".into(),
                ..Default::default()
            }))
            .unwrap();
        store.save(&item).unwrap();
        assert_eq!(store.container_items("alerts"), Some(vec!["high".to_string()]));
    }

    #[test]
    fn destroy_unit_without_version_removes_all_versions() {
        let store = MemoryStore::new();
        for version in ["1.0.0", "2.0.0"] {
            store
                .seed(RemoteObject::Unit(PackagedUnit {
                    name: "nginx".into(),
                    version: version.into(),
                    metadata: json!({}),
                    files: vec![],
                }))
                .unwrap();
        }

        store.destroy(&ObjectRef::unit("nginx", None)).unwrap();
        assert!(store.unit_versions("nginx").is_empty());
        assert!(store.destroy(&ObjectRef::unit("nginx", None)).unwrap_err().is_not_found());
    }

    #[test]
    fn destroy_single_version_keeps_others() {
        let store = MemoryStore::new();
        for version in ["1.0.0", "2.0.0"] {
            store
                .seed(RemoteObject::Unit(PackagedUnit {
                    name: "nginx".into(),
                    version: version.into(),
                    metadata: json!({}),
                    files: vec![],
                }))
                .unwrap();
        }

        store
            .destroy(&ObjectRef::unit("nginx", Some("1.0.0".into())))
            .unwrap();
        assert_eq!(store.unit_versions("nginx"), vec!["2.0.0".to_string()]);
    }

    #[test]
    fn injected_failure_is_not_a_not_found() {
        let store = MemoryStore::new();
        store.fail_on(CallKind::Save, "roles/web");

        let err = store.save(&role("web")).unwrap_err();
        assert!(!err.is_not_found());
        assert!(store.record(Collection::Roles, "web").is_none());

        store.clear_failures();
        store.save(&role("web")).unwrap();
        assert!(store.record(Collection::Roles, "web").is_some());
    }

    #[test]
    fn list_is_scoped_to_collection() {
        let store = MemoryStore::new();
        store.seed(role("web")).unwrap();
        store
            .seed(RemoteObject::Record(SimpleRecord {
                collection: Collection::Nodes,
                name: "host1".into(),
                body: json!({}),
            }))
            .unwrap();

        assert_eq!(store.list(Collection::Roles).unwrap(), vec!["web"]);
        assert_eq!(store.list(Collection::Nodes).unwrap(), vec!["host1"]);
    }
}
