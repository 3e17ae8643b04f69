//! Post-upload verification of node checkpoint tags

use delivery_store::{Collection, ObjectRef, RemoteObject, RemoteStore};
use serde_json::{Map, Value};

/// Look up a dot-separated path in a JSON value.
pub fn get_json_path<'a>(json: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = json;
    for part in path.split('.') {
        match current {
            Value::Object(map) => current = map.get(part)?,
            Value::Array(arr) => current = arr.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        }
    }
    Some(current)
}

/// Path of the checkpoint tag inside a node document.
pub fn tag_path(attribute: &str) -> String {
    format!("normal.{attribute}.checkpoint")
}

/// Set `normal.<attribute>.checkpoint = revision`, creating the
/// intermediate objects. Non-object values on the way are replaced.
pub fn set_checkpoint_tag(node: &mut Value, attribute: &str, revision: &str) {
    let mut current = node;
    for key in ["normal", attribute] {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        map.insert("checkpoint".into(), Value::String(revision.to_string()));
    }
}

/// Reads nodes back from the store and checks their checkpoint tag.
pub struct UploadVerifier<'a> {
    store: &'a dyn RemoteStore,
    attribute: &'a str,
}

impl<'a> UploadVerifier<'a> {
    pub fn new(store: &'a dyn RemoteStore, attribute: &'a str) -> Self {
        Self { store, attribute }
    }

    /// Whether the stored node carries `expected` as its checkpoint tag.
    ///
    /// Any failure to read the node counts as a mismatch; a transient read
    /// error is indistinguishable from a stale node here.
    pub fn verify(&self, node: &str, expected: &str) -> bool {
        let target = ObjectRef::record(Collection::Nodes, node);
        let body = match self.store.load(&target) {
            Ok(RemoteObject::Record(record)) => record.body,
            Ok(_) => return false,
            Err(e) => {
                tracing::debug!("Could not read {} for verification: {}", target, e);
                return false;
            }
        };
        let actual = get_json_path(&body, &tag_path(self.attribute)).and_then(Value::as_str);
        if actual != Some(expected) {
            tracing::debug!(
                "Node {} has checkpoint {:?}, expected {}",
                node,
                actual,
                expected
            );
            return false;
        }
        true
    }
}
