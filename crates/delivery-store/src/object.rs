//! The closed set of objects a configuration server holds

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server-side collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Cookbooks,
    Roles,
    DataBags,
    Environments,
    Nodes,
    Clients,
    Users,
}

impl Collection {
    /// URL path segment of the collection.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cookbooks => "cookbooks",
            Self::Roles => "roles",
            Self::DataBags => "data",
            Self::Environments => "environments",
            Self::Nodes => "nodes",
            Self::Clients => "clients",
            Self::Users => "users",
        }
    }

    /// Whether objects in this collection are plain named JSON documents.
    pub fn holds_records(&self) -> bool {
        !matches!(self, Self::Cookbooks | Self::DataBags)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of an object on the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectRef {
    /// A named document in a record collection
    Record { collection: Collection, name: String },
    /// One version of a packaged unit, or all of them when `version` is `None`
    Unit {
        name: String,
        version: Option<String>,
    },
    /// A key/value container
    Container { name: String },
    /// One item inside a key/value container
    Item { container: String, key: String },
}

impl ObjectRef {
    pub fn record(collection: Collection, name: impl Into<String>) -> Self {
        Self::Record {
            collection,
            name: name.into(),
        }
    }

    pub fn unit(name: impl Into<String>, version: Option<String>) -> Self {
        Self::Unit {
            name: name.into(),
            version,
        }
    }

    pub fn container(name: impl Into<String>) -> Self {
        Self::Container { name: name.into() }
    }

    pub fn item(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Item {
            container: container.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Record { collection, name } => write!(f, "{collection}/{name}"),
            Self::Unit {
                name,
                version: Some(version),
            } => write!(f, "cookbooks/{name}/{version}"),
            Self::Unit {
                name,
                version: None,
            } => write!(f, "cookbooks/{name}"),
            Self::Container { name } => write!(f, "data/{name}"),
            Self::Item { container, key } => write!(f, "data/{container}/{key}"),
        }
    }
}

/// A named JSON document (role, environment, node, client, user).
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleRecord {
    pub collection: Collection,
    pub name: String,
    pub body: Value,
}

/// One file of a packaged unit, shipped with its full content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFile {
    /// Path relative to the unit directory, forward slashes
    pub path: String,
    /// `sha256:<hex>` of `content`
    pub checksum: String,
    pub content: Vec<u8>,
}

/// A versioned bundle of files (a cookbook).
#[derive(Debug, Clone, PartialEq)]
pub struct PackagedUnit {
    pub name: String,
    pub version: String,
    pub metadata: Value,
    pub files: Vec<UnitFile>,
}

/// A key/value container and the keys it currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KvContainer {
    pub name: String,
    pub items: BTreeSet<String>,
}

/// One item of a key/value container.
#[derive(Debug, Clone, PartialEq)]
pub struct KvContainerItem {
    pub container: String,
    pub key: String,
    pub payload: Value,
}

/// Any object the store can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteObject {
    Record(SimpleRecord),
    Unit(PackagedUnit),
    Container(KvContainer),
    Item(KvContainerItem),
}

impl RemoteObject {
    /// The address this object is saved under.
    pub fn reference(&self) -> ObjectRef {
        match self {
            Self::Record(r) => ObjectRef::record(r.collection, &r.name),
            Self::Unit(u) => ObjectRef::unit(&u.name, Some(u.version.clone())),
            Self::Container(c) => ObjectRef::container(&c.name),
            Self::Item(i) => ObjectRef::item(&i.container, &i.key),
        }
    }
}
