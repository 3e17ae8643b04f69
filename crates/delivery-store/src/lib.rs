//! Remote configuration store clients
//!
//! Everything the sync engine does to the server goes through
//! [`RemoteStore`]: a four-operation capability over a closed set of object
//! kinds ([`RemoteObject`]). Failures carry an explicit
//! [`Error::NotFound`] variant so callers can treat missing objects as
//! already-satisfied deletes without looking at transport details.
//!
//! Two implementations are provided:
//!
//! - [`HttpStore`]: blocking JSON REST client for a configuration server
//! - [`MemoryStore`]: in-process store with a call log and failure injection

pub mod error;
pub mod http;
pub mod memory;
pub mod object;

pub use error::{Error, Result};
pub use http::{HttpStore, HttpStoreConfig};
pub use memory::{CallKind, MemoryStore, StoreCall};
pub use object::{
    Collection, KvContainer, KvContainerItem, ObjectRef, PackagedUnit, RemoteObject,
    SimpleRecord, UnitFile,
};

use std::sync::Arc;

/// Capability interface to the remote configuration store.
///
/// Every call blocks until the server has answered. Implementations must
/// report a missing object as [`Error::NotFound`] and nothing else.
pub trait RemoteStore: Send + Sync {
    /// Fetch an object.
    fn load(&self, target: &ObjectRef) -> Result<RemoteObject>;

    /// Create or replace an object; the store decides which.
    fn save(&self, object: &RemoteObject) -> Result<()>;

    /// Remove an object. For [`ObjectRef::Unit`] without a version every
    /// version of the unit is removed.
    fn destroy(&self, target: &ObjectRef) -> Result<()>;

    /// Names of all objects in a collection.
    fn list(&self, collection: Collection) -> Result<Vec<String>>;
}

impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
    fn load(&self, target: &ObjectRef) -> Result<RemoteObject> {
        (**self).load(target)
    }

    fn save(&self, object: &RemoteObject) -> Result<()> {
        (**self).save(object)
    }

    fn destroy(&self, target: &ObjectRef) -> Result<()> {
        (**self).destroy(target)
    }

    fn list(&self, collection: Collection) -> Result<Vec<String>> {
        (**self).list(collection)
    }
}
