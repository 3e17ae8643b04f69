//! Incremental configuration delivery
//!
//! Pushes configuration artifacts from a repository checkout to a remote
//! configuration server, reflecting exactly what changed between the last
//! delivered revision (the checkpoint) and the current head:
//!
//! - **Differ**: changed paths between two revisions to artifact records
//! - **Classifier**: records to per-category delete and upsert sets
//! - **Applier**: ordered deletes and uploads against a [`RemoteStore`](delivery_store::RemoteStore)
//! - **Verifier**: reads uploaded nodes back and checks their checkpoint tag
//! - **SyncEngine**: one full pass, from repository update to checkpoint
//!
//! ```text
//!                delivery-cli
//!                     |
//!               delivery-core
//!                     |
//!     +---------------+---------------+
//!     |               |               |
//! delivery-fs    delivery-git    delivery-store
//! ```

pub mod applier;
pub mod category;
pub mod changeset;
pub mod checkpoint;
pub mod config;
pub mod differ;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod local;
pub mod naming;
pub mod verify;

pub use applier::{ApplyOptions, ApplyReport, SyncApplier};
pub use category::{Category, CategoryKind, Layout};
pub use changeset::{ArtifactRef, CategoryChanges, ChangeRecord, ChangeStatus, Changeset, classify};
pub use checkpoint::CheckpointStore;
pub use config::{DEFAULT_CONFIG_FILE, DeliveryConfig, PathsConfig, ServerConfig};
pub use differ::{ChangeRecords, RevisionDiffer};
pub use engine::{EngineOptions, FailureKind, PassResult, PassStatus, SyncEngine};
pub use error::{Error, Result};
pub use hooks::{HookConfig, HookContext, HookEvent, HookResult, run_hooks};
pub use local::LocalRepo;
pub use naming::{ArtifactIdentity, resolve};
pub use verify::UploadVerifier;
