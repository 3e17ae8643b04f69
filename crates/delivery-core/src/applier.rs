//! Applying a changeset (or a full sync) to the remote store
//!
//! Categories are applied in [`Category::APPLY_ORDER`]; inside a category
//! deletes run before uploads. A delete of something already absent is
//! fine. Any other store failure aborts the pass, and nothing already done
//! is rolled back.

use std::collections::HashMap;

use delivery_store::{KvContainer, ObjectRef, RemoteObject, RemoteStore};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::category::{Category, CategoryKind};
use crate::changeset::{ArtifactRef, Changeset};
use crate::local::LocalRepo;
use crate::naming;
use crate::verify::set_checkpoint_tag;

/// What a full sync or apply did (or would have done in dry-run).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    /// Human-readable log of every mutation, in order
    pub actions: Vec<String>,
    /// Nodes uploaded with a checkpoint tag
    pub uploaded_nodes: Vec<ArtifactRef>,
    pub deleted: usize,
    pub uploaded: usize,
}

impl ApplyReport {
    fn push(&mut self, action: String) {
        self.actions.push(action);
    }
}

/// Options for an applier
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Log intended mutations as `[DRYRUN] Would ...` and make no remote calls
    pub dry_run: bool,
    /// Node attribute receiving the checkpoint tag
    pub checkpoint_attribute: String,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            checkpoint_attribute: "delivery".to_string(),
        }
    }
}

/// Pushes local artifacts to a [`RemoteStore`].
pub struct SyncApplier<'a> {
    store: &'a dyn RemoteStore,
    local: &'a LocalRepo,
    options: ApplyOptions,
}

impl<'a> SyncApplier<'a> {
    pub fn new(store: &'a dyn RemoteStore, local: &'a LocalRepo, options: ApplyOptions) -> Self {
        Self {
            store,
            local,
            options,
        }
    }

    /// Upload every artifact in the working copy. Never deletes.
    pub fn full_sync(&self, revision: &str) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();
        for category in Category::APPLY_ORDER {
            let artifacts = self.local.inventory(category)?;
            if artifacts.is_empty() {
                continue;
            }
            tracing::warn!("Uploading all {} artifacts ({})", category, artifacts.len());
            self.upload(category, &artifacts, revision, &mut report)?;
        }
        Ok(report)
    }

    /// Apply the deletes and upserts of `changeset`.
    pub fn apply(&self, changeset: &Changeset) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();
        for category in Category::APPLY_ORDER {
            let changes = changeset.get(category);
            if changes.is_empty() {
                continue;
            }
            let deletes: Vec<ArtifactRef> = changes.deletes.into_iter().collect();
            let upserts: Vec<ArtifactRef> = changes.upserts.into_iter().collect();

            if !deletes.is_empty() {
                tracing::info!("Deleting {} {} artifact(s)", deletes.len(), category);
                self.delete(category, &deletes, &mut report)?;
            }
            if !upserts.is_empty() {
                tracing::info!("Uploading {} {} artifact(s)", upserts.len(), category);
                self.upload(category, &upserts, &changeset.new_revision, &mut report)?;
            }
        }
        Ok(report)
    }

    /// Upload a single node again, tagged with `revision`.
    pub fn upload_node(&self, node: &ArtifactRef, revision: &str) -> Result<()> {
        let mut report = ApplyReport::default();
        self.upload_records(Category::Node, std::slice::from_ref(node), revision, &mut report)
    }

    fn delete(
        &self,
        category: Category,
        artifacts: &[ArtifactRef],
        report: &mut ApplyReport,
    ) -> Result<()> {
        match category.kind() {
            CategoryKind::Unit => {
                for artifact in artifacts {
                    let id = naming::resolve(&artifact.name);
                    self.destroy(ObjectRef::unit(id.logical_name, id.version), report)?;
                }
            }
            CategoryKind::Record => {
                for artifact in artifacts {
                    let target = ObjectRef::record(category.collection(), &artifact.name);
                    self.destroy(target, report)?;
                }
            }
            CategoryKind::Item => {
                for (container, items) in group_by_container(artifacts) {
                    tracing::info!("Deleting {} item(s) from data bag {}", items.len(), container);
                    for (key, _) in items {
                        self.destroy(ObjectRef::item(container, key), report)?;
                    }
                    self.destroy_container_if_empty(container, report)?;
                }
            }
        }
        Ok(())
    }

    fn upload(
        &self,
        category: Category,
        artifacts: &[ArtifactRef],
        revision: &str,
        report: &mut ApplyReport,
    ) -> Result<()> {
        match category.kind() {
            CategoryKind::Unit => {
                for artifact in artifacts {
                    let unit = self.local.load_unit(artifact)?;
                    tracing::info!("Uploading cookbook {} {}", unit.name, unit.version);
                    self.save(RemoteObject::Unit(unit), report)?;
                }
                Ok(())
            }
            CategoryKind::Record => self.upload_records(category, artifacts, revision, report),
            CategoryKind::Item => {
                for (container, items) in group_by_container(artifacts) {
                    tracing::info!("Uploading {} item(s) to data bag {}", items.len(), container);
                    self.ensure_container(container, report)?;
                    for (_, artifact) in items {
                        let item = self.local.load_item(artifact)?;
                        self.save(RemoteObject::Item(item), report)?;
                    }
                }
                Ok(())
            }
        }
    }

    fn upload_records(
        &self,
        category: Category,
        artifacts: &[ArtifactRef],
        revision: &str,
        report: &mut ApplyReport,
    ) -> Result<()> {
        for artifact in artifacts {
            let mut record = self.local.load_record(category, artifact)?;
            if category.supports_checkpoint_tag() {
                set_checkpoint_tag(&mut record.body, &self.options.checkpoint_attribute, revision);
            }
            tracing::info!("Uploading {} {}", category, record.name);
            self.save(RemoteObject::Record(record), report)?;
            if category.supports_checkpoint_tag() {
                report.uploaded_nodes.push(artifact.clone());
            }
        }
        Ok(())
    }

    fn save(&self, object: RemoteObject, report: &mut ApplyReport) -> Result<()> {
        let target = object.reference();
        if self.options.dry_run {
            tracing::warn!("[DRYRUN] Would upload {}", target);
            report.push(format!("[DRYRUN] Would upload {target}"));
        } else {
            self.store.save(&object)?;
            report.push(format!("Uploaded {target}"));
        }
        report.uploaded += 1;
        Ok(())
    }

    fn destroy(&self, target: ObjectRef, report: &mut ApplyReport) -> Result<()> {
        if self.options.dry_run {
            tracing::warn!("[DRYRUN] Would delete {}", target);
            report.push(format!("[DRYRUN] Would delete {target}"));
            report.deleted += 1;
            return Ok(());
        }

        tracing::info!("Deleting {}", target);
        match self.store.destroy(&target) {
            Ok(()) => {
                report.push(format!("Deleted {target}"));
                report.deleted += 1;
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::info!("{} already absent", target);
                report.push(format!("Already absent {target}"));
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load the container, creating it when missing. Other load errors abort.
    fn ensure_container(&self, name: &str, report: &mut ApplyReport) -> Result<()> {
        if self.options.dry_run {
            tracing::warn!("[DRYRUN] Would create data bag {} if missing", name);
            report.push(format!("[DRYRUN] Would create data/{name} if missing"));
            return Ok(());
        }
        match self.store.load(&ObjectRef::container(name)) {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::info!("Creating data bag {}", name);
                self.save(
                    RemoteObject::Container(KvContainer {
                        name: name.to_string(),
                        ..Default::default()
                    }),
                    report,
                )
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reload the container and destroy it if it holds no items.
    fn destroy_container_if_empty(&self, name: &str, report: &mut ApplyReport) -> Result<()> {
        if self.options.dry_run {
            tracing::warn!("[DRYRUN] Would delete data bag {} if empty", name);
            report.push(format!("[DRYRUN] Would delete data/{name} if empty"));
            return Ok(());
        }
        let target = ObjectRef::container(name);
        match self.store.load(&target) {
            Ok(RemoteObject::Container(container)) if container.items.is_empty() => {
                tracing::info!("Data bag {} is empty", name);
                self.destroy(target, report)
            }
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Items grouped by container, as `(key, artifact)` pairs. Iteration
/// order over containers is unspecified.
fn group_by_container(artifacts: &[ArtifactRef]) -> HashMap<&str, Vec<(&str, &ArtifactRef)>> {
    let mut groups: HashMap<&str, Vec<(&str, &ArtifactRef)>> = HashMap::new();
    for artifact in artifacts {
        if let Some((container, key)) = artifact.container_item() {
            groups.entry(container).or_default().push((key, artifact));
        } else {
            tracing::debug!("Skipping {}: not inside a data bag", artifact.rel_path());
        }
    }
    groups
}
