//! Change records and their classification into a changeset
//!
//! The differ reports one [`ChangeRecord`] per artifact touched between two
//! revisions. [`classify`] folds those into per-category delete and upsert
//! sets, which is the shape the applier consumes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::category::Category;

/// How an artifact changed between two revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
}

impl ChangeStatus {
    /// Whether the artifact exists at the newer revision.
    pub fn is_upsert(&self) -> bool {
        !matches!(self, Self::Deleted)
    }
}

/// An artifact inside a category directory.
///
/// `name` is the unit directory for units, the file stem for records and
/// `<container>/<item>` for key/value items.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub root: String,
    pub name: String,
}

impl ArtifactRef {
    pub fn new(root: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
        }
    }

    /// Repository-relative path of the artifact, without any extension.
    pub fn rel_path(&self) -> String {
        format!("{}/{}", self.root, self.name)
    }

    /// Split an item name into `(container, key)`.
    pub fn container_item(&self) -> Option<(&str, &str)> {
        self.name.split_once('/')
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// One artifact-level change reported by the differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChangeRecord {
    pub category: Category,
    pub artifact: ArtifactRef,
    pub status: ChangeStatus,
}

impl ChangeRecord {
    pub fn new(
        category: Category,
        root: impl Into<String>,
        name: impl Into<String>,
        status: ChangeStatus,
    ) -> Self {
        Self {
            category,
            artifact: ArtifactRef::new(root, name),
            status,
        }
    }
}

/// Delete and upsert sets for one category. The two sets are disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryChanges {
    pub deletes: BTreeSet<ArtifactRef>,
    pub upserts: BTreeSet<ArtifactRef>,
}

impl CategoryChanges {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.upserts.is_empty()
    }
}

/// Categorized changes between a checkpoint and the new revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Changeset {
    pub new_revision: String,
    categories: BTreeMap<Category, CategoryChanges>,
}

impl Changeset {
    pub fn new(new_revision: impl Into<String>) -> Self {
        Self {
            new_revision: new_revision.into(),
            categories: BTreeMap::new(),
        }
    }

    /// Changes for `category`; empty if nothing changed.
    pub fn get(&self, category: Category) -> CategoryChanges {
        self.categories.get(&category).cloned().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.values().all(CategoryChanges::is_empty)
    }

    /// Total number of artifacts to delete or upsert.
    pub fn len(&self) -> usize {
        self.categories
            .values()
            .map(|c| c.deletes.len() + c.upserts.len())
            .sum()
    }

    /// One line per non-empty set, e.g. `Deleted cookbook: bar`.
    pub fn summary(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for category in Category::APPLY_ORDER {
            let Some(changes) = self.categories.get(&category) else {
                continue;
            };
            for (label, set) in [("Added", &changes.upserts), ("Deleted", &changes.deletes)] {
                if !set.is_empty() {
                    let names: Vec<&str> = set.iter().map(|a| a.name.as_str()).collect();
                    lines.push(format!("{label} {category}: {}", names.join(", ")));
                }
            }
        }
        lines
    }

    fn insert(&mut self, record: ChangeRecord) {
        let changes = self.categories.entry(record.category).or_default();
        if record.status.is_upsert() {
            // The artifact exists at the new revision, so it is never deleted
            changes.deletes.remove(&record.artifact);
            changes.upserts.insert(record.artifact);
        } else if !changes.upserts.contains(&record.artifact) {
            changes.deletes.insert(record.artifact);
        }
    }
}

/// Partition change records by category and status.
///
/// The result does not depend on record order. An artifact reported both
/// deleted and changed lands in the upsert set only.
pub fn classify(
    new_revision: impl Into<String>,
    records: impl IntoIterator<Item = ChangeRecord>,
) -> Changeset {
    let mut changeset = Changeset::new(new_revision);
    for record in records {
        changeset.insert(record);
    }
    changeset
}
