//! Revision differ: changed repository paths to artifact-level records

use std::collections::{HashMap, HashSet};
use std::vec;

use delivery_git::{PathChange, PathStatus, VcsProvider};

use crate::Result;
use crate::category::{Category, CategoryKind, Layout};
use crate::changeset::{ChangeRecord, ChangeStatus};

/// Computes [`ChangeRecord`]s between two revisions of a repository.
pub struct RevisionDiffer<'a> {
    vcs: &'a dyn VcsProvider,
    layout: &'a Layout,
}

impl<'a> RevisionDiffer<'a> {
    pub fn new(vcs: &'a dyn VcsProvider, layout: &'a Layout) -> Self {
        Self { vcs, layout }
    }

    /// Changes from `old` to `new` in the configured category directories.
    ///
    /// # Errors
    ///
    /// Fails with a reference error when either revision does not resolve.
    /// Records are produced lazily; checking whether a unit still exists at
    /// `new` can fail while iterating.
    pub fn diff(&self, old: &str, new: &str) -> Result<ChangeRecords<'a>> {
        tracing::debug!("Diffing {} against {}", old, new);
        let paths = self
            .vcs
            .changed_paths(old, new, &self.layout.all_dirs())?;
        Ok(ChangeRecords {
            vcs: self.vcs,
            layout: self.layout,
            new: new.to_string(),
            paths: paths.into_iter(),
            seen: HashSet::new(),
            unit_exists: HashMap::new(),
        })
    }
}

/// Lazy, single-pass sequence of change records.
pub struct ChangeRecords<'a> {
    vcs: &'a dyn VcsProvider,
    layout: &'a Layout,
    new: String,
    paths: vec::IntoIter<PathChange>,
    seen: HashSet<ChangeRecord>,
    unit_exists: HashMap<String, bool>,
}

impl ChangeRecords<'_> {
    fn record_for(&mut self, change: &PathChange) -> Result<Option<ChangeRecord>> {
        let Some((category, root, rest)) = locate(self.layout, change) else {
            return Ok(None);
        };
        let segments: Vec<&str> = rest.split('/').collect();

        let record = match category.kind() {
            CategoryKind::Unit => {
                // Loose files next to unit directories are not units
                let [unit, _, ..] = segments.as_slice() else {
                    return Ok(None);
                };
                let unit_path = format!("{root}/{unit}");
                let status = match change.status {
                    PathStatus::Deleted if !self.unit_exists_at_new(&unit_path)? => {
                        ChangeStatus::Deleted
                    }
                    _ => ChangeStatus::Modified,
                };
                ChangeRecord::new(category, root, *unit, status)
            }
            CategoryKind::Record => match segments.as_slice() {
                [file] => match json_stem(file) {
                    Some(stem) => ChangeRecord::new(category, root, stem, status_of(change)),
                    None => return Ok(None),
                },
                _ => return Ok(None),
            },
            CategoryKind::Item => match segments.as_slice() {
                [container, file] => match json_stem(file) {
                    Some(stem) => ChangeRecord::new(
                        category,
                        root,
                        format!("{container}/{stem}"),
                        status_of(change),
                    ),
                    None => return Ok(None),
                },
                _ => return Ok(None),
            },
        };
        Ok(Some(record))
    }

    fn unit_exists_at_new(&mut self, unit_path: &str) -> Result<bool> {
        if let Some(exists) = self.unit_exists.get(unit_path) {
            return Ok(*exists);
        }
        let exists = self.vcs.dir_exists_at(&self.new, unit_path)?;
        self.unit_exists.insert(unit_path.to_string(), exists);
        Ok(exists)
    }
}

impl Iterator for ChangeRecords<'_> {
    type Item = Result<ChangeRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let change = self.paths.next()?;
            match self.record_for(&change) {
                Ok(Some(record)) => {
                    if self.seen.insert(record.clone()) {
                        return Some(Ok(record));
                    }
                }
                Ok(None) => {
                    tracing::debug!("Ignoring {}", change.path);
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Category, category directory and remainder for a changed path.
fn locate<'p>(layout: &Layout, change: &'p PathChange) -> Option<(Category, String, &'p str)> {
    layout.iter().find_map(|(category, dir)| {
        change
            .path
            .strip_prefix(dir)
            .map(|rest| (category, dir.to_string(), rest))
    })
}

fn json_stem(file: &str) -> Option<&str> {
    file.strip_suffix(".json").filter(|s| !s.is_empty())
}

fn status_of(change: &PathChange) -> ChangeStatus {
    match change.status {
        PathStatus::Deleted => ChangeStatus::Deleted,
        PathStatus::Added | PathStatus::Modified => ChangeStatus::Modified,
    }
}
