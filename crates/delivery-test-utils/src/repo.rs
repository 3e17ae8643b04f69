//! [`TestRepo`] builder for artifact trees under version control.

use std::fs;
use std::path::{Path, PathBuf};

use git2::Repository;
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::git::{commit_all, init_repo};

/// A temporary work directory holding a git checkout of configuration
/// artifacts at `<work>/<reponame>`.
///
/// # Example
///
/// ```rust,no_run
/// use delivery_test_utils::repo::TestRepo;
///
/// let repo = TestRepo::new("ops");
/// repo.write_role("web");
/// repo.write_cookbook("nginx-v1.2.3", "1.2.3");
/// let rev = repo.commit("initial");
/// ```
pub struct TestRepo {
    temp_dir: TempDir,
    root: PathBuf,
    repo: Repository,
}

impl TestRepo {
    /// Create `<tmp>/<reponame>` and initialise it as a git repository.
    pub fn new(reponame: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join(reponame);
        fs::create_dir_all(&root).unwrap();
        let repo = init_repo(&root);
        Self {
            temp_dir,
            root,
            repo,
        }
    }

    /// The work directory holding the checkout (the delivery `master_path`).
    pub fn work_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Root of the git checkout.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn git(&self) -> &Repository {
        &self.repo
    }

    /// Write `content` at `rel`, creating parent directories.
    pub fn write(&self, rel: &str, content: &str) {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content)
            .unwrap_or_else(|e| panic!("TestRepo::write: {}: {e}", path.display()));
    }

    pub fn write_json(&self, rel: &str, value: &Value) {
        self.write(rel, &serde_json::to_string_pretty(value).unwrap());
    }

    /// Remove a file or a whole directory.
    pub fn remove(&self, rel: &str) {
        let path = self.root.join(rel);
        if path.is_dir() {
            fs::remove_dir_all(&path).unwrap();
        } else {
            fs::remove_file(&path).unwrap();
        }
    }

    /// `roles/<name>.json`
    pub fn write_role(&self, name: &str) {
        self.write_json(
            &format!("roles/{name}.json"),
            &json!({
                "name": name,
                "json_class": "Chef::Role",
                "run_list": [format!("recipe[{name}]")],
            }),
        );
    }

    /// `nodes/<name>.json`
    pub fn write_node(&self, name: &str) {
        self.write_json(
            &format!("nodes/{name}.json"),
            &json!({ "name": name, "normal": { "tags": [] } }),
        );
    }

    /// `cookbooks/<dir_name>/` with metadata and one recipe.
    pub fn write_cookbook(&self, dir_name: &str, version: &str) {
        self.write_json(
            &format!("cookbooks/{dir_name}/metadata.json"),
            &json!({ "name": dir_name, "version": version }),
        );
        self.write(
            &format!("cookbooks/{dir_name}/recipes/default.rb"),
            &format!("log '{dir_name} {version}'\n"),
        );
    }

    /// `data_bags/<bag>/<item>.json`
    pub fn write_item(&self, bag: &str, item: &str) {
        self.write_json(
            &format!("data_bags/{bag}/{item}.json"),
            &json!({ "id": item, "bag": bag }),
        );
    }

    /// Commit everything in the working tree, returning the new revision.
    pub fn commit(&self, message: &str) -> String {
        commit_all(&self.repo, message)
    }
}
