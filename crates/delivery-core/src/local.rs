//! Loading artifacts from the working copy

use std::fs;
use std::sync::LazyLock;

use delivery_fs::{NormalizedPath, checksum, io};
use delivery_store::{KvContainerItem, PackagedUnit, SimpleRecord, UnitFile};
use regex::Regex;
use serde_json::{Map, Value};

use crate::category::{Category, CategoryKind, Layout};
use crate::changeset::ArtifactRef;
use crate::naming;
use crate::{Error, Result};

const DEFAULT_VERSION: &str = "0.0.0";

static RB_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*name\s+['"]([^'"]+)['"]"#).unwrap());
static RB_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*version\s+['"]([^'"]+)['"]"#).unwrap());

/// Read access to the artifacts of a checked-out repository.
#[derive(Debug, Clone)]
pub struct LocalRepo {
    root: NormalizedPath,
    layout: Layout,
}

impl LocalRepo {
    pub fn new(root: NormalizedPath, layout: Layout) -> Self {
        Self { root, layout }
    }

    pub fn root(&self) -> &NormalizedPath {
        &self.root
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    fn json_file(&self, artifact: &ArtifactRef) -> NormalizedPath {
        self.root.join(&format!("{}.json", artifact.rel_path()))
    }

    fn read_json(&self, path: &NormalizedPath) -> Result<Value> {
        let content = io::read_text(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::artifact(path.to_native(), format!("invalid JSON: {e}")))
    }

    /// Load a plain record of `category`.
    pub fn load_record(&self, category: Category, artifact: &ArtifactRef) -> Result<SimpleRecord> {
        let path = self.json_file(artifact);
        let body = self.read_json(&path)?;
        if !body.is_object() {
            return Err(Error::artifact(path.to_native(), "expected a JSON object"));
        }
        Ok(SimpleRecord {
            collection: category.collection(),
            name: artifact.name.clone(),
            body,
        })
    }

    /// Load one key/value item.
    pub fn load_item(&self, artifact: &ArtifactRef) -> Result<KvContainerItem> {
        let path = self.json_file(artifact);
        let (container, key) = artifact
            .container_item()
            .ok_or_else(|| Error::artifact(path.to_native(), "item outside a container"))?;
        let payload = self.read_json(&path)?;
        Ok(KvContainerItem {
            container: container.to_string(),
            key: key.to_string(),
            payload,
        })
    }

    /// Load a unit directory with all its files.
    ///
    /// The logical name always comes from the directory; the version comes
    /// from metadata, then from the directory suffix, then defaults to
    /// `0.0.0`.
    pub fn load_unit(&self, artifact: &ArtifactRef) -> Result<PackagedUnit> {
        let dir = self.root.join(&artifact.rel_path());
        if !dir.is_dir() {
            return Err(Error::artifact(dir.to_native(), "unit directory not found"));
        }

        let identity = naming::resolve(&artifact.name);
        let mut metadata = self.unit_metadata(&dir)?;
        let version = metadata
            .get("version")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or(identity.version)
            .unwrap_or_else(|| DEFAULT_VERSION.to_string());

        metadata.insert("name".into(), Value::String(identity.logical_name.clone()));
        metadata.insert("version".into(), Value::String(version.clone()));

        let mut files = Vec::new();
        collect_files(&dir, &dir, &mut files)?;

        Ok(PackagedUnit {
            name: identity.logical_name,
            version,
            metadata: Value::Object(metadata),
            files,
        })
    }

    fn unit_metadata(&self, dir: &NormalizedPath) -> Result<Map<String, Value>> {
        let json_path = dir.join("metadata.json");
        if json_path.is_file() {
            return match self.read_json(&json_path)? {
                Value::Object(map) => Ok(map),
                _ => Err(Error::artifact(
                    json_path.to_native(),
                    "expected a JSON object",
                )),
            };
        }

        let mut map = Map::new();
        if let Some(rb) = io::read_text_if_exists(&dir.join("metadata.rb"))? {
            for (key, re) in [("name", &*RB_NAME), ("version", &*RB_VERSION)] {
                if let Some(caps) = re.captures(&rb) {
                    map.insert(key.into(), Value::String(caps[1].to_string()));
                }
            }
        }
        Ok(map)
    }

    /// Every artifact of `category` present in the working copy, sorted.
    pub fn inventory(&self, category: Category) -> Result<Vec<ArtifactRef>> {
        let mut found = Vec::new();
        for root in self.layout.dirs(category) {
            let dir = self.root.join(root);
            match category.kind() {
                CategoryKind::Unit => {
                    for name in list_dir(&dir, EntryKind::Dir)? {
                        found.push(ArtifactRef::new(root.as_str(), name));
                    }
                }
                CategoryKind::Record => {
                    for stem in json_stems(&dir)? {
                        found.push(ArtifactRef::new(root.as_str(), stem));
                    }
                }
                CategoryKind::Item => {
                    for container in list_dir(&dir, EntryKind::Dir)? {
                        for key in json_stems(&dir.join(&container))? {
                            found.push(ArtifactRef::new(
                                root.as_str(),
                                format!("{container}/{key}"),
                            ));
                        }
                    }
                }
            }
        }
        found.sort();
        Ok(found)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Dir,
    File,
}

/// Sorted names of non-hidden entries of one kind; a missing directory is empty.
fn list_dir(dir: &NormalizedPath, kind: EntryKind) -> Result<Vec<String>> {
    let native = dir.to_native();
    let entries = match fs::read_dir(&native) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(delivery_fs::Error::io(native, e).into()),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        let is_dir = entry.file_type()?.is_dir();
        if is_dir == (kind == EntryKind::Dir) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

fn json_stems(dir: &NormalizedPath) -> Result<Vec<String>> {
    Ok(list_dir(dir, EntryKind::File)?
        .into_iter()
        .filter_map(|name| name.strip_suffix(".json").map(str::to_string))
        .filter(|stem| !stem.is_empty())
        .collect())
}

fn collect_files(base: &NormalizedPath, dir: &NormalizedPath, out: &mut Vec<UnitFile>) -> Result<()> {
    for name in list_dir(dir, EntryKind::Dir)? {
        collect_files(base, &dir.join(&name), out)?;
    }
    for name in list_dir(dir, EntryKind::File)? {
        let path = dir.join(&name);
        let (content, checksum) = checksum::read_with_checksum(path.as_ref())?;
        let rel = path.strip_prefix(base.as_str()).unwrap_or(&name).to_string();
        out.push(UnitFile {
            path: rel,
            checksum,
            content,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn repo() -> (TempDir, LocalRepo) {
        let dir = TempDir::new().unwrap();
        let local = LocalRepo::new(NormalizedPath::new(dir.path()), Layout::default());
        (dir, local)
    }

    fn write(dir: &TempDir, rel: &str, content: &str) {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn unit_name_from_directory_version_from_metadata() {
        let (dir, local) = repo();
        write(&dir, "cookbooks/nginx-v1.0.0/metadata.json", r#"{"name":"other","version":"2.0.0"}"#);
        write(&dir, "cookbooks/nginx-v1.0.0/recipes/default.rb", "package 'nginx'\n");

        let unit = local
            .load_unit(&ArtifactRef::new("cookbooks", "nginx-v1.0.0"))
            .unwrap();
        assert_eq!(unit.name, "nginx");
        assert_eq!(unit.version, "2.0.0");
        assert_eq!(unit.metadata["name"], "nginx");

        let paths: Vec<&str> = unit.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["recipes/default.rb", "metadata.json"]);
        assert!(unit.files[0].checksum.starts_with("sha256:"));
    }

    #[test]
    fn unit_version_falls_back_to_directory_then_default() {
        let (dir, local) = repo();
        write(&dir, "cookbooks/base-v3.1.4/recipes/default.rb", "");
        write(&dir, "cookbooks/plain/recipes/default.rb", "");

        let versioned = local.load_unit(&ArtifactRef::new("cookbooks", "base-v3.1.4")).unwrap();
        assert_eq!(versioned.version, "3.1.4");
        let plain = local.load_unit(&ArtifactRef::new("cookbooks", "plain")).unwrap();
        assert_eq!(plain.version, "0.0.0");
    }

    #[test]
    fn unit_metadata_rb_is_read() {
        let (dir, local) = repo();
        write(
            &dir,
            "cookbooks/apache/metadata.rb",
            "name 'apache'\nmaintainer 'ops'\nversion '1.4.0'\n",
        );
        let unit = local.load_unit(&ArtifactRef::new("cookbooks", "apache")).unwrap();
        assert_eq!(unit.version, "1.4.0");
    }

    #[test]
    fn missing_unit_directory_is_an_artifact_error() {
        let (_dir, local) = repo();
        let err = local.load_unit(&ArtifactRef::new("cookbooks", "ghost")).unwrap_err();
        assert!(matches!(err, Error::LocalArtifact { .. }));
    }

    #[test]
    fn record_must_be_an_object() {
        let (dir, local) = repo();
        write(&dir, "roles/web.json", r#"{"name":"web"}"#);
        write(&dir, "roles/bad.json", "[1, 2]");

        let web = local
            .load_record(Category::Role, &ArtifactRef::new("roles", "web"))
            .unwrap();
        assert_eq!(web.body, json!({"name": "web"}));
        assert!(local.load_record(Category::Role, &ArtifactRef::new("roles", "bad")).is_err());
    }

    #[test]
    fn item_key_comes_from_file_name() {
        let (dir, local) = repo();
        write(&dir, "data_bags/alerts/high.json", r#"{"id":"high","level":3}"#);
        let item = local.load_item(&ArtifactRef::new("data_bags", "alerts/high")).unwrap();
        assert_eq!(item.container, "alerts");
        assert_eq!(item.key, "high");
        assert_eq!(item.payload["level"], 3);
    }

    #[test]
    fn inventory_lists_each_kind() {
        let (dir, local) = repo();
        write(&dir, "cookbooks/a/metadata.json", "{}");
        write(&dir, "cookbooks/b/metadata.json", "{}");
        write(&dir, "cookbooks/README.md", "");
        write(&dir, "roles/web.json", "{}");
        write(&dir, "roles/notes.txt", "");
        write(&dir, "data_bags/alerts/high.json", "{}");
        write(&dir, "data_bags/alerts/low.json", "{}");

        let names = |c| -> Vec<String> {
            local.inventory(c).unwrap().into_iter().map(|a| a.name).collect()
        };
        assert_eq!(names(Category::Cookbook), vec!["a", "b"]);
        assert_eq!(names(Category::Role), vec!["web"]);
        assert_eq!(names(Category::DataBag), vec!["alerts/high", "alerts/low"]);
        assert!(names(Category::Node).is_empty());
    }
}
