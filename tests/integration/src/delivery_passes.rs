//! End-to-end delivery passes
//!
//! Each test drives the real git provider against an upstream repository
//! (cloned on the first pass, fast-forwarded afterwards) and delivers into
//! the in-memory store.

use std::path::PathBuf;
use std::sync::Arc;

use delivery_core::{CheckpointStore, DeliveryConfig, PassStatus, SyncEngine};
use delivery_git::GitRepository;
use delivery_store::{CallKind, Collection, MemoryStore};
use delivery_test_utils::repo::TestRepo;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

struct Delivery {
    upstream: TestRepo,
    work: TempDir,
    store: Arc<MemoryStore>,
    config: DeliveryConfig,
}

impl Delivery {
    fn new() -> Self {
        let upstream = TestRepo::new("upstream");
        let work = TempDir::new().unwrap();
        let config = DeliveryConfig {
            master_path: work.path().to_path_buf(),
            repo_url: Some(upstream.root().to_string_lossy().to_string()),
            lockfile: work.path().join("lock"),
            pidfile: work.path().join("pid"),
            ..Default::default()
        };
        Self {
            upstream,
            work,
            store: Arc::new(MemoryStore::new()),
            config,
        }
    }

    fn pass(&self) -> delivery_core::PassResult {
        let vcs = GitRepository::new(self.config.repo_path());
        SyncEngine::from_config(&self.config, Box::new(vcs), Box::new(self.store.clone())).run()
    }

    fn checkpoint(&self) -> Option<String> {
        CheckpointStore::new(self.config.checkpoint_path())
            .read()
            .unwrap()
    }

    fn checkout_path(&self) -> PathBuf {
        self.work.path().join("ops")
    }

    fn mutations(&self) -> Vec<String> {
        self.store
            .calls()
            .into_iter()
            .filter(|c| matches!(c.kind, CallKind::Save | CallKind::Destroy))
            .map(|c| c.to_string())
            .collect()
    }
}

#[test]
fn first_pass_clones_and_uploads_everything() {
    let d = Delivery::new();
    d.upstream.write_cookbook("apache", "1.0.0");
    d.upstream.write_cookbook("base", "1.0.0");
    d.upstream.write_cookbook("nginx-v1.2.3", "1.2.3");
    d.upstream.write_role("web");
    d.upstream.write_role("db");
    d.upstream.write_item("alerts", "high");
    d.upstream.write_item("alerts", "low");
    let head = d.upstream.commit("initial");

    let result = d.pass();

    assert!(result.is_success(), "{}", result.message);
    assert_eq!(result.revision.as_deref(), Some(head.as_str()));
    assert!(d.checkout_path().join("roles/web.json").exists());
    assert_eq!(d.store.calls_of(CallKind::Save).len(), 3 + 2 + 1 + 2);
    assert!(d.store.calls_of(CallKind::Destroy).is_empty());
    assert_eq!(d.store.unit_versions("nginx"), vec!["1.2.3"]);
    assert_eq!(d.checkpoint(), Some(head));
}

#[test]
fn second_pass_applies_only_the_difference() {
    let d = Delivery::new();
    d.upstream.write_cookbook("bar", "1.0.0");
    d.upstream.write_cookbook("nginx", "1.0.0");
    d.upstream.write_role("web");
    d.upstream.write_item("alerts", "high");
    d.upstream.write_item("alerts", "low");
    d.upstream.commit("initial");
    assert!(d.pass().is_success());
    d.store.clear_calls();

    d.upstream.remove("cookbooks/bar");
    d.upstream.write_json("roles/web.json", &json!({ "name": "web", "run_list": ["recipe[nginx]"] }));
    d.upstream.remove("data_bags/alerts/low.json");
    d.upstream.write_node("host1");
    let head = d.upstream.commit("second");

    let result = d.pass();

    assert!(result.is_success(), "{}", result.message);
    assert_eq!(
        d.mutations(),
        vec![
            "destroy cookbooks/bar",
            "save roles/web",
            "destroy data/alerts/low",
            "save nodes/host1",
        ]
    );
    assert!(d.store.unit_versions("bar").is_empty());
    assert_eq!(d.store.unit_versions("nginx"), vec!["1.0.0"]);
    assert_eq!(d.store.container_items("alerts"), Some(vec!["high".to_string()]));

    let node = d.store.record(Collection::Nodes, "host1").unwrap();
    assert_eq!(node["normal"]["delivery"]["checkpoint"], json!(head));
    assert!(result.unverified.is_empty());
    assert_eq!(d.checkpoint(), Some(head));
}

#[test]
fn file_removed_inside_a_unit_reuploads_it() {
    let d = Delivery::new();
    d.upstream.write_cookbook("nginx", "1.0.0");
    d.upstream.write("cookbooks/nginx/recipes/extra.rb", "log 'extra'\n");
    d.upstream.commit("initial");
    assert!(d.pass().is_success());
    d.store.clear_calls();

    d.upstream.remove("cookbooks/nginx/recipes/extra.rb");
    d.upstream.commit("drop extra recipe");
    let result = d.pass();

    assert!(result.is_success(), "{}", result.message);
    assert_eq!(d.mutations(), vec!["save cookbooks/nginx/1.0.0"]);
    let unit = d.store.unit("nginx", "1.0.0").unwrap();
    assert!(unit.files.iter().all(|f| f.path != "recipes/extra.rb"));
}

#[test]
fn renamed_role_is_deleted_and_uploaded() {
    let d = Delivery::new();
    d.upstream.write_role("web");
    d.upstream.commit("initial");
    assert!(d.pass().is_success());
    d.store.clear_calls();

    d.upstream.remove("roles/web.json");
    d.upstream.write_role("frontend");
    d.upstream.commit("rename web");
    let result = d.pass();

    assert!(result.is_success(), "{}", result.message);
    assert_eq!(d.mutations(), vec!["destroy roles/web", "save roles/frontend"]);
    assert!(d.store.record(Collection::Roles, "web").is_none());
}

#[test]
fn emptied_container_is_destroyed() {
    let d = Delivery::new();
    d.upstream.write_item("alerts", "high");
    d.upstream.write_role("web");
    d.upstream.commit("initial");
    assert!(d.pass().is_success());

    d.upstream.remove("data_bags/alerts");
    d.upstream.commit("drop alerts");
    let result = d.pass();

    assert!(result.is_success(), "{}", result.message);
    assert_eq!(d.store.container_items("alerts"), None);
}

#[test]
fn unchanged_upstream_makes_no_calls() {
    let d = Delivery::new();
    d.upstream.write_role("web");
    let head = d.upstream.commit("initial");
    assert!(d.pass().is_success());
    d.store.clear_calls();

    let result = d.pass();

    assert!(result.is_success());
    assert_eq!(result.message, format!("Success at {head}"));
    assert!(d.store.calls().is_empty());
}

#[test]
fn unknown_checkpoint_aborts_and_is_kept() {
    let d = Delivery::new();
    d.upstream.write_role("web");
    d.upstream.commit("initial");
    assert!(d.pass().is_success());
    d.store.clear_calls();

    let bogus = "0123456789abcdef0123456789abcdef01234567";
    CheckpointStore::new(d.config.checkpoint_path())
        .write(bogus)
        .unwrap();
    d.upstream.write_role("db");
    d.upstream.commit("add db");

    let result = d.pass();

    assert_eq!(result.status, PassStatus::Failure);
    assert!(d.mutations().is_empty());
    assert_eq!(d.checkpoint().as_deref(), Some(bogus));
}

#[test]
fn failed_pass_is_retried_in_full() {
    let d = Delivery::new();
    d.upstream.write_cookbook("bar", "1.0.0");
    d.upstream.write_role("web");
    let first = d.upstream.commit("initial");
    assert!(d.pass().is_success());

    d.upstream.remove("cookbooks/bar");
    d.upstream.write_json("roles/web.json", &json!({ "name": "web", "description": "v2" }));
    let second = d.upstream.commit("second");

    d.store.fail_on(CallKind::Save, "roles/web");
    d.store.clear_calls();
    let failed = d.pass();
    assert_eq!(failed.status, PassStatus::Failure);
    assert_eq!(d.checkpoint(), Some(first));

    d.store.clear_failures();
    d.store.clear_calls();
    let retried = d.pass();

    assert!(retried.is_success(), "{}", retried.message);
    assert_eq!(d.mutations(), vec!["destroy cookbooks/bar", "save roles/web"]);
    let web = d.store.record(Collection::Roles, "web").unwrap();
    assert_eq!(web["description"], "v2");
    assert_eq!(d.checkpoint(), Some(second));
}

#[test]
fn unit_directory_replaced_by_file_is_deleted() {
    let d = Delivery::new();
    d.upstream.write_cookbook("nginx", "1.0.0");
    d.upstream.write_role("web");
    d.upstream.commit("initial");
    assert!(d.pass().is_success());
    d.store.clear_calls();

    d.upstream.remove("cookbooks/nginx");
    d.upstream.write("cookbooks/nginx", "moved to a separate repository\n");
    let head = d.upstream.commit("retire nginx");
    let result = d.pass();

    assert!(result.is_success(), "{}", result.message);
    assert_eq!(d.mutations(), vec!["destroy cookbooks/nginx"]);
    assert!(d.store.unit_versions("nginx").is_empty());
    assert_eq!(d.checkpoint(), Some(head));
}
