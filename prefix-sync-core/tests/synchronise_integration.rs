mod common;

use std::path::{Path, PathBuf};

use common::{git, seed_origin};
use prefix_sync_core::config::{GitConfig, InventoryConfig, NetworkConfig, SyncConfig};
use prefix_sync_core::contract::{MockInventory, MockPullRequests};
use prefix_sync_core::error::{OutputError, RepositoryError, SyncError};
use prefix_sync_core::http::Response;
use prefix_sync_core::output::read_output;
use prefix_sync_core::synchronise::synchronise;
use serde_json::{json, Value};

const DC1: &str = r#"{"lookup_prefixes": {"core": {"site": "dc1"}, "edge": {"site": "dc1", "role": "edge"}}}"#;
const DC2: &str = r#"{"lookup_prefixes": {"mgmt": {"site": "dc2"}}}"#;

fn config(origin: &Path, checkout: PathBuf) -> SyncConfig {
    let mut git = GitConfig::new("acme/network-vars");
    git.repo_path = checkout;
    git.remote_url = Some(origin.to_str().expect("utf-8 path").to_string());
    git.token = "unused".to_string();
    SyncConfig {
        inventory: InventoryConfig {
            base_url: "https://netbox.invalid".to_string(),
            token: "unused".to_string(),
        },
        git,
        network: NetworkConfig::default(),
    }
}

/// Inventory that knows one prefix per site and nothing for the edge role.
fn stable_inventory() -> MockInventory {
    let mut inventory = MockInventory::new();
    inventory.expect_get_prefixes().returning(|filters| {
        if filters.get("role") == Some(&json!("edge")) {
            return Ok(json!({"count": 0, "results": []}));
        }
        let site = filters.get("site").and_then(Value::as_str).unwrap_or_default();
        let prefix = if site == "dc1" { "10.1.0.0/24" } else { "10.2.0.0/24" };
        Ok(json!({
            "count": 1,
            "results": [{"prefix": prefix, "description": format!("{site} block")}]
        }))
    });
    inventory
}

fn created_pr(expected_head: &'static str) -> MockPullRequests {
    let mut pulls = MockPullRequests::new();
    pulls
        .expect_open_pull_request()
        .withf(move |head, base| head.to_string() == expected_head && base.to_string() == "main")
        .times(1)
        .returning(|_, _| Ok(Response::new(r#"{"number":1}"#, vec![], 201, 0)));
    pulls
}

fn no_pr() -> MockPullRequests {
    let mut pulls = MockPullRequests::new();
    pulls.expect_open_pull_request().never();
    pulls
}

#[tokio::test]
async fn first_run_commits_each_changed_output_and_opens_pr() {
    let root = tempfile::tempdir().unwrap();
    let origin = seed_origin(root.path(), &[("dc1.json", DC1), ("dc2.json", DC2)]);
    let checkout = root.path().join("checkout");
    let config = config(&origin, checkout.clone());

    let report = synchronise(&config, &stable_inventory(), &created_pr("1000_auto_update"), 1000)
        .await
        .expect("sync succeeds");

    assert_eq!(report.branch, "1000_auto_update");
    assert_eq!(report.commits, 2);
    assert_eq!(report.pull_request_status, Some(201));
    assert_eq!(report.files.len(), 2);
    assert!(report.files.iter().all(|f| f.committed));

    let dc1 = read_output(&checkout.join("output/dc1.tf.json")).unwrap();
    assert_eq!(
        serde_json::to_value(&dc1).unwrap(),
        json!({"output": {"dc1_core": {"value": [{"prefix": "10.1.0.0/24", "description": "dc1 block"}]}}})
    );

    let log = git(&checkout, &["log", "--format=%s|%an", "main..1000_auto_update"]);
    assert_eq!(log.lines().collect::<Vec<_>>(), vec!["Update dc2.tf.json|Bot", "Update dc1.tf.json|Bot"]);

    // Pushed to origin, and the bot identity was not persisted.
    git(&origin, &["show-ref", "--verify", "refs/heads/1000_auto_update"]);
    let local_config = std::fs::read_to_string(checkout.join(".git/config")).unwrap();
    assert!(!local_config.contains("bot@local.com"));
}

#[tokio::test]
async fn second_run_over_unchanged_inventory_commits_nothing() {
    let root = tempfile::tempdir().unwrap();
    let origin = seed_origin(root.path(), &[("dc1.json", DC1), ("dc2.json", DC2)]);
    let checkout = root.path().join("checkout");
    let config = config(&origin, checkout.clone());

    synchronise(&config, &stable_inventory(), &created_pr("1000_auto_update"), 1000)
        .await
        .expect("first sync succeeds");
    // Merge the proposed branch as a reviewer would.
    git(&checkout, &["push", "origin", "1000_auto_update:main"]);
    // Unrelated dirt in the tree must not trigger a commit.
    std::fs::write(checkout.join("scratch.txt"), "local notes").unwrap();

    let report = synchronise(&config, &stable_inventory(), &no_pr(), 2000)
        .await
        .expect("second sync succeeds");

    assert_eq!(report.branch, "2000_auto_update");
    assert_eq!(report.commits, 0);
    assert_eq!(report.pull_request_status, None);
    assert!(report.files.iter().all(|f| !f.committed));

    let remote_branches = git(&origin, &["branch", "--list"]);
    assert!(!remote_branches.contains("2000_auto_update"));
}

#[tokio::test]
async fn only_the_changed_file_is_committed() {
    let root = tempfile::tempdir().unwrap();
    let origin = seed_origin(root.path(), &[("dc1.json", DC1), ("dc2.json", DC2)]);
    let checkout = root.path().join("checkout");
    let config = config(&origin, checkout.clone());

    synchronise(&config, &stable_inventory(), &created_pr("1000_auto_update"), 1000)
        .await
        .expect("first sync succeeds");
    git(&checkout, &["push", "origin", "1000_auto_update:main"]);

    let mut inventory = MockInventory::new();
    inventory.expect_get_prefixes().returning(|filters| {
        let site = filters.get("site").and_then(Value::as_str).unwrap_or_default();
        if site == "dc2" {
            return Ok(json!({"count": 2, "results": [
                {"prefix": "10.2.0.0/24", "description": "dc2 block"},
                {"prefix": "10.2.1.0/24", "description": "dc2 expansion"}
            ]}));
        }
        if filters.get("role") == Some(&json!("edge")) {
            return Ok(json!({"count": 0, "results": []}));
        }
        Ok(json!({"count": 1, "results": [{"prefix": "10.1.0.0/24", "description": "dc1 block"}]}))
    });

    let report = synchronise(&config, &inventory, &created_pr("3000_auto_update"), 3000)
        .await
        .expect("sync succeeds");

    assert_eq!(report.commits, 1);
    let committed: Vec<_> = report
        .files
        .iter()
        .filter(|f| f.committed)
        .map(|f| f.output.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(committed, vec!["dc2.tf.json"]);
}

#[tokio::test]
async fn pull_request_rejection_is_reported_not_raised() {
    let root = tempfile::tempdir().unwrap();
    let origin = seed_origin(root.path(), &[("dc2.json", DC2)]);
    let config = config(&origin, root.path().join("checkout"));

    let mut pulls = MockPullRequests::new();
    pulls
        .expect_open_pull_request()
        .times(1)
        .returning(|_, _| Ok(Response::new("Unprocessable Entity", vec![], 422, 1)));

    let report = synchronise(&config, &stable_inventory(), &pulls, 4000)
        .await
        .expect("sync completes");
    assert_eq!(report.commits, 1);
    assert_eq!(report.pull_request_status, Some(422));
}

#[tokio::test]
async fn occupied_clone_path_is_a_typed_error() {
    let root = tempfile::tempdir().unwrap();
    let origin = seed_origin(root.path(), &[("dc1.json", DC1)]);
    let occupied = root.path().join("occupied");
    std::fs::create_dir_all(&occupied).unwrap();
    std::fs::write(occupied.join("leftover.txt"), "not a repo").unwrap();

    let mut inventory = MockInventory::new();
    inventory.expect_get_prefixes().never();

    let err = synchronise(&config(&origin, occupied), &inventory, &no_pr(), 5000)
        .await
        .unwrap_err();
    assert!(
        matches!(err, SyncError::Repository(RepositoryError::NotARepository(_))),
        "got {err:?}"
    );
}

#[tokio::test]
async fn inventory_failure_aborts_before_anything_is_committed() {
    let root = tempfile::tempdir().unwrap();
    let origin = seed_origin(root.path(), &[("dc1.json", DC1), ("dc2.json", DC2)]);
    let checkout = root.path().join("checkout");
    let config = config(&origin, checkout.clone());

    synchronise(&config, &stable_inventory(), &created_pr("1000_auto_update"), 1000)
        .await
        .expect("first sync succeeds");
    git(&checkout, &["push", "origin", "1000_auto_update:main"]);

    // A rejected token: every query answers with a non-JSON error body.
    let mut inventory = MockInventory::new();
    inventory
        .expect_get_prefixes()
        .returning(|_| Ok(Value::String(String::new())));

    let err = synchronise(&config, &inventory, &no_pr(), 2000)
        .await
        .unwrap_err();
    assert!(
        matches!(
            &err,
            SyncError::Output(OutputError::UnexpectedPayload { lookup, .. }) if lookup == "core"
        ),
        "got {err:?}"
    );

    let log = git(&checkout, &["log", "--format=%s", "main..2000_auto_update"]);
    assert!(log.trim().is_empty(), "unexpected commits: {log}");
    let remote_branches = git(&origin, &["branch", "--list"]);
    assert!(!remote_branches.contains("2000_auto_update"));
    let dc1 = read_output(&checkout.join("output/dc1.tf.json")).unwrap();
    assert_eq!(dc1.get("dc1_core").unwrap().value[0].prefix, "10.1.0.0/24");
}
