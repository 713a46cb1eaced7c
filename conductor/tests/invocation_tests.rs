//! Whole invocations against a snapshot file, the way the binary runs them.

use clap::Parser;
use conductor::{invoke, Cli, CommandError, Outcome};
use model::prelude::*;

fn cli(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("conductor").chain(args.iter().copied()))
        .expect("arguments should parse")
}

async fn run(store: &JsonFileStore, config: &ConductorConfig, args: &[&str]) -> Outcome {
    invoke(store, config, cli(args))
        .await
        .expect("command should succeed")
}

#[tokio::test]
async fn test_changes_survive_between_invocations() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("data").join("conductor.json"));
    let config = ConductorConfig::default().with_enforce_permissions(false);

    let added = run(&store, &config, &["product", "add", "Firefox", "--version", "10"]).await;
    assert!(added.changed);
    assert!(store.path().exists());

    let products = run(&store, &config, &["product", "list"]).await;
    assert!(!products.changed);
    assert!(products.output.contains("Firefox"));

    let versions = run(&store, &config, &["version", "list"]).await;
    assert_eq!(versions.output.lines().count(), 1);
    assert!(versions.output.contains("  10  "));
}

#[tokio::test]
async fn test_unchanged_registry_is_not_written() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("conductor.json"));
    let config = ConductorConfig::default();

    run(&store, &config, &["product", "list"]).await;
    assert!(!store.path().exists());

    // denied: no users exist yet, so nobody holds manage-products
    let denied = run(&store, &config, &["product", "add", "Firefox"]).await;
    assert!(!denied.changed);
    assert!(!store.path().exists());
}

#[test]
fn test_inheritance_holds_across_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("conductor.json"));
    let config = ConductorConfig::default().with_enforce_permissions(false);

    tokio_test::block_on(async {
        run(&store, &config, &["product", "add", "Firefox", "--version", "10"]).await;
        run(&store, &config, &["env", "generate", "OS=Linux,Windows"]).await;
        let registry = store.load_registry().await.unwrap();
        let pv = registry.state().productversions.iter().next().unwrap().id().to_string();
        let envs: Vec<String> = registry
            .state()
            .environments
            .iter()
            .map(|e| e.id().to_string())
            .collect();

        run(&store, &config, &["version", "add-env", &pv, &envs[0], &envs[1]]).await;
        run(&store, &config, &["run", "add", &pv, "FF10"]).await;
        run(&store, &config, &["case", "add", &pv, "Open URL"]).await;
        let registry = store.load_registry().await.unwrap();
        let run_id = registry.state().runs.iter().next().unwrap().id().to_string();
        let cv = registry.state().caseversions.iter().next().unwrap().id().to_string();

        run(&store, &config, &["run", "add-env", &run_id, &envs[0], &envs[1]]).await;
        run(&store, &config, &["case", "add-env", &cv, &envs[1]]).await;
        run(&store, &config, &["run", "include", &run_id, &cv]).await;
        run(&store, &config, &["version", "remove-env", &pv, &envs[1]]).await;

        let registry = store.load_registry().await.unwrap();
        let rcv = registry.state().runcaseversions.iter().next().unwrap();
        assert!(rcv.environments.is_empty());
        assert_eq!(registry.run(&run_id).unwrap().environments.len(), 1);
    });
}

#[tokio::test]
async fn test_unreadable_snapshot_fails_the_command() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conductor.json");
    let mut snapshot = Snapshot::new(RegistryState::default());
    snapshot.format_version = 99;
    std::fs::write(&path, serde_json::to_string(&snapshot).unwrap()).unwrap();
    let store = JsonFileStore::new(&path);

    let err = invoke(&store, &ConductorConfig::default(), cli(&["product", "list"]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CommandError::Persist(PersistError::UnsupportedFormat { found: 99, .. })
    ));
}
