use clap::Parser;
use conductor::{Cli, CommandError, Commands, Outcome, Session};
use model::prelude::*;
use std::collections::BTreeSet;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("conductor").chain(args.iter().copied()))
        .expect("arguments should parse")
}

fn exec(registry: &mut Registry, config: &ConductorConfig, args: &[&str]) -> Result<Outcome, CommandError> {
    let cli = parse(args);
    Session::new(registry, config, cli.user.clone()).execute(cli.command)
}

fn ok(registry: &mut Registry, config: &ConductorConfig, args: &[&str]) -> Outcome {
    exec(registry, config, args).expect("command should succeed")
}

/// Admin and tester users, one product version with two OS environments.
fn fixture(config: &ConductorConfig) -> Registry {
    let mut registry = Registry::new();
    let mut all = vec!["user", "add", "admin"];
    for permission in Permission::ALL {
        all.push("--permission");
        all.push(permission.as_str());
    }
    ok(&mut registry, config, &all);
    ok(
        &mut registry,
        config,
        &["user", "add", "tester", "--permission", "execute", "--user", "admin"],
    );
    ok(
        &mut registry,
        config,
        &["product", "add", "Firefox", "--version", "10", "--user", "admin"],
    );
    ok(
        &mut registry,
        config,
        &["env", "generate", "OS=Linux,Windows", "--user", "admin"],
    );
    registry
}

fn as_admin(registry: &mut Registry, config: &ConductorConfig, args: &[&str]) -> Outcome {
    let mut full = args.to_vec();
    full.extend(["--user", "admin"]);
    ok(registry, config, &full)
}

fn ids<'a, T: Entity + 'a>(rows: impl Iterator<Item = &'a T>) -> Vec<String> {
    rows.map(|row| row.id().to_string()).collect()
}

#[test]
fn test_parse_global_options() {
    let cli = parse(&[
        "--config",
        "other.toml",
        "product",
        "list",
        "-p",
        "filter-name=fire",
        "--user",
        "admin",
    ]);
    assert_eq!(cli.config, std::path::PathBuf::from("other.toml"));
    assert_eq!(cli.user.as_deref(), Some("admin"));
    assert!(cli.data.is_none());
    assert!(matches!(cli.command, Commands::Product(_)));
}

#[test]
fn test_parse_rejects_bad_arguments() {
    let bad: [&[&str]; 4] = [
        &["conductor", "env", "add", "Linux"],
        &["conductor", "user", "add", "bob", "--permission", "root"],
        &["conductor", "result", "fail", "abc", "--step", "two"],
        &["conductor", "product", "list", "-p", "sortfield"],
    ];
    for args in bad {
        assert!(Cli::try_parse_from(args).is_err(), "{args:?} should not parse");
    }
}

#[test]
fn test_missing_permission_redirects_to_login() {
    let config = ConductorConfig::default();
    let mut registry = fixture(&config);

    let anonymous = ok(&mut registry, &config, &["product", "add", "Thunderbird"]);
    assert!(!anonymous.changed);
    assert!(anonymous.output.contains("/account/login/?next="));

    let tester = ok(
        &mut registry,
        &config,
        &["product", "add", "Thunderbird", "--user", "tester"],
    );
    assert!(!tester.changed);
    assert_eq!(registry.state().products.len(), 1);
}

#[test]
fn test_enforcement_can_be_disabled() {
    let config = ConductorConfig::default().with_enforce_permissions(false);
    let mut registry = Registry::new();

    let outcome = ok(&mut registry, &config, &["product", "add", "Thunderbird"]);

    assert!(outcome.changed);
    assert_eq!(registry.state().products.len(), 1);
}

#[test]
fn test_inheritance_through_commands() {
    let config = ConductorConfig::default();
    let mut registry = fixture(&config);
    let pv = ids(registry.state().productversions.iter()).remove(0);
    let envs = ids(registry.state().environments.iter());
    let (linux, windows) = (&envs[0][..8], &envs[1][..8]);

    as_admin(&mut registry, &config, &["version", "add-env", &pv, linux, windows]);
    as_admin(&mut registry, &config, &["run", "add", &pv, "FF10"]);
    as_admin(&mut registry, &config, &["case", "add", &pv, "Open URL"]);
    let run = ids(registry.state().runs.iter()).remove(0);
    let cv = ids(registry.state().caseversions.iter()).remove(0);

    as_admin(&mut registry, &config, &["run", "add-env", &run[..8], linux, windows]);
    as_admin(&mut registry, &config, &["case", "add-env", &cv[..8], windows]);
    let included = as_admin(&mut registry, &config, &["run", "include", &run, &cv]);
    assert!(included.output.contains("1 environment(s)"));

    let rcv = ids(registry.state().runcaseversions.iter()).remove(0);
    assert_eq!(
        registry.runcaseversion(&rcv).unwrap().environments,
        BTreeSet::from([envs[1].clone()])
    );

    // additions never reach the run case version
    as_admin(&mut registry, &config, &["case", "add-env", &cv, linux]);
    assert_eq!(registry.runcaseversion(&rcv).unwrap().environments.len(), 1);

    // removals cascade from the product version
    as_admin(&mut registry, &config, &["version", "remove-env", &pv, windows]);
    assert!(registry.runcaseversion(&rcv).unwrap().environments.is_empty());
    assert_eq!(registry.run(&run).unwrap().environments.len(), 1);
}

#[test]
fn test_recording_and_reporting() {
    let config = ConductorConfig::default();
    let mut registry = fixture(&config);
    let pv = ids(registry.state().productversions.iter()).remove(0);
    let envs = ids(registry.state().environments.iter());

    as_admin(&mut registry, &config, &["version", "add-env", &pv, &envs[0], &envs[1]]);
    as_admin(&mut registry, &config, &["run", "add", &pv, "FF10"]);
    as_admin(&mut registry, &config, &["case", "add", &pv, "Open URL"]);
    let run_id = ids(registry.state().runs.iter()).remove(0);
    let cv = ids(registry.state().caseversions.iter()).remove(0);
    as_admin(&mut registry, &config, &["case", "step", &cv, "Type a URL", "--expected", "Page loads"]);
    as_admin(&mut registry, &config, &["run", "add-env", &run_id, &envs[0], &envs[1]]);
    as_admin(&mut registry, &config, &["case", "add-env", &cv, &envs[0], &envs[1]]);
    as_admin(&mut registry, &config, &["run", "activate", &run_id]);
    as_admin(&mut registry, &config, &["run", "include", &run_id, &cv]);
    let rcv = ids(registry.state().runcaseversions.iter()).remove(0);

    let started = ok(
        &mut registry,
        &config,
        &["result", "start", &rcv, &envs[0], "--user", "tester"],
    );
    assert!(started.changed);
    let result = ids(registry.state().results.iter()).remove(0);
    ok(
        &mut registry,
        &config,
        &[
            "result",
            "fail",
            &result[..8],
            "--comment",
            "crashes",
            "--step",
            "1=http://bugs/1",
            "--user",
            "tester",
        ],
    );

    let report = ok(&mut registry, &config, &["report", "rcv", &rcv[..8]]);
    assert!(!report.changed);
    assert!(report.output.contains("passed: 0, failed: 1, invalidated: 0"));
    assert!(report.output.contains("completion: 50%"));
    assert!(report.output.contains("testers: tester"));
    assert!(report.output.contains("bug: http://bugs/1"));

    let json = ok(&mut registry, &config, &["report", "run", &run_id, "--json"]);
    let value: serde_json::Value = serde_json::from_str(&json.output).unwrap();
    assert_eq!(value["status"], "active");
    assert_eq!(value["summary"]["failed"], 1);
    assert_eq!(value["completion"], 0.5);
    assert_eq!(value["runcaseversions"][0]["bug_urls"][0], "http://bugs/1");
}

#[test]
fn test_start_needs_acting_user() {
    let config = ConductorConfig::default().with_enforce_permissions(false);
    let mut registry = Registry::new();

    let err = exec(&mut registry, &config, &["result", "start", "rcv", "env"]).unwrap_err();

    assert!(matches!(err, CommandError::NoActingUser));
}

#[test]
fn test_unknown_prefix_is_not_found() {
    let config = ConductorConfig::default();
    let mut registry = fixture(&config);

    let err = exec(&mut registry, &config, &["product", "show", "zzzz"]).unwrap_err();

    assert!(matches!(
        err,
        CommandError::Registry(RegistryError::NotFound {
            entity_type: EntityType::Product,
            ..
        })
    ));
}

#[test]
fn test_listing_uses_params_and_configured_default() {
    let config = ConductorConfig::default()
        .with_enforce_permissions(false)
        .with_default_sort("name", SortDirection::Desc);
    let mut registry = Registry::new();
    ok(&mut registry, &config, &["product", "add", "Product 1"]);
    ok(&mut registry, &config, &["product", "add", "Product 2"]);

    let defaulted = ok(&mut registry, &config, &["product", "list"]);
    let names: Vec<&str> = defaulted
        .output
        .lines()
        .map(|line| line.split("  ").nth(1).unwrap())
        .collect();
    assert_eq!(names, ["Product 2", "Product 1"]);

    let filtered = ok(
        &mut registry,
        &config,
        &["product", "list", "-p", "filter-name=1"],
    );
    assert_eq!(filtered.output.lines().count(), 1);
    assert!(filtered.output.contains("Product 1"));
}

#[test]
fn test_run_case_version_environments_edited_directly() {
    let config = ConductorConfig::default();
    let mut registry = fixture(&config);
    let pv = ids(registry.state().productversions.iter()).remove(0);
    let envs = ids(registry.state().environments.iter());

    as_admin(&mut registry, &config, &["version", "add-env", &pv, &envs[0], &envs[1]]);
    as_admin(&mut registry, &config, &["run", "add", &pv, "FF10"]);
    as_admin(&mut registry, &config, &["case", "add", &pv, "Open URL"]);
    let run = ids(registry.state().runs.iter()).remove(0);
    let cv = ids(registry.state().caseversions.iter()).remove(0);
    as_admin(&mut registry, &config, &["run", "include", &run, &cv]);
    let rcv = ids(registry.state().runcaseversions.iter()).remove(0);
    assert!(registry.runcaseversion(&rcv).unwrap().environments.is_empty());

    let added = as_admin(&mut registry, &config, &["run", "rcv-add-env", &rcv[..8], &envs[0], &envs[1]]);
    assert!(added.changed);
    assert!(added.output.contains("now has 2 environment(s)"));

    let removed = as_admin(&mut registry, &config, &["run", "rcv-remove-env", &rcv, &envs[0]]);
    assert!(removed.output.contains("now has 1 environment(s)"));
    assert_eq!(
        registry.runcaseversion(&rcv).unwrap().environments,
        BTreeSet::from([envs[1].clone()])
    );

    // the tester lacks manage-runs
    let denied = ok(
        &mut registry,
        &config,
        &["run", "rcv-add-env", &rcv, &envs[0], "--user", "tester"],
    );
    assert!(!denied.changed);
    assert!(denied.output.contains("/account/login/?next="));
    assert_eq!(registry.runcaseversion(&rcv).unwrap().environments.len(), 1);
}

#[test]
fn test_rcv_add_env_still_bounded_by_product_version() {
    let config = ConductorConfig::default();
    let mut registry = fixture(&config);
    let pv = ids(registry.state().productversions.iter()).remove(0);
    let envs = ids(registry.state().environments.iter());

    as_admin(&mut registry, &config, &["version", "add-env", &pv, &envs[0]]);
    as_admin(&mut registry, &config, &["run", "add", &pv, "FF10"]);
    as_admin(&mut registry, &config, &["case", "add", &pv, "Open URL"]);
    let run = ids(registry.state().runs.iter()).remove(0);
    let cv = ids(registry.state().caseversions.iter()).remove(0);
    as_admin(&mut registry, &config, &["run", "include", &run, &cv]);
    let rcv = ids(registry.state().runcaseversions.iter()).remove(0);

    let result = exec(
        &mut registry,
        &config,
        &["run", "rcv-add-env", &rcv, &envs[1], "--user", "admin"],
    );

    assert!(matches!(
        result,
        Err(CommandError::Registry(RegistryError::EnvironmentNotAllowed { .. }))
    ));
    assert!(registry.runcaseversion(&rcv).unwrap().environments.is_empty());
}

#[test]
fn test_run_can_be_disabled() {
    let config = ConductorConfig::default();
    let mut registry = fixture(&config);
    let pv = ids(registry.state().productversions.iter()).remove(0);
    as_admin(&mut registry, &config, &["run", "add", &pv, "FF10"]);
    let run = ids(registry.state().runs.iter()).remove(0);
    as_admin(&mut registry, &config, &["run", "activate", &run]);

    let disabled = as_admin(&mut registry, &config, &["run", "disable", &run[..8]]);

    assert!(disabled.changed);
    assert!(disabled.output.contains("is now disabled"));
    assert_eq!(registry.run(&run).unwrap().status, RunStatus::Disabled);
    let listed = ok(
        &mut registry,
        &config,
        &["run", "list", "-p", "filter-status=disabled"],
    );
    assert!(listed.output.contains("FF10"));

    let denied = ok(&mut registry, &config, &["run", "activate", &run, "--user", "tester"]);
    assert!(!denied.changed);
    assert_eq!(registry.run(&run).unwrap().status, RunStatus::Disabled);
}
