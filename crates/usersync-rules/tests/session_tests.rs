//! End-to-end passes against the in-memory backends.

mod common;

use common::*;
use usersync_rules::prelude::*;

const CONFIG: &str = r#"
update_user_info: true
adobe_only_user_action: remove_from_mapped_groups
groups:
  - directory_group: eng
    adobe_groups: [Engineering]
"#;

fn record(email: &str, groups: &[&str], line: usize) -> SourceRecord {
    SourceRecord {
        line_number: Some(line),
        email: Some(email.to_string()),
        groups: groups.iter().map(|g| (*g).to_string()).collect(),
        ..SourceRecord::default()
    }
}

fn directory() -> InMemoryDirectory {
    InMemoryDirectory::new(vec![
        SourceRecord {
            firstname: Some("Alice".to_string()),
            lastname: Some("Smith".to_string()),
            ..record("alice@example.com", &["eng"], 2)
        },
        SourceRecord {
            line_number: Some(3),
            firstname: Some("Nobody".to_string()),
            ..SourceRecord::default()
        },
        record("carol@example.com", &[], 4),
    ])
}

fn member(user: &str) -> TargetIdentity {
    target(InstanceId::Primary, &format!("{user}@{DOMAIN}"))
}

fn member_key(user: &str) -> IdentityKey {
    key(&format!("{user}@{DOMAIN}"))
}

fn target_system() -> InMemoryTarget {
    InMemoryTarget::new().with_instance(
        InstanceId::Primary,
        vec![member("bob").with_group("Engineering").with_group("Marketing"), member("carol")],
    )
}

fn session(yaml: &str) -> SyncSession {
    init_test_logging();
    SyncSession::new(SyncConfig::from_yaml(yaml).unwrap()).unwrap()
}

#[tokio::test]
async fn test_pass_applies_plan_and_converges() {
    let session = session(CONFIG);
    let directory = directory();
    let client = target_system();

    let first = session.run(&directory, &client, None).await.unwrap();

    assert_eq!(
        kinds_for(&first.plan, &InstanceId::Primary, "alice@example.com"),
        ["create", "add_to_groups"]
    );
    // Default country differs from the target's empty value.
    assert_eq!(
        kinds_for(&first.plan, &InstanceId::Primary, "carol@example.com"),
        ["update_attributes"]
    );
    assert_eq!(
        kinds_for(&first.plan, &InstanceId::Primary, "bob@example.com"),
        ["remove_from_groups"]
    );
    assert_eq!(first.execution.summary.failed, 0);
    assert_eq!(first.execution.summary.succeeded, 4);

    assert_eq!(first.report.record_errors.len(), 1);
    assert_eq!(first.report.record_errors[0].line_number, Some(3));
    assert_eq!(first.report.statistics.sources_rejected, 1);
    assert_eq!(first.report.execution, Some(first.execution.summary));
    assert_eq!(first.plan.member_groups[&member_key("alice")], group_set(&["Engineering"]));
    assert!(first.plan.member_groups[&member_key("carol")].is_empty());

    let alice = client
        .identity(&InstanceId::Primary, &member_key("alice"))
        .await
        .unwrap();
    assert_eq!(alice.firstname.as_deref(), Some("Alice"));
    assert_eq!(alice.country.as_deref(), Some("US"));
    assert_eq!(alice.groups, group_set(&["Engineering"]));

    let bob = client
        .identity(&InstanceId::Primary, &member_key("bob"))
        .await
        .unwrap();
    assert_eq!(bob.groups, group_set(&["Marketing"]));

    let second = session
        .run(&directory, &client, Some(first.strays()))
        .await
        .unwrap();
    assert!(second.plan.ops.iter().all(ReconciliationOp::is_noop));
    assert_eq!(second.execution.summary.total, 0);
    let changes = second.report.stray_changes.unwrap();
    assert!(changes.new.is_empty());
    assert!(changes.resolved.is_empty());
}

#[tokio::test]
async fn test_dry_run_leaves_target_untouched() {
    let session = session(&format!("{CONFIG}execution:\n  dry_run: true\n"));
    let client = target_system();

    let outcome = session.run(&directory(), &client, None).await.unwrap();

    assert!(client.applied().await.is_empty());
    assert_eq!(outcome.execution.summary.skipped, 4);
    assert!(client
        .identity(&InstanceId::Primary, &member_key("alice"))
        .await
        .is_none());
}

#[tokio::test]
async fn test_blocked_disposal_still_applies_the_rest() {
    let session = session(
        "max_adobe_only_users: 0\nadobe_only_user_action: remove_user\n",
    );
    let client = target_system();

    let outcome = session.run(&directory(), &client, None).await.unwrap();

    assert!(outcome.report.is_disposal_blocked());
    assert!(outcome
        .report
        .disposal_message
        .as_deref()
        .is_some_and(|m| m.contains("max_adobe_only_users")));
    assert!(client
        .identity(&InstanceId::Primary, &member_key("bob"))
        .await
        .is_some());
    assert!(client
        .identity(&InstanceId::Primary, &member_key("alice"))
        .await
        .is_some());
}

#[tokio::test]
async fn test_report_tracks_stray_changes() {
    let session = session(CONFIG);
    let mut prior = StrayKeyMap::new();
    prior.insert(&InstanceId::Primary, member_key("ghost"));
    prior.insert(&InstanceId::Primary, member_key("bob"));

    let plan = session.plan(&directory(), &target_system()).await.unwrap();
    let report = ReportGenerator::generate(&plan, Some(&prior), None);

    let changes = report.stray_changes.unwrap();
    assert!(changes.new.is_empty());
    assert_eq!(changes.resolved.len(), 1);
    assert_eq!(changes.resolved[0].key, member_key("ghost"));
}

#[tokio::test]
async fn test_snapshot_failure_aborts_before_planning() {
    let session = session("secondary_instances: [secondary]\n");
    let client = target_system();

    let err = session.run(&directory(), &client, None).await.unwrap_err();

    assert!(matches!(err, RuleError::Connector(ref e) if e.error_code() == "UNKNOWN_INSTANCE"));
    assert!(client.applied().await.is_empty());
}

#[test]
fn test_mapping_to_undeclared_instance_rejected() {
    let config = SyncConfig::from_yaml(
        "groups:\n  - directory_group: eng\n    adobe_groups: [\"secondary::Engineering\"]\n",
    )
    .unwrap();
    let err = SyncSession::new(config).unwrap_err();
    assert!(matches!(err, RuleError::Configuration { .. }));
    assert!(err.to_string().contains("secondary"));
}

#[tokio::test]
async fn test_csv_directory_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.csv");
    std::fs::write(
        &path,
        "email,firstname,lastname,groups\n\
alice@example.com,Alice,Smith,eng\n\
carol@example.com,,,\n",
    )
    .unwrap();
    let source = CsvDirectorySource::new(&path);
    let client = target_system();

    let outcome = session(CONFIG).run(&source, &client, None).await.unwrap();

    assert_eq!(outcome.plan.statistics.sources_total, 2);
    assert_eq!(outcome.execution.summary.failed, 0);
    let alice = client
        .identity(&InstanceId::Primary, &member_key("alice"))
        .await
        .unwrap();
    assert_eq!(alice.groups, group_set(&["Engineering"]));
}
