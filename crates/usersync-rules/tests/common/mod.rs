//! Shared fixtures for usersync-rules integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Once;

use usersync_rules::prelude::*;

static INIT: Once = Once::new();

/// Initialize logging for tests (once).
pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

pub const DOMAIN: &str = "example.com";

pub fn key(user: &str) -> IdentityKey {
    IdentityKey::new(IdentityType::FederatedId, user, Some(DOMAIN))
}

/// Federated directory identity with e-mail `<user>@example.com`.
pub fn source(user: &str) -> SourceIdentity {
    SourceIdentity::new(IdentityType::FederatedId, user)
        .with_domain(DOMAIN)
        .with_email(format!("{user}@{DOMAIN}"))
}

/// Federated target identity mirroring [`source`].
pub fn target(instance: InstanceId, user: &str) -> TargetIdentity {
    TargetIdentity::new(instance, IdentityType::FederatedId, user)
        .with_domain(DOMAIN)
        .with_email(format!("{user}@{DOMAIN}"))
}

pub fn mapping(directory_group: &str, adobe_groups: &[&str]) -> GroupMappingEntry {
    GroupMappingEntry {
        directory_group: directory_group.to_string(),
        adobe_groups: adobe_groups.iter().map(|g| (*g).to_string()).collect(),
    }
}

pub fn group_set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| (*n).to_string()).collect()
}

pub fn primary_snapshot(identities: Vec<TargetIdentity>) -> TargetSnapshot {
    TargetSnapshot::from([(InstanceId::Primary, identities)])
}

/// Op kind names for one identity, in emission order.
pub fn kinds_for(plan: &ReconciliationPlan, instance: &InstanceId, user: &str) -> Vec<&'static str> {
    let key = key(user);
    plan.ops_for(instance, &key).map(|op| op.kind.name()).collect()
}
