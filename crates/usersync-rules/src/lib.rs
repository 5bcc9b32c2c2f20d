//! # Reconciliation Rule Engine
//!
//! Decides, for one synchronization pass, what must happen to every identity
//! in one or more target instances so that they reflect an authoritative
//! directory.
//!
//! A pass compares a complete directory snapshot with complete target
//! snapshots and emits an ordered [`ReconciliationPlan`]: creations,
//! attribute updates, group membership changes and the disposal of strays
//! (target identities no directory identity matched). Destructive disposal is
//! guarded by a global safety threshold.
//!
//! ## Crate Organization
//!
//! - [`config`] - `RuleConfig` / `SyncConfig` (YAML)
//! - [`diff`] - Attribute diff engine
//! - [`mapping`] - Directory group to target group mapping
//! - [`stray`] - Stray key map and its persistence
//! - [`policy`] - Exclusion and disposal policy
//! - [`engine`] - Planning
//! - [`statistics`] / [`report`] - Pass statistics and report
//! - [`executor`] - Plan application
//! - [`session`] - Fetch, plan, apply
//!
//! ## Example
//!
//! ```
//! use usersync_rules::prelude::*;
//!
//! let config = RuleConfig::from_yaml(
//!     "groups:\n  - directory_group: eng\n    adobe_groups: [Engineering]\n",
//! )
//! .unwrap();
//! let engine = RuleEngine::new(config).unwrap();
//!
//! let alice = SourceIdentity::new(IdentityType::FederatedId, "alice@example.com")
//!     .with_domain("example.com")
//!     .with_group("eng");
//! let targets = TargetSnapshot::from([(InstanceId::Primary, Vec::new())]);
//!
//! let plan = engine.plan(&[alice], &targets);
//! let kinds: Vec<&str> = plan.ops.iter().map(|op| op.kind.name()).collect();
//! assert_eq!(kinds, ["create", "add_to_groups"]);
//! ```

pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod executor;
pub mod mapping;
pub mod policy;
pub mod report;
pub mod session;
pub mod statistics;
pub mod stray;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{DynamicGroupRule, GroupMappingEntry, RuleConfig, StrayAction, SyncConfig};
    pub use crate::diff::diff_attributes;
    pub use crate::engine::{DisposalOutcome, ReconciliationPlan, RuleEngine, TargetSnapshot};
    pub use crate::error::{RuleError, RuleResult};
    pub use crate::executor::{
        ExecutionConfig, ExecutionResult, ExecutionSummary, OpResult, OpStatus, PlanExecutor,
        SkipReason,
    };
    pub use crate::mapping::{group_specifiers, GroupMappingTable, ResolvedGroups, TargetGroup};
    pub use crate::report::{PlanReport, ReportGenerator, StrayChanges};
    pub use crate::session::{SyncOutcome, SyncSession};
    pub use crate::statistics::PlanStatistics;
    pub use crate::stray::{StrayEntry, StrayKeyMap};
    pub use usersync_connector::prelude::*;
}

pub use config::{RuleConfig, StrayAction, SyncConfig};
pub use engine::{DisposalOutcome, ReconciliationPlan, RuleEngine, TargetSnapshot};
pub use error::{RuleError, RuleResult};
pub use executor::{ExecutionConfig, PlanExecutor};
pub use report::{PlanReport, ReportGenerator};
pub use session::{SyncOutcome, SyncSession};
pub use stray::StrayKeyMap;
