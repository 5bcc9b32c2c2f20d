//! Pass report.
//!
//! A serializable summary of one pass for operators: statistics, the
//! disposal outcome, quarantined rows and, when the previous pass's stray
//! map is available, the strays that appeared or went away since then.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use usersync_connector::RecordError;

use crate::engine::{DisposalOutcome, ReconciliationPlan};
use crate::error::RuleResult;
use crate::executor::ExecutionSummary;
use crate::statistics::{AttributeMismatchCount, PlanStatistics};
use crate::stray::{StrayEntry, StrayKeyMap};

/// Number of mismatched attributes listed in a report.
pub const TOP_MISMATCHED_LIMIT: usize = 10;

/// Strays compared with the previous pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrayChanges {
    /// Strays not present in the previous pass.
    pub new: Vec<StrayEntry>,
    /// Previous strays that are no longer strays.
    pub resolved: Vec<StrayEntry>,
}

impl StrayChanges {
    /// Compare the current stray map with a prior one.
    pub fn between(current: &StrayKeyMap, prior: &StrayKeyMap) -> Self {
        Self {
            new: current.difference(prior).entries().collect(),
            resolved: prior.difference(current).entries().collect(),
        }
    }
}

/// Report for one pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub statistics: PlanStatistics,
    pub disposal: DisposalOutcome,
    /// Set when disposal was blocked, for operators.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disposal_message: Option<String>,
    pub top_mismatched_attributes: Vec<AttributeMismatchCount>,
    pub stray_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stray_changes: Option<StrayChanges>,
    pub record_errors: Vec<RecordError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionSummary>,
}

impl PlanReport {
    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> RuleResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[must_use]
    pub fn is_disposal_blocked(&self) -> bool {
        self.disposal.is_blocked()
    }
}

/// Builds [`PlanReport`]s.
pub struct ReportGenerator;

impl ReportGenerator {
    /// Generate the report of a plan.
    pub fn generate(
        plan: &ReconciliationPlan,
        prior_strays: Option<&StrayKeyMap>,
        execution: Option<&ExecutionSummary>,
    ) -> PlanReport {
        PlanReport {
            run_id: plan.run_id,
            generated_at: plan.generated_at,
            statistics: plan.statistics.clone(),
            disposal: plan.disposal,
            disposal_message: plan.disposal_error().map(|e| e.to_string()),
            top_mismatched_attributes: plan
                .statistics
                .top_mismatched_attributes(TOP_MISMATCHED_LIMIT),
            stray_count: plan.strays.len(),
            stray_changes: prior_strays.map(|prior| StrayChanges::between(&plan.strays, prior)),
            record_errors: plan.record_errors.clone(),
            execution: execution.copied(),
        }
    }
}
