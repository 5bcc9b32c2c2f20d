//! Plan application.
//!
//! Ops are grouped by `(instance, key)`. Groups run concurrently up to
//! `max_concurrency`; ops inside a group run one after another in emission
//! order. A failed op skips the rest of its group, since those ops depend on
//! it (an `AddToGroups` after a failed `Create`). Other identities are not
//! affected.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use usersync_connector::{ConnectorError, ReconciliationOp, TargetClient};
use usersync_core::{IdentityKey, InstanceId};

use crate::error::{RuleError, RuleResult};

fn default_max_concurrency() -> usize {
    8
}

fn default_retry_backoff_ms() -> u64 {
    500
}

/// Execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Record every op as skipped without calling the target system.
    #[serde(default)]
    pub dry_run: bool,

    /// Identities applied concurrently.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Extra attempts for an op failing with a transient error.
    #[serde(default)]
    pub max_retries: u32,

    /// Delay before a retry, multiplied by the attempt number.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_concurrency: default_max_concurrency(),
            max_retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> RuleResult<()> {
        if self.max_concurrency == 0 {
            return Err(RuleError::configuration(
                "execution.max_concurrency must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    DryRun,
    /// An earlier op for the same identity failed.
    PriorFailure,
}

/// Outcome of one op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpResult {
    pub op: ReconciliationOp,
    pub status: OpStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Calls made to the target system for this op.
    pub attempts: u32,
    pub executed_at: DateTime<Utc>,
}

impl OpResult {
    /// Create a success result.
    pub fn success(op: ReconciliationOp, attempts: u32) -> Self {
        Self {
            op,
            status: OpStatus::Succeeded,
            skip_reason: None,
            error_code: None,
            error_message: None,
            attempts,
            executed_at: Utc::now(),
        }
    }

    /// Create a failure result.
    pub fn failure(op: ReconciliationOp, error: &ConnectorError, attempts: u32) -> Self {
        Self {
            op,
            status: OpStatus::Failed,
            skip_reason: None,
            error_code: Some(error.error_code().to_string()),
            error_message: Some(error.to_string()),
            attempts,
            executed_at: Utc::now(),
        }
    }

    /// Create a skipped result.
    pub fn skipped(op: ReconciliationOp, reason: SkipReason) -> Self {
        Self {
            op,
            status: OpStatus::Skipped,
            skip_reason: Some(reason),
            error_code: None,
            error_message: None,
            attempts: 0,
            executed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OpStatus::Succeeded
    }

    pub fn is_failure(&self) -> bool {
        self.status == OpStatus::Failed
    }

    pub fn is_skipped(&self) -> bool {
        self.status == OpStatus::Skipped
    }
}

/// Summary of one plan application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Ops considered (no-ops excluded).
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Result of applying a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Individual results, ordered by identity then emission order.
    pub results: Vec<OpResult>,
    pub summary: ExecutionSummary,
}

impl ExecutionResult {
    /// Create from results.
    pub fn from_results(results: Vec<OpResult>) -> Self {
        let total = results.len();
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let failed = results.iter().filter(|r| r.is_failure()).count();
        let skipped = results.iter().filter(|r| r.is_skipped()).count();

        Self {
            results,
            summary: ExecutionSummary {
                total,
                succeeded,
                failed,
                skipped,
            },
        }
    }

    /// Failed results only.
    pub fn failures(&self) -> impl Iterator<Item = &OpResult> {
        self.results.iter().filter(|r| r.is_failure())
    }
}

/// Applies planned ops through a [`TargetClient`].
#[derive(Debug, Clone, Default)]
pub struct PlanExecutor {
    config: ExecutionConfig,
}

impl PlanExecutor {
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Apply ops. Failures are reported per op; nothing is raised.
    #[instrument(skip_all, fields(ops = ops.len(), dry_run = self.config.dry_run))]
    pub async fn execute<C>(&self, client: &C, ops: &[ReconciliationOp]) -> ExecutionResult
    where
        C: TargetClient + ?Sized,
    {
        let groups = group_by_identity(ops);

        if self.config.dry_run {
            let results = groups
                .into_iter()
                .flatten()
                .map(|op| OpResult::skipped(op.clone(), SkipReason::DryRun))
                .collect();
            let result = ExecutionResult::from_results(results);
            info!(skipped = result.summary.skipped, "Dry run; no op sent to the target system");
            return result;
        }

        let limit = self.config.max_concurrency.max(1);
        let mut applied: Vec<(usize, Vec<OpResult>)> = stream::iter(groups.into_iter().enumerate())
            .map(|(index, group)| async move { (index, self.apply_group(client, group).await) })
            .buffer_unordered(limit)
            .collect()
            .await;
        applied.sort_by_key(|(index, _)| *index);

        let result = ExecutionResult::from_results(
            applied.into_iter().flat_map(|(_, results)| results).collect(),
        );
        info!(
            client = client.display_name(),
            total = result.summary.total,
            succeeded = result.summary.succeeded,
            failed = result.summary.failed,
            skipped = result.summary.skipped,
            "Plan applied"
        );
        result
    }

    async fn apply_group<C>(&self, client: &C, group: Vec<&ReconciliationOp>) -> Vec<OpResult>
    where
        C: TargetClient + ?Sized,
    {
        let mut results = Vec::with_capacity(group.len());
        let mut failed = false;

        for op in group {
            if failed {
                results.push(OpResult::skipped(op.clone(), SkipReason::PriorFailure));
                continue;
            }
            match self.apply_with_retry(client, op).await {
                Ok(attempts) => {
                    debug!(op = %op, "Op applied");
                    results.push(OpResult::success(op.clone(), attempts));
                }
                Err((error, attempts)) => {
                    warn!(
                        instance = %op.instance,
                        key = %op.key,
                        op = op.kind.name(),
                        error_code = error.error_code(),
                        error = %error,
                        "Op failed; skipping the remaining ops for this identity"
                    );
                    results.push(OpResult::failure(op.clone(), &error, attempts));
                    failed = true;
                }
            }
        }

        results
    }

    async fn apply_with_retry<C>(
        &self,
        client: &C,
        op: &ReconciliationOp,
    ) -> Result<u32, (ConnectorError, u32)>
    where
        C: TargetClient + ?Sized,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match client.apply(op).await {
                Ok(()) => return Ok(attempts),
                Err(error) if error.is_transient() && attempts <= self.config.max_retries => {
                    let delay = self
                        .config
                        .retry_backoff_ms
                        .saturating_mul(u64::from(attempts));
                    debug!(op = %op, attempts, delay_ms = delay, error = %error, "Retrying transient failure");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(error) => return Err((error, attempts)),
            }
        }
    }
}

/// Group actionable ops per identity, groups in first-appearance order.
fn group_by_identity(ops: &[ReconciliationOp]) -> Vec<Vec<&ReconciliationOp>> {
    let mut positions: HashMap<(&InstanceId, &IdentityKey), usize> = HashMap::new();
    let mut groups: Vec<Vec<&ReconciliationOp>> = Vec::new();

    for op in ops.iter().filter(|op| !op.is_noop()) {
        let position = *positions.entry((&op.instance, &op.key)).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[position].push(op);
    }

    groups
}
