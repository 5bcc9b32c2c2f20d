//! End-to-end synchronization pass.
//!
//! Fetch every snapshot, plan, apply, report. Planning only starts once the
//! directory batch and every instance snapshot are complete; any fetch error
//! aborts the pass before planning.

use futures::future::try_join_all;
use tracing::{info, instrument, warn};

use usersync_connector::{DirectorySource, SourceBatch, TargetClient};
use usersync_core::InstanceId;

use crate::config::SyncConfig;
use crate::engine::{ReconciliationPlan, RuleEngine, TargetSnapshot};
use crate::error::{RuleError, RuleResult};
use crate::executor::{ExecutionResult, PlanExecutor};
use crate::report::{PlanReport, ReportGenerator};
use crate::stray::StrayKeyMap;

/// Everything a pass produced.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub plan: ReconciliationPlan,
    pub report: PlanReport,
    pub execution: ExecutionResult,
}

impl SyncOutcome {
    /// Stray map to persist for the next pass.
    #[must_use]
    pub fn strays(&self) -> &StrayKeyMap {
        &self.plan.strays
    }
}

/// A configured synchronization between one directory and one target system.
#[derive(Debug, Clone)]
pub struct SyncSession {
    config: SyncConfig,
    engine: RuleEngine,
    executor: PlanExecutor,
}

impl SyncSession {
    /// Validate the configuration and build the session.
    ///
    /// # Errors
    ///
    /// Any configuration error, including a group mapping that targets an
    /// instance missing from `secondary_instances`.
    pub fn new(config: SyncConfig) -> RuleResult<Self> {
        config.validate()?;
        let engine = RuleEngine::new(config.rules.clone())?;

        let instances = config.instances();
        if let Some(unknown) = engine
            .mapping()
            .referenced_instances()
            .into_iter()
            .find(|instance| !instances.contains(instance))
        {
            return Err(RuleError::configuration(format!(
                "group mapping references unknown instance '{unknown}'"
            )));
        }

        let executor = PlanExecutor::new(config.execution.clone());
        Ok(Self {
            config,
            engine,
            executor,
        })
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[must_use]
    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    #[must_use]
    pub fn instances(&self) -> Vec<InstanceId> {
        self.config.instances()
    }

    /// Fetch the directory batch and every instance snapshot concurrently.
    pub async fn fetch(
        &self,
        source: &dyn DirectorySource,
        client: &dyn TargetClient,
    ) -> RuleResult<(SourceBatch, TargetSnapshot)> {
        let normalizer = self.engine.normalizer();
        let instances = self.instances();

        let snapshots = try_join_all(instances.iter().map(|instance| async move {
            client
                .snapshot(instance)
                .await
                .map(|identities| (instance.clone(), identities))
        }));

        let (batch, snapshots) = tokio::try_join!(source.produce(&normalizer), snapshots)?;
        Ok((batch, snapshots.into_iter().collect()))
    }

    /// Fetch and plan without applying anything.
    #[instrument(skip_all, fields(source = source.display_name(), client = client.display_name()))]
    pub async fn plan(
        &self,
        source: &dyn DirectorySource,
        client: &dyn TargetClient,
    ) -> RuleResult<ReconciliationPlan> {
        let (batch, targets) = self.fetch(source, client).await?;
        if !batch.rejected.is_empty() {
            warn!(
                rejected = batch.rejected.len(),
                "Directory rows quarantined; they take no part in this pass"
            );
        }
        Ok(self.engine.plan_batch(batch, &targets))
    }

    /// Run a full pass.
    ///
    /// A blocked disposal does not fail the pass: the rest of the plan is
    /// applied and the report carries the blocked outcome.
    #[instrument(skip_all, fields(source = source.display_name(), client = client.display_name()))]
    pub async fn run(
        &self,
        source: &dyn DirectorySource,
        client: &dyn TargetClient,
        prior_strays: Option<&StrayKeyMap>,
    ) -> RuleResult<SyncOutcome> {
        let plan = self.plan(source, client).await?;
        let execution = self.executor.execute(client, &plan.ops).await;
        let report = ReportGenerator::generate(&plan, prior_strays, Some(&execution.summary));

        info!(
            run_id = %plan.run_id,
            dry_run = self.config.execution.dry_run,
            ops = plan.ops.len(),
            succeeded = execution.summary.succeeded,
            failed = execution.summary.failed,
            skipped = execution.summary.skipped,
            strays = plan.strays.len(),
            disposal_blocked = plan.disposal.is_blocked(),
            "Synchronization pass complete"
        );

        Ok(SyncOutcome {
            plan,
            report,
            execution,
        })
    }
}
