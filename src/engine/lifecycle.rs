//! Experiment lifecycle orchestration.
//!
//! Owns creation/validation, the status state machine, winner checks, and
//! rollout persistence. Collaborators (store, notifier) are injected at
//! construction; there is no module-level state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{Error, NotifyError, Result, StoreError};
use crate::logging::targets;
use crate::store::ExperimentStore;
use crate::types::{
    Analysis, AssignedVariant, EventSubmission, Experiment, ExperimentDraft, ExperimentStatus,
    TestResults, Tracked, UserProfile, VariantResult, WinnerSummary, WinningVariant,
};

use super::assignment::AssignmentEngine;
use super::decision::DecisionEngine;
use super::significance::{two_proportion_z, SampleCounts};
use super::tracker::EventTracker;

/// Winner-notification collaborator.
///
/// Strictly best-effort: the lifecycle controller bounds the call with a
/// timeout and logs failures without rolling back the committed status
/// transition.
#[async_trait]
pub trait WinnerNotifier: Send + Sync {
    async fn notify(&self, summary: &WinnerSummary) -> std::result::Result<(), NotifyError>;
}

/// Notifier that drops summaries. For tests and embedders that wire
/// delivery elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl WinnerNotifier for NoopNotifier {
    async fn notify(&self, _summary: &WinnerSummary) -> std::result::Result<(), NotifyError> {
        Ok(())
    }
}

/// Engine-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on one winner-notification attempt, in milliseconds.
    #[serde(default = "default_notify_timeout_ms")]
    pub notify_timeout_ms: u64,
}

fn default_notify_timeout_ms() -> u64 {
    5_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            notify_timeout_ms: default_notify_timeout_ms(),
        }
    }
}

/// Facade over the experimentation engine.
///
/// Composes the assignment engine, event tracker, statistics and decision
/// engines over one shared store handle.
pub struct ExperimentEngine {
    store: Arc<dyn ExperimentStore>,
    notifier: Arc<dyn WinnerNotifier>,
    config: EngineConfig,
    assignment: AssignmentEngine,
    tracker: EventTracker,
    decision: DecisionEngine,
}

impl ExperimentEngine {
    pub fn new(store: Arc<dyn ExperimentStore>, notifier: Arc<dyn WinnerNotifier>) -> Self {
        Self::with_config(store, notifier, EngineConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn ExperimentStore>,
        notifier: Arc<dyn WinnerNotifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            assignment: AssignmentEngine::new(Arc::clone(&store)),
            tracker: EventTracker::new(Arc::clone(&store)),
            decision: DecisionEngine::new(),
            store,
            notifier,
            config,
        }
    }

    /// Validate and persist a new experiment.
    ///
    /// Validation failures are rejected synchronously; nothing is
    /// persisted. On success the experiment starts `Running` with one
    /// zeroed stats row per variant.
    pub fn create(&self, draft: ExperimentDraft, now: DateTime<Utc>) -> Result<Experiment> {
        draft.validate()?;
        let id = Uuid::new_v4().to_string();
        let experiment = Experiment::from_draft(draft, id, now);
        self.store.insert_experiment(experiment.clone())?;
        info!(
            target: targets::LIFECYCLE,
            test_id = %experiment.id,
            name = %experiment.name,
            variants = experiment.variants.len(),
            "experiment created"
        );
        Ok(experiment)
    }

    /// Assign a user (or return their existing assignment). See
    /// [`AssignmentEngine::assign`].
    pub fn variant_config(
        &self,
        user: &UserProfile,
        test_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AssignedVariant>> {
        self.assignment.assign(user, test_id, now)
    }

    /// Record an outcome event. See [`EventTracker::track`].
    pub fn track(&self, submission: EventSubmission, now: DateTime<Utc>) -> Result<Tracked> {
        self.tracker.track(submission, now)
    }

    /// Per-variant results plus decision analysis, with no mutation.
    pub fn test_results(&self, test_id: &str, now: DateTime<Utc>) -> Result<TestResults> {
        let experiment = self.load(test_id)?;
        let results = self.build_results(&experiment)?;
        let analysis = self.decision.analyze(&experiment, &results, now);
        Ok(TestResults {
            test_id: test_id.to_string(),
            results,
            analysis,
        })
    }

    /// Run the decision policy over a current stats snapshot and, when a
    /// winner is found on an auto-rollout experiment, commit the rollout.
    ///
    /// Returns `Ok(None)` unless the experiment is running. With
    /// `auto_rollout = false` the analysis is returned and nothing is
    /// mutated. Notification is best-effort and time-bounded; its failure
    /// never undoes the committed transition.
    pub async fn check_for_winner(
        &self,
        test_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Analysis>> {
        let mut experiment = self.load(test_id)?;
        if experiment.status != ExperimentStatus::Running {
            return Ok(None);
        }

        let results = self.build_results(&experiment)?;
        let analysis = self.decision.analyze(&experiment, &results, now);

        let Some(winner_id) = analysis.winner.clone() else {
            return Ok(Some(analysis));
        };

        if !experiment.auto_rollout {
            info!(
                target: targets::LIFECYCLE,
                test_id,
                winner = %winner_id,
                "winner found, auto_rollout disabled; leaving experiment running"
            );
            return Ok(Some(analysis));
        }

        let config = experiment
            .variant(&winner_id)
            .map(|v| v.config.clone())
            .ok_or_else(|| StoreError::VariantNotFound {
                test_id: test_id.to_string(),
                variant_id: winner_id.clone(),
            })?;

        self.store.push_winning_variant(WinningVariant {
            test_id: test_id.to_string(),
            variant_id: winner_id.clone(),
            config,
            rolled_out_at: now,
        })?;

        experiment.status = ExperimentStatus::Completed;
        experiment.winner_variant_id = Some(winner_id.clone());
        experiment.completed_at = Some(now);
        self.store.update_experiment(&experiment)?;

        info!(
            target: targets::LIFECYCLE,
            test_id,
            winner = %winner_id,
            improvement = analysis.improvement,
            "winner rolled out, experiment completed"
        );

        let confidence = results
            .iter()
            .find(|r| r.variant_id == winner_id)
            .and_then(|r| r.significance)
            .map(|s| s.confidence)
            .unwrap_or(0.0);
        let summary = WinnerSummary {
            test_id: test_id.to_string(),
            test_name: experiment.name.clone(),
            winner_variant_id: winner_id,
            improvement: analysis.improvement,
            confidence,
            revenue_impact: analysis.revenue_impact,
            auto_rolled_out: true,
        };
        self.notify_best_effort(&summary).await;

        Ok(Some(analysis))
    }

    /// Pause a running experiment.
    pub fn pause(&self, test_id: &str) -> Result<Experiment> {
        self.transition(test_id, ExperimentStatus::Paused, &[ExperimentStatus::Running])
    }

    /// Resume a paused experiment.
    pub fn resume(&self, test_id: &str) -> Result<Experiment> {
        self.transition(test_id, ExperimentStatus::Running, &[ExperimentStatus::Paused])
    }

    /// Archive an experiment. Terminal: the store rejects all further
    /// writes for the id.
    pub fn archive(&self, test_id: &str) -> Result<Experiment> {
        self.transition(
            test_id,
            ExperimentStatus::Archived,
            &[
                ExperimentStatus::Running,
                ExperimentStatus::Paused,
                ExperimentStatus::Completed,
            ],
        )
    }

    fn transition(
        &self,
        test_id: &str,
        to: ExperimentStatus,
        allowed_from: &[ExperimentStatus],
    ) -> Result<Experiment> {
        let mut experiment = self.load(test_id)?;
        if !allowed_from.contains(&experiment.status) {
            return Err(Error::InvalidTransition {
                from: experiment.status,
                to,
            });
        }
        experiment.status = to;
        self.store.update_experiment(&experiment)?;
        info!(target: targets::LIFECYCLE, test_id, status = ?to, "status transition");
        Ok(experiment)
    }

    fn load(&self, test_id: &str) -> Result<Experiment> {
        self.store
            .experiment(test_id)?
            .ok_or_else(|| StoreError::ExperimentNotFound(test_id.to_string()).into())
    }

    /// Snapshot stats and attach per-variant significance vs control.
    fn build_results(&self, experiment: &Experiment) -> Result<Vec<VariantResult>> {
        let stats = self.store.variant_stats(&experiment.id)?;
        let control = stats.iter().find(|row| {
            experiment
                .variant(&row.variant_id)
                .is_some_and(|v| v.is_control())
        });
        let control_counts = control.map(SampleCounts::from);

        Ok(stats
            .iter()
            .map(|row| {
                let is_control = control
                    .map(|c| c.variant_id == row.variant_id)
                    .unwrap_or(false);
                let significance = if is_control {
                    None
                } else {
                    control_counts.map(|c| two_proportion_z(c, SampleCounts::from(row)))
                };
                VariantResult {
                    variant_id: row.variant_id.clone(),
                    users: row.users,
                    conversions: row.conversions,
                    revenue: row.revenue,
                    conversion_rate: row.conversion_rate(),
                    significance,
                }
            })
            .collect())
    }

    async fn notify_best_effort(&self, summary: &WinnerSummary) {
        let timeout = Duration::from_millis(self.config.notify_timeout_ms);
        match tokio::time::timeout(timeout, self.notifier.notify(summary)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(
                    target: targets::LIFECYCLE,
                    test_id = %summary.test_id,
                    error = %e,
                    "winner notification failed; rollout already committed"
                );
            }
            Err(_) => {
                warn!(
                    target: targets::LIFECYCLE,
                    test_id = %summary.test_id,
                    timeout_ms = self.config.notify_timeout_ms,
                    "winner notification timed out; rollout already committed"
                );
            }
        }
    }
}
