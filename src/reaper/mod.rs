//! Reaper - reclaims idle ephemeral filesystems
//!
//! One invocation is one pass:
//!
//! ```text
//! discover ──► for each id: observe ──► policy ──► (idle) delete + notify
//!                                                        │
//!                    post-check: discover again ◄────────┘
//!                      ├─ some remain  → leave the schedule armed
//!                      └─ none remain  → disable the schedule rule
//! ```
//!
//! Filesystems are evaluated sequentially and the first failure ends the
//! pass. The post-check runs only after every filesystem was evaluated, so it
//! sees this pass's own deletions.

pub mod discovery;
pub mod notify;
pub mod observer;
pub mod policy;

use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::ReaperSettings;
use crate::error::Result;
use crate::models::{validate_response, FileSystemId, Lifecycle};
use crate::services::Services;
use crate::trigger::{SwitchOutcome, TriggerSwitch};

pub use discovery::discover;
pub use observer::{observe, ResourceObservation};
pub use policy::{ActivityWindow, Evaluation, IdlePolicy, Verdict, ACTIVITY_THRESHOLD};

/// What the pass did to one filesystem
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReapAction {
    /// Left alone
    Kept,
    /// Deletion issued; carries the lifecycle reported afterwards
    Deleted { lifecycle: Lifecycle, notified: bool },
    /// Idle, but dry run is on
    WouldDelete,
}

/// Per-filesystem record of a pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceReport {
    pub observation: ResourceObservation,
    pub evaluation: Evaluation,
    pub action: ReapAction,
}

/// How the pass ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PassOutcome {
    /// Managed filesystems remain; the schedule stays armed
    ResourcesRemain { remaining: Vec<FileSystemId> },
    /// Nothing remains; the schedule was switched off (or absent)
    NoneRemain { trigger: SwitchOutcome },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassReport {
    pub resources: Vec<ResourceReport>,
    pub outcome: PassOutcome,
}

impl PassReport {
    pub fn deleted(&self) -> Vec<&str> {
        self.resources
            .iter()
            .filter(|r| matches!(r.action, ReapAction::Deleted { .. }))
            .map(|r| r.observation.id.as_str())
            .collect()
    }

    pub fn with_verdict(&self, verdict: Verdict) -> Vec<&str> {
        self.resources
            .iter()
            .filter(|r| r.evaluation.verdict == verdict)
            .map(|r| r.observation.id.as_str())
            .collect()
    }
}

pub struct Reaper {
    services: Services,
    clock: Arc<dyn Clock>,
    settings: ReaperSettings,
    policy: IdlePolicy,
    trigger: TriggerSwitch,
}

impl Reaper {
    pub fn new(services: Services, clock: Arc<dyn Clock>, settings: ReaperSettings) -> Self {
        let policy = IdlePolicy::new(
            settings.claimed_threshold_mins,
            settings.metric_interval_mins,
            settings.sampling_period_secs,
        );
        let trigger = TriggerSwitch::new(services.triggers.clone(), settings.trigger_prefix.clone());
        Self {
            services,
            clock,
            settings,
            policy,
            trigger,
        }
    }

    /// Run one full pass: evaluate every managed filesystem, then post-check
    pub async fn run_pass(&self) -> Result<PassReport> {
        info!(
            claimed_threshold_mins = self.settings.claimed_threshold_mins,
            metric_interval_mins = self.settings.metric_interval_mins,
            dry_run = self.settings.dry_run,
            "Reaper pass starting"
        );

        match self.pass().await {
            Ok(report) => {
                info!(
                    evaluated = report.resources.len(),
                    deleted = report.deleted().len(),
                    outcome = ?report.outcome,
                    "Reaper pass complete"
                );
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Reaper pass failed");
                Err(e)
            }
        }
    }

    async fn pass(&self) -> Result<PassReport> {
        let ids = discover(self.services.directory.as_ref()).await?;
        info!(count = ids.len(), file_systems = ?ids, "File systems");

        let end = self.clock.now_utc();
        let window = ActivityWindow {
            start: end - Duration::minutes(i64::from(self.settings.metric_interval_mins)),
            end,
        };

        let mut resources = Vec::with_capacity(ids.len());
        for id in &ids {
            resources.push(self.reap_one(id, window).await?);
        }

        let outcome = self.post_check().await?;
        Ok(PassReport { resources, outcome })
    }

    async fn reap_one(&self, id: &str, window: ActivityWindow) -> Result<ResourceReport> {
        info!(file_system_id = %id, "Checking file system");

        let observation = observe(
            self.services.file_systems.as_ref(),
            self.clock.as_ref(),
            id,
            self.settings.claimed_threshold_mins,
        )
        .await?;
        let evaluation = self
            .policy
            .evaluate(&observation, self.services.metrics.as_ref(), window)
            .await?;

        if let Some(average) = evaluation.average_rate {
            info!(file_system_id = %id, average_rate = average, "Average activity");
        }

        let action = match evaluation.verdict {
            Verdict::NotEligible | Verdict::Active => ReapAction::Kept,
            Verdict::Idle if self.settings.dry_run => {
                info!(
                    file_system_id = %id,
                    uptime_mins = observation.creation_age_mins,
                    "Would delete file system (dry run)"
                );
                ReapAction::WouldDelete
            }
            Verdict::Idle => self.delete_idle(&observation).await?,
        };

        Ok(ResourceReport {
            observation,
            evaluation,
            action,
        })
    }

    async fn delete_idle(&self, observation: &ResourceObservation) -> Result<ReapAction> {
        let id = observation.id.as_str();
        info!(file_system_id = %id, "Deleting file system");

        let envelope = self.services.file_systems.delete(id).await.map_err(|e| {
            error!(file_system_id = %id, error = %e, "Client error while deleting file system");
            e
        })?;
        let lifecycle = validate_response("DeleteFileSystem", envelope)?;

        let notified = self.notify_deletion(id, observation.creation_age_mins).await?;
        Ok(ReapAction::Deleted {
            lifecycle,
            notified,
        })
    }

    async fn notify_deletion(&self, id: &str, uptime_mins: f64) -> Result<bool> {
        let Some(channel) = self.settings.notification_channel.as_deref() else {
            warn!(file_system_id = %id, "No notification channel configured, skipping notice");
            return Ok(false);
        };

        let subject = notify::deletion_subject(id);
        let message = notify::deletion_message(id, self.settings.sampling_period_secs, uptime_mins);
        let envelope = self
            .services
            .notifier
            .publish(channel, &subject, &message)
            .await
            .map_err(|e| {
                error!(file_system_id = %id, error = %e, "Client error while publishing notice");
                e
            })?;
        validate_response("Publish", envelope)?;
        Ok(true)
    }

    /// Re-discover; disarm the schedule only when nothing is left
    async fn post_check(&self) -> Result<PassOutcome> {
        let remaining = discover(self.services.directory.as_ref()).await?;

        if !remaining.is_empty() {
            info!(file_systems = ?remaining, "Existing file systems");
            return Ok(PassOutcome::ResourcesRemain { remaining });
        }

        let trigger = self.trigger.disarm().await?;
        Ok(PassOutcome::NoneRemain { trigger })
    }
}
