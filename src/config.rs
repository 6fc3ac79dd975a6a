//! Configuration for fsx-lifecycle
//!
//! Every setting is sourced from the environment through clap, the same way
//! the process was configured when it ran as a scheduled function. Settings
//! are optional at parse time and validated per entry point, so `status`
//! does not demand reaper thresholds and `reap` does not demand subnets.

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::error::{LifecycleError, Result};

/// Provisioner and idle reaper for ephemeral shared filesystems
#[derive(Parser, Debug, Clone)]
#[command(name = "fsx-lifecycle")]
#[command(about = "Provision ephemeral filesystems and reap idle ones")]
pub struct Args {
    /// Granularity of each activity data point, in seconds
    #[arg(long, env = "DATA_POINTS_PERIOD_SECS")]
    pub data_points_period_secs: Option<u32>,

    /// Activity lookback window and minimum creation age, in minutes
    #[arg(long, env = "METRIC_INTERVAL_MINS")]
    pub metric_interval_mins: Option<u32>,

    /// Minimum claim age before a filesystem may be reaped, in minutes
    #[arg(long, env = "CLAIMED_TIME_MINS")]
    pub claimed_time_mins: Option<u32>,

    /// Notification topic for idle-deletion alerts
    #[arg(long, env = "SNS_ARN")]
    pub sns_arn: Option<String>,

    /// Name prefix of the schedule rule that invokes the reaper
    #[arg(long, env = "EVENT_NAME_PREFIX")]
    pub event_name_prefix: Option<String>,

    /// Comma-separated subnet candidates for new filesystems
    #[arg(long, env = "SUBNETS")]
    pub subnets: Option<String>,

    /// Comma-separated security-group candidates for new filesystems
    #[arg(long, env = "SECURITY_GROUPS")]
    pub security_groups: Option<String>,

    /// Attach the selected security group at creation
    #[arg(long, env = "APPLY_SECURITY_GROUPS", default_value = "true", action = clap::ArgAction::Set)]
    pub apply_security_groups: bool,

    /// Report idle filesystems without deleting them
    #[arg(long, env = "DRY_RUN", default_value = "false", action = clap::ArgAction::Set)]
    pub dry_run: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text or json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run one reaper pass over every managed filesystem
    Reap,

    /// Create a filesystem for a team's bucket
    Create {
        #[arg(long)]
        team: String,
        #[arg(long)]
        bucket: String,
    },

    /// Report a filesystem's lifecycle state
    Status {
        #[arg(long)]
        file_system_id: String,
    },

    /// Delete a filesystem
    Delete {
        #[arg(long)]
        file_system_id: String,
    },

    /// Handle a raw JSON provisioner request
    Handle {
        /// e.g. '{"operation": "status", "file_system_id": "fs-0123"}'
        request: String,
    },
}

/// Settings for a reaper pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReaperSettings {
    pub sampling_period_secs: u32,
    pub metric_interval_mins: u32,
    pub claimed_threshold_mins: u32,
    pub notification_channel: Option<String>,
    pub trigger_prefix: Option<String>,
    pub dry_run: bool,
}

/// Settings for provisioner operations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionerSettings {
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub apply_security_groups: bool,
    pub trigger_prefix: Option<String>,
}

impl Args {
    /// Validate the settings a reaper pass needs
    pub fn reaper_settings(&self) -> Result<ReaperSettings> {
        let sampling_period_secs =
            require_positive("DATA_POINTS_PERIOD_SECS", self.data_points_period_secs)?;
        let metric_interval_mins =
            require_positive("METRIC_INTERVAL_MINS", self.metric_interval_mins)?;
        let claimed_threshold_mins = self
            .claimed_time_mins
            .ok_or_else(|| missing("CLAIMED_TIME_MINS"))?;

        Ok(ReaperSettings {
            sampling_period_secs,
            metric_interval_mins,
            claimed_threshold_mins,
            notification_channel: non_empty(self.sns_arn.as_deref()),
            trigger_prefix: non_empty(self.event_name_prefix.as_deref()),
            dry_run: self.dry_run,
        })
    }

    /// Validate the settings status/delete need. Create additionally
    /// requires candidate pools, checked by [`ProvisionerSettings::require_pools`].
    pub fn provisioner_settings(&self) -> ProvisionerSettings {
        ProvisionerSettings {
            subnets: split_pool(self.subnets.as_deref()),
            security_groups: split_pool(self.security_groups.as_deref()),
            apply_security_groups: self.apply_security_groups,
            trigger_prefix: non_empty(self.event_name_prefix.as_deref()),
        }
    }
}

impl ProvisionerSettings {
    pub fn require_pools(&self) -> Result<()> {
        if self.subnets.is_empty() {
            return Err(missing("SUBNETS"));
        }
        if self.apply_security_groups && self.security_groups.is_empty() {
            return Err(missing("SECURITY_GROUPS"));
        }
        Ok(())
    }
}

/// Split a comma-separated pool, trimming entries and dropping empty ones
pub fn split_pool(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|entry| entry.trim().to_string())
            .filter(|entry| !entry.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn missing(name: &str) -> LifecycleError {
    LifecycleError::InvalidConfig(format!("{} is required", name))
}

fn require_positive(name: &str, value: Option<u32>) -> Result<u32> {
    match value {
        None => Err(missing(name)),
        Some(0) => Err(LifecycleError::InvalidConfig(format!(
            "{} must be greater than zero",
            name
        ))),
        Some(v) => Ok(v),
    }
}
