//! Scheduled-trigger switch
//!
//! The reaper's schedule rule is found by name prefix. The provisioner arms
//! it after every creation and the reaper disarms it once no managed
//! filesystem remains. A missing rule is logged and left alone.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::models::validate_response;
use crate::services::TriggerControl;

/// What a switch attempt did
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "result", content = "rule", rename_all = "snake_case")]
pub enum SwitchOutcome {
    /// The named rule was enabled
    Enabled(String),
    /// The named rule was disabled
    Disabled(String),
    /// No rule carries the prefix
    NotFound,
    /// No prefix is configured
    Unconfigured,
}

pub struct TriggerSwitch {
    triggers: Arc<dyn TriggerControl>,
    prefix: Option<String>,
}

impl TriggerSwitch {
    pub fn new(triggers: Arc<dyn TriggerControl>, prefix: Option<String>) -> Self {
        Self { triggers, prefix }
    }

    /// Enable the reaper's rule
    pub async fn arm(&self) -> Result<SwitchOutcome> {
        let Some(rule) = self.find_rule().await? else {
            return Ok(self.absent_outcome());
        };
        info!(rule = %rule, "Enabling event");
        let envelope = self.triggers.enable_rule(&rule).await.map_err(|e| {
            error!(rule = %rule, error = %e, "Client error while enabling event");
            e
        })?;
        validate_response("EnableRule", envelope)?;
        Ok(SwitchOutcome::Enabled(rule))
    }

    /// Disable the reaper's rule
    pub async fn disarm(&self) -> Result<SwitchOutcome> {
        let Some(rule) = self.find_rule().await? else {
            return Ok(self.absent_outcome());
        };
        info!(rule = %rule, "Disabling event");
        let envelope = self.triggers.disable_rule(&rule).await.map_err(|e| {
            error!(rule = %rule, error = %e, "Client error while disabling event");
            e
        })?;
        validate_response("DisableRule", envelope)?;
        Ok(SwitchOutcome::Disabled(rule))
    }

    /// First rule under the prefix; at most one is expected
    async fn find_rule(&self) -> Result<Option<String>> {
        let Some(prefix) = self.prefix.as_deref() else {
            warn!("No event name prefix configured, leaving schedule untouched");
            return Ok(None);
        };

        let envelope = self.triggers.list_rules(prefix, 1).await.map_err(|e| {
            error!(prefix, error = %e, "Client error while listing event rules");
            e
        })?;
        let rule = validate_response("ListRules", envelope)?.into_iter().next();
        if rule.is_none() {
            info!(prefix, "No event rules found with prefix");
        }
        Ok(rule)
    }

    fn absent_outcome(&self) -> SwitchOutcome {
        if self.prefix.is_some() {
            SwitchOutcome::NotFound
        } else {
            SwitchOutcome::Unconfigured
        }
    }
}
