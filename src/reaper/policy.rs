//! Idle policy - decides whether a filesystem is reclaimed
//!
//! Two stages. The eligibility gate keeps freshly claimed, freshly created
//! and already-deleting filesystems out of consideration. For eligible ones,
//! the average operation rate over the metric window is compared with
//! [`ACTIVITY_THRESHOLD`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error};

use super::observer::ResourceObservation;
use crate::error::Result;
use crate::models::{validate_response, Lifecycle, OperationCounts};
use crate::services::MetricsService;

/// Average operations/second at or above which a filesystem counts as in use
pub const ACTIVITY_THRESHOLD: f64 = 0.40;

/// Outcome of evaluating one filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Claimed or created too recently, or already deleting
    NotEligible,
    /// Eligible, but activity is at or above the threshold
    Active,
    /// Eligible and below the threshold; reclaim it
    Idle,
}

/// Verdict plus the measured average, when activity was sampled
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub average_rate: Option<f64>,
}

/// Time range activity is sampled over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdlePolicy {
    pub claimed_threshold_mins: u32,
    pub metric_interval_mins: u32,
    pub sampling_period_secs: u32,
    pub activity_threshold: f64,
}

impl IdlePolicy {
    pub fn new(claimed_threshold_mins: u32, metric_interval_mins: u32, sampling_period_secs: u32) -> Self {
        Self {
            claimed_threshold_mins,
            metric_interval_mins,
            sampling_period_secs,
            activity_threshold: ACTIVITY_THRESHOLD,
        }
    }

    /// All three must hold before activity is even measured
    pub fn is_eligible(&self, claim_age_mins: f64, creation_age_mins: f64, lifecycle: &Lifecycle) -> bool {
        let claimed_long_enough = claim_age_mins > f64::from(self.claimed_threshold_mins);
        let old_enough = creation_age_mins > f64::from(self.metric_interval_mins);
        let not_deleting = *lifecycle != Lifecycle::Deleting;

        claimed_long_enough && old_enough && not_deleting
    }

    /// Threshold decision on an average rate; the threshold itself is active
    pub fn decide(&self, average_rate: f64) -> Verdict {
        if average_rate >= self.activity_threshold {
            Verdict::Active
        } else {
            Verdict::Idle
        }
    }

    /// Gate, then sample activity and decide
    pub async fn evaluate(
        &self,
        observation: &ResourceObservation,
        metrics: &dyn MetricsService,
        window: ActivityWindow,
    ) -> Result<Evaluation> {
        if !self.is_eligible(
            observation.claim_age_mins,
            observation.creation_age_mins,
            &observation.lifecycle,
        ) {
            debug!(file_system_id = %observation.id, "Not yet eligible for reaping");
            return Ok(Evaluation {
                verdict: Verdict::NotEligible,
                average_rate: None,
            });
        }

        let envelope = metrics
            .operation_counts(&observation.id, window.start, window.end, self.sampling_period_secs)
            .await
            .map_err(|e| {
                error!(file_system_id = %observation.id, error = %e, "Client error while reading metrics");
                e
            })?;
        let samples = validate_response("GetMetricData", envelope)?;

        let rates = activity_rates(&samples, self.sampling_period_secs);
        let average = average_rate(&rates);
        let verdict = self.decide(average);

        debug!(
            file_system_id = %observation.id,
            samples = rates.len(),
            average_rate = average,
            verdict = ?verdict,
            "Measured activity"
        );

        Ok(Evaluation {
            verdict,
            average_rate: Some(average),
        })
    }
}

/// Operations per second for each reporting period
pub fn activity_rates(samples: &[OperationCounts], period_secs: u32) -> Vec<f64> {
    let period = f64::from(period_secs);
    samples.iter().map(|s| s.total() / period).collect()
}

/// Mean of the rates; an empty series averages to exactly `0.0`
pub fn average_rate(rates: &[f64]) -> f64 {
    if rates.is_empty() {
        return 0.0;
    }
    rates.iter().sum::<f64>() / rates.len() as f64
}
