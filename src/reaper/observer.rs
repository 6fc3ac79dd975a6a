//! Observer - per-resource inputs to the idle policy
//!
//! One describe call per filesystem per pass yields claim age, creation age
//! and lifecycle. Lifecycle is re-read every pass so a filesystem another
//! pass already started deleting is seen as `DELETING`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::clock::Clock;
use crate::error::Result;
use crate::models::*;
use crate::services::FileSystemService;

/// Minutes added to the claim threshold when a filesystem carries no usable claim
pub const CLAIM_FALLBACK_MARGIN_MINS: u32 = 5;

/// Inputs the idle policy decides on
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceObservation {
    pub id: FileSystemId,
    pub claim_age_mins: f64,
    pub creation_age_mins: f64,
    pub lifecycle: Lifecycle,
}

/// Describe `id` and derive its observation
pub async fn observe(
    file_systems: &dyn FileSystemService,
    clock: &dyn Clock,
    id: &str,
    claimed_threshold_mins: u32,
) -> Result<ResourceObservation> {
    let envelope = file_systems.describe(id).await.map_err(|e| {
        error!(file_system_id = %id, error = %e, "Client error while describing file system");
        e
    })?;
    let snapshot = validate_response("DescribeFileSystems", envelope)?;

    let claim_age_mins = claim_age_minutes(
        snapshot.tag(TAG_CLAIMED_AT),
        clock.now_local(),
        claimed_threshold_mins,
    );
    let creation_age_mins = creation_age_minutes(snapshot.created_at, clock.now_utc());

    debug!(
        file_system_id = %id,
        claim_age_mins,
        creation_age_mins,
        lifecycle = %snapshot.lifecycle,
        "Observed file system"
    );

    Ok(ResourceObservation {
        id: snapshot.id,
        claim_age_mins,
        creation_age_mins,
        lifecycle: snapshot.lifecycle,
    })
}

/// Minutes since the `ClaimedAt` tag value.
///
/// A missing, empty or unparsable tag yields `threshold + 5`, so the
/// filesystem passes the claim gate on this pass.
pub fn claim_age_minutes(
    claimed_at: Option<&str>,
    now_local: NaiveDateTime,
    claimed_threshold_mins: u32,
) -> f64 {
    let fallback = f64::from(claimed_threshold_mins) + f64::from(CLAIM_FALLBACK_MARGIN_MINS);

    let Some(raw) = claimed_at.filter(|v| !v.trim().is_empty()) else {
        return fallback;
    };

    match parse_tag_timestamp(TAG_CLAIMED_AT, raw) {
        Ok(claimed) => minutes_between(claimed, now_local),
        Err(e) => {
            warn!(value = raw, error = %e, "Treating unparsable claim as unclaimed");
            fallback
        }
    }
}

/// Minutes since creation, measured between absolute instants
pub fn creation_age_minutes(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - created_at).num_milliseconds() as f64 / 60_000.0
}

fn minutes_between(earlier: NaiveDateTime, later: NaiveDateTime) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 60_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::services::mock::{MockCloud, MockFileSystem};
    use chrono::{Duration, TimeZone};

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_missing_claim_uses_threshold_plus_five() {
        let now = noon().naive_utc();
        assert_eq!(claim_age_minutes(None, now, 60), 65.0);
        assert_eq!(claim_age_minutes(Some(""), now, 60), 65.0);
        assert_eq!(claim_age_minutes(Some("   "), now, 0), 5.0);
    }

    #[test]
    fn test_missing_claim_at_maximum_threshold() {
        let now = noon().naive_utc();
        let age = claim_age_minutes(None, now, u32::MAX);
        assert_eq!(age, f64::from(u32::MAX) + 5.0);
        assert!(age > f64::from(u32::MAX));
    }

    #[test]
    fn test_unparsable_claim_uses_fallback() {
        let now = noon().naive_utc();
        assert_eq!(claim_age_minutes(Some("not-a-date"), now, 30), 35.0);
    }

    #[test]
    fn test_claim_age_from_tag() {
        let now = noon().naive_utc();
        let claimed = format_tag_timestamp(now - Duration::minutes(90));
        assert_eq!(claim_age_minutes(Some(&claimed), now, 60), 90.0);
    }

    #[test]
    fn test_claim_age_keeps_fractional_minutes() {
        let now = noon().naive_utc();
        let claimed = format_tag_timestamp(now - Duration::seconds(90));
        assert_eq!(claim_age_minutes(Some(&claimed), now, 60), 1.5);
    }

    #[test]
    fn test_creation_age_spans_days() {
        let created = noon() - Duration::days(2) - Duration::minutes(3);
        assert_eq!(creation_age_minutes(created, noon()), 2.0 * 24.0 * 60.0 + 3.0);
    }

    #[tokio::test]
    async fn test_observe_reads_one_snapshot() {
        let now = noon();
        let cloud = MockCloud::new().with_file_system(
            MockFileSystem::managed("fs-1", now - Duration::minutes(45))
                .claimed_at(now.naive_utc() - Duration::minutes(20))
                .lifecycle(Lifecycle::Updating),
        );
        let clock = FixedClock::new(now);

        let obs = observe(&cloud, &clock, "fs-1", 60).await.unwrap();

        assert_eq!(obs.id, "fs-1");
        assert_eq!(obs.claim_age_mins, 20.0);
        assert_eq!(obs.creation_age_mins, 45.0);
        assert_eq!(obs.lifecycle, Lifecycle::Updating);
        assert_eq!(cloud.calls().described, vec!["fs-1".to_string()]);
    }

    #[tokio::test]
    async fn test_observe_unknown_file_system_fails() {
        let cloud = MockCloud::new();
        let clock = FixedClock::new(noon());
        assert!(observe(&cloud, &clock, "fs-missing", 60).await.is_err());
    }
}
