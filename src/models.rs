//! Shared types for managed filesystems
//!
//! Core types for filesystem snapshots, lifecycle states, resource tags,
//! and the response envelope every remote call is validated through.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

use crate::error::{LifecycleError, Result};

/// Identifier assigned by the provisioning service (e.g. `fs-0123456789abcdef0`)
pub type FileSystemId = String;

//=============================================================================
// TAGS
//=============================================================================

pub const TAG_NAME: &str = "Name";
pub const TAG_EPHEMERAL: &str = "Ephemeral";
pub const TAG_CREATED_BY: &str = "CreatedBy";
pub const TAG_CREATED_AT: &str = "CreatedAt";
pub const TAG_CLAIMED_AT: &str = "ClaimedAt";

/// Required value of the `Ephemeral` discovery tag
pub const EPHEMERAL_VALUE: &str = "true";

/// Required value of the `CreatedBy` discovery tag
pub const OWNER_VALUE: &str = "MLOps";

/// Local-clock format of `ClaimedAt` / `CreatedAt` tag values
pub const TAG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Tag filters a resource must carry to be discovered
pub fn discovery_filters() -> [(&'static str, &'static str); 2] {
    [
        (TAG_EPHEMERAL, EPHEMERAL_VALUE),
        (TAG_CREATED_BY, OWNER_VALUE),
    ]
}

/// Render a local wall-clock time the way tag timestamps are stored
pub fn format_tag_timestamp(at: NaiveDateTime) -> String {
    at.format(TAG_TIMESTAMP_FORMAT).to_string()
}

/// Parse a tag timestamp.
///
/// Values written without a fractional part (whole seconds) are accepted too.
pub fn parse_tag_timestamp(field: &'static str, value: &str) -> Result<NaiveDateTime> {
    let trimmed = value.trim();
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| {
            warn!(field, value, error = %e, "Unparsable tag timestamp");
            LifecycleError::InvalidValue {
                field,
                value: value.to_string(),
            }
        })
}

/// Extract the filesystem id from an ARN such as
/// `arn:aws:fsx:us-east-1:123456789012:file-system/fs-0123`.
pub fn file_system_id_from_arn(arn: &str) -> Option<&str> {
    arn.split('/').nth(1).filter(|id| !id.is_empty())
}

//=============================================================================
// LIFECYCLE
//=============================================================================

/// Lifecycle state reported by the provisioning service.
///
/// Used for both the filesystem itself and its data-repository sub-resource.
/// The core only reads these; the service owns every transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Lifecycle {
    Creating,
    Available,
    Updating,
    Deleting,
    Misconfigured,
    MisconfiguredUnavailable,
    Failed,
    /// Any state this crate does not name
    Other(String),
}

impl Lifecycle {
    pub fn as_str(&self) -> &str {
        match self {
            Lifecycle::Creating => "CREATING",
            Lifecycle::Available => "AVAILABLE",
            Lifecycle::Updating => "UPDATING",
            Lifecycle::Deleting => "DELETING",
            Lifecycle::Misconfigured => "MISCONFIGURED",
            Lifecycle::MisconfiguredUnavailable => "MISCONFIGURED_UNAVAILABLE",
            Lifecycle::Failed => "FAILED",
            Lifecycle::Other(s) => s,
        }
    }
}

impl From<&str> for Lifecycle {
    fn from(value: &str) -> Self {
        match value {
            "CREATING" => Lifecycle::Creating,
            "AVAILABLE" => Lifecycle::Available,
            "UPDATING" => Lifecycle::Updating,
            "DELETING" => Lifecycle::Deleting,
            "MISCONFIGURED" => Lifecycle::Misconfigured,
            "MISCONFIGURED_UNAVAILABLE" => Lifecycle::MisconfiguredUnavailable,
            "FAILED" => Lifecycle::Failed,
            other => Lifecycle::Other(other.to_string()),
        }
    }
}

impl From<String> for Lifecycle {
    fn from(value: String) -> Self {
        Lifecycle::from(value.as_str())
    }
}

impl From<Lifecycle> for String {
    fn from(value: Lifecycle) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//=============================================================================
// SNAPSHOTS
//=============================================================================

/// Point-in-time description of a managed filesystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSystemSnapshot {
    pub id: FileSystemId,
    pub resource_arn: Option<String>,
    pub lifecycle: Lifecycle,
    pub created_at: DateTime<Utc>,
    pub tags: BTreeMap<String, String>,
    /// Lifecycle of the attached data-repository association, if any
    pub data_repository: Option<Lifecycle>,
}

impl FileSystemSnapshot {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Whether both discovery tags carry their exact expected values
    pub fn is_managed(&self) -> bool {
        discovery_filters()
            .iter()
            .all(|(key, value)| self.tag(key) == Some(*value))
    }
}

/// Parameters of a filesystem creation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateFileSystemSpec {
    /// Idempotency token; identical tokens collide instead of duplicating
    pub client_request_token: String,
    pub storage_capacity_gib: i32,
    pub subnet_id: String,
    pub security_group_ids: Vec<String>,
    pub import_path: String,
    pub tags: BTreeMap<String, String>,
}

/// Result of a creation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedFileSystem {
    pub id: FileSystemId,
    pub resource_arn: String,
}

/// Aggregate operation counts for one reporting period
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationCounts {
    pub read: f64,
    pub write: f64,
    pub metadata: f64,
}

impl OperationCounts {
    pub fn total(&self) -> f64 {
        self.read + self.write + self.metadata
    }
}

/// One page of discovery results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryPage {
    pub resource_arns: Vec<String>,
    pub next_token: Option<String>,
}

//=============================================================================
// RESPONSE ENVELOPE
//=============================================================================

/// A remote call result together with its HTTP status
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub status: u16,
    pub body: T,
}

impl<T> Envelope<T> {
    pub fn ok(body: T) -> Self {
        Self { status: 200, body }
    }
}

/// Uniform response check: anything but 200 is a failure of the call.
pub fn validate_response<T>(operation: &'static str, envelope: Envelope<T>) -> Result<T> {
    if envelope.status != 200 {
        warn!(operation, status = envelope.status, "Invalid http status code");
        return Err(LifecycleError::UnexpectedStatus {
            operation,
            status: envelope.status,
        });
    }
    Ok(envelope.body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_tag_timestamp_roundtrip_keeps_microseconds() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_micro_opt(14, 5, 7, 120034)
            .unwrap();

        let rendered = format_tag_timestamp(at);
        assert_eq!(rendered, "2024-03-09 14:05:07.120034");
        assert_eq!(parse_tag_timestamp(TAG_CLAIMED_AT, &rendered).unwrap(), at);
    }

    #[test]
    fn test_tag_timestamp_without_fraction() {
        let parsed = parse_tag_timestamp(TAG_CLAIMED_AT, "2024-03-09 14:05:07").unwrap();
        assert_eq!(parsed.to_string(), "2024-03-09 14:05:07");
    }

    #[test]
    fn test_tag_timestamp_rejects_garbage() {
        let err = parse_tag_timestamp(TAG_CLAIMED_AT, "yesterday").unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidValue { field: "ClaimedAt", .. }));
    }

    #[test]
    fn test_file_system_id_from_arn() {
        assert_eq!(
            file_system_id_from_arn("arn:aws:fsx:us-east-1:123456789012:file-system/fs-0abc"),
            Some("fs-0abc")
        );
        assert_eq!(file_system_id_from_arn("arn:aws:fsx:us-east-1:123:file-system"), None);
        assert_eq!(file_system_id_from_arn("arn:aws:fsx:us-east-1:123:file-system/"), None);
    }

    #[test]
    fn test_lifecycle_parsing() {
        assert_eq!(Lifecycle::from("DELETING"), Lifecycle::Deleting);
        assert_eq!(Lifecycle::from("MISCONFIGURED"), Lifecycle::Misconfigured);
        assert_eq!(
            Lifecycle::from("SOMETHING_NEW"),
            Lifecycle::Other("SOMETHING_NEW".to_string())
        );
        assert_eq!(Lifecycle::Other("X".into()).to_string(), "X");
    }

    #[test]
    fn test_lifecycle_serializes_as_bare_string() {
        let json = serde_json::to_string(&Lifecycle::Available).unwrap();
        assert_eq!(json, "\"AVAILABLE\"");
        let back: Lifecycle = serde_json::from_str("\"FAILED\"").unwrap();
        assert_eq!(back, Lifecycle::Failed);
    }

    #[test]
    fn test_is_managed_requires_exact_values() {
        let mut snapshot = FileSystemSnapshot {
            id: "fs-1".to_string(),
            resource_arn: None,
            lifecycle: Lifecycle::Available,
            created_at: Utc::now(),
            tags: BTreeMap::new(),
            data_repository: None,
        };
        assert!(!snapshot.is_managed());

        snapshot.tags.insert(TAG_EPHEMERAL.into(), "true".into());
        snapshot.tags.insert(TAG_CREATED_BY.into(), "mlops".into());
        assert!(!snapshot.is_managed());

        snapshot.tags.insert(TAG_CREATED_BY.into(), OWNER_VALUE.into());
        assert!(snapshot.is_managed());
    }

    #[test]
    fn test_validate_response() {
        assert_eq!(validate_response("DescribeFileSystems", Envelope::ok(7)).unwrap(), 7);

        let err = validate_response("DeleteFileSystem", Envelope { status: 503, body: () })
            .unwrap_err();
        assert_eq!(
            err,
            LifecycleError::UnexpectedStatus {
                operation: "DeleteFileSystem",
                status: 503
            }
        );
    }
}
