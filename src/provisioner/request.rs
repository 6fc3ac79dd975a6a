//! Provisioner request and response shapes
//!
//! Requests arrive as one flat object keyed by `operation`; which of the
//! other fields are required depends on the operation. [`ProvisionerRequest::into_action`]
//! turns the flat shape into a typed [`Action`] or an `InvalidRequest` error.

use serde::{Deserialize, Serialize};

use crate::error::{LifecycleError, Result};
use crate::models::{FileSystemId, Lifecycle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Status,
    Delete,
}

/// Raw request: `{operation, team, bucket, file_system_id}`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProvisionerRequest {
    pub operation: Option<Operation>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub file_system_id: Option<FileSystemId>,
}

/// A request with every field its operation needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Create { team: String, bucket: String },
    Status { file_system_id: FileSystemId },
    Delete { file_system_id: FileSystemId },
}

impl ProvisionerRequest {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| LifecycleError::InvalidRequest(e.to_string()))
    }

    pub fn into_action(self) -> Result<Action> {
        let operation = self
            .operation
            .ok_or_else(|| LifecycleError::InvalidRequest("operation is required".to_string()))?;

        match operation {
            Operation::Create => Ok(Action::Create {
                team: required("team", self.team)?,
                bucket: required("bucket", self.bucket)?,
            }),
            Operation::Status => Ok(Action::Status {
                file_system_id: required("file_system_id", self.file_system_id)?,
            }),
            Operation::Delete => Ok(Action::Delete {
                file_system_id: required("file_system_id", self.file_system_id)?,
            }),
        }
    }
}

fn required(field: &str, value: Option<String>) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| LifecycleError::InvalidRequest(format!("{} is required", field)))
}

/// `{"id": ...}` for create, a bare lifecycle string for status and delete
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProvisionerResponse {
    Created { id: FileSystemId },
    State(Lifecycle),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_requires_team_and_bucket() {
        let req = ProvisionerRequest::from_json(r#"{"operation": "create", "team": "vision"}"#).unwrap();
        let err = req.into_action().unwrap_err();
        assert_eq!(err, LifecycleError::InvalidRequest("bucket is required".to_string()));
    }

    #[test]
    fn test_status_request_parses() {
        let req =
            ProvisionerRequest::from_json(r#"{"operation": "status", "file_system_id": "fs-1"}"#).unwrap();
        assert_eq!(
            req.into_action().unwrap(),
            Action::Status { file_system_id: "fs-1".to_string() }
        );
    }

    #[test]
    fn test_missing_or_unknown_operation_is_rejected() {
        let req = ProvisionerRequest::from_json(r#"{"file_system_id": "fs-1"}"#).unwrap();
        assert!(req.into_action().is_err());

        assert!(matches!(
            ProvisionerRequest::from_json(r#"{"operation": "resize"}"#),
            Err(LifecycleError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_response_shapes() {
        let created = ProvisionerResponse::Created { id: "fs-1".to_string() };
        assert_eq!(serde_json::to_string(&created).unwrap(), r#"{"id":"fs-1"}"#);

        let state = ProvisionerResponse::State(Lifecycle::Misconfigured);
        assert_eq!(serde_json::to_string(&state).unwrap(), r#""MISCONFIGURED""#);
    }
}
