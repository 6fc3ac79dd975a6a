//! Provisioner requests against the in-memory cloud

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use fsx_lifecycle::config::ProvisionerSettings;
use fsx_lifecycle::models::{Lifecycle, TAG_CLAIMED_AT, TAG_NAME};
use fsx_lifecycle::provisioner::{
    FixedSelector, Operation, Provisioner, ProvisionerRequest, ProvisionerResponse,
};
use fsx_lifecycle::services::mock::{ops, MockCloud, MockFileSystem};
use fsx_lifecycle::{FixedClock, LifecycleError};

fn settings() -> ProvisionerSettings {
    ProvisionerSettings {
        subnets: vec!["subnet-a".to_string(), "subnet-b".to_string()],
        security_groups: vec!["sg-a".to_string()],
        apply_security_groups: true,
        trigger_prefix: Some("fsx-monitor".to_string()),
    }
}

fn provisioner(cloud: &Arc<MockCloud>) -> Provisioner {
    let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
    Provisioner::new(cloud.clone(), cloud.clone(), Arc::new(clock), settings())
        .with_selector(FixedSelector(0))
}

fn request(raw: &str) -> ProvisionerRequest {
    ProvisionerRequest::from_json(raw).unwrap()
}

#[tokio::test]
async fn test_create_request_returns_id_and_arms_schedule() {
    let cloud = Arc::new(MockCloud::new().with_rule("fsx-monitor-schedule", false));
    let p = provisioner(&cloud);

    let response = p
        .handle(request(r#"{"operation": "create", "team": "vision", "bucket": "datasets"}"#))
        .await
        .unwrap();

    let id = match response {
        ProvisionerResponse::Created { id } => id,
        other => panic!("expected a created response, got {:?}", other),
    };
    let snapshot = cloud.snapshot(&id).unwrap();
    assert!(snapshot.is_managed());
    assert_eq!(snapshot.tag(TAG_NAME), Some("vision-datasets"));
    assert!(snapshot.tag(TAG_CLAIMED_AT).is_some());
    assert_eq!(cloud.calls().created[0].import_path, "s3://datasets/vision");
    assert_eq!(cloud.rule_enabled("fsx-monitor-schedule"), Some(true));
}

#[tokio::test]
async fn test_repeated_create_reuses_token() {
    let cloud = Arc::new(MockCloud::new());
    let p = provisioner(&cloud);

    let first = p.create("vision", "datasets").await.unwrap();
    let second = p.create("vision", "datasets").await.unwrap();

    let created = cloud.calls().created;
    assert_eq!(created.len(), 2);
    assert_eq!(created[0].client_request_token, "vision-datasets");
    assert_eq!(created[0].client_request_token, created[1].client_request_token);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_status_prefers_misconfigured_data_repository() {
    let cloud = Arc::new(MockCloud::new().with_file_system(
        MockFileSystem::managed("fs-1", Utc::now())
            .lifecycle(Lifecycle::Available)
            .data_repository(Some(Lifecycle::Misconfigured)),
    ));
    let p = provisioner(&cloud);

    let response = p
        .handle(request(r#"{"operation": "status", "file_system_id": "fs-1"}"#))
        .await
        .unwrap();

    assert_eq!(response, ProvisionerResponse::State(Lifecycle::Misconfigured));
    assert_eq!(serde_json::to_string(&response).unwrap(), r#""MISCONFIGURED""#);
}

#[tokio::test]
async fn test_status_of_healthy_file_system() {
    let cloud = Arc::new(MockCloud::new().with_file_system(MockFileSystem::managed("fs-1", Utc::now())));
    let p = provisioner(&cloud);

    assert_eq!(p.status("fs-1").await.unwrap(), Lifecycle::Available);
}

#[tokio::test]
async fn test_delete_returns_lifecycle() {
    let cloud = Arc::new(MockCloud::new().with_file_system(MockFileSystem::managed("fs-1", Utc::now())));
    let p = provisioner(&cloud);

    let response = p
        .handle(request(r#"{"operation": "delete", "file_system_id": "fs-1"}"#))
        .await
        .unwrap();

    assert_eq!(response, ProvisionerResponse::State(Lifecycle::Deleting));
    assert_eq!(cloud.calls().deleted, vec!["fs-1".to_string()]);
}

#[tokio::test]
async fn test_request_missing_field_is_rejected_before_any_call() {
    let cloud = Arc::new(MockCloud::new());
    let p = provisioner(&cloud);

    let err = tokio_test::assert_err!(p.handle(request(r#"{"operation": "delete"}"#)).await);

    assert!(matches!(err, LifecycleError::InvalidRequest(_)));
    assert!(cloud.calls().deleted.is_empty());
}

#[tokio::test]
async fn test_non_200_status_is_an_error() {
    let cloud = Arc::new(MockCloud::new().with_file_system(MockFileSystem::managed("fs-1", Utc::now())));
    cloud.respond_with_status(ops::DESCRIBE, 403);
    let p = provisioner(&cloud);

    let err = p.status("fs-1").await.unwrap_err();
    assert_eq!(
        err,
        LifecycleError::UnexpectedStatus { operation: "DescribeFileSystems", status: 403 }
    );
}

#[tokio::test]
async fn test_request_built_from_subcommand_fields() {
    let cloud = Arc::new(MockCloud::new().with_file_system(MockFileSystem::managed("fs-1", Utc::now())));
    let p = provisioner(&cloud);

    let status = ProvisionerRequest {
        operation: Some(Operation::Status),
        file_system_id: Some("fs-1".to_string()),
        ..Default::default()
    };
    assert_eq!(
        p.handle(status).await.unwrap(),
        ProvisionerResponse::State(Lifecycle::Available)
    );

    let blank = ProvisionerRequest {
        operation: Some(Operation::Delete),
        file_system_id: Some("  ".to_string()),
        ..Default::default()
    };
    let err = tokio_test::assert_err!(p.handle(blank).await);
    assert_eq!(err, LifecycleError::InvalidRequest("file_system_id is required".to_string()));
    assert!(cloud.calls().deleted.is_empty());
}

#[test]
fn test_malformed_json_is_an_invalid_request() {
    let err = ProvisionerRequest::from_json("{not json").unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidRequest(_)));
}
