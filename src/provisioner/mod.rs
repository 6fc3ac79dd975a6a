//! Provisioner - creates, reports on and deletes managed filesystems
//!
//! Create derives a deterministic name from team and bucket, which doubles as
//! the creation idempotency token, tags the new filesystem as managed and
//! claimed, then re-arms the reaper's schedule.

pub mod placement;
pub mod request;

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::clock::Clock;
use crate::config::ProvisionerSettings;
use crate::error::{LifecycleError, Result};
use crate::models::*;
use crate::services::{FileSystemService, TriggerControl};
use crate::trigger::TriggerSwitch;

pub use placement::{FixedSelector, PlacementSelector, RandomSelector};
pub use request::{Action, Operation, ProvisionerRequest, ProvisionerResponse};

/// Capacity of every filesystem the provisioner creates
pub const STORAGE_CAPACITY_GIB: i32 = 4800;

/// Name and idempotency token for a team's bucket
pub fn file_system_name(team: &str, bucket: &str) -> String {
    format!("{}-{}", team, bucket)
}

/// Object-store prefix the filesystem imports from
pub fn import_path(team: &str, bucket: &str) -> String {
    format!("s3://{}/{}", bucket, team)
}

pub struct Provisioner {
    file_systems: Arc<dyn FileSystemService>,
    trigger: TriggerSwitch,
    clock: Arc<dyn Clock>,
    settings: ProvisionerSettings,
    selector: Box<dyn PlacementSelector>,
}

impl Provisioner {
    pub fn new(
        file_systems: Arc<dyn FileSystemService>,
        triggers: Arc<dyn TriggerControl>,
        clock: Arc<dyn Clock>,
        settings: ProvisionerSettings,
    ) -> Self {
        let trigger = TriggerSwitch::new(triggers, settings.trigger_prefix.clone());
        Self {
            file_systems,
            trigger,
            clock,
            settings,
            selector: Box::new(RandomSelector),
        }
    }

    /// Replace the placement strategy
    pub fn with_selector(mut self, selector: impl PlacementSelector + 'static) -> Self {
        self.selector = Box::new(selector);
        self
    }

    /// Entry point for a raw request
    pub async fn handle(&self, request: ProvisionerRequest) -> Result<ProvisionerResponse> {
        let action = request.into_action().map_err(|e| {
            error!(error = %e, "Rejected provisioner request");
            e
        })?;
        self.handle_action(action).await
    }

    /// Entry point for a validated request
    pub async fn handle_action(&self, action: Action) -> Result<ProvisionerResponse> {
        let result = match &action {
            Action::Create { team, bucket } => self
                .create(team, bucket)
                .await
                .map(|id| ProvisionerResponse::Created { id }),
            Action::Status { file_system_id } => {
                self.status(file_system_id).await.map(ProvisionerResponse::State)
            }
            Action::Delete { file_system_id } => {
                self.delete(file_system_id).await.map(ProvisionerResponse::State)
            }
        };

        result.map_err(|e| {
            error!(action = ?action, error = %e, "Provisioner request failed");
            e
        })
    }

    /// Create a filesystem for `team`'s `bucket` and return its id
    pub async fn create(&self, team: &str, bucket: &str) -> Result<FileSystemId> {
        self.settings.require_pools()?;

        let subnet_id = self
            .selector
            .choose(&self.settings.subnets)
            .cloned()
            .ok_or_else(|| LifecycleError::InvalidConfig("SUBNETS is empty".to_string()))?;
        let security_group_ids = if self.settings.apply_security_groups {
            let group = self
                .selector
                .choose(&self.settings.security_groups)
                .cloned()
                .ok_or_else(|| LifecycleError::InvalidConfig("SECURITY_GROUPS is empty".to_string()))?;
            vec![group]
        } else {
            Vec::new()
        };

        let name = file_system_name(team, bucket);
        let now = format_tag_timestamp(self.clock.now_local());

        let mut tags = BTreeMap::new();
        tags.insert(TAG_NAME.to_string(), name.clone());
        tags.insert(TAG_EPHEMERAL.to_string(), EPHEMERAL_VALUE.to_string());
        tags.insert(TAG_CREATED_BY.to_string(), OWNER_VALUE.to_string());
        tags.insert(TAG_CREATED_AT.to_string(), now.clone());

        let spec = CreateFileSystemSpec {
            client_request_token: name.clone(),
            storage_capacity_gib: STORAGE_CAPACITY_GIB,
            subnet_id,
            security_group_ids,
            import_path: import_path(team, bucket),
            tags,
        };

        info!(
            name = %name,
            subnet = %spec.subnet_id,
            security_groups = ?spec.security_group_ids,
            import_path = %spec.import_path,
            "Creating file system"
        );

        let envelope = self.file_systems.create(&spec).await.map_err(|e| {
            error!(name = %name, error = %e, "Client error while creating file system");
            e
        })?;
        let created = validate_response("CreateFileSystem", envelope)?;

        let claim = BTreeMap::from([(TAG_CLAIMED_AT.to_string(), now)]);
        let envelope = self
            .file_systems
            .tag(&created.resource_arn, &claim)
            .await
            .map_err(|e| {
                error!(file_system_id = %created.id, error = %e, "Client error while tagging file system");
                e
            })?;
        validate_response("TagResource", envelope)?;

        let trigger = self.trigger.arm().await?;
        info!(file_system_id = %created.id, trigger = ?trigger, "File system created");

        Ok(created.id)
    }

    /// Lifecycle to report for `id`; an unhealthy data repository wins
    pub async fn status(&self, id: &str) -> Result<Lifecycle> {
        let envelope = self.file_systems.describe(id).await.map_err(|e| {
            error!(file_system_id = %id, error = %e, "Client error while describing file system");
            e
        })?;
        let snapshot = validate_response("DescribeFileSystems", envelope)?;

        let state = match snapshot.data_repository {
            Some(repository) if repository != Lifecycle::Available => repository,
            _ => snapshot.lifecycle,
        };
        info!(file_system_id = %id, state = %state, "File system status");
        Ok(state)
    }

    /// Issue deletion and return the resulting lifecycle
    pub async fn delete(&self, id: &str) -> Result<Lifecycle> {
        info!(file_system_id = %id, "Deleting file system");
        let envelope = self.file_systems.delete(id).await.map_err(|e| {
            error!(file_system_id = %id, error = %e, "Client error while deleting file system");
            e
        })?;
        validate_response("DeleteFileSystem", envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::services::mock::{mock_arn, ops, MockCloud, MockFileSystem};
    use chrono::{TimeZone, Utc};

    fn settings() -> ProvisionerSettings {
        ProvisionerSettings {
            subnets: vec!["subnet-a".into(), "subnet-b".into()],
            security_groups: vec!["sg-1".into(), "sg-2".into()],
            apply_security_groups: true,
            trigger_prefix: Some("fsx-monitor".into()),
        }
    }

    fn provisioner(cloud: Arc<MockCloud>, settings: ProvisionerSettings) -> Provisioner {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        Provisioner::new(cloud.clone(), cloud, Arc::new(FixedClock::new(now)), settings)
            .with_selector(FixedSelector(1))
    }

    #[test]
    fn test_naming_is_deterministic() {
        assert_eq!(file_system_name("vision", "datasets"), "vision-datasets");
        assert_eq!(import_path("vision", "datasets"), "s3://datasets/vision");
    }

    #[tokio::test]
    async fn test_create_builds_spec_and_claims() {
        let cloud = Arc::new(MockCloud::new().with_rule("fsx-monitor-schedule", false));
        let p = provisioner(cloud.clone(), settings());

        let id = p.create("vision", "datasets").await.unwrap();

        let calls = cloud.calls();
        let spec = &calls.created[0];
        assert_eq!(spec.client_request_token, "vision-datasets");
        assert_eq!(spec.subnet_id, "subnet-b");
        assert_eq!(spec.security_group_ids, vec!["sg-2".to_string()]);
        assert_eq!(spec.storage_capacity_gib, 4800);
        assert_eq!(spec.tags.get(TAG_CREATED_AT).unwrap(), "2024-05-01 12:00:00.000000");
        assert_eq!(calls.tagged[0].0, mock_arn(&id));
        assert_eq!(
            calls.tagged[0].1.get(TAG_CLAIMED_AT).unwrap(),
            "2024-05-01 12:00:00.000000"
        );
        assert_eq!(cloud.rule_enabled("fsx-monitor-schedule"), Some(true));
        assert!(cloud.snapshot(&id).unwrap().is_managed());
    }

    #[tokio::test]
    async fn test_create_without_security_groups() {
        let cloud = Arc::new(MockCloud::new());
        let p = provisioner(
            cloud.clone(),
            ProvisionerSettings {
                security_groups: Vec::new(),
                apply_security_groups: false,
                ..settings()
            },
        );

        p.create("vision", "datasets").await.unwrap();
        assert!(cloud.calls().created[0].security_group_ids.is_empty());
    }

    #[tokio::test]
    async fn test_create_failure_skips_tag_and_trigger() {
        let cloud = Arc::new(MockCloud::new().with_rule("fsx-monitor-schedule", false));
        cloud.respond_with_status(ops::CREATE, 500);
        let p = provisioner(cloud.clone(), settings());

        let err = p.create("vision", "datasets").await.unwrap_err();

        assert!(matches!(err, LifecycleError::UnexpectedStatus { status: 500, .. }));
        assert!(cloud.calls().tagged.is_empty());
        assert!(cloud.calls().enabled.is_empty());
    }

    #[tokio::test]
    async fn test_status_falls_back_without_data_repository() {
        let cloud = Arc::new(MockCloud::new().with_file_system(
            MockFileSystem::managed("fs-1", Utc::now())
                .lifecycle(Lifecycle::Creating)
                .data_repository(None),
        ));
        let p = provisioner(cloud, settings());
        assert_eq!(p.status("fs-1").await.unwrap(), Lifecycle::Creating);
    }
}
