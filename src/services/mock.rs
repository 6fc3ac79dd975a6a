//! In-memory cloud for testing.
//!
//! [`MockCloud`] implements every collaborator trait over one shared state so
//! a reaper pass observes its own deletions, and records each call for
//! assertions. Failures and non-200 envelopes can be injected per operation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::*;
use crate::error::LifecycleError;

/// Operation names used for call recording and fault injection
pub mod ops {
    pub const GET_RESOURCES: &str = "GetResources";
    pub const DESCRIBE: &str = "DescribeFileSystems";
    pub const CREATE: &str = "CreateFileSystem";
    pub const TAG: &str = "TagResource";
    pub const DELETE: &str = "DeleteFileSystem";
    pub const METRICS: &str = "GetMetricData";
    pub const PUBLISH: &str = "Publish";
    pub const LIST_RULES: &str = "ListRules";
    pub const ENABLE_RULE: &str = "EnableRule";
    pub const DISABLE_RULE: &str = "DisableRule";
}

/// A filesystem seeded into the mock
#[derive(Debug, Clone)]
pub struct MockFileSystem {
    pub snapshot: FileSystemSnapshot,
    pub samples: Vec<OperationCounts>,
    pub client_request_token: Option<String>,
}

impl MockFileSystem {
    /// A filesystem carrying both discovery tags
    pub fn managed(id: &str, created_at: DateTime<Utc>) -> Self {
        let mut tags = BTreeMap::new();
        for (key, value) in discovery_filters() {
            tags.insert(key.to_string(), value.to_string());
        }
        Self::with_tags(id, created_at, tags)
    }

    /// A filesystem without discovery tags
    pub fn unmanaged(id: &str, created_at: DateTime<Utc>) -> Self {
        Self::with_tags(id, created_at, BTreeMap::new())
    }

    fn with_tags(id: &str, created_at: DateTime<Utc>, tags: BTreeMap<String, String>) -> Self {
        Self {
            snapshot: FileSystemSnapshot {
                id: id.to_string(),
                resource_arn: Some(mock_arn(id)),
                lifecycle: Lifecycle::Available,
                created_at,
                tags,
                data_repository: Some(Lifecycle::Available),
            },
            samples: Vec::new(),
            client_request_token: None,
        }
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.snapshot.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn claimed_at(self, at: NaiveDateTime) -> Self {
        let value = format_tag_timestamp(at);
        self.tag(TAG_CLAIMED_AT, &value)
    }

    pub fn lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.snapshot.lifecycle = lifecycle;
        self
    }

    pub fn data_repository(mut self, lifecycle: Option<Lifecycle>) -> Self {
        self.snapshot.data_repository = lifecycle;
        self
    }

    pub fn samples(mut self, samples: Vec<OperationCounts>) -> Self {
        self.samples = samples;
        self
    }
}

/// ARN the mock assigns to a filesystem id
pub fn mock_arn(id: &str) -> String {
    format!("arn:aws:fsx:us-east-1:000000000000:file-system/{}", id)
}

/// Calls observed by the mock
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    pub discovery_pages: usize,
    pub described: Vec<String>,
    pub created: Vec<CreateFileSystemSpec>,
    pub tagged: Vec<(String, BTreeMap<String, String>)>,
    pub deleted: Vec<String>,
    pub metric_queries: Vec<(String, DateTime<Utc>, DateTime<Utc>, u32)>,
    pub published: Vec<(String, String, String)>,
    pub rule_lookups: Vec<String>,
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
}

#[derive(Default)]
struct MockState {
    file_systems: BTreeMap<String, MockFileSystem>,
    /// Filesystems that no longer appear in discovery
    vanished: Vec<String>,
    rules: Vec<(String, bool)>,
    next_id: u64,
    calls: CallLog,
    failures: HashMap<&'static str, LifecycleError>,
    statuses: HashMap<&'static str, u16>,
}

/// In-memory implementation of every collaborator trait
pub struct MockCloud {
    state: Mutex<MockState>,
    page_size: usize,
}

impl Default for MockCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCloud {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            page_size: 2,
        }
    }

    /// Number of ARNs returned per discovery page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_file_system(self, fs: MockFileSystem) -> Self {
        self.state().file_systems.insert(fs.snapshot.id.clone(), fs);
        self
    }

    /// Register a scheduled rule, initially enabled or disabled
    pub fn with_rule(self, name: &str, enabled: bool) -> Self {
        self.state().rules.push((name.to_string(), enabled));
        self
    }

    /// Make every call to `operation` fail with `error`
    pub fn fail(&self, operation: &'static str, error: LifecycleError) {
        self.state().failures.insert(operation, error);
    }

    /// Make every call to `operation` answer with a non-200 envelope
    pub fn respond_with_status(&self, operation: &'static str, status: u16) {
        self.state().statuses.insert(operation, status);
    }

    pub fn calls(&self) -> CallLog {
        self.state().calls.clone()
    }

    pub fn rule_enabled(&self, name: &str) -> Option<bool> {
        self.state()
            .rules
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, enabled)| *enabled)
    }

    pub fn snapshot(&self, id: &str) -> Option<FileSystemSnapshot> {
        self.state().file_systems.get(id).map(|fs| fs.snapshot.clone())
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(state: &MockState, operation: &'static str) -> Result<u16> {
        if let Some(err) = state.failures.get(operation) {
            return Err(err.clone());
        }
        Ok(state.statuses.get(operation).copied().unwrap_or(200))
    }
}

fn not_found(service: &'static str, operation: &'static str, id: &str) -> LifecycleError {
    LifecycleError::remote(service, operation, format!("FileSystemNotFound: {}", id))
}

#[async_trait]
impl ResourceDirectory for MockCloud {
    async fn get_resources_page(
        &self,
        tag_filters: &[(&str, &str)],
        page_token: Option<&str>,
    ) -> Result<Envelope<DiscoveryPage>> {
        let mut state = self.state();
        let status = Self::check(&state, ops::GET_RESOURCES)?;
        state.calls.discovery_pages += 1;

        let matching: Vec<String> = state
            .file_systems
            .values()
            .filter(|fs| !state.vanished.contains(&fs.snapshot.id))
            .filter(|fs| {
                tag_filters
                    .iter()
                    .all(|(key, value)| fs.snapshot.tag(key) == Some(*value))
            })
            .filter_map(|fs| fs.snapshot.resource_arn.clone())
            .collect();

        let offset = match page_token {
            Some(token) => token.parse::<usize>().map_err(|_| {
                LifecycleError::remote("tagging", ops::GET_RESOURCES, "InvalidParameterException")
            })?,
            None => 0,
        };
        let end = (offset + self.page_size).min(matching.len());
        let resource_arns = matching.get(offset..end).unwrap_or_default().to_vec();
        let next_token = (end < matching.len()).then(|| end.to_string());

        Ok(Envelope {
            status,
            body: DiscoveryPage {
                resource_arns,
                next_token,
            },
        })
    }
}

#[async_trait]
impl FileSystemService for MockCloud {
    async fn describe(&self, id: &str) -> Result<Envelope<FileSystemSnapshot>> {
        let mut state = self.state();
        let status = Self::check(&state, ops::DESCRIBE)?;
        state.calls.described.push(id.to_string());
        let fs = state
            .file_systems
            .get(id)
            .ok_or_else(|| not_found("fsx", ops::DESCRIBE, id))?;
        Ok(Envelope {
            status,
            body: fs.snapshot.clone(),
        })
    }

    async fn create(&self, spec: &CreateFileSystemSpec) -> Result<Envelope<CreatedFileSystem>> {
        let mut state = self.state();
        let status = Self::check(&state, ops::CREATE)?;
        state.calls.created.push(spec.clone());

        let existing = state
            .file_systems
            .values()
            .find(|fs| fs.client_request_token.as_deref() == Some(spec.client_request_token.as_str()))
            .map(|fs| fs.snapshot.id.clone());

        let id = match existing {
            Some(id) => id,
            None => {
                state.next_id += 1;
                let id = format!("fs-{:017x}", state.next_id);
                let fs = MockFileSystem {
                    snapshot: FileSystemSnapshot {
                        id: id.clone(),
                        resource_arn: Some(mock_arn(&id)),
                        lifecycle: Lifecycle::Creating,
                        created_at: Utc::now(),
                        tags: spec.tags.clone(),
                        data_repository: Some(Lifecycle::Creating),
                    },
                    samples: Vec::new(),
                    client_request_token: Some(spec.client_request_token.clone()),
                };
                state.file_systems.insert(id.clone(), fs);
                id
            }
        };

        Ok(Envelope {
            status,
            body: CreatedFileSystem {
                resource_arn: mock_arn(&id),
                id,
            },
        })
    }

    async fn tag(
        &self,
        resource_arn: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<Envelope<()>> {
        let mut state = self.state();
        let status = Self::check(&state, ops::TAG)?;
        state.calls.tagged.push((resource_arn.to_string(), tags.clone()));

        let id = file_system_id_from_arn(resource_arn)
            .ok_or_else(|| LifecycleError::remote("fsx", ops::TAG, "InvalidArn"))?
            .to_string();
        let fs = state
            .file_systems
            .get_mut(&id)
            .ok_or_else(|| not_found("fsx", ops::TAG, &id))?;
        fs.snapshot.tags.extend(tags.clone());
        Ok(Envelope { status, body: () })
    }

    async fn delete(&self, id: &str) -> Result<Envelope<Lifecycle>> {
        let mut state = self.state();
        let status = Self::check(&state, ops::DELETE)?;
        let fs = state
            .file_systems
            .get_mut(id)
            .ok_or_else(|| not_found("fsx", ops::DELETE, id))?;
        if fs.snapshot.lifecycle == Lifecycle::Deleting {
            return Err(LifecycleError::remote(
                "fsx",
                ops::DELETE,
                format!("BadRequest: {} is already being deleted", id),
            ));
        }
        fs.snapshot.lifecycle = Lifecycle::Deleting;
        state.calls.deleted.push(id.to_string());
        state.vanished.push(id.to_string());
        Ok(Envelope {
            status,
            body: Lifecycle::Deleting,
        })
    }
}

#[async_trait]
impl MetricsService for MockCloud {
    async fn operation_counts(
        &self,
        id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period_secs: u32,
    ) -> Result<Envelope<Vec<OperationCounts>>> {
        let mut state = self.state();
        let status = Self::check(&state, ops::METRICS)?;
        state
            .calls
            .metric_queries
            .push((id.to_string(), start, end, period_secs));
        let samples = state
            .file_systems
            .get(id)
            .map(|fs| fs.samples.clone())
            .unwrap_or_default();
        Ok(Envelope {
            status,
            body: samples,
        })
    }
}

#[async_trait]
impl Notifier for MockCloud {
    async fn publish(&self, channel: &str, subject: &str, message: &str) -> Result<Envelope<()>> {
        let mut state = self.state();
        let status = Self::check(&state, ops::PUBLISH)?;
        state.calls.published.push((
            channel.to_string(),
            subject.to_string(),
            message.to_string(),
        ));
        Ok(Envelope { status, body: () })
    }
}

#[async_trait]
impl TriggerControl for MockCloud {
    async fn list_rules(&self, prefix: &str, limit: i32) -> Result<Envelope<Vec<String>>> {
        let mut state = self.state();
        let status = Self::check(&state, ops::LIST_RULES)?;
        state.calls.rule_lookups.push(prefix.to_string());
        let names = state
            .rules
            .iter()
            .map(|(name, _)| name.clone())
            .filter(|name| name.starts_with(prefix))
            .take(limit.max(0) as usize)
            .collect();
        Ok(Envelope {
            status,
            body: names,
        })
    }

    async fn enable_rule(&self, name: &str) -> Result<Envelope<()>> {
        let mut state = self.state();
        let status = Self::check(&state, ops::ENABLE_RULE)?;
        state.calls.enabled.push(name.to_string());
        set_rule(&mut state, name, true)?;
        Ok(Envelope { status, body: () })
    }

    async fn disable_rule(&self, name: &str) -> Result<Envelope<()>> {
        let mut state = self.state();
        let status = Self::check(&state, ops::DISABLE_RULE)?;
        state.calls.disabled.push(name.to_string());
        set_rule(&mut state, name, false)?;
        Ok(Envelope { status, body: () })
    }
}

fn set_rule(state: &mut MockState, name: &str, enabled: bool) -> Result<()> {
    let rule = state
        .rules
        .iter_mut()
        .find(|(n, _)| n == name)
        .ok_or_else(|| {
            LifecycleError::remote("events", ops::ENABLE_RULE, format!("ResourceNotFound: {}", name))
        })?;
    rule.1 = enabled;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_discovery_pages_follow_token() {
        let now = Utc::now();
        let cloud = MockCloud::new()
            .with_page_size(2)
            .with_file_system(MockFileSystem::managed("fs-a", now))
            .with_file_system(MockFileSystem::managed("fs-b", now))
            .with_file_system(MockFileSystem::managed("fs-c", now));

        let first = cloud
            .get_resources_page(&discovery_filters(), None)
            .await
            .unwrap()
            .body;
        assert_eq!(first.resource_arns.len(), 2);
        assert_eq!(first.next_token.as_deref(), Some("2"));

        let second = cloud
            .get_resources_page(&discovery_filters(), first.next_token.as_deref())
            .await
            .unwrap()
            .body;
        assert_eq!(second.resource_arns, vec![mock_arn("fs-c")]);
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn test_second_delete_fails_cleanly() {
        let cloud = MockCloud::new().with_file_system(MockFileSystem::managed("fs-a", Utc::now()));

        let first = cloud.delete("fs-a").await.unwrap();
        assert_eq!(first.body, Lifecycle::Deleting);

        let second = cloud.delete("fs-a").await.unwrap_err();
        assert!(matches!(second, LifecycleError::RemoteCall { operation: "DeleteFileSystem", .. }));
        assert_eq!(cloud.calls().deleted, vec!["fs-a".to_string()]);
    }

    #[tokio::test]
    async fn test_injected_status_is_reported() {
        let cloud = MockCloud::new().with_file_system(MockFileSystem::managed("fs-a", Utc::now()));
        cloud.respond_with_status(ops::DESCRIBE, 500);

        let envelope = cloud.describe("fs-a").await.unwrap();
        assert_eq!(envelope.status, 500);
    }
}
