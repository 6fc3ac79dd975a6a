//! External collaborators
//!
//! The provisioning API, tag-based discovery, metrics, notifications and the
//! scheduled trigger are remote services. Each is reached through one of the
//! traits below and injected into the components that need it, so a process
//! builds its clients once and tests substitute [`mock::MockCloud`].
//!
//! Every method returns an [`Envelope`]; callers pass it through
//! [`crate::models::validate_response`] before reading any field.

#[cfg(feature = "aws")]
pub mod aws;
pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::models::*;

/// Tag-filtered resource discovery
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    /// Fetch one page of filesystem ARNs carrying every `(key, value)` filter
    async fn get_resources_page(
        &self,
        tag_filters: &[(&str, &str)],
        page_token: Option<&str>,
    ) -> Result<Envelope<DiscoveryPage>>;
}

/// Filesystem provisioning API
#[async_trait]
pub trait FileSystemService: Send + Sync {
    async fn describe(&self, id: &str) -> Result<Envelope<FileSystemSnapshot>>;

    async fn create(&self, spec: &CreateFileSystemSpec) -> Result<Envelope<CreatedFileSystem>>;

    async fn tag(&self, resource_arn: &str, tags: &BTreeMap<String, String>)
        -> Result<Envelope<()>>;

    /// Issue deletion and return the lifecycle the service reports afterwards
    async fn delete(&self, id: &str) -> Result<Envelope<Lifecycle>>;
}

/// Metrics time-series queries
#[async_trait]
pub trait MetricsService: Send + Sync {
    /// Read/write/metadata operation sums per `period_secs` bucket in `[start, end)`
    async fn operation_counts(
        &self,
        id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period_secs: u32,
    ) -> Result<Envelope<Vec<OperationCounts>>>;
}

/// Notification dispatch
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, channel: &str, subject: &str, message: &str) -> Result<Envelope<()>>;
}

/// Scheduled-trigger control
#[async_trait]
pub trait TriggerControl: Send + Sync {
    /// Names of rules starting with `prefix`, at most `limit` of them
    async fn list_rules(&self, prefix: &str, limit: i32) -> Result<Envelope<Vec<String>>>;

    async fn enable_rule(&self, name: &str) -> Result<Envelope<()>>;

    async fn disable_rule(&self, name: &str) -> Result<Envelope<()>>;
}

/// Shared client handles, created once per process and reused across invocations
#[derive(Clone)]
pub struct Services {
    pub directory: Arc<dyn ResourceDirectory>,
    pub file_systems: Arc<dyn FileSystemService>,
    pub metrics: Arc<dyn MetricsService>,
    pub notifier: Arc<dyn Notifier>,
    pub triggers: Arc<dyn TriggerControl>,
}

impl Services {
    /// Route every collaborator to one object implementing all of them
    pub fn from_single<T>(backend: Arc<T>) -> Self
    where
        T: ResourceDirectory + FileSystemService + MetricsService + Notifier + TriggerControl + 'static,
    {
        Self {
            directory: backend.clone(),
            file_systems: backend.clone(),
            metrics: backend.clone(),
            notifier: backend.clone(),
            triggers: backend,
        }
    }
}
