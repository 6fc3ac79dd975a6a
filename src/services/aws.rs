//! AWS adapters for the collaborator traits
//!
//! FSx for Lustre provisions filesystems, the Resource Groups Tagging API
//! discovers them, CloudWatch supplies activity metrics, SNS carries
//! notifications and EventBridge owns the reaper's schedule rule.
//!
//! The SDK only returns `Ok` for 2xx responses, so successful calls are
//! wrapped in a 200 envelope and every SDK error becomes
//! [`LifecycleError::RemoteCall`].

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_fsx::error::DisplayErrorContext;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::*;
use crate::error::LifecycleError;

/// Resource type passed to the tagging API
const FSX_RESOURCE_TYPE: &str = "fsx:file-system";
const FSX_METRIC_NAMESPACE: &str = "AWS/FSx";
const FILE_SYSTEM_DIMENSION: &str = "FileSystemId";

/// Metric query ids and the counter each one reads
const ACTIVITY_METRICS: [(&str, &str); 3] = [
    ("m1", "DataReadOperations"),
    ("m2", "DataWriteOperations"),
    ("m3", "MetadataOperations"),
];

fn remote<E>(service: &'static str, operation: &'static str, err: E) -> LifecycleError
where
    E: std::error::Error,
{
    LifecycleError::remote(service, operation, DisplayErrorContext(err).to_string())
}

/// One set of SDK clients, built once per process
#[derive(Clone)]
pub struct AwsCloud {
    tagging: aws_sdk_resourcegroupstagging::Client,
    fsx: aws_sdk_fsx::Client,
    cloudwatch: aws_sdk_cloudwatch::Client,
    sns: aws_sdk_sns::Client,
    events: aws_sdk_eventbridge::Client,
}

impl AwsCloud {
    /// Build clients from the default credential and region chain
    pub async fn load() -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        info!(region = ?config.region(), "Loaded AWS configuration");
        Self {
            tagging: aws_sdk_resourcegroupstagging::Client::new(&config),
            fsx: aws_sdk_fsx::Client::new(&config),
            cloudwatch: aws_sdk_cloudwatch::Client::new(&config),
            sns: aws_sdk_sns::Client::new(&config),
            events: aws_sdk_eventbridge::Client::new(&config),
        }
    }

    pub fn into_services(self) -> Services {
        Services::from_single(Arc::new(self))
    }
}

//=============================================================================
// DISCOVERY
//=============================================================================

#[async_trait]
impl ResourceDirectory for AwsCloud {
    async fn get_resources_page(
        &self,
        tag_filters: &[(&str, &str)],
        page_token: Option<&str>,
    ) -> Result<Envelope<DiscoveryPage>> {
        use aws_sdk_resourcegroupstagging::types::TagFilter;

        let filters = tag_filters
            .iter()
            .map(|(key, value)| TagFilter::builder().key(*key).values(*value).build())
            .collect();

        let output = self
            .tagging
            .get_resources()
            .resource_type_filters(FSX_RESOURCE_TYPE)
            .set_tag_filters(Some(filters))
            .set_pagination_token(page_token.map(String::from))
            .send()
            .await
            .map_err(|e| remote("tagging", "GetResources", e))?;

        let resource_arns = output
            .resource_tag_mapping_list()
            .iter()
            .map(|mapping| {
                mapping
                    .resource_arn()
                    .map(String::from)
                    .ok_or_else(|| LifecycleError::malformed("GetResources", "ResourceARN"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Envelope::ok(DiscoveryPage {
            resource_arns,
            next_token: output.pagination_token().map(String::from),
        }))
    }
}

//=============================================================================
// FILESYSTEMS
//=============================================================================

fn fsx_tags(tags: &BTreeMap<String, String>) -> Result<Vec<aws_sdk_fsx::types::Tag>> {
    tags.iter()
        .map(|(key, value)| {
            aws_sdk_fsx::types::Tag::builder()
                .key(key)
                .value(value)
                .build()
                .map_err(|e| LifecycleError::InvalidValue {
                    field: "Tags",
                    value: e.to_string(),
                })
        })
        .collect()
}

fn snapshot_from(fs: &aws_sdk_fsx::types::FileSystem) -> Result<FileSystemSnapshot> {
    const OP: &str = "DescribeFileSystems";

    let id = fs
        .file_system_id()
        .ok_or_else(|| LifecycleError::malformed(OP, "FileSystemId"))?;
    let lifecycle = fs
        .lifecycle()
        .map(|l| Lifecycle::from(l.as_str()))
        .ok_or_else(|| LifecycleError::malformed(OP, "Lifecycle"))?;
    let created = fs
        .creation_time()
        .ok_or_else(|| LifecycleError::malformed(OP, "CreationTime"))?;
    let created_at = DateTime::<Utc>::from_timestamp(created.secs(), created.subsec_nanos())
        .ok_or_else(|| LifecycleError::InvalidValue {
            field: "CreationTime",
            value: format!("{}s", created.secs()),
        })?;

    let tags = fs
        .tags()
        .iter()
        .map(|t| (t.key().to_string(), t.value().to_string()))
        .collect();

    let data_repository = fs
        .lustre_configuration()
        .and_then(|c| c.data_repository_configuration())
        .and_then(|d| d.lifecycle())
        .map(|l| Lifecycle::from(l.as_str()));

    Ok(FileSystemSnapshot {
        id: id.to_string(),
        resource_arn: fs.resource_arn().map(String::from),
        lifecycle,
        created_at,
        tags,
        data_repository,
    })
}

#[async_trait]
impl FileSystemService for AwsCloud {
    async fn describe(&self, id: &str) -> Result<Envelope<FileSystemSnapshot>> {
        let output = self
            .fsx
            .describe_file_systems()
            .file_system_ids(id)
            .send()
            .await
            .map_err(|e| remote("fsx", "DescribeFileSystems", e))?;

        let fs = output
            .file_systems()
            .first()
            .ok_or_else(|| LifecycleError::malformed("DescribeFileSystems", "FileSystems"))?;
        Ok(Envelope::ok(snapshot_from(fs)?))
    }

    async fn create(&self, spec: &CreateFileSystemSpec) -> Result<Envelope<CreatedFileSystem>> {
        use aws_sdk_fsx::types::{
            AutoImportPolicyType, CreateFileSystemLustreConfiguration, FileSystemType,
            LustreDeploymentType, StorageType,
        };

        let lustre = CreateFileSystemLustreConfiguration::builder()
            .import_path(&spec.import_path)
            .deployment_type(LustreDeploymentType::Scratch2)
            .auto_import_policy(AutoImportPolicyType::NewChanged)
            .build();
        let security_groups =
            (!spec.security_group_ids.is_empty()).then(|| spec.security_group_ids.clone());

        let output = self
            .fsx
            .create_file_system()
            .client_request_token(&spec.client_request_token)
            .file_system_type(FileSystemType::Lustre)
            .storage_capacity(spec.storage_capacity_gib)
            .storage_type(StorageType::Ssd)
            .subnet_ids(&spec.subnet_id)
            .set_security_group_ids(security_groups)
            .set_tags(Some(fsx_tags(&spec.tags)?))
            .lustre_configuration(lustre)
            .send()
            .await
            .map_err(|e| remote("fsx", "CreateFileSystem", e))?;

        let fs = output
            .file_system()
            .ok_or_else(|| LifecycleError::malformed("CreateFileSystem", "FileSystem"))?;
        let id = fs
            .file_system_id()
            .ok_or_else(|| LifecycleError::malformed("CreateFileSystem", "FileSystemId"))?;
        let resource_arn = fs
            .resource_arn()
            .ok_or_else(|| LifecycleError::malformed("CreateFileSystem", "ResourceARN"))?;

        Ok(Envelope::ok(CreatedFileSystem {
            id: id.to_string(),
            resource_arn: resource_arn.to_string(),
        }))
    }

    async fn tag(&self, resource_arn: &str, tags: &BTreeMap<String, String>) -> Result<Envelope<()>> {
        self.fsx
            .tag_resource()
            .resource_arn(resource_arn)
            .set_tags(Some(fsx_tags(tags)?))
            .send()
            .await
            .map_err(|e| remote("fsx", "TagResource", e))?;
        Ok(Envelope::ok(()))
    }

    async fn delete(&self, id: &str) -> Result<Envelope<Lifecycle>> {
        let output = self
            .fsx
            .delete_file_system()
            .file_system_id(id)
            .send()
            .await
            .map_err(|e| remote("fsx", "DeleteFileSystem", e))?;

        let lifecycle = output
            .lifecycle()
            .map(|l| Lifecycle::from(l.as_str()))
            .ok_or_else(|| LifecycleError::malformed("DeleteFileSystem", "Lifecycle"))?;
        Ok(Envelope::ok(lifecycle))
    }
}

//=============================================================================
// METRICS
//=============================================================================

#[async_trait]
impl MetricsService for AwsCloud {
    async fn operation_counts(
        &self,
        id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period_secs: u32,
    ) -> Result<Envelope<Vec<OperationCounts>>> {
        use aws_sdk_cloudwatch::primitives::DateTime as SdkDateTime;
        use aws_sdk_cloudwatch::types::{Dimension, Metric, MetricDataQuery, MetricStat, ScanBy};

        let period = i32::try_from(period_secs).map_err(|_| LifecycleError::InvalidValue {
            field: "DATA_POINTS_PERIOD_SECS",
            value: period_secs.to_string(),
        })?;

        let mut queries = Vec::with_capacity(ACTIVITY_METRICS.len());
        for (query_id, metric_name) in ACTIVITY_METRICS {
            let metric = Metric::builder()
                .namespace(FSX_METRIC_NAMESPACE)
                .metric_name(metric_name)
                .dimensions(Dimension::builder().name(FILE_SYSTEM_DIMENSION).value(id).build())
                .build();
            let stat = MetricStat::builder().metric(metric).period(period).stat("Sum").build();
            let query = MetricDataQuery::builder()
                .id(query_id)
                .metric_stat(stat)
                .return_data(true)
                .build()
                .map_err(|e| remote("cloudwatch", "GetMetricData", e))?;
            queries.push(query);
        }

        // Bucket start time -> counters, merged across the three series
        let mut buckets: BTreeMap<i64, OperationCounts> = BTreeMap::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .cloudwatch
                .get_metric_data()
                .set_metric_data_queries(Some(queries.clone()))
                .start_time(SdkDateTime::from_secs(start.timestamp()))
                .end_time(SdkDateTime::from_secs(end.timestamp()))
                .scan_by(ScanBy::TimestampAscending)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| remote("cloudwatch", "GetMetricData", e))?;

            for result in output.metric_data_results() {
                let Some(query_id) = result.id() else { continue };
                for (at, value) in result.timestamps().iter().zip(result.values()) {
                    let counts = buckets.entry(at.secs()).or_default();
                    match query_id {
                        "m1" => counts.read += value,
                        "m2" => counts.write += value,
                        "m3" => counts.metadata += value,
                        _ => {}
                    }
                }
            }

            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        debug!(file_system_id = %id, buckets = buckets.len(), "Fetched activity metrics");
        Ok(Envelope::ok(buckets.into_values().collect()))
    }
}

//=============================================================================
// NOTIFICATIONS
//=============================================================================

#[async_trait]
impl Notifier for AwsCloud {
    async fn publish(&self, channel: &str, subject: &str, message: &str) -> Result<Envelope<()>> {
        self.sns
            .publish()
            .topic_arn(channel)
            .subject(subject)
            .message(message)
            .send()
            .await
            .map_err(|e| remote("sns", "Publish", e))?;
        Ok(Envelope::ok(()))
    }
}

//=============================================================================
// SCHEDULE
//=============================================================================

#[async_trait]
impl TriggerControl for AwsCloud {
    async fn list_rules(&self, prefix: &str, limit: i32) -> Result<Envelope<Vec<String>>> {
        let output = self
            .events
            .list_rules()
            .name_prefix(prefix)
            .limit(limit)
            .send()
            .await
            .map_err(|e| remote("events", "ListRules", e))?;

        let names = output
            .rules()
            .iter()
            .filter_map(|rule| rule.name().map(String::from))
            .collect();
        Ok(Envelope::ok(names))
    }

    async fn enable_rule(&self, name: &str) -> Result<Envelope<()>> {
        self.events
            .enable_rule()
            .name(name)
            .send()
            .await
            .map_err(|e| remote("events", "EnableRule", e))?;
        Ok(Envelope::ok(()))
    }

    async fn disable_rule(&self, name: &str) -> Result<Envelope<()>> {
        self.events
            .disable_rule()
            .name(name)
            .send()
            .await
            .map_err(|e| remote("events", "DisableRule", e))?;
        Ok(Envelope::ok(()))
    }
}
