//! Discovery - find every managed filesystem
//!
//! Filtering happens server-side on the two discovery tags. Every page is
//! drained before returning.

use tracing::{debug, error};

use crate::error::{LifecycleError, Result};
use crate::models::{discovery_filters, file_system_id_from_arn, validate_response, FileSystemId};
use crate::services::ResourceDirectory;

/// List the ids of all filesystems tagged `Ephemeral=true, CreatedBy=<owner>`
pub async fn discover(directory: &dyn ResourceDirectory) -> Result<Vec<FileSystemId>> {
    let filters = discovery_filters();
    let mut ids = Vec::new();
    let mut page_token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let envelope = directory
            .get_resources_page(&filters, page_token.as_deref())
            .await
            .map_err(|e| {
                error!(error = %e, "Client error while discovering file systems");
                e
            })?;
        let page = validate_response("GetResources", envelope)?;
        pages += 1;

        for arn in &page.resource_arns {
            let id = file_system_id_from_arn(arn).ok_or_else(|| {
                error!(arn = %arn, "Resource ARN carries no file system id");
                LifecycleError::Discovery {
                    message: format!("unrecognised resource ARN {}", arn),
                }
            })?;
            ids.push(id.to_string());
        }

        match page.next_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => break,
        }
    }

    debug!(count = ids.len(), pages, "Discovered file systems");
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mock::{ops, MockCloud, MockFileSystem};
    use chrono::Utc;

    #[tokio::test]
    async fn test_discover_drains_all_pages() {
        let now = Utc::now();
        let cloud = MockCloud::new()
            .with_page_size(2)
            .with_file_system(MockFileSystem::managed("fs-1", now))
            .with_file_system(MockFileSystem::managed("fs-2", now))
            .with_file_system(MockFileSystem::managed("fs-3", now))
            .with_file_system(MockFileSystem::managed("fs-4", now))
            .with_file_system(MockFileSystem::managed("fs-5", now));

        let ids = discover(&cloud).await.unwrap();

        assert_eq!(ids, vec!["fs-1", "fs-2", "fs-3", "fs-4", "fs-5"]);
        assert_eq!(cloud.calls().discovery_pages, 3);
    }

    #[tokio::test]
    async fn test_discover_skips_untagged_and_foreign_owners() {
        let now = Utc::now();
        let cloud = MockCloud::new()
            .with_file_system(MockFileSystem::managed("fs-mine", now))
            .with_file_system(MockFileSystem::unmanaged("fs-untagged", now))
            .with_file_system(MockFileSystem::managed("fs-foreign", now).tag("CreatedBy", "DataEng"))
            .with_file_system(MockFileSystem::managed("fs-pinned", now).tag("Ephemeral", "false"));

        let ids = discover(&cloud).await.unwrap();

        assert_eq!(ids, vec!["fs-mine"]);
    }

    #[tokio::test]
    async fn test_discover_empty_account() {
        let cloud = MockCloud::new();
        assert!(discover(&cloud).await.unwrap().is_empty());
        assert_eq!(cloud.calls().discovery_pages, 1);
    }

    #[tokio::test]
    async fn test_discover_propagates_remote_failure_unchanged() {
        let cloud = MockCloud::new();
        let failure = LifecycleError::remote("tagging", ops::GET_RESOURCES, "ThrottlingException");
        cloud.fail(ops::GET_RESOURCES, failure.clone());

        assert_eq!(discover(&cloud).await.unwrap_err(), failure);
    }

    #[tokio::test]
    async fn test_discover_rejects_non_200_page() {
        let cloud = MockCloud::new().with_file_system(MockFileSystem::managed("fs-1", Utc::now()));
        cloud.respond_with_status(ops::GET_RESOURCES, 500);

        assert!(matches!(
            discover(&cloud).await.unwrap_err(),
            LifecycleError::UnexpectedStatus { status: 500, .. }
        ));
    }
}
