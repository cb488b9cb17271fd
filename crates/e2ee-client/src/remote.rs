//! Server endpoints used by the metadata jobs

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use e2ee_metadata::RootMetadataSource;
use std::sync::Arc;
use tracing::warn;

/// The E2EE endpoints of the server.
///
/// Failures are reported as [`ClientError::Http`](crate::ClientError::Http)
/// with the response status. Implementations do not retry.
#[async_trait]
pub trait E2eeApi: Send + Sync {
    /// Resolve the opaque id of the folder at `path`
    async fn folder_id(&self, path: &str) -> Result<String>;

    /// Take the metadata lock of a folder. v2.0 servers receive the counter
    /// the next write will carry and refuse it if it does not advance.
    async fn lock_folder(&self, folder_id: &str, public_key_pem: &str, counter: Option<u64>) -> Result<String>;

    async fn unlock_folder(&self, folder_id: &str, token: &str) -> Result<()>;

    /// Raw metadata document. A folder without metadata answers 404.
    async fn get_metadata(&self, folder_id: &str) -> Result<Bytes>;

    /// First write of a folder's metadata
    async fn store_metadata(&self, folder_id: &str, token: &str, metadata: Bytes) -> Result<()>;

    /// Replace existing metadata
    async fn update_metadata(&self, folder_id: &str, token: &str, metadata: Bytes) -> Result<()>;

    /// Mark a folder as end-to-end encrypted
    async fn set_encryption_flag(&self, folder_id: &str) -> Result<()>;

    /// PEM certificate the server holds for `user_id`
    async fn user_certificate(&self, user_id: &str) -> Result<String>;

    /// Delete the item at `path` inside a locked folder
    async fn delete_item(&self, path: &str, token: &str) -> Result<()>;
}

/// Fetches top-level folder metadata through an [`E2eeApi`]
#[derive(Clone)]
pub struct ApiRootMetadataSource {
    api: Arc<dyn E2eeApi>,
}

impl ApiRootMetadataSource {
    pub fn new(api: Arc<dyn E2eeApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl RootMetadataSource for ApiRootMetadataSource {
    async fn fetch_root_metadata(&self, path: &str) -> Option<Vec<u8>> {
        let folder_id = match self.api.folder_id(path).await {
            Ok(id) => id,
            Err(e) => {
                warn!(%path, error = %e, "could not resolve top-level folder");
                return None;
            }
        };
        match self.api.get_metadata(&folder_id).await {
            Ok(bytes) => Some(bytes.to_vec()),
            Err(e) => {
                warn!(%path, error = %e, "could not fetch top-level metadata");
                None
            }
        }
    }
}
