//! S3-compatible object store client over plain HTTP PUT.

use async_trait::async_trait;
use punchsync_core::ObjectStore;
use punchsync_domain::{ArchiveConfig, PunchSyncError, Result, StoredObject};
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use tracing::debug;

use crate::errors::InfraError;
use crate::http::HttpClient;

/// Uploads objects with public-read ACLs so the ERP and operators can fetch
/// them by URL without credentials.
pub struct HttpObjectStore {
    http: HttpClient,
    endpoint: String,
}

impl HttpObjectStore {
    pub fn new(config: &ArchiveConfig, http: HttpClient) -> Self {
        Self { http, endpoint: config.endpoint.trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<StoredObject> {
        let url = format!("{}/{}/{}", self.endpoint, bucket, key);

        debug!(bucket, key, bytes = body.len(), "uploading object");

        let builder = self
            .http
            .request(Method::PUT, &url)
            .header(CONTENT_TYPE, content_type)
            .header("x-amz-acl", "public-read")
            .body(body.to_vec());

        let response = self.http.send(builder).await?;
        response
            .error_for_status()
            .map_err(|err| PunchSyncError::from(InfraError::from(err)))?;

        Ok(StoredObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            location_url: url,
        })
    }
}
