//! AWS S3 backed object store

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart as SdkCompletedPart, Delete, ObjectIdentifier,
};
use aws_sdk_s3::Client;
use aws_smithy_types::body::SdkBody;
use bytes::Bytes;
use std::sync::Arc;

use crate::error::{StoreError, TransferError};
use crate::s3::body::CountingBody;
use crate::s3::connection::ConnectionDescriptor;
use crate::s3::store::{
    BatchDeleteOutcome, CompletedPart, ListPage, ListRequest, ListedObject, ObjectBody,
    ObjectStore, SentCallback, StoreFactory,
};

/// Convert an SDK error into a [`StoreError`], keeping the service error code
fn service_error<E, R>(err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().map(|c| c.to_string());
    let message = DisplayErrorContext(&err).to_string();
    StoreError::Service { code, message }
}

fn to_datetime(d: &aws_sdk_s3::primitives::DateTime) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(d.secs(), d.subsec_nanos()).unwrap_or_default()
}

/// S3 client bound to one connection
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    region: String,
}

impl S3Store {
    /// Build a client for the given connection.
    ///
    /// Binds endpoint, region, static credentials and addressing style.
    /// Performs no I/O.
    pub fn new(descriptor: &ConnectionDescriptor) -> Result<Self, TransferError> {
        let region = descriptor.region().to_string();
        let credentials = Credentials::new(
            descriptor.access_key_id.clone(),
            descriptor.access_key_secret.clone(),
            None,
            None,
            "s3-transfer-connection",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .credentials_provider(credentials)
            .force_path_style(descriptor.force_path_style);

        if let Some(endpoint) = descriptor.endpoint_url()? {
            builder = builder.endpoint_url(endpoint);
        }

        tracing::debug!(
            "Created S3 client for connection '{}' (region={}, path_style={})",
            descriptor.id,
            region,
            descriptor.force_path_style
        );

        Ok(Self {
            client: Client::from_conf(builder.build()),
            region,
        })
    }

    /// Get the region this client signs for
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Create a bucket (used by integration tests and provisioning scripts)
    pub async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        self.client
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(service_error)?;

        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_objects(&self, request: ListRequest<'_>) -> Result<ListPage, StoreError> {
        let mut req = self
            .client
            .list_objects_v2()
            .bucket(request.bucket)
            .max_keys(request.max_keys);

        if !request.prefix.is_empty() {
            req = req.prefix(request.prefix);
        }

        if let Some(delimiter) = request.delimiter {
            req = req.delimiter(delimiter);
        }

        if let Some(token) = request.continuation_token {
            req = req.continuation_token(token);
        }

        let response = req.send().await.map_err(service_error)?;

        let common_prefixes = response
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(|s| s.to_string()))
            .collect();

        let objects = response
            .contents()
            .iter()
            .map(|obj| ListedObject {
                key: obj.key().unwrap_or_default().to_string(),
                size: obj.size().unwrap_or(0).max(0) as u64,
                last_modified: obj.last_modified().map(to_datetime),
            })
            .collect();

        let next_continuation_token = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(|s| s.to_string())
        } else {
            None
        };

        Ok(ListPage {
            objects,
            common_prefixes,
            next_continuation_token,
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        on_sent: Option<SentCallback>,
    ) -> Result<(), StoreError> {
        let length = body.len() as i64;

        // Retryable so the SDK can replay the body; progress restarts from zero
        // on a replay and the reporter keeps it monotonic.
        let sdk_body = SdkBody::retryable(move || {
            SdkBody::from_body_1_x(CountingBody::new(body.clone(), on_sent.clone()))
        });

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_length(length)
            .body(ByteStream::new(sdk_body))
            .send()
            .await
            .map_err(service_error)?;

        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody, StoreError> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(service_error)?;

        let content_length = response.content_length().map(|n| n.max(0) as u64);

        Ok(ObjectBody {
            content_length,
            reader: Box::pin(response.body.into_async_read()),
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(service_error)?;

        Ok(())
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<BatchDeleteOutcome, StoreError> {
        let identifiers = keys
            .iter()
            .map(|key| {
                ObjectIdentifier::builder()
                    .key(key)
                    .build()
                    .map_err(|e| StoreError::Request(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .quiet(false)
            .build()
            .map_err(|e| StoreError::Request(e.to_string()))?;

        let response = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(service_error)?;

        for error in response.errors() {
            tracing::debug!(
                "Batch delete rejected {:?}: {:?} {:?}",
                error.key(),
                error.code(),
                error.message()
            );
        }

        Ok(BatchDeleteOutcome {
            deleted: response.deleted().len(),
            failed: response.errors().len(),
        })
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<String, StoreError> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(service_error)?;

        response
            .upload_id()
            .map(|s| s.to_string())
            .ok_or(StoreError::MissingField("UploadId"))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<String, StoreError> {
        let length = body.len() as i64;

        let response = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .content_length(length)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(service_error)?;

        response
            .e_tag()
            .map(|s| s.to_string())
            .ok_or(StoreError::MissingField("ETag"))
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StoreError> {
        let parts = parts
            .iter()
            .map(|p| {
                SdkCompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.e_tag)
                    .build()
            })
            .collect::<Vec<_>>();

        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(upload)
            .send()
            .await
            .map_err(service_error)?;

        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StoreError> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(service_error)?;

        Ok(())
    }
}

/// Factory producing [`S3Store`] clients
#[derive(Debug, Clone, Copy, Default)]
pub struct S3StoreFactory;

impl StoreFactory for S3StoreFactory {
    fn create(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn ObjectStore>, TransferError> {
        Ok(Arc::new(S3Store::new(descriptor)?))
    }
}
