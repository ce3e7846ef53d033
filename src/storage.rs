use std::future::Future;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::{ByteStream, DateTime as AwsDateTime};
use aws_sdk_s3::types::{
    BucketLocationConstraint, CommonPrefix, CreateBucketConfiguration, Delete, Object,
    ObjectIdentifier,
};
use chrono::{DateTime, Utc};
use tokio::time::timeout;

use crate::config::{Config, Provider};
use crate::models::{BucketEntry, ObjectEntry};

/// One delimited listing page; the API also caps a batch delete at the
/// same count.
pub const PAGE_SIZE: i32 = 1000;
pub const BATCH_DELETE_MAX: usize = 1000;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct StorageService {
    client: Client,
    region: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ListPage {
    pub entries: Vec<ObjectEntry>,
    pub next_token: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ObjectDetails {
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct BatchDeleteOutcome {
    pub deleted: Vec<String>,
    pub errors: Vec<String>,
}

impl StorageService {
    pub async fn connect(config: &Config) -> Result<Self> {
        match &config.provider {
            Provider::S3 => {
                let sdk_config = aws_config::from_env().load().await;
                let region = sdk_config.region().map(|r| r.as_ref().to_string());
                Ok(Self {
                    client: Client::new(&sdk_config),
                    region,
                })
            }
            Provider::R2 {
                account_id,
                access_key_id,
                secret_access_key,
                ..
            } => {
                let access_key_id = access_key_id
                    .as_deref()
                    .context("R2_ACCESS_KEY_ID is not set")?;
                let secret_access_key = secret_access_key
                    .as_deref()
                    .context("R2_SECRET_ACCESS_KEY is not set")?;
                let credentials =
                    Credentials::new(access_key_id, secret_access_key, None, None, "r2-env");
                let sdk_config = aws_config::from_env()
                    .region(Region::new("auto"))
                    .endpoint_url(format!("https://{account_id}.r2.cloudflarestorage.com"))
                    .credentials_provider(credentials)
                    .load()
                    .await;
                Ok(Self {
                    client: Client::new(&sdk_config),
                    region: None,
                })
            }
        }
    }

    pub async fn list_buckets(&self) -> Result<Vec<BucketEntry>> {
        let output = call(self.client.list_buckets().send()).await?;
        let mut buckets = Vec::new();
        for bucket in output.buckets() {
            if let Some(name) = bucket.name() {
                buckets.push(BucketEntry {
                    name: name.to_string(),
                    created_at: bucket.creation_date().and_then(to_chrono),
                });
            }
        }
        Ok(buckets)
    }

    /// One `/`-delimited page: synthesized directory entries first, then the
    /// real objects, with the prefix's own marker key dropped.
    pub async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .delimiter("/")
            .max_keys(PAGE_SIZE);
        if !prefix.is_empty() {
            request = request.prefix(prefix);
        }
        if let Some(token) = continuation_token {
            request = request.continuation_token(token);
        }
        let response = call(request.send()).await?;

        let entries = synthesize_entries(prefix, response.common_prefixes(), response.contents());
        let next_token = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };
        Ok(ListPage {
            entries,
            next_token,
        })
    }

    /// Undelimited key page under a prefix, for recursive folder deletes.
    pub async fn list_keys_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<(Vec<String>, Option<String>)> {
        let mut request = self.client.list_objects_v2().bucket(bucket).prefix(prefix);
        if let Some(token) = continuation_token {
            request = request.continuation_token(token);
        }
        let response = call(request.send()).await?;
        let keys = response
            .contents()
            .iter()
            .filter_map(|object| object.key())
            .map(str::to_string)
            .collect();
        let next_token = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };
        Ok((keys, next_token))
    }

    pub async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectDetails> {
        let head = call(self.client.head_object().bucket(bucket).key(key).send()).await?;
        Ok(ObjectDetails {
            size: head.content_length().unwrap_or_default().max(0) as u64,
            last_modified: head.last_modified().and_then(to_chrono),
            content_type: head.content_type().map(str::to_string),
        })
    }

    /// Accumulates the whole body in memory, then writes once. Returns the
    /// number of bytes written.
    pub async fn download_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64> {
        let output = call(self.client.get_object().bucket(bucket).key(key).send()).await?;
        let data = timeout(CALL_TIMEOUT, output.body.collect())
            .await
            .map_err(|_| anyhow!("timed out reading the object body"))?
            .context("failed to read the object body")?
            .into_bytes();
        let written = data.len() as u64;
        std::fs::write(dest, &data)
            .with_context(|| format!("failed to write {}", dest.display()))?;
        Ok(written)
    }

    pub async fn upload_object(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<()> {
        call(
            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(ByteStream::from(bytes))
                .send(),
        )
        .await?;
        Ok(())
    }

    /// One batch-delete call; callers keep batches at or under
    /// [`BATCH_DELETE_MAX`]. Per-key failures come back in the outcome
    /// instead of failing the call.
    pub async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<BatchDeleteOutcome> {
        if keys.is_empty() {
            return Ok(BatchDeleteOutcome::default());
        }
        let mut objects = Vec::with_capacity(keys.len());
        for key in keys {
            let object = ObjectIdentifier::builder()
                .key(key.clone())
                .build()
                .context("invalid object identifier")?;
            objects.push(object);
        }
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .build()
            .context("invalid delete payload")?;
        let response = call(
            self.client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send(),
        )
        .await?;

        let deleted = response
            .deleted()
            .iter()
            .filter_map(|d| d.key())
            .map(str::to_string)
            .collect();
        let errors = response
            .errors()
            .iter()
            .map(|e| {
                format!(
                    "{}: {}",
                    e.key().unwrap_or("?"),
                    e.message().unwrap_or("delete failed")
                )
            })
            .collect();
        Ok(BatchDeleteOutcome { deleted, errors })
    }

    pub async fn create_bucket(&self, name: &str) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(name);
        // us-east-1 is the API default and rejects an explicit constraint
        if let Some(region) = self.region.as_deref().filter(|r| *r != "us-east-1") {
            let constraint = BucketLocationConstraint::from(region);
            let bucket_config = CreateBucketConfiguration::builder()
                .location_constraint(constraint)
                .build();
            request = request.create_bucket_configuration(bucket_config);
        }
        call(request.send()).await?;
        Ok(())
    }
}

/// Runs an SDK call under the shared timeout and flattens its error into a
/// one-line message suitable for the status bar.
async fn call<T, E>(fut: impl Future<Output = Result<T, SdkError<E>>>) -> Result<T>
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match timeout(CALL_TIMEOUT, fut).await {
        Err(_) => Err(anyhow!(
            "request timed out after {}s",
            CALL_TIMEOUT.as_secs()
        )),
        Ok(Ok(output)) => Ok(output),
        Ok(Err(err)) => Err(anyhow!(describe_sdk_error(&err))),
    }
}

fn describe_sdk_error<E>(err: &SdkError<E>) -> String
where
    E: ProvideErrorMetadata + std::error::Error,
{
    match err {
        SdkError::ServiceError(ctx) => {
            let service = ctx.err();
            let code = service.meta().code().unwrap_or("ServiceError");
            let message = service.meta().message().unwrap_or("no message provided");
            let friendly = match code {
                "NoSuchBucket" => "bucket does not exist or is not accessible",
                "NoSuchKey" => "object was not found",
                "AccessDenied" => "access denied; check the active credentials",
                "BucketAlreadyExists" => "bucket name is already taken",
                "BucketAlreadyOwnedByYou" => "you already own a bucket with this name",
                _ => return format!("{code}: {message}"),
            };
            format!("{code}: {friendly}")
        }
        SdkError::DispatchFailure(err) => format!("network/dispatch failure: {err:?}"),
        SdkError::TimeoutError(_) => "request timed out; please retry".to_string(),
        SdkError::ResponseError(ctx) => format!("response error: {ctx:?}"),
        other => format!("{other:?}"),
    }
}

fn synthesize_entries(
    prefix: &str,
    common_prefixes: &[CommonPrefix],
    contents: &[Object],
) -> Vec<ObjectEntry> {
    let mut entries = Vec::with_capacity(common_prefixes.len() + contents.len());
    for dir in common_prefixes {
        if let Some(key) = dir.prefix() {
            entries.push(ObjectEntry::directory(key));
        }
    }
    for object in contents {
        let Some(key) = object.key() else { continue };
        // the zero-byte marker backing the current "folder" is not a row
        if key == prefix {
            continue;
        }
        entries.push(ObjectEntry {
            key: key.to_string(),
            size: object.size().unwrap_or_default().max(0) as u64,
            last_modified: object.last_modified().and_then(to_chrono),
            etag: object.e_tag().map(str::to_string),
            is_directory: false,
        });
    }
    entries
}

fn to_chrono(ts: &AwsDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())
}
