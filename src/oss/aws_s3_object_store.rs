use async_trait::async_trait;
use aws_config::Region;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
};
use aws_sdk_s3::Client;
use futures::stream::{StreamExt, TryStreamExt};
use garde::Validate;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use tokio::sync::OnceCell;

use crate::oss::{
    BlobKind, CopyReceipt, CopySource, ListPage, ObjectMeta, ObjectStore, ObjectStoreError,
};

/// S3 单次 ListObjectsV2 的最大条数
pub const S3_MAX_KEYS: usize = 1000;

/// S3 单次 CopyObject 支持的最大对象大小（5 GiB）
const S3_MAX_SINGLE_COPY: u64 = 5 * 1024 * 1024 * 1024;

/// S3 分片上传的最大分片数
const S3_MAX_PARTS: u64 = 10000;

/// S3 分片的最小大小（5 MiB）
const S3_MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// S3 ObjectStore 配置
///
/// 一个配置对应一个账号（凭证 + 区域 + 端点），容器在调用时指定。
///
/// 凭证获取顺序（优先级从高到低）：
/// 1. `access_key_id` + `secret_access_key` - 直接配置的访问密钥
/// 2. 默认凭证链（环境变量、`~/.aws/credentials`、ECS/EC2 元数据）
#[derive(Debug, Deserialize, Serialize, SmartDefault, Clone, Validate)]
#[serde(default)]
pub struct AwsS3ObjectStoreConfig {
    /// AWS 区域
    #[garde(length(min = 1))]
    #[default = "us-east-1"]
    pub region: String,

    /// 自定义端点（MinIO 等 S3 兼容存储）
    #[garde(skip)]
    pub endpoint: Option<String>,

    /// 是否使用 path-style URL，设置了 endpoint 时默认为 true
    #[garde(skip)]
    pub force_path_style: Option<bool>,

    #[garde(skip)]
    pub access_key_id: Option<String>,

    #[garde(skip)]
    pub secret_access_key: Option<String>,

    /// 超过该大小的对象使用分片复制（UploadPartCopy）
    #[garde(range(min = 1, max = S3_MAX_SINGLE_COPY))]
    #[default(S3_MAX_SINGLE_COPY)]
    pub multipart_copy_threshold: u64,

    /// 分片复制的分片大小（最小 5 MiB）
    #[garde(range(min = S3_MIN_PART_SIZE, max = S3_MAX_SINGLE_COPY))]
    #[default(256 * 1024 * 1024)]
    pub copy_part_size: u64,

    /// 分片复制的并发数
    #[garde(range(min = 1))]
    #[default = 4]
    pub multipart_concurrency: usize,
}

/// S3 ObjectStore 实现
///
/// 客户端在第一次请求时才创建，构造本身不需要运行时。
pub struct AwsS3ObjectStore {
    client: OnceCell<Client>,
    config: AwsS3ObjectStoreConfig,
}

impl AwsS3ObjectStore {
    pub fn new(config: AwsS3ObjectStoreConfig) -> Result<Self, ObjectStoreError> {
        if let Err(errors) = config.validate() {
            return Err(ObjectStoreError::Configuration(format!("{}", errors)));
        }

        if config.access_key_id.is_some() != config.secret_access_key.is_some() {
            return Err(ObjectStoreError::Configuration(
                "access_key_id 和 secret_access_key 必须同时配置".to_string(),
            ));
        }

        Ok(Self {
            client: OnceCell::new(),
            config,
        })
    }

    async fn client(&self) -> &Client {
        self.client
            .get_or_init(|| Self::create_client(&self.config))
            .await
    }

    async fn create_client(config: &AwsS3ObjectStoreConfig) -> Client {
        let mut builder = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(ak), Some(sk)) = (&config.access_key_id, &config.secret_access_key) {
            let credentials = Credentials::new(ak, sk, None, None, "blobsync");
            builder = builder.credentials_provider(credentials);
        }

        let sdk_config = builder.load().await;

        if let Some(endpoint) = &config.endpoint {
            let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
                .endpoint_url(endpoint)
                .force_path_style(config.force_path_style.unwrap_or(true))
                .build();
            Client::from_conf(s3_config)
        } else {
            Client::new(&sdk_config)
        }
    }

    /// 计算分片大小，保证分片数不超过 S3 上限
    fn part_size_for(&self, size: u64) -> u64 {
        let min_for_limit = size.div_ceil(S3_MAX_PARTS);
        self.config.copy_part_size.max(min_for_limit)
    }

    async fn copy_multipart(
        &self,
        copy_source: &str,
        size: u64,
        container: &str,
        key: &str,
    ) -> Result<CopyReceipt, ObjectStoreError> {
        let client = self.client().await;

        let created = client
            .create_multipart_upload()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, "create_multipart_upload", container))?;
        let upload_id = created.upload_id().map(str::to_string).ok_or_else(|| {
            ObjectStoreError::BatchTransfer {
                message: format!("no upload id returned for {}", key),
            }
        })?;

        let part_size = self.part_size_for(size);
        let ranges: Vec<(i32, u64, u64)> = (0..size.div_ceil(part_size))
            .map(|i| {
                let start = i * part_size;
                let end = (start + part_size).min(size) - 1;
                (i as i32 + 1, start, end)
            })
            .collect();

        let parts: Result<Vec<CompletedPart>, ObjectStoreError> =
            futures::stream::iter(ranges.into_iter().map(|(part_number, start, end)| {
                let upload_id = upload_id.clone();
                async move {
                    let output = client
                        .upload_part_copy()
                        .bucket(container)
                        .key(key)
                        .upload_id(upload_id)
                        .part_number(part_number)
                        .copy_source(copy_source)
                        .copy_source_range(format!("bytes={}-{}", start, end))
                        .send()
                        .await
                        .map_err(|e| classify(e, "upload_part_copy", container))?;

                    let etag = output
                        .copy_part_result()
                        .and_then(|r| r.e_tag())
                        .map(str::to_string)
                        .ok_or_else(|| ObjectStoreError::BatchTransfer {
                            message: format!("no etag returned for part {}", part_number),
                        })?;

                    Ok(CompletedPart::builder()
                        .part_number(part_number)
                        .e_tag(etag)
                        .build())
                }
            }))
            .buffer_unordered(self.config.multipart_concurrency)
            .try_collect()
            .await;

        let mut parts = match parts {
            Ok(parts) => parts,
            Err(e) => {
                let _ = client
                    .abort_multipart_upload()
                    .bucket(container)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await;
                // 可重试的错误原样返回，整体复制会被重新发起
                if e.is_retryable() || e.is_fatal() {
                    return Err(e);
                }
                return Err(ObjectStoreError::BatchTransfer {
                    message: format!("{}: {}", key, e),
                });
            }
        };
        parts.sort_by_key(|p| p.part_number());

        let completed = client
            .complete_multipart_upload()
            .bucket(container)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| classify(e, "complete_multipart_upload", container))?;

        Ok(CopyReceipt {
            bytes_copied: size,
            etag: completed.e_tag().map(str::to_string),
        })
    }
}

/// 将 SDK 错误归类为 ObjectStoreError
fn classify<E>(err: SdkError<E>, operation: &str, container: &str) -> ObjectStoreError
where
    E: std::error::Error + ProvideErrorMetadata + Send + Sync + 'static,
{
    match &err {
        SdkError::TimeoutError(_) => {
            return ObjectStoreError::Timeout(format!("{}: {}", operation, DisplayErrorContext(&err)))
        }
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            return ObjectStoreError::Network(format!("{}: {}", operation, DisplayErrorContext(&err)))
        }
        _ => {}
    }

    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.code().map(str::to_string);
    let message = format!("{}: {}", operation, DisplayErrorContext(&err));

    match (code.as_deref(), status) {
        (Some("NoSuchBucket"), _) => ObjectStoreError::ContainerNotFound {
            container: container.to_string(),
        },
        (Some("InvalidAccessKeyId" | "SignatureDoesNotMatch" | "ExpiredToken"), _)
        | (_, Some(401)) => ObjectStoreError::Authentication(message),
        (Some("AccessDenied"), _) | (_, Some(403)) => ObjectStoreError::PermissionDenied(message),
        (Some("SlowDown" | "Throttling" | "RequestLimitExceeded"), _) | (_, Some(429)) => {
            ObjectStoreError::RateLimited(message)
        }
        _ => ObjectStoreError::from_provider(err, "S3", operation, status),
    }
}

fn to_utc(dt: Option<&aws_sdk_s3::primitives::DateTime>) -> chrono::DateTime<chrono::Utc> {
    dt.and_then(|dt| chrono::DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()))
        .unwrap_or_default()
}

#[async_trait]
impl ObjectStore for AwsS3ObjectStore {
    async fn list_objects_page(
        &self,
        container: &str,
        prefix: Option<&str>,
        cursor: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, ObjectStoreError> {
        let mut builder = self
            .client()
            .await
            .list_objects_v2()
            .bucket(container)
            .max_keys(max_keys.clamp(1, S3_MAX_KEYS) as i32);

        if let Some(p) = prefix {
            builder = builder.prefix(p);
        }
        if let Some(token) = cursor {
            builder = builder.continuation_token(token);
        }

        let output = builder
            .send()
            .await
            .map_err(|e| classify(e, "list_objects_v2", container))?;

        let objects = output
            .contents()
            .iter()
            .map(|obj| ObjectMeta {
                key: obj.key().unwrap_or_default().to_string(),
                size: obj.size().unwrap_or(0) as u64,
                last_modified: to_utc(obj.last_modified()),
                kind: BlobKind::Block,
                etag: obj.e_tag().map(str::to_string),
            })
            .collect();

        let next_cursor = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            objects,
            next_cursor,
        })
    }

    async fn head_object(
        &self,
        container: &str,
        key: &str,
    ) -> Result<Option<ObjectMeta>, ObjectStoreError> {
        match self
            .client()
            .await
            .head_object()
            .bucket(container)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(ObjectMeta {
                key: key.to_string(),
                size: output.content_length().unwrap_or(0) as u64,
                last_modified: to_utc(output.last_modified()),
                kind: BlobKind::Block,
                etag: output.e_tag().map(str::to_string),
            })),
            Err(SdkError::ServiceError(se)) if se.err().is_not_found() => Ok(None),
            Err(e) => Err(classify(e, "head_object", container)),
        }
    }

    async fn copy_object(
        &self,
        source: &CopySource,
        container: &str,
        key: &str,
    ) -> Result<CopyReceipt, ObjectStoreError> {
        if source.kind != BlobKind::Block {
            return Err(ObjectStoreError::InvalidInput(format!(
                "S3 只支持 block 类型对象: {} ({})",
                source.key, source.kind
            )));
        }

        let copy_source = format!(
            "{}/{}",
            source.container,
            urlencoding::encode(&source.key)
        );

        if source.size > self.config.multipart_copy_threshold {
            return self
                .copy_multipart(&copy_source, source.size, container, key)
                .await;
        }

        let output = self
            .client()
            .await
            .copy_object()
            .copy_source(&copy_source)
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, "copy_object", container))?;

        Ok(CopyReceipt {
            bytes_copied: source.size,
            etag: output
                .copy_object_result()
                .and_then(|r| r.e_tag())
                .map(str::to_string),
        })
    }

    async fn create_container_if_absent(&self, container: &str) -> Result<bool, ObjectStoreError> {
        let client = self.client().await;

        match client.head_bucket().bucket(container).send().await {
            Ok(_) => return Ok(false),
            Err(SdkError::ServiceError(se)) if se.err().is_not_found() => {}
            Err(e) => return Err(classify(e, "head_bucket", container)),
        }

        let mut request = client.create_bucket().bucket(container);
        if self.config.endpoint.is_none() && self.config.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(
                        self.config.region.as_str(),
                    ))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(se)) if se.err().is_bucket_already_owned_by_you() => {
                Ok(false)
            }
            Err(e) => Err(classify(e, "create_bucket", container)),
        }
    }

    fn uri(&self, container: &str, key: &str) -> String {
        format!("s3://{}/{}", container, key)
    }
}

crate::impl_box_from!(AwsS3ObjectStore => dyn ObjectStore);
