use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use orient_core::contract::InvocationOutcome;
use orient_core::policy::HandlerConfig;
use orient_lambda::adapters::object_store::{ObjectStore, StoreError, StoredObject};
use orient_lambda::adapters::transcoder::ExifAutoOrienter;
use orient_lambda::handlers::notification::handle_notification;
use serde_json::Value;

struct S3ObjectStore {
    s3_client: aws_sdk_s3::Client,
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
        let output = self
            .s3_client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|error| classify_sdk_error("read", bucket, key, error))?;

        let content_type = output.content_type().map(str::to_string);
        let body = output
            .body
            .collect()
            .await
            .map_err(|error| {
                StoreError::Service(format!("failed to stream s3://{bucket}/{key}: {error}"))
            })?
            .into_bytes();

        Ok(StoredObject { body, content_type })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), StoreError> {
        self.s3_client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_content_type(content_type.map(str::to_string))
            .send()
            .await
            .map(|_| ())
            .map_err(|error| classify_sdk_error("write", bucket, key, error))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.s3_client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| classify_sdk_error("delete", bucket, key, error))
    }
}

fn classify_sdk_error<E, R>(
    action: &str,
    bucket: &str,
    key: &str,
    error: SdkError<E, R>,
) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let detail = format!(
        "failed to {action} s3://{bucket}/{key}: {}",
        DisplayErrorContext(&error)
    );
    store_error_for_code(error.code(), bucket, key, detail)
}

fn store_error_for_code(
    code: Option<&str>,
    bucket: &str,
    key: &str,
    detail: String,
) -> StoreError {
    match code {
        Some("NoSuchKey") | Some("NotFound") => StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        Some("AccessDenied") | Some("Forbidden") => StoreError::AccessDenied {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        _ => StoreError::Service(detail),
    }
}

struct RuntimeDependencies {
    config: HandlerConfig,
    store: S3ObjectStore,
    transcoder: ExifAutoOrienter,
}

async fn handle_request(
    event: LambdaEvent<Value>,
    deps: &RuntimeDependencies,
) -> Result<InvocationOutcome, Error> {
    handle_notification(event.payload, &deps.config, &deps.store, &deps.transcoder)
        .await
        .map_err(Error::from)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::tracing::init_default_subscriber();

    let config = HandlerConfig::from_env()
        .map_err(|error| Error::from(format!("invalid handler configuration: {error}")))?;
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let deps = Arc::new(RuntimeDependencies {
        transcoder: ExifAutoOrienter::new(config.jpeg_quality),
        config,
        store: S3ObjectStore {
            s3_client: aws_sdk_s3::Client::new(&aws_config),
        },
    });

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let deps = Arc::clone(&deps);
        async move { handle_request(event, &deps).await }
    }))
    .await
}
