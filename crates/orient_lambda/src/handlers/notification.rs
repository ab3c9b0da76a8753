use std::time::{Duration, Instant};

use orient_core::contract::{
    object_refs, parse_notification, InvocationOutcome, ObjectDisposition, ObjectOutcome,
    ObjectRef, ValidationError,
};
use orient_core::orientation::TranscodeError;
use orient_core::policy::{HandlerConfig, ObjectPlan};
use orient_core::storage_keys::{destination_key, removes_source};
use serde_json::Value;
use thiserror::Error;

use crate::adapters::object_store::{ObjectStore, StoreError};
use crate::adapters::transcoder::ImageTranscoder;

const COMPONENT: &str = "notification_handler";

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid notification: {0}")]
    InvalidEvent(#[from] ValidationError),

    #[error("failed to fetch s3://{bucket}/{key}: {source}")]
    Fetch {
        bucket: String,
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to auto-orient s3://{bucket}/{key}: {source}")]
    Transcode {
        bucket: String,
        key: String,
        #[source]
        source: TranscodeError,
    },

    #[error("failed to write s3://{bucket}/{key}: {source}")]
    Write {
        bucket: String,
        key: String,
        #[source]
        source: StoreError,
    },

    /// The destination was already written; both objects now exist.
    #[error("wrote s3://{bucket}/{destination_key} but failed to delete source {key}: {source}")]
    Delete {
        bucket: String,
        key: String,
        destination_key: String,
        #[source]
        source: StoreError,
    },
}

impl HandlerError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidEvent(_) => "invalid_event",
            Self::Fetch { .. } => "fetch_error",
            Self::Transcode { .. } => "transcode_error",
            Self::Write { .. } => "write_error",
            Self::Delete { .. } => "delete_error",
        }
    }
}

/// Runs one invocation: every announced object is fetched, auto-oriented or
/// passed through, written to its destination and, under a rewrite policy,
/// removed from its source. Objects are processed strictly in order and the
/// first fatal error ends the invocation.
pub async fn handle_notification(
    payload: Value,
    config: &HandlerConfig,
    store: &impl ObjectStore,
    transcoder: &impl ImageTranscoder,
) -> Result<InvocationOutcome, HandlerError> {
    let started_at = Instant::now();

    let parsed = parse_notification(payload).and_then(|event| object_refs(&event));
    let targets = match parsed {
        Ok(value) => value,
        Err(error) => {
            let error = HandlerError::from(error);
            log_failure(&error, started_at);
            return Err(error);
        }
    };

    let mut objects = Vec::with_capacity(targets.len());
    for target in &targets {
        match process_object(target, config, store, transcoder).await {
            Ok(outcome) => {
                tracing::info!(
                    component = COMPONENT,
                    event = "object_processed",
                    bucket = %outcome.bucket,
                    key = %outcome.source_key,
                    disposition = ?outcome.disposition,
                    destination_key = ?outcome.destination_key,
                    source_removed = outcome.source_removed,
                    "object processed"
                );
                objects.push(outcome);
            }
            Err(error) => {
                log_failure(&error, started_at);
                return Err(error);
            }
        }
    }

    Ok(InvocationOutcome::completed(objects))
}

async fn process_object(
    target: &ObjectRef,
    config: &HandlerConfig,
    store: &impl ObjectStore,
    transcoder: &impl ImageTranscoder,
) -> Result<ObjectOutcome, HandlerError> {
    let ObjectRef { bucket, key } = target;

    let object = store
        .get_object(bucket, key)
        .await
        .map_err(|source| HandlerError::Fetch {
            bucket: bucket.clone(),
            key: key.clone(),
            source,
        })?;

    let content_type = object.content_type.as_deref();
    let (body, disposition) = match config.plan_for(content_type) {
        ObjectPlan::Skip => {
            return Ok(ObjectOutcome {
                bucket: bucket.clone(),
                source_key: key.clone(),
                disposition: ObjectDisposition::Skipped,
                destination_key: None,
                source_removed: false,
            });
        }
        ObjectPlan::PassThrough => (object.body, ObjectDisposition::PassedThrough),
        ObjectPlan::Transcode => {
            let body = transcoder
                .reorient(object.body)
                .await
                .map_err(|source| HandlerError::Transcode {
                    bucket: bucket.clone(),
                    key: key.clone(),
                    source,
                })?;
            (body, ObjectDisposition::Transcoded)
        }
    };

    let destination = destination_key(&config.destination, key);
    store
        .put_object(bucket, &destination, body, content_type)
        .await
        .map_err(|source| HandlerError::Write {
            bucket: bucket.clone(),
            key: destination.clone(),
            source,
        })?;

    let source_removed = removes_source(&config.destination, key, &destination);
    if source_removed {
        store
            .delete_object(bucket, key)
            .await
            .map_err(|source| HandlerError::Delete {
                bucket: bucket.clone(),
                key: key.clone(),
                destination_key: destination.clone(),
                source,
            })?;
    }

    Ok(ObjectOutcome {
        bucket: bucket.clone(),
        source_key: key.clone(),
        disposition,
        destination_key: Some(destination),
        source_removed,
    })
}

fn log_failure(error: &HandlerError, started_at: Instant) {
    tracing::error!(
        component = COMPONENT,
        event = "invocation_failed",
        error_kind = error.kind(),
        duration_ms = whole_millis(started_at.elapsed()),
        error = %error,
        "invocation failed"
    );
}

/// Saturates instead of truncating the u128 millisecond count.
fn whole_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use orient_core::policy::{DestinationPolicy, UnsupportedTypePolicy};
    use serde_json::json;

    use super::*;
    use crate::adapters::object_store::StoredObject;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum StoreCall {
        Get(String),
        Put(String),
        Delete(String),
    }

    #[derive(Default)]
    struct RecordingStore {
        objects: Mutex<HashMap<String, StoredObject>>,
        calls: Mutex<Vec<StoreCall>>,
        fail_get: bool,
        fail_put: bool,
        fail_delete: bool,
    }

    impl RecordingStore {
        fn seeded(key: &str, body: &'static [u8], content_type: &str) -> Self {
            let store = Self::default();
            store.objects.lock().expect("poisoned mutex").insert(
                key.to_string(),
                StoredObject {
                    body: Bytes::from_static(body),
                    content_type: Some(content_type.to_string()),
                },
            );
            store
        }

        fn calls(&self) -> Vec<StoreCall> {
            self.calls.lock().expect("poisoned mutex").clone()
        }

        fn object(&self, key: &str) -> Option<StoredObject> {
            self.objects
                .lock()
                .expect("poisoned mutex")
                .get(key)
                .cloned()
        }

        fn record(&self, call: StoreCall) {
            self.calls.lock().expect("poisoned mutex").push(call);
        }
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
            self.record(StoreCall::Get(key.to_string()));
            if self.fail_get {
                return Err(StoreError::AccessDenied {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
            }
            self.object(key).ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
        }

        async fn put_object(
            &self,
            _bucket: &str,
            key: &str,
            body: Bytes,
            content_type: Option<&str>,
        ) -> Result<(), StoreError> {
            self.record(StoreCall::Put(key.to_string()));
            if self.fail_put {
                return Err(StoreError::Service("put rejected".to_string()));
            }
            self.objects.lock().expect("poisoned mutex").insert(
                key.to_string(),
                StoredObject {
                    body,
                    content_type: content_type.map(str::to_string),
                },
            );
            Ok(())
        }

        async fn delete_object(&self, _bucket: &str, key: &str) -> Result<(), StoreError> {
            self.record(StoreCall::Delete(key.to_string()));
            if self.fail_delete {
                return Err(StoreError::Service("delete rejected".to_string()));
            }
            self.objects.lock().expect("poisoned mutex").remove(key);
            Ok(())
        }
    }

    struct StubTranscoder {
        fail: bool,
        calls: Mutex<usize>,
    }

    impl StubTranscoder {
        fn passing() -> Self {
            Self {
                fail: false,
                calls: Mutex::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().expect("poisoned mutex")
        }
    }

    #[async_trait]
    impl ImageTranscoder for StubTranscoder {
        async fn reorient(&self, body: Bytes) -> Result<Bytes, TranscodeError> {
            *self.calls.lock().expect("poisoned mutex") += 1;
            if self.fail {
                return Err(TranscodeError::Decode("corrupt jpeg".to_string()));
            }
            let mut oriented = b"oriented:".to_vec();
            oriented.extend_from_slice(&body);
            Ok(Bytes::from(oriented))
        }
    }

    fn s3_record(bucket: &str, key: &str) -> Value {
        json!({
            "eventVersion": "2.1",
            "eventSource": "aws:s3",
            "awsRegion": "eu-west-1",
            "eventTime": "2024-05-01T12:00:00.000Z",
            "eventName": "ObjectCreated:Put",
            "userIdentity": {"principalId": "AWS:AIDAEXAMPLE"},
            "requestParameters": {"sourceIPAddress": "203.0.113.7"},
            "responseElements": {},
            "s3": {
                "s3SchemaVersion": "1.0",
                "bucket": {"name": bucket, "arn": format!("arn:aws:s3:::{bucket}")},
                "object": {"key": key, "size": 4}
            }
        })
    }

    fn s3_event(bucket: &str, key: &str) -> Value {
        json!({ "Records": [s3_record(bucket, key)] })
    }

    fn rewrite_config(unsupported: UnsupportedTypePolicy) -> HandlerConfig {
        HandlerConfig {
            destination: DestinationPolicy::RewritePrefix("raw".to_string()),
            unsupported,
            ..HandlerConfig::default()
        }
    }

    #[tokio::test]
    async fn identity_policy_orients_in_place() {
        let store = RecordingStore::seeded("uploads/a b.jpg", b"jpeg", "image/jpeg");
        let transcoder = StubTranscoder::passing();

        let outcome = handle_notification(
            s3_event("photos", "uploads/a+b.jpg"),
            &HandlerConfig::default(),
            &store,
            &transcoder,
        )
        .await
        .expect("invocation should succeed");

        assert_eq!(
            store.calls(),
            vec![
                StoreCall::Get("uploads/a b.jpg".to_string()),
                StoreCall::Put("uploads/a b.jpg".to_string()),
            ]
        );
        let written = store.object("uploads/a b.jpg").expect("object should exist");
        assert_eq!(written.body, Bytes::from_static(b"oriented:jpeg"));
        assert_eq!(written.content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(outcome.objects[0].disposition, ObjectDisposition::Transcoded);
        assert!(!outcome.objects[0].source_removed);
    }

    #[tokio::test]
    async fn rewrite_policy_writes_then_deletes_source() {
        let store = RecordingStore::seeded("staging/photo.jpg", b"jpeg", "image/jpg");
        let transcoder = StubTranscoder::passing();

        let outcome = handle_notification(
            s3_event("photos", "staging/photo.jpg"),
            &rewrite_config(UnsupportedTypePolicy::Skip),
            &store,
            &transcoder,
        )
        .await
        .expect("invocation should succeed");

        assert_eq!(
            store.calls(),
            vec![
                StoreCall::Get("staging/photo.jpg".to_string()),
                StoreCall::Put("raw/photo.jpg".to_string()),
                StoreCall::Delete("staging/photo.jpg".to_string()),
            ]
        );
        assert!(store.object("staging/photo.jpg").is_none());
        assert_eq!(
            store
                .object("raw/photo.jpg")
                .expect("destination should exist")
                .content_type
                .as_deref(),
            Some("image/jpg")
        );
        assert_eq!(
            outcome.objects[0].destination_key.as_deref(),
            Some("raw/photo.jpg")
        );
        assert!(outcome.objects[0].source_removed);
    }

    #[tokio::test]
    async fn skip_policy_leaves_unsupported_objects_alone() {
        let store = RecordingStore::seeded("uploads/doc.png", b"png", "image/png");
        let transcoder = StubTranscoder::passing();

        let outcome = handle_notification(
            s3_event("photos", "uploads/doc.png"),
            &rewrite_config(UnsupportedTypePolicy::Skip),
            &store,
            &transcoder,
        )
        .await
        .expect("skip should report success");

        assert_eq!(
            store.calls(),
            vec![StoreCall::Get("uploads/doc.png".to_string())]
        );
        assert_eq!(transcoder.calls(), 0);
        assert_eq!(outcome.objects[0].disposition, ObjectDisposition::Skipped);
        assert_eq!(outcome.objects[0].destination_key, None);
    }

    #[tokio::test]
    async fn pass_through_policy_copies_unsupported_bytes_unchanged() {
        let store = RecordingStore::seeded("staging/doc.png", b"png", "image/png");
        let transcoder = StubTranscoder::passing();

        let outcome = handle_notification(
            s3_event("photos", "staging/doc.png"),
            &rewrite_config(UnsupportedTypePolicy::PassThrough),
            &store,
            &transcoder,
        )
        .await
        .expect("pass-through should succeed");

        assert_eq!(transcoder.calls(), 0);
        let written = store.object("raw/doc.png").expect("destination should exist");
        assert_eq!(written.body, Bytes::from_static(b"png"));
        assert_eq!(written.content_type.as_deref(), Some("image/png"));
        assert!(store.object("staging/doc.png").is_none());
        assert_eq!(
            outcome.objects[0].disposition,
            ObjectDisposition::PassedThrough
        );
    }

    #[tokio::test]
    async fn fetch_failure_is_fatal() {
        let store = RecordingStore {
            fail_get: true,
            ..RecordingStore::seeded("uploads/a.jpg", b"jpeg", "image/jpeg")
        };

        let error = handle_notification(
            s3_event("photos", "uploads/a.jpg"),
            &HandlerConfig::default(),
            &store,
            &StubTranscoder::passing(),
        )
        .await
        .expect_err("fetch failure should fail the invocation");

        assert_eq!(error.kind(), "fetch_error");
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn missing_object_is_fatal() {
        let store = RecordingStore::default();

        let error = handle_notification(
            s3_event("photos", "uploads/gone.jpg"),
            &HandlerConfig::default(),
            &store,
            &StubTranscoder::passing(),
        )
        .await
        .expect_err("missing object should fail");

        assert!(matches!(
            error,
            HandlerError::Fetch {
                source: StoreError::NotFound { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn transcode_failure_is_fatal_and_writes_nothing() {
        let store = RecordingStore::seeded("staging/bad.jpg", b"garbage", "image/jpeg");

        let error = handle_notification(
            s3_event("photos", "staging/bad.jpg"),
            &rewrite_config(UnsupportedTypePolicy::Skip),
            &store,
            &StubTranscoder::failing(),
        )
        .await
        .expect_err("transcode failure should fail");

        assert_eq!(error.kind(), "transcode_error");
        assert_eq!(
            store.calls(),
            vec![StoreCall::Get("staging/bad.jpg".to_string())]
        );
    }

    #[tokio::test]
    async fn write_failure_never_deletes_source() {
        let store = RecordingStore {
            fail_put: true,
            ..RecordingStore::seeded("staging/photo.jpg", b"jpeg", "image/jpeg")
        };

        let error = handle_notification(
            s3_event("photos", "staging/photo.jpg"),
            &rewrite_config(UnsupportedTypePolicy::Skip),
            &store,
            &StubTranscoder::passing(),
        )
        .await
        .expect_err("write failure should fail");

        assert_eq!(error.kind(), "write_error");
        assert!(!store
            .calls()
            .contains(&StoreCall::Delete("staging/photo.jpg".to_string())));
        assert!(store.object("staging/photo.jpg").is_some());
    }

    #[tokio::test]
    async fn delete_failure_is_fatal_after_write() {
        let store = RecordingStore {
            fail_delete: true,
            ..RecordingStore::seeded("staging/photo.jpg", b"jpeg", "image/jpeg")
        };

        let error = handle_notification(
            s3_event("photos", "staging/photo.jpg"),
            &rewrite_config(UnsupportedTypePolicy::Skip),
            &store,
            &StubTranscoder::passing(),
        )
        .await
        .expect_err("delete failure should fail");

        match error {
            HandlerError::Delete {
                key,
                destination_key,
                ..
            } => {
                assert_eq!(key, "staging/photo.jpg");
                assert_eq!(destination_key, "raw/photo.jpg");
            }
            other => panic!("expected delete error, got {other:?}"),
        }
        assert!(store.object("raw/photo.jpg").is_some());
    }

    #[tokio::test]
    async fn rewrite_onto_same_key_keeps_object() {
        let store = RecordingStore::seeded("raw/photo.jpg", b"jpeg", "image/jpeg");

        let outcome = handle_notification(
            s3_event("photos", "raw/photo.jpg"),
            &rewrite_config(UnsupportedTypePolicy::Skip),
            &store,
            &StubTranscoder::passing(),
        )
        .await
        .expect("invocation should succeed");

        assert!(!outcome.objects[0].source_removed);
        assert!(store.object("raw/photo.jpg").is_some());
        assert!(!store
            .calls()
            .iter()
            .any(|call| matches!(call, StoreCall::Delete(_))));
    }

    #[tokio::test]
    async fn reinvocation_overwrites_safely() {
        let store = RecordingStore::seeded("uploads/a.jpg", b"jpeg", "image/jpeg");
        let transcoder = StubTranscoder::passing();
        let config = HandlerConfig::default();

        for _ in 0..2 {
            handle_notification(
                s3_event("photos", "uploads/a.jpg"),
                &config,
                &store,
                &transcoder,
            )
            .await
            .expect("invocation should succeed");
        }

        assert_eq!(transcoder.calls(), 2);
        assert!(store.object("uploads/a.jpg").is_some());
    }

    #[tokio::test]
    async fn invalid_event_fails_without_store_calls() {
        let store = RecordingStore::default();

        let error = handle_notification(
            json!({"Records": []}),
            &HandlerConfig::default(),
            &store,
            &StubTranscoder::passing(),
        )
        .await
        .expect_err("empty records should fail");

        assert_eq!(error.kind(), "invalid_event");
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn stops_at_first_failing_record() {
        let store = RecordingStore::seeded("uploads/b.jpg", b"jpeg", "image/jpeg");
        let event = json!({
            "Records": [
                s3_record("photos", "uploads/missing.jpg"),
                s3_record("photos", "uploads/b.jpg")
            ]
        });

        let error = handle_notification(
            event,
            &HandlerConfig::default(),
            &store,
            &StubTranscoder::passing(),
        )
        .await
        .expect_err("first record should fail");

        assert_eq!(error.kind(), "fetch_error");
        assert_eq!(
            store.calls(),
            vec![StoreCall::Get("uploads/missing.jpg".to_string())]
        );
    }

    #[test]
    fn elapsed_millis_saturate() {
        assert_eq!(whole_millis(Duration::from_millis(1_250)), 1_250);
        assert_eq!(whole_millis(Duration::MAX), u64::MAX);
    }
}
