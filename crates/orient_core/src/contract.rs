use aws_lambda_events::event::s3::{S3Event, S3EventRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const OUTCOME_SCHEMA_VERSION: &str = "v1";

/// One object announced by a notification record, key already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ObjectDisposition {
    Transcoded,
    PassedThrough,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectOutcome {
    pub bucket: String,
    pub source_key: String,
    pub disposition: ObjectDisposition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_key: Option<String>,
    pub source_removed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvocationOutcome {
    pub status: String,
    pub schema_version: String,
    pub objects: Vec<ObjectOutcome>,
}

impl InvocationOutcome {
    pub fn completed(objects: Vec<ObjectOutcome>) -> Self {
        Self {
            status: "ok".to_string(),
            schema_version: OUTCOME_SCHEMA_VERSION.to_string(),
            objects,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Deserializes an S3 event notification delivered to the function.
pub fn parse_notification(payload: Value) -> Result<S3Event, ValidationError> {
    if !payload.is_object() {
        return Err(ValidationError::new(
            "Notification payload must be a JSON object",
        ));
    }

    serde_json::from_value(payload)
        .map_err(|error| ValidationError::new(format!("Malformed S3 notification: {error}")))
}

/// Resolves every record to a bucket and decoded key, in delivery order.
pub fn object_refs(event: &S3Event) -> Result<Vec<ObjectRef>, ValidationError> {
    if event.records.is_empty() {
        return Err(ValidationError::new(
            "Notification must contain at least one record",
        ));
    }

    event.records.iter().map(object_ref).collect()
}

fn object_ref(record: &S3EventRecord) -> Result<ObjectRef, ValidationError> {
    let bucket = record
        .s3
        .bucket
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ValidationError::new("bucket name cannot be empty"))?;

    let raw_key = record.s3.object.key.as_deref().unwrap_or_default();

    Ok(ObjectRef {
        bucket: bucket.to_string(),
        key: decode_object_key(raw_key)?,
    })
}

/// Decodes an event key using form rules: `+` becomes a space before
/// percent-escapes are resolved, so `%2B` still yields a literal `+`.
pub fn decode_object_key(raw: &str) -> Result<String, ValidationError> {
    let spaced = raw.replace('+', " ");
    let decoded = urlencoding::decode(&spaced).map_err(|error| {
        ValidationError::new(format!("object key '{raw}' is not valid UTF-8: {error}"))
    })?;

    if decoded.is_empty() {
        return Err(ValidationError::new("object key cannot be empty"));
    }

    Ok(decoded.into_owned())
}
