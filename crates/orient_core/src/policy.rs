use thiserror::Error;

pub const DEFAULT_CONTENT_TYPES: [&str; 2] = ["image/jpeg", "image/jpg"];
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

pub const CONTENT_TYPES_ENV: &str = "ORIENT_CONTENT_TYPES";
pub const DESTINATION_PREFIX_ENV: &str = "ORIENT_DESTINATION_PREFIX";
pub const UNSUPPORTED_CONTENT_ENV: &str = "ORIENT_UNSUPPORTED_CONTENT";
pub const JPEG_QUALITY_ENV: &str = "ORIENT_JPEG_QUALITY";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("ORIENT_CONTENT_TYPES must list at least one content type")]
    EmptyWhitelist,

    #[error("destination prefix '{0}' must be a single non-empty path segment")]
    InvalidDestinationPrefix(String),

    #[error("unsupported content policy '{0}' must be 'pass-through' or 'skip'")]
    InvalidUnsupportedPolicy(String),

    #[error("jpeg quality '{0}' must be an integer between 1 and 100")]
    InvalidJpegQuality(String),
}

/// Content-type labels eligible for auto-orientation. Matching is exact and
/// case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTypeWhitelist {
    accepted: Vec<String>,
}

impl ContentTypeWhitelist {
    pub fn new<I, S>(accepted: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let accepted: Vec<String> = accepted
            .into_iter()
            .map(Into::into)
            .filter(|value| !value.is_empty())
            .collect();
        if accepted.is_empty() {
            return Err(ConfigError::EmptyWhitelist);
        }
        Ok(Self { accepted })
    }

    pub fn contains(&self, content_type: &str) -> bool {
        self.accepted.iter().any(|value| value == content_type)
    }

    pub fn accepted(&self) -> &[String] {
        &self.accepted
    }
}

impl Default for ContentTypeWhitelist {
    fn default() -> Self {
        Self {
            accepted: DEFAULT_CONTENT_TYPES.iter().map(|value| value.to_string()).collect(),
        }
    }
}

/// What happens to an object whose content type is not whitelisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnsupportedTypePolicy {
    /// Write the original bytes to the destination unchanged.
    #[default]
    PassThrough,
    /// Leave the object alone and report success.
    Skip,
}

impl UnsupportedTypePolicy {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim() {
            "pass-through" | "passthrough" => Ok(Self::PassThrough),
            "skip" => Ok(Self::Skip),
            other => Err(ConfigError::InvalidUnsupportedPolicy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DestinationPolicy {
    /// Overwrite the source key.
    #[default]
    Identity,
    /// Replace the first key segment with this literal and delete the source
    /// after a successful write.
    RewritePrefix(String),
}

impl DestinationPolicy {
    pub fn rewrite_prefix(segment: impl Into<String>) -> Result<Self, ConfigError> {
        let segment = segment.into();
        if segment.is_empty() || segment.contains('/') {
            return Err(ConfigError::InvalidDestinationPrefix(segment));
        }
        Ok(Self::RewritePrefix(segment))
    }
}

/// Classification of a fetched object against the whitelist and policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectPlan {
    Transcode,
    PassThrough,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    pub whitelist: ContentTypeWhitelist,
    pub destination: DestinationPolicy,
    pub unsupported: UnsupportedTypePolicy,
    pub jpeg_quality: u8,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            whitelist: ContentTypeWhitelist::default(),
            destination: DestinationPolicy::Identity,
            unsupported: UnsupportedTypePolicy::PassThrough,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl HandlerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from a variable lookup. Unset or blank
    /// variables fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let whitelist = match read(CONTENT_TYPES_ENV) {
            Some(list) => ContentTypeWhitelist::new(list.split(',').map(str::trim))?,
            None => ContentTypeWhitelist::default(),
        };

        let destination = match read(DESTINATION_PREFIX_ENV) {
            Some(segment) => DestinationPolicy::rewrite_prefix(segment)?,
            None => DestinationPolicy::Identity,
        };

        let unsupported = match read(UNSUPPORTED_CONTENT_ENV) {
            Some(value) => UnsupportedTypePolicy::parse(&value)?,
            None => UnsupportedTypePolicy::default(),
        };

        let jpeg_quality = match read(JPEG_QUALITY_ENV) {
            Some(value) => match value.parse::<u8>() {
                Ok(quality) if (1..=100).contains(&quality) => quality,
                _ => return Err(ConfigError::InvalidJpegQuality(value)),
            },
            None => DEFAULT_JPEG_QUALITY,
        };

        Ok(Self {
            whitelist,
            destination,
            unsupported,
            jpeg_quality,
        })
    }

    /// A missing content type is never whitelisted.
    pub fn plan_for(&self, content_type: Option<&str>) -> ObjectPlan {
        match content_type {
            Some(value) if self.whitelist.contains(value) => ObjectPlan::Transcode,
            _ => match self.unsupported {
                UnsupportedTypePolicy::PassThrough => ObjectPlan::PassThrough,
                UnsupportedTypePolicy::Skip => ObjectPlan::Skip,
            },
        }
    }
}
