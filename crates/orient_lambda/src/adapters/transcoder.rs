use async_trait::async_trait;
use bytes::Bytes;
use orient_core::orientation::{auto_orient, TranscodeError};
use orient_core::policy::DEFAULT_JPEG_QUALITY;

#[async_trait]
pub trait ImageTranscoder: Send + Sync {
    async fn reorient(&self, body: Bytes) -> Result<Bytes, TranscodeError>;
}

/// Runs `auto_orient` on tokio's blocking pool.
#[derive(Debug, Clone, Copy)]
pub struct ExifAutoOrienter {
    jpeg_quality: u8,
}

impl ExifAutoOrienter {
    pub fn new(jpeg_quality: u8) -> Self {
        Self { jpeg_quality }
    }
}

impl Default for ExifAutoOrienter {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

#[async_trait]
impl ImageTranscoder for ExifAutoOrienter {
    async fn reorient(&self, body: Bytes) -> Result<Bytes, TranscodeError> {
        let quality = self.jpeg_quality;
        run_blocking(move || auto_orient(&body, quality)).await
    }
}

/// A panicked or cancelled task surfaces as `TranscodeError::Task`.
async fn run_blocking<F>(work: F) -> Result<Bytes, TranscodeError>
where
    F: FnOnce() -> Result<Vec<u8>, TranscodeError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|error| TranscodeError::Task(error.to_string()))?
        .map(Bytes::from)
}
