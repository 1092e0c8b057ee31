// Image activities
//
// Activities are the units of work scheduled by the image workflows. Each one
// is registered by name on every hosted worker:
// - findRandomImageActivity: asks the image source for a random image address
// - downloadImageActivity: stores the image on the worker's local disk
// - calcChecksumActivity: hashes a file previously downloaded on the same worker
//
// Decision: The HTTP client never follows redirects so discovery can read the
// Location header of the source's redirect response.

use std::path::PathBuf;
use std::time::Duration;

use affinity_durable::prelude::*;
use affinity_durable::ActivityRegistry;
use anyhow::Context;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::WorkerConfig;

// ============================================================================
// Fault injection
// ============================================================================

/// Artificial delay and random failures applied before every activity
#[derive(Debug, Clone, Default)]
pub struct FaultInjection {
    /// Delay before the activity body runs
    pub delay: Duration,
    /// Fail about half of all attempts with a retryable error
    pub random_errors: bool,
}

impl FaultInjection {
    /// Fault injection settings from the worker configuration
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            delay: config.artificial_activity_delay,
            random_errors: config.artificial_activity_random_errors,
        }
    }

    async fn apply(&self, ctx: &ActivityContext) -> Result<(), ActivityError> {
        if !self.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = ctx.cancelled() => return Err(ActivityError::cancelled()),
            }
        }

        if self.random_errors && rand::random::<bool>() {
            debug!(activity_id = %ctx.activity_id, attempt = ctx.attempt, "injecting random error");
            return Err(ActivityError::retryable("random error"));
        }
        Ok(())
    }
}

fn http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(Policy::none())
        .timeout(Duration::from_secs(10))
        .connect_timeout(Duration::from_secs(5))
        .build()
        .context("Failed to build HTTP client")
}

fn http_error(err: reqwest::Error) -> ActivityError {
    ActivityError::retryable(err.to_string())
}

// ============================================================================
// Activity Implementations
// ============================================================================

/// Discover a random image address
///
/// Requests the image source and returns the `Location` header of its
/// redirect response.
pub struct FindRandomImage {
    client: reqwest::Client,
    source_url: String,
    faults: FaultInjection,
}

impl FindRandomImage {
    pub fn new(source_url: impl Into<String>, faults: FaultInjection) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client()?,
            source_url: source_url.into(),
            faults,
        })
    }
}

#[async_trait]
impl Activity for FindRandomImage {
    const TYPE: &'static str = "findRandomImageActivity";
    type Input = ();
    type Output = String;

    async fn execute(&self, ctx: &ActivityContext, _input: ()) -> Result<String, ActivityError> {
        self.faults.apply(ctx).await?;

        let response = self
            .client
            .get(&self.source_url)
            .send()
            .await
            .map_err(http_error)?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        match location {
            Some(address) => {
                info!(worker_id = %ctx.worker_id, image_address = %address, "found random image");
                Ok(address)
            }
            None => Err(ActivityError::retryable(format!(
                "image source answered {} without a Location header",
                response.status()
            ))),
        }
    }
}

/// Download an image to the worker's local disk
///
/// Returns the path of the written file. The file only exists on the
/// worker that ran this activity, so follow-up steps must run in the same
/// session.
pub struct DownloadImage {
    client: reqwest::Client,
    download_dir: PathBuf,
    faults: FaultInjection,
}

impl DownloadImage {
    pub fn new(download_dir: impl Into<PathBuf>, faults: FaultInjection) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client()?,
            download_dir: download_dir.into(),
            faults,
        })
    }
}

#[async_trait]
impl Activity for DownloadImage {
    const TYPE: &'static str = "downloadImageActivity";
    type Input = String;
    type Output = String;

    async fn execute(
        &self,
        ctx: &ActivityContext,
        image_address: String,
    ) -> Result<String, ActivityError> {
        self.faults.apply(ctx).await?;

        let bytes = self
            .client
            .get(&image_address)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(http_error)?
            .bytes()
            .await
            .map_err(http_error)?;

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let path = self.download_dir.join(format!("image-{}", Uuid::now_v7()));
        tokio::fs::write(&path, &bytes).await?;

        info!(
            worker_id = %ctx.worker_id,
            image_address = %image_address,
            path = %path.display(),
            size = bytes.len(),
            "downloaded image"
        );
        Ok(path.to_string_lossy().into_owned())
    }
}

/// Compute the hex SHA-256 digest of a local file
pub struct CalcChecksum {
    faults: FaultInjection,
}

impl CalcChecksum {
    pub fn new(faults: FaultInjection) -> Self {
        Self { faults }
    }
}

#[async_trait]
impl Activity for CalcChecksum {
    const TYPE: &'static str = "calcChecksumActivity";
    type Input = String;
    type Output = String;

    async fn execute(&self, ctx: &ActivityContext, path: String) -> Result<String, ActivityError> {
        self.faults.apply(ctx).await?;

        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            // Retrying on this worker cannot make the file appear
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ActivityError::non_retryable(format!(
                    "file {} not found on worker {}",
                    path, ctx.worker_id
                )));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(checksum(&contents))
    }
}

/// Hex SHA-256 digest of `contents`
pub fn checksum(contents: &[u8]) -> String {
    hex::encode(Sha256::digest(contents))
}

/// Register the image activities on a worker's registry
pub fn register_activities(
    registry: &mut ActivityRegistry,
    config: &WorkerConfig,
) -> anyhow::Result<()> {
    let faults = FaultInjection::from_config(config);

    registry.register(FindRandomImage::new(
        config.image_source_url.clone(),
        faults.clone(),
    )?)?;
    registry.register(DownloadImage::new(
        config.download_dir.clone(),
        faults.clone(),
    )?)?;
    registry.register(CalcChecksum::new(faults))?;
    Ok(())
}
