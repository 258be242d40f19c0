//! Image asset resolution and the ready barrier awaited before a page is captured.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::{DynamicImage, GenericImageView};
use log::{debug, warn};

/// Errors raised while fetching or decoding an image reference.
#[derive(Debug)]
pub enum AssetError {
    /// The `data:` URI is malformed or not base64 encoded.
    InvalidDataUri(String),
    /// The base64 payload could not be decoded.
    Base64(base64::DecodeError),
    /// Reading a file-backed reference failed.
    Io { path: PathBuf, source: io::Error },
    /// The bytes are not an image format the decoder understands.
    Decode(image::ImageError),
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDataUri(reason) => write!(f, "Invalid data URI: {}", reason),
            Self::Base64(err) => write!(f, "Invalid base64 image payload: {}", err),
            Self::Io { path, source } => {
                write!(f, "Failed to read image {}: {}", path.display(), source)
            }
            Self::Decode(err) => write!(f, "Failed to decode image: {}", err),
        }
    }
}

impl std::error::Error for AssetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Base64(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            Self::Decode(err) => Some(err),
            Self::InvalidDataUri(_) => None,
        }
    }
}

impl From<base64::DecodeError> for AssetError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64(err)
    }
}

impl From<image::ImageError> for AssetError {
    fn from(err: image::ImageError) -> Self {
        Self::Decode(err)
    }
}

/// Resolves an opaque image reference to encoded image bytes.
#[async_trait]
pub trait AssetSource: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, AssetError>;
}

/// Resolves `data:` URIs in memory and anything else as a file path.
#[derive(Clone, Debug, Default)]
pub struct LocalAssetSource {
    base_dir: Option<PathBuf>,
}

impl LocalAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves relative paths against `base_dir`.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    fn resolve_path(&self, reference: &str) -> PathBuf {
        let path = Path::new(reference);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl AssetSource for LocalAssetSource {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, AssetError> {
        if reference.starts_with("data:") {
            return decode_data_uri(reference);
        }
        let path = self.resolve_path(reference);
        tokio::fs::read(&path)
            .await
            .map_err(|source| AssetError::Io { path, source })
    }
}

/// Decodes the payload of a base64 `data:` URI.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, AssetError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| AssetError::InvalidDataUri("missing `data:` prefix".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| AssetError::InvalidDataUri("missing `,` separator".to_string()))?;
    if !header.ends_with(";base64") {
        return Err(AssetError::InvalidDataUri(
            "only base64 encoded payloads are supported".to_string(),
        ));
    }
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(BASE64.decode(compact.as_bytes())?)
}

/// Decodes image bytes with the `image` crate.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, AssetError> {
    Ok(image::load_from_memory(bytes)?)
}

/// Outcome of waiting for one image.
#[derive(Clone)]
pub enum AssetState {
    Loaded(DynamicImage),
    /// Fetching or decoding failed, or the bounded wait elapsed.
    Failed(String),
}

impl fmt::Debug for AssetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded(image) => {
                let (width, height) = (image.width(), image.height());
                f.debug_tuple("Loaded").field(&(width, height)).finish()
            }
            Self::Failed(reason) => f.debug_tuple("Failed").field(reason).finish(),
        }
    }
}

/// Every image a page referenced, each either loaded or definitively failed.
#[derive(Debug, Default)]
pub struct SettledAssets {
    states: HashMap<String, AssetState>,
}

impl SettledAssets {
    /// The decoded image, or `None` when it failed and a placeholder must be drawn.
    pub fn image(&self, reference: &str) -> Option<&DynamicImage> {
        match self.states.get(reference) {
            Some(AssetState::Loaded(image)) => Some(image),
            _ => None,
        }
    }

    pub fn state(&self, reference: &str) -> Option<&AssetState> {
        self.states.get(reference)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Number of references that ended in failure.
    pub fn failed(&self) -> usize {
        self.states
            .values()
            .filter(|state| matches!(state, AssetState::Failed(_)))
            .count()
    }
}

/// Waits until every image of a page has settled, bounding each wait.
///
/// A barrier never fails: an image that errors or does not arrive in time settles as
/// [`AssetState::Failed`] and the page is captured with a placeholder in its place.
pub struct ReadyBarrier<'a> {
    source: &'a dyn AssetSource,
    timeout: Duration,
}

impl<'a> ReadyBarrier<'a> {
    pub fn new(source: &'a dyn AssetSource, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    pub async fn settle(&self, references: &[&str]) -> SettledAssets {
        let mut settled = SettledAssets::default();

        for reference in references {
            if settled.states.contains_key(*reference) {
                continue;
            }
            let state = self.settle_one(reference).await;
            settled.states.insert((*reference).to_string(), state);
        }

        debug!(
            "Settled {} image(s), {} failed",
            settled.len(),
            settled.failed()
        );
        settled
    }

    async fn settle_one(&self, reference: &str) -> AssetState {
        let fetched = tokio::time::timeout(self.timeout, self.source.fetch(reference)).await;
        let result = match fetched {
            Ok(bytes) => bytes.and_then(|bytes| decode_image(&bytes)),
            Err(_) => {
                let reason = format!("timed out after {:?}", self.timeout);
                warn!("Image {} {}; using placeholder", abbreviate(reference), reason);
                return AssetState::Failed(reason);
            }
        };
        match result {
            Ok(image) => AssetState::Loaded(image),
            Err(err) => {
                warn!("Image {} failed: {}; using placeholder", abbreviate(reference), err);
                AssetState::Failed(err.to_string())
            }
        }
    }
}

/// Shortens long references such as data URIs for log output.
fn abbreviate(reference: &str) -> String {
    const LIMIT: usize = 48;
    if reference.chars().count() <= LIMIT {
        reference.to_string()
    } else {
        let head: String = reference.chars().take(LIMIT).collect();
        format!("{}...", head)
    }
}
