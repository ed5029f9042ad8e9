//! Media sources for uploads.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{TwitterError, TwitterResult};

/// Segment size for chunked uploads.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Where the media bytes come from.
#[derive(Debug, Clone)]
pub enum MediaSource {
    Bytes(Bytes),
    /// Base64 text, as produced by a browser or another API.
    Base64(String),
    /// An `http(s)` URL, fetched on first use.
    Url(String),
}

/// How the media is sent to the upload endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadMethod {
    /// One request carrying the whole file.
    #[default]
    Simple,
    /// `INIT`, then one `APPEND` per segment, then `FINALIZE`.
    Chunked,
}

/// A media file to upload and, optionally, tweet.
pub struct Media {
    source: MediaSource,
    text: Option<String>,
    media_type: Option<String>,
    method: UploadMethod,
    data: OnceCell<Bytes>,
}

impl Media {
    fn from_source(source: MediaSource) -> Self {
        Self {
            source,
            text: None,
            media_type: None,
            method: UploadMethod::default(),
            data: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::from_source(MediaSource::Bytes(bytes.into()))
    }

    #[must_use]
    pub fn from_base64(encoded: impl Into<String>) -> Self {
        Self::from_source(MediaSource::Base64(encoded.into()))
    }

    /// Media fetched from `url` when first needed. Only `http` and `https`
    /// are accepted.
    pub fn from_url(url: impl Into<String>) -> TwitterResult<Self> {
        let url = url.into();
        let parsed = url::Url::parse(&url)
            .map_err(|e| TwitterError::Config(format!("invalid media url '{url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TwitterError::Config(format!(
                "unsupported media url scheme '{}'",
                parsed.scheme()
            )));
        }
        Ok(Self::from_source(MediaSource::Url(url)))
    }

    /// Tweet text posted with the media by `tweet_media`.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// MIME type, e.g. `image/png`. Required for chunked uploads.
    #[must_use]
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    #[must_use]
    pub const fn with_upload_method(mut self, method: UploadMethod) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub const fn source(&self) -> &MediaSource {
        &self.source
    }

    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    #[must_use]
    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    #[must_use]
    pub const fn upload_method(&self) -> UploadMethod {
        self.method
    }

    /// Raw bytes of the media, decoded or downloaded once and cached.
    pub async fn data(&self, http: &reqwest::Client) -> TwitterResult<&Bytes> {
        self.data.get_or_try_init(|| self.load(http)).await
    }

    async fn load(&self, http: &reqwest::Client) -> TwitterResult<Bytes> {
        match &self.source {
            MediaSource::Bytes(bytes) => Ok(bytes.clone()),
            MediaSource::Base64(encoded) => BASE64
                .decode(encoded.trim())
                .map(Bytes::from)
                .map_err(|e| TwitterError::Config(format!("invalid base64 media: {e}"))),
            MediaSource::Url(url) => {
                debug!(url = %url, "Downloading media");
                let response = http.get(url).send().await?.error_for_status()?;
                Ok(response.bytes().await?)
            }
        }
    }

    /// Base64 text of the media.
    pub async fn base64(&self, http: &reqwest::Client) -> TwitterResult<String> {
        if let MediaSource::Base64(encoded) = &self.source {
            return Ok(encoded.trim().to_string());
        }
        Ok(BASE64.encode(self.data(http).await?))
    }
}

impl fmt::Debug for Media {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            MediaSource::Bytes(b) => format!("{} bytes", b.len()),
            MediaSource::Base64(s) => format!("{} base64 chars", s.len()),
            MediaSource::Url(u) => u.clone(),
        };
        f.debug_struct("Media")
            .field("source", &source)
            .field("text", &self.text)
            .field("media_type", &self.media_type)
            .field("method", &self.method)
            .field("cached", &self.data.initialized())
            .finish()
    }
}
