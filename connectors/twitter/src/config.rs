//! Twitter client configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tweets_streaming::ReconnectConfig;

use crate::error::{TwitterError, TwitterResult};

/// Consumer and access-token credentials.
///
/// With only the consumer pair present, requests are signed in application
/// context and `oauth_token` is left out of the signature.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// OAuth 1.0a Consumer Key (API Key)
    pub consumer_key: String,

    /// OAuth 1.0a Consumer Secret (API Secret)
    pub consumer_secret: String,

    /// OAuth 1.0a Access Token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// OAuth 1.0a Access Token Secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_secret: Option<String>,
}

impl Credentials {
    /// Credentials for user-context requests.
    #[must_use]
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        access_token: impl Into<String>,
        access_token_secret: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            access_token: Some(access_token.into()),
            access_token_secret: Some(access_token_secret.into()),
        }
    }

    /// Credentials for application-context requests.
    #[must_use]
    pub fn app_only(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            access_token: None,
            access_token_secret: None,
        }
    }

    /// Both access-token halves are present and non-empty.
    #[must_use]
    pub fn has_user_context(&self) -> bool {
        non_empty(self.access_token.as_deref()) && non_empty(self.access_token_secret.as_deref())
    }

    /// Require the consumer pair.
    pub fn validate(&self) -> TwitterResult<()> {
        if self.consumer_key.is_empty() {
            return Err(TwitterError::Config("consumer_key is required".into()));
        }
        if self.consumer_secret.is_empty() {
            return Err(TwitterError::Config("consumer_secret is required".into()));
        }
        Ok(())
    }

    /// Require the consumer pair and the access-token pair.
    pub fn validate_user_context(&self) -> TwitterResult<()> {
        self.validate()?;
        if !non_empty(self.access_token.as_deref()) {
            return Err(TwitterError::Config("access_token is required".into()));
        }
        if !non_empty(self.access_token_secret.as_deref()) {
            return Err(TwitterError::Config(
                "access_token_secret is required".into(),
            ));
        }
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"[REDACTED]")
            .field("access_token", &self.access_token)
            .field(
                "access_token_secret",
                &self.access_token_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// API version the endpoints are addressed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ApiVersion {
    #[default]
    #[serde(rename = "1.1")]
    V1_1,
    #[serde(rename = "2")]
    V2,
}

impl ApiVersion {
    /// Path segment for this version.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::V1_1 => "1.1",
            Self::V2 => "2",
        }
    }

    /// Suffix appended to every endpoint.
    #[must_use]
    pub const fn endpoint_suffix(self) -> &'static str {
        match self {
            Self::V1_1 => ".json",
            Self::V2 => "",
        }
    }
}

/// API addressing and behavior options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiOptions {
    /// API version
    pub version: ApiVersion,

    /// Subdomain of the REST host
    pub subdomain: String,

    /// Honor rate-limit headers and freeze buckets on 429
    pub rate_limits: bool,

    /// User-Agent sent with every request
    pub user_agent: String,
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self {
            version: ApiVersion::default(),
            subdomain: "api".into(),
            rate_limits: true,
            user_agent: format!("tweets-twitter/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Callback receiving diagnostic strings.
#[derive(Clone)]
pub struct DebugSink(Arc<dyn Fn(&str) + Send + Sync>);

impl DebugSink {
    /// Wrap a callback.
    pub fn new(sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self(Arc::new(sink))
    }

    /// Deliver one message.
    pub fn emit(&self, message: &str) {
        (self.0)(message);
    }
}

impl fmt::Debug for DebugSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DebugSink(..)")
    }
}

/// Configuration for the Twitter client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterConfig {
    /// Signing credentials
    pub credentials: Credentials,

    /// Version, host, and rate-limit options
    #[serde(default)]
    pub api: ApiOptions,

    /// REST host override, without the version path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Upload host override, without the version path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,

    /// Stream host override, without the version path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,

    /// Per-call timeout, counted from enqueue
    #[serde(default = "default_request_timeout", with = "tweets_streaming::duration_ms")]
    pub request_timeout: Duration,

    /// Cool-down after each response before a bucket dispatches again
    #[serde(default = "default_release_delay", with = "tweets_streaming::duration_ms")]
    pub release_delay: Duration,

    /// Freeze length when a 429 carries no usable reset
    #[serde(default = "default_rate_limit_wait", with = "tweets_streaming::duration_ms")]
    pub default_rate_limit_wait: Duration,

    /// Stream reconnection policy
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Diagnostic callback
    #[serde(skip)]
    pub debug: Option<DebugSink>,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_release_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_rate_limit_wait() -> Duration {
    Duration::from_secs(60)
}


impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            api: ApiOptions::default(),
            api_url: None,
            upload_url: None,
            stream_url: None,
            request_timeout: default_request_timeout(),
            release_delay: default_release_delay(),
            default_rate_limit_wait: default_rate_limit_wait(),
            reconnect: ReconnectConfig::default(),
            debug: None,
        }
    }
}

impl TwitterConfig {
    /// Create a configuration with default options.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            ..Self::default()
        }
    }

    /// Attach a diagnostic callback.
    #[must_use]
    pub fn with_debug(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.debug = Some(DebugSink::new(sink));
        self
    }

    /// Check credentials, timeouts, and host overrides.
    pub fn validate(&self) -> TwitterResult<()> {
        self.credentials.validate()?;

        if self.request_timeout.is_zero() {
            return Err(TwitterError::Config(
                "request_timeout must be greater than zero".into(),
            ));
        }
        if self.api.subdomain.is_empty() {
            return Err(TwitterError::Config("api.subdomain must not be empty".into()));
        }

        for (name, value) in [
            ("api_url", &self.api_url),
            ("upload_url", &self.upload_url),
            ("stream_url", &self.stream_url),
        ] {
            if let Some(raw) = value {
                url::Url::parse(raw)
                    .map_err(|e| TwitterError::Config(format!("invalid {name} '{raw}': {e}")))?;
            }
        }

        Ok(())
    }

    /// REST host root, without the version path.
    #[must_use]
    pub fn api_root(&self) -> String {
        self.api_url.as_deref().map_or_else(
            || format!("https://{}.twitter.com", self.api.subdomain),
            |u| u.trim_end_matches('/').to_string(),
        )
    }

    /// Versioned REST base URL.
    #[must_use]
    pub fn api_base(&self) -> String {
        self.versioned(&self.api_root())
    }

    /// Versioned upload base URL.
    #[must_use]
    pub fn upload_base(&self) -> String {
        let root = self
            .upload_url
            .as_deref()
            .unwrap_or("https://upload.twitter.com");
        self.versioned(root)
    }

    /// Versioned stream base URL.
    #[must_use]
    pub fn stream_base(&self) -> String {
        let root = self
            .stream_url
            .as_deref()
            .unwrap_or("https://stream.twitter.com");
        self.versioned(root)
    }

    fn versioned(&self, root: &str) -> String {
        format!("{}/{}", root.trim_end_matches('/'), self.api.version.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials::new("ck", "cs", "at", "ats")
    }

    #[test]
    fn test_default_hosts() {
        let config = TwitterConfig::new(credentials());

        assert_eq!(config.api_base(), "https://api.twitter.com/1.1");
        assert_eq!(config.upload_base(), "https://upload.twitter.com/1.1");
        assert_eq!(config.stream_base(), "https://stream.twitter.com/1.1");
        assert_eq!(config.api.version.endpoint_suffix(), ".json");
    }

    #[test]
    fn test_subdomain_and_version() {
        let mut config = TwitterConfig::new(credentials());
        config.api.subdomain = "ads-api".into();
        config.api.version = ApiVersion::V2;

        assert_eq!(config.api_base(), "https://ads-api.twitter.com/2");
        assert_eq!(config.api.version.endpoint_suffix(), "");
    }

    #[test]
    fn test_overrides_trim_trailing_slash() {
        let config = TwitterConfig {
            api_url: Some("http://127.0.0.1:9000/".into()),
            ..TwitterConfig::new(credentials())
        };

        assert_eq!(config.api_root(), "http://127.0.0.1:9000");
        assert_eq!(config.api_base(), "http://127.0.0.1:9000/1.1");
    }

    #[test]
    fn test_validate_requires_consumer_pair() {
        let config = TwitterConfig::new(Credentials::app_only("", "secret"));
        assert!(matches!(config.validate(), Err(TwitterError::Config(_))));

        let config = TwitterConfig::new(Credentials::app_only("key", "secret"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_override() {
        let config = TwitterConfig {
            stream_url: Some("not a url".into()),
            ..TwitterConfig::new(credentials())
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stream_url"));
    }

    #[test]
    fn test_user_context_names_missing_field() {
        let creds = Credentials {
            access_token_secret: None,
            ..credentials()
        };
        let err = creds.validate_user_context().unwrap_err();
        assert!(err.to_string().contains("access_token_secret"));
        assert!(!creds.has_user_context());
        assert!(credentials().has_user_context());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: TwitterConfig = serde_json::from_value(serde_json::json!({
            "credentials": { "consumer_key": "ck", "consumer_secret": "cs" },
            "release_delay": 250
        }))
        .unwrap();

        assert_eq!(config.release_delay, Duration::from_millis(250));
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.default_rate_limit_wait, Duration::from_secs(60));
        assert!(config.api.rate_limits);
        assert_eq!(config.api.version, ApiVersion::V1_1);
        assert!(config.credentials.access_token.is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", credentials());
        assert!(!rendered.contains("\"cs\""));
        assert!(!rendered.contains("\"ats\""));
        assert!(rendered.contains("REDACTED"));
    }
}
