//! REST dispatch: one request bucket per (endpoint, method).

mod bucket;
mod request;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Client;
use tracing::{debug, instrument};

pub use bucket::{RateLimitState, RequestBucket};
pub(crate) use bucket::api_error;
pub(crate) use request::form_encode;
pub use request::{BucketKey, Params, RequestMethod, percent_encode_reserved};

use crate::config::{ApiVersion, DebugSink, TwitterConfig};
use crate::error::TwitterResult;
use crate::oauth::Signer;

/// Endpoints served by the upload host.
const UPLOAD_ENDPOINT_PREFIX: &str = "/media/upload";

/// Bucket behavior shared by every bucket of a dispatcher.
#[derive(Debug, Clone)]
pub(crate) struct BucketOptions {
    pub version: ApiVersion,
    pub rate_limits: bool,
    pub release_delay: Duration,
    pub default_rate_limit_wait: Duration,
}

/// State shared by every bucket worker.
#[derive(Debug)]
pub(crate) struct RestContext {
    pub http: Client,
    pub signer: Signer,
    pub options: BucketOptions,
    pub debug: Option<DebugSink>,
}

impl RestContext {
    pub fn log(&self, message: &str) {
        debug!("{message}");
        if let Some(sink) = &self.debug {
            sink.emit(message);
        }
    }
}

/// Routes calls to lazily created request buckets.
#[derive(Debug)]
pub struct RestDispatcher {
    ctx: Arc<RestContext>,
    api_base: String,
    upload_base: String,
    request_timeout: Duration,
    buckets: Mutex<HashMap<BucketKey, RequestBucket>>,
}

impl RestDispatcher {
    /// Create a dispatcher from configuration.
    pub fn new(config: &TwitterConfig) -> TwitterResult<Self> {
        config.validate()?;

        let http = Client::builder()
            .user_agent(config.api.user_agent.clone())
            .build()?;

        Ok(Self {
            ctx: Arc::new(RestContext {
                http,
                signer: Signer::new(config.credentials.clone())?,
                options: BucketOptions {
                    version: config.api.version,
                    rate_limits: config.api.rate_limits,
                    release_delay: config.release_delay,
                    default_rate_limit_wait: config.default_rate_limit_wait,
                },
                debug: config.debug.clone(),
            }),
            api_base: config.api_base(),
            upload_base: config.upload_base(),
            request_timeout: config.request_timeout,
            buckets: Mutex::new(HashMap::new()),
        })
    }

    /// Send a call through the bucket for `(endpoint, method)`.
    ///
    /// `endpoint` is a template such as `/statuses/retweet/:tweetID`;
    /// placeholders are filled from `params`. `timeout` defaults to the
    /// configured request timeout.
    #[instrument(skip(self, params), fields(method = %method))]
    pub async fn dispatch(
        &self,
        method: RequestMethod,
        endpoint: &str,
        params: Params,
        timeout: Option<Duration>,
    ) -> TwitterResult<serde_json::Value> {
        let bucket = self.bucket_for(method, endpoint);
        bucket
            .enqueue(params, timeout.unwrap_or(self.request_timeout))
            .await
    }

    /// Existing bucket for `(endpoint, method)`, if any call created it.
    #[must_use]
    pub fn bucket(&self, method: RequestMethod, endpoint: &str) -> Option<RequestBucket> {
        self.buckets
            .lock()
            .get(&BucketKey::new(endpoint, method))
            .cloned()
    }

    /// Number of buckets created so far.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }

    fn bucket_for(&self, method: RequestMethod, endpoint: &str) -> RequestBucket {
        let key = BucketKey::new(endpoint, method);
        let mut buckets = self.buckets.lock();
        if let Some(bucket) = buckets.get(&key) {
            return bucket.clone();
        }

        let base_url = self.base_url_for(endpoint).to_string();
        debug!(bucket = %key, base_url = %base_url, "Creating request bucket");
        let bucket = RequestBucket::spawn(key.clone(), base_url, Arc::clone(&self.ctx));
        buckets.insert(key, bucket.clone());
        bucket
    }

    fn base_url_for(&self, endpoint: &str) -> &str {
        if endpoint.starts_with(UPLOAD_ENDPOINT_PREFIX) {
            &self.upload_base
        } else {
            &self.api_base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;

    fn dispatcher() -> RestDispatcher {
        let config = TwitterConfig::new(Credentials::new("ck", "cs", "at", "ats"));
        RestDispatcher::new(&config).unwrap()
    }

    #[test]
    fn test_upload_endpoints_use_upload_host() {
        let rest = dispatcher();
        assert_eq!(
            rest.base_url_for("/media/upload"),
            "https://upload.twitter.com/1.1"
        );
        assert_eq!(
            rest.base_url_for("/statuses/update"),
            "https://api.twitter.com/1.1"
        );
    }

    #[tokio::test]
    async fn test_one_bucket_per_key() {
        let rest = dispatcher();

        let first = rest.bucket_for(RequestMethod::Get, "/statuses/lookup");
        let again = rest.bucket_for(RequestMethod::Get, "/statuses/lookup");
        let post = rest.bucket_for(RequestMethod::Post, "/statuses/lookup");

        assert_eq!(first.key(), again.key());
        assert_ne!(first.key(), post.key());
        assert_eq!(rest.bucket_count(), 2);
        assert!(rest.bucket(RequestMethod::Get, "/statuses/lookup").is_some());
        assert!(rest.bucket(RequestMethod::Get, "/users/search").is_none());
    }

    #[test]
    fn test_new_rejects_missing_credentials() {
        let config = TwitterConfig::default();
        assert!(RestDispatcher::new(&config).is_err());
    }
}
