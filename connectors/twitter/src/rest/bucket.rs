//! Per-endpoint request bucket.
//!
//! A bucket is an actor task that owns one FIFO queue of pending calls. It
//! dispatches them one at a time, records the rate-limit headers of every
//! response, and pauses itself after each response: for the cool-down
//! (`release_delay`) normally, or until the reset deadline after a 429.
//!
//! Each call's deadline is fixed when it is enqueued. The caller stops
//! waiting at the deadline; the worker drops calls whose caller is gone and
//! cancels an in-flight request when its deadline passes, so every call
//! settles exactly once.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{debug, warn};

use super::RestContext;
use super::request::{BucketKey, Params, ResolvedRequest};
use crate::error::{TwitterError, TwitterResult};

/// Reset values at or above this are epoch seconds; below, relative seconds.
const EPOCH_RESET_THRESHOLD: u64 = 1_000_000_000;

/// Longest timeout honored for a call; larger values are capped to it.
const MAX_CALL_TIMEOUT: Duration = Duration::from_secs(30 * 365 * 86_400);

const LIMIT_HEADERS: [&str; 2] = ["x-rate-limit-limit", "x-ratelimit-limit"];
const REMAINING_HEADERS: [&str; 2] = ["x-rate-limit-remaining", "x-ratelimit-remaining"];
const RESET_HEADERS: [&str; 2] = ["x-rate-limit-reset", "x-ratelimit-reset"];

/// Rate-limit state of one bucket, as last reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitState {
    /// Set by a 429, cleared by the next success.
    pub limited: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Epoch seconds, or seconds from the response when small.
    pub reset: u64,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self {
            limited: false,
            limit: 1,
            remaining: 1,
            reset: 1,
        }
    }
}

/// Rate-limit values carried by one response; absent headers stay `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RateLimitHeaders {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub reset: Option<u64>,
}

impl RateLimitHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            limit: first_header(headers, &LIMIT_HEADERS),
            remaining: first_header(headers, &REMAINING_HEADERS),
            reset: first_header(headers, &RESET_HEADERS),
        }
    }
}

fn first_header(headers: &HeaderMap, names: &[&str]) -> Option<u64> {
    names.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    })
}

impl RateLimitState {
    fn apply(&mut self, headers: RateLimitHeaders) {
        if let Some(limit) = headers.limit {
            self.limit = limit;
        }
        if let Some(remaining) = headers.remaining {
            self.remaining = remaining;
        }
        if let Some(reset) = headers.reset {
            self.reset = reset;
        }
    }
}

/// Time until `reset`, interpreting it as epoch seconds when large enough.
pub(crate) fn reset_delay(reset: u64, now_epoch: u64) -> Option<Duration> {
    let secs = if reset >= EPOCH_RESET_THRESHOLD {
        reset.saturating_sub(now_epoch)
    } else {
        reset
    };
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

#[derive(Debug, Default)]
struct BucketState {
    rate_limit: RateLimitState,
    frozen_until: Option<Instant>,
}

struct PendingCall {
    params: Params,
    deadline: Instant,
    reply: oneshot::Sender<TwitterResult<serde_json::Value>>,
}

/// Handle to a bucket worker. Cheap to clone.
#[derive(Clone)]
pub struct RequestBucket {
    key: Arc<BucketKey>,
    queue: mpsc::UnboundedSender<PendingCall>,
    state: Arc<RwLock<BucketState>>,
}

impl std::fmt::Debug for RequestBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBucket")
            .field("key", &self.key.to_string())
            .field("state", &*self.state.read())
            .finish()
    }
}

impl RequestBucket {
    /// Start the worker for `key`, sending to `base_url`.
    pub(crate) fn spawn(key: BucketKey, base_url: String, ctx: Arc<RestContext>) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let key = Arc::new(key);
        let state = Arc::new(RwLock::new(BucketState::default()));

        let worker = BucketWorker {
            key: Arc::clone(&key),
            base_url,
            ctx,
            state: Arc::clone(&state),
        };
        tokio::spawn(worker.run(rx));

        Self { key, queue, state }
    }

    #[must_use]
    pub fn key(&self) -> &BucketKey {
        &self.key
    }

    /// Last reported rate-limit state.
    #[must_use]
    pub fn rate_limit(&self) -> RateLimitState {
        self.state.read().rate_limit
    }

    /// Whether the bucket is paused for a rate-limit reset.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.state.read().frozen_until.is_some()
    }

    /// Queue a call and wait for its outcome.
    ///
    /// `timeout` runs from now, so time spent queued counts against it.
    pub async fn enqueue(
        &self,
        params: Params,
        timeout: Duration,
    ) -> TwitterResult<serde_json::Value> {
        let deadline = Instant::now() + timeout.min(MAX_CALL_TIMEOUT);
        let (reply, outcome) = oneshot::channel();

        self.queue
            .send(PendingCall {
                params,
                deadline,
                reply,
            })
            .map_err(|_| TwitterError::BucketClosed)?;

        match timeout_at(deadline, outcome).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TwitterError::BucketClosed),
            Err(_) => Err(TwitterError::Timeout {
                bucket: self.key.to_string(),
                timeout,
            }),
        }
    }
}

/// What happened to a dispatched call.
enum Attempt {
    Responded(TwitterResult<RawResponse>),
    TimedOut,
    Abandoned,
}

struct RawResponse {
    status: StatusCode,
    rate_limit: RateLimitHeaders,
    body: Bytes,
}

struct BucketWorker {
    key: Arc<BucketKey>,
    base_url: String,
    ctx: Arc<RestContext>,
    state: Arc<RwLock<BucketState>>,
}

impl BucketWorker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<PendingCall>) {
        while let Some(call) = rx.recv().await {
            if call.reply.is_closed() || Instant::now() >= call.deadline {
                self.log(&format!("dropping expired call, {} queued", rx.len()));
                continue;
            }

            if let Some(resume_at) = self.process(call).await {
                sleep_until(resume_at).await;
                if self.state.write().frozen_until.take().is_some() {
                    self.log("unfrozen");
                }
            }
        }
        debug!(bucket = %self.key, "Bucket worker stopped");
    }

    /// Dispatch one call and settle it. Returns when the next call may go.
    async fn process(&self, mut call: PendingCall) -> Option<Instant> {
        let params = std::mem::take(&mut call.params);
        let request = match ResolvedRequest::resolve(
            self.key.method(),
            &self.base_url,
            self.key.endpoint(),
            params,
            self.ctx.options.version,
        ) {
            Ok(request) => request,
            Err(e) => {
                let _ = call.reply.send(Err(e));
                return None;
            }
        };

        let attempt = tokio::select! {
            biased;
            () = call.reply.closed() => Attempt::Abandoned,
            () = sleep_until(call.deadline) => Attempt::TimedOut,
            result = self.fetch(&request) => Attempt::Responded(result),
        };

        match attempt {
            Attempt::Responded(Ok(response)) => {
                let (result, resume_at) = self.settle(response);
                if call.reply.send(result).is_err() {
                    self.log("response arrived after the caller gave up; discarded");
                }
                Some(resume_at)
            }
            Attempt::Responded(Err(e)) => {
                let _ = call.reply.send(Err(e));
                None
            }
            Attempt::TimedOut => {
                self.log("call timed out in flight; request cancelled");
                None
            }
            Attempt::Abandoned => {
                self.log("caller gone; request cancelled");
                None
            }
        }
    }

    async fn fetch(&self, request: &ResolvedRequest) -> TwitterResult<RawResponse> {
        let authorization = self
            .ctx
            .signer
            .sign(request.method, &request.url, &request.params)?;
        let url = request.request_url();

        self.ctx.log(&format!(
            "[REST => API] {} {url} {}",
            request.method,
            redacted_headers(request.content_type())
        ));

        let mut builder = self
            .ctx
            .http
            .request(request.method.to_reqwest(), &url)
            .header(AUTHORIZATION, authorization)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, request.content_type());
        if let Some(body) = request.form_body() {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let rate_limit = RateLimitHeaders::from_headers(response.headers());
        let body = response.bytes().await?;

        Ok(RawResponse {
            status,
            rate_limit,
            body,
        })
    }

    /// Record rate-limit state, build the call's outcome, and pick when the
    /// queue may advance.
    fn settle(&self, response: RawResponse) -> (TwitterResult<serde_json::Value>, Instant) {
        let options = &self.ctx.options;
        let now = Instant::now();
        let mut resume_at = now + options.release_delay;

        let rate_limit = {
            let mut state = self.state.write();
            state.rate_limit.apply(response.rate_limit);
            state.rate_limit.limited = response.status == StatusCode::TOO_MANY_REQUESTS;
            state.rate_limit
        };

        debug!(
            bucket = %self.key,
            status = response.status.as_u16(),
            remaining = rate_limit.remaining,
            reset = rate_limit.reset,
            "Bucket response"
        );

        if response.status == StatusCode::TOO_MANY_REQUESTS && options.rate_limits {
            let retry_after = response
                .rate_limit
                .reset
                .and_then(|reset| reset_delay(reset, now_epoch()))
                .unwrap_or(options.default_rate_limit_wait)
                .max(options.release_delay);
            resume_at = now + retry_after;
            self.state.write().frozen_until = Some(resume_at);

            warn!(
                bucket = %self.key,
                delay_ms = retry_after.as_millis(),
                "Rate limited; bucket frozen"
            );
            self.log(&format!("rate limited, frozen for {retry_after:?}"));

            return (
                Err(TwitterError::RateLimited {
                    bucket: self.key.to_string(),
                    retry_after,
                    rate_limit,
                }),
                resume_at,
            );
        }

        if !response.status.is_success() {
            self.log(&format!("request failed with status {}", response.status));
            return (Err(api_error(response.status, &response.body)), resume_at);
        }

        if options.rate_limits && response.rate_limit.remaining == Some(0) {
            if let Some(delay) = response
                .rate_limit
                .reset
                .and_then(|reset| reset_delay(reset, now_epoch()))
            {
                let delay = delay.max(options.release_delay);
                resume_at = now + delay;
                self.state.write().frozen_until = Some(resume_at);
                self.log(&format!("window exhausted, frozen for {delay:?}"));
            }
        }

        (parse_body(&response.body), resume_at)
    }

    fn log(&self, message: &str) {
        debug!(bucket = %self.key, "{message}");
        if let Some(sink) = &self.ctx.debug {
            sink.emit(&format!("[Bucket {} => REST] {message}", self.key));
        }
    }
}

fn redacted_headers(content_type: &str) -> String {
    format!(
        "{{authorization: [REDACTED], accept: application/json, content-type: {content_type}}}"
    )
}

fn parse_body(body: &[u8]) -> TwitterResult<serde_json::Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::Value::Null);
    }
    Ok(serde_json::from_slice(body)?)
}

/// Build an API error from a v1.1 (`errors[0]`) or v2 (`detail`/`title`) body.
pub(crate) fn api_error(status: StatusCode, body: &[u8]) -> TwitterError {
    let parsed: serde_json::Value = serde_json::from_slice(body)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(body).into_owned()));

    let first_error = parsed.get("errors").and_then(|e| e.get(0));
    let message = first_error
        .and_then(|e| e.get("message"))
        .or_else(|| parsed.get("detail"))
        .or_else(|| parsed.get("title"))
        .or_else(|| parsed.get("error"))
        .and_then(serde_json::Value::as_str)
        .map_or_else(
            || {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string()
            },
            str::to_string,
        );
    let error_code = first_error
        .and_then(|e| e.get("code"))
        .and_then(serde_json::Value::as_i64);

    TwitterError::Api {
        status: status.as_u16(),
        message,
        error_code,
        body: parsed,
    }
}
