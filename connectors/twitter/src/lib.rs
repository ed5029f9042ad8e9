//! Twitter API client with per-endpoint request queues and a streaming
//! session.
//!
//! - **REST**: every call is routed to a [`RequestBucket`] keyed by
//!   `(endpoint, method)`. A bucket has one request in flight at a time,
//!   honors the rate-limit headers, freezes itself on `429` until the reset,
//!   and settles each call exactly once, timeouts included.
//! - **Streaming**: a [`StreamSession`] keeps one long-lived signed POST
//!   open, reframes the body on `\r\n`, and publishes [`StreamEvent`]s.
//!   With auto-reconnect it reopens the same endpoint when the server
//!   disconnects.
//! - **Signing**: OAuth 1.0a HMAC-SHA1 in user or application context.
//!
//! ```rust,no_run
//! use tweets_twitter::{Credentials, Params, TwitterClient, TwitterConfig};
//!
//! # async fn run() -> tweets_twitter::TwitterResult<()> {
//! let config = TwitterConfig::new(Credentials::new("ck", "cs", "at", "ats"));
//! let client = TwitterClient::new(config)?;
//!
//! let tweets = client.tweets(&["20"], Params::new()).await?;
//! println!("{}", tweets[0].text);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod config;
mod error;
mod media;
mod oauth;
mod rest;
mod stream;
mod types;

pub use client::{FollowersOptions, MAX_FOLLOWER_PAGES, TwitterClient};
pub use config::{ApiOptions, ApiVersion, Credentials, DebugSink, TwitterConfig};
pub use error::{TwitterError, TwitterResult};
pub use media::{CHUNK_SIZE, Media, MediaSource, UploadMethod};
pub use oauth::Signer;
pub use rest::{
    BucketKey, Params, RateLimitState, RequestBucket, RequestMethod, RestDispatcher,
    percent_encode_reserved,
};
pub use stream::{
    API_DISCONNECTED, ConnectionState, EventKind, StreamEvent, StreamSession, classify,
};
pub use types::{DeletedTweet, FollowersPage, Tweet, UploadedMedia, User, parse_twitter_date};
pub use tweets_streaming::{ReconnectConfig, StreamError};
