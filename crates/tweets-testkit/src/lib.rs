//! Tweets Test Kit - mock infrastructure for testing the tweets client
//!
//! - [`MockApiServer`] - HTTP mock server shaped after the REST, upload, and
//!   streaming hosts
//! - [`HeldStreamServer`] - streaming endpoint that keeps connections open
//! - [`fixtures`] - credentials and canned API payloads
//! - Tracing configuration for test output
//!
//! # Example
//!
//! ```rust,ignore
//! use tweets_testkit::{MockApiServer, fixtures};
//!
//! #[tokio::test]
//! async fn test_lookup() {
//!     tweets_testkit::init_test_tracing();
//!
//!     let mock = MockApiServer::start().await;
//!     mock.expect_get("/1.1/statuses/lookup.json", serde_json::json!([fixtures::json::tweet("1", "hi")]))
//!         .await;
//!
//!     // point the client's api_url at mock.base_url() ...
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod fixtures;
mod mock_server;
mod stream_server;
mod tracing_config;

pub use mock_server::*;
pub use stream_server::*;
pub use tracing_config::*;
