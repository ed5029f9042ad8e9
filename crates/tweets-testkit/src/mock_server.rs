//! Mock HTTP server for testing the client.
//!
//! Wraps wiremock with the response shapes the REST, upload, and streaming
//! hosts produce.

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Header carrying the rate-limit ceiling.
pub const RATE_LIMIT_LIMIT: &str = "x-rate-limit-limit";
/// Header carrying the remaining requests in the window.
pub const RATE_LIMIT_REMAINING: &str = "x-rate-limit-remaining";
/// Header carrying the window reset.
pub const RATE_LIMIT_RESET: &str = "x-rate-limit-reset";

/// A mock API server.
pub struct MockApiServer {
    server: MockServer,
}

impl MockApiServer {
    /// Start a new mock server.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL of the mock server, usable as any of the client's hosts.
    #[must_use]
    pub fn base_url(&self) -> String {
        self.server.uri()
    }

    /// Underlying wiremock server for custom mocks.
    #[must_use]
    pub const fn inner(&self) -> &MockServer {
        &self.server
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Response Setup
    // ─────────────────────────────────────────────────────────────────────────

    /// Respond to GET requests on `request_path` with JSON.
    pub async fn expect_get(&self, request_path: &str, response: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(request_path))
            .respond_with(json_response(200, response))
            .mount(&self.server)
            .await;
    }

    /// Respond to POST requests on `request_path` with JSON.
    pub async fn expect_post(&self, request_path: &str, response: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path(request_path))
            .respond_with(json_response(200, response))
            .mount(&self.server)
            .await;
    }

    /// Respond to any request on `request_path` with JSON after `delay`.
    pub async fn expect_delayed(
        &self,
        request_path: &str,
        delay: Duration,
        response: serde_json::Value,
    ) {
        Mock::given(path(request_path))
            .respond_with(json_response(200, response).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    /// Respond to any request on `request_path` with an error status.
    pub async fn expect_error(&self, request_path: &str, status: u16, error_body: serde_json::Value) {
        Mock::given(path(request_path))
            .respond_with(json_response(status, error_body))
            .mount(&self.server)
            .await;
    }

    /// Answer the first request on `request_path` with a 429 carrying `reset`,
    /// and later requests with `response`.
    pub async fn expect_rate_limited_once(
        &self,
        request_path: &str,
        reset: u64,
        response: serde_json::Value,
    ) {
        Mock::given(path(request_path))
            .respond_with(
                json_response(429, crate::fixtures::json::error(88, "Rate limit exceeded"))
                    .insert_header(RATE_LIMIT_LIMIT, "15")
                    .insert_header(RATE_LIMIT_REMAINING, "0")
                    .insert_header(RATE_LIMIT_RESET, reset.to_string().as_str()),
            )
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&self.server)
            .await;

        Mock::given(path(request_path))
            .respond_with(json_response(200, response))
            .with_priority(2)
            .mount(&self.server)
            .await;
    }

    /// Serve a stream body on POST `request_path`; the connection closes
    /// once `body` has been written.
    pub async fn expect_stream(&self, request_path: &str, body: &str) {
        Mock::given(method("POST"))
            .and(path(request_path))
            .respond_with(stream_response(body))
            .mount(&self.server)
            .await;
    }

    /// Serve `body` for the first `times` connections to `request_path`, then
    /// hold every later connection open for `hold` before answering.
    pub async fn expect_stream_then_hang(
        &self,
        request_path: &str,
        body: &str,
        times: u64,
        hold: Duration,
    ) {
        Mock::given(method("POST"))
            .and(path(request_path))
            .respond_with(stream_response(body))
            .up_to_n_times(times)
            .with_priority(1)
            .mount(&self.server)
            .await;

        Mock::given(method("POST"))
            .and(path(request_path))
            .respond_with(stream_response("").set_delay(hold))
            .with_priority(2)
            .mount(&self.server)
            .await;
    }

    /// Set up the application-only token endpoint.
    pub async fn expect_bearer_token(&self, token_path: &str, access_token: &str) {
        self.expect_post(
            token_path,
            serde_json::json!({
                "token_type": "bearer",
                "access_token": access_token
            }),
        )
        .await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Verification
    // ─────────────────────────────────────────────────────────────────────────

    async fn received_requests(&self) -> Vec<wiremock::Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Received requests whose path equals `request_path`, in arrival order.
    pub async fn requests_to(&self, request_path: &str) -> Vec<wiremock::Request> {
        self.received_requests()
            .await
            .into_iter()
            .filter(|r| r.url.path() == request_path)
            .collect()
    }

    /// Verify the number of requests received on `request_path`.
    ///
    /// # Panics
    ///
    /// Panics if the count doesn't match.
    pub async fn assert_request_count(&self, request_path: &str, expected: usize) {
        let received = self.requests_to(request_path).await;
        assert_eq!(
            received.len(),
            expected,
            "Expected {expected} requests to '{request_path}' but received {}",
            received.len()
        );
    }

    /// Verify that no requests were received.
    ///
    /// # Panics
    ///
    /// Panics if any requests were received.
    pub async fn assert_no_requests(&self) {
        let received = self.received_requests().await;
        assert!(
            received.is_empty(),
            "Expected no requests but received {}",
            received.len()
        );
    }
}

fn json_response(status: u16, body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .set_body_json(body)
        .insert_header("content-type", "application/json")
}

fn stream_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_raw(body.as_bytes().to_vec(), "application/json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_get() {
        let mock = MockApiServer::start().await;
        mock.expect_get("/1.1/test.json", serde_json::json!({"status": "ok"}))
            .await;

        let response = reqwest::Client::new()
            .get(format!("{}/1.1/test.json", mock.base_url()))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["status"], "ok");
        mock.assert_request_count("/1.1/test.json", 1).await;
    }

    #[tokio::test]
    async fn test_rate_limited_once_then_ok() {
        let mock = MockApiServer::start().await;
        mock.expect_rate_limited_once("/limited", 1, serde_json::json!({"ok": true}))
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/limited", mock.base_url());

        let first = client.get(&url).send().await.unwrap();
        assert_eq!(first.status(), 429);
        assert_eq!(first.headers()[RATE_LIMIT_RESET], "1");

        let second = client.get(&url).send().await.unwrap();
        assert_eq!(second.status(), 200);
    }

    #[tokio::test]
    async fn test_stream_body_is_raw() {
        let mock = MockApiServer::start().await;
        mock.expect_stream("/1.1/statuses/filter.json", "{\"text\":\"hi\"}\r\n")
            .await;

        let body = reqwest::Client::new()
            .post(format!("{}/1.1/statuses/filter.json", mock.base_url()))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert_eq!(body, "{\"text\":\"hi\"}\r\n");
    }
}
