//! High-level Twitter client.
//!
//! Every REST call goes through the [`RestDispatcher`], so helpers share the
//! per-endpoint queues and rate-limit handling.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::{OnceCell, mpsc};
use tracing::{debug, instrument};

use crate::{
    config::TwitterConfig,
    error::{TwitterError, TwitterResult},
    media::{CHUNK_SIZE, Media, UploadMethod},
    rest::{Params, RequestMethod, RestDispatcher, api_error, percent_encode_reserved},
    stream::{StreamEvent, StreamSession},
    types::{FollowersPage, Tweet, UploadedMedia, User},
};

/// Most follower pages `many_followers` will walk.
pub const MAX_FOLLOWER_PAGES: usize = 10;

/// Page size above which `count` is left to the API default.
const MAX_FOLLOWERS_COUNT: u32 = 200;

/// Timeout for each chunked-upload segment.
const APPEND_TIMEOUT: Duration = Duration::from_secs(40);

const UPLOAD_ENDPOINT: &str = "/media/upload";

/// Options for follower listing.
#[derive(Debug, Clone, Default)]
pub struct FollowersOptions {
    /// Page size; sent only when between 1 and 199.
    pub count: Option<u32>,
    /// Cursor of the page to fetch.
    pub cursor: Option<i64>,
    /// Extra query parameters.
    pub extra: Params,
}

#[derive(Debug, Deserialize)]
struct BearerTokenResponse {
    token_type: String,
    access_token: String,
}

/// Twitter client.
#[derive(Debug)]
pub struct TwitterClient {
    config: TwitterConfig,
    rest: RestDispatcher,
    http: Client,
    bearer_token: OnceCell<String>,
}

impl TwitterClient {
    /// Create a new client from configuration.
    pub fn new(config: TwitterConfig) -> TwitterResult<Self> {
        let rest = RestDispatcher::new(&config)?;
        let http = Client::builder()
            .connect_timeout(config.request_timeout)
            .user_agent(config.api.user_agent.clone())
            .build()?;

        Ok(Self {
            config,
            rest,
            http,
            bearer_token: OnceCell::new(),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &TwitterConfig {
        &self.config
    }

    /// The dispatcher behind every REST helper.
    #[must_use]
    pub const fn rest(&self) -> &RestDispatcher {
        &self.rest
    }

    /// A new stream session sharing this client's credentials and HTTP pool.
    pub fn stream_session(
        &self,
    ) -> TwitterResult<(StreamSession, mpsc::UnboundedReceiver<StreamEvent>)> {
        StreamSession::with_http(&self.config, self.http.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────────

    /// GET `endpoint` and return the raw JSON.
    #[instrument(skip(self, params))]
    pub async fn get(&self, endpoint: &str, params: Params) -> TwitterResult<serde_json::Value> {
        self.rest
            .dispatch(RequestMethod::Get, endpoint, params, None)
            .await
    }

    /// POST `endpoint` and return the raw JSON.
    #[instrument(skip(self, params))]
    pub async fn post(&self, endpoint: &str, params: Params) -> TwitterResult<serde_json::Value> {
        self.rest
            .dispatch(RequestMethod::Post, endpoint, params, None)
            .await
    }

    /// GET `endpoint` and deserialize the response.
    pub async fn get_as<T: DeserializeOwned>(&self, endpoint: &str, params: Params) -> TwitterResult<T> {
        Ok(serde_json::from_value(self.get(endpoint, params).await?)?)
    }

    /// POST `endpoint` and deserialize the response.
    pub async fn post_as<T: DeserializeOwned>(&self, endpoint: &str, params: Params) -> TwitterResult<T> {
        Ok(serde_json::from_value(self.post(endpoint, params).await?)?)
    }

    /// Application-only bearer token, fetched once and cached.
    #[instrument(skip(self))]
    pub async fn bearer_token(&self) -> TwitterResult<&str> {
        self.bearer_token
            .get_or_try_init(|| self.fetch_bearer_token())
            .await
            .map(String::as_str)
    }

    async fn fetch_bearer_token(&self) -> TwitterResult<String> {
        let credentials = &self.config.credentials;
        credentials.validate()?;

        let url = format!("{}/oauth2/token", self.config.api_root());
        debug!(url = %url, "Requesting bearer token");

        let response = self
            .http
            .post(&url)
            .basic_auth(
                percent_encode_reserved(&credentials.consumer_key),
                Some(percent_encode_reserved(&credentials.consumer_secret)),
            )
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded;charset=UTF-8")
            .body("grant_type=client_credentials")
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let token: BearerTokenResponse = serde_json::from_slice(&body)?;
        if token.token_type != "bearer" {
            return Err(TwitterError::OAuth(format!(
                "unexpected token type '{}'",
                token.token_type
            )));
        }
        Ok(token.access_token)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Followers
    // ─────────────────────────────────────────────────────────────────────────

    /// One page of `user`'s followers. A numeric `user` is an id, anything
    /// else a screen name.
    #[instrument(skip(self, options))]
    pub async fn followers(&self, user: &str, options: &FollowersOptions) -> TwitterResult<FollowersPage> {
        let mut params = user_params(user)?;
        if let Some(count) = options.count.filter(|c| (1..MAX_FOLLOWERS_COUNT).contains(c)) {
            params.insert("count", count);
        }
        if let Some(cursor) = options.cursor {
            params.insert("cursor", cursor);
        }
        params.merge(&options.extra);

        self.get_as("/followers/list", params).await
    }

    /// Up to `pages` pages of followers, walked in order until the cursor
    /// runs out.
    pub async fn many_followers(
        &self,
        user: &str,
        pages: usize,
        options: &FollowersOptions,
    ) -> TwitterResult<Vec<User>> {
        if pages == 0 || pages > MAX_FOLLOWER_PAGES {
            return Err(TwitterError::Config(format!(
                "pages must be between 1 and {MAX_FOLLOWER_PAGES}, got {pages}"
            )));
        }

        let mut users = Vec::new();
        let mut options = options.clone();
        for _ in 0..pages {
            let page = self.followers(user, &options).await?;
            let next = page.has_next().then_some(page.next_cursor);
            users.extend(page.users);
            let Some(cursor) = next else {
                break;
            };
            options.cursor = Some(cursor);
        }
        Ok(users)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tweets
    // ─────────────────────────────────────────────────────────────────────────

    /// Look up tweets by id.
    #[instrument(skip(self, extra))]
    pub async fn tweets(&self, ids: &[&str], extra: Params) -> TwitterResult<Vec<Tweet>> {
        if ids.is_empty() || ids.iter().any(|id| id.is_empty()) {
            return Err(TwitterError::Config("tweet ids must not be empty".into()));
        }
        let mut params = Params::new().with("id", ids.join(","));
        params.merge(&extra);

        self.get_as("/statuses/lookup", params).await
    }

    /// Post a status update.
    #[instrument(skip(self, extra))]
    pub async fn tweet(&self, status: &str, extra: Params) -> TwitterResult<Tweet> {
        if status.is_empty() {
            return Err(TwitterError::Config("status must not be empty".into()));
        }
        let mut params = Params::new().with("status", status);
        params.merge(&extra);

        self.post_as("/statuses/update", params).await
    }

    /// Reply to `tweet_id`.
    pub async fn reply(&self, tweet_id: &str, text: &str, extra: Params) -> TwitterResult<Tweet> {
        if tweet_id.is_empty() {
            return Err(TwitterError::Config("tweet id must not be empty".into()));
        }
        let mut params = Params::new()
            .with("in_reply_to_status_id", tweet_id)
            .with("auto_populate_reply_metadata", true);
        params.merge(&extra);

        self.tweet(text, params).await
    }

    /// Retweet `tweet_id`. All retweets share one bucket.
    #[instrument(skip(self))]
    pub async fn retweet(&self, tweet_id: &str) -> TwitterResult<Tweet> {
        if tweet_id.is_empty() {
            return Err(TwitterError::Config("tweet id must not be empty".into()));
        }
        self.post_as(
            "/statuses/retweet/:tweetID",
            Params::new().with("tweetID", tweet_id),
        )
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    /// Follow `user`, optionally with device notifications.
    #[instrument(skip(self))]
    pub async fn follow(&self, user: &str, notifications: bool) -> TwitterResult<User> {
        let params = user_params(user)?.with("follow", notifications);
        self.post_as("/friendships/create", params).await
    }

    #[instrument(skip(self))]
    pub async fn unfollow(&self, user: &str) -> TwitterResult<User> {
        self.post_as("/friendships/destroy", user_params(user)?)
            .await
    }

    /// Search users by free text.
    #[instrument(skip(self, extra))]
    pub async fn search_users(&self, query: &str, extra: Params) -> TwitterResult<Vec<User>> {
        if query.trim().is_empty() {
            return Err(TwitterError::Config("query must not be empty".into()));
        }
        let mut params = Params::new().with("q", query);
        params.merge(&extra);

        self.get_as("/users/search", params).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Media
    // ─────────────────────────────────────────────────────────────────────────

    /// Upload `media` to the upload host.
    #[instrument(skip(self))]
    pub async fn upload_media(&self, media: &Media) -> TwitterResult<UploadedMedia> {
        match media.upload_method() {
            UploadMethod::Simple => {
                let params = Params::new().with("media_data", media.base64(&self.http).await?);
                self.post_as(UPLOAD_ENDPOINT, params).await
            }
            UploadMethod::Chunked => self.upload_chunked(media).await,
        }
    }

    async fn upload_chunked(&self, media: &Media) -> TwitterResult<UploadedMedia> {
        let media_type = media.media_type().ok_or_else(|| {
            TwitterError::Config("media_type is required for chunked uploads".into())
        })?;
        let data = media.data(&self.http).await?;

        let init: UploadedMedia = self
            .post_as(
                UPLOAD_ENDPOINT,
                Params::new()
                    .with("command", "INIT")
                    .with("total_bytes", data.len())
                    .with("media_type", media_type),
            )
            .await?;
        debug!(media_id = %init.media_id, total_bytes = data.len(), "Upload initialized");

        for (index, segment) in data.chunks(CHUNK_SIZE).enumerate() {
            let params = Params::new()
                .with("command", "APPEND")
                .with("media_id", &init.media_id)
                .with("segment_index", index)
                .with("media_data", base64_encode(segment));
            self.rest
                .dispatch(
                    RequestMethod::Post,
                    UPLOAD_ENDPOINT,
                    params,
                    Some(APPEND_TIMEOUT),
                )
                .await?;
        }

        self.post_as(
            UPLOAD_ENDPOINT,
            Params::new()
                .with("command", "FINALIZE")
                .with("media_id", &init.media_id),
        )
        .await
    }

    /// Upload `media` and tweet it with its text.
    pub async fn tweet_media(&self, media: &Media, extra: Params) -> TwitterResult<Tweet> {
        let uploaded = self.upload_media(media).await?;

        let mut params = Params::new()
            .with("status", media.text().unwrap_or_default())
            .with("media_ids", &uploaded.media_id);
        params.merge(&extra);

        self.post_as("/statuses/update", params).await
    }
}

/// `user_id` for numeric input, `screen_name` otherwise.
fn user_params(user: &str) -> TwitterResult<Params> {
    let user = user.trim().trim_start_matches('@');
    if user.is_empty() {
        return Err(TwitterError::Config("user must not be empty".into()));
    }
    let key = if user.bytes().all(|b| b.is_ascii_digit()) {
        "user_id"
    } else {
        "screen_name"
    };
    Ok(Params::new().with(key, user))
}

fn base64_encode(data: &[u8]) -> String {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    STANDARD.encode(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use tweets_testkit::{MockApiServer, fixtures};
    use wiremock::{
        Mock, ResponseTemplate,
        matchers::{body_string_contains, header, header_exists, method, path, query_param},
    };

    /// Create a test config pointing to the mock server.
    fn test_config(mock: &MockApiServer) -> TwitterConfig {
        TwitterConfig {
            api_url: Some(mock.base_url()),
            upload_url: Some(mock.base_url()),
            stream_url: Some(mock.base_url()),
            release_delay: Duration::from_millis(10),
            request_timeout: Duration::from_secs(5),
            ..TwitterConfig::new(Credentials::new(
                fixtures::CONSUMER_KEY,
                fixtures::CONSUMER_SECRET,
                fixtures::ACCESS_TOKEN,
                fixtures::ACCESS_TOKEN_SECRET,
            ))
        }
    }

    #[test]
    fn test_user_params() {
        assert_eq!(user_params("12345").unwrap().get("user_id"), Some("12345"));
        assert_eq!(
            user_params("@jack").unwrap().get("screen_name"),
            Some("jack")
        );
        assert!(matches!(user_params(" "), Err(TwitterError::Config(_))));
    }

    #[tokio::test]
    async fn test_lookup_tweets() {
        tweets_testkit::init_test_tracing();
        let mock = MockApiServer::start().await;

        Mock::given(method("GET"))
            .and(path("/1.1/statuses/lookup.json"))
            .and(query_param("id", "1,2"))
            .and(header_exists("Authorization"))
            .and(header("Accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                fixtures::json::tweet("1", "first"),
                fixtures::json::tweet("2", "second")
            ])))
            .mount(mock.inner())
            .await;

        let client = TwitterClient::new(test_config(&mock)).unwrap();
        let tweets = client.tweets(&["1", "2"], Params::new()).await.unwrap();

        assert_eq!(tweets.len(), 2);
        assert_eq!(tweets[0].text, "first");
        assert_eq!(tweets[1].user.as_ref().unwrap().screen_name, "example");
    }

    #[tokio::test]
    async fn test_tweet_posts_form_body() {
        let mock = MockApiServer::start().await;

        Mock::given(method("POST"))
            .and(path("/1.1/statuses/update.json"))
            .and(header("Content-Type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("status=hello+%28world%29%21"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(fixtures::json::tweet("10", "hello (world)!")),
            )
            .mount(mock.inner())
            .await;

        let client = TwitterClient::new(test_config(&mock)).unwrap();
        let tweet = client.tweet("hello (world)!", Params::new()).await.unwrap();

        assert_eq!(tweet.id.as_deref(), Some("10"));
    }

    #[tokio::test]
    async fn test_reply_sets_reply_fields() {
        let mock = MockApiServer::start().await;

        Mock::given(method("POST"))
            .and(path("/1.1/statuses/update.json"))
            .and(body_string_contains("in_reply_to_status_id=99"))
            .and(body_string_contains("auto_populate_reply_metadata=true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::json::tweet("11", "ok")))
            .mount(mock.inner())
            .await;

        let client = TwitterClient::new(test_config(&mock)).unwrap();
        client.reply("99", "ok", Params::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_retweet_substitutes_path() {
        let mock = MockApiServer::start().await;
        mock.expect_post(
            "/1.1/statuses/retweet/42.json",
            fixtures::json::tweet("43", "RT"),
        )
        .await;

        let client = TwitterClient::new(test_config(&mock)).unwrap();
        let tweet = client.retweet("42").await.unwrap();

        assert_eq!(tweet.id.as_deref(), Some("43"));
        let requests = mock.requests_to("/1.1/statuses/retweet/42.json").await;
        assert_eq!(requests.len(), 1);
        assert!(!String::from_utf8_lossy(&requests[0].body).contains("tweetID"));
        assert!(client
            .rest()
            .bucket(RequestMethod::Post, "/statuses/retweet/:tweetID")
            .is_some());
    }

    #[tokio::test]
    async fn test_followers_count_and_user_mapping() {
        let mock = MockApiServer::start().await;

        Mock::given(method("GET"))
            .and(path("/1.1/followers/list.json"))
            .and(query_param("screen_name", "jack"))
            .and(query_param("count", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                fixtures::json::followers_page(&[("1", "a"), ("2", "b")], 0),
            ))
            .mount(mock.inner())
            .await;

        let client = TwitterClient::new(test_config(&mock)).unwrap();
        let options = FollowersOptions {
            count: Some(50),
            ..FollowersOptions::default()
        };
        let page = client.followers("jack", &options).await.unwrap();

        assert_eq!(page.users.len(), 2);
        assert!(!page.has_next());
    }

    #[tokio::test]
    async fn test_followers_omits_out_of_range_count() {
        let mock = MockApiServer::start().await;
        mock.expect_get(
            "/1.1/followers/list.json",
            fixtures::json::followers_page(&[], 0),
        )
        .await;

        let client = TwitterClient::new(test_config(&mock)).unwrap();
        let options = FollowersOptions {
            count: Some(500),
            ..FollowersOptions::default()
        };
        client.followers("783214", &options).await.unwrap();

        let requests = mock.requests_to("/1.1/followers/list.json").await;
        let query = requests[0].url.query().unwrap_or_default().to_string();
        assert!(query.contains("user_id=783214"));
        assert!(!query.contains("count"));
    }

    #[tokio::test]
    async fn test_many_followers_walks_cursors() {
        let mock = MockApiServer::start().await;

        Mock::given(method("GET"))
            .and(path("/1.1/followers/list.json"))
            .and(query_param("cursor", "7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                fixtures::json::followers_page(&[("3", "c")], 0),
            ))
            .with_priority(1)
            .mount(mock.inner())
            .await;
        Mock::given(method("GET"))
            .and(path("/1.1/followers/list.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                fixtures::json::followers_page(&[("1", "a"), ("2", "b")], 7),
            ))
            .with_priority(2)
            .mount(mock.inner())
            .await;

        let client = TwitterClient::new(test_config(&mock)).unwrap();
        let users = client
            .many_followers("jack", 5, &FollowersOptions::default())
            .await
            .unwrap();

        let names: Vec<_> = users.iter().map(|u| u.screen_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        mock.assert_request_count("/1.1/followers/list.json", 2).await;
    }

    #[tokio::test]
    async fn test_many_followers_rejects_too_many_pages() {
        let mock = MockApiServer::start().await;
        let client = TwitterClient::new(test_config(&mock)).unwrap();

        let result = client
            .many_followers("jack", MAX_FOLLOWER_PAGES + 1, &FollowersOptions::default())
            .await;
        assert!(matches!(result, Err(TwitterError::Config(_))));
        mock.assert_no_requests().await;
    }

    #[tokio::test]
    async fn test_follow_and_search() {
        let mock = MockApiServer::start().await;
        mock.expect_post("/1.1/friendships/create.json", fixtures::json::user("5", "e"))
            .await;
        mock.expect_get(
            "/1.1/users/search.json",
            serde_json::json!([fixtures::json::user("6", "rustlang")]),
        )
        .await;

        let client = TwitterClient::new(test_config(&mock)).unwrap();
        let user = client.follow("e", true).await.unwrap();
        assert_eq!(user.id, "5");

        let found = client.search_users("rust", Params::new()).await.unwrap();
        assert_eq!(found[0].screen_name, "rustlang");

        let follow = &mock.requests_to("/1.1/friendships/create.json").await[0];
        let body = String::from_utf8_lossy(&follow.body);
        assert!(body.contains("screen_name=e"));
        assert!(body.contains("follow=true"));
    }

    #[tokio::test]
    async fn test_empty_arguments_fail_before_request() {
        let mock = MockApiServer::start().await;
        let client = TwitterClient::new(test_config(&mock)).unwrap();

        assert!(matches!(client.tweet("", Params::new()).await, Err(TwitterError::Config(_))));
        assert!(matches!(client.tweets(&[], Params::new()).await, Err(TwitterError::Config(_))));
        assert!(matches!(client.search_users(" ", Params::new()).await, Err(TwitterError::Config(_))));
        assert!(matches!(client.unfollow("").await, Err(TwitterError::Config(_))));
        mock.assert_no_requests().await;
    }

    #[tokio::test]
    async fn test_api_error_is_surfaced() {
        let mock = MockApiServer::start().await;
        mock.expect_error(
            "/1.1/statuses/update.json",
            403,
            fixtures::json::error(187, "Status is a duplicate."),
        )
        .await;

        let client = TwitterClient::new(test_config(&mock)).unwrap();
        let err = client.tweet("again", Params::new()).await.unwrap_err();

        match err {
            TwitterError::Api {
                status,
                message,
                error_code,
                ..
            } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Status is a duplicate.");
                assert_eq!(error_code, Some(187));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bearer_token_is_cached() {
        let mock = MockApiServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(header_exists("Authorization"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "bearer",
                "access_token": "AAAA%2FAAA"
            })))
            .expect(1)
            .mount(mock.inner())
            .await;

        let client = TwitterClient::new(test_config(&mock)).unwrap();
        assert_eq!(client.bearer_token().await.unwrap(), "AAAA%2FAAA");
        assert_eq!(client.bearer_token().await.unwrap(), "AAAA%2FAAA");
    }

    #[tokio::test]
    async fn test_bearer_token_rejects_other_types() {
        let mock = MockApiServer::start().await;
        mock.expect_post(
            "/oauth2/token",
            serde_json::json!({ "token_type": "mac", "access_token": "x" }),
        )
        .await;

        let client = TwitterClient::new(test_config(&mock)).unwrap();
        assert!(matches!(client.bearer_token().await, Err(TwitterError::OAuth(_))));
    }

    #[tokio::test]
    async fn test_simple_upload_then_tweet() {
        let mock = MockApiServer::start().await;

        Mock::given(method("POST"))
            .and(path("/1.1/media/upload.json"))
            .and(body_string_contains("media_data=aGVsbG8%3D"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(fixtures::json::media_uploaded("710511363345354753")),
            )
            .mount(mock.inner())
            .await;
        Mock::given(method("POST"))
            .and(path("/1.1/statuses/update.json"))
            .and(body_string_contains("media_ids=710511363345354753"))
            .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::json::tweet("12", "pic")))
            .mount(mock.inner())
            .await;

        let client = TwitterClient::new(test_config(&mock)).unwrap();
        let media = Media::from_bytes(&b"hello"[..]).with_text("pic");
        let tweet = client.tweet_media(&media, Params::new()).await.unwrap();

        assert_eq!(tweet.text, "pic");
    }

    #[tokio::test]
    async fn test_chunked_upload_runs_all_commands() {
        let mock = MockApiServer::start().await;

        for (command, priority) in [("INIT", 1), ("APPEND", 2), ("FINALIZE", 3)] {
            let body = if command == "APPEND" {
                serde_json::Value::Null
            } else {
                fixtures::json::media_uploaded("77")
            };
            Mock::given(method("POST"))
                .and(path("/1.1/media/upload.json"))
                .and(body_string_contains(format!("command={command}")))
                .respond_with(if body.is_null() {
                    ResponseTemplate::new(204)
                } else {
                    ResponseTemplate::new(200).set_body_json(body)
                })
                .with_priority(priority)
                .mount(mock.inner())
                .await;
        }

        let client = TwitterClient::new(test_config(&mock)).unwrap();
        let data = vec![7u8; CHUNK_SIZE + 10];
        let media = Media::from_bytes(data)
            .with_media_type("video/mp4")
            .with_upload_method(UploadMethod::Chunked);

        let uploaded = client.upload_media(&media).await.unwrap();
        assert_eq!(uploaded.media_id, "77");

        let requests = mock.requests_to("/1.1/media/upload.json").await;
        let commands: Vec<String> = requests
            .iter()
            .map(|r| {
                let body = String::from_utf8_lossy(&r.body);
                body.split('&')
                    .find_map(|kv| kv.strip_prefix("command="))
                    .unwrap_or_default()
                    .to_string()
            })
            .collect();
        assert_eq!(commands, vec!["INIT", "APPEND", "APPEND", "FINALIZE"]);
    }

    #[tokio::test]
    async fn test_chunked_upload_requires_media_type() {
        let mock = MockApiServer::start().await;
        let client = TwitterClient::new(test_config(&mock)).unwrap();
        let media = Media::from_bytes(&b"x"[..]).with_upload_method(UploadMethod::Chunked);

        assert!(matches!(
            client.upload_media(&media).await,
            Err(TwitterError::Config(_))
        ));
    }
}
