//! Streaming API session.
//!
//! A [`StreamSession`] holds at most one live connection. The response body
//! is reframed on `\r\n`, each frame is published as [`StreamEvent::Raw`]
//! and then classified. When the server closes the connection the session
//! either reopens it with the same endpoint and body (auto-reconnect) or
//! ends and forgets the endpoint.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use parking_lot::Mutex;
use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use tweets_streaming::{
    DEFAULT_MAX_FRAME_SIZE, Frame, FrameDecoder, ReconnectConfig, ReconnectHandler,
};

use crate::config::{ApiVersion, DebugSink, TwitterConfig};
use crate::error::{TwitterError, TwitterResult};
use crate::oauth::Signer;
use crate::rest::{Params, RequestMethod, form_encode};
use crate::types::{DeletedTweet, Tweet};

/// End reason used when the server closes the connection.
pub const API_DISCONNECTED: &str = "Api Disconnected";

/// Named events delivered on the user and site streams.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Favorite,
    Unfavorite,
    Follow,
    Unfollow,
    Block,
    Unblock,
    ListCreated,
    ListDestroyed,
    ListUpdated,
    ListMemberAdded,
    ListMemberRemoved,
    ListUserSubscribed,
    ListUserUnsubscribed,
    QuotedTweet,
    UserUpdate,
    /// Any event name not listed above.
    Other(String),
}

impl EventKind {
    /// Map a wire `event` value.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "favorite" => Self::Favorite,
            "unfavorite" => Self::Unfavorite,
            "follow" => Self::Follow,
            "unfollow" => Self::Unfollow,
            "block" => Self::Block,
            "unblock" => Self::Unblock,
            "list_created" => Self::ListCreated,
            "list_destroyed" => Self::ListDestroyed,
            "list_updated" => Self::ListUpdated,
            "list_member_added" => Self::ListMemberAdded,
            "list_member_removed" => Self::ListMemberRemoved,
            "list_user_subscribed" => Self::ListUserSubscribed,
            "list_user_unsubscribed" => Self::ListUserUnsubscribed,
            "quoted_tweet" => Self::QuotedTweet,
            "user_update" => Self::UserUpdate,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire name of the event.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Favorite => "favorite",
            Self::Unfavorite => "unfavorite",
            Self::Follow => "follow",
            Self::Unfollow => "unfollow",
            Self::Block => "block",
            Self::Unblock => "unblock",
            Self::ListCreated => "list_created",
            Self::ListDestroyed => "list_destroyed",
            Self::ListUpdated => "list_updated",
            Self::ListMemberAdded => "list_member_added",
            Self::ListMemberRemoved => "list_member_removed",
            Self::ListUserSubscribed => "list_user_subscribed",
            Self::ListUserUnsubscribed => "list_user_unsubscribed",
            Self::QuotedTweet => "quoted_tweet",
            Self::UserUpdate => "user_update",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event published by a stream session.
#[derive(Debug)]
pub enum StreamEvent {
    /// The connection is open.
    Connected,

    /// Keep-alive: an empty frame or an explicit `ping` event.
    Ping,

    /// A tweet.
    Tweet(Box<Tweet>),

    /// A deletion notice.
    TweetDelete(DeletedTweet),

    /// A stall or limit warning.
    Warning { packet: Value, warning: Value },

    /// Any other packet carrying an `event` field.
    Named { kind: EventKind, packet: Value },

    /// Every frame, before classification.
    Raw { frame: Bytes, packet: Option<Value> },

    /// A frame or transport error; the session stays usable.
    Error(TwitterError),

    /// The connection was torn down.
    End { reason: String },
}

/// Classify a parsed packet; `None` means the packet is not interesting.
#[must_use]
pub fn classify(packet: Value) -> Option<StreamEvent> {
    if let Some(event) = packet.get("event").and_then(Value::as_str) {
        if event == "ping" {
            return Some(StreamEvent::Ping);
        }
        return Some(StreamEvent::Named {
            kind: EventKind::from_name(event),
            packet,
        });
    }

    let has_text = packet.get("text").is_some_and(is_truthy)
        || packet
            .get("data")
            .and_then(|d| d.get("text"))
            .is_some_and(is_truthy);
    if has_text {
        return Some(match Tweet::from_packet(&packet) {
            Ok(tweet) => StreamEvent::Tweet(Box::new(tweet)),
            Err(e) => StreamEvent::Error(e.into()),
        });
    }

    if packet.get("delete").is_some() {
        return Some(match DeletedTweet::from_packet(&packet) {
            Ok(deleted) => StreamEvent::TweetDelete(deleted),
            Err(e) => StreamEvent::Error(e.into()),
        });
    }

    if let Some(warning) = packet.get("warning").cloned() {
        return Some(StreamEvent::Warning { packet, warning });
    }

    None
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Packet published for an empty frame.
fn heartbeat_packet() -> Value {
    json!({ "event": "ping", "data": {} })
}

/// Connection phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Ended,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    phase: ConnectionState,
    endpoint: Option<String>,
    body: Params,
    auto_reconnect: bool,
    ended: bool,
    reader: Option<JoinHandle<()>>,
    /// Bumped by every connect and every end; tasks holding an older value
    /// are stale.
    generation: u64,
}

struct SessionInner {
    http: Client,
    signer: Signer,
    base_url: String,
    version: ApiVersion,
    reconnect: ReconnectConfig,
    max_frame_size: usize,
    debug: Option<DebugSink>,
    events: mpsc::UnboundedSender<StreamEvent>,
    state: Mutex<SessionState>,
}

/// A streaming API session.
#[derive(Clone)]
pub struct StreamSession {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("StreamSession")
            .field("base_url", &self.inner.base_url)
            .field("phase", &state.phase)
            .field("endpoint", &state.endpoint)
            .field("auto_reconnect", &state.auto_reconnect)
            .finish()
    }
}

impl StreamSession {
    /// Create an idle session and the receiver its events are published on.
    pub fn new(config: &TwitterConfig) -> TwitterResult<(Self, mpsc::UnboundedReceiver<StreamEvent>)> {
        config.validate()?;

        // No overall timeout: the response body is open-ended.
        let http = Client::builder()
            .connect_timeout(config.request_timeout)
            .user_agent(config.api.user_agent.clone())
            .build()?;

        Self::with_http(config, http)
    }

    pub(crate) fn with_http(
        config: &TwitterConfig,
        http: Client,
    ) -> TwitterResult<(Self, mpsc::UnboundedReceiver<StreamEvent>)> {
        let (events, rx) = mpsc::unbounded_channel();
        let inner = SessionInner {
            http,
            signer: Signer::new(config.credentials.clone())?,
            base_url: config.stream_base(),
            version: config.api.version,
            reconnect: config.reconnect.clone(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            debug: config.debug.clone(),
            events,
            state: Mutex::new(SessionState::default()),
        };
        Ok((
            Self {
                inner: Arc::new(inner),
            },
            rx,
        ))
    }

    /// Connect to `endpoint` (e.g. `/statuses/filter`) with a form body.
    ///
    /// Fails without side effects if the session already has an endpoint.
    /// A failed handshake is returned here and not retried.
    #[instrument(skip(self, body))]
    pub async fn stream(
        &self,
        endpoint: &str,
        body: Params,
        auto_reconnect: bool,
    ) -> TwitterResult<()> {
        let generation = {
            let mut state = self.inner.state.lock();
            if let Some(current) = &state.endpoint {
                return Err(TwitterError::InvalidState(format!(
                    "already streaming {current}"
                )));
            }
            if state.phase == ConnectionState::Connecting {
                return Err(TwitterError::InvalidState("connection in progress".into()));
            }
            state.phase = ConnectionState::Connecting;
            state.endpoint = Some(endpoint.to_string());
            state.body = body.clone();
            state.auto_reconnect = auto_reconnect;
            state.generation += 1;
            state.generation
        };

        let result = self.inner.open(endpoint, &body).await;

        let mut state = self.inner.state.lock();
        if state.generation != generation {
            // Ended while the handshake was in flight.
            return Err(TwitterError::InvalidState(
                "stream ended while connecting".into(),
            ));
        }
        match result {
            Ok(response) => {
                self.inner.attach(&mut state, response);
                Ok(())
            }
            Err(e) => {
                state.phase = ConnectionState::Idle;
                state.endpoint = None;
                state.body = Params::new();
                Err(e)
            }
        }
    }

    /// Tear down the connection and publish [`StreamEvent::End`].
    ///
    /// With `clear_endpoint`, the session can stream again afterwards.
    /// On a session that already ended but kept its endpoint, such as one
    /// waiting to reconnect after a server disconnect, `clear_endpoint`
    /// releases the endpoint and stops any pending reconnection.
    /// Otherwise ending twice fails.
    pub fn end(&self, reason: &str, clear_endpoint: bool) -> TwitterResult<()> {
        self.inner.end(reason, clear_endpoint).map(|_| ())
    }

    /// Turn reconnection on or off for the current and later connections.
    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.inner.state.lock().auto_reconnect = enabled;
    }

    #[must_use]
    pub fn auto_reconnect(&self) -> bool {
        self.inner.state.lock().auto_reconnect
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().phase
    }

    /// Endpoint of the current or pending connection.
    #[must_use]
    pub fn endpoint(&self) -> Option<String> {
        self.inner.state.lock().endpoint.clone()
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.inner.state.lock().ended
    }
}

impl SessionInner {
    fn url_for(&self, endpoint: &str) -> String {
        format!(
            "{}/{}{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/'),
            self.version.endpoint_suffix()
        )
    }

    fn emit(&self, event: StreamEvent) {
        // A dropped receiver only means nobody is listening.
        let _ = self.events.send(event);
    }

    fn log(&self, endpoint: Option<&str>, message: &str) {
        debug!(endpoint = endpoint.unwrap_or("-"), "{message}");
        if let Some(sink) = &self.debug {
            sink.emit(&format!(
                "[Stream (end: {}) => Stream Client] {message}",
                endpoint.unwrap_or("none")
            ));
        }
    }

    /// Send the signed POST and wait for a successful status.
    async fn open(&self, endpoint: &str, body: &Params) -> TwitterResult<reqwest::Response> {
        let url = self.url_for(endpoint);
        let authorization = self.signer.sign(RequestMethod::Post, &url, body)?;
        self.log(Some(endpoint), &format!("connecting to {url}"));

        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, authorization)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form_encode(body))
            .send()
            .await
            .map_err(|e| TwitterError::Connection(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(TwitterError::Connection(format!(
                "{url} answered {status}: {detail}"
            )));
        }

        Ok(response)
    }

    /// Mark the session connected and start reading `response`.
    fn attach(self: &Arc<Self>, state: &mut SessionState, response: reqwest::Response) {
        state.generation += 1;
        state.phase = ConnectionState::Connected;
        state.ended = false;
        let generation = state.generation;

        info!(endpoint = ?state.endpoint, "Stream connected");
        self.emit(StreamEvent::Connected);

        let inner = Arc::clone(self);
        state.reader = Some(tokio::spawn(async move {
            inner.read(response, generation).await;
        }));
    }

    async fn read(self: Arc<Self>, response: reqwest::Response, generation: u64) {
        let mut decoder = FrameDecoder::with_max_frame_size(self.max_frame_size);
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(chunk) => {
                    let decoded = decoder.decode(&chunk);
                    decoded
                        .frames
                        .into_iter()
                        .for_each(|frame| self.handle_frame(frame));
                    if let Some(e) = decoded.overflow {
                        warn!(error = %e, "Dropping oversized frame");
                        self.emit(StreamEvent::Error(e.into()));
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Stream transport error");
                    self.emit(StreamEvent::Error(e.into()));
                    break;
                }
            }
        }

        self.on_end(generation).await;
    }

    fn handle_frame(&self, frame: Frame) {
        let packet = if frame.is_heartbeat() {
            Some(heartbeat_packet())
        } else {
            match frame.json::<Value>() {
                Ok(packet) => Some(packet),
                Err(e) => {
                    self.emit(StreamEvent::Error(e.into()));
                    None
                }
            }
        };

        self.emit(StreamEvent::Raw {
            frame: frame.into_payload(),
            packet: packet.clone(),
        });

        if let Some(event) = packet.and_then(classify) {
            self.emit(event);
        }
    }

    /// Connection closed by the server.
    async fn on_end(self: &Arc<Self>, generation: u64) {
        let target = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            // This task is the reader; let it finish on its own.
            drop(state.reader.take());

            if state.auto_reconnect {
                state
                    .endpoint
                    .clone()
                    .map(|endpoint| (endpoint, state.body.clone()))
            } else {
                None
            }
        };

        let Some((endpoint, body)) = target else {
            let _ = self.end(API_DISCONNECTED, true);
            return;
        };

        match self.end(API_DISCONNECTED, false) {
            Ok(generation) => self.reconnect(&endpoint, &body, generation).await,
            Err(e) => debug!(error = %e, "Session already ended"),
        }
    }

    /// Reopen `endpoint` until it succeeds, the policy gives up, or the
    /// session moves on (ended, disabled, or pointed elsewhere).
    async fn reconnect(self: &Arc<Self>, endpoint: &str, body: &Params, generation: u64) {
        let mut handler = ReconnectHandler::new(self.reconnect.clone());

        loop {
            if !self.still_reconnecting(endpoint, generation) {
                return;
            }

            if let Err(e) = handler.wait_for_reconnect().await {
                warn!(error = %e, endpoint, "Giving up on stream");
                self.emit(StreamEvent::Error(e.into()));
                self.abandon(generation);
                return;
            }

            if !self.still_reconnecting(endpoint, generation) {
                return;
            }
            self.log(
                Some(endpoint),
                &format!("reconnecting, attempt {}", handler.attempts()),
            );

            match self.open(endpoint, body).await {
                Ok(response) => {
                    let mut state = self.state.lock();
                    if state.generation != generation
                        || state.endpoint.as_deref() != Some(endpoint)
                    {
                        return;
                    }
                    if state.auto_reconnect {
                        self.attach(&mut state, response);
                    } else {
                        state.endpoint = None;
                        state.body = Params::new();
                        state.phase = ConnectionState::Ended;
                    }
                    return;
                }
                Err(e) => {
                    warn!(error = %e, endpoint, "Reconnection attempt failed");
                    self.emit(StreamEvent::Error(e));
                }
            }
        }
    }

    /// Whether a reconnect loop started at `generation` should continue,
    /// marking the session as connecting if so. Clears the endpoint if
    /// reconnection was switched off meanwhile.
    fn still_reconnecting(&self, endpoint: &str, generation: u64) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation || state.endpoint.as_deref() != Some(endpoint) {
            return false;
        }
        if !state.auto_reconnect {
            state.endpoint = None;
            state.body = Params::new();
            state.phase = ConnectionState::Ended;
            return false;
        }
        state.phase = ConnectionState::Connecting;
        true
    }

    fn abandon(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.generation == generation {
            state.endpoint = None;
            state.body = Params::new();
            state.phase = ConnectionState::Ended;
        }
    }

    /// End the current connection. Returns the new generation.
    fn end(&self, reason: &str, clear_endpoint: bool) -> TwitterResult<u64> {
        let (generation, endpoint) = {
            let mut state = self.state.lock();
            if state.ended {
                // A kept endpoint may still be driving a reconnect loop.
                if clear_endpoint && state.endpoint.is_some() {
                    state.generation += 1;
                    state.phase = ConnectionState::Ended;
                    state.body = Params::new();
                    let generation = state.generation;
                    let endpoint = state.endpoint.take();
                    drop(state);
                    self.log(endpoint.as_deref(), &format!("released: {reason}"));
                    return Ok(generation);
                }
                return Err(TwitterError::InvalidState("stream already ended".into()));
            }
            if state.endpoint.is_none() {
                return Err(TwitterError::InvalidState("stream never connected".into()));
            }

            if let Some(reader) = state.reader.take() {
                reader.abort();
            }
            state.ended = true;
            state.phase = ConnectionState::Ended;
            state.generation += 1;

            let endpoint = if clear_endpoint {
                state.body = Params::new();
                state.endpoint.take()
            } else {
                state.endpoint.clone()
            };
            (state.generation, endpoint)
        };

        self.log(endpoint.as_deref(), &format!("ended: {reason}"));
        self.emit(StreamEvent::End {
            reason: reason.to_string(),
        });
        Ok(generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> (StreamSession, mpsc::UnboundedReceiver<StreamEvent>) {
        let config = TwitterConfig::new(crate::config::Credentials::new("ck", "cs", "at", "ats"));
        StreamSession::new(&config).unwrap()
    }

    fn classify_str(raw: &str) -> Option<StreamEvent> {
        classify(serde_json::from_str(raw).unwrap())
    }

    #[test]
    fn test_classify_ping() {
        assert!(matches!(
            classify_str(r#"{"event":"ping"}"#),
            Some(StreamEvent::Ping)
        ));
        assert!(matches!(classify(heartbeat_packet()), Some(StreamEvent::Ping)));
    }

    #[test]
    fn test_classify_named_events() {
        match classify_str(r#"{"event":"favorite","source":{},"target":{}}"#) {
            Some(StreamEvent::Named { kind, packet }) => {
                assert_eq!(kind, EventKind::Favorite);
                assert!(packet.get("source").is_some());
            }
            other => panic!("unexpected: {other:?}"),
        }

        match classify_str(r#"{"event":"access_revoked"}"#) {
            Some(StreamEvent::Named { kind, .. }) => {
                assert_eq!(kind, EventKind::Other("access_revoked".into()));
                assert_eq!(kind.as_str(), "access_revoked");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_event_beats_text() {
        assert!(matches!(
            classify_str(r#"{"event":"quoted_tweet","text":"hi"}"#),
            Some(StreamEvent::Named { kind: EventKind::QuotedTweet, .. })
        ));
    }

    #[test]
    fn test_classify_tweets() {
        match classify_str(r#"{"text":"hi"}"#) {
            Some(StreamEvent::Tweet(tweet)) => assert_eq!(tweet.text, "hi"),
            other => panic!("unexpected: {other:?}"),
        }
        match classify_str(r#"{"data":{"id":"5","text":"v2"}}"#) {
            Some(StreamEvent::Tweet(tweet)) => assert_eq!(tweet.id.as_deref(), Some("5")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_empty_text_is_not_a_tweet() {
        assert!(classify_str(r#"{"text":""}"#).is_none());
    }

    #[test]
    fn test_classify_delete_and_warning() {
        match classify_str(r#"{"delete":{"status":{"id_str":"9","user_id_str":"1"}}}"#) {
            Some(StreamEvent::TweetDelete(deleted)) => assert_eq!(deleted.id, "9"),
            other => panic!("unexpected: {other:?}"),
        }
        match classify_str(r#"{"warning":{"code":"FALLING_BEHIND","percent_full":60}}"#) {
            Some(StreamEvent::Warning { warning, .. }) => {
                assert_eq!(warning["code"], "FALLING_BEHIND");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_packets_are_dropped() {
        assert!(classify_str(r#"{"limit":{"track":12}}"#).is_none());
        assert!(classify_str("[1,2,3]").is_none());
    }

    #[test]
    fn test_event_kind_round_trips_names() {
        for name in ["follow", "list_member_added", "user_update", "custom"] {
            assert_eq!(EventKind::from_name(name).as_str(), name);
        }
    }

    #[tokio::test]
    async fn test_handle_frame_publishes_raw_then_event() {
        let (session, mut rx) = session();

        session.inner.handle_frame(Frame::new(&b""[..]));
        match rx.recv().await {
            Some(StreamEvent::Raw { frame, packet }) => {
                assert!(frame.is_empty());
                assert_eq!(packet, Some(heartbeat_packet()));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(rx.recv().await, Some(StreamEvent::Ping)));

        session.inner.handle_frame(Frame::new(&b"{oops"[..]));
        assert!(matches!(rx.recv().await, Some(StreamEvent::Error(TwitterError::Stream(_)))));
        assert!(matches!(
            rx.recv().await,
            Some(StreamEvent::Raw { packet: None, .. })
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_end_before_connect_fails() {
        let (session, _rx) = session();
        let err = session.end("bye", true).unwrap_err();
        assert!(matches!(err, TwitterError::InvalidState(ref m) if m.contains("never connected")));
        assert_eq!(session.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_stream_url() {
        let (session, _rx) = session();
        assert_eq!(
            session.inner.url_for("/statuses/filter"),
            "https://stream.twitter.com/1.1/statuses/filter.json"
        );
    }
}
