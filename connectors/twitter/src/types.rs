//! Domain records mapped from API payloads.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Timestamp layout of v1.1 payloads, e.g. `Wed Oct 10 20:19:24 +0000 2018`.
const TWITTER_DATE_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Parse a v1.1 timestamp, falling back to RFC 3339 (v2 payloads).
#[must_use]
pub fn parse_twitter_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(raw, TWITTER_DATE_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<Option<DateTime<FixedOffset>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_twitter_date))
}

/// A user account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    #[serde(rename = "id_str")]
    pub id: String,
    pub name: String,
    pub screen_name: String,
    #[serde(deserialize_with = "deserialize_date")]
    pub created_at: Option<DateTime<FixedOffset>>,
    pub followers_count: u64,
    #[serde(rename = "favourites_count")]
    pub favorites_count: u64,
    pub friends_count: u64,
    #[serde(rename = "profile_image_url_https")]
    pub avatar_url: Option<String>,
    #[serde(rename = "profile_background_image_url_https")]
    pub banner_url: Option<String>,
    pub default_profile_image: bool,
    pub verified: bool,
    pub protected: bool,
    pub url: Option<String>,
}

impl User {
    /// Public profile page.
    #[must_use]
    pub fn profile_url(&self) -> String {
        format!("https://twitter.com/{}", self.screen_name)
    }
}

/// A tweet.
///
/// Built from v1.1 objects and from v2 stream packets, where the tweet sits
/// under `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct Tweet {
    pub id: Option<String>,
    pub text: String,
    pub created_at: Option<DateTime<FixedOffset>>,
    pub user: Option<User>,
    /// The packet this tweet was built from.
    #[serde(skip_serializing)]
    pub raw: Value,
}

#[derive(Deserialize)]
struct TweetFields {
    #[serde(default)]
    id_str: Option<String>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    full_text: Option<String>,
    #[serde(default, deserialize_with = "deserialize_date")]
    created_at: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    user: Option<User>,
}

impl Tweet {
    /// Build a tweet from a v1.1 object or a v2 `{"data": {...}}` packet.
    pub fn from_packet(packet: &Value) -> Result<Self, serde_json::Error> {
        let body = match packet.get("data") {
            Some(data) if data.get("text").is_some() => data,
            _ => packet,
        };
        let fields = TweetFields::deserialize(body)?;

        let id = fields.id_str.or_else(|| match fields.id {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        });

        Ok(Self {
            id,
            text: fields.text.or(fields.full_text).unwrap_or_default(),
            created_at: fields.created_at,
            user: fields.user,
            raw: packet.clone(),
        })
    }

    /// Link to the tweet, when both author and id are known.
    #[must_use]
    pub fn url(&self) -> Option<String> {
        let user = self.user.as_ref()?;
        let id = self.id.as_ref()?;
        Some(format!("{}/status/{id}", user.profile_url()))
    }
}

impl TryFrom<Value> for Tweet {
    type Error = serde_json::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_packet(&value)
    }
}

/// A deletion notice from the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedTweet {
    pub id: String,
    pub user_id: Option<String>,
}

#[derive(Deserialize)]
struct DeletedStatus {
    #[serde(default)]
    id_str: Option<String>,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    user_id_str: Option<String>,
    #[serde(default)]
    user_id: Option<u64>,
}

impl DeletedTweet {
    /// Read `{"delete": {"status": {...}}}`.
    pub fn from_packet(packet: &Value) -> Result<Self, serde_json::Error> {
        let status = packet
            .get("delete")
            .and_then(|d| d.get("status"))
            .cloned()
            .unwrap_or(Value::Null);
        let status = DeletedStatus::deserialize(status)?;

        let id = status
            .id_str
            .or_else(|| status.id.map(|id| id.to_string()))
            .unwrap_or_default();
        let user_id = status
            .user_id_str
            .or_else(|| status.user_id.map(|id| id.to_string()));

        Ok(Self { id, user_id })
    }
}

/// One page of a cursored follower list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowersPage {
    pub users: Vec<User>,
    pub next_cursor: i64,
    pub previous_cursor: i64,
}

impl FollowersPage {
    /// Whether another page follows.
    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.next_cursor != 0
    }
}

/// Result of a media upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadedMedia {
    #[serde(rename = "media_id_string")]
    pub media_id: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub expires_after_secs: Option<u64>,
    #[serde(default)]
    pub processing_info: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    #[test]
    fn test_parse_twitter_date() {
        let date = parse_twitter_date("Wed Oct 10 20:19:24 +0000 2018").unwrap();
        assert_eq!(date.year(), 2018);
        assert_eq!(date.month(), 10);
        assert_eq!(date.hour(), 20);

        assert!(parse_twitter_date("2018-10-10T20:19:24.000Z").is_some());
        assert!(parse_twitter_date("yesterday").is_none());
    }

    #[test]
    fn test_user_from_v1_object() {
        let user: User = serde_json::from_value(json!({
            "id": 6_253_282,
            "id_str": "6253282",
            "name": "Twitter API",
            "screen_name": "TwitterAPI",
            "followers_count": 6_133_636,
            "favourites_count": 31,
            "verified": true,
            "profile_image_url_https": "https://pbs.twimg.com/a.png"
        }))
        .unwrap();

        assert_eq!(user.id, "6253282");
        assert_eq!(user.favorites_count, 31);
        assert!(user.verified);
        assert!(!user.protected);
        assert_eq!(user.profile_url(), "https://twitter.com/TwitterAPI");
    }

    #[test]
    fn test_tweet_from_v1_packet() {
        let packet = json!({
            "id": 1_050_118_621_198_921_728_u64,
            "id_str": "1050118621198921728",
            "text": "To make room for more expression",
            "created_at": "Wed Oct 10 20:19:24 +0000 2018",
            "user": { "id_str": "6253282", "screen_name": "TwitterAPI" }
        });

        let tweet = Tweet::from_packet(&packet).unwrap();
        assert_eq!(tweet.id.as_deref(), Some("1050118621198921728"));
        assert_eq!(tweet.text, "To make room for more expression");
        assert!(tweet.created_at.is_some());
        assert_eq!(
            tweet.url().as_deref(),
            Some("https://twitter.com/TwitterAPI/status/1050118621198921728")
        );
        assert_eq!(tweet.raw, packet);
    }

    #[test]
    fn test_tweet_from_v2_packet() {
        let packet = json!({
            "data": { "id": "1067094924124872705", "text": "Just getting started" },
            "matching_rules": [{ "id": "1", "tag": "rust" }]
        });

        let tweet = Tweet::from_packet(&packet).unwrap();
        assert_eq!(tweet.id.as_deref(), Some("1067094924124872705"));
        assert_eq!(tweet.text, "Just getting started");
        assert!(tweet.user.is_none());
    }

    #[test]
    fn test_tweet_deserializes_through_value() {
        let tweets: Vec<Tweet> = serde_json::from_value(json!([
            { "id_str": "1", "text": "one" },
            { "id_str": "2", "full_text": "two" }
        ]))
        .unwrap();

        assert_eq!(tweets.len(), 2);
        assert_eq!(tweets[1].text, "two");
    }

    #[test]
    fn test_tweet_rejects_wrong_text_type() {
        assert!(Tweet::from_packet(&json!({ "text": 42 })).is_err());
    }

    #[test]
    fn test_deleted_tweet() {
        let packet = json!({
            "delete": { "status": { "id": 1234, "id_str": "1234", "user_id": 3, "user_id_str": "3" } }
        });
        let deleted = DeletedTweet::from_packet(&packet).unwrap();
        assert_eq!(deleted.id, "1234");
        assert_eq!(deleted.user_id.as_deref(), Some("3"));

        let numeric_only = json!({ "delete": { "status": { "id": 99, "user_id": 7 } } });
        let deleted = DeletedTweet::from_packet(&numeric_only).unwrap();
        assert_eq!(deleted.id, "99");
        assert_eq!(deleted.user_id.as_deref(), Some("7"));
    }

    #[test]
    fn test_followers_page() {
        let page: FollowersPage = serde_json::from_value(json!({
            "users": [{ "id_str": "1", "screen_name": "a" }],
            "next_cursor": 0,
            "next_cursor_str": "0",
            "previous_cursor": 0
        }))
        .unwrap();

        assert_eq!(page.users.len(), 1);
        assert!(!page.has_next());
    }
}
