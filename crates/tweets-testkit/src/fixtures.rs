//! Test fixtures: credentials and canned API payloads.

// ─────────────────────────────────────────────────────────────────────────────
// Credential Fixtures
// ─────────────────────────────────────────────────────────────────────────────

/// Consumer key used across tests.
pub const CONSUMER_KEY: &str = "test_consumer_key";
/// Consumer secret used across tests.
pub const CONSUMER_SECRET: &str = "test_consumer_secret";
/// Access token used across tests.
pub const ACCESS_TOKEN: &str = "test_access_token";
/// Access token secret used across tests.
pub const ACCESS_TOKEN_SECRET: &str = "test_access_token_secret";

// ─────────────────────────────────────────────────────────────────────────────
// JSON Fixtures
// ─────────────────────────────────────────────────────────────────────────────

/// API payloads in the v1.1 object model.
pub mod json {
    use serde_json::json;

    /// A v1.1 error body.
    #[must_use]
    pub fn error(code: i64, message: &str) -> serde_json::Value {
        json!({
            "errors": [{ "code": code, "message": message }]
        })
    }

    /// A user object.
    #[must_use]
    pub fn user(id: &str, screen_name: &str) -> serde_json::Value {
        json!({
            "id": id.parse::<u64>().unwrap_or_default(),
            "id_str": id,
            "name": format!("{screen_name} display"),
            "screen_name": screen_name,
            "created_at": "Wed Oct 10 20:19:24 +0000 2018",
            "followers_count": 42,
            "favourites_count": 7,
            "friends_count": 3,
            "profile_image_url_https": "https://pbs.twimg.com/profile_images/1/a.png",
            "profile_background_image_url_https": "https://abs.twimg.com/images/bg.png",
            "default_profile_image": false,
            "verified": false,
            "protected": false,
            "url": null
        })
    }

    /// A tweet object.
    #[must_use]
    pub fn tweet(id: &str, text: &str) -> serde_json::Value {
        json!({
            "id": id.parse::<u64>().unwrap_or_default(),
            "id_str": id,
            "text": text,
            "created_at": "Wed Oct 10 20:19:24 +0000 2018",
            "user": user("6253282", "example")
        })
    }

    /// A paged follower list.
    #[must_use]
    pub fn followers_page(users: &[(&str, &str)], next_cursor: i64) -> serde_json::Value {
        json!({
            "users": users.iter().map(|(id, name)| user(id, name)).collect::<Vec<_>>(),
            "next_cursor": next_cursor,
            "previous_cursor": 0
        })
    }

    /// A media upload response.
    #[must_use]
    pub fn media_uploaded(media_id: &str) -> serde_json::Value {
        json!({
            "media_id": media_id.parse::<u64>().unwrap_or_default(),
            "media_id_string": media_id,
            "size": 1024
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream Fixtures
// ─────────────────────────────────────────────────────────────────────────────

/// Raw frames as they appear on the wire, terminator included.
pub mod frames {
    /// Explicit ping event.
    pub const PING: &str = "{\"event\":\"ping\"}\r\n";
    /// Keep-alive: an empty frame.
    pub const HEARTBEAT: &str = "\r\n";
    /// Tweet packet.
    pub const TWEET: &str = "{\"id_str\":\"1050118621198921728\",\"text\":\"hi\"}\r\n";
    /// Deletion notice.
    pub const DELETE: &str =
        "{\"delete\":{\"status\":{\"id\":1234,\"id_str\":\"1234\",\"user_id\":3,\"user_id_str\":\"3\"}}}\r\n";
    /// Stall warning.
    pub const WARNING: &str = "{\"warning\":{\"code\":\"FALLING_BEHIND\",\"message\":\"Your connection is falling behind\",\"percent_full\":60}}\r\n";
    /// Named site event.
    pub const FAVORITE: &str = "{\"event\":\"favorite\",\"source\":{},\"target\":{}}\r\n";
    /// Not JSON.
    pub const MALFORMED: &str = "{not json\r\n";
}
