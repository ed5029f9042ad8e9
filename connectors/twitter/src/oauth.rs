//! OAuth 1.0a request signing.
//!
//! Every REST and stream request carries an `Authorization: OAuth ...`
//! header computed with HMAC-SHA1 over the method, the URL without its query
//! string, and the sorted request parameters.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::RngCore;
use sha1::Sha1;

use crate::config::Credentials;
use crate::error::{TwitterError, TwitterResult};
use crate::rest::{Params, RequestMethod};

/// Everything except the RFC 3986 unreserved set: ALPHA / DIGIT / "-" / "." / "_" / "~"
pub(crate) const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Signs requests with a fixed credential set.
#[derive(Debug, Clone)]
pub struct Signer {
    credentials: Credentials,
}

impl Signer {
    /// Create a signer; the consumer pair must be present.
    pub fn new(credentials: Credentials) -> TwitterResult<Self> {
        credentials.validate()?;
        Ok(Self { credentials })
    }

    /// Authorization header value for a request.
    ///
    /// `url` must not contain a query string; query and form parameters
    /// are passed in `params`.
    pub fn sign(&self, method: RequestMethod, url: &str, params: &Params) -> TwitterResult<String> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| TwitterError::OAuth(format!("Failed to get timestamp: {e}")))?
            .as_secs();

        self.sign_with(method, url, params, &generate_nonce(), timestamp)
    }

    pub(crate) fn sign_with(
        &self,
        method: RequestMethod,
        url: &str,
        params: &Params,
        nonce: &str,
        timestamp: u64,
    ) -> TwitterResult<String> {
        let mut oauth_params = vec![
            ("oauth_consumer_key", self.credentials.consumer_key.clone()),
            ("oauth_nonce", nonce.to_string()),
            ("oauth_signature_method", "HMAC-SHA1".to_string()),
            ("oauth_timestamp", timestamp.to_string()),
        ];
        if let Some(token) = self.credentials.access_token.as_deref().filter(|t| !t.is_empty()) {
            oauth_params.push(("oauth_token", token.to_string()));
        }
        oauth_params.push(("oauth_version", "1.0".to_string()));

        let mut encoded: Vec<(String, String)> = oauth_params
            .iter()
            .map(|(k, v)| (percent_encode(k), percent_encode(v)))
            .chain(
                params
                    .as_slice()
                    .iter()
                    .map(|(k, v)| (percent_encode(k), percent_encode(v))),
            )
            .collect();
        encoded.sort();

        let param_string = encoded
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let base_string = format!(
            "{}&{}&{}",
            method.as_str(),
            percent_encode(url),
            percent_encode(&param_string)
        );

        let signing_key = format!(
            "{}&{}",
            percent_encode(&self.credentials.consumer_secret),
            percent_encode(self.credentials.access_token_secret.as_deref().unwrap_or_default())
        );

        let signature = hmac_sha1(&signing_key, &base_string)?;
        oauth_params.push(("oauth_signature", signature));
        oauth_params.sort_by(|a, b| a.0.cmp(&b.0));

        let header = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!("OAuth {header}"))
    }
}

/// Percent-encode a string according to RFC 3986.
fn percent_encode(s: &str) -> String {
    utf8_percent_encode(s, OAUTH_ENCODE_SET).to_string()
}

/// Generate a random nonce for OAuth.
fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Compute HMAC-SHA1 and return base64-encoded result.
fn hmac_sha1(key: &str, data: &str) -> TwitterResult<String> {
    type HmacSha1 = Hmac<Sha1>;

    let mut mac =
        HmacSha1::new_from_slice(key.as_bytes()).map_err(|e| TwitterError::OAuth(e.to_string()))?;

    mac.update(data.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}
