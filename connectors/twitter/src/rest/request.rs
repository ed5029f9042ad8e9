//! Request parameters, bucket keys, and descriptor resolution.

use std::fmt;

use percent_encoding::utf8_percent_encode;
use url::form_urlencoded;

use crate::config::ApiVersion;
use crate::error::{TwitterError, TwitterResult};
use crate::oauth::OAUTH_ENCODE_SET;

/// Marker that opens a path placeholder segment, as in `/statuses/retweet/:tweetID`.
const PLACEHOLDER_MARKER: char = ':';

/// HTTP method of a REST call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestMethod {
    Get,
    Post,
}

impl RequestMethod {
    /// Upper-case method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }

    pub(crate) const fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered request parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    /// Empty parameter set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    /// Set `key`, replacing an existing value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        let key = key.into();
        let value = value.to_string();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// Value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Remove and return the value for `key`.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(index).1)
    }

    /// Copy every entry of `other` over this set.
    pub fn merge(&mut self, other: &Self) {
        for (k, v) in other.iter() {
            self.insert(k, v);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub(crate) fn as_slice(&self) -> &[(String, String)] {
        &self.0
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// Identity of a request bucket: endpoint template plus method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    endpoint: String,
    method: RequestMethod,
}

impl BucketKey {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, method: RequestMethod) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
        }
    }

    /// Endpoint template, placeholders unresolved.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[must_use]
    pub const fn method(&self) -> RequestMethod {
        self.method
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:[{}]", self.endpoint, self.method)
    }
}

/// A call with placeholders substituted and parameters placed.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedRequest {
    pub method: RequestMethod,
    /// URL without query string; this is the URL that gets signed.
    pub url: String,
    /// Parameters left after placeholder substitution.
    pub params: Params,
}

impl ResolvedRequest {
    /// Fill the endpoint template from `params` and build the target URL.
    ///
    /// Placeholder values are consumed from the parameter set.
    pub fn resolve(
        method: RequestMethod,
        base_url: &str,
        endpoint: &str,
        mut params: Params,
        version: ApiVersion,
    ) -> TwitterResult<Self> {
        let mut path = String::with_capacity(endpoint.len());
        for segment in endpoint.trim_start_matches('/').split('/') {
            path.push('/');
            match segment.strip_prefix(PLACEHOLDER_MARKER) {
                Some(name) => {
                    let value = params.remove(name).ok_or_else(|| {
                        TwitterError::Config(format!(
                            "missing value for path parameter '{name}' in {endpoint}"
                        ))
                    })?;
                    path.push_str(&utf8_percent_encode(&value, OAUTH_ENCODE_SET).to_string());
                }
                None => path.push_str(segment),
            }
        }

        Ok(Self {
            method,
            url: format!(
                "{}{path}{}",
                base_url.trim_end_matches('/'),
                version.endpoint_suffix()
            ),
            params,
        })
    }

    /// URL actually requested. GET carries the parameters as a query string;
    /// POST carries them only in the body.
    pub fn request_url(&self) -> String {
        match self.method {
            RequestMethod::Get if !self.params.is_empty() => {
                format!("{}?{}", self.url, query_string(&self.params))
            }
            _ => self.url.clone(),
        }
    }

    /// URL-encoded body for POST.
    pub fn form_body(&self) -> Option<String> {
        match self.method {
            RequestMethod::Post => Some(form_encode(&self.params)),
            RequestMethod::Get => None,
        }
    }

    pub const fn content_type(&self) -> &'static str {
        match self.method {
            RequestMethod::Get => "application/json",
            RequestMethod::Post => "application/x-www-form-urlencoded",
        }
    }
}

/// Encode `! * ' ( )` and nothing else.
#[must_use]
pub fn percent_encode_reserved(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '!' => out.push_str("%21"),
            '*' => out.push_str("%2A"),
            '\'' => out.push_str("%27"),
            '(' => out.push_str("%28"),
            ')' => out.push_str("%29"),
            _ => out.push(c),
        }
    }
    out
}

/// Form-encode `params`, then apply the reserved-character pass.
pub(crate) fn form_encode(params: &Params) -> String {
    let encoded = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish();
    percent_encode_reserved(&encoded)
}

fn query_string(params: &Params) -> String {
    params
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                utf8_percent_encode(k, OAUTH_ENCODE_SET),
                utf8_percent_encode(v, OAUTH_ENCODE_SET)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}
