use reqwest::header::ACCEPT;
use reqwest::header::AUTHORIZATION;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use reqwest::header::USER_AGENT;

use crate::config::Config;

pub const JSON_MEDIA_TYPE: &str = "application/json";

const INVALID_TOKEN: &str = "INVALID_ACCESS_TOKEN";
const AGENT: &str = "ensek-quest/0.1";

/// Which header bundle a scenario wants on its requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileKind {
    /// Bearer token from the configuration.
    Authorized,
    /// A fixed garbage token, for negative auth scenarios.
    InvalidToken,
    /// No Authorization header at all.
    NoAuth,
    /// Caller-supplied token and media types.
    Custom {
        token: String,
        content_type: String,
        accept: String,
    },
}

/// An immutable set of request headers.
///
/// Profiles are built once and never mutated; a scenario that needs
/// different auth gets a fresh profile instead.
#[derive(Debug, Clone)]
pub struct RequestProfile {
    headers: HeaderMap,
}

impl RequestProfile {
    /// Builds the header bundle for the given kind. Construction cannot
    /// fail: the config validator already rejected tokens that don't fit in
    /// a header, and anything else that slips through degrades to a header
    /// value that the server will simply refuse.
    pub fn build(kind: &ProfileKind, config: &Config) -> Self {
        let mut headers = HeaderMap::new();

        let (content_type, accept) = match kind {
            ProfileKind::Custom {
                content_type,
                accept,
                ..
            } => (content_type.as_str(), accept.as_str()),
            _ => (JSON_MEDIA_TYPE, JSON_MEDIA_TYPE),
        };

        headers.insert(CONTENT_TYPE, header_value(content_type));
        headers.insert(ACCEPT, header_value(accept));
        headers.insert(USER_AGENT, HeaderValue::from_static(AGENT));

        match kind {
            ProfileKind::Authorized => {
                headers.insert(AUTHORIZATION, bearer(&config.auth_token));
            }
            ProfileKind::InvalidToken => {
                headers.insert(AUTHORIZATION, bearer(INVALID_TOKEN));
            }
            ProfileKind::NoAuth => {}
            ProfileKind::Custom { token, .. } => {
                headers.insert(AUTHORIZATION, bearer(token));
            }
        }

        Self { headers }
    }

    pub fn headers(&self) -> HeaderMap {
        self.headers.clone()
    }
}

fn bearer(token: &str) -> HeaderValue {
    header_value(&format!("Bearer {token}"))
}

fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(""))
}
