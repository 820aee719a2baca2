//! Realtime endpoint resolution.
//!
//! The websocket URL is derived from the REST API base URL: the scheme is
//! swapped (`http` -> `ws`, `https` -> `wss`), `/ws/connect` is appended to
//! the path and the bearer token travels as the `token` query parameter.

use thiserror::Error;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
pub const CONNECT_PATH: &str = "/ws/connect";
pub const TOKEN_PARAM: &str = "token";

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("invalid url: {0}")]
    Parse(#[from] url::ParseError),
    #[error("unsupported scheme `{0}`")]
    UnsupportedScheme(String),
}

/// Websocket endpoint without credentials attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    /// Derive the endpoint from a REST API base such as `https://host/api`.
    pub fn from_api_url(api_url: &str) -> Result<Self, EndpointError> {
        let mut url = Url::parse(api_url.trim())?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
        };
        url.set_scheme(scheme)
            .map_err(|_| EndpointError::UnsupportedScheme(scheme.to_string()))?;
        let path = format!("{}{}", url.path().trim_end_matches('/'), CONNECT_PATH);
        url.set_path(&path);
        url.set_query(None);
        url.set_fragment(None);
        Ok(Self { url })
    }

    /// Use a fixed websocket URL as-is (for deployments that pin the gateway).
    pub fn from_ws_url(ws_url: &str) -> Result<Self, EndpointError> {
        let mut url = Url::parse(ws_url.trim())?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
        }
        url.set_fragment(None);
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The URL to dial, with the bearer token attached.
    pub fn with_token(&self, token: &str) -> Url {
        let mut url = self.url.clone();
        let retained: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != TOKEN_PARAM)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (key, value) in &retained {
                pairs.append_pair(key, value);
            }
            pairs.append_pair(TOKEN_PARAM, token);
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_becomes_ws() {
        let endpoint = Endpoint::from_api_url("http://127.0.0.1:8000/api").unwrap();
        assert_eq!(endpoint.url().as_str(), "ws://127.0.0.1:8000/api/ws/connect");
    }

    #[test]
    fn https_becomes_wss_and_trailing_slash_is_ignored() {
        let endpoint = Endpoint::from_api_url("https://mukstagram.example/api/").unwrap();
        assert_eq!(
            endpoint.url().as_str(),
            "wss://mukstagram.example/api/ws/connect"
        );
    }

    #[test]
    fn bare_host_gets_connect_path() {
        let endpoint = Endpoint::from_api_url("http://localhost:8000").unwrap();
        assert_eq!(endpoint.url().as_str(), "ws://localhost:8000/ws/connect");
    }

    #[test]
    fn token_is_percent_encoded() {
        let endpoint = Endpoint::from_api_url("http://localhost:8000/api").unwrap();
        let url = endpoint.with_token("a b+c/=");
        assert_eq!(
            url.as_str(),
            "ws://localhost:8000/api/ws/connect?token=a+b%2Bc%2F%3D"
        );
    }

    #[test]
    fn token_replaces_existing_token_param() {
        let endpoint =
            Endpoint::from_ws_url("ws://127.0.0.1:8000/api/ws/connect?v=2&token=old").unwrap();
        let url = endpoint.with_token("new");
        assert_eq!(
            url.as_str(),
            "ws://127.0.0.1:8000/api/ws/connect?v=2&token=new"
        );
    }

    #[test]
    fn other_schemes_are_rejected() {
        assert!(matches!(
            Endpoint::from_api_url("ftp://example.com/api"),
            Err(EndpointError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            Endpoint::from_ws_url("http://example.com/ws"),
            Err(EndpointError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            Endpoint::from_api_url("not a url"),
            Err(EndpointError::Parse(_))
        ));
    }
}
