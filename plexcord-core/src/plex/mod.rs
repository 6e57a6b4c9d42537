//! Plex transport
//!
//! Implements [`ServerDirectory`](crate::server::ServerDirectory) against
//! plex.tv and [`MediaServer`](crate::server::MediaServer) against a Plex
//! Media Server's HTTP API and notification websocket.
//!
//! All requests ask for JSON (`Accept: application/json`) and authenticate
//! with `X-Plex-Token`.

mod account;
mod server;

pub use account::PlexAccount;
pub use server::PlexServer;

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Product name sent to Plex
const CLIENT_PRODUCT: &str = "plexcord";

/// Timeout for API requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the headers every Plex request carries
fn plex_headers(token: &str, client_identifier: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(
        HeaderName::from_static("x-plex-token"),
        HeaderValue::from_str(token).map_err(|e| Error::Config(format!("invalid token: {}", e)))?,
    );
    headers.insert(
        HeaderName::from_static("x-plex-client-identifier"),
        HeaderValue::from_str(client_identifier)
            .map_err(|e| Error::Config(format!("invalid client identifier: {}", e)))?,
    );
    headers.insert(
        HeaderName::from_static("x-plex-product"),
        HeaderValue::from_static(CLIENT_PRODUCT),
    );
    headers.insert(
        HeaderName::from_static("x-plex-version"),
        HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
    );
    Ok(headers)
}

fn build_client(headers: HeaderMap, timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))
}

/// GET `url` and decode the JSON body, mapping non-2xx to [`Error::Plex`]
async fn get_json<T: DeserializeOwned>(client: &reqwest::Client, url: &str) -> Result<T> {
    let response = client.get(url).send().await?;
    let status = response.status();

    if status.is_success() {
        response
            .json()
            .await
            .map_err(|e| Error::Plex(format!("failed to parse response from {}: {}", url, e)))
    } else {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown".to_string());
        Err(Error::Plex(format!("API error ({}): {}", status, error_text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plex_headers() {
        let headers = plex_headers("secret", "client-1").unwrap();
        assert_eq!(headers["x-plex-token"], "secret");
        assert_eq!(headers["x-plex-client-identifier"], "client-1");
        assert_eq!(headers[ACCEPT], "application/json");
    }

    #[test]
    fn test_invalid_token_is_a_config_error() {
        assert!(matches!(
            plex_headers("bad\ntoken", "client-1"),
            Err(Error::Config(_))
        ));
    }
}
