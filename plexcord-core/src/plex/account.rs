//! plex.tv account client

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{build_client, get_json, plex_headers, PlexServer, REQUEST_TIMEOUT};
use crate::error::{Error, Result};
use crate::server::{MediaServer, Resource, ResourceConnection, ServerDirectory};

/// plex.tv API root
pub const PLEX_TV_URL: &str = "https://plex.tv";

/// Timeout for each connection attempt when reaching a server
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Response from GET /api/v2/user
#[derive(Debug, Deserialize)]
struct UserResponse {
    username: String,
}

/// Entry of GET /api/v2/resources
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResource {
    name: String,
    #[serde(default)]
    product: String,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    connections: Vec<RawConnection>,
}

#[derive(Debug, Deserialize)]
struct RawConnection {
    uri: String,
    #[serde(default)]
    local: bool,
    #[serde(default)]
    relay: bool,
}

impl From<RawResource> for Resource {
    fn from(raw: RawResource) -> Self {
        Resource {
            name: raw.name,
            product: raw.product,
            access_token: raw.access_token,
            connections: raw
                .connections
                .into_iter()
                .map(|c| ResourceConnection {
                    uri: c.uri,
                    local: c.local,
                    relay: c.relay,
                })
                .collect(),
        }
    }
}

/// A signed-in Plex account
pub struct PlexAccount {
    token: String,
    client_identifier: String,
    http_client: reqwest::Client,
    base_url: String,
}

impl PlexAccount {
    /// Create an account client for `token`
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, PLEX_TV_URL)
    }

    /// Create an account client against a different plex.tv root
    pub fn with_base_url(token: impl Into<String>, base_url: &str) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(Error::Config("Plex token is empty".to_string()));
        }

        let client_identifier = uuid::Uuid::new_v4().to_string();
        let http_client = build_client(plex_headers(&token, &client_identifier)?, REQUEST_TIMEOUT)?;

        Ok(Self {
            token,
            client_identifier,
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Local connections first, relays last
fn connection_order(connections: &[ResourceConnection]) -> Vec<&ResourceConnection> {
    let mut ordered: Vec<&ResourceConnection> = connections.iter().collect();
    ordered.sort_by_key(|c| (c.relay, !c.local));
    ordered
}

#[async_trait]
impl ServerDirectory for PlexAccount {
    async fn username(&self) -> Result<String> {
        let url = format!("{}/api/v2/user", self.base_url);
        let user: UserResponse = get_json(&self.http_client, &url).await?;
        Ok(user.username)
    }

    async fn resources(&self) -> Result<Vec<Resource>> {
        let url = format!(
            "{}/api/v2/resources?includeHttps=1&includeRelay=1",
            self.base_url
        );
        let resources: Vec<RawResource> = get_json(&self.http_client, &url).await?;
        Ok(resources.into_iter().map(Resource::from).collect())
    }

    async fn connect(&self, resource: &Resource) -> Result<Arc<dyn MediaServer>> {
        let token = resource.access_token.as_deref().unwrap_or(&self.token);

        for connection in connection_order(&resource.connections) {
            let server = PlexServer::new(
                &resource.name,
                &connection.uri,
                token,
                &self.client_identifier,
                CONNECT_TIMEOUT,
            )?;

            match server.identity().await {
                Ok(machine_identifier) => {
                    tracing::debug!(
                        uri = %connection.uri,
                        machine_identifier = %machine_identifier,
                        "Reached server"
                    );
                    return Ok(Arc::new(server.with_timeout(REQUEST_TIMEOUT)?));
                }
                Err(e) => {
                    tracing::debug!(uri = %connection.uri, error = %e, "Connection attempt failed");
                }
            }
        }

        Err(Error::Plex(format!(
            "no reachable connection for \"{}\"",
            resource.name
        )))
    }
}
