//! Plex Media Server client

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

use super::{build_client, get_json, plex_headers};
use crate::error::{Error, Result};
use crate::media::{lenient_u64, MediaItem, MediaKind, ServerSession};
use crate::server::{AlertStream, MediaServer};

/// Envelope of every JSON response
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(rename = "MediaContainer")]
    media_container: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityContainer {
    machine_identifier: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataContainer {
    #[serde(default)]
    library_section_title: Option<String>,
    #[serde(default, rename = "Metadata")]
    metadata: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    tag: String,
}

/// Item entry of GET /library/metadata/{ratingKey}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    duration: Option<u64>,
    #[serde(default, rename = "Genre")]
    genres: Vec<Tag>,
    #[serde(default)]
    grandparent_title: Option<String>,
    #[serde(default)]
    parent_title: Option<String>,
    #[serde(default)]
    parent_index: Option<u32>,
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    original_title: Option<String>,
    #[serde(default)]
    library_section_title: Option<String>,
}

impl RawItem {
    fn into_media_item(self, container_library: Option<String>) -> MediaItem {
        MediaItem {
            kind: MediaKind::from_plex(&self.kind),
            title: self.title,
            year: self.year,
            duration: self.duration.unwrap_or(0),
            genres: self.genres.into_iter().map(|g| g.tag).collect(),
            grandparent_title: self.grandparent_title,
            parent_title: self.parent_title,
            parent_index: self.parent_index,
            index: self.index,
            original_title: self.original_title,
            library_name: self
                .library_section_title
                .or(container_library)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionsContainer {
    #[serde(default, rename = "Metadata")]
    metadata: Vec<RawSession>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSession {
    #[serde(deserialize_with = "lenient_u64")]
    session_key: u64,
    #[serde(default, rename = "User")]
    user: Option<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    title: String,
}

#[derive(Debug, Deserialize)]
struct SizeContainer {
    #[serde(default)]
    size: usize,
}

/// Connected Plex Media Server
pub struct PlexServer {
    name: String,
    base_url: String,
    token: String,
    client_identifier: String,
    http_client: reqwest::Client,
}

impl PlexServer {
    pub fn new(
        name: &str,
        base_url: &str,
        token: &str,
        client_identifier: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = build_client(plex_headers(token, client_identifier)?, timeout)?;
        Ok(Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client_identifier: client_identifier.to_string(),
            http_client,
        })
    }

    /// Same server with a different request timeout
    pub fn with_timeout(self, timeout: Duration) -> Result<Self> {
        Self::new(
            &self.name,
            &self.base_url,
            &self.token,
            &self.client_identifier,
            timeout,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET /identity, returning the machine identifier
    pub async fn identity(&self) -> Result<String> {
        let url = format!("{}/identity", self.base_url);
        let identity: Envelope<IdentityContainer> = get_json(&self.http_client, &url).await?;
        Ok(identity.media_container.machine_identifier)
    }
}

/// Websocket URL for server notifications
pub fn websocket_url(base_url: &str, token: &str) -> String {
    let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base_url.to_string()
    };
    format!(
        "{}/:/websockets/notifications?X-Plex-Token={}",
        ws_base,
        urlencoding::encode(token)
    )
}

/// Decode one websocket text frame, unwrapping `NotificationContainer`
fn parse_notification(text: &str) -> Result<Value> {
    let mut value: Value = serde_json::from_str(text)?;
    match value.get_mut("NotificationContainer") {
        Some(container) => Ok(container.take()),
        None => Ok(value),
    }
}

#[async_trait]
impl MediaServer for PlexServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_owner(&self) -> bool {
        let url = format!("{}/myplex/account", self.base_url);
        match self.http_client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn fetch_item(&self, rating_key: u64) -> Result<MediaItem> {
        let url = format!("{}/library/metadata/{}", self.base_url, rating_key);
        let envelope: Envelope<MetadataContainer> = get_json(&self.http_client, &url).await?;
        let container = envelope.media_container;

        container
            .metadata
            .into_iter()
            .next()
            .map(|item| item.into_media_item(container.library_section_title))
            .ok_or_else(|| Error::Plex(format!("no metadata for rating key {}", rating_key)))
    }

    async fn sessions(&self) -> Result<Vec<ServerSession>> {
        let url = format!("{}/status/sessions", self.base_url);
        let envelope: Envelope<SessionsContainer> = get_json(&self.http_client, &url).await?;

        Ok(envelope
            .media_container
            .metadata
            .into_iter()
            .map(|session| ServerSession {
                session_key: session.session_key,
                usernames: session.user.map(|u| u.title).into_iter().collect(),
            })
            .collect())
    }

    async fn probe(&self) -> Result<usize> {
        let url = format!("{}/clients", self.base_url);
        let envelope: Envelope<SizeContainer> = get_json(&self.http_client, &url).await?;
        Ok(envelope.media_container.size)
    }

    async fn alerts(&self) -> Result<AlertStream> {
        let url = websocket_url(&self.base_url, &self.token);
        let (socket, _) = tokio_tungstenite::connect_async(url).await?;

        let stream = socket.filter_map(|message| {
            futures::future::ready(match message {
                Ok(Message::Text(text)) => Some(parse_notification(text.as_str())),
                Ok(Message::Close(frame)) => Some(Err(Error::Transport(format!(
                    "server closed the alert stream: {:?}",
                    frame
                )))),
                Ok(_) => None,
                Err(e) => Some(Err(Error::from(e))),
            })
        });

        Ok(stream.boxed())
    }
}
