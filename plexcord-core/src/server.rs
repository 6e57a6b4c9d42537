//! Media server transport seams
//!
//! The listener talks to the media server only through these traits. The
//! Plex implementation lives in [`crate::plex`]; tests substitute in-memory
//! doubles.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::error::Result;
use crate::media::{MediaItem, ServerSession};

/// Product name of servers we can listen to
pub const PRODUCT_NAME: &str = "Plex Media Server";

/// Stream of raw notifications from a connected server.
///
/// An `Err` item or the end of the stream means the connection is gone.
pub type AlertStream = BoxStream<'static, Result<Value>>;

/// One way of reaching a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceConnection {
    pub uri: String,
    pub local: bool,
    pub relay: bool,
}

/// A server (or other device) registered to the account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    pub product: String,
    pub access_token: Option<String>,
    pub connections: Vec<ResourceConnection>,
}

impl Resource {
    /// Whether this is the media server named `name` (case-insensitive)
    pub fn matches(&self, name: &str) -> bool {
        self.product == PRODUCT_NAME && self.name.to_lowercase() == name.to_lowercase()
    }
}

/// Account-level access: who we are and which servers we can reach.
#[async_trait]
pub trait ServerDirectory: Send + Sync {
    /// Username of the signed-in account
    async fn username(&self) -> Result<String>;

    /// Resources registered to the account
    async fn resources(&self) -> Result<Vec<Resource>>;

    /// Open a connection to a resource
    async fn connect(&self, resource: &Resource) -> Result<Arc<dyn MediaServer>>;
}

/// A connected media server.
#[async_trait]
pub trait MediaServer: Send + Sync {
    /// Name reported by the server
    fn name(&self) -> &str;

    /// Whether we have owner access (full session list)
    async fn is_owner(&self) -> bool;

    /// Fetch an item's metadata by rating key
    async fn fetch_item(&self, rating_key: u64) -> Result<MediaItem>;

    /// Live playback sessions
    async fn sessions(&self) -> Result<Vec<ServerSession>>;

    /// Lightweight request used to check that the server still answers.
    ///
    /// Returns the number of connected clients.
    async fn probe(&self) -> Result<usize>;

    /// Subscribe to server notifications
    async fn alerts(&self) -> Result<AlertStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_matches_name_and_product() {
        let resource = Resource {
            name: "Living Room".to_string(),
            product: PRODUCT_NAME.to_string(),
            access_token: None,
            connections: vec![],
        };
        assert!(resource.matches("living room"));
        assert!(!resource.matches("Bedroom"));

        let player = Resource {
            product: "Plex for Android".to_string(),
            ..resource
        };
        assert!(!player.matches("Living Room"));
    }
}
