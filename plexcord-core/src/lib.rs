//! # plexcord-core
//!
//! Core library for plexcord - mirrors Plex playback to Discord Rich Presence.
//!
//! This library provides:
//! - The alert listener: connection supervision, debouncing, session
//!   ownership checks and presence updates
//! - Presence payload mapping
//! - Plex (HTTP + websocket) and Discord (local IPC) transports
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Each configured server gets one [`AlertListener`] task. The listener only
//! sees the transports through traits:
//! - [`ServerDirectory`] / [`MediaServer`]: the account and the connected
//!   server ([`plex`])
//! - [`PresencePublisher`]: where the activity is shown ([`discord`])
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use plexcord_core::config::ConfigStore;
//! use plexcord_core::discord::{DiscordIpc, CLIENT_ID};
//! use plexcord_core::plex::PlexAccount;
//! use plexcord_core::{AlertListener, Config, ListenerSettings};
//!
//! # async fn run() -> plexcord_core::Result<()> {
//! let store = Arc::new(ConfigStore::open(Config::config_path()));
//! let config = store.snapshot();
//! let user = &config.users[0];
//!
//! let handle = AlertListener::spawn(
//!     ListenerSettings {
//!         server: user.servers[0].clone(),
//!         images_url: None,
//!     },
//!     Arc::new(PlexAccount::new(user.token.clone())?),
//!     Box::new(DiscordIpc::new(CLIENT_ID)),
//!     store.clone(),
//! );
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use activity::{Activity, ActivityMapper};
pub use config::{Config, ConfigStore, ServerConfig};
pub use error::{Error, Result};
pub use listener::{AlertListener, ConnectionState, Disposition, ListenerHandle, ListenerSettings};
pub use media::{MediaItem, MediaKind, PlaybackAlert, PlaybackState};
pub use presence::PresencePublisher;
pub use server::{MediaServer, ServerDirectory};

// Public modules
pub mod activity;
pub mod config;
pub mod debounce;
#[cfg(unix)]
pub mod discord;
pub mod error;
pub mod format;
pub mod listener;
pub mod logging;
pub mod media;
pub mod plex;
pub mod presence;
pub mod server;
pub mod session;
pub mod timer;
