//! Core domain types for plexcord
//!
//! | Term | Definition |
//! |------|------------|
//! | **Alert** | A push notification from the media server about one session's playback |
//! | **Session key** | Server-assigned id of one active playback session |
//! | **Rating key** | Server-assigned id of one media item |
//! | **Library** | The server section an item belongs to (Movies, TV Shows, Music...) |

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// ============================================
// Playback state
// ============================================

/// Playback state reported by the server.
///
/// `None` is only used locally, for "nothing tracked yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    None,
    Playing,
    Paused,
    Buffering,
    Stopped,
}

impl PlaybackState {
    /// Wire name, also used as the small image asset key
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::None => "none",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Buffering => "buffering",
            PlaybackState::Stopped => "stopped",
        }
    }

    /// Capitalized name for hover text
    pub fn label(&self) -> &'static str {
        match self {
            PlaybackState::None => "None",
            PlaybackState::Playing => "Playing",
            PlaybackState::Paused => "Paused",
            PlaybackState::Buffering => "Buffering",
            PlaybackState::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaybackState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "playing" => Ok(PlaybackState::Playing),
            "paused" => Ok(PlaybackState::Paused),
            "buffering" => Ok(PlaybackState::Buffering),
            "stopped" => Ok(PlaybackState::Stopped),
            other => Err(Error::Alert(format!("unknown playback state \"{}\"", other))),
        }
    }
}

// ============================================
// Alerts
// ============================================

/// Notification type carrying playback state changes
pub const PLAYING_NOTIFICATION_TYPE: &str = "playing";

/// Key holding the per-session entries in a playing notification
pub const PLAY_SESSION_STATE_KEY: &str = "PlaySessionStateNotification";

/// One playback-state change, extracted from an inbound notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackAlert {
    pub state: PlaybackState,
    pub session_key: u64,
    pub rating_key: u64,
    /// Position in milliseconds
    pub view_offset: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlaySessionState {
    state: String,
    #[serde(deserialize_with = "lenient_u64")]
    session_key: u64,
    #[serde(deserialize_with = "lenient_u64")]
    rating_key: u64,
    #[serde(deserialize_with = "lenient_u64")]
    view_offset: u64,
}

impl PlaybackAlert {
    /// Extract the playback alert from a notification.
    ///
    /// Returns `Ok(None)` for notifications that are not playback-state
    /// changes, and an error when a playback notification is malformed.
    pub fn from_notification(data: &Value) -> Result<Option<Self>> {
        if data.get("type").and_then(Value::as_str) != Some(PLAYING_NOTIFICATION_TYPE) {
            return Ok(None);
        }
        let Some(entries) = data.get(PLAY_SESSION_STATE_KEY) else {
            return Ok(None);
        };

        let first = entries
            .as_array()
            .and_then(|entries| entries.first())
            .ok_or_else(|| Error::Alert(format!("empty {}", PLAY_SESSION_STATE_KEY)))?;

        let raw = RawPlaySessionState::deserialize(first)
            .map_err(|e| Error::Alert(e.to_string()))?;

        Ok(Some(Self {
            state: raw.state.parse()?,
            session_key: raw.session_key,
            rating_key: raw.rating_key,
            view_offset: raw.view_offset,
        }))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Integer(u64),
    Float(f64),
    Text(String),
}

/// Accept `42`, `42.0` and `"42"` for integer fields.
///
/// Plex sends keys as strings in some payloads and numbers in others.
pub(crate) fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Integer(n) => Ok(n),
        NumberOrText::Float(f) if f >= 0.0 => Ok(f as u64),
        NumberOrText::Float(f) => Err(de::Error::custom(format!("negative number {}", f))),
        NumberOrText::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("expected an integer, got \"{}\"", s))),
    }
}

// ============================================
// Media items
// ============================================

/// Kind of media item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    Movie,
    Episode,
    Track,
    Other(String),
}

impl MediaKind {
    pub fn from_plex(kind: &str) -> Self {
        match kind {
            "movie" => MediaKind::Movie,
            "episode" => MediaKind::Episode,
            "track" => MediaKind::Track,
            other => MediaKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Episode => "episode",
            MediaKind::Track => "track",
            MediaKind::Other(other) => other,
        }
    }
}

impl Default for MediaKind {
    fn default() -> Self {
        MediaKind::Other(String::new())
    }
}

/// Metadata for the item being played, fetched per alert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaItem {
    pub kind: MediaKind,
    pub title: String,
    pub year: Option<i32>,
    /// Duration in milliseconds
    pub duration: u64,
    pub genres: Vec<String>,
    /// Show name for episodes, album artist for tracks
    pub grandparent_title: Option<String>,
    /// Season for episodes, album for tracks
    pub parent_title: Option<String>,
    /// Season number
    pub parent_index: Option<u32>,
    /// Episode or track number
    pub index: Option<u32>,
    /// Track artist when it differs from the album artist
    pub original_title: Option<String>,
    pub library_name: String,
}

// ============================================
// Sessions
// ============================================

/// A live playback session as listed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSession {
    pub session_key: u64,
    pub usernames: Vec<String>,
}

impl ServerSession {
    /// The user who owns the session
    pub fn username(&self) -> Option<&str> {
        self.usernames.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_playing_notification() {
        let data = json!({
            "type": "playing",
            "size": 1,
            "PlaySessionStateNotification": [{
                "sessionKey": "7",
                "guid": "",
                "ratingKey": "42",
                "url": "",
                "key": "/library/metadata/42",
                "viewOffset": 30000,
                "playQueueItemID": 1,
                "state": "paused"
            }]
        });

        let alert = PlaybackAlert::from_notification(&data).unwrap().unwrap();
        assert_eq!(
            alert,
            PlaybackAlert {
                state: PlaybackState::Paused,
                session_key: 7,
                rating_key: 42,
                view_offset: 30000,
            }
        );
    }

    #[test]
    fn test_other_notifications_are_skipped() {
        let timeline = json!({"type": "timeline", "TimelineEntry": []});
        assert!(PlaybackAlert::from_notification(&timeline).unwrap().is_none());

        let missing_key = json!({"type": "playing"});
        assert!(PlaybackAlert::from_notification(&missing_key).unwrap().is_none());
    }

    #[test]
    fn test_malformed_playing_notification_is_an_error() {
        let empty = json!({"type": "playing", "PlaySessionStateNotification": []});
        assert!(matches!(
            PlaybackAlert::from_notification(&empty),
            Err(Error::Alert(_))
        ));

        let bad_key = json!({"type": "playing", "PlaySessionStateNotification": [{
            "state": "playing", "sessionKey": "abc", "ratingKey": 1, "viewOffset": 0
        }]});
        assert!(PlaybackAlert::from_notification(&bad_key).is_err());

        let bad_state = json!({"type": "playing", "PlaySessionStateNotification": [{
            "state": "rewinding", "sessionKey": 1, "ratingKey": 1, "viewOffset": 0
        }]});
        assert!(PlaybackAlert::from_notification(&bad_state).is_err());
    }

    #[test]
    fn test_playback_state_names() {
        assert_eq!("buffering".parse::<PlaybackState>().unwrap(), PlaybackState::Buffering);
        assert_eq!(PlaybackState::Paused.label(), "Paused");
        assert_eq!(PlaybackState::Playing.to_string(), "playing");
    }

    #[test]
    fn test_media_kind_from_plex() {
        assert_eq!(MediaKind::from_plex("episode"), MediaKind::Episode);
        assert_eq!(MediaKind::from_plex("clip"), MediaKind::Other("clip".to_string()));
        assert_eq!(MediaKind::from_plex("clip").as_str(), "clip");
    }
}
