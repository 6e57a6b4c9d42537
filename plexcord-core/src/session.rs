//! Session ownership checks
//!
//! A server owner receives alerts for every user's playback. When the
//! listener has owner access it looks the session up in the live session list
//! and only follows sessions belonging to the configured user.

use crate::error::Result;
use crate::media::ServerSession;
use crate::server::MediaServer;

/// Result of looking up who owns a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ownership {
    /// Listener has no owner access; every session is assumed to be ours
    Unchecked,
    /// Session belongs to the target user
    Matched,
    /// Session belongs to someone else
    ForeignUser(String),
    /// Session key not present in the session list
    NotFound,
    /// Server reported no sessions at all
    NoSessions,
}

impl Ownership {
    /// Whether the alert should be processed further
    pub fn is_accepted(&self) -> bool {
        matches!(self, Ownership::Unchecked | Ownership::Matched)
    }
}

/// Decides whether a session belongs to the user being listened for.
#[derive(Debug, Clone)]
pub struct SessionResolver {
    elevated: bool,
    listen_for_user: String,
}

impl SessionResolver {
    pub fn new(elevated: bool, listen_for_user: impl Into<String>) -> Self {
        Self {
            elevated,
            listen_for_user: listen_for_user.into(),
        }
    }

    pub fn listen_for_user(&self) -> &str {
        &self.listen_for_user
    }

    pub fn is_elevated(&self) -> bool {
        self.elevated
    }

    /// Check `session_key` against the server's live sessions.
    ///
    /// Without owner access the session list is not fetched.
    pub async fn resolve(&self, server: &dyn MediaServer, session_key: u64) -> Result<Ownership> {
        if !self.elevated {
            return Ok(Ownership::Unchecked);
        }

        tracing::debug!(session_key, "Searching sessions for session key");
        let sessions = server.sessions().await?;
        Ok(self.match_sessions(&sessions, session_key))
    }

    /// Find `session_key` in `sessions` and compare its user.
    pub fn match_sessions(&self, sessions: &[ServerSession], session_key: u64) -> Ownership {
        if sessions.is_empty() {
            return Ownership::NoSessions;
        }

        for session in sessions {
            tracing::debug!(
                session_key = session.session_key,
                usernames = ?session.usernames,
                "Listed session"
            );
            if session.session_key != session_key {
                continue;
            }

            let username = session.username().unwrap_or_default();
            if username.to_lowercase() == self.listen_for_user.to_lowercase() {
                return Ownership::Matched;
            }
            return Ownership::ForeignUser(username.to_string());
        }

        Ownership::NotFound
    }
}
