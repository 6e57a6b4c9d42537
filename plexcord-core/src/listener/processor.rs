//! Per-alert processing

use serde_json::Value;

use super::AlertListener;
use crate::activity::ActivityMapper;
use crate::config::LibraryFilter;
use crate::debounce::Verdict;
use crate::error::{Error, Result};
use crate::media::{MediaKind, PlaybackAlert};
use crate::session::Ownership;

/// How an alert was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Not a playback-state notification
    NotPlayback,
    /// Item's library is excluded by the server's filters
    Filtered(LibraryFilter),
    /// Unchanged heartbeat for the tracked session
    Repeat,
    /// The tracked session stopped; presence cleared
    Stopped,
    /// Stop for a session we are not tracking
    ForeignStop,
    /// Session does not belong to the listened-for user
    NotOwned(Ownership),
    /// Tracked, but the media kind has no presence representation
    Unsupported(MediaKind),
    /// Tracked, but the presence channel could not be opened or updated
    PublisherUnavailable,
    /// Presence updated
    Published,
}

impl AlertListener {
    /// Run one notification through filtering, debouncing, ownership and
    /// mapping, then publish.
    ///
    /// State changes made before a failing step are kept; nothing after it
    /// happens.
    pub(crate) async fn process_alert(&mut self, data: &Value) -> Result<Disposition> {
        let Some(alert) = PlaybackAlert::from_notification(data)? else {
            return Ok(Disposition::NotPlayback);
        };
        let server = self
            .server
            .clone()
            .ok_or_else(|| Error::Transport("not connected".to_string()))?;

        tracing::debug!(
            state = %alert.state,
            session_key = alert.session_key,
            rating_key = alert.rating_key,
            view_offset = alert.view_offset,
            "Received alert"
        );

        let item = server.fetch_item(alert.rating_key).await?;
        match self.settings.server.library_filter(&item.library_name) {
            LibraryFilter::Allowed => {}
            filter => {
                tracing::debug!(library = %item.library_name, ?filter, "Ignoring alert from filtered library");
                return Ok(Disposition::Filtered(filter));
            }
        }

        if self.tracker.is_tracking(&alert) {
            self.timers.update.cancel();
        }
        match self.tracker.observe(&alert) {
            Verdict::Repeat => {
                tracing::debug!(
                    ignore_count = self.tracker.ignore_count(),
                    "Ignoring repeated alert"
                );
                self.arm_update_timer();
                return Ok(Disposition::Repeat);
            }
            Verdict::Stop => {
                tracing::debug!(session_key = alert.session_key, "Session stopped");
                self.publisher.disconnect().await;
                return Ok(Disposition::Stopped);
            }
            Verdict::ForeignStop => {
                tracing::debug!(session_key = alert.session_key, "Ignoring stop for untracked session");
                return Ok(Disposition::ForeignStop);
            }
            Verdict::Transition | Verdict::New => {}
        }

        let ownership = self
            .resolver
            .resolve(server.as_ref(), alert.session_key)
            .await?;
        if !ownership.is_accepted() {
            tracing::debug!(?ownership, session_key = alert.session_key, "Ignoring session");
            return Ok(Disposition::NotOwned(ownership));
        }

        self.arm_update_timer();
        self.tracker.accept(&alert);

        let use_remaining_time = self.config.snapshot().display.use_remaining_time;
        let mapper = ActivityMapper::new(self.settings.images_url.clone(), use_remaining_time);
        let now = chrono::Utc::now().timestamp();
        let Some(activity) = mapper.map(&item, alert.state, alert.view_offset, now) else {
            tracing::debug!(kind = item.kind.as_str(), "Unsupported media type");
            return Ok(Disposition::Unsupported(item.kind));
        };

        if !self.publisher.is_connected() {
            if let Err(e) = self.publisher.connect().await {
                tracing::warn!(error = %e, "Failed to connect to presence channel");
                return Ok(Disposition::PublisherUnavailable);
            }
        }

        tracing::debug!(details = %activity.details, state = %activity.state, "Updating presence");
        if let Err(e) = self.publisher.set_activity(&activity).await {
            tracing::warn!(error = %e, "Failed to update presence");
            return Ok(Disposition::PublisherUnavailable);
        }
        Ok(Disposition::Published)
    }
}
