//! Presence channel seam
//!
//! [`PresencePublisher`] is what the listener drives: connect lazily, push an
//! activity, disconnect when playback ends. [`crate::discord::DiscordIpc`]
//! is the production implementation.

use async_trait::async_trait;

use crate::activity::Activity;
use crate::error::Result;

#[async_trait]
pub trait PresencePublisher: Send {
    /// Whether an activity can be sent right now
    fn is_connected(&self) -> bool;

    /// Open the channel
    async fn connect(&mut self) -> Result<()>;

    /// Replace the shown activity
    async fn set_activity(&mut self, activity: &Activity) -> Result<()>;

    /// Close the channel, clearing the activity. Safe to call repeatedly.
    async fn disconnect(&mut self);
}
