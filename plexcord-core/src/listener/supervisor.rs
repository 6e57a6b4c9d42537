//! Connection lifecycle: connect with retry, teardown, liveness probing

use futures::StreamExt;

use super::{AlertListener, ConnectionState, ListenerEvent, RETRY_DELAY};
use crate::error::{Error, Result};
use crate::server::{AlertStream, PRODUCT_NAME};
use crate::session::SessionResolver;

impl AlertListener {
    /// Connect, retrying transient failures every [`RETRY_DELAY`].
    ///
    /// Returns `Ok(true)` once connected and `Ok(false)` if shutdown was
    /// requested first. A fatal error (the server does not exist) is
    /// returned without retrying.
    pub(crate) async fn connect(&mut self) -> Result<bool> {
        let shutdown = self.shutdown.clone();
        loop {
            if shutdown.is_cancelled() {
                return Ok(false);
            }

            self.set_state(ConnectionState::Connecting);
            match self.try_connect().await {
                Ok(()) => {
                    self.set_state(ConnectionState::Connected);
                    return Ok(true);
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!(error = %e, "Failed to connect to server");
                    return Err(e);
                }
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    tracing::error!(
                        error = %e,
                        "Failed to connect to server. Reconnecting in {} seconds",
                        RETRY_DELAY.as_secs()
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(false),
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                }
            }
        }
    }

    async fn try_connect(&mut self) -> Result<()> {
        let server_config = &self.settings.server;

        let username = self.directory.username().await?;
        tracing::info!(username = %username, "Signed in");
        let listen_for_user = server_config
            .listen_for_user
            .clone()
            .unwrap_or(username);

        let resources = self.directory.resources().await?;
        let resource = resources
            .iter()
            .find(|r| r.matches(&server_config.name))
            .ok_or_else(|| Error::ResourceNotFound {
                product: PRODUCT_NAME.to_string(),
                name: server_config.name.clone(),
            })?;

        tracing::info!("Connecting to {} \"{}\"", PRODUCT_NAME, resource.name);
        let server = self.directory.connect(resource).await?;
        let elevated = server.is_owner().await;
        let alerts = server.alerts().await?;
        tracing::info!(
            elevated,
            "Connected to {} \"{}\"",
            PRODUCT_NAME,
            server.name()
        );

        self.resolver = SessionResolver::new(elevated, listen_for_user);
        self.server = Some(server);
        self.start_pump(alerts);
        self.arm_connection_timer();

        tracing::info!(
            "Listening for alerts from user \"{}\"",
            self.resolver.listen_for_user()
        );
        Ok(())
    }

    /// Forward the notification stream into the event channel under a new
    /// epoch.
    fn start_pump(&mut self, mut alerts: AlertStream) {
        self.epoch = self.epoch.wrapping_add(1);
        let epoch = self.epoch;
        let events = self.events.clone();

        self.pump = Some(tokio::spawn(async move {
            while let Some(item) = alerts.next().await {
                let event = match item {
                    Ok(data) => ListenerEvent::Alert { epoch, data },
                    Err(error) => ListenerEvent::TransportLost { epoch, error },
                };
                let lost = matches!(event, ListenerEvent::TransportLost { .. });
                if events.send(event).await.is_err() || lost {
                    return;
                }
            }
            let error = Error::Transport("alert stream ended".to_string());
            let _ = events
                .send(ListenerEvent::TransportLost { epoch, error })
                .await;
        }));
    }

    /// Tear everything down. Safe to call in any state.
    pub(crate) async fn disconnect(&mut self) {
        self.timers.cancel_all();
        self.publisher.disconnect().await;
        if let Some(pump) = self.pump.take() {
            pump.abort();
            tracing::info!("Stopped listening for alerts");
        }
        self.server = None;
        self.tracker.reset();
        self.epoch = self.epoch.wrapping_add(1);
        self.set_state(ConnectionState::Disconnected);
    }

    /// The only recovery path from a lost or dead connection.
    pub(crate) async fn reconnect(&mut self, error: Error) -> Result<()> {
        tracing::error!(error = %error, "Connection to server lost, reconnecting");
        self.disconnect().await;
        self.connect().await?;
        Ok(())
    }

    pub(crate) fn arm_connection_timer(&mut self) {
        self.timers
            .connection
            .arm(&self.events, ListenerEvent::ConnectionTimeout);
    }

    pub(crate) fn arm_update_timer(&mut self) {
        self.timers
            .update
            .arm(&self.events, ListenerEvent::UpdateTimeout);
    }

    /// Probe the server; reconnect if it does not answer.
    pub(crate) async fn on_connection_timeout(&mut self) -> Result<()> {
        let Some(server) = self.server.clone() else {
            return Ok(());
        };

        match server.probe().await {
            Ok(clients) => {
                tracing::debug!(clients, "Connection alive");
                self.arm_connection_timer();
                Ok(())
            }
            Err(e) => self.reconnect(e).await,
        }
    }

    /// No accepted alert for a while: the session is over.
    pub(crate) async fn on_update_timeout(&mut self) {
        if let Some(tracked) = self.tracker.tracked() {
            tracing::debug!(
                session_key = tracked.session_key,
                "No recent updates from session, clearing presence"
            );
        }
        self.publisher.disconnect().await;
        self.tracker.reset();
    }
}
