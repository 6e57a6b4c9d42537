//! In-memory transport doubles for listener tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::activity::Activity;
use crate::error::{Error, Result};
use crate::media::{MediaItem, MediaKind, ServerSession};
use crate::presence::PresencePublisher;
use crate::server::{AlertStream, MediaServer, Resource, ServerDirectory, PRODUCT_NAME};

/// Playback notification as the server sends it
pub(crate) fn playing(state: &str, session_key: u64, rating_key: u64, view_offset: u64) -> Value {
    json!({
        "type": "playing",
        "size": 1,
        "PlaySessionStateNotification": [{
            "sessionKey": session_key.to_string(),
            "ratingKey": rating_key.to_string(),
            "state": state,
            "viewOffset": view_offset,
        }]
    })
}

pub(crate) fn episode(library: &str) -> MediaItem {
    MediaItem {
        kind: MediaKind::Episode,
        title: "Ep Title".to_string(),
        duration: 1_320_000,
        grandparent_title: Some("Show".to_string()),
        parent_index: Some(2),
        index: Some(5),
        library_name: library.to_string(),
        ..MediaItem::default()
    }
}

#[derive(Default)]
pub(crate) struct MockServer {
    owner: bool,
    items: Mutex<HashMap<u64, MediaItem>>,
    sessions: Mutex<Vec<ServerSession>>,
    probe_fails: AtomicBool,
    alerts: Mutex<Option<mpsc::UnboundedSender<Result<Value>>>>,
    pub session_requests: AtomicUsize,
    pub probes: AtomicUsize,
}

impl MockServer {
    pub fn new(owner: bool) -> Self {
        Self {
            owner,
            ..Self::default()
        }
    }

    pub fn add_item(&self, rating_key: u64, item: MediaItem) {
        self.items.lock().unwrap().insert(rating_key, item);
    }

    pub fn add_session(&self, session_key: u64, username: &str) {
        self.sessions.lock().unwrap().push(ServerSession {
            session_key,
            usernames: vec![username.to_string()],
        });
    }

    pub fn fail_probes(&self, fail: bool) {
        self.probe_fails.store(fail, Ordering::SeqCst);
    }

    /// Send a notification on the current alert stream
    pub fn push(&self, data: Value) -> bool {
        match self.alerts.lock().unwrap().as_ref() {
            Some(tx) => tx.send(Ok(data)).is_ok(),
            None => false,
        }
    }

    /// End the current alert stream
    pub fn close_alerts(&self) {
        self.alerts.lock().unwrap().take();
    }
}

#[async_trait]
impl MediaServer for MockServer {
    fn name(&self) -> &str {
        "Home"
    }

    async fn is_owner(&self) -> bool {
        self.owner
    }

    async fn fetch_item(&self, rating_key: u64) -> Result<MediaItem> {
        self.items
            .lock()
            .unwrap()
            .get(&rating_key)
            .cloned()
            .ok_or_else(|| Error::Plex(format!("API error (404 Not Found): {}", rating_key)))
    }

    async fn sessions(&self) -> Result<Vec<ServerSession>> {
        self.session_requests.fetch_add(1, Ordering::SeqCst);
        Ok(self.sessions.lock().unwrap().clone())
    }

    async fn probe(&self) -> Result<usize> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.probe_fails.load(Ordering::SeqCst) {
            Err(Error::Transport("probe failed".to_string()))
        } else {
            Ok(1)
        }
    }

    async fn alerts(&self) -> Result<AlertStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.alerts.lock().unwrap() = Some(tx);
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(stream.boxed())
    }
}

pub(crate) struct MockDirectory {
    server: Arc<MockServer>,
    resources: Vec<Resource>,
    failures_left: AtomicUsize,
    pub connects: AtomicUsize,
}

impl MockDirectory {
    /// Directory listing one media server named "Home"
    pub fn new(server: Arc<MockServer>) -> Self {
        Self {
            server,
            resources: vec![Resource {
                name: "Home".to_string(),
                product: PRODUCT_NAME.to_string(),
                access_token: None,
                connections: vec![],
            }],
            failures_left: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
        }
    }

    /// Fail the next `count` connection attempts
    pub fn failing(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl ServerDirectory for MockDirectory {
    async fn username(&self) -> Result<String> {
        Ok("alice".to_string())
    }

    async fn resources(&self) -> Result<Vec<Resource>> {
        Ok(self.resources.clone())
    }

    async fn connect(&self, _resource: &Resource) -> Result<Arc<dyn MediaServer>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(Error::Plex("no reachable connection".to_string()));
        }
        let server: Arc<dyn MediaServer> = self.server.clone();
        Ok(server)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PresenceCall {
    Connect,
    SetActivity(Activity),
    Disconnect,
}

/// Shared record of publisher calls
#[derive(Debug, Clone, Default)]
pub(crate) struct PresenceLog(Arc<Mutex<Vec<PresenceCall>>>);

impl PresenceLog {
    pub fn calls(&self) -> Vec<PresenceCall> {
        self.0.lock().unwrap().clone()
    }

    pub fn activities(&self) -> Vec<Activity> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PresenceCall::SetActivity(activity) => Some(activity),
                _ => None,
            })
            .collect()
    }

    pub fn disconnects(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == PresenceCall::Disconnect)
            .count()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    fn record(&self, call: PresenceCall) {
        self.0.lock().unwrap().push(call);
    }
}

pub(crate) struct MockPublisher {
    log: PresenceLog,
    connected: bool,
    refuse: Arc<AtomicBool>,
    reject_activity: Arc<AtomicBool>,
}

impl MockPublisher {
    pub fn new(log: PresenceLog) -> Self {
        Self {
            log,
            connected: false,
            refuse: Arc::new(AtomicBool::new(false)),
            reject_activity: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that makes `connect` fail while set
    pub fn refuse_handle(&self) -> Arc<AtomicBool> {
        self.refuse.clone()
    }

    /// Flag that makes `set_activity` fail while set
    pub fn reject_activity_handle(&self) -> Arc<AtomicBool> {
        self.reject_activity.clone()
    }
}

#[async_trait]
impl PresencePublisher for MockPublisher {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<()> {
        self.log.record(PresenceCall::Connect);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::Presence("Discord IPC socket not found".to_string()));
        }
        self.connected = true;
        Ok(())
    }

    async fn set_activity(&mut self, activity: &Activity) -> Result<()> {
        self.log.record(PresenceCall::SetActivity(activity.clone()));
        if self.reject_activity.load(Ordering::SeqCst) {
            return Err(Error::Presence("SET_ACTIVITY rejected: bad activity".to_string()));
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.log.record(PresenceCall::Disconnect);
        self.connected = false;
    }
}
