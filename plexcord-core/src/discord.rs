//! Discord Rich Presence over the local IPC socket
//!
//! The Discord client listens on `discord-ipc-{0..9}` in the runtime or temp
//! directory. Every frame is a little-endian `u32` opcode, a little-endian
//! `u32` payload length and a JSON payload. A session starts with a
//! handshake naming the application's client id; closing the socket clears
//! the activity.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::activity::Activity;
use crate::error::{Error, Result};
use crate::presence::PresencePublisher;

/// Discord application id for Plex presence
pub const CLIENT_ID: &str = "413407336082833418";

/// Socket names are probed from `discord-ipc-0` up to this index
const MAX_SOCKET_INDEX: u8 = 10;

/// Largest frame we accept from Discord
const MAX_FRAME_LEN: usize = 64 * 1024;

const RPC_VERSION: u32 = 1;

/// How long Discord gets to answer a handshake or a command
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Frame opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Opcode {
    Handshake = 0,
    Frame = 1,
    Close = 2,
    Ping = 3,
    Pong = 4,
}

impl Opcode {
    fn from_u32(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Opcode::Handshake),
            1 => Ok(Opcode::Frame),
            2 => Ok(Opcode::Close),
            3 => Ok(Opcode::Ping),
            4 => Ok(Opcode::Pong),
            other => Err(Error::Presence(format!("unknown opcode {}", other))),
        }
    }
}

/// Write one frame
pub async fn write_frame<W>(writer: &mut W, opcode: Opcode, payload: &Value) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(payload)?;
    let mut frame = Vec::with_capacity(8 + body.len());
    frame.extend_from_slice(&(opcode as u32).to_le_bytes());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame
pub async fn read_frame<R>(reader: &mut R) -> Result<(Opcode, Value)>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 8];
    reader.read_exact(&mut header).await?;
    let opcode = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;

    if len > MAX_FRAME_LEN {
        return Err(Error::Presence(format!("frame too large ({} bytes)", len)));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    let payload = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)?
    };
    Ok((Opcode::from_u32(opcode)?, payload))
}

/// Directories that may hold the Discord IPC socket, in probe order
pub fn default_socket_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    for var in ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"] {
        if let Some(dir) = std::env::var_os(var) {
            let dir = PathBuf::from(dir);
            // Flatpak and Snap builds of Discord nest their socket
            dirs.push(dir.join("app/com.discordapp.Discord"));
            dirs.push(dir.join("snap.discord"));
            dirs.push(dir);
        }
    }
    dirs.push(PathBuf::from("/tmp"));
    dirs
}

fn close_message(payload: &Value) -> String {
    payload
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("connection closed by Discord")
        .to_string()
}

/// [`PresencePublisher`] backed by the Discord desktop client
pub struct DiscordIpc {
    client_id: String,
    socket_dirs: Vec<PathBuf>,
    response_timeout: Duration,
    stream: Option<UnixStream>,
}

impl DiscordIpc {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self::with_socket_dirs(client_id, default_socket_dirs())
    }

    pub fn with_socket_dirs(client_id: impl Into<String>, socket_dirs: Vec<PathBuf>) -> Self {
        Self {
            client_id: client_id.into(),
            socket_dirs,
            response_timeout: RESPONSE_TIMEOUT,
            stream: None,
        }
    }

    /// Override how long to wait for Discord's answers
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Fail the exchange if Discord accepts the socket but stays silent
    async fn within_timeout<T>(
        &self,
        exchange: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.response_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Presence(format!(
                "Discord did not answer the {} within {:?}",
                exchange, self.response_timeout
            ))),
        }
    }

    async fn open_socket(&self) -> Result<(UnixStream, PathBuf)> {
        for dir in &self.socket_dirs {
            for index in 0..MAX_SOCKET_INDEX {
                let path = dir.join(format!("discord-ipc-{}", index));
                if !path.exists() {
                    continue;
                }
                match UnixStream::connect(&path).await {
                    Ok(stream) => return Ok((stream, path)),
                    Err(e) => {
                        tracing::debug!(path = %path.display(), error = %e, "Discord socket refused");
                    }
                }
            }
        }
        Err(Error::Presence("Discord IPC socket not found".to_string()))
    }

    /// Send a command frame and wait for its response
    async fn request(stream: &mut UnixStream, payload: &Value) -> Result<Value> {
        write_frame(stream, Opcode::Frame, payload).await?;
        loop {
            match read_frame(stream).await? {
                (Opcode::Close, payload) => return Err(Error::Presence(close_message(&payload))),
                (Opcode::Ping, payload) => write_frame(stream, Opcode::Pong, &payload).await?,
                (_, payload) => return Ok(payload),
            }
        }
    }
}

#[async_trait]
impl PresencePublisher for DiscordIpc {
    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        let (mut stream, path) = self.open_socket().await?;

        let handshake = json!({ "v": RPC_VERSION, "client_id": self.client_id });
        let reply = self
            .within_timeout("handshake", async {
                write_frame(&mut stream, Opcode::Handshake, &handshake).await?;
                read_frame(&mut stream).await
            })
            .await?;

        match reply {
            (Opcode::Close, payload) => Err(Error::Presence(close_message(&payload))),
            (_, payload) => {
                tracing::info!(
                    socket = %path.display(),
                    user = ?payload.pointer("/data/user/username"),
                    "Connected to Discord"
                );
                self.stream = Some(stream);
                Ok(())
            }
        }
    }

    async fn set_activity(&mut self, activity: &Activity) -> Result<()> {
        let payload = json!({
            "cmd": "SET_ACTIVITY",
            "args": {
                "pid": std::process::id(),
                "activity": activity,
            },
            "nonce": uuid::Uuid::new_v4().to_string(),
        });

        let Some(mut stream) = self.stream.take() else {
            return Err(Error::Presence("not connected".to_string()));
        };
        let response = self
            .within_timeout("SET_ACTIVITY command", Self::request(&mut stream, &payload))
            .await?;
        // A failed or unanswered exchange leaves the stream dropped
        self.stream = Some(stream);

        if response.get("evt").and_then(Value::as_str) == Some("ERROR") {
            return Err(Error::Presence(format!(
                "SET_ACTIVITY rejected: {}",
                response
                    .pointer("/data/message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
            )));
        }

        tracing::debug!(details = %activity.details, state = %activity.state, "Activity updated");
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = write_frame(&mut stream, Opcode::Close, &json!({})).await;
            let _ = stream.shutdown().await;
            tracing::info!("Disconnected from Discord");
        }
    }
}
