//! Control socket plumbing
//!
//! Every subcommand except `run` is a short-lived client of the daemon's
//! Unix socket. Messages are length-prefixed JSON, one request per
//! connection.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::constants::ipc::{MAX_MESSAGE_SIZE, SOCKET_DIR, SOCKET_FILENAME};

mod messages;
pub use messages::{ControlRequest, ControlResponse, ProfileSummary};

/// Get default socket path (XDG_RUNTIME_DIR with fallback to cache)
pub fn default_socket_path() -> Result<PathBuf> {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return Ok(PathBuf::from(runtime_dir)
            .join(SOCKET_DIR)
            .join(SOCKET_FILENAME));
    }

    // Fallback to cache dir
    let cache = dirs::cache_dir()
        .context("Failed to determine cache directory (no XDG_RUNTIME_DIR or HOME)")?;
    Ok(cache.join(SOCKET_DIR).join(SOCKET_FILENAME))
}

/// Client connection to the daemon (used by the CLI subcommands)
pub struct ControlClient {
    stream: UnixStream,
}

impl ControlClient {
    /// Connect to the daemon's control socket
    pub fn connect() -> Result<Self> {
        let path = default_socket_path()?;
        Self::connect_to(&path)
    }

    /// Connect to specific socket path
    pub fn connect_to(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path).context(format!(
            "Failed to connect to daemon at {} (is it running?)",
            path.display()
        ))?;
        Ok(Self { stream })
    }

    /// Send one request and wait for the daemon's reply
    pub fn request(&mut self, req: &ControlRequest) -> Result<ControlResponse> {
        write_message(&mut self.stream, req)?;
        read_message(&mut self.stream)
    }
}

/// One accepted connection on the daemon side
pub struct ControlConnection {
    stream: UnixStream,
}

impl ControlConnection {
    /// Receive the client's request (blocking)
    fn recv_request(&mut self) -> Result<ControlRequest> {
        read_message(&mut self.stream)
    }

    /// Send the reply back to the client
    fn send_response(&mut self, resp: &ControlResponse) -> Result<()> {
        write_message(&mut self.stream, resp)
    }
}

/// Server listener owned by the daemon
pub struct ControlServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl ControlServer {
    /// Create server and bind to default socket path
    pub fn bind() -> Result<Self> {
        let socket_path = default_socket_path()?;
        Self::bind_to(socket_path)
    }

    /// Create server and bind to specific socket path
    pub fn bind_to(socket_path: PathBuf) -> Result<Self> {
        // Create directory if needed
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context(format!(
                "Failed to create socket directory: {}",
                parent.display()
            ))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))
                    .context("Failed to set socket directory permissions")?;
            }
        }

        // Remove stale socket if exists
        if socket_path.exists() {
            std::fs::remove_file(&socket_path).context(format!(
                "Failed to remove stale socket: {}",
                socket_path.display()
            ))?;
        }

        let listener = UnixListener::bind(&socket_path)
            .context(format!("Failed to bind socket at {}", socket_path.display()))?;

        // Set permissions to 0700 (owner only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o700))
                .context("Failed to set socket permissions")?;
        }

        Ok(Self {
            listener,
            socket_path,
        })
    }

    /// Accept incoming connection (blocking)
    pub fn accept(&self) -> Result<ControlConnection> {
        let (stream, _addr) = self
            .listener
            .accept()
            .context("Failed to accept control connection")?;
        Ok(ControlConnection { stream })
    }

    /// Get socket path
    pub fn path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        // Clean up socket file
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// A request forwarded to the main loop, paired with the channel its
/// reply must travel back on.
pub struct ControlCommand {
    pub request: ControlRequest,
    pub reply: mpsc::Sender<ControlResponse>,
}

/// Spawn the listener thread that feeds control requests into the main
/// loop. The reply is written back to the client only after the main
/// loop has applied the request, so a client observes its effect.
pub fn spawn_listener(
    server: ControlServer,
    command_tx: mpsc::Sender<ControlCommand>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        if let Err(e) = run_listener(&server, &command_tx) {
            error!(error = ?e, "control socket listener crashed");
        }
    })
}

fn run_listener(server: &ControlServer, command_tx: &mpsc::Sender<ControlCommand>) -> Result<()> {
    info!(socket = ?server.path(), "control socket listening");

    loop {
        // Accept connection (blocks until a CLI invocation connects)
        let mut connection = server.accept()?;

        // One request per connection
        let request = match connection.recv_request() {
            Ok(request) => request,
            Err(e) => {
                warn!(error = ?e, "control connection closed before a request arrived");
                continue;
            }
        };
        debug!(request = ?request, "control request received");

        let (reply_tx, reply_rx) = mpsc::channel();
        if command_tx
            .send(ControlCommand {
                request,
                reply: reply_tx,
            })
            .is_err()
        {
            // Main loop is gone; nothing left to serve.
            break Ok(());
        }

        match reply_rx.recv() {
            Ok(response) => {
                if let Err(e) = connection.send_response(&response) {
                    warn!(error = ?e, "failed to deliver control reply");
                }
            }
            Err(_) => break Ok(()),
        }
    }
}

/// Write length-prefixed message to stream
fn write_message<T: Serialize>(stream: &mut UnixStream, msg: &T) -> Result<()> {
    let json = serde_json::to_vec(msg).context("Failed to serialize message to JSON")?;

    // Write length prefix (u32 little-endian)
    let len = json.len() as u32;
    stream
        .write_all(&len.to_le_bytes())
        .context("Failed to write message length")?;

    // Write JSON payload
    stream
        .write_all(&json)
        .context("Failed to write message payload")?;

    stream.flush().context("Failed to flush stream")?;

    Ok(())
}

/// Read length-prefixed message from stream
fn read_message<T: for<'de> Deserialize<'de>>(stream: &mut UnixStream) -> Result<T> {
    // Read length prefix
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .context("Failed to read message length")?;
    let len = u32::from_le_bytes(len_buf) as usize;

    // Sanity check (prevent DoS via huge allocation)
    if len > MAX_MESSAGE_SIZE {
        return Err(anyhow!(
            "Message too large: {} bytes (max: {})",
            len,
            MAX_MESSAGE_SIZE
        ));
    }

    // Read JSON payload
    let mut json_buf = vec![0u8; len];
    stream
        .read_exact(&mut json_buf)
        .context("Failed to read message payload")?;

    // Deserialize
    serde_json::from_slice(&json_buf).context("Failed to deserialize message from JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::LogicalRect;

    #[test]
    fn default_path_lands_in_app_directory() {
        let path = default_socket_path().unwrap();
        assert!(path.ends_with("region-mirror/control.sock"));
    }

    #[test]
    fn request_round_trips_over_the_socket() {
        let dir = tempfile::TempDir::new().unwrap();
        let socket_path = dir.path().join("control.sock");
        let server = ControlServer::bind_to(socket_path.clone()).unwrap();

        let handle = std::thread::spawn(move || {
            let mut connection = server.accept().unwrap();
            let request = connection.recv_request().unwrap();
            let response = match request {
                ControlRequest::Enable(name) => ControlResponse::Error(name),
                _ => ControlResponse::Done,
            };
            connection.send_response(&response).unwrap();
        });

        let mut client = ControlClient::connect_to(&socket_path).unwrap();
        let response = client
            .request(&ControlRequest::Enable("mirror".into()))
            .unwrap();
        match response {
            ControlResponse::Error(name) => assert_eq!(name, "mirror"),
            other => panic!("unexpected response: {other:?}"),
        }
        handle.join().unwrap();
    }

    #[test]
    fn bind_replaces_stale_socket_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let socket_path = dir.path().join("control.sock");

        let first = ControlServer::bind_to(socket_path.clone()).unwrap();
        // Simulate a crashed daemon: the file outlives the listener.
        std::mem::forget(first);
        assert!(socket_path.exists());

        let second = ControlServer::bind_to(socket_path.clone()).unwrap();
        assert!(socket_path.exists());
        drop(second);
        assert!(!socket_path.exists());
    }

    #[test]
    fn oversized_message_is_rejected() {
        let (mut writer, mut reader) = UnixStream::pair().unwrap();
        let len = (MAX_MESSAGE_SIZE as u32 + 1).to_le_bytes();
        writer.write_all(&len).unwrap();
        writer.flush().unwrap();

        let result: Result<ControlRequest> = read_message(&mut reader);
        assert!(result.unwrap_err().to_string().contains("too large"));
    }

    #[test]
    fn listener_forwards_requests_and_replies() {
        let dir = tempfile::TempDir::new().unwrap();
        let socket_path = dir.path().join("control.sock");
        let server = ControlServer::bind_to(socket_path.clone()).unwrap();

        let (command_tx, command_rx) = mpsc::channel();
        let _listener = spawn_listener(server, command_tx);

        // Stand in for the main loop on a second thread.
        let main_loop = std::thread::spawn(move || {
            let command = command_rx.recv().unwrap();
            let summary = ProfileSummary {
                name: "mirror".into(),
                capture_area: LogicalRect::new(0, 0, 64, 64),
                active: true,
            };
            assert!(matches!(command.request, ControlRequest::List));
            command
                .reply
                .send(ControlResponse::Profiles(vec![summary]))
                .unwrap();
        });

        let mut client = ControlClient::connect_to(&socket_path).unwrap();
        let response = client.request(&ControlRequest::List).unwrap();
        match response {
            ControlResponse::Profiles(profiles) => {
                assert_eq!(profiles.len(), 1);
                assert_eq!(profiles[0].name, "mirror");
                assert!(profiles[0].active);
            }
            other => panic!("unexpected response: {other:?}"),
        }
        main_loop.join().unwrap();
    }
}
