use std::io::ErrorKind;
use std::net::Shutdown;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use scriptbridge_frame::{Frame, FrameConfig, FrameError, FrameReader, FrameWriter};
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{ChannelMode, Transport, TransportEvent};

const MAX_NAME_LEN: usize = 64;
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(20);

#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

/// Where and how socket transports are opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketConfig {
    /// Directory holding `<name>.sock` endpoints.
    pub dir: PathBuf,
    /// How long a client keeps retrying while the server is not listening yet.
    pub connect_timeout: Duration,
    /// Permission bits applied to the socket file.
    pub socket_mode: u32,
    /// Frame limits for both directions.
    pub frame: FrameConfig,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir(),
            connect_timeout: Duration::from_secs(5),
            socket_mode: 0o600,
            frame: FrameConfig::default(),
        }
    }
}

/// A channel transport over one connected Unix domain socket.
///
/// A reader thread decodes inbound frames onto the event queue; sends are
/// written inline by the caller.
pub struct SocketTransport {
    writer: Mutex<FrameWriter<UnixStream>>,
    control: UnixStream,
    events: Receiver<TransportEvent>,
    closed: AtomicBool,
    peer_pid: Option<u32>,
    reader: Option<JoinHandle<()>>,
}

impl SocketTransport {
    /// Socket path used for channel `name`.
    pub fn socket_path(name: &str, config: &SocketConfig) -> Result<PathBuf> {
        let valid_chars = name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
        if name.is_empty() || name.len() > MAX_NAME_LEN || name.starts_with('.') || !valid_chars {
            return Err(TransportError::InvalidName(name.to_string()));
        }

        let path = config.dir.join(format!("{name}.sock"));
        let len = path.as_os_str().len();
        if len >= MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len,
                max: MAX_PATH_LEN,
            });
        }
        Ok(path)
    }

    /// Open channel `name`.
    ///
    /// A server binds `<dir>/<name>.sock`, accepts exactly one peer and then
    /// unlinks the path. A client retries until `connect_timeout` elapses.
    pub fn open(name: &str, mode: ChannelMode, config: &SocketConfig) -> Result<Self> {
        let path = Self::socket_path(name, config)?;
        let stream = match mode {
            ChannelMode::Server => accept_one(&path, config.socket_mode)?,
            ChannelMode::Client => connect_with_retry(&path, config.connect_timeout)?,
        };
        info!(channel = name, %mode, ?path, "socket transport connected");
        Self::from_stream(stream, config.frame)
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: UnixStream, frame: FrameConfig) -> Result<Self> {
        let reader_stream = stream.try_clone()?;
        let control = stream.try_clone()?;
        let peer_pid = peer_credentials(&stream).map(|(_, _, pid)| pid);

        let (tx, events) = unbounded();
        let _ = tx.send(TransportEvent::Connected);
        let reader = std::thread::Builder::new()
            .name("scriptbridge-reader".to_string())
            .spawn(move || read_loop(FrameReader::with_config(reader_stream, frame), tx))?;

        Ok(Self {
            writer: Mutex::new(FrameWriter::with_config(stream, frame)),
            control,
            events,
            closed: AtomicBool::new(false),
            peer_pid,
            reader: Some(reader),
        })
    }
}

impl Transport for SocketTransport {
    fn send(&self, frame: Frame) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let mut writer = self.writer.lock().map_err(|_| TransportError::Closed)?;
        writer.write_frame(&frame).map_err(|err| {
            warn!(route = frame.route, error = %err, "socket send failed");
            TransportError::from(err)
        })
    }

    fn events(&self) -> &Receiver<TransportEvent> {
        &self.events
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("socket transport closing");
            let _ = self.control.shutdown(Shutdown::Both);
        }
    }

    fn peer_pid(&self) -> Option<u32> {
        self.peer_pid
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.close();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl std::fmt::Debug for SocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketTransport")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .field("peer_pid", &self.peer_pid)
            .finish()
    }
}

fn read_loop(mut reader: FrameReader<UnixStream>, tx: Sender<TransportEvent>) {
    loop {
        let event = match reader.read_frame() {
            Ok(frame) => TransportEvent::Frame(frame),
            Err(FrameError::ConnectionClosed) => {
                TransportEvent::Error("peer disconnected".to_string())
            }
            Err(err) => TransportEvent::Error(err.to_string()),
        };
        let last = matches!(event, TransportEvent::Error(_));
        if tx.send(event).is_err() || last {
            debug!("socket reader exiting");
            return;
        }
    }
}

fn accept_one(path: &Path, mode: u32) -> Result<UnixStream> {
    if path.exists() {
        let metadata = std::fs::symlink_metadata(path).map_err(|source| TransportError::Bind {
            path: path.to_path_buf(),
            source,
        })?;
        if !metadata.file_type().is_socket() {
            return Err(TransportError::Bind {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                ),
            });
        }
        debug!(?path, "removing stale socket");
        std::fs::remove_file(path).map_err(|source| TransportError::Bind {
            path: path.to_path_buf(),
            source,
        })?;
    }

    let bind_err = |source| TransportError::Bind {
        path: path.to_path_buf(),
        source,
    };
    let listener = UnixListener::bind(path).map_err(bind_err)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(bind_err)?;
    let identity = std::fs::symlink_metadata(path)
        .map(|m| (m.dev(), m.ino()))
        .map_err(bind_err)?;
    debug!(?path, "waiting for peer");

    let accepted = listener.accept().map_err(TransportError::Accept);
    drop(listener);
    unlink_if_same(path, identity);
    let (stream, _addr) = accepted?;
    Ok(stream)
}

/// Remove `path` only if it is still the socket this process created.
fn unlink_if_same(path: &Path, (dev, ino): (u64, u64)) {
    match std::fs::symlink_metadata(path) {
        Ok(metadata)
            if metadata.file_type().is_socket()
                && metadata.dev() == dev
                && metadata.ino() == ino =>
        {
            let _ = std::fs::remove_file(path);
        }
        Ok(_) => debug!(?path, "socket path identity changed; leaving it in place"),
        Err(_) => {}
    }
}

fn connect_with_retry(path: &Path, timeout: Duration) -> Result<UnixStream> {
    let deadline = Instant::now() + timeout;
    loop {
        match UnixStream::connect(path) {
            Ok(stream) => return Ok(stream),
            Err(err)
                if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused)
                    && Instant::now() < deadline =>
            {
                std::thread::sleep(CONNECT_RETRY_INTERVAL);
            }
            Err(source) => {
                return Err(TransportError::Connect {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }
}

/// `(uid, gid, pid)` of the connected peer via `SO_PEERCRED`.
#[cfg(target_os = "linux")]
fn peer_credentials(stream: &UnixStream) -> Option<(u32, u32, u32)> {
    use std::os::fd::AsRawFd;

    let mut cred = libc::ucred {
        pid: 0,
        uid: 0,
        gid: 0,
    };
    let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

    // SAFETY: `cred` and `len` are valid writable pointers for the provided sizes,
    // and the descriptor belongs to a live Unix socket owned by `stream`.
    let rc = unsafe {
        libc::getsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            (&mut cred as *mut libc::ucred).cast::<libc::c_void>(),
            &mut len,
        )
    };

    if rc == 0 && len as usize == std::mem::size_of::<libc::ucred>() {
        Some((cred.uid, cred.gid, cred.pid as u32))
    } else {
        None
    }
}

#[cfg(not(target_os = "linux"))]
fn peer_credentials(_stream: &UnixStream) -> Option<(u32, u32, u32)> {
    None
}
