//! Control server: Unix socket listener + per-client state + line framing.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::TryRecvError;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, error, info, warn};

use super::dispatch::{self, ControlContext, Session};

/// Longest accepted message line (64 KiB).
const MAX_LINE: usize = 65_536;

/// Maximum write buffer before dropping events (64 KiB).
const MAX_WRITE_BUFFER: usize = 65_536;

/// Read the peer UID of a Unix socket via SO_PEERCRED (Linux).
fn get_peer_uid(stream: &UnixStream) -> Option<u32> {
    #[cfg(target_os = "linux")]
    {
        let fd = stream.as_raw_fd();
        let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                &mut cred as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };
        if ret == 0 {
            Some(cred.uid)
        } else {
            None
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = stream.as_raw_fd();
        None
    }
}

/// Per-client connection state.
pub struct ControlClient {
    pub id: u64,
    stream: UnixStream,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
    session: Session,
}

impl ControlClient {
    fn new(stream: UnixStream, id: u64) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self {
            id,
            stream,
            read_buf: Vec::with_capacity(4096),
            write_buf: Vec::new(),
            session: Session::default(),
        })
    }

    /// Attempt to flush pending writes.
    fn flush_writes(&mut self) -> io::Result<()> {
        while !self.write_buf.is_empty() {
            match self.stream.write(&self.write_buf) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "write zero")),
                Ok(n) => {
                    self.write_buf.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn enqueue_line(&mut self, payload: &str) {
        self.write_buf.extend_from_slice(payload.as_bytes());
        self.write_buf.push(b'\n');
    }

    /// Enqueue an event, dropping it if the client is not keeping up.
    fn enqueue_event(&mut self, payload: &str) {
        if self.write_buf.len() > MAX_WRITE_BUFFER {
            warn!(client_id = self.id, "write buffer overflow, dropping event");
            return;
        }
        self.enqueue_line(payload);
    }

    /// Read whatever is available.  `Err` means the client is gone.
    fn fill(&mut self) -> io::Result<()> {
        let mut buf = [0u8; 4096];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::ConnectionReset, "eof")),
                Ok(n) => self.read_buf.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Split complete lines off the read buffer.  Blank lines are skipped.
    fn extract_lines(&mut self) -> io::Result<Vec<String>> {
        let mut lines = Vec::new();
        while let Some(pos) = self.read_buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.read_buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        if self.read_buf.len() > MAX_LINE {
            error!(client_id = self.id, len = self.read_buf.len(), "message exceeds maximum size");
            return Err(io::Error::new(io::ErrorKind::InvalidData, "line too long"));
        }
        Ok(lines)
    }

    /// Move queued bus events into the write buffer.
    fn drain_events(&mut self) {
        let mut closed = false;
        let mut pending = Vec::new();
        if let Some(rx) = &self.session.events {
            loop {
                match rx.try_recv() {
                    Ok(event) => pending.push(event.to_sexp()),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        closed = true;
                        break;
                    }
                }
            }
        }
        for event in pending {
            self.enqueue_event(&event);
        }
        if closed {
            self.session.events = None;
        }
    }
}

/// Control server owning the listener socket and all client connections.
pub struct ControlServer {
    pub socket_path: PathBuf,
    listener: UnixListener,
    clients: HashMap<u64, ControlClient>,
    next_client_id: u64,
    ctx: ControlContext,
    our_uid: u32,
}

impl ControlServer {
    /// Compute the default socket path.
    pub fn default_socket_path() -> PathBuf {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .unwrap_or_else(|_| format!("/tmp/asimov-{}", unsafe { libc::getuid() }));
        PathBuf::from(runtime_dir).join("asimov.sock")
    }

    /// Bind the listener socket, replacing a stale one.
    pub fn bind(socket_path: &Path, ctx: ControlContext) -> anyhow::Result<Self> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)
                .with_context(|| format!("removing stale socket {}", socket_path.display()))?;
        }

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("binding control socket {}", socket_path.display()))?;
        listener.set_nonblocking(true)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o700))?;
        }

        info!(?socket_path, "Control server listening");

        Ok(Self {
            socket_path: socket_path.to_path_buf(),
            listener,
            clients: HashMap::new(),
            next_client_id: 1,
            ctx,
            our_uid: unsafe { libc::getuid() },
        })
    }

    #[cfg(test)]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    fn accept_clients(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    let client_id = self.next_client_id;
                    self.next_client_id += 1;

                    if let Some(peer_uid) = get_peer_uid(&stream) {
                        if peer_uid != self.our_uid {
                            warn!(client_id, peer_uid, our_uid = self.our_uid, "rejecting client: UID mismatch");
                            continue;
                        }
                    }
                    match ControlClient::new(stream, client_id) {
                        Ok(client) => {
                            info!(client_id, "Control client connected");
                            self.clients.insert(client_id, client);
                        }
                        Err(e) => warn!(client_id, "failed to configure client socket: {}", e),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!("accept error: {}", e);
                    break;
                }
            }
        }
    }

    /// Accept new connections, dispatch complete messages, deliver events
    /// and flush writes.
    pub fn poll_once(&mut self) {
        self.accept_clients();

        let mut disconnected = Vec::new();
        for (&client_id, client) in self.clients.iter_mut() {
            let read_result = client.fill();

            match client.extract_lines() {
                Ok(lines) => {
                    for line in lines {
                        debug!(client_id, "<< {}", line);
                        let response =
                            dispatch::handle_message(&self.ctx, &mut client.session, client_id, &line);
                        debug!(client_id, ">> {}", response);
                        client.enqueue_line(&response);
                    }
                }
                Err(e) => {
                    debug!(client_id, "protocol error: {}", e);
                    disconnected.push(client_id);
                    continue;
                }
            }

            client.drain_events();

            if let Err(e) = client.flush_writes() {
                debug!(client_id, "write error: {}", e);
                disconnected.push(client_id);
                continue;
            }

            if let Err(e) = read_result {
                debug!(client_id, "client disconnected: {}", e);
                disconnected.push(client_id);
            }
        }

        for id in disconnected {
            info!(client_id = id, "Removing disconnected control client");
            self.clients.remove(&id);
        }
    }

    /// Poll until `shutdown` is raised.
    pub fn run(mut self, shutdown: Arc<AtomicBool>, poll_interval: Duration) {
        while !shutdown.load(Ordering::SeqCst) {
            self.poll_once();
            std::thread::sleep(poll_interval);
        }
        info!("Control server shutting down ({} client(s))", self.clients.len());
    }

    pub fn spawn(self, shutdown: Arc<AtomicBool>, poll_interval: Duration) -> anyhow::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("asimov-control".into())
            .spawn(move || self.run(shutdown, poll_interval))
            .context("spawning control server thread")
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::mode::{mode_cell, Mode, ModeReader};
    use crate::pipeline::StatusBoard;
    use std::io::{BufRead, BufReader};

    fn socket_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("asimov-test-{}-{}.sock", std::process::id(), name))
    }

    fn server(name: &str) -> (ControlServer, ModeReader, Arc<EventBus>) {
        let (writer, reader) = mode_cell(Mode::None);
        let bus = Arc::new(EventBus::new());
        let ctx = ControlContext {
            mode: writer,
            bus: Arc::clone(&bus),
            config_sexp: "()".to_string(),
            status: Arc::new(StatusBoard::new()),
        };
        (ControlServer::bind(&socket_path(name), ctx).unwrap(), reader, bus)
    }

    fn connect(server: &ControlServer) -> (UnixStream, BufReader<UnixStream>) {
        let stream = UnixStream::connect(&server.socket_path).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        (stream, reader)
    }

    fn read_line(reader: &mut BufReader<UnixStream>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        line
    }

    #[test]
    fn test_set_mode_over_socket() {
        let (mut server, mode, _bus) = server("set-mode");
        let (mut stream, mut reader) = connect(&server);
        stream
            .write_all(b"(:type :set-mode :id 1 :mode :center)\n(:type :mode-status :id 2)\n")
            .unwrap();
        server.poll_once();

        assert_eq!(read_line(&mut reader), "(:type :response :id 1 :status :ok)\n");
        assert_eq!(
            read_line(&mut reader),
            "(:type :response :id 2 :status :ok :mode :center)\n"
        );
        assert_eq!(mode.get(), Mode::Center);
        assert_eq!(server.client_count(), 1);
    }

    #[test]
    fn test_partial_line_waits() {
        let (mut server, mode, _bus) = server("partial");
        let (mut stream, mut reader) = connect(&server);
        stream.write_all(b"(:type :set-mode :id 1 ").unwrap();
        server.poll_once();
        assert_eq!(mode.get(), Mode::None);

        stream.write_all(b":mode :follow)\n").unwrap();
        server.poll_once();
        assert_eq!(read_line(&mut reader), "(:type :response :id 1 :status :ok)\n");
        assert_eq!(mode.get(), Mode::Follow);
    }

    #[test]
    fn test_subscriber_receives_events() {
        let (mut server, _mode, _bus) = server("subscribe");
        let (mut stream, mut reader) = connect(&server);
        stream.write_all(b"(:type :subscribe :id 1)\n").unwrap();
        server.poll_once();
        assert_eq!(read_line(&mut reader), "(:type :response :id 1 :status :ok)\n");

        stream.write_all(b"(:type :set-mode :id 2 :mode :follow)\n").unwrap();
        server.poll_once();
        assert_eq!(read_line(&mut reader), "(:type :response :id 2 :status :ok)\n");
        assert_eq!(
            read_line(&mut reader),
            "(:type :event :event :mode-changed :from :none :to :follow)\n"
        );
    }

    #[test]
    fn test_disconnect_removes_client() {
        let (mut server, _mode, _bus) = server("disconnect");
        let (stream, reader) = connect(&server);
        server.poll_once();
        assert_eq!(server.client_count(), 1);
        drop(reader);
        drop(stream);
        server.poll_once();
        assert_eq!(server.client_count(), 0);
    }

    #[test]
    fn test_socket_removed_on_drop() {
        let (server, _mode, _bus) = server("drop");
        let path = server.socket_path.clone();
        assert!(path.exists());
        drop(server);
        assert!(!path.exists());
    }
}
