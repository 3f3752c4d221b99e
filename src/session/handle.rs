//! The session core: one socket, one receive buffer, two I/O tasks.
//!
//! `start` splits the stream and spawns a receive task and a send task on
//! the current runtime. The receive task keeps exactly one read outstanding
//! into the pooled receive buffer, frames what arrived and dispatches each
//! packet before reading again. The send task drains a queue of
//! [`SharedBuffer`]s, holding each reference until its write completes.
//! Closing the session fires a signal both tasks select on; when both have
//! dropped their half, the socket is closed.

use super::hooks::{NoopHooks, SessionHooks};
use super::state::{AtomicSessionState, SessionState};
use super::stats::SessionStats;
use crate::buffer::{BufferError, BufferPool, PooledBuffer, SharedBuffer};
use crate::config::SessionConfig;
use crate::dispatch::Dispatcher;
use crate::protocol::{FrameDecoder, Packet, PacketError, PacketHeader};
use crate::shutdown::Shutdown;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error)]
pub enum SessionError {
    /// The session is closing or closed
    #[error("session is closed")]
    Closed,

    /// The session has no socket yet
    #[error("session is not connected")]
    NotConnected,

    /// The session is already connecting or open
    #[error("session is already connected")]
    AlreadyConnected,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("invalid packet: {0}")]
    InvalidPacket(#[from] PacketError),
}

/// Everything a session shares with its siblings.
#[derive(Clone)]
pub struct SessionContext {
    pool: BufferPool,
    dispatcher: Arc<Dispatcher>,
    hooks: Arc<dyn SessionHooks>,
    stats: Arc<SessionStats>,
    config: SessionConfig,
}

impl SessionContext {
    pub fn new(pool: BufferPool, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            pool,
            dispatcher,
            hooks: Arc::new(NoopHooks),
            stats: Arc::new(SessionStats::new()),
            config: SessionConfig::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn SessionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config.normalized();
        self
    }

    pub fn with_stats(mut self, stats: Arc<SessionStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn stats(&self) -> &Arc<SessionStats> {
        &self.stats
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("pool", &self.pool)
            .field("dispatcher", &self.dispatcher)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

struct Shared {
    id: u64,
    state: AtomicSessionState,
    ctx: SessionContext,
    /// Parked here between construction and `start`
    recv_buffer: Mutex<Option<PooledBuffer>>,
    send_tx: OnceLock<mpsc::UnboundedSender<SharedBuffer>>,
    peer: OnceLock<SocketAddr>,
    closed: Shutdown,
}

/// A cheaply clonable handle to one connection.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Creates an unbound session and acquires its receive buffer.
    pub fn new(ctx: SessionContext) -> Self {
        let recv_buffer = ctx.pool.acquire(ctx.config.recv_buffer_size);
        Self {
            shared: Arc::new(Shared {
                id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
                state: AtomicSessionState::new(SessionState::Unbound),
                ctx,
                recv_buffer: Mutex::new(Some(recv_buffer)),
                send_tx: OnceLock::new(),
                peer: OnceLock::new(),
                closed: Shutdown::new(),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.load()
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// The remote address, once the session has been started.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.peer.get().copied()
    }

    pub fn context(&self) -> &SessionContext {
        &self.shared.ctx
    }

    /// Connects to `addr` and starts the session.
    ///
    /// On failure the session returns to `Unbound` and may be connected
    /// again. Must run inside a Tokio runtime.
    pub async fn connect(&self, addr: SocketAddr) -> Result<(), SessionError> {
        self.shared
            .state
            .transition(SessionState::Unbound, SessionState::Connecting)
            .map_err(Self::state_error)?;

        debug!(session = self.id(), peer = %addr, "Connecting");

        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(e) => {
                // A close while connecting already moved us to Closed.
                let _ = self
                    .shared
                    .state
                    .transition(SessionState::Connecting, SessionState::Unbound);
                warn!(session = self.id(), peer = %addr, error = %e, "Connect failed");
                return Err(e.into());
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            trace!(session = self.id(), error = %e, "Failed to set TCP_NODELAY");
        }

        self.start(stream, addr)
    }

    /// Binds the session to an established stream and starts I/O.
    ///
    /// Valid from `Unbound` (accepted sockets) or `Connecting`. Calls
    /// [`SessionHooks::on_connect`] before the first receive is posted.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start<S>(&self, stream: S, peer: SocketAddr) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.shared.send_tx.set(tx).is_err() {
            return Err(SessionError::AlreadyConnected);
        }

        let state = &self.shared.state;
        state
            .transition(SessionState::Unbound, SessionState::Open)
            .or_else(|_| state.transition(SessionState::Connecting, SessionState::Open))
            .map_err(Self::state_error)?;

        let _ = self.shared.peer.set(peer);
        let ctx = &self.shared.ctx;
        let buffer = self
            .take_recv_buffer()
            .unwrap_or_else(|| ctx.pool.acquire(ctx.config.recv_buffer_size));

        ctx.stats.session_opened();
        info!(session = self.id(), peer = %peer, "Session opened");

        let (reader, writer) = tokio::io::split(stream);
        tokio::spawn(send_loop(self.clone(), writer, rx));
        ctx.hooks.on_connect(self, peer);
        tokio::spawn(receive_loop(self.clone(), reader, buffer));

        Ok(())
    }

    /// Copies `payload` into a pooled buffer and queues it for writing.
    ///
    /// `payload` must already carry its packet header. An empty payload is
    /// accepted and never written.
    pub fn post_send(&self, payload: &[u8]) -> Result<(), SessionError> {
        self.ensure_open()?;
        if payload.is_empty() {
            return Ok(());
        }

        let mut buffer = self.shared.ctx.pool.acquire(payload.len());
        buffer.write(payload)?;
        self.enqueue(buffer.freeze())
    }

    /// Queues an already built buffer. The same buffer may be posted to
    /// many sessions; it returns to the pool after the last write and the
    /// last caller handle are gone.
    pub fn post_send_buffer(&self, buffer: SharedBuffer) -> Result<(), SessionError> {
        self.ensure_open()?;
        if buffer.is_empty() {
            return Ok(());
        }
        self.enqueue(buffer)
    }

    /// Serializes a header for `packet_id` followed by `payload` and queues it.
    pub fn post_packet(&self, packet_id: u16, payload: &[u8]) -> Result<(), SessionError> {
        self.ensure_open()?;
        let header = PacketHeader::for_payload(packet_id, payload.len())?;

        let mut buffer = self.shared.ctx.pool.acquire(header.size as usize);
        buffer.write(&header.encode())?;
        buffer.write(payload)?;
        self.enqueue(buffer.freeze())
    }

    /// Closes the session. Returns `true` only for the call that closed it.
    ///
    /// Open sessions go through `Closing` to `Closed`, firing
    /// [`SessionHooks::on_close`] once. A session that is still connecting
    /// goes straight to `Closed`. Unbound and already closed sessions are
    /// left alone.
    pub fn close(&self) -> bool {
        let state = &self.shared.state;

        if state
            .transition(SessionState::Connecting, SessionState::Closed)
            .is_ok()
        {
            self.shared.closed.trigger();
            debug!(session = self.id(), "Connect abandoned");
            return true;
        }

        if state
            .transition(SessionState::Open, SessionState::Closing)
            .is_err()
        {
            return false;
        }

        self.shared.closed.trigger();
        let ctx = &self.shared.ctx;
        ctx.stats.session_closed();
        info!(session = self.id(), "Session closed");
        ctx.hooks.on_close(self);
        state.store(SessionState::Closed);
        true
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Open => Ok(()),
            SessionState::Unbound | SessionState::Connecting => Err(SessionError::NotConnected),
            SessionState::Closing | SessionState::Closed => Err(SessionError::Closed),
        }
    }

    fn enqueue(&self, buffer: SharedBuffer) -> Result<(), SessionError> {
        let tx = self
            .shared
            .send_tx
            .get()
            .ok_or(SessionError::NotConnected)?;
        tx.send(buffer).map_err(|_| SessionError::Closed)
    }

    fn take_recv_buffer(&self) -> Option<PooledBuffer> {
        self.shared
            .recv_buffer
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
    }

    fn dispatch(&self, packet: Packet<'_>) {
        // Packets already framed when a handler closed the session are dropped.
        if !self.is_open() {
            return;
        }

        let ctx = &self.shared.ctx;
        ctx.stats.packet_dispatched();
        trace!(
            session = self.id(),
            packet_id = packet.packet_id(),
            size = packet.as_bytes().len(),
            "Dispatching packet"
        );

        if let Err(e) = ctx.dispatcher.dispatch(self, packet) {
            ctx.stats.dispatch_failed();
            warn!(session = self.id(), error = %e, "Dispatch failed");
        }
    }

    fn state_error(observed: SessionState) -> SessionError {
        match observed {
            SessionState::Closing | SessionState::Closed => SessionError::Closed,
            _ => SessionError::AlreadyConnected,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("peer", &self.peer_addr())
            .finish()
    }
}

async fn receive_loop<R>(session: Session, mut reader: R, mut buffer: PooledBuffer)
where
    R: AsyncRead + Unpin,
{
    let ctx = session.context().clone();
    let capacity = ctx.config.recv_buffer_size.min(buffer.capacity());
    let mut decoder = FrameDecoder::new(capacity);
    let mut closed = session.shared.closed.listener();

    loop {
        let pending = decoder.pending();
        let result = tokio::select! {
            biased;
            _ = closed.wait() => break,
            result = reader.read(&mut buffer.storage_mut()[pending..capacity]) => result,
        };

        // A completion can land after another task closed the session.
        if !session.is_open() {
            break;
        }

        let received = match result {
            Ok(0) => {
                debug!(session = session.id(), "Peer closed connection");
                session.close();
                break;
            }
            Ok(n) => n,
            Err(e) => {
                warn!(session = session.id(), error = %e, "Receive failed");
                session.close();
                break;
            }
        };

        ctx.stats.bytes_read(received);
        trace!(session = session.id(), received, pending, "Receive completed");

        let framed = decoder.decode(&mut buffer.storage_mut()[..capacity], received, |packet| {
            session.dispatch(packet)
        });

        match framed {
            Ok(_) => ctx.hooks.on_receive(&session, received),
            Err(e) => {
                ctx.stats.protocol_error();
                warn!(session = session.id(), error = %e, "Protocol violation, closing session");
                session.close();
                break;
            }
        }
    }

    trace!(session = session.id(), "Receive loop finished");
}

async fn send_loop<W>(session: Session, mut writer: W, mut queue: mpsc::UnboundedReceiver<SharedBuffer>)
where
    W: AsyncWrite + Unpin,
{
    let ctx = session.context().clone();
    let mut closed = session.shared.closed.listener();

    loop {
        let buffer = tokio::select! {
            biased;
            _ = closed.wait() => break,
            next = queue.recv() => match next {
                Some(buffer) => buffer,
                None => break,
            },
        };

        let len = buffer.len();
        let result = tokio::select! {
            biased;
            _ = closed.wait() => break,
            result = writer.write_all(buffer.as_slice()) => result,
        };
        drop(buffer);

        match result {
            Ok(()) => {
                ctx.stats.bytes_written(len);
                trace!(session = session.id(), bytes = len, "Send completed");
                ctx.hooks.on_write(&session, len);
            }
            Err(e) if e.kind() == io::ErrorKind::WriteZero => {
                debug!(session = session.id(), "Peer stopped accepting writes");
                session.close();
                break;
            }
            Err(e) => {
                warn!(session = session.id(), error = %e, "Send failed");
                session.close();
                break;
            }
        }
    }

    let _ = writer.shutdown().await;
    trace!(session = session.id(), "Send loop finished");
}
