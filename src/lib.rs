//! # netsession - Asynchronous TCP Session Framework
//!
//! A substrate for packet-oriented TCP servers and clients: connection
//! lifecycle, length-prefixed framing, pooled buffers and a worker pool
//! driving every I/O completion.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                     WorkerPool (multi-thread tokio runtime)              │
//! │                                                                          │
//! │  ┌───────────┐  accept   ┌───────────────────────────────┐               │
//! │  │ Acceptor  │─────────► │ Session                       │               │
//! │  └───────────┘           │  recv buffer ─► FrameDecoder ─┼─► Dispatcher  │
//! │  ┌───────────┐  connect  │  send queue  ◄─ post_send ◄───┼── handlers    │
//! │  │ Connector │─────────► │                               │               │
//! │  └───────────┘           └──────────────┬────────────────┘               │
//! │                                         │ acquire / recycle              │
//! │                          ┌──────────────▼────────────────┐               │
//! │                          │ BufferPool (size classes)     │               │
//! │                          └───────────────────────────────┘               │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//!
//! Every packet is a 4-byte header followed by its payload:
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────────────┐
//! │ size: u16 LE │ id: u16 LE   │ payload (size - 4)   │
//! └──────────────┴──────────────┴──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use netsession::{Acceptor, AcceptorConfig, BufferPool, Dispatcher, NoopHooks, PoolConfig};
//! use std::sync::Arc;
//!
//! fn main() -> anyhow::Result<()> {
//!     let pool = BufferPool::with_warm_start(PoolConfig::default());
//!
//!     let dispatcher = Dispatcher::new().with(1000, |session, packet| {
//!         session.post_send(packet.as_bytes())?;
//!         Ok(())
//!     });
//!
//!     let acceptor = Acceptor::bind(
//!         AcceptorConfig::new("127.0.0.1:9000".parse()?, 4),
//!         pool,
//!         Arc::new(dispatcher),
//!         Arc::new(NoopHooks),
//!     )?;
//!
//!     acceptor.wait();
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`buffer`]: size-class buffer pool and pooled, reference-counted buffers
//! - [`protocol`]: packet header and the receive-side framing state machine
//! - [`dispatch`]: packet id to handler routing
//! - [`session`]: per-connection state, receive and send tasks, lifecycle hooks
//! - [`net`]: acceptor, connector and worker pool
//! - [`config`]: construction-time settings

pub mod buffer;
pub mod config;
pub mod dispatch;
pub mod net;
pub mod protocol;
pub mod session;
pub mod shutdown;

// Re-export commonly used types for convenience
pub use buffer::{BufferError, BufferPool, BufferReader, PoolConfig, PooledBuffer, SharedBuffer};
pub use config::{AcceptorConfig, ConnectorConfig, SessionConfig};
pub use dispatch::{DispatchError, Dispatcher, PacketHandler};
pub use net::{Acceptor, Connector, WorkerPool};
pub use protocol::{encode_packet, FrameDecoder, FrameError, Packet, PacketHeader, HEADER_SIZE};
pub use session::{NoopHooks, Session, SessionError, SessionHooks, SessionState};
pub use shutdown::Shutdown;

/// Version of netsession
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
