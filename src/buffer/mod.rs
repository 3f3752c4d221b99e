//! Buffer Management Module
//!
//! Pooled, fixed-capacity byte buffers shared between sessions, the I/O
//! layer, and packet handlers.
//!
//! ## Architecture
//!
//! ```text
//!        acquire(n)                       freeze()
//! BufferPool ──────────► PooledBuffer ──────────────► SharedBuffer
//!     ▲                   (unique, writable)           (refcounted, read-only)
//!     │                        │                             │
//!     │        drop            │      last release           │
//!     └────────────────────────┴─────────────────────────────┘
//!                  zeroed, pushed back onto its size class
//! ```
//!
//! ## Example
//!
//! ```
//! use netsession::buffer::{BufferPool, PoolConfig};
//!
//! let pool = BufferPool::new(PoolConfig::default());
//! let mut buf = pool.acquire(12);
//! buf.write(b"hello").unwrap();
//!
//! let shared = buf.freeze();
//! let in_flight = shared.retain();
//! assert!(!shared.release());
//! assert!(in_flight.release()); // recycled here
//! ```

pub mod pool;
pub mod pooled;

pub use pool::{BufferPool, PoolConfig, PoolStats};
pub use pooled::{BufferError, BufferReader, PooledBuffer, SharedBuffer};
