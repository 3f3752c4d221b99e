//! Socket ownership: the acceptor, the connector and the worker pool that
//! drives both.
//!
//! ```text
//!              ┌──────────── WorkerPool (tokio runtime, N threads) ───────────┐
//!              │                                                              │
//!  listener ─► │ Acceptor ── accept ──► Session ──► Session ──► ...           │
//!              │                                                              │
//!  remote   ◄─ │ Connector ─ connect ─► Session                               │
//!              └──────────────────────────────────────────────────────────────┘
//! ```

pub mod acceptor;
pub mod connector;
pub mod workers;

pub use acceptor::Acceptor;
pub use connector::Connector;
pub use workers::{clamp_threads, WorkerPool, MAX_WORKER_THREADS};
