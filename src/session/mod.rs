//! Sessions: one connection each.
//!
//! ```text
//!                     ┌───────────── Session ─────────────┐
//!   socket ──read──►  │ receive buffer ─► FrameDecoder ─► │ ─► Dispatcher
//!                     │                                   │
//!   socket ◄─write──  │ send queue (SharedBuffer)  ◄───── │ ◄─ post_send / post_packet
//!                     └───────────────────────────────────┘
//! ```
//!
//! A [`Session`] is a clonable handle. The receive side keeps exactly one
//! read outstanding and frames every completion before reading again, so
//! dispatch within a session is strictly ordered. Handlers and
//! [`SessionHooks`] run inline on the worker that completed the read.

mod handle;
mod hooks;
mod state;
mod stats;

pub use handle::{Session, SessionContext, SessionError};
pub use hooks::{NoopHooks, SessionHooks};
pub use state::SessionState;
pub use stats::{SessionStats, SessionStatsSnapshot};
