//! Lifecycle callbacks for concrete session kinds.
//!
//! The session core only ever sees `dyn SessionHooks`. All callbacks run on a
//! worker thread inside an I/O completion, so they must not block.

use crate::session::Session;
use std::net::SocketAddr;

pub trait SessionHooks: Send + Sync + 'static {
    /// The session is open: accepted, or an outbound connect succeeded.
    /// Runs before the first receive is posted.
    fn on_connect(&self, _session: &Session, _peer: SocketAddr) {}

    /// A receive completed and its packets were dispatched.
    fn on_receive(&self, _session: &Session, _bytes: usize) {}

    /// A send completed.
    fn on_write(&self, _session: &Session, _bytes: usize) {}

    /// The session closed. Called exactly once per opened session.
    fn on_close(&self, session: &Session);
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl SessionHooks for NoopHooks {
    fn on_close(&self, _session: &Session) {}
}
