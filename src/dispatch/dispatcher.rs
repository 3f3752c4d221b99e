//! Packet-ID routing table.
//!
//! A [`Dispatcher`] is filled once at startup, wrapped in an `Arc`, and
//! shared read-only by every session. Handlers run synchronously on the
//! worker thread that completed the receive; a slow handler stalls that
//! worker for every other session it would have serviced.

use crate::protocol::Packet;
use crate::session::Session;
use std::collections::HashMap;
use thiserror::Error;

/// Why a packet could not be handled. Never fatal for the session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No handler registered for this packet id
    #[error("no handler registered for packet id {packet_id}")]
    UnknownPacket { packet_id: u16 },

    /// The handler reported failure
    #[error("handler for packet id {packet_id} failed: {reason}")]
    Handler { packet_id: u16, reason: String },
}

/// Handles one packet type.
///
/// Implemented for any `Fn(&Session, Packet<'_>) -> anyhow::Result<()>`.
pub trait PacketHandler: Send + Sync {
    fn handle(&self, session: &Session, packet: Packet<'_>) -> anyhow::Result<()>;
}

impl<F> PacketHandler for F
where
    F: Fn(&Session, Packet<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, session: &Session, packet: Packet<'_>) -> anyhow::Result<()> {
        self(session, packet)
    }
}

/// Maps packet ids to handlers.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<u16, Box<dyn PacketHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a closure for `packet_id`, replacing any previous handler.
    ///
    /// Returns `true` if a handler was replaced.
    pub fn register<F>(&mut self, packet_id: u16, handler: F) -> bool
    where
        F: Fn(&Session, Packet<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register_handler(packet_id, handler)
    }

    /// Registers any [`PacketHandler`] for `packet_id`.
    pub fn register_handler<H>(&mut self, packet_id: u16, handler: H) -> bool
    where
        H: PacketHandler + 'static,
    {
        self.handlers.insert(packet_id, Box::new(handler)).is_some()
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<F>(mut self, packet_id: u16, handler: F) -> Self
    where
        F: Fn(&Session, Packet<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(packet_id, handler);
        self
    }

    pub fn contains(&self, packet_id: u16) -> bool {
        self.handlers.contains_key(&packet_id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Routes `packet` to the handler registered for its id.
    pub fn dispatch(&self, session: &Session, packet: Packet<'_>) -> Result<(), DispatchError> {
        let packet_id = packet.packet_id();
        let handler = self
            .handlers
            .get(&packet_id)
            .ok_or(DispatchError::UnknownPacket { packet_id })?;

        handler
            .handle(session, packet)
            .map_err(|e| DispatchError::Handler {
                packet_id,
                reason: format!("{e:#}"),
            })
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.handlers.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("Dispatcher").field("packet_ids", &ids).finish()
    }
}
