//! Construction-time configuration.
//!
//! Every knob is fixed when the pool, acceptor, or connector is built; there
//! is no runtime reconfiguration.

use std::net::{Ipv4Addr, SocketAddr};

pub use crate::buffer::PoolConfig;
use crate::protocol::HEADER_SIZE;

/// Default receive buffer capacity per session (40 KiB). This is also the
/// largest packet a session will accept.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 40960;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 9000;

/// Per-session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Receive buffer capacity in bytes
    pub recv_buffer_size: usize,
}

impl SessionConfig {
    /// Builds a config; sizes below one header are raised to `HEADER_SIZE`.
    pub fn new(recv_buffer_size: usize) -> Self {
        Self { recv_buffer_size }.normalized()
    }

    /// A receive buffer smaller than a header could never hold a packet.
    pub(crate) fn normalized(self) -> Self {
        Self {
            recv_buffer_size: self.recv_buffer_size.max(HEADER_SIZE),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
        }
    }
}

/// Server-side settings.
#[derive(Debug, Clone)]
pub struct AcceptorConfig {
    /// Address to listen on; port 0 picks a free port
    pub listen: SocketAddr,
    /// Worker threads driving the completion loop (0 = one per CPU)
    pub workers: usize,
    pub session: SessionConfig,
}

impl Default for AcceptorConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            workers: 0,
            session: SessionConfig::default(),
        }
    }
}

impl AcceptorConfig {
    pub fn new(listen: SocketAddr, workers: usize) -> Self {
        Self {
            listen,
            workers,
            session: SessionConfig::default(),
        }
    }
}

/// Client-side settings.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Worker threads driving the completion loop (0 = one per CPU)
    pub workers: usize,
    pub session: SessionConfig,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            session: SessionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(SessionConfig::default().recv_buffer_size, 40960);

        let acceptor = AcceptorConfig::default();
        assert_eq!(acceptor.listen.port(), DEFAULT_PORT);
        assert_eq!(acceptor.workers, 0);

        assert_eq!(ConnectorConfig::default().workers, 1);
    }

    #[test]
    fn test_recv_buffer_at_least_one_header() {
        assert_eq!(SessionConfig::new(0).recv_buffer_size, HEADER_SIZE);
        assert_eq!(SessionConfig::new(2).recv_buffer_size, HEADER_SIZE);
        assert_eq!(SessionConfig::new(4096).recv_buffer_size, 4096);
    }

    #[test]
    fn test_default_recv_buffer_fits_largest_class() {
        let pool = PoolConfig::default();
        assert_eq!(pool.max_pooled_size(), DEFAULT_RECV_BUFFER_SIZE);
    }
}
