//! Server side: a listening socket feeding new sessions.
//!
//! The accept loop always has one accept outstanding. Before each accept it
//! builds the next [`Session`] (and so acquires its receive buffer); when a
//! connection arrives that session is started and a fresh one is built for
//! the next accept. Accept errors are logged and retried after a short
//! back-off, they never stop the loop.

use super::workers::WorkerPool;
use crate::buffer::BufferPool;
use crate::config::AcceptorConfig;
use crate::dispatch::Dispatcher;
use crate::session::{Session, SessionContext, SessionHooks, SessionStats};
use crate::shutdown::Shutdown;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tracing::{debug, error, info, trace, warn};

/// Pause before retrying a failed accept (e.g. out of file descriptors).
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug)]
pub struct Acceptor {
    workers: WorkerPool,
    local_addr: SocketAddr,
    accepted: Arc<AtomicU64>,
    stats: Arc<SessionStats>,
}

impl Acceptor {
    /// Starts the worker pool, binds `config.listen` and begins accepting.
    pub fn bind(
        config: AcceptorConfig,
        pool: BufferPool,
        dispatcher: Arc<Dispatcher>,
        hooks: Arc<dyn SessionHooks>,
    ) -> io::Result<Self> {
        let workers = WorkerPool::start(config.workers)?;

        let std_listener = std::net::TcpListener::bind(config.listen)?;
        std_listener.set_nonblocking(true)?;
        let local_addr = std_listener.local_addr()?;
        let listener = {
            let _guard = workers.handle().enter();
            TcpListener::from_std(std_listener)?
        };

        let stats = Arc::new(SessionStats::new());
        let ctx = SessionContext::new(pool, dispatcher)
            .with_hooks(hooks)
            .with_config(config.session)
            .with_stats(Arc::clone(&stats));
        let accepted = Arc::new(AtomicU64::new(0));

        workers.handle().spawn(accept_loop(
            listener,
            ctx,
            Arc::clone(&accepted),
            workers.stop_handle(),
        ));

        info!(addr = %local_addr, workers = workers.threads(), "Listening");

        Ok(Self {
            workers,
            local_addr,
            accepted,
            stats,
        })
    }

    /// The bound address; useful when listening on port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Counters shared by every accepted session.
    pub fn stats(&self) -> &Arc<SessionStats> {
        &self.stats
    }

    pub fn handle(&self) -> &Handle {
        self.workers.handle()
    }

    pub fn stop_handle(&self) -> Shutdown {
        self.workers.stop_handle()
    }

    /// Stops accepting. Sessions still running are dropped when the worker
    /// pool shuts down in [`wait`](Self::wait).
    pub fn stop(&self) -> bool {
        self.workers.stop()
    }

    /// Blocks until stopped, then joins the workers.
    pub fn wait(self) {
        self.workers.wait();
    }
}

async fn accept_loop(
    listener: TcpListener,
    ctx: SessionContext,
    accepted: Arc<AtomicU64>,
    stop: Shutdown,
) {
    let mut stopped = stop.listener();

    loop {
        let session = Session::new(ctx.clone());

        let (stream, peer) = loop {
            let result = tokio::select! {
                biased;
                _ = stopped.wait() => {
                    info!("Acceptor stopped");
                    return;
                }
                result = listener.accept() => result,
            };

            match result {
                Ok(connection) => break connection,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection, retrying");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        };

        let sequence = accepted.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(sequence, session = session.id(), peer = %peer, "Connection accepted");

        if let Err(e) = stream.set_nodelay(true) {
            trace!(session = session.id(), error = %e, "Failed to set TCP_NODELAY");
        }

        if let Err(e) = session.start(stream, peer) {
            warn!(session = session.id(), error = %e, "Failed to start session");
        }
    }
}
