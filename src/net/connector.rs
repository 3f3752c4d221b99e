//! Client side: one outbound session with its own worker pool.

use super::workers::WorkerPool;
use crate::buffer::BufferPool;
use crate::config::ConnectorConfig;
use crate::dispatch::Dispatcher;
use crate::session::{Session, SessionContext, SessionError, SessionHooks};
use crate::shutdown::Shutdown;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct Connector {
    workers: WorkerPool,
    session: Session,
}

impl Connector {
    /// Starts the worker pool and builds an unbound session.
    pub fn new(
        config: ConnectorConfig,
        pool: BufferPool,
        dispatcher: Arc<Dispatcher>,
        hooks: Arc<dyn SessionHooks>,
    ) -> io::Result<Self> {
        let workers = WorkerPool::start(config.workers)?;
        let ctx = SessionContext::new(pool, dispatcher)
            .with_hooks(hooks)
            .with_config(config.session);

        Ok(Self {
            workers,
            session: Session::new(ctx),
        })
    }

    /// Connects and blocks until the session is open or the attempt failed.
    ///
    /// A failed attempt leaves the session unbound, so it can be retried.
    ///
    /// # Panics
    ///
    /// Panics if called from inside an async context.
    pub fn connect(&self, addr: SocketAddr) -> Result<(), SessionError> {
        let session = self.session.clone();
        self.workers
            .handle()
            .block_on(async move { session.connect(addr).await })
    }

    /// Starts connecting and returns immediately. Success is reported
    /// through [`SessionHooks::on_connect`] and the returned handle.
    pub fn async_connect(&self, addr: SocketAddr) -> JoinHandle<Result<(), SessionError>> {
        let session = self.session.clone();
        self.workers
            .handle()
            .spawn(async move { session.connect(addr).await })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn handle(&self) -> &Handle {
        self.workers.handle()
    }

    pub fn stop_handle(&self) -> Shutdown {
        self.workers.stop_handle()
    }

    /// Closes the session and stops the worker pool.
    pub fn stop(&self) -> bool {
        self.session.close();
        self.workers.stop()
    }

    /// Blocks until stopped, then joins the workers.
    pub fn wait(self) {
        self.workers.wait();
    }
}
