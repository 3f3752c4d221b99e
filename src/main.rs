//! netsession demo: an echo server and a client that pings it.
//!
//! ```text
//! netsession server --listen 127.0.0.1:9000 --workers 4
//! netsession client --connect 127.0.0.1:9000 --count 1000
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use netsession::config::{AcceptorConfig, ConnectorConfig, SessionConfig, DEFAULT_RECV_BUFFER_SIZE};
use netsession::{Acceptor, BufferPool, Connector, Dispatcher, NoopHooks, PoolConfig, Shutdown};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Echo packet ids and their payload sizes.
const ECHO_PACKETS: [(u16, usize); 3] = [(1000, 8), (1001, 128), (1002, 1024)];

#[derive(Parser, Debug)]
#[command(name = "netsession")]
#[command(version)]
#[command(about = "Echo server and client over the netsession packet framework", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Receive buffer size per session, also the largest accepted packet
    #[arg(long, default_value_t = DEFAULT_RECV_BUFFER_SIZE, global = true)]
    recv_buffer: usize,

    /// Buffers pre-allocated per pool size class
    #[arg(long, default_value_t = 32, global = true)]
    warm: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the echo server
    Server {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:9000")]
        listen: SocketAddr,

        /// Worker threads (0 = one per CPU)
        #[arg(short, long, default_value_t = 0)]
        workers: usize,
    },
    /// Connect to an echo server and send packets
    Client {
        /// Server address
        #[arg(short, long, default_value = "127.0.0.1:9000")]
        connect: SocketAddr,

        /// Number of echo packets to send
        #[arg(short = 'n', long, default_value_t = 10)]
        count: u64,

        /// Worker threads
        #[arg(short, long, default_value_t = 1)]
        workers: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let pool = BufferPool::with_warm_start(PoolConfig {
        warm_count: cli.warm,
        ..PoolConfig::default()
    });
    let session = SessionConfig {
        recv_buffer_size: cli.recv_buffer,
    };

    info!(version = netsession::VERSION, "Starting netsession");

    let result = match cli.command {
        Command::Server { listen, workers } => run_server(pool.clone(), session, listen, workers),
        Command::Client {
            connect,
            count,
            workers,
        } => run_client(pool.clone(), session, connect, count, workers),
    };

    let stats = pool.stats();
    info!(
        allocations = stats.allocations,
        reuses = stats.reuses,
        recycled = stats.recycled,
        "Buffer pool"
    );
    pool.drain();

    result
}

fn run_server(
    pool: BufferPool,
    session: SessionConfig,
    listen: SocketAddr,
    workers: usize,
) -> anyhow::Result<()> {
    let mut dispatcher = Dispatcher::new();
    for (packet_id, _) in ECHO_PACKETS {
        dispatcher.register(packet_id, |session, packet| {
            session
                .post_send(packet.as_bytes())
                .context("echo failed")?;
            Ok(())
        });
    }

    let acceptor = Acceptor::bind(
        AcceptorConfig {
            listen,
            workers,
            session,
        },
        pool,
        Arc::new(dispatcher),
        Arc::new(NoopHooks),
    )
    .with_context(|| format!("failed to listen on {listen}"))?;

    info!(addr = %acceptor.local_addr(), "Echo server ready, press Ctrl+C to stop");
    stop_on_ctrl_c(acceptor.handle(), acceptor.stop_handle());

    let stats = Arc::clone(acceptor.stats());
    let accepted = acceptor.accepted();
    acceptor.wait();

    let snapshot = stats.snapshot();
    info!(
        accepted,
        packets = snapshot.packets_dispatched,
        bytes_read = snapshot.bytes_read,
        bytes_written = snapshot.bytes_written,
        "Server shutdown complete"
    );
    Ok(())
}

fn run_client(
    pool: BufferPool,
    session: SessionConfig,
    connect: SocketAddr,
    count: u64,
    workers: usize,
) -> anyhow::Result<()> {
    let received = Arc::new(AtomicU64::new(0));
    let (done_tx, done_rx) = mpsc::channel();

    let mut dispatcher = Dispatcher::new();
    for (packet_id, size) in ECHO_PACKETS {
        let received = Arc::clone(&received);
        let done_tx = done_tx.clone();
        dispatcher.register(packet_id, move |_, packet| {
            anyhow::ensure!(
                packet.payload().len() == size,
                "echo {packet_id} carried {} bytes, expected {size}",
                packet.payload().len()
            );
            if received.fetch_add(1, Ordering::Relaxed) + 1 == count {
                let _ = done_tx.send(());
            }
            Ok(())
        });
    }
    drop(done_tx);

    let connector = Connector::new(
        ConnectorConfig { workers, session },
        pool,
        Arc::new(dispatcher),
        Arc::new(NoopHooks),
    )?;
    stop_on_ctrl_c(connector.handle(), connector.stop_handle());

    connector
        .connect(connect)
        .with_context(|| format!("failed to connect to {connect}"))?;

    let started = Instant::now();
    for i in 0..count {
        let (packet_id, size) = ECHO_PACKETS[(i % ECHO_PACKETS.len() as u64) as usize];
        let payload = vec![b'A' + (i % 26) as u8; size];
        connector.session().post_packet(packet_id, &payload)?;
    }

    if count > 0 && done_rx.recv_timeout(Duration::from_secs(30)).is_err() {
        warn!(
            received = received.load(Ordering::Relaxed),
            expected = count,
            "Timed out waiting for echoes"
        );
    }

    info!(
        sent = count,
        received = received.load(Ordering::Relaxed),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Client finished"
    );

    connector.stop();
    connector.wait();
    Ok(())
}

/// Fires `stop` on Ctrl+C.
fn stop_on_ctrl_c(handle: &Handle, stop: Shutdown) {
    handle.spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        info!("Shutdown signal received, stopping...");
        stop.trigger();
    });
}
