//! Listener tasks that splice accepted clients to stdio or to each other.

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{broadcast, mpsc};

use crate::config::{Connection, ListenAddr, Peer, StubConfig};

const READY_LINE: &[u8] = b"Ready\n";
const PUMP_BUFSIZE: usize = 4096;

/// Bind every connection, announce readiness, and serve until SIGTERM/SIGINT.
pub async fn run(config: StubConfig, announce: bool) -> Result<()> {
    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    let mut terminate = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
    let mut interrupt = signal(SignalKind::interrupt()).context("install SIGINT handler")?;

    let mut bound = Vec::with_capacity(config.connections.len());
    for conn in config.connections {
        let accepter = bind(&conn.accepter).await?;
        let peer = match &conn.peer {
            Peer::Stdio => BoundPeer::Stdio,
            Peer::Tcp(addr) => BoundPeer::Tcp(bind(addr).await?),
        };
        tracing::info!(connection = %conn.name, accepter = %conn.accepter, "listening");
        bound.push((conn, accepter, peer));
    }

    let mut tasks = Vec::with_capacity(bound.len());
    for (conn, accepter, peer) in bound {
        let shutdown = shutdown_tx.subscribe();
        let Connection { name, .. } = conn;
        let task = match peer {
            BoundPeer::Stdio => {
                tokio::spawn(serve_stdio(name, accepter, spawn_stdin_reader(), shutdown))
            }
            BoundPeer::Tcp(other) => tokio::spawn(serve_pair(name, accepter, other, shutdown)),
        };
        tasks.push(task);
    }

    if announce {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(READY_LINE).await.context("write readiness line")?;
        stdout.flush().await.context("flush readiness line")?;
    }

    tokio::select! {
        _ = terminate.recv() => tracing::info!("received SIGTERM, shutting down"),
        _ = interrupt.recv() => tracing::info!("received SIGINT, shutting down"),
    }
    let _ = shutdown_tx.send(());

    for task in tasks {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(error = %format!("{err:#}"), "connection task failed"),
            Err(err) => tracing::error!(error = %err, "connection task panicked"),
        }
    }
    Ok(())
}

enum BoundPeer {
    Stdio,
    Tcp(TcpListener),
}

async fn bind(addr: &ListenAddr) -> Result<TcpListener> {
    TcpListener::bind((addr.host.as_str(), addr.port))
        .await
        .with_context(|| format!("bind {addr}"))
}

/// Reads stdin on its own task; the channel receive is cancel-safe where a
/// partially completed stdin read would not be.
fn spawn_stdin_reader() -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buf = vec![0u8; PUMP_BUFSIZE];
        loop {
            match stdin.read(&mut buf).await {
                Ok(0) => {
                    tracing::debug!("stdin closed");
                    break;
                }
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::debug!(error = %err, "stdin read failed");
                    break;
                }
            }
        }
    });
    rx
}

/// One client at a time: client bytes go to stdout, stdin bytes go to the client.
async fn serve_stdio(
    name: String,
    listener: TcpListener,
    mut input: mpsc::Receiver<Vec<u8>>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let mut stdin_open = true;
    let mut stdout = tokio::io::stdout();
    let mut buf = vec![0u8; PUMP_BUFSIZE];

    loop {
        let (stream, remote) = tokio::select! {
            _ = shutdown.recv() => return Ok(()),
            accepted = listener.accept() => accepted.with_context(|| format!("{name}: accept"))?,
        };
        tracing::debug!(connection = %name, %remote, "client connected to stdio bridge");
        let (mut reader, mut writer) = stream.into_split();

        loop {
            tokio::select! {
                _ = shutdown.recv() => return Ok(()),
                read = reader.read(&mut buf) => match read {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        stdout.write_all(&buf[..n]).await.context("write stdout")?;
                        stdout.flush().await.context("flush stdout")?;
                    }
                },
                chunk = input.recv(), if stdin_open => match chunk {
                    Some(chunk) => {
                        if writer.write_all(&chunk).await.is_err() {
                            break;
                        }
                    }
                    None => stdin_open = false,
                },
            }
        }
        tracing::debug!(connection = %name, %remote, "client left stdio bridge");
    }
}

/// Accept one client on each side, then splice them until either hangs up.
async fn serve_pair(
    name: String,
    left: TcpListener,
    right: TcpListener,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    loop {
        let (mut a, mut b) = tokio::select! {
            _ = shutdown.recv() => return Ok(()),
            pair = accept_both(&left, &right) => pair.with_context(|| format!("{name}: accept"))?,
        };
        tracing::debug!(connection = %name, "tcp pair connected");
        tokio::select! {
            _ = shutdown.recv() => return Ok(()),
            copied = tokio::io::copy_bidirectional(&mut a, &mut b) => match copied {
                Ok((ab, ba)) => tracing::debug!(connection = %name, ab, ba, "tcp pair finished"),
                Err(err) => tracing::debug!(connection = %name, error = %err, "tcp pair broke"),
            },
        }
    }
}

async fn accept_both(
    left: &TcpListener,
    right: &TcpListener,
) -> std::io::Result<(TcpStream, TcpStream)> {
    let (a, b) = tokio::try_join!(left.accept(), right.accept())?;
    Ok((a.0, b.0))
}
