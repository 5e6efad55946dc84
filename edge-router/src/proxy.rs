//! The forwarding data path.
//!
//! Accepts connections, optionally terminates TLS, and splices bytes to one
//! healthy target picked round-robin. With no healthy target, or with the
//! connection budget exhausted, the accepted socket is closed immediately;
//! nothing queues.

use crate::services::metrics::{record_connection, ACTIVE_CONNECTIONS};
use crate::targets::TargetGroup;
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ProxyServer {
    listener: TcpListener,
    group: Arc<TargetGroup>,
    tls: Option<TlsAcceptor>,
    backlog: Arc<Semaphore>,
}

impl ProxyServer {
    pub fn new(
        listener: TcpListener,
        group: Arc<TargetGroup>,
        tls: Option<TlsAcceptor>,
        max_connections: usize,
    ) -> Self {
        Self {
            listener,
            group,
            tls,
            backlog: Arc::new(Semaphore::new(max_connections.max(1))),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("proxy listener stopped");
                    break;
                }
                accepted = self.listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(error) => {
                            tracing::warn!(error = %error, "accept failed");
                            continue;
                        }
                    };

                    let permit = match self.backlog.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            record_connection("refused_backlog");
                            tracing::warn!(peer = %peer, "connection budget exhausted, refusing");
                            continue;
                        }
                    };

                    let target = match self.group.pick_healthy() {
                        Some(target) => target,
                        None => {
                            record_connection("refused_no_target");
                            tracing::debug!(peer = %peer, "no healthy target, refusing");
                            continue;
                        }
                    };

                    let tls = self.tls.clone();
                    let backend = target.addr();
                    tokio::spawn(async move {
                        let _permit = permit;
                        ACTIVE_CONNECTIONS.inc();
                        let result = forward(socket, backend, tls).await;
                        ACTIVE_CONNECTIONS.dec();

                        match result {
                            Ok(()) => record_connection("forwarded"),
                            Err(error) => {
                                record_connection("failed");
                                tracing::debug!(peer = %peer, backend = %backend, error = %error, "connection ended with error");
                            }
                        }
                    });
                }
            }
        }
    }
}

async fn forward(
    downstream: TcpStream,
    backend: SocketAddr,
    tls: Option<TlsAcceptor>,
) -> anyhow::Result<()> {
    let mut upstream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(backend))
        .await
        .with_context(|| format!("timed out connecting to target {backend}"))?
        .with_context(|| format!("connecting to target {backend}"))?;

    match tls {
        Some(acceptor) => {
            let mut downstream = acceptor
                .accept(downstream)
                .await
                .context("tls handshake failed")?;
            tokio::io::copy_bidirectional(&mut downstream, &mut upstream)
                .await
                .context("splice failed")?;
        }
        None => {
            let mut downstream = downstream;
            tokio::io::copy_bidirectional(&mut downstream, &mut upstream)
                .await
                .context("splice failed")?;
        }
    }

    Ok(())
}
