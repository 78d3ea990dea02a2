//! POP3 listener and accept loop

use crate::config::ProxyConfig;
use crate::error::Result;
use crate::session::{Pop3Session, SessionOutcome};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// POP3 server: one bound TCP endpoint, one task per accepted
/// connection.
pub struct Pop3Server {
    listener: TcpListener,
    config: Arc<ProxyConfig>,
}

impl Pop3Server {
    /// Bind the configured listen address. Binding is separate from
    /// [`Pop3Server::run`] so callers can bind port 0 and read the
    /// assigned address first.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` when the address cannot be bound.
    pub async fn bind(config: ProxyConfig) -> Result<Self> {
        let listener =
            TcpListener::bind((config.listen_host.as_str(), config.listen_port)).await?;
        Ok(Self {
            listener,
            config: Arc::new(config),
        })
    }

    /// The address the server is listening on.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` when the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until stopped.
    ///
    /// Every connection runs on its own task, so one session's slow
    /// webmail calls never stall another's; sessions share no state.
    /// In serve-once mode the loop exits after the first session that
    /// completes QUIT. Session errors and plain disconnects only ever
    /// close their own connection.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` when accepting fails.
    pub async fn run(self) -> Result<()> {
        let addr = self.local_addr()?;
        info!(%addr, serve_once = self.config.serve_once, "POP3 proxy listening");

        let (quit_tx, mut quit_rx) = mpsc::channel::<()>(1);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    debug!(%peer, "accepted connection");
                    let config = Arc::clone(&self.config);
                    let quit_tx = self.config.serve_once.then(|| quit_tx.clone());
                    tokio::spawn(async move {
                        match Pop3Session::new(stream, config).run().await {
                            Ok(SessionOutcome::Quit) => {
                                if let Some(tx) = quit_tx {
                                    let _ = tx.send(()).await;
                                }
                            }
                            Ok(SessionOutcome::Disconnected) => {
                                debug!(%peer, "session ended without QUIT");
                            }
                            Err(e) => warn!(%peer, error = %e, "session failed"),
                        }
                    });
                }
                _ = quit_rx.recv() => {
                    info!("single session complete, stopping listener");
                    return Ok(());
                }
            }
        }
    }
}
