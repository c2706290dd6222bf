//! Listens on a configured TCP port; spawns one independent session per
//! accepted connection.
use crate::error::Result;
use crate::registry::Registry;
use crate::session::{self, SessionConfig};
use crate::workdir::ensure_base_dir;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

pub struct Acceptor {
    listener: TcpListener,
    registry: Arc<Registry>,
    config: Arc<SessionConfig>,
}

impl Acceptor {
    /// Binds `addr` and ensures the workdir base directory exists. The
    /// latter failure is fatal to the process, per the error design: a
    /// broken deployment should fail fast rather than fail per-connection.
    pub async fn bind(
        addr: SocketAddr,
        registry: Registry,
        config: SessionConfig,
    ) -> Result<Self> {
        ensure_base_dir(&config.workdir_base).await?;
        let listener = TcpListener::bind(addr).await?;
        Ok(Acceptor {
            listener,
            registry: Arc::new(registry),
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever, driving each on its own task so that one
    /// session's blocked I/O never stalls another's.
    pub async fn serve(self) -> Result<()> {
        let mut next_id: u64 = 0;
        loop {
            let (socket, peer) = self.listener.accept().await?;
            next_id += 1;
            let session_id = next_id;
            let registry = self.registry.clone();
            let config = self.config.clone();
            let peer_label = format!("{}#{}", peer, session_id);
            tokio::spawn(async move {
                info!(%peer_label, "session accepted");
                if let Err(e) = session::serve(socket, registry, config, peer_label.clone()).await
                {
                    error!(%peer_label, error = %e, kind = ?e.kind(), "session ended with error");
                }
            });
        }
    }
}
