//! Port selection and host discovery.
//!
//! In cluster deployments the listen port is derived from a per-instance
//! file path: hashing the path gives every instance a stable, collision-
//! resistant port without central coordination, and the `host:port` pair is
//! written back to that file for peers to discover.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::net::TcpListener;

/// Hash probes before giving up on a path-derived port.
const MAX_PROBE_ATTEMPTS: u32 = 64;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("port {0} is unavailable")]
    Unavailable(u16),

    #[error("no free port found for {path} after {attempts} attempts")]
    Exhausted { path: PathBuf, attempts: u32 },

    #[error("failed to write host info file: {0}")]
    HostInfo(#[from] std::io::Error),
}

/// Strategy for picking the listen port.
#[async_trait]
pub trait PortAllocator: Send + Sync {
    async fn allocate(&self) -> Result<u16, PortError>;
}

/// Use a fixed, configured port.
pub struct FixedPort(pub u16);

#[async_trait]
impl PortAllocator for FixedPort {
    async fn allocate(&self) -> Result<u16, PortError> {
        if probe(self.0).await {
            Ok(self.0)
        } else {
            Err(PortError::Unavailable(self.0))
        }
    }
}

/// Derive the port from a file path hash, salting and retrying on
/// collision with an already-bound port.
pub struct PathHashAllocator {
    path: PathBuf,
}

impl PathHashAllocator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Hash `path + variation` into the non-privileged port range.
    fn candidate(&self, variation: u32) -> u16 {
        let mut hasher = Sha256::new();
        hasher.update(self.path.to_string_lossy().as_bytes());
        hasher.update(variation.to_string().as_bytes());
        let digest = hasher.finalize();
        let short = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        (1024 + short % (65_535 - 1024)) as u16
    }
}

#[async_trait]
impl PortAllocator for PathHashAllocator {
    async fn allocate(&self) -> Result<u16, PortError> {
        for variation in 0..MAX_PROBE_ATTEMPTS {
            let port = self.candidate(variation);
            if probe(port).await {
                if variation > 0 {
                    tracing::debug!(port, variation, "path-derived port found after retries");
                }
                return Ok(port);
            }
            tracing::debug!(port, variation, "path-derived port taken, salting");
        }
        Err(PortError::Exhausted {
            path: self.path.clone(),
            attempts: MAX_PROBE_ATTEMPTS,
        })
    }
}

/// Bind-probe: the only reliable availability check.
async fn probe(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await.is_ok()
}

/// Write `host:port` to the discovery file for cluster peers.
pub async fn write_host_info(path: &Path, port: u16) -> Result<(), PortError> {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string());
    let contents = format!("{host}:{port}");
    tokio::fs::write(path, &contents).await?;
    tracing::info!(path = %path.display(), contents = %contents, "wrote host info");
    Ok(())
}
