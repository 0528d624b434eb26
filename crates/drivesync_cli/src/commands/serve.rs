//! Serve command implementation.

use drivesync_core::Config;
use drivesync_sync_server::{ServerConfig, SyncServer};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Options of `drivesync serve`.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Storage root.
    pub root: PathBuf,
    /// Listen address.
    pub bind: SocketAddr,
    /// Share signing key.
    pub share_secret: String,
    /// Bearer key for sync clients.
    pub api_key: Option<String>,
    /// Share credential lifetime in hours.
    pub share_ttl_hours: u64,
    /// Request body limit in MiB.
    pub max_chunk_mb: usize,
    /// Chunk size suggested to clients in MiB.
    pub chunk_size_mb: u32,
    /// Sweep interval in seconds, 0 disables.
    pub sweep_interval_secs: u64,
    /// Mark share cookies `Secure`.
    pub cookie_secure: bool,
}

/// Translates command-line options into a server configuration.
pub fn build_config(opts: &ServeOptions) -> ServerConfig {
    let mut config = ServerConfig::new(&opts.root, opts.share_secret.as_bytes().to_vec())
        .with_bind_addr(opts.bind)
        .with_share_ttl(Duration::from_secs(opts.share_ttl_hours * 60 * 60))
        .with_max_chunk_bytes(opts.max_chunk_mb.saturating_mul(1024 * 1024))
        .with_sweep_interval(Duration::from_secs(opts.sweep_interval_secs))
        .with_cookie_secure(opts.cookie_secure)
        .with_core(Config::new().suggested_chunk_size_mb(opts.chunk_size_mb));
    if let Some(key) = &opts.api_key {
        config = config.with_sync_api_key(key.clone());
    }
    config
}

/// Runs the server until Ctrl-C.
pub fn run(opts: &ServeOptions) -> Result<(), Box<dyn std::error::Error>> {
    if opts.api_key.is_none() {
        tracing::warn!("no sync api key configured; sync endpoints are unauthenticated");
    }
    let server = SyncServer::new(build_config(opts))?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server.serve())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_map_onto_config() {
        let opts = ServeOptions {
            root: PathBuf::from("/srv/drive"),
            bind: "0.0.0.0:9000".parse().unwrap(),
            share_secret: "s3cret".into(),
            api_key: Some("key".into()),
            share_ttl_hours: 2,
            max_chunk_mb: 8,
            chunk_size_mb: 4,
            sweep_interval_secs: 0,
            cookie_secure: true,
        };
        let config = build_config(&opts);
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.share_secret, b"s3cret");
        assert_eq!(config.sync_api_key.as_deref(), Some("key"));
        assert_eq!(config.share_ttl, Duration::from_secs(7200));
        assert_eq!(config.max_chunk_bytes, 8 * 1024 * 1024);
        assert_eq!(config.core.suggested_chunk_size_mb, 4);
        assert!(config.sweep_interval.is_zero());
        assert!(config.cookie_secure);
    }
}
