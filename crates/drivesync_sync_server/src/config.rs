//! Server configuration.

use drivesync_core::Config;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 8080);

/// Configuration for the sync server.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Directory holding the file tree, spool and journal.
    pub storage_root: PathBuf,
    /// Key for signing share credentials.
    pub share_secret: Vec<u8>,
    /// Lifetime of an issued share credential.
    pub share_ttl: Duration,
    /// Bearer key required on sync endpoints, if set.
    pub sync_api_key: Option<String>,
    /// Largest accepted request body (one chunk).
    pub max_chunk_bytes: usize,
    /// How often abandoned uploads are swept (zero disables).
    pub sweep_interval: Duration,
    /// Whether share cookies carry the `Secure` attribute.
    pub cookie_secure: bool,
    /// Engine configuration.
    pub core: Config,
}

impl ServerConfig {
    /// Creates a configuration for a storage root and share signing key.
    pub fn new(storage_root: impl Into<PathBuf>, share_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            bind_addr: SocketAddr::from(DEFAULT_BIND_ADDR),
            storage_root: storage_root.into(),
            share_secret: share_secret.into(),
            share_ttl: Duration::from_secs(8 * 60 * 60),
            sync_api_key: None,
            max_chunk_bytes: 64 * 1024 * 1024,
            sweep_interval: Duration::from_secs(60 * 60),
            cookie_secure: false,
            core: Config::default(),
        }
    }

    /// Sets the listen address.
    #[must_use]
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Sets the share credential lifetime.
    #[must_use]
    pub fn with_share_ttl(mut self, ttl: Duration) -> Self {
        self.share_ttl = ttl;
        self
    }

    /// Requires `Authorization: Bearer <key>` on sync endpoints.
    #[must_use]
    pub fn with_sync_api_key(mut self, key: impl Into<String>) -> Self {
        self.sync_api_key = Some(key.into());
        self
    }

    /// Sets the request body limit.
    #[must_use]
    pub fn with_max_chunk_bytes(mut self, bytes: usize) -> Self {
        self.max_chunk_bytes = bytes;
        self
    }

    /// Sets the sweep interval.
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Marks share cookies `Secure`.
    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    /// Replaces the engine configuration.
    #[must_use]
    pub fn with_core(mut self, core: Config) -> Self {
        self.core = core;
        self
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("storage_root", &self.storage_root)
            .field("share_secret", &"<redacted>")
            .field("share_ttl", &self.share_ttl)
            .field("sync_api_key", &self.sync_api_key.as_ref().map(|_| "<redacted>"))
            .field("max_chunk_bytes", &self.max_chunk_bytes)
            .field("sweep_interval", &self.sweep_interval)
            .field("cookie_secure", &self.cookie_secure)
            .field("core", &self.core)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::new("/srv/drive", b"secret".to_vec());
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.share_ttl, Duration::from_secs(28_800));
        assert_eq!(config.max_chunk_bytes, 64 * 1024 * 1024);
        assert!(config.sync_api_key.is_none());
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("/srv/drive", "secret")
            .with_bind_addr("0.0.0.0:9000".parse().unwrap())
            .with_sync_api_key("k")
            .with_sweep_interval(Duration::ZERO)
            .with_cookie_secure(true);

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.sync_api_key.as_deref(), Some("k"));
        assert!(config.sweep_interval.is_zero());
        assert!(config.cookie_secure);
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = ServerConfig::new("/srv", "topsecret").with_sync_api_key("apikey");
        let shown = format!("{config:?}");
        assert!(!shown.contains("topsecret"));
        assert!(!shown.contains("apikey"));
    }
}
