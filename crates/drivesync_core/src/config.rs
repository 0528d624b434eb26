//! Engine configuration.

use std::time::Duration;

/// Configuration for a [`Drive`](crate::Drive).
#[derive(Debug, Clone)]
pub struct Config {
    /// Chunk size hint returned by upload init, in MiB.
    pub suggested_chunk_size_mb: u32,

    /// Device ids longer than this are truncated, in characters.
    pub max_device_id_len: usize,

    /// Device labels longer than this are truncated, in characters.
    pub max_device_label_len: usize,

    /// Upload sessions idle for longer than this are swept.
    pub session_max_age: Duration,

    /// Change page size used when the client sends no usable limit.
    pub changes_default_limit: usize,

    /// Upper bound on a change page.
    pub changes_max_limit: usize,

    /// Whether to fsync the metadata journal on every commit.
    pub sync_on_commit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            suggested_chunk_size_mb: 32,
            max_device_id_len: 128,
            max_device_label_len: 64,
            session_max_age: Duration::from_secs(24 * 60 * 60),
            changes_default_limit: 500,
            changes_max_limit: 2000,
            sync_on_commit: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the suggested chunk size.
    #[must_use]
    pub const fn suggested_chunk_size_mb(mut self, mb: u32) -> Self {
        self.suggested_chunk_size_mb = mb;
        self
    }

    /// Sets the device id length cap.
    #[must_use]
    pub const fn max_device_id_len(mut self, len: usize) -> Self {
        self.max_device_id_len = len;
        self
    }

    /// Sets the device label length cap.
    #[must_use]
    pub const fn max_device_label_len(mut self, len: usize) -> Self {
        self.max_device_label_len = len;
        self
    }

    /// Sets the idle age after which upload sessions are swept.
    #[must_use]
    pub const fn session_max_age(mut self, age: Duration) -> Self {
        self.session_max_age = age;
        self
    }

    /// Sets the default and maximum change page sizes.
    #[must_use]
    pub const fn changes_limits(mut self, default: usize, max: usize) -> Self {
        self.changes_default_limit = default;
        self.changes_max_limit = max;
        self
    }

    /// Sets whether to sync the journal on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Clamps a client-supplied page size.
    ///
    /// Missing or non-positive values fall back to the default; anything
    /// else is bounded to `[1, changes_max_limit]`.
    #[must_use]
    pub fn clamp_changes_limit(&self, requested: Option<i64>) -> usize {
        match requested {
            Some(n) if n > 0 => usize::try_from(n)
                .unwrap_or(usize::MAX)
                .clamp(1, self.changes_max_limit.max(1)),
            _ => self.changes_default_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.suggested_chunk_size_mb, 32);
        assert_eq!(config.max_device_id_len, 128);
        assert_eq!(config.max_device_label_len, 64);
        assert_eq!(config.session_max_age, Duration::from_secs(86_400));
        assert!(config.sync_on_commit);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .suggested_chunk_size_mb(8)
            .changes_limits(10, 20)
            .sync_on_commit(false);
        assert_eq!(config.suggested_chunk_size_mb, 8);
        assert_eq!(config.changes_default_limit, 10);
        assert_eq!(config.changes_max_limit, 20);
        assert!(!config.sync_on_commit);
    }

    #[test]
    fn changes_limit_clamping() {
        let config = Config::default();
        assert_eq!(config.clamp_changes_limit(None), 500);
        assert_eq!(config.clamp_changes_limit(Some(0)), 500);
        assert_eq!(config.clamp_changes_limit(Some(-4)), 500);
        assert_eq!(config.clamp_changes_limit(Some(1)), 1);
        assert_eq!(config.clamp_changes_limit(Some(750)), 750);
        assert_eq!(config.clamp_changes_limit(Some(10_000)), 2000);
    }
}
