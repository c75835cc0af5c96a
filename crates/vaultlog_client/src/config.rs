//! Configuration for the client.

/// Configuration for an [`EncryptedDb`](crate::EncryptedDb).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Whether mutations signal the background compactor.
    pub compaction_enabled: bool,
    /// Whether a sync refuses to install a state older than the current one.
    ///
    /// Off by default, in which case the last install wins.
    pub reject_stale_installs: bool,
    /// Whether sync phases are timed and logged at debug level.
    pub log_phase_timings: bool,
}

impl ClientConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            compaction_enabled: true,
            reject_stale_installs: false,
            log_phase_timings: true,
        }
    }

    /// Enables or disables the compaction signal.
    pub fn with_compaction(mut self, enabled: bool) -> Self {
        self.compaction_enabled = enabled;
        self
    }

    /// Enables or disables the stale install guard.
    pub fn with_reject_stale_installs(mut self, enabled: bool) -> Self {
        self.reject_stale_installs = enabled;
        self
    }

    /// Enables or disables sync phase timing logs.
    pub fn with_phase_timings(mut self, enabled: bool) -> Self {
        self.log_phase_timings = enabled;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}
