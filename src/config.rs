//! Channel tunables.

use std::time::Duration;

/// Default bound on how long a receive waits before treating the peer as
/// unresponsive.
pub(crate) const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Default cap on a single frame's declared payload length.
pub(crate) const DEFAULT_MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub read_timeout: Duration,
    pub max_frame_len: usize,
}

impl ChannelConfig {
    pub fn new() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new()
    }
}
