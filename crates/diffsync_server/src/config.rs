//! Server configuration.

/// Limits applied to inbound requests.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Largest accepted message, in bytes of JSON.
    pub max_message_bytes: usize,
    /// Most edits accepted in one patch message.
    pub max_edits_per_message: usize,
}

impl ServerConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            max_message_bytes: 1024 * 1024,
            max_edits_per_message: 1000,
        }
    }

    /// Sets the largest accepted message size.
    pub fn with_max_message_bytes(mut self, bytes: usize) -> Self {
        self.max_message_bytes = bytes;
        self
    }

    /// Sets the most edits accepted in one patch message.
    pub fn with_max_edits_per_message(mut self, edits: usize) -> Self {
        self.max_edits_per_message = edits;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
