//! Configuration for the sync engines.

/// What to do when an edit's checksum does not match the shadow it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumPolicy {
    /// Do not compare checksums.
    Ignore,
    /// Log a warning and apply the edit anyway.
    #[default]
    Warn,
    /// Refuse the edit with `SyncError::ChecksumMismatch`.
    Reject,
}

/// How accepted edits reach the document after a patch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentUpdate {
    /// Apply each accepted edit to the document. If the document has drifted
    /// so far that an edit no longer applies, replace it with the shadow.
    #[default]
    PatchEdits,
    /// Always replace the document with the shadow content.
    ReplaceWithShadow,
}

/// Configuration shared by the client and server engines.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Checksum verification for inbound edits.
    pub checksum_policy: ChecksumPolicy,
    /// Document update strategy.
    pub document_update: DocumentUpdate,
}

impl EngineConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the checksum policy.
    pub fn with_checksum_policy(mut self, policy: ChecksumPolicy) -> Self {
        self.checksum_policy = policy;
        self
    }

    /// Sets the document update strategy.
    pub fn with_document_update(mut self, update: DocumentUpdate) -> Self {
        self.document_update = update;
        self
    }
}
