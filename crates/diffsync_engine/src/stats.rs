//! Engine statistics.

/// Counters describing what an engine has done since it was created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Edits produced by `diff`.
    pub diffs_created: u64,
    /// Inbound edits applied to a shadow.
    pub edits_applied: u64,
    /// Inbound edits discarded as already applied.
    pub duplicates_discarded: u64,
    /// Inbound edits left for a later message.
    pub edits_deferred: u64,
    /// Shadows restored from backup.
    pub rollbacks: u64,
    /// Inbound edits discarded because they predate edits we sent later.
    pub edits_superseded: u64,
    /// Inbound edits whose checksum did not match the shadow.
    pub checksum_mismatches: u64,
    /// Documents replaced with the shadow because an edit no longer applied.
    pub document_fallbacks: u64,
}
