//! Classification of inbound edits against a shadow.

use diffsync_protocol::{Edit, ShadowDocument};

/// What to do with one inbound edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// The peer never saw some of our edits: restore the backup shadow.
    Rollback,
    /// Already applied: discard.
    Duplicate,
    /// Next expected edit, or a seed: apply to the shadow.
    Apply,
    /// Ahead of the shadow: leave for a later message.
    Ahead,
    /// Acknowledges some of our edits but was made before the rest arrived:
    /// acknowledge and discard.
    Superseded,
}

/// Classifies a server edit arriving at a client.
///
/// The client's own axis is `client_version`; a seed never triggers a rollback.
pub(crate) fn client<C, D>(edit: &Edit<D>, shadow: &ShadowDocument<C>) -> Disposition {
    if let Some(client_version) = edit.known_client_version() {
        if client_version < shadow.client_version {
            return Disposition::Rollback;
        }
    }
    if edit.server_version < shadow.server_version {
        return Disposition::Duplicate;
    }
    if edit.is_seed() || versions_match(edit, shadow) {
        return Disposition::Apply;
    }
    Disposition::Ahead
}

/// Classifies a client edit arriving at the server.
///
/// The server's own axis is `server_version`. Clients never send seeds; one
/// arriving anyway is treated as already applied.
pub(crate) fn server<C, D>(edit: &Edit<D>, shadow: &ShadowDocument<C>) -> Disposition {
    let Some(client_version) = edit.known_client_version() else {
        return Disposition::Duplicate;
    };
    if edit.server_version < shadow.server_version {
        return Disposition::Rollback;
    }
    if client_version < shadow.client_version {
        return Disposition::Duplicate;
    }
    if versions_match(edit, shadow) {
        return Disposition::Apply;
    }
    Disposition::Ahead
}

fn versions_match<C, D>(edit: &Edit<D>, shadow: &ShadowDocument<C>) -> bool {
    edit.server_version == shadow.server_version
        && edit.known_client_version() == Some(shadow.client_version)
}
