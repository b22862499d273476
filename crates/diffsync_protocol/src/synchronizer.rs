//! Synchronizer contracts.
//!
//! A `DiffPatch` is the content-type specific primitive: it diffs two values,
//! patches a value, merges into a value that has moved on, and checksums a
//! value. The client and server synchronizer contracts wrap that primitive in
//! the document/shadow/edit vocabulary the engines speak. `DiffSynchronizer` adapts any primitive to both contracts.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::document::{ClientDocument, Document, ShadowDocument};
use crate::edit::Edit;
use crate::error::ProtocolResult;
use crate::messages::{AddMessage, PatchMessage};

/// Diff, patch and checksum for one content type.
pub trait DiffPatch: Send + Sync {
    /// Content being synchronized.
    type Content: Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned;
    /// Difference between two contents.
    type Diff: Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned;

    /// Computes the diff that turns `source` into `target`.
    fn diff(&self, source: &Self::Content, target: &Self::Content) -> Self::Diff;

    /// Applies `diff` to `content`.
    ///
    /// Fails without side effects if the diff does not apply cleanly.
    fn patch(&self, diff: &Self::Diff, content: &Self::Content) -> ProtocolResult<Self::Content>;

    /// Applies `diff` to content that may have changed since the diff was made.
    ///
    /// Documents go through here; shadows always use [`patch`](Self::patch).
    /// The default is `patch`. Primitives that can locate a change from its
    /// surroundings override it so that non-overlapping concurrent changes
    /// survive, failing only where the changes overlap.
    fn merge(&self, diff: &Self::Diff, content: &Self::Content) -> ProtocolResult<Self::Content> {
        self.patch(diff, content)
    }

    /// Computes a checksum of `content`.
    fn checksum(&self, content: &Self::Content) -> String;
}

/// Client half of the synchronizer contract.
pub trait ClientSynchronizer: Send + Sync {
    /// Content being synchronized.
    type Content: Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned;
    /// Difference between two contents.
    type Diff: Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned;

    /// Diff from the shadow to `document`, tagged with the shadow's versions.
    fn server_diff(
        &self,
        document: &ClientDocument<Self::Content>,
        shadow: &ShadowDocument<Self::Content>,
    ) -> Edit<Self::Diff>;

    /// Diff from `document` to the shadow, tagged with the shadow's versions.
    fn client_diff(
        &self,
        shadow: &ShadowDocument<Self::Content>,
        document: &ClientDocument<Self::Content>,
    ) -> Edit<Self::Diff>;

    /// Applies `edit` to the shadow content.
    ///
    /// The returned shadow takes the edit's client version (unless the edit is
    /// a seed) and keeps the shadow's server version. Incrementing the axis
    /// that recorded the receipt is left to the caller.
    fn patch_shadow(
        &self,
        edit: &Edit<Self::Diff>,
        shadow: &ShadowDocument<Self::Content>,
    ) -> ProtocolResult<ShadowDocument<Self::Content>>;

    /// Applies `edit` to the local document.
    fn patch_document(
        &self,
        edit: &Edit<Self::Diff>,
        document: &ClientDocument<Self::Content>,
    ) -> ProtocolResult<ClientDocument<Self::Content>>;

    /// Computes a checksum of `content`.
    fn checksum(&self, content: &Self::Content) -> String;

    /// Wraps edits in a patch message.
    fn create_patch_message(
        &self,
        document_id: &str,
        client_id: &str,
        edits: Vec<Edit<Self::Diff>>,
    ) -> PatchMessage<Self::Diff> {
        PatchMessage::new(document_id, client_id, edits)
    }

    /// Parses a patch message.
    fn patch_message_from_json(&self, json: &str) -> ProtocolResult<PatchMessage<Self::Diff>> {
        PatchMessage::from_json(json)
    }
}

/// Server half of the synchronizer contract.
pub trait ServerSynchronizer: Send + Sync {
    /// Content being synchronized.
    type Content: Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned;
    /// Difference between two contents.
    type Diff: Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned;

    /// Diff from the shadow to the authoritative `document`.
    fn server_diff(
        &self,
        document: &Document<Self::Content>,
        shadow: &ShadowDocument<Self::Content>,
    ) -> Edit<Self::Diff>;

    /// Diff from the authoritative `document` to the shadow.
    fn client_diff(
        &self,
        shadow: &ShadowDocument<Self::Content>,
        document: &Document<Self::Content>,
    ) -> Edit<Self::Diff>;

    /// Applies `edit` to the shadow content. Same version rules as the client.
    fn patch_shadow(
        &self,
        edit: &Edit<Self::Diff>,
        shadow: &ShadowDocument<Self::Content>,
    ) -> ProtocolResult<ShadowDocument<Self::Content>>;

    /// Applies `edit` to the authoritative document.
    fn patch_document(
        &self,
        edit: &Edit<Self::Diff>,
        document: &Document<Self::Content>,
    ) -> ProtocolResult<Document<Self::Content>>;

    /// Computes a checksum of `content`.
    fn checksum(&self, content: &Self::Content) -> String;

    /// Wraps edits in a patch message.
    fn create_patch_message(
        &self,
        document_id: &str,
        client_id: &str,
        edits: Vec<Edit<Self::Diff>>,
    ) -> PatchMessage<Self::Diff> {
        PatchMessage::new(document_id, client_id, edits)
    }

    /// Parses a patch message.
    fn patch_message_from_json(&self, json: &str) -> ProtocolResult<PatchMessage<Self::Diff>> {
        PatchMessage::from_json(json)
    }

    /// Parses the client document carried by an `add` message.
    fn document_from_json(&self, json: &str) -> ProtocolResult<ClientDocument<Self::Content>>
    where
        Self::Content: Default,
    {
        let add: AddMessage<Self::Content> = serde_json::from_str(json)?;
        Ok(add.into_document())
    }
}

/// Adapts a `DiffPatch` primitive to both synchronizer contracts.
#[derive(Debug, Clone, Default)]
pub struct DiffSynchronizer<P> {
    primitive: P,
}

impl<P: DiffPatch> DiffSynchronizer<P> {
    /// Creates a synchronizer over `primitive`.
    pub fn new(primitive: P) -> Self {
        Self { primitive }
    }

    /// Returns the underlying primitive.
    pub fn primitive(&self) -> &P {
        &self.primitive
    }

    fn tagged_edit(
        &self,
        shadow: &ShadowDocument<P::Content>,
        source: &P::Content,
        target: &P::Content,
    ) -> Edit<P::Diff> {
        let diff = self.primitive.diff(source, target);
        let checksum = self.primitive.checksum(shadow.content());
        Edit::new(
            &shadow.key(),
            version_to_wire(shadow.client_version),
            shadow.server_version,
            checksum,
            diff,
        )
    }

    fn patched_shadow(
        &self,
        edit: &Edit<P::Diff>,
        shadow: &ShadowDocument<P::Content>,
    ) -> ProtocolResult<ShadowDocument<P::Content>> {
        let content = self.primitive.patch(&edit.diff, shadow.content())?;
        let client_version = edit.known_client_version().unwrap_or(shadow.client_version);
        Ok(ShadowDocument::new(
            shadow.server_version,
            client_version,
            shadow.document.clone().with_content(content),
        ))
    }
}

// Shadow versions never approach i64::MAX; saturate rather than wrap into the seed sentinel.
fn version_to_wire(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}

impl<P: DiffPatch> ClientSynchronizer for DiffSynchronizer<P> {
    type Content = P::Content;
    type Diff = P::Diff;

    fn server_diff(
        &self,
        document: &ClientDocument<P::Content>,
        shadow: &ShadowDocument<P::Content>,
    ) -> Edit<P::Diff> {
        self.tagged_edit(shadow, shadow.content(), &document.content)
    }

    fn client_diff(
        &self,
        shadow: &ShadowDocument<P::Content>,
        document: &ClientDocument<P::Content>,
    ) -> Edit<P::Diff> {
        self.tagged_edit(shadow, &document.content, shadow.content())
    }

    fn patch_shadow(
        &self,
        edit: &Edit<P::Diff>,
        shadow: &ShadowDocument<P::Content>,
    ) -> ProtocolResult<ShadowDocument<P::Content>> {
        self.patched_shadow(edit, shadow)
    }

    fn patch_document(
        &self,
        edit: &Edit<P::Diff>,
        document: &ClientDocument<P::Content>,
    ) -> ProtocolResult<ClientDocument<P::Content>> {
        let content = self.primitive.merge(&edit.diff, &document.content)?;
        Ok(document.clone().with_content(content))
    }

    fn checksum(&self, content: &P::Content) -> String {
        self.primitive.checksum(content)
    }
}

impl<P: DiffPatch> ServerSynchronizer for DiffSynchronizer<P> {
    type Content = P::Content;
    type Diff = P::Diff;

    fn server_diff(
        &self,
        document: &Document<P::Content>,
        shadow: &ShadowDocument<P::Content>,
    ) -> Edit<P::Diff> {
        self.tagged_edit(shadow, shadow.content(), &document.content)
    }

    fn client_diff(
        &self,
        shadow: &ShadowDocument<P::Content>,
        document: &Document<P::Content>,
    ) -> Edit<P::Diff> {
        self.tagged_edit(shadow, &document.content, shadow.content())
    }

    fn patch_shadow(
        &self,
        edit: &Edit<P::Diff>,
        shadow: &ShadowDocument<P::Content>,
    ) -> ProtocolResult<ShadowDocument<P::Content>> {
        self.patched_shadow(edit, shadow)
    }

    fn patch_document(
        &self,
        edit: &Edit<P::Diff>,
        document: &Document<P::Content>,
    ) -> ProtocolResult<Document<P::Content>> {
        let content = self.primitive.merge(&edit.diff, &document.content)?;
        Ok(document.clone().with_content(content))
    }

    fn checksum(&self, content: &P::Content) -> String {
        self.primitive.checksum(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;

    /// Whole-value replacement: the diff is `(expected, replacement)`.
    #[derive(Debug, Clone, Default)]
    struct Replace;

    impl DiffPatch for Replace {
        type Content = String;
        type Diff = (String, String);

        fn diff(&self, source: &String, target: &String) -> (String, String) {
            (source.clone(), target.clone())
        }

        fn patch(&self, diff: &(String, String), content: &String) -> ProtocolResult<String> {
            if &diff.0 == content {
                Ok(diff.1.clone())
            } else {
                Err(ProtocolError::patch_failed("content changed"))
            }
        }

        fn checksum(&self, content: &String) -> String {
            format!("len:{}", content.len())
        }
    }

    /// Strict on patch, overwrites on merge.
    #[derive(Debug, Clone, Default)]
    struct Overwrite;

    impl DiffPatch for Overwrite {
        type Content = String;
        type Diff = (String, String);

        fn diff(&self, source: &String, target: &String) -> (String, String) {
            Replace.diff(source, target)
        }

        fn patch(&self, diff: &(String, String), content: &String) -> ProtocolResult<String> {
            Replace.patch(diff, content)
        }

        fn merge(&self, diff: &(String, String), _content: &String) -> ProtocolResult<String> {
            Ok(diff.1.clone())
        }

        fn checksum(&self, content: &String) -> String {
            Replace.checksum(content)
        }
    }

    fn shadow(sv: u64, cv: u64, content: &str) -> ShadowDocument<String> {
        ShadowDocument::new(sv, cv, ClientDocument::new("doc", "a", content.to_string()))
    }

    #[test]
    fn server_diff_goes_from_shadow_to_document() {
        let sync = DiffSynchronizer::new(Replace);
        let doc = ClientDocument::new("doc", "a", "new".to_string());
        let edit = ClientSynchronizer::server_diff(&sync, &doc, &shadow(3, 2, "old"));

        assert_eq!(edit.diff, ("old".to_string(), "new".to_string()));
        assert_eq!((edit.server_version, edit.client_version), (3, 2));
        assert_eq!(edit.checksum, "len:3");
        assert_eq!(edit.document_id, "doc");
        assert_eq!(edit.client_id, "a");
    }

    #[test]
    fn client_diff_goes_from_document_to_shadow() {
        let sync = DiffSynchronizer::new(Replace);
        let doc = Document::new("doc", "server".to_string());
        let edit = ServerSynchronizer::client_diff(&sync, &shadow(1, 1, "shadow"), &doc);
        assert_eq!(edit.diff, ("server".to_string(), "shadow".to_string()));
    }

    #[test]
    fn patch_shadow_takes_edit_client_version() {
        let sync = DiffSynchronizer::new(Replace);
        let edit = Edit::new(
            &shadow(0, 0, "").key(),
            4,
            9,
            "",
            ("a".to_string(), "b".to_string()),
        );
        let patched = ClientSynchronizer::patch_shadow(&sync, &edit, &shadow(2, 1, "a")).unwrap();
        assert_eq!((patched.server_version, patched.client_version), (2, 4));
        assert_eq!(patched.content(), "b");

        let seed = Edit::seed(&patched.key(), "", ("b".to_string(), "c".to_string()));
        let patched = ServerSynchronizer::patch_shadow(&sync, &seed, &patched).unwrap();
        assert_eq!((patched.server_version, patched.client_version), (2, 4));
        assert_eq!(patched.content(), "c");
    }

    #[test]
    fn failed_patch_propagates() {
        let sync = DiffSynchronizer::new(Replace);
        let edit = Edit::new(
            &shadow(0, 0, "").key(),
            0,
            0,
            "",
            ("x".to_string(), "y".to_string()),
        );
        let doc = Document::new("doc", "z".to_string());
        let err = ServerSynchronizer::patch_document(&sync, &edit, &doc).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn documents_merge_while_shadows_patch() {
        let sync = DiffSynchronizer::new(Overwrite);
        let edit = Edit::new(
            &shadow(0, 0, "").key(),
            0,
            0,
            "",
            ("x".to_string(), "y".to_string()),
        );

        let doc = ServerSynchronizer::patch_document(&sync, &edit, &Document::new("doc", "z".to_string()))
            .unwrap();
        assert_eq!(doc.content, "y");
        let doc = ClientSynchronizer::patch_document(
            &sync,
            &edit,
            &ClientDocument::new("doc", "a", "z".to_string()),
        )
        .unwrap();
        assert_eq!(doc.content, "y");

        assert!(ServerSynchronizer::patch_shadow(&sync, &edit, &shadow(0, 0, "z")).is_err());
    }

    #[test]
    fn document_from_add_message() {
        let sync = DiffSynchronizer::new(Replace);
        let doc = sync
            .document_from_json(r#"{"msgType":"add","id":"doc","clientId":"a","content":"hi"}"#)
            .unwrap();
        assert_eq!(doc, ClientDocument::new("doc", "a", "hi".to_string()));

        let msg = ClientSynchronizer::create_patch_message(&sync, "doc", "a", Vec::new());
        let json = msg.to_json().unwrap();
        let parsed = ServerSynchronizer::patch_message_from_json(&sync, &json).unwrap();
        assert_eq!(parsed, msg);
    }
}
