//! Wire messages.
//!
//! Every message is a JSON object tagged with `msgType`:
//! - `add`: a client registers for a document, optionally with content
//! - `patch`: a batch of edits for one replica pair
//! - `detach`: a client leaves a document

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{ClientDocument, SyncKey};
use crate::edit::Edit;
use crate::error::{ProtocolError, ProtocolResult};

/// Kind of wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Register a client for a document.
    Add,
    /// Edits for one replica pair.
    Patch,
    /// Unregister a client from a document.
    Detach,
    /// Anything else.
    Unknown,
}

impl MessageType {
    /// Parses a `msgType` value. Unrecognized values map to `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "add" => MessageType::Add,
            "patch" => MessageType::Patch,
            "detach" => MessageType::Detach,
            _ => MessageType::Unknown,
        }
    }
}

#[derive(Serialize)]
struct Tagged<'a, T> {
    #[serde(rename = "msgType")]
    msg_type: MessageType,
    #[serde(flatten)]
    body: &'a T,
}

fn to_tagged_json<T: Serialize>(msg_type: MessageType, body: &T) -> ProtocolResult<String> {
    Ok(serde_json::to_string(&Tagged { msg_type, body })?)
}

/// Edits for one replica pair, oldest first.
///
/// An empty `edits` list is a valid acknowledgment-only message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchMessage<D> {
    /// Document identifier.
    #[serde(rename = "id")]
    pub document_id: String,
    /// Client identifier.
    pub client_id: String,
    /// Edits in the order they must be applied.
    #[serde(default = "Vec::new")]
    pub edits: Vec<Edit<D>>,
}

impl<D> PatchMessage<D> {
    /// Creates a patch message.
    pub fn new(
        document_id: impl Into<String>,
        client_id: impl Into<String>,
        edits: Vec<Edit<D>>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            client_id: client_id.into(),
            edits,
        }
    }

    /// Creates a message with no edits for the given replica pair.
    pub fn acknowledgment(key: &SyncKey) -> Self {
        Self::new(key.document_id.clone(), key.client_id.clone(), Vec::new())
    }

    /// Returns the replica key of this message.
    pub fn key(&self) -> SyncKey {
        SyncKey::new(self.document_id.clone(), self.client_id.clone())
    }

    /// Returns true if the message carries no edits.
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Serializes this message, including its `msgType` tag.
    pub fn to_json(&self) -> ProtocolResult<String>
    where
        D: Serialize,
    {
        to_tagged_json(MessageType::Patch, self)
    }

    /// Parses a patch message. A `msgType` field, if present, is ignored.
    pub fn from_json(json: &str) -> ProtocolResult<Self>
    where
        D: DeserializeOwned,
    {
        Ok(serde_json::from_str(json)?)
    }
}

/// Registration of a client for a document.
///
/// `content` is absent when the client joins an existing document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMessage<C> {
    /// Document identifier.
    pub id: String,
    /// Client identifier.
    pub client_id: String,
    /// Initial content offered by the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<C>,
}

impl<C> AddMessage<C> {
    /// Creates an add message offering `document` as initial content.
    pub fn from_document(document: ClientDocument<C>) -> Self {
        Self {
            id: document.id,
            client_id: document.client_id,
            content: Some(document.content),
        }
    }

    /// Converts into the client document, using default content if none was sent.
    pub fn into_document(self) -> ClientDocument<C>
    where
        C: Default,
    {
        ClientDocument::new(self.id, self.client_id, self.content.unwrap_or_default())
    }
}

/// A client leaving a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachMessage {
    /// Document identifier.
    pub id: String,
    /// Client identifier.
    pub client_id: String,
}

impl DetachMessage {
    /// Returns the replica key being detached.
    pub fn key(&self) -> SyncKey {
        SyncKey::new(self.id.clone(), self.client_id.clone())
    }
}

/// Any inbound or outbound wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage<C, D> {
    /// Registration.
    Add(AddMessage<C>),
    /// Edits.
    Patch(PatchMessage<D>),
    /// Unregistration.
    Detach(DetachMessage),
}

impl<C, D> SyncMessage<C, D> {
    /// Returns the kind of this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            SyncMessage::Add(_) => MessageType::Add,
            SyncMessage::Patch(_) => MessageType::Patch,
            SyncMessage::Detach(_) => MessageType::Detach,
        }
    }

    /// Parses a tagged message.
    pub fn from_json(json: &str) -> ProtocolResult<Self>
    where
        C: DeserializeOwned,
        D: DeserializeOwned,
    {
        let value: Value = serde_json::from_str(json)?;
        let raw = value
            .get("msgType")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingField("msgType"))?
            .to_owned();

        match MessageType::parse(&raw) {
            MessageType::Add => Ok(SyncMessage::Add(serde_json::from_value(value)?)),
            MessageType::Patch => Ok(SyncMessage::Patch(serde_json::from_value(value)?)),
            MessageType::Detach => Ok(SyncMessage::Detach(serde_json::from_value(value)?)),
            MessageType::Unknown => Err(ProtocolError::UnknownMessageType(raw)),
        }
    }

    /// Serializes this message with its `msgType` tag.
    pub fn to_json(&self) -> ProtocolResult<String>
    where
        C: Serialize,
        D: Serialize,
    {
        match self {
            SyncMessage::Add(msg) => to_tagged_json(MessageType::Add, msg),
            SyncMessage::Patch(msg) => to_tagged_json(MessageType::Patch, msg),
            SyncMessage::Detach(msg) => to_tagged_json(MessageType::Detach, msg),
        }
    }
}

impl<C, D> From<PatchMessage<D>> for SyncMessage<C, D> {
    fn from(msg: PatchMessage<D>) -> Self {
        SyncMessage::Patch(msg)
    }
}

impl<C, D> From<AddMessage<C>> for SyncMessage<C, D> {
    fn from(msg: AddMessage<C>) -> Self {
        SyncMessage::Add(msg)
    }
}
