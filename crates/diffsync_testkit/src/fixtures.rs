//! Test fixtures wiring client engines to a server engine.

use std::sync::Arc;

use diffsync_engine::{
    ChannelSubscriber, ClientSyncEngine, MemoryClientStore, MemoryServerStore, ServerSyncEngine,
    SyncError, SyncResult,
};
use diffsync_protocol::{
    ClientDocument, DiffPatch, DiffSynchronizer, Document, PatchMessage, SyncKey,
};
use diffsync_synchronizers::{JsonMergePatcher, TextPatcher};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

/// Server engine over in-memory storage.
pub type TestServer<P> = ServerSyncEngine<
    DiffSynchronizer<P>,
    MemoryServerStore<<P as DiffPatch>::Content, <P as DiffPatch>::Diff>,
>;

/// Client engine over in-memory storage.
pub type TestClientEngine<P> = ClientSyncEngine<
    DiffSynchronizer<P>,
    MemoryClientStore<<P as DiffPatch>::Content, <P as DiffPatch>::Diff>,
>;

/// A client engine plus the channel the server pushes to it on.
pub struct TestClient<P: DiffPatch> {
    /// Client id, unique per fixture.
    pub id: String,
    /// The client's engine.
    pub engine: TestClientEngine<P>,
    inbox: UnboundedReceiver<PatchMessage<P::Diff>>,
}

impl<P: DiffPatch> TestClient<P> {
    /// Takes every message the server pushed since the last call.
    pub fn take_pushes(&mut self) -> Vec<PatchMessage<P::Diff>> {
        let mut pushes = Vec::new();
        while let Ok(message) = self.inbox.try_recv() {
            pushes.push(message);
        }
        pushes
    }
}

/// One server engine and its subscribed clients, all for one document.
///
/// Messages never travel on their own: tests move them with
/// [`SyncFixture::deliver_to_server`] and [`SyncFixture::deliver_to_client`],
/// and may lose them in between.
pub struct SyncFixture<P: DiffPatch> {
    document_id: String,
    primitive: P,
    server: TestServer<P>,
    clients: Vec<TestClient<P>>,
}

impl SyncFixture<TextPatcher> {
    /// Creates a fixture for plain text.
    pub fn text(document_id: impl Into<String>) -> Self {
        Self::new(TextPatcher, document_id)
    }
}

impl SyncFixture<JsonMergePatcher> {
    /// Creates a fixture for JSON documents exchanging merge patches.
    pub fn json(document_id: impl Into<String>) -> Self {
        Self::new(JsonMergePatcher, document_id)
    }
}

impl<P> SyncFixture<P>
where
    P: DiffPatch + Clone + 'static,
    P::Diff: 'static,
{
    /// Creates a fixture with no clients.
    pub fn new(primitive: P, document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            server: ServerSyncEngine::new(
                DiffSynchronizer::new(primitive.clone()),
                MemoryServerStore::new(),
            ),
            primitive,
            clients: Vec::new(),
        }
    }

    /// Returns the document id.
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Returns the server engine.
    pub fn server(&self) -> &TestServer<P> {
        &self.server
    }

    /// Returns the client at `index`.
    pub fn client(&self, index: usize) -> &TestClient<P> {
        &self.clients[index]
    }

    /// Returns the number of clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Returns the key of the client at `index`.
    pub fn key(&self, index: usize) -> SyncKey {
        SyncKey::new(self.document_id.as_str(), self.clients[index].id.as_str())
    }

    /// Subscribes a new client holding `content` and applies its seed.
    ///
    /// Returns the client's index.
    pub fn add_client(&mut self, content: P::Content) -> SyncResult<usize> {
        let id = format!("client-{}", Uuid::new_v4());
        let (subscriber, inbox) = ChannelSubscriber::<P::Diff>::new(id.as_str());
        let seed = self.server.add_subscriber(
            Arc::new(subscriber),
            Document::new(self.document_id.as_str(), content.clone()),
        )?;

        let engine = ClientSyncEngine::new(
            DiffSynchronizer::new(self.primitive.clone()),
            MemoryClientStore::new(),
        );
        engine.add_document(ClientDocument::new(
            self.document_id.as_str(),
            id.as_str(),
            content,
        ))?;
        engine.patch(&seed)?;
        tracing::debug!(client_id = %id, "fixture client joined");

        self.clients.push(TestClient { id, engine, inbox });
        Ok(self.clients.len() - 1)
    }

    /// Has the client at `index` edit its document to `content`.
    ///
    /// Returns the message the client would send.
    pub fn edit(&self, index: usize, content: P::Content) -> SyncResult<PatchMessage<P::Diff>> {
        let client = &self.clients[index];
        client.engine.diff(ClientDocument::new(
            self.document_id.as_str(),
            client.id.as_str(),
            content,
        ))
    }

    /// Delivers a client message to the server and pushes the result to subscribers.
    ///
    /// Returns the number of subscribers pushed to.
    pub fn deliver_to_server(&self, message: &PatchMessage<P::Diff>) -> SyncResult<usize> {
        self.server.patch(message)?;
        Ok(self.server.notify_subscribers(message))
    }

    /// Delivers every pending push to the client at `index`.
    ///
    /// Returns the number of messages applied.
    pub fn deliver_to_client(&mut self, index: usize) -> SyncResult<usize> {
        let client = &mut self.clients[index];
        let pushes = client.take_pushes();
        for message in &pushes {
            client.engine.patch(message)?;
        }
        Ok(pushes.len())
    }

    /// Delivers every pending push to every client.
    pub fn deliver_all(&mut self) -> SyncResult<usize> {
        let mut delivered = 0;
        for index in 0..self.clients.len() {
            delivered += self.deliver_to_client(index)?;
        }
        Ok(delivered)
    }

    /// Loses every pending push to the client at `index`.
    pub fn drop_pushes(&mut self, index: usize) -> usize {
        self.clients[index].take_pushes().len()
    }

    /// Runs one loss-free cycle: the client edits, the server patches,
    /// and the client applies the server's reply.
    pub fn sync(&mut self, index: usize, content: P::Content) -> SyncResult<()> {
        let message = self.edit(index, content)?;
        self.deliver_to_server(&message)?;
        self.deliver_to_client(index)?;
        Ok(())
    }

    /// Runs a loss-free cycle for the client at `index` without a local change.
    pub fn flush(&mut self, index: usize) -> SyncResult<()> {
        let content = self.client_content(index)?;
        self.sync(index, content)
    }

    /// Returns the client's local content.
    pub fn client_content(&self, index: usize) -> SyncResult<P::Content> {
        let key = self.key(index);
        self.clients[index]
            .engine
            .document(&key)?
            .map(|document| document.content)
            .ok_or(SyncError::MissingDocument(key))
    }

    /// Returns the server's authoritative content.
    pub fn server_content(&self) -> SyncResult<P::Content> {
        self.server
            .document(&self.document_id)?
            .map(|document| document.content)
            .ok_or_else(|| SyncError::UnknownDocument(self.document_id.clone()))
    }
}

impl<P> SyncFixture<P>
where
    P: DiffPatch + Clone + 'static,
    P::Content: PartialEq,
    P::Diff: 'static,
{
    /// Returns true if every client holds the server's content and every
    /// shadow pair agrees.
    pub fn is_converged(&self) -> SyncResult<bool> {
        let server_content = self.server_content()?;
        for index in 0..self.clients.len() {
            if self.client_content(index)? != server_content {
                return Ok(false);
            }
            let key = self.key(index);
            let client_shadow = self.clients[index].engine.shadow(&key)?;
            let server_shadow = self.server.shadow(&key)?;
            if client_shadow != server_shadow {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Text fixture with one client per initial content, all joined.
pub fn text_fixture(contents: &[&str]) -> SyncFixture<TextPatcher> {
    let mut fixture = SyncFixture::text("doc");
    for content in contents {
        fixture
            .add_client(content.to_string())
            .expect("client should join");
    }
    fixture.deliver_all().expect("seeds should apply");
    fixture
}

/// JSON fixture with one client per initial content, all joined.
pub fn json_fixture(contents: &[Value]) -> SyncFixture<JsonMergePatcher> {
    let mut fixture = SyncFixture::json("doc");
    for content in contents {
        fixture
            .add_client(content.clone())
            .expect("client should join");
    }
    fixture.deliver_all().expect("seeds should apply");
    fixture
}
