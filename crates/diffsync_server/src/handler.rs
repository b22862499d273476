//! Request handlers for the wire messages.

use std::sync::Arc;

use diffsync_engine::{ChannelSubscriber, ServerDataStore, ServerSyncEngine};
use diffsync_protocol::{
    AddMessage, DetachMessage, PatchMessage, ServerSynchronizer, SyncKey, SyncMessage,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

type Content<S> = <S as ServerSynchronizer>::Content;
type Diff<S> = <S as ServerSynchronizer>::Diff;

/// Context for request handling.
pub struct HandlerContext<S: ServerSynchronizer, St> {
    /// Server configuration.
    pub config: ServerConfig,
    /// Server engine (shared across all handlers).
    pub engine: Arc<ServerSyncEngine<S, St>>,
}

impl<S: ServerSynchronizer, St> HandlerContext<S, St> {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, engine: Arc<ServerSyncEngine<S, St>>) -> Self {
        Self { config, engine }
    }
}

/// Outcome of a handled message.
#[derive(Debug)]
pub enum HandlerResponse<D> {
    /// The client subscribed.
    Joined {
        /// Seed message to send back, as JSON.
        seed: String,
        /// Patch messages for this client.
        outbound: UnboundedReceiver<PatchMessage<D>>,
    },
    /// The edits were reconciled and pushed to subscribers.
    Patched {
        /// Number of subscribers pushed to, the sender included.
        notified: usize,
        /// New channel for the sender when it had to be subscribed again.
        outbound: Option<UnboundedReceiver<PatchMessage<D>>>,
    },
    /// The client asked to join a document that does not exist without
    /// offering content for it. Nothing was created or subscribed.
    Unavailable {
        /// Empty patch message to send back, as JSON.
        reply: String,
    },
    /// The client unsubscribed.
    Detached {
        /// Whether the client was subscribed.
        removed: bool,
    },
}

/// Handler for sync requests.
pub struct RequestHandler<S: ServerSynchronizer, St> {
    context: Arc<HandlerContext<S, St>>,
}

impl<S, St> RequestHandler<S, St>
where
    S: ServerSynchronizer,
    Content<S>: Default,
    Diff<S>: 'static,
    St: ServerDataStore<Content<S>, Diff<S>>,
{
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext<S, St>>) -> Self {
        Self { context }
    }

    /// Returns the engine.
    pub fn engine(&self) -> &ServerSyncEngine<S, St> {
        &self.context.engine
    }

    /// Handles one inbound JSON message.
    pub fn handle_message(&self, json: &str) -> ServerResult<HandlerResponse<Diff<S>>> {
        if json.len() > self.context.config.max_message_bytes {
            return Err(ServerError::InvalidRequest(format!(
                "message too large: {} > {} bytes",
                json.len(),
                self.context.config.max_message_bytes
            )));
        }

        match SyncMessage::<Content<S>, Diff<S>>::from_json(json)? {
            SyncMessage::Add(add) => self.handle_add(add),
            SyncMessage::Patch(patch) => self.handle_patch(patch),
            SyncMessage::Detach(detach) => Ok(self.handle_detach(&detach)),
        }
    }

    /// Subscribes a client.
    ///
    /// Without content the client can only join a document that already
    /// exists; for an unknown document it gets an empty patch message back
    /// and is not subscribed.
    pub fn handle_add(&self, add: AddMessage<Content<S>>) -> ServerResult<HandlerResponse<Diff<S>>> {
        if add.id.is_empty() || add.client_id.is_empty() {
            return Err(ServerError::InvalidRequest(
                "add requires a document id and a client id".into(),
            ));
        }
        if add.content.is_none() && self.context.engine.document(&add.id)?.is_none() {
            debug!(
                document_id = %add.id,
                client_id = %add.client_id,
                "add without content for unknown document"
            );
            let reply = PatchMessage::<Diff<S>>::acknowledgment(&SyncKey::new(add.id, add.client_id));
            return Ok(HandlerResponse::Unavailable {
                reply: reply.to_json()?,
            });
        }

        let document = add.into_document();
        let (subscriber, outbound) = ChannelSubscriber::<Diff<S>>::new(document.client_id.clone());
        let seed = self
            .context
            .engine
            .add_subscriber(Arc::new(subscriber), document.into_document())?;
        info!(document_id = %seed.document_id, client_id = %seed.client_id, "client joined");

        Ok(HandlerResponse::Joined {
            seed: seed.to_json()?,
            outbound,
        })
    }

    /// Reconciles a patch message and pushes the result to every subscriber.
    ///
    /// A sender that is no longer subscribed, for example after its
    /// connection dropped, is subscribed again with a fresh channel.
    pub fn handle_patch(
        &self,
        message: PatchMessage<Diff<S>>,
    ) -> ServerResult<HandlerResponse<Diff<S>>> {
        let max_edits = self.context.config.max_edits_per_message;
        if message.edits.len() > max_edits {
            return Err(ServerError::InvalidRequest(format!(
                "too many edits: {} > {}",
                message.edits.len(),
                max_edits
            )));
        }

        let engine = &self.context.engine;
        engine.patch(&message)?;

        let outbound = if engine.is_subscribed(&message.document_id, &message.client_id) {
            None
        } else {
            let (subscriber, outbound) = ChannelSubscriber::<Diff<S>>::new(message.client_id.clone());
            engine.connect_subscriber(&message.document_id, Arc::new(subscriber));
            info!(
                document_id = %message.document_id,
                client_id = %message.client_id,
                "client reconnected"
            );
            Some(outbound)
        };

        let notified = engine.notify_subscribers(&message);
        debug!(
            document_id = %message.document_id,
            client_id = %message.client_id,
            edits = message.edits.len(),
            notified,
            "patch handled"
        );
        Ok(HandlerResponse::Patched { notified, outbound })
    }

    /// Unsubscribes a client.
    pub fn handle_detach(&self, detach: &DetachMessage) -> HandlerResponse<Diff<S>> {
        let removed = self
            .context
            .engine
            .remove_subscriber(&detach.id, &detach.client_id);
        HandlerResponse::Detached { removed }
    }
}
