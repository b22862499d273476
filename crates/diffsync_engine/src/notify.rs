//! Subscriber and listener hooks.
//!
//! The server engine pushes patch messages to `Subscriber`s; the client
//! engine hands every patched document to its `PatchListener`s. Both are
//! called synchronously, so implementations should hand work off rather than
//! block. The channel-backed variants do exactly that.

use diffsync_protocol::{ClientDocument, PatchMessage};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// A client subscribed to a document on the server.
pub trait Subscriber<D>: Send + Sync {
    /// Identifier of the subscribed client.
    fn client_id(&self) -> &str;

    /// Called with a patch message for this client.
    fn patched(&self, message: &PatchMessage<D>);
}

/// Subscriber forwarding messages into an unbounded channel.
pub struct ChannelSubscriber<D> {
    client_id: String,
    sender: UnboundedSender<PatchMessage<D>>,
}

impl<D> ChannelSubscriber<D> {
    /// Creates a subscriber and the receiver its messages arrive on.
    pub fn new(client_id: impl Into<String>) -> (Self, UnboundedReceiver<PatchMessage<D>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                client_id: client_id.into(),
                sender,
            },
            receiver,
        )
    }

    /// Returns true once the receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl<D: Clone + Send + Sync> Subscriber<D> for ChannelSubscriber<D> {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn patched(&self, message: &PatchMessage<D>) {
        if self.sender.send(message.clone()).is_err() {
            debug!(client_id = %self.client_id, "subscriber channel closed, dropping message");
        }
    }
}

/// Observer of documents patched by a client engine.
pub trait PatchListener<C>: Send + Sync {
    /// Called with the document after a successful patch.
    fn patched(&self, document: &ClientDocument<C>);
}

impl<C, F> PatchListener<C> for F
where
    F: Fn(&ClientDocument<C>) + Send + Sync,
{
    fn patched(&self, document: &ClientDocument<C>) {
        self(document)
    }
}

/// Listener forwarding patched documents into an unbounded channel.
pub struct ChannelListener<C> {
    sender: UnboundedSender<ClientDocument<C>>,
}

impl<C> ChannelListener<C> {
    /// Creates a listener and the receiver documents arrive on.
    pub fn new() -> (Self, UnboundedReceiver<ClientDocument<C>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl<C: Clone + Send + Sync> PatchListener<C> for ChannelListener<C> {
    fn patched(&self, document: &ClientDocument<C>) {
        if self.sender.send(document.clone()).is_err() {
            debug!(document_id = %document.id, "listener channel closed, dropping document");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diffsync_protocol::SyncKey;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn channel_subscriber_forwards() {
        let (subscriber, mut receiver) = ChannelSubscriber::<String>::new("a");
        assert_eq!(subscriber.client_id(), "a");

        let message = PatchMessage::acknowledgment(&SyncKey::new("doc", "a"));
        subscriber.patched(&message);
        assert_eq!(receiver.try_recv().unwrap(), message);

        drop(receiver);
        assert!(subscriber.is_closed());
        subscriber.patched(&message);
    }

    #[test]
    fn closures_are_listeners() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let listener = move |_: &ClientDocument<String>| {
            seen.fetch_add(1, Ordering::SeqCst);
        };
        listener.patched(&ClientDocument::new("doc", "a", String::new()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn channel_listener_forwards() {
        let (listener, mut receiver) = ChannelListener::<String>::new();
        let doc = ClientDocument::new("doc", "a", "text".to_string());
        listener.patched(&doc);
        assert_eq!(receiver.try_recv().unwrap(), doc);
    }
}
