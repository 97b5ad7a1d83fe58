//! Client representation
//!
//! `Client` models one subscriber identity. It owns its private topics, sees
//! the hub's public topics through a shared handle, and owns the sending side
//! of its outbound queue while a delivery driver is attached.
//!
//! Locks, in the order they may be taken:
//! 1. `topics` (this client's private topics),
//! 2. the hub's public topic map (read),
//! 3. a topic's subscriber set,
//! 4. `delivery` (a leaf: nothing is acquired while it is held).
//!
//! Queues are unbounded, so a push never blocks while a lock is held.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::broker::message::{self, Envelope, Frame, SysKind};
use crate::broker::topic::{SharedTopics, Topic, TopicMap, Visibility};
use crate::utils::{PubSubError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// No driver attached; pushes are dropped.
    Idle,
    /// A driver holds a [`ClientStream`] and drains the queue.
    Active,
}

/// Outcome of pushing a frame onto a client's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// The client is idle; the frame was discarded.
    Idle,
    /// The receiving end went away before the client noticed.
    Closed,
}

#[derive(Debug, Default)]
struct DeliverySlot {
    sender: Option<UnboundedSender<Frame>>,
    generation: u64,
    closed: bool,
}

#[derive(Debug, Default)]
struct OwnedTopics {
    private: TopicMap,
    closed: bool,
}

#[derive(Debug)]
pub struct Client {
    id: String,
    topics: Mutex<OwnedTopics>,
    public_topics: SharedTopics,
    delivery: Mutex<DeliverySlot>,
}

impl Client {
    /// Create an idle client that sees `public_topics`. Clients are normally
    /// created through [`crate::broker::Hub::get_or_create_client`].
    pub fn new(id: impl Into<String>, public_topics: SharedTopics) -> Self {
        Self {
            id: id.into(),
            topics: Mutex::new(OwnedTopics::default()),
            public_topics,
            delivery: Mutex::new(DeliverySlot::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> DeliveryState {
        if self.delivery_lock().sender.is_some() {
            DeliveryState::Active
        } else {
            DeliveryState::Idle
        }
    }

    fn topics_lock(&self) -> MutexGuard<'_, OwnedTopics> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn delivery_lock(&self) -> MutexGuard<'_, DeliverySlot> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self, owned: &OwnedTopics) -> Result<()> {
        if owned.closed {
            return Err(PubSubError::client_not_found(&self.id));
        }
        Ok(())
    }

    /// Push a pre-encoded frame onto the outbound queue.
    pub fn push(&self, frame: Frame) -> Delivery {
        let slot = self.delivery_lock();
        match &slot.sender {
            None => Delivery::Idle,
            Some(tx) => match tx.send(frame) {
                Ok(()) => Delivery::Queued,
                Err(_) => Delivery::Closed,
            },
        }
    }

    fn notify(&self, envelope: Envelope) {
        match envelope.encode() {
            Ok(Some(frame)) => {
                if self.push(frame) == Delivery::Closed {
                    warn!(client = %self.id, "queue closed, notification dropped");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(client = %self.id, "failed to encode notification: {e}"),
        }
    }

    // -------------------------------------------------------------------------
    //  Topic view
    // -------------------------------------------------------------------------

    fn view(&self, owned: &OwnedTopics) -> BTreeMap<String, Arc<Topic>> {
        let mut view: BTreeMap<String, Arc<Topic>> = self
            .public_topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, topic)| (name.clone(), topic.clone()))
            .collect();
        // private topics shadow public ones of the same name
        for (name, topic) in &owned.private {
            view.insert(name.clone(), topic.clone());
        }
        view
    }

    fn resolve(&self, owned: &OwnedTopics, name: &str) -> Option<Arc<Topic>> {
        if let Some(topic) = owned.private.get(name) {
            return Some(topic.clone());
        }
        self.public_topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn subscribed_in(&self, view: &BTreeMap<String, Arc<Topic>>) -> BTreeMap<String, Arc<Topic>> {
        view.iter()
            .filter(|(_, topic)| topic.is_subscribed(&self.id))
            .map(|(name, topic)| (name.clone(), topic.clone()))
            .collect()
    }

    /// Private and public topics visible to this client, ordered by name.
    pub fn topics(&self) -> BTreeMap<String, Arc<Topic>> {
        let owned = self.topics_lock();
        self.view(&owned)
    }

    /// The subset of [`Client::topics`] this client is subscribed to.
    pub fn subscribed_topics(&self) -> BTreeMap<String, Arc<Topic>> {
        let owned = self.topics_lock();
        let view = self.view(&owned);
        self.subscribed_in(&view)
    }

    fn snapshot_envelope(&self, owned: &OwnedTopics) -> Envelope {
        let view = self.view(owned);
        let subscribed = self.subscribed_in(&view);
        Envelope::default()
            .with_sys(SysKind::Topics, message::topic_list(view.values()))
            .with_sys(SysKind::Subscribed, message::name_list(subscribed.values()))
    }

    /// One system frame carrying the full topic list and the full subscribed
    /// list. `None` when the client sees no topics at all.
    pub fn initial_snapshot(&self) -> Result<Option<Frame>> {
        let owned = self.topics_lock();
        self.snapshot_envelope(&owned).encode()
    }

    // -------------------------------------------------------------------------
    //  Private topics
    // -------------------------------------------------------------------------

    /// Create a private topic. Fails with `AlreadyExists` if this client owns
    /// one of that name or a public topic is registered under it.
    pub fn create_private_topic(&self, name: &str) -> Result<Arc<Topic>> {
        let mut owned = self.topics_lock();
        self.ensure_open(&owned)?;
        let public_clash = self
            .public_topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name);
        if public_clash || owned.private.contains_key(name) {
            return Err(PubSubError::AlreadyExists(name.to_string()));
        }

        let topic = Arc::new(Topic::new(name, Visibility::Private));
        owned.private.insert(name.to_string(), topic.clone());
        info!(client = %self.id, topic = name, "private topic created");

        let view = self.view(&owned);
        self.notify(message::topics_changed(view.values()));
        Ok(topic)
    }

    /// Remove a private topic, force-unsubscribing everyone on it. Each evicted
    /// subscriber is told with an `unsubscribed` notification.
    pub fn remove_private_topic(&self, name: &str) -> Result<()> {
        let mut owned = self.topics_lock();
        self.ensure_open(&owned)?;
        let topic = owned
            .private
            .remove(name)
            .ok_or_else(|| PubSubError::topic_not_found(name))?;

        // only the owner can be subscribed; notify under the lock like subscribe
        for subscriber in topic.remove_all_subscribers() {
            subscriber.notify(message::unsubscribed(name));
        }
        drop(owned);
        info!(client = %self.id, topic = name, "private topic removed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    //  Subscriptions
    // -------------------------------------------------------------------------

    /// Subscribe to a private topic of this client or, failing that, a public
    /// topic. Subscribing twice is not an error and notifies again.
    pub fn subscribe(self: &Arc<Self>, name: &str) -> Result<()> {
        let owned = self.topics_lock();
        self.ensure_open(&owned)?;
        let topic = self
            .resolve(&owned, name)
            .ok_or_else(|| PubSubError::topic_not_found(name))?;

        topic.add_subscriber(self);
        // queued under the topics lock so notifications follow call order
        self.notify(message::subscribed(topic.name()));
        debug!(client = %self.id, topic = name, "subscribed");
        Ok(())
    }

    pub fn unsubscribe(&self, name: &str) -> Result<()> {
        let owned = self.topics_lock();
        self.ensure_open(&owned)?;
        let topic = self
            .resolve(&owned, name)
            .ok_or_else(|| PubSubError::topic_not_found(name))?;

        if !topic.remove_subscriber(&self.id) {
            return Err(PubSubError::NotSubscribed {
                client: self.id.clone(),
                topic: name.to_string(),
            });
        }
        self.notify(message::unsubscribed(topic.name()));
        debug!(client = %self.id, topic = name, "unsubscribed");
        Ok(())
    }

    /// Publish to one of this client's own private topics. The client must be
    /// attached to a delivery driver.
    pub fn publish<T>(&self, name: &str, data: &T) -> Result<usize>
    where
        T: Serialize + ?Sized,
    {
        if self.state() == DeliveryState::Idle {
            return Err(PubSubError::NotReceiving(self.id.clone()));
        }
        let topic = self
            .topics_lock()
            .private
            .get(name)
            .cloned()
            .ok_or_else(|| PubSubError::topic_not_found(name))?;
        topic.publish(data)
    }

    // -------------------------------------------------------------------------
    //  Delivery driver boundary
    // -------------------------------------------------------------------------

    /// Hand the outbound queue to a delivery driver: Idle → Active.
    ///
    /// A fresh queue is installed with the initial snapshot as its first frame.
    /// A previously attached stream is superseded and ends after draining what
    /// it already holds. Attaching a torn-down client yields a stream that is
    /// already at its end.
    pub fn attach(self: &Arc<Self>) -> ClientStream {
        let (tx, rx) = mpsc::unbounded_channel();

        // hold the topics lock so no notification falls between the snapshot
        // and the new queue
        let owned = self.topics_lock();
        let snapshot = self.snapshot_envelope(&owned).encode();
        let mut slot = self.delivery_lock();

        if slot.closed {
            return ClientStream {
                client: self.clone(),
                rx,
                generation: slot.generation,
            };
        }

        match snapshot {
            Ok(Some(frame)) => {
                let _ = tx.send(frame);
            }
            Ok(None) => {}
            Err(e) => warn!(client = %self.id, "failed to encode initial snapshot: {e}"),
        }

        slot.generation += 1;
        if slot.sender.replace(tx).is_some() {
            debug!(client = %self.id, "previous stream superseded");
        }
        info!(client = %self.id, "stream attached");

        ClientStream {
            client: self.clone(),
            rx,
            generation: slot.generation,
        }
    }

    fn detach(&self, generation: u64) {
        let mut slot = self.delivery_lock();
        if slot.generation == generation && slot.sender.take().is_some() {
            info!(client = %self.id, "stream detached");
        }
    }

    /// Tear the client down: drop every subscription, discard private topics
    /// and end the attached stream. Called by the hub while removing the
    /// client; later subscription changes fail with `NotFound`.
    pub(crate) fn teardown(&self) {
        let mut evicted = Vec::new();
        {
            let mut owned = self.topics_lock();
            if owned.closed {
                return;
            }
            owned.closed = true;

            let private = std::mem::take(&mut owned.private);
            for topic in private.values() {
                for subscriber in topic.remove_all_subscribers() {
                    if subscriber.id == self.id {
                        self.notify(message::unsubscribed(topic.name()));
                    } else {
                        evicted.push((subscriber, topic.clone()));
                    }
                }
            }

            let public: Vec<Arc<Topic>> = self
                .public_topics
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .values()
                .cloned()
                .collect();
            for topic in public {
                if topic.remove_subscriber(&self.id) {
                    self.notify(message::unsubscribed(topic.name()));
                }
            }
        }

        for (subscriber, topic) in evicted {
            subscriber.notify(message::unsubscribed(topic.name()));
        }

        let mut slot = self.delivery_lock();
        slot.closed = true;
        slot.sender = None;
    }
}

/// Receiving end of a client's outbound queue, held by a delivery driver.
///
/// While it exists the client is Active. Dropping it returns the client to
/// Idle unless a newer stream has replaced it.
#[derive(Debug)]
pub struct ClientStream {
    client: Arc<Client>,
    rx: UnboundedReceiver<Frame>,
    generation: u64,
}

impl ClientStream {
    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    /// Wait for the next frame. `None` once the stream has been superseded or
    /// the client torn down, after everything already queued was read.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`ClientStream::recv`].
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }
}

impl Drop for ClientStream {
    fn drop(&mut self) {
        self.client.detach(self.generation);
    }
}
