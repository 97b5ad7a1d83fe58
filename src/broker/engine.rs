//! Hub engine
//!
//! The `Hub` is the registry of clients and public topics. It is an ordinary
//! value: construct one, share it behind an `Arc`, pass it to whatever needs it.
//!
//! Concurrency and usage notes:
//! - Client creation and removal are serialized by the hub's client-map lock.
//!   That lock is taken before any client or topic lock, never after.
//! - Public topics live in a map shared with every client. Only the hub writes
//!   to it, through [`Hub::register_public_topic`].
//! - Removing a client tears it down while the client-map lock is held, so a
//!   removed id is never observable as a subscriber once `remove_client`
//!   returns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::broker::topic::{SharedTopics, SubscriberId, Topic, Visibility};
use crate::client::Client;
use crate::utils::{PubSubError, Result};

/// Source of fresh client ids for callers that do not bring their own.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random UUID v4 ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

pub struct Hub {
    clients: Mutex<HashMap<SubscriberId, Arc<Client>>>,
    public_topics: SharedTopics,
    ids: Box<dyn IdGenerator>,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("clients", &self.client_ids())
            .field("public_topics", &self.public_topic_names())
            .finish()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        Self::with_id_generator(UuidGenerator)
    }

    pub fn with_id_generator(ids: impl IdGenerator + 'static) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            public_topics: Arc::new(RwLock::new(HashMap::new())),
            ids: Box::new(ids),
        }
    }

    fn clients_lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, Arc<Client>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the client registered under `id`, creating it if needed.
    ///
    /// An empty `id` asks the hub to pick a fresh one. Asking again for an
    /// existing id returns the same client unchanged.
    pub fn get_or_create_client(&self, id: &str) -> Arc<Client> {
        let mut clients = self.clients_lock();

        let id = if id.is_empty() {
            let mut fresh = self.ids.next_id();
            while clients.contains_key(&fresh) {
                fresh = self.ids.next_id();
            }
            fresh
        } else {
            id.to_string()
        };

        if let Some(existing) = clients.get(&id) {
            return existing.clone();
        }

        let client = Arc::new(Client::new(id.clone(), self.public_topics.clone()));
        clients.insert(id.clone(), client.clone());
        info!(client = %id, "client created");
        client
    }

    pub fn get_client(&self, id: &str) -> Result<Arc<Client>> {
        self.clients_lock()
            .get(id)
            .cloned()
            .ok_or_else(|| PubSubError::client_not_found(id))
    }

    /// Remove a client after unsubscribing it from every topic and discarding
    /// its private topics. An attached stream ends once drained.
    pub fn remove_client(&self, id: &str) -> Result<()> {
        let mut clients = self.clients_lock();
        let client = clients
            .get(id)
            .cloned()
            .ok_or_else(|| PubSubError::client_not_found(id))?;

        client.teardown();
        clients.remove(id);
        info!(client = %id, "client removed");
        Ok(())
    }

    /// Ids of every registered client, sorted.
    pub fn client_ids(&self) -> Vec<SubscriberId> {
        let mut ids: Vec<_> = self.clients_lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Register a public topic, visible to every current and future client.
    pub fn register_public_topic(&self, name: &str) -> Result<Arc<Topic>> {
        let mut topics = self
            .public_topics
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if topics.contains_key(name) {
            return Err(PubSubError::AlreadyExists(name.to_string()));
        }
        let topic = Arc::new(Topic::new(name, Visibility::Public));
        topics.insert(name.to_string(), topic.clone());
        info!(topic = name, "public topic registered");
        Ok(topic)
    }

    pub fn public_topic(&self, name: &str) -> Result<Arc<Topic>> {
        self.public_topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| PubSubError::topic_not_found(name))
    }

    /// Names of the registered public topics, sorted.
    pub fn public_topic_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .public_topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Publish on a public topic. This is the only way to publish on one;
    /// clients publish only on the private topics they own.
    pub fn publish_public<T>(&self, name: &str, data: &T) -> Result<usize>
    where
        T: Serialize + ?Sized,
    {
        let topic = self.public_topic(name)?;
        topic.publish(data)
    }
}
