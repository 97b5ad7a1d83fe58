//! Topic management
//!
//! A `Topic` is a named channel with a visibility class and the set of clients
//! subscribed to it. The subscriber set is guarded by the topic's own lock and
//! holds weak references, so a topic never keeps a client alive.
//!
//! Publishing snapshots the subscriber set under the lock, releases it, and
//! only then pushes the encoded frame to each subscriber.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::broker::message::Envelope;
use crate::client::{Client, Delivery};
use crate::utils::Result;

pub type SubscriberId = String;

/// Name → topic mapping. The hub's public topics are shared by every client
/// through a [`SharedTopics`] handle.
pub type TopicMap = HashMap<String, Arc<Topic>>;
pub type SharedTopics = Arc<RwLock<TopicMap>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    /// Reserved for multi-owner topics; currently single-owner like `Private`.
    Group,
}

#[derive(Debug)]
pub struct Topic {
    name: String,
    visibility: Visibility,
    subscribers: Mutex<HashMap<SubscriberId, Weak<Client>>>,
}

impl Topic {
    /// Create a new topic with no subscribers.
    pub fn new(name: &str, visibility: Visibility) -> Self {
        Self {
            name: name.to_string(),
            visibility,
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    fn subscribers_lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, Weak<Client>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a subscriber. Returns `false` if it was already subscribed.
    pub fn add_subscriber(&self, client: &Arc<Client>) -> bool {
        self.subscribers_lock()
            .insert(client.id().to_string(), Arc::downgrade(client))
            .is_none()
    }

    /// Remove a subscriber. Returns `false` if it was not subscribed.
    pub fn remove_subscriber(&self, id: &str) -> bool {
        self.subscribers_lock().remove(id).is_some()
    }

    /// Empty the subscriber set, returning the clients that are still alive.
    pub(crate) fn remove_all_subscribers(&self) -> Vec<Arc<Client>> {
        let drained: Vec<_> = self.subscribers_lock().drain().collect();
        drained
            .into_iter()
            .filter_map(|(_, weak)| weak.upgrade())
            .collect()
    }

    pub fn is_subscribed(&self, id: &str) -> bool {
        self.subscribers_lock().contains_key(id)
    }

    /// Point-in-time copy of the subscriber ids.
    pub fn subscribers(&self) -> HashSet<SubscriberId> {
        self.subscribers_lock().keys().cloned().collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers_lock().len()
    }

    /// Fan `data` out to every current subscriber as an `updates` frame.
    ///
    /// The frame is encoded once. Subscribers that are gone, idle or whose
    /// queue has closed are skipped; only an encoding failure is returned.
    /// On success returns how many subscriber queues accepted the frame.
    pub fn publish<T>(&self, data: &T) -> Result<usize>
    where
        T: Serialize + ?Sized,
    {
        let data = serde_json::to_value(data)?;
        let Some(frame) = Envelope::default().with_update(&self.name, data).encode()? else {
            return Ok(0);
        };

        let targets: Vec<(SubscriberId, Weak<Client>)> = self
            .subscribers_lock()
            .iter()
            .map(|(id, weak)| (id.clone(), weak.clone()))
            .collect();

        let mut queued = 0;
        for (id, weak) in targets {
            let Some(client) = weak.upgrade() else {
                warn!(topic = %self.name, client = %id, "subscriber is gone, skipping");
                continue;
            };
            match client.push(frame.clone()) {
                Delivery::Queued => queued += 1,
                Delivery::Idle => {
                    debug!(topic = %self.name, client = %id, "subscriber not receiving, update dropped")
                }
                Delivery::Closed => {
                    warn!(topic = %self.name, client = %id, "subscriber queue closed, update dropped")
                }
            }
        }

        debug!(topic = %self.name, queued, "published update");
        Ok(queued)
    }
}
