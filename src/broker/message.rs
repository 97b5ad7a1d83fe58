//! Wire envelope
//!
//! Every frame pushed onto a client's outbound queue is one JSON object:
//!
//! ```json
//! {
//!   "sys":     [ { "type": "topics", "list": [ { "name": "news", "type": "public" } ] } ],
//!   "updates": [ { "topic": "news", "data": { "headline": "..." } } ]
//! }
//! ```
//!
//! `sys` carries control notifications (topic list changes, subscription
//! changes) and `updates` carries published data. Either array is omitted when
//! empty, and an envelope with nothing in it encodes to no frame at all.
//!
//! The encoder is pure: callers pass in everything that goes on the wire, so
//! the same input always yields the same bytes.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::broker::topic::{Topic, Visibility};
use crate::utils::Result;

/// A pre-encoded wire frame. Shared so one publish is encoded once and handed
/// to every subscriber without copying.
pub type Frame = Arc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SysKind {
    Topics,
    Subscribed,
    Unsubscribed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicEntry {
    pub name: String,
    /// Only filled in for `topics` entries.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SysEntry {
    #[serde(rename = "type")]
    pub kind: SysKind,
    pub list: Vec<TopicEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Update {
    pub topic: String,
    pub data: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sys: Vec<SysEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub updates: Vec<Update>,
}

impl Envelope {
    pub fn is_empty(&self) -> bool {
        self.sys.is_empty() && self.updates.is_empty()
    }

    /// Appends a system entry. Entries with an empty list carry no information
    /// and are skipped.
    pub fn with_sys(mut self, kind: SysKind, list: Vec<TopicEntry>) -> Self {
        if !list.is_empty() {
            self.sys.push(SysEntry { kind, list });
        }
        self
    }

    pub fn with_update(mut self, topic: &str, data: Value) -> Self {
        self.updates.push(Update {
            topic: topic.to_string(),
            data,
        });
        self
    }

    /// Encodes the envelope, or returns `None` when there is nothing to send.
    pub fn encode(&self) -> Result<Option<Frame>> {
        if self.is_empty() {
            return Ok(None);
        }
        let json = serde_json::to_string(self)?;
        Ok(Some(Frame::from(json)))
    }
}

/// `topics` entry listing every topic with its visibility.
pub fn topic_list<'a, I>(topics: I) -> Vec<TopicEntry>
where
    I: IntoIterator<Item = &'a Arc<Topic>>,
{
    topics
        .into_iter()
        .map(|t| TopicEntry {
            name: t.name().to_string(),
            visibility: Some(t.visibility()),
        })
        .collect()
}

/// `subscribed`/`unsubscribed` entries carry bare names.
pub fn name_list<'a, I>(topics: I) -> Vec<TopicEntry>
where
    I: IntoIterator<Item = &'a Arc<Topic>>,
{
    topics
        .into_iter()
        .map(|t| TopicEntry {
            name: t.name().to_string(),
            visibility: None,
        })
        .collect()
}

pub fn topics_changed<'a, I>(topics: I) -> Envelope
where
    I: IntoIterator<Item = &'a Arc<Topic>>,
{
    Envelope::default().with_sys(SysKind::Topics, topic_list(topics))
}

pub fn subscribed(name: &str) -> Envelope {
    single(SysKind::Subscribed, name)
}

pub fn unsubscribed(name: &str) -> Envelope {
    single(SysKind::Unsubscribed, name)
}

fn single(kind: SysKind, name: &str) -> Envelope {
    Envelope::default().with_sys(
        kind,
        vec![TopicEntry {
            name: name.to_string(),
            visibility: None,
        }],
    )
}
