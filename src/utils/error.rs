//! The `error` module defines the error type shared by the hub, its clients
//! and topics.
//!
//! Every registry operation reports failure synchronously through
//! [`PubSubError`]; nothing is retried internally. Fanout failures towards a
//! single subscriber are logged by the topic and never surface here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PubSubError {
    #[error("topic {0} already exists")]
    AlreadyExists(String),

    #[error("{kind} {name} does not exist")]
    NotFound { kind: &'static str, name: String },

    #[error("client {client} is not subscribed to topic {topic}")]
    NotSubscribed { client: String, topic: String },

    #[error("client {0} is not receiving data")]
    NotReceiving(String),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PubSubError {
    pub(crate) fn client_not_found(id: &str) -> Self {
        PubSubError::NotFound {
            kind: "client",
            name: id.to_string(),
        }
    }

    pub(crate) fn topic_not_found(name: &str) -> Self {
        PubSubError::NotFound {
            kind: "topic",
            name: name.to_string(),
        }
    }

    /// HTTP-style status code used by the registration surface when it turns
    /// an error into a reply.
    pub fn status(&self) -> u16 {
        match self {
            PubSubError::NotFound { .. } => 404,
            PubSubError::AlreadyExists(_) => 409,
            PubSubError::NotSubscribed { .. } => 400,
            PubSubError::NotReceiving(_) => 412,
            PubSubError::Encode(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, PubSubError>;
