pub mod engine;
pub mod message;
pub mod topic;

pub use engine::{Hub, IdGenerator, UuidGenerator};
pub use message::{Envelope, Frame};
pub use topic::{Topic, Visibility};
