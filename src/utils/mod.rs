//! The `utils` module holds the pieces shared by every other module: the
//! crate-wide error type and tracing initialization.

pub mod error;
pub mod logging;

pub use error::{PubSubError, Result};
