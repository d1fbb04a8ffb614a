//! Application Services
//!
//! - [`Dispatcher`]: routes merged events to subscriber callbacks
//! - [`MessageLog`]: bounded history of segment-wide messages

mod dispatcher;
mod message_log;

pub use dispatcher::Dispatcher;
pub use message_log::{DEFAULT_MESSAGE_LOG_CAPACITY, MessageLog};
