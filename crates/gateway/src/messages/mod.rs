//! Message types crossing the bridge
//!
//! - `callback`: raw broker callbacks as the client library delivers them
//! - `event`: typed events delivered to the consumer
//! - `request`: outbound requests handed to the client library

pub mod callback;
pub mod event;
pub mod request;
