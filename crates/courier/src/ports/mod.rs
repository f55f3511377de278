//! Ports (hexagonal architecture).

pub mod inbound;
pub mod outbound;

pub use inbound::{Handler, HandlerFuture, SubscribeOptions, Validator};
pub use outbound::MessageLogger;
