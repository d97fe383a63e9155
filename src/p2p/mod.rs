//! Peer and message-channel abstractions consumed by the rate limiter.

mod message;
mod peer;
mod pipe;

pub use message::{Message, MessageChannel};
pub use peer::{NodeId, Peer, PeerInfo, NODE_ID_LEN, UNKNOWN_ADDRESS};
pub use pipe::{message_pipe, PipeCloser, PipeEnd, PipeError};
