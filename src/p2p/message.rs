//! Messages and the duplex channel abstraction.

use async_trait::async_trait;

/// A protocol message as it travels over a [`MessageChannel`].
///
/// The payload is opaque here; decoding belongs to the protocol loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Protocol message code
    pub code: u64,
    /// Encoded payload
    pub payload: Vec<u8>,
}

impl Message {
    /// Create a message.
    pub fn new(code: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            payload: payload.into(),
        }
    }

    /// Payload length in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// A duplex, message-oriented stream.
///
/// `read_message` waits until a message arrives or the channel fails.
/// Closing the channel out-of-band must make a pending read return an error.
#[async_trait]
pub trait MessageChannel: Send {
    /// Message type carried by this channel.
    type Message: Send;
    /// Error returned by reads and writes.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read the next message.
    async fn read_message(&mut self) -> Result<Self::Message, Self::Error>;

    /// Write a message.
    async fn write_message(&mut self, msg: Self::Message) -> Result<(), Self::Error>;
}

#[async_trait]
impl<C: MessageChannel + ?Sized> MessageChannel for Box<C> {
    type Message = C::Message;
    type Error = C::Error;

    async fn read_message(&mut self) -> Result<Self::Message, Self::Error> {
        (**self).read_message().await
    }

    async fn write_message(&mut self, msg: Self::Message) -> Result<(), Self::Error> {
        (**self).write_message(msg).await
    }
}
