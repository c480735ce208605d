//! Socket Transport Trait Definition
//!
//! The realtime client never owns a socket directly. It hands a
//! [`TransportSink`] to whatever implements [`SocketTransport`] and reads the
//! resulting events back out of its [`Mailbox`](crate::mailbox::Mailbox).
//! Transports may invoke the sink from any thread.

use crate::error::TransportError;
use crate::mailbox::TransportSink;

// ----------------------------------------------------------------------------
// Frame Opcodes
// ----------------------------------------------------------------------------

/// WebSocket opcodes reported with each data callback
pub mod opcode {
    pub const CONTINUATION: u8 = 0x0;
    pub const TEXT: u8 = 0x1;
    pub const BINARY: u8 = 0x2;
    pub const CLOSE: u8 = 0x8;
    pub const PING: u8 = 0x9;
    pub const PONG: u8 = 0xA;
}

/// One data callback's worth of bytes
///
/// Transports that deliver large messages in pieces report each piece with
/// its `offset` into a message of `total_len` bytes. A message delivered in
/// one go has offset 0 and `total_len == data.len()`.
#[derive(Debug, Clone, Copy)]
pub struct DataFrame<'a> {
    pub opcode: u8,
    pub data: &'a [u8],
    pub offset: usize,
    pub total_len: usize,
}

impl<'a> DataFrame<'a> {
    /// A complete message in a single callback
    pub fn complete(opcode: u8, data: &'a [u8]) -> Self {
        Self {
            opcode,
            data,
            offset: 0,
            total_len: data.len(),
        }
    }

    /// Complete text message
    pub fn text(text: &'a str) -> Self {
        Self::complete(opcode::TEXT, text.as_bytes())
    }

    /// A piece of a larger message
    pub fn fragment(opcode: u8, data: &'a [u8], offset: usize, total_len: usize) -> Self {
        Self {
            opcode,
            data,
            offset,
            total_len,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.offset == 0 && self.data.len() == self.total_len
    }
}

// ----------------------------------------------------------------------------
// Socket Transport Trait
// ----------------------------------------------------------------------------

/// A WebSocket-like connection the realtime client can drive
///
/// `connect` starts an attempt and returns immediately; success or failure is
/// reported later through the sink. Every connect receives a fresh sink and a
/// transport must stop using the previous one.
pub trait SocketTransport {
    /// Begin connecting to `url`, reporting events through `sink`
    fn connect(&mut self, url: &str, sink: TransportSink) -> Result<(), TransportError>;

    /// Queue a text frame for sending
    fn send_text(&mut self, frame: &str) -> Result<(), TransportError>;

    /// Close the current connection, if any
    fn close(&mut self);
}

impl<T: SocketTransport + ?Sized> SocketTransport for Box<T> {
    fn connect(&mut self, url: &str, sink: TransportSink) -> Result<(), TransportError> {
        (**self).connect(url, sink)
    }

    fn send_text(&mut self, frame: &str) -> Result<(), TransportError> {
        (**self).send_text(frame)
    }

    fn close(&mut self) {
        (**self).close()
    }
}
