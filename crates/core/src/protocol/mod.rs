//! Wire protocol spoken to the DMX bridge.
//!
//! Every command is a length-prefixed frame:
//!
//! ```text
//! [frame_length][command_id][payload...]
//! ```
//!
//! `frame_length` counts the bytes after itself. The bridge answers each frame
//! with a single byte echoing `command_id`. That echo is only a coarse sanity
//! check for the round trip, so a mismatch is reported as a warning and the
//! command still counts as sent.

use crate::{error::TransportError, transport::Transport, ShowError};

/// Command id of a DMX channel write.
pub const CMD_DMX_WRITE: u8 = 0x01;

/// Largest payload that still fits the one-byte length prefix.
pub const MAX_PAYLOAD: usize = u8::MAX as usize - 1;

/// One channel write, relative to the fixture's base address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmxWrite {
    pub channel: u8,
    pub value: u8,
}

impl DmxWrite {
    pub fn new(channel: u8, value: u8) -> Self {
        Self { channel, value }
    }
}

/// Logical commands understood by the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    DmxWrite(Vec<DmxWrite>),
}

impl Command {
    pub fn id(&self) -> u8 {
        match self {
            Command::DmxWrite(_) => CMD_DMX_WRITE,
        }
    }

    /// Payload bytes, without the frame header.
    pub fn payload(&self) -> Result<Vec<u8>, TransportError> {
        match self {
            Command::DmxWrite(writes) => {
                let count = u8::try_from(writes.len())
                    .map_err(|_| TransportError::FrameTooLarge(1 + writes.len() * 2))?;
                let mut payload = Vec::with_capacity(1 + writes.len() * 2);
                payload.push(count);
                for write in writes {
                    payload.push(write.channel);
                    payload.push(write.value);
                }
                Ok(payload)
            }
        }
    }

    /// Complete frame bytes ready for the transport.
    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        encode_frame(self.id(), &self.payload()?)
    }
}

/// Wraps `payload` into a `[len][command_id][payload]` frame.
pub fn encode_frame(command_id: u8, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(TransportError::FrameTooLarge(payload.len()));
    }
    let mut frame = Vec::with_capacity(payload.len() + 2);
    frame.push((payload.len() + 1) as u8);
    frame.push(command_id);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Checks that the acknowledgment byte echoes the sent command id.
pub fn validate_ack(sent: u8, received: u8) -> Result<(), ShowError> {
    if sent == received {
        Ok(())
    } else {
        Err(ShowError::ProtocolMismatch {
            expected: sent,
            received,
        })
    }
}

/// Frames commands onto a transport and checks the acknowledgment.
pub struct Codec {
    transport: Box<dyn Transport>,
    mismatches: usize,
}

impl Codec {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            mismatches: 0,
        }
    }

    /// Sends one frame and waits for its acknowledgment.
    ///
    /// Blocks at most for the transport's configured timeout. Never retries.
    pub fn send(&mut self, command_id: u8, payload: &[u8]) -> Result<(), TransportError> {
        let frame = encode_frame(command_id, payload)?;
        let written = self.transport.write(&frame)?;
        if written != frame.len() {
            return Err(TransportError::ShortWrite {
                written,
                expected: frame.len(),
            });
        }

        let mut ack = [0u8; 1];
        if self.transport.read(&mut ack)? == 0 {
            return Err(TransportError::Timeout);
        }

        if let Err(err) = validate_ack(command_id, ack[0]) {
            self.mismatches += 1;
            tracing::warn!(%err, "received command is not the sent command");
        }
        Ok(())
    }

    pub fn send_command(&mut self, command: &Command) -> Result<(), TransportError> {
        self.send(command.id(), &command.payload()?)
    }

    /// Number of acknowledgment mismatches seen so far.
    pub fn mismatches(&self) -> usize {
        self.mismatches
    }

    pub fn close(&mut self) {
        self.transport.close();
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("mismatches", &self.mismatches)
            .finish()
    }
}
