//! Frame construction.
//!
//! [`FrameBuilder`] accumulates KV pairs and objects, then validates them
//! into an immutable [`Frame`].

use crate::command::Command;
use crate::frame::{Frame, KvList};
use crate::object::{KvPair, PayloadObject, RoutingObject};
use crate::WireError;
use bytes::Bytes;

/// Frame builder for constructing wire frames
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    command: Command,
    seq_no: u32,
    kv_pairs: KvList,
    routing_objects: Vec<RoutingObject>,
    payload_objects: Vec<PayloadObject>,
}

impl FrameBuilder {
    /// Create a new frame builder
    pub fn new(command: Command, seq_no: u32) -> Self {
        Self {
            command,
            seq_no,
            kv_pairs: KvList::new(),
            routing_objects: Vec::new(),
            payload_objects: Vec::new(),
        }
    }

    /// Replace the command
    pub fn command(mut self, command: Command) -> Self {
        self.command = command;
        self
    }

    /// Append a KV pair with a binary value
    pub fn kv(mut self, key: &str, value: impl Into<Bytes>) -> Self {
        self.kv_pairs.push(KvPair::new(key, value));
        self
    }

    /// Append a KV pair with a text value
    pub fn kv_str(self, key: &str, value: &str) -> Self {
        self.kv(key, Bytes::copy_from_slice(value.as_bytes()))
    }

    /// Append a routing object
    pub fn routing_object(mut self, ro: RoutingObject) -> Self {
        self.routing_objects.push(ro);
        self
    }

    /// Append routing objects, preserving their order
    pub fn routing_objects<I>(mut self, ros: I) -> Self
    where
        I: IntoIterator<Item = RoutingObject>,
    {
        self.routing_objects.extend(ros);
        self
    }

    /// Append a payload object
    pub fn payload_object(mut self, po: PayloadObject) -> Self {
        self.payload_objects.push(po);
        self
    }

    /// Append payload objects, preserving their order
    pub fn payload_objects<I>(mut self, pos: I) -> Self
    where
        I: IntoIterator<Item = PayloadObject>,
    {
        self.payload_objects.extend(pos);
        self
    }

    /// Build the frame
    pub fn build(self) -> Result<Frame, WireError> {
        if let Some(pair) = self.kv_pairs.iter().find(|p| !is_valid_key(p.key())) {
            return Err(WireError::InvalidKey(pair.key().to_string()));
        }

        Ok(Frame::from_parts(
            self.command,
            self.seq_no,
            self.kv_pairs,
            self.routing_objects,
            self.payload_objects,
        ))
    }
}

/// Keys share the item header line with the length, so they must be
/// non-empty and free of whitespace.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && !key.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control())
}
