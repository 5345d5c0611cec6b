//! Values delivered back to callers.

use bw_wire::{Frame, PayloadObject, RoutingObject};

/// Status value the router uses for success
pub const STATUS_OKAY: &str = "okay";

/// KV keys read from inbound frames
pub mod keys {
    /// Response status
    pub const STATUS: &str = "status";
    /// Failure reason, present when status is not okay
    pub const REASON: &str = "reason";
    /// URI a message was published on
    pub const URI: &str = "uri";
    /// Sender of a message
    pub const FROM: &str = "from";
    /// Whether the router delivered the objects inline
    pub const UNPACK: &str = "unpack";
    /// End of a list stream
    pub const FINISHED: &str = "finished";
    /// One list result
    pub const CHILD: &str = "child";
}

/// Status reply to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status string, `okay` on success
    pub status: String,
    /// Reason, only read when the status is not `okay`
    pub reason: Option<String>,
}

impl Response {
    /// Successful response
    pub fn okay() -> Self {
        Self {
            status: STATUS_OKAY.to_string(),
            reason: None,
        }
    }

    /// Whether the router reported success
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OKAY
    }

    /// Decode a RESPONSE frame.
    ///
    /// A missing status decodes as an empty (and therefore failed) status.
    pub fn from_frame(frame: &Frame) -> Self {
        let status = frame.get_first_str(keys::STATUS).unwrap_or_default();
        let reason = if status == STATUS_OKAY {
            None
        } else {
            frame.get_first_str(keys::REASON)
        };
        Self { status, reason }
    }
}

/// Message delivered to a subscription
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    /// Sender identifier
    pub from: String,
    /// URI the message was published on
    pub uri: String,
    /// Whether the objects below were delivered
    pub unpacked: bool,
    /// Routing objects; empty unless unpacked
    pub routing_objects: Vec<RoutingObject>,
    /// Payload objects; empty unless unpacked
    pub payload_objects: Vec<PayloadObject>,
}

impl Message {
    /// Decode a RESULT frame for a subscription.
    ///
    /// Objects are only taken from the frame when it says `unpack=true`,
    /// whatever the frame actually carries.
    pub fn from_frame(frame: &Frame) -> Self {
        let unpacked = frame.get_first_bool(keys::UNPACK).unwrap_or(false);
        let (routing_objects, payload_objects) = if unpacked {
            (
                frame.routing_objects().to_vec(),
                frame.payload_objects().to_vec(),
            )
        } else {
            (Vec::new(), Vec::new())
        };

        Self {
            from: frame.get_first_str(keys::FROM).unwrap_or_default(),
            uri: frame.get_first_str(keys::URI).unwrap_or_default(),
            unpacked,
            routing_objects,
            payload_objects,
        }
    }
}

/// One event on a list stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEvent {
    /// A child URI
    Child(String),
    /// No more children will follow
    Finished,
}

impl ListEvent {
    /// Decode a RESULT frame for a list request.
    ///
    /// Returns `None` for a non-final frame that carries no child.
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        if frame.get_first_bool(keys::FINISHED).unwrap_or(false) {
            return Some(ListEvent::Finished);
        }
        frame.get_first_str(keys::CHILD).map(ListEvent::Child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bw_wire::{Command, FrameBuilder, PayloadType};
    use bytes::Bytes;

    fn result_frame(unpack: &str) -> Frame {
        FrameBuilder::new(Command::Result, 4)
            .kv_str("uri", "scratch.ns/a")
            .kv_str("from", "sender-vk")
            .kv_str("unpack", unpack)
            .routing_object(RoutingObject::new(2, Bytes::from_static(b"ro")))
            .payload_object(PayloadObject::new(PayloadType(1), Bytes::from_static(b"po")))
            .build()
            .unwrap()
    }

    #[test]
    fn test_okay_response_has_no_reason() {
        let frame = FrameBuilder::new(Command::Response, 1)
            .kv_str("status", "okay")
            .kv_str("reason", "ignored")
            .build()
            .unwrap();
        assert_eq!(Response::from_frame(&frame), Response::okay());
    }

    #[test]
    fn test_failed_response() {
        let frame = FrameBuilder::new(Command::Response, 1)
            .kv_str("status", "error")
            .kv_str("reason", "no permission")
            .build()
            .unwrap();
        let response = Response::from_frame(&frame);
        assert!(!response.is_ok());
        assert_eq!(response.status, "error");
        assert_eq!(response.reason.as_deref(), Some("no permission"));
    }

    #[test]
    fn test_failed_response_without_reason() {
        let frame = FrameBuilder::new(Command::Response, 1)
            .kv_str("status", "error")
            .build()
            .unwrap();
        assert_eq!(Response::from_frame(&frame).reason, None);
    }

    #[test]
    fn test_message_unpacked() {
        let frame = result_frame("true");
        let message = Message::from_frame(&frame);
        assert!(message.unpacked);
        assert_eq!(message.from, "sender-vk");
        assert_eq!(message.uri, "scratch.ns/a");
        assert_eq!(message.routing_objects, frame.routing_objects());
        assert_eq!(message.payload_objects, frame.payload_objects());
    }

    #[test]
    fn test_message_left_packed() {
        let message = Message::from_frame(&result_frame("false"));
        assert!(!message.unpacked);
        assert!(message.routing_objects.is_empty());
        assert!(message.payload_objects.is_empty());
    }

    #[test]
    fn test_list_events() {
        let child = FrameBuilder::new(Command::Result, 2)
            .kv_str("finished", "false")
            .kv_str("child", "scratch.ns/a")
            .build()
            .unwrap();
        let done = FrameBuilder::new(Command::Result, 2)
            .kv_str("finished", "true")
            .build()
            .unwrap();
        let empty = FrameBuilder::new(Command::Result, 2).build().unwrap();

        assert_eq!(
            ListEvent::from_frame(&child),
            Some(ListEvent::Child("scratch.ns/a".into()))
        );
        assert_eq!(ListEvent::from_frame(&done), Some(ListEvent::Finished));
        assert_eq!(ListEvent::from_frame(&empty), None);
    }
}
