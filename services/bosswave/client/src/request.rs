//! Publish, subscribe and list requests.
//!
//! Each request turns into a single frame. Optional settings that are unset
//! are left out of the frame entirely rather than sent empty, so the router
//! applies its own defaults.

use bw_wire::{Command, Frame, FrameBuilder, PayloadObject, RoutingObject, WireError};
use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

/// KV keys used in request frames
pub mod keys {
    /// Target URI
    pub const URI: &str = "uri";
    /// Persist flag on publish
    pub const PERSIST: &str = "persist";
    /// Absolute expiry, RFC 3339
    pub const EXPIRY: &str = "expiry";
    /// Relative expiry, `<n>ms`
    pub const EXPIRY_DELTA: &str = "expirydelta";
    /// Primary access chain hash
    pub const PRIMARY_ACCESS_CHAIN: &str = "primary_access_chain";
    /// Ask the router to verify the access chain
    pub const DO_VERIFY: &str = "doverify";
    /// Chain elaboration level
    pub const ELABORATE_PAC: &str = "elaborate_pac";
    /// Deliver objects inline instead of packed
    pub const UNPACK: &str = "unpack";
}

/// How much access chain material the router should elaborate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChainElaborationLevel {
    /// Leave it to the router
    #[default]
    Unspecified,
    /// No elaboration
    None,
    /// Partial elaboration
    Partial,
    /// Full elaboration
    Full,
}

impl ChainElaborationLevel {
    /// Wire value, or `None` for [`ChainElaborationLevel::Unspecified`]
    pub fn as_wire(&self) -> Option<&'static str> {
        match self {
            ChainElaborationLevel::Unspecified => None,
            ChainElaborationLevel::None => Some("none"),
            ChainElaborationLevel::Partial => Some("partial"),
            ChainElaborationLevel::Full => Some("full"),
        }
    }
}

/// Publish a message to a URI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishRequest {
    /// Target URI
    pub uri: String,
    /// Persist the message on the router (sent as `pers` instead of `publ`)
    pub persist: bool,
    /// Absolute expiry
    pub expiry: Option<DateTime<Utc>>,
    /// Expiry relative to receipt
    pub expiry_delta: Option<Duration>,
    /// Primary access chain
    pub primary_access_chain: Option<String>,
    /// Ask the router to verify the chain
    pub do_verify: bool,
    /// Chain elaboration level
    pub elaboration: ChainElaborationLevel,
    /// Routing objects, sent in order
    pub routing_objects: Vec<RoutingObject>,
    /// Payload objects, sent in order
    pub payload_objects: Vec<PayloadObject>,
}

/// Subscribe to messages published on a URI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeRequest {
    /// URI or URI pattern
    pub uri: String,
    /// Absolute expiry
    pub expiry: Option<DateTime<Utc>>,
    /// Expiry relative to receipt
    pub expiry_delta: Option<Duration>,
    /// Primary access chain
    pub primary_access_chain: Option<String>,
    /// Ask the router to verify the chain
    pub do_verify: bool,
    /// Chain elaboration level
    pub elaboration: ChainElaborationLevel,
    /// Leave delivered messages packed instead of unpacking their objects
    pub leave_packed: bool,
    /// Routing objects, sent in order
    pub routing_objects: Vec<RoutingObject>,
}

/// List the children of a URI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    /// Parent URI
    pub uri: String,
    /// Absolute expiry
    pub expiry: Option<DateTime<Utc>>,
    /// Expiry relative to receipt
    pub expiry_delta: Option<Duration>,
    /// Primary access chain
    pub primary_access_chain: Option<String>,
    /// Ask the router to verify the chain
    pub do_verify: bool,
    /// Chain elaboration level
    pub elaboration: ChainElaborationLevel,
    /// Routing objects, sent in order
    pub routing_objects: Vec<RoutingObject>,
}

impl PublishRequest {
    /// Request for `uri` with every option unset
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Frame for this request under `seq_no`
    pub fn to_frame(&self, seq_no: u32) -> Result<Frame, WireError> {
        let command = if self.persist {
            Command::Persist
        } else {
            Command::Publish
        };

        let builder = FrameBuilder::new(command, seq_no)
            .kv_str(keys::URI, &self.uri)
            .kv_str(keys::PERSIST, bool_str(self.persist));

        common_options(
            builder,
            self.expiry,
            self.expiry_delta,
            self.primary_access_chain.as_deref(),
            self.do_verify,
            self.elaboration,
        )
        .routing_objects(self.routing_objects.iter().cloned())
        .payload_objects(self.payload_objects.iter().cloned())
        .build()
    }
}

impl SubscribeRequest {
    /// Request for `uri` with every option unset
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Frame for this request under `seq_no`
    pub fn to_frame(&self, seq_no: u32) -> Result<Frame, WireError> {
        let builder = FrameBuilder::new(Command::Subscribe, seq_no).kv_str(keys::URI, &self.uri);

        let mut builder = common_options(
            builder,
            self.expiry,
            self.expiry_delta,
            self.primary_access_chain.as_deref(),
            self.do_verify,
            self.elaboration,
        );

        // Omitting the flag is how "leave packed" is requested.
        if !self.leave_packed {
            builder = builder.kv_str(keys::UNPACK, "true");
        }

        builder
            .routing_objects(self.routing_objects.iter().cloned())
            .build()
    }
}

impl ListRequest {
    /// Request for `uri` with every option unset
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Frame for this request under `seq_no`
    pub fn to_frame(&self, seq_no: u32) -> Result<Frame, WireError> {
        let builder = FrameBuilder::new(Command::List, seq_no).kv_str(keys::URI, &self.uri);

        common_options(
            builder,
            self.expiry,
            self.expiry_delta,
            self.primary_access_chain.as_deref(),
            self.do_verify,
            self.elaboration,
        )
        .routing_objects(self.routing_objects.iter().cloned())
        .build()
    }
}

fn common_options(
    mut builder: FrameBuilder,
    expiry: Option<DateTime<Utc>>,
    expiry_delta: Option<Duration>,
    primary_access_chain: Option<&str>,
    do_verify: bool,
    elaboration: ChainElaborationLevel,
) -> FrameBuilder {
    if let Some(expiry) = expiry {
        builder = builder.kv_str(keys::EXPIRY, &format_expiry(expiry));
    }
    if let Some(delta) = expiry_delta {
        builder = builder.kv_str(keys::EXPIRY_DELTA, &format_expiry_delta(delta));
    }
    if let Some(pac) = primary_access_chain {
        builder = builder.kv_str(keys::PRIMARY_ACCESS_CHAIN, pac);
    }
    builder = builder.kv_str(keys::DO_VERIFY, bool_str(do_verify));
    if let Some(level) = elaboration.as_wire() {
        builder = builder.kv_str(keys::ELABORATE_PAC, level);
    }
    builder
}

/// RFC 3339 at second precision, `Z` for UTC
pub fn format_expiry(expiry: DateTime<Utc>) -> String {
    expiry.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Whole milliseconds with an `ms` suffix
pub fn format_expiry_delta(delta: Duration) -> String {
    format!("{}ms", delta.as_millis())
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
