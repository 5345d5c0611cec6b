//! Bosswave pub/sub client.
//!
//! Re-exports the frame codec ([`wire`]) and the connection layer
//! ([`client`]), and provides the log format shared by programs built on
//! them ([`logging`]).

pub mod logging;

pub use bw_client as client;
pub use bw_wire as wire;

pub use bw_client::{
    BosswaveClient, ChainElaborationLevel, ClientConfig, ClientError, ListEvent, ListRequest,
    Listing, Message, PendingResponse, PublishRequest, Response, SubscribeRequest, Subscription,
};
pub use bw_wire::{Command, Frame, PayloadObject, PayloadType, RoutingObject, WireError};
