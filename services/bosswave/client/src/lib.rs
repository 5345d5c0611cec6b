//! # Bosswave client
//!
//! Connection handling for the Bosswave out-of-band protocol. A client opens
//! one stream to a router, waits for its HELLO, and then multiplexes
//! publish, subscribe and list requests over it. Replies are matched to
//! requests by sequence number and delivered over channels.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bw_client::{BosswaveClient, ClientConfig, ListRequest, PublishRequest};
//! use bw_wire::{PayloadObject, PayloadType};
//!
//! # async fn run() -> Result<(), bw_client::ClientError> {
//! let client = BosswaveClient::connect(&ClientConfig::new("127.0.0.1", 28589)).await?;
//!
//! let mut publish = PublishRequest::new("scratch.ns/demo/temp");
//! publish.payload_objects.push(PayloadObject::new(
//!     PayloadType::from_octets([64, 0, 0, 0]),
//!     &b"21.5"[..],
//! ));
//! let response = client.publish(&publish).await?.recv().await?;
//! assert!(response.is_ok());
//!
//! let children = client
//!     .list(&ListRequest::new("scratch.ns/demo"))
//!     .await?
//!     .collect_children()
//!     .await?;
//! println!("{:?}", children);
//!
//! client.close().await
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod handshake;
pub mod listener;
pub mod registry;
pub mod request;
pub mod response;
pub mod transport;

pub use client::{BosswaveClient, Listing, PendingResponse, Subscription};
pub use config::{ClientConfig, DEFAULT_PORT};
pub use error::ClientError;
pub use listener::{dispatch_frame, Dispatch};
pub use registry::{DispatchRegistry, PendingCounts};
pub use request::{ChainElaborationLevel, ListRequest, PublishRequest, SubscribeRequest};
pub use response::{ListEvent, Message, Response, STATUS_OKAY};
