//! Background listener and frame dispatch.
//!
//! One listener task per connection reads every inbound frame and hands it
//! to whoever registered for its sequence number. Malformed frames and
//! frames nobody asked for are dropped; only a transport failure or a
//! shutdown signal stops the loop.

use crate::handshake::recv_frame;
use crate::registry::{DispatchRegistry, PendingCounts};
use crate::response::{ListEvent, Message, Response};
use crate::ClientError;
use bw_wire::{Command, Frame, FrameDecoder};
use bytes::BytesMut;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::watch;
use tracing::{debug, warn};

/// What happened to a dispatched frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Delivered to a status response waiter
    Response,
    /// Delivered to a subscription
    Message,
    /// Delivered to a list stream
    ListEvent,
    /// Nobody was waiting for it, or the command is not handled
    Dropped,
}

/// Route one inbound frame to its registered receiver
pub fn dispatch_frame(registry: &DispatchRegistry, frame: &Frame) -> Dispatch {
    let seq_no = frame.seq_no();

    match frame.command() {
        Command::Response => {
            if registry.resolve_response(seq_no, Response::from_frame(frame)) {
                Dispatch::Response
            } else {
                debug!("No response handler for seq {}, dropping", seq_no);
                Dispatch::Dropped
            }
        }

        Command::Result => {
            // Both tables are consulted; a subscription wins if both match.
            let has_messages = registry.has_message_handler(seq_no);
            let has_listing = registry.has_list_handler(seq_no);

            if has_messages {
                if registry.deliver_message(seq_no, Message::from_frame(frame)) {
                    return Dispatch::Message;
                }
            } else if has_listing {
                match ListEvent::from_frame(frame) {
                    Some(event) => {
                        if registry.deliver_list_event(seq_no, event) {
                            return Dispatch::ListEvent;
                        }
                    }
                    None => debug!("List result for seq {} has no child, dropping", seq_no),
                }
            } else {
                debug!("No result handler for seq {}, dropping", seq_no);
            }
            Dispatch::Dropped
        }

        other => {
            debug!("Ignoring {} frame (seq {})", other, seq_no);
            Dispatch::Dropped
        }
    }
}

/// Listener loop.
///
/// Runs until `shutdown` fires (or its sender is dropped) or the transport
/// fails. On exit the connection is marked dead and every pending receiver
/// is closed, so callers stop waiting on replies that can no longer arrive.
pub(crate) async fn run_listener<R>(
    mut reader: R,
    mut decoder: FrameDecoder,
    mut buffer: BytesMut,
    registry: Arc<DispatchRegistry>,
    alive: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin,
{
    debug!("Listener started");

    loop {
        let result = tokio::select! {
            biased;

            _ = shutdown.changed() => {
                debug!("Listener received shutdown signal");
                break;
            }

            result = recv_frame(&mut reader, &mut decoder, &mut buffer) => result,
        };

        match result {
            Ok(frame) => {
                dispatch_frame(&registry, &frame);
            }
            Err(e) if e.is_frame_local() => {
                debug!("Discarded invalid frame: {}", e);
            }
            Err(ClientError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                warn!("Router closed the connection");
                break;
            }
            Err(e) => {
                warn!("Listener stopped: {}", e);
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    let pending = registry.pending();
    if pending != PendingCounts::default() {
        debug!(
            "Abandoning {} responses, {} subscriptions, {} list streams",
            pending.responses, pending.messages, pending.listings
        );
    }
    registry.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use bw_wire::{FrameBuilder, PayloadObject, PayloadType, RoutingObject};
    use bytes::Bytes;

    fn response(seq: u32, status: &str, reason: Option<&str>) -> Frame {
        let mut builder = FrameBuilder::new(Command::Response, seq).kv_str("status", status);
        if let Some(reason) = reason {
            builder = builder.kv_str("reason", reason);
        }
        builder.build().unwrap()
    }

    fn child(seq: u32, name: &str) -> Frame {
        FrameBuilder::new(Command::Result, seq)
            .kv_str("finished", "false")
            .kv_str("child", name)
            .build()
            .unwrap()
    }

    fn finished(seq: u32) -> Frame {
        FrameBuilder::new(Command::Result, seq)
            .kv_str("finished", "true")
            .build()
            .unwrap()
    }

    #[test]
    fn test_response_dispatch() {
        let registry = DispatchRegistry::new();
        let mut mine = registry.register_response(10);
        let mut other = registry.register_response(11);

        assert_eq!(
            dispatch_frame(&registry, &response(10, "okay", None)),
            Dispatch::Response
        );
        assert_eq!(mine.try_recv().unwrap(), Response::okay());
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn test_failed_response_dispatch() {
        let registry = DispatchRegistry::new();
        let mut rx = registry.register_response(3);

        dispatch_frame(&registry, &response(3, "error", Some("no permission")));
        let got = rx.try_recv().unwrap();
        assert_eq!(got.status, "error");
        assert_eq!(got.reason.as_deref(), Some("no permission"));
    }

    #[test]
    fn test_list_stream_dispatch() {
        let registry = DispatchRegistry::new();
        let mut rx = registry.register_listing(5);

        let outcomes: Vec<_> = [child(5, "a"), child(5, "b"), finished(5), child(5, "late")]
            .iter()
            .map(|frame| dispatch_frame(&registry, frame))
            .collect();
        assert_eq!(
            outcomes,
            [
                Dispatch::ListEvent,
                Dispatch::ListEvent,
                Dispatch::ListEvent,
                Dispatch::Dropped
            ]
        );

        assert_eq!(rx.try_recv().unwrap(), ListEvent::Child("a".into()));
        assert_eq!(rx.try_recv().unwrap(), ListEvent::Child("b".into()));
        assert_eq!(rx.try_recv().unwrap(), ListEvent::Finished);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_subscription_dispatch_honours_unpack() {
        let registry = DispatchRegistry::new();
        let mut rx = registry.register_messages(8);

        let with_objects = |unpack: &str| {
            FrameBuilder::new(Command::Result, 8)
                .kv_str("uri", "scratch.ns/a")
                .kv_str("from", "vk")
                .kv_str("unpack", unpack)
                .routing_object(RoutingObject::new(1, Bytes::from_static(b"ro")))
                .payload_object(PayloadObject::new(PayloadType(9), Bytes::from_static(b"po")))
                .build()
                .unwrap()
        };

        assert_eq!(
            dispatch_frame(&registry, &with_objects("false")),
            Dispatch::Message
        );
        assert_eq!(
            dispatch_frame(&registry, &with_objects("true")),
            Dispatch::Message
        );

        let packed = rx.try_recv().unwrap();
        assert!(packed.routing_objects.is_empty());
        assert!(packed.payload_objects.is_empty());

        let unpacked = rx.try_recv().unwrap();
        assert_eq!(unpacked.routing_objects.len(), 1);
        assert_eq!(unpacked.payload_objects[0].content(), Bytes::from_static(b"po"));
    }

    #[test]
    fn test_subscription_takes_precedence_over_listing() {
        let registry = DispatchRegistry::new();
        let mut messages = registry.register_messages(2);
        let mut listing = registry.register_listing(2);

        assert_eq!(dispatch_frame(&registry, &child(2, "a")), Dispatch::Message);
        assert!(messages.try_recv().is_ok());
        assert!(listing.try_recv().is_err());
    }

    #[test]
    fn test_unregistered_and_unknown_frames_are_dropped() {
        let registry = DispatchRegistry::new();
        let mut rx = registry.register_response(1);

        let unknown = FrameBuilder::new(Command::Other(*b"tsub"), 1)
            .kv_str("status", "okay")
            .build()
            .unwrap();
        let hello = FrameBuilder::new(Command::Hello, 1).build().unwrap();

        assert_eq!(dispatch_frame(&registry, &unknown), Dispatch::Dropped);
        assert_eq!(dispatch_frame(&registry, &hello), Dispatch::Dropped);
        assert_eq!(
            dispatch_frame(&registry, &response(99, "okay", None)),
            Dispatch::Dropped
        );
        assert_eq!(dispatch_frame(&registry, &child(99, "x")), Dispatch::Dropped);
        assert!(rx.try_recv().is_err());
        assert!(registry.has_response_handler(1));
    }

    #[tokio::test]
    async fn test_listener_survives_noise_and_clears_on_eof() {
        let registry = Arc::new(DispatchRegistry::new());
        let alive = Arc::new(AtomicBool::new(true));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut response_rx = registry.register_response(4);
        let mut orphan_rx = registry.register_response(5);

        let mut wire = BytesMut::from(&b"r*sp 0000000000 0000000004\nend\n"[..]);
        FrameBuilder::new(Command::Other(*b"zzzz"), 4)
            .build()
            .unwrap()
            .encode_into(&mut wire);
        response(4, "okay", None).encode_into(&mut wire);

        run_listener(
            std::io::Cursor::new(wire.to_vec()),
            FrameDecoder::new(),
            BytesMut::new(),
            registry.clone(),
            alive.clone(),
            shutdown_rx,
        )
        .await;

        assert_eq!(response_rx.try_recv().unwrap(), Response::okay());
        assert!(matches!(
            orphan_rx.try_recv(),
            Err(tokio::sync::oneshot::error::TryRecvError::Closed)
        ));
        assert!(!alive.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_listener_stops_on_shutdown() {
        let (client_io, _router_io) = tokio::io::duplex(1024);
        let registry = Arc::new(DispatchRegistry::new());
        let alive = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_listener(
            client_io,
            FrameDecoder::new(),
            BytesMut::new(),
            registry,
            alive.clone(),
            shutdown_rx,
        ));

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(!alive.load(Ordering::SeqCst));
    }
}
