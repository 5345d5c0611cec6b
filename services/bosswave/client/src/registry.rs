//! Pending-request registry.
//!
//! Maps sequence numbers to the channels that deliver replies back to the
//! caller. There are three independent tables, one per reply shape, and a
//! sequence number may sit in more than one of them (a subscription waits
//! for both a status response and a stream of messages).
//!
//! Each table is a [`DashMap`], so inserts from request issuers and lookups
//! from the listener synchronise per table. Senders are cloned out of the
//! map before sending, so no map lock is held while a reply is delivered.

use crate::response::{ListEvent, Message, Response};
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Number of entries in each table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingCounts {
    /// Requests waiting for a status response
    pub responses: usize,
    /// Live subscriptions
    pub messages: usize,
    /// List streams that have not finished
    pub listings: usize,
}

/// Registry of outstanding requests keyed by sequence number
#[derive(Debug, Default)]
pub struct DispatchRegistry {
    responses: DashMap<u32, oneshot::Sender<Response>>,
    messages: DashMap<u32, mpsc::UnboundedSender<Message>>,
    listings: DashMap<u32, mpsc::UnboundedSender<ListEvent>>,
}

impl DispatchRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the status response to `seq_no`
    pub fn register_response(&self, seq_no: u32) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        self.responses.insert(seq_no, tx);
        rx
    }

    /// Receive messages for the subscription issued as `seq_no`
    pub fn register_messages(&self, seq_no: u32) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.messages.insert(seq_no, tx);
        rx
    }

    /// Receive list results for the request issued as `seq_no`
    pub fn register_listing(&self, seq_no: u32) -> mpsc::UnboundedReceiver<ListEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listings.insert(seq_no, tx);
        rx
    }

    /// Whether a status response is awaited for `seq_no`
    pub fn has_response_handler(&self, seq_no: u32) -> bool {
        self.responses.contains_key(&seq_no)
    }

    /// Whether a subscription is registered under `seq_no`
    pub fn has_message_handler(&self, seq_no: u32) -> bool {
        self.messages.contains_key(&seq_no)
    }

    /// Whether a list stream is registered under `seq_no`
    pub fn has_list_handler(&self, seq_no: u32) -> bool {
        self.listings.contains_key(&seq_no)
    }

    /// Deliver the status response for `seq_no`.
    ///
    /// The entry is removed: a request gets at most one response.
    pub fn resolve_response(&self, seq_no: u32, response: Response) -> bool {
        let Some((_, tx)) = self.responses.remove(&seq_no) else {
            return false;
        };
        if tx.send(response).is_err() {
            debug!("Response for seq {} arrived after the caller gave up", seq_no);
        }
        true
    }

    /// Deliver a message to the subscription under `seq_no`.
    ///
    /// A subscription whose receiver has been dropped is forgotten.
    pub fn deliver_message(&self, seq_no: u32, message: Message) -> bool {
        let Some(tx) = self.messages.get(&seq_no).map(|entry| entry.value().clone()) else {
            return false;
        };
        if tx.send(message).is_err() {
            debug!("Subscription {} dropped by caller, forgetting it", seq_no);
            self.messages.remove(&seq_no);
            return false;
        }
        true
    }

    /// Deliver a list event for `seq_no`.
    ///
    /// [`ListEvent::Finished`] ends the stream and removes the entry, so
    /// nothing is delivered for `seq_no` afterwards.
    pub fn deliver_list_event(&self, seq_no: u32, event: ListEvent) -> bool {
        let tx = if event == ListEvent::Finished {
            self.listings.remove(&seq_no).map(|(_, tx)| tx)
        } else {
            self.listings.get(&seq_no).map(|entry| entry.value().clone())
        };
        let Some(tx) = tx else {
            return false;
        };
        if tx.send(event).is_err() {
            debug!("List stream {} dropped by caller, forgetting it", seq_no);
            self.listings.remove(&seq_no);
            return false;
        }
        true
    }

    /// Drop every entry for `seq_no`
    pub fn forget(&self, seq_no: u32) {
        self.responses.remove(&seq_no);
        self.messages.remove(&seq_no);
        self.listings.remove(&seq_no);
    }

    /// Drop every entry. Receivers observe their channel closing.
    pub fn clear(&self) {
        self.responses.clear();
        self.messages.clear();
        self.listings.clear();
    }

    /// Current table sizes
    pub fn pending(&self) -> PendingCounts {
        PendingCounts {
            responses: self.responses.len(),
            messages: self.messages.len(),
            listings: self.listings.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_is_one_shot() {
        let registry = DispatchRegistry::new();
        let mut rx = registry.register_response(7);

        assert!(registry.resolve_response(7, Response::okay()));
        assert!(!registry.resolve_response(7, Response::okay()));
        assert_eq!(rx.try_recv().unwrap(), Response::okay());
        assert_eq!(registry.pending(), PendingCounts::default());
    }

    #[test]
    fn test_other_sequence_numbers_untouched() {
        let registry = DispatchRegistry::new();
        let mut first = registry.register_response(1);
        let mut second = registry.register_response(2);

        assert!(registry.resolve_response(2, Response::okay()));
        assert!(first.try_recv().is_err());
        assert!(second.try_recv().is_ok());
        assert!(registry.has_response_handler(1));
    }

    #[test]
    fn test_same_sequence_in_several_tables() {
        let registry = DispatchRegistry::new();
        let _response = registry.register_response(3);
        let mut messages = registry.register_messages(3);

        assert!(registry.resolve_response(3, Response::okay()));
        assert!(registry.deliver_message(3, Message::default()));
        assert!(registry.deliver_message(3, Message::default()));
        assert_eq!(messages.try_recv().unwrap(), Message::default());
        assert_eq!(messages.try_recv().unwrap(), Message::default());
        assert!(registry.has_message_handler(3));
    }

    #[test]
    fn test_dropped_subscription_is_forgotten() {
        let registry = DispatchRegistry::new();
        drop(registry.register_messages(5));

        assert!(!registry.deliver_message(5, Message::default()));
        assert!(!registry.has_message_handler(5));
    }

    #[test]
    fn test_list_finish_evicts() {
        let registry = DispatchRegistry::new();
        let mut rx = registry.register_listing(9);

        assert!(registry.deliver_list_event(9, ListEvent::Child("a".into())));
        assert!(registry.deliver_list_event(9, ListEvent::Finished));
        assert!(!registry.deliver_list_event(9, ListEvent::Child("late".into())));

        assert_eq!(rx.try_recv().unwrap(), ListEvent::Child("a".into()));
        assert_eq!(rx.try_recv().unwrap(), ListEvent::Finished);
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_clear_closes_receivers() {
        let registry = DispatchRegistry::new();
        let mut response = registry.register_response(1);
        let mut messages = registry.register_messages(2);
        let mut listing = registry.register_listing(3);

        registry.clear();

        assert!(matches!(
            response.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
        assert!(matches!(
            messages.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(matches!(
            listing.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_forget() {
        let registry = DispatchRegistry::new();
        let _r = registry.register_response(4);
        let _m = registry.register_messages(4);
        registry.forget(4);
        assert_eq!(registry.pending(), PendingCounts::default());
    }
}
