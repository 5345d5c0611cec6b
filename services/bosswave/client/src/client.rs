//! Connection to a Bosswave router.
//!
//! A [`BosswaveClient`] owns one byte stream. The write half sits behind a
//! mutex so concurrent requests each land on the wire as a whole frame; the
//! read half is owned by a background listener task that routes every
//! reply through the [`DispatchRegistry`].

use crate::config::ClientConfig;
use crate::handshake::{expect_hello, send_frame};
use crate::listener::run_listener;
use crate::registry::{DispatchRegistry, PendingCounts};
use crate::request::{ListRequest, PublishRequest, SubscribeRequest};
use crate::response::{ListEvent, Message, Response};
use crate::transport::connect_tcp;
use crate::ClientError;
use bw_wire::{Frame, FrameDecoder};
use bytes::BytesMut;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

type BoxedWriter = BufWriter<Box<dyn AsyncWrite + Send + Unpin>>;

/// Client connection to a router
pub struct BosswaveClient {
    writer: Mutex<BoxedWriter>,
    registry: Arc<DispatchRegistry>,
    alive: Arc<AtomicBool>,
    next_seq: AtomicU32,
    max_frame_size: usize,
    shutdown_tx: watch::Sender<bool>,
    listener: Option<JoinHandle<()>>,
    peer: String,
}

impl BosswaveClient {
    /// Connect over TCP and complete the handshake.
    ///
    /// TCP connect and handshake together are bounded by
    /// [`ClientConfig::connect_timeout`].
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let timeout = config.connect_timeout;
        info!("Connecting to router at {}", config.addr());

        tokio::time::timeout(timeout, async {
            let stream = connect_tcp(&config.host, config.port, timeout).await?;
            Self::from_stream(stream, config).await
        })
        .await
        .map_err(|_| ClientError::Timeout(timeout))?
    }

    /// Run the handshake over an already open stream and start listening.
    pub async fn from_stream<S>(stream: S, config: &ClientConfig) -> Result<Self, ClientError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, writer) = tokio::io::split(stream);
        let boxed: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        let mut writer = BufWriter::new(boxed);

        let mut decoder = FrameDecoder::with_max_frame_size(config.max_frame_size);
        let mut buffer = BytesMut::with_capacity(config.read_buffer_size);

        if let Err(e) = expect_hello(&mut reader, &mut decoder, &mut buffer).await {
            warn!("Handshake with {} failed: {}", config.addr(), e);
            let _ = writer.shutdown().await;
            return Err(e);
        }

        let registry = Arc::new(DispatchRegistry::new());
        let alive = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Bytes that arrived with the HELLO stay in `buffer` for the listener.
        let listener = tokio::spawn(run_listener(
            reader,
            decoder,
            buffer,
            registry.clone(),
            alive.clone(),
            shutdown_rx,
        ));

        info!("Connected to router at {}", config.addr());

        Ok(Self {
            writer: Mutex::new(writer),
            registry,
            alive,
            next_seq: AtomicU32::new(1),
            max_frame_size: config.max_frame_size,
            shutdown_tx,
            listener: Some(listener),
            peer: config.addr(),
        })
    }

    /// Publish a message; resolves once the router replies.
    pub async fn publish(&self, request: &PublishRequest) -> Result<PendingResponse, ClientError> {
        self.ensure_alive()?;
        let seq_no = self.next_seq();
        let frame = request.to_frame(seq_no)?;

        let rx = self.registry.register_response(seq_no);
        self.write_registered(&frame).await?;

        debug!("Published to {} (seq {})", request.uri, seq_no);
        Ok(PendingResponse { seq_no, rx })
    }

    /// Subscribe to a URI.
    ///
    /// Messages are delivered until the [`Subscription`] is dropped or the
    /// connection ends.
    pub async fn subscribe(&self, request: &SubscribeRequest) -> Result<Subscription, ClientError> {
        self.ensure_alive()?;
        let seq_no = self.next_seq();
        let frame = request.to_frame(seq_no)?;

        let rx = self.registry.register_response(seq_no);
        let messages = self.registry.register_messages(seq_no);
        self.write_registered(&frame).await?;

        debug!("Subscribed to {} (seq {})", request.uri, seq_no);
        Ok(Subscription {
            response: PendingResponse { seq_no, rx },
            messages,
        })
    }

    /// List the children of a URI
    pub async fn list(&self, request: &ListRequest) -> Result<Listing, ClientError> {
        self.ensure_alive()?;
        let seq_no = self.next_seq();
        let frame = request.to_frame(seq_no)?;

        let rx = self.registry.register_response(seq_no);
        let results = self.registry.register_listing(seq_no);
        self.write_registered(&frame).await?;

        debug!("Listing {} (seq {})", request.uri, seq_no);
        Ok(Listing {
            response: PendingResponse { seq_no, rx },
            results,
        })
    }

    /// Whether the listener is still running
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Outstanding requests per table
    pub fn pending(&self) -> PendingCounts {
        self.registry.pending()
    }

    /// Router address this client was configured with
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Stop the listener and close the stream.
    ///
    /// Every outstanding receiver observes [`ClientError::ConnectionClosed`].
    pub async fn close(mut self) -> Result<(), ClientError> {
        info!("Closing connection to {}", self.peer);
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.listener.take() {
            if let Err(e) = handle.await {
                warn!("Listener task ended abnormally: {}", e);
            }
        }

        let result = self.writer.lock().await.shutdown().await;

        self.alive.store(false, Ordering::SeqCst);
        self.registry.clear();
        result.map_err(ClientError::from)
    }

    fn next_seq(&self) -> u32 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    fn ensure_alive(&self) -> Result<(), ClientError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(ClientError::ConnectionClosed)
        }
    }

    /// Write a frame whose reply slots are already registered.
    ///
    /// The slots are forgotten if the write fails. A listener that died while
    /// we were writing has already cleared the registry, which the receivers
    /// observe as a closed connection.
    async fn write_registered(&self, frame: &Frame) -> Result<(), ClientError> {
        let result = {
            let mut writer = self.writer.lock().await;
            send_frame(&mut *writer, frame, self.max_frame_size).await
        };

        if let Err(e) = result {
            self.registry.forget(frame.seq_no());
            warn!("Failed to send {} (seq {}): {}", frame.command(), frame.seq_no(), e);
            return Err(e);
        }

        if !self.is_alive() {
            self.registry.forget(frame.seq_no());
            return Err(ClientError::ConnectionClosed);
        }
        Ok(())
    }
}

impl std::fmt::Debug for BosswaveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BosswaveClient")
            .field("peer", &self.peer)
            .field("alive", &self.is_alive())
            .field("pending", &self.pending())
            .finish()
    }
}

/// Status reply to one request
#[derive(Debug)]
pub struct PendingResponse {
    seq_no: u32,
    rx: oneshot::Receiver<Response>,
}

impl PendingResponse {
    /// Sequence number the request was sent with
    pub fn seq_no(&self) -> u32 {
        self.seq_no
    }

    /// Wait for the router's response
    pub async fn recv(self) -> Result<Response, ClientError> {
        self.rx.await.map_err(|_| ClientError::ConnectionClosed)
    }

    /// Check for the response without waiting
    pub fn try_recv(&mut self) -> Result<Option<Response>, ClientError> {
        match self.rx.try_recv() {
            Ok(response) => Ok(Some(response)),
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => Err(ClientError::ConnectionClosed),
        }
    }
}

/// A subscription: the router's response plus the message stream
#[derive(Debug)]
pub struct Subscription {
    /// Response to the subscribe request
    pub response: PendingResponse,
    /// Delivered messages
    pub messages: mpsc::UnboundedReceiver<Message>,
}

impl Subscription {
    /// Sequence number identifying this subscription
    pub fn seq_no(&self) -> u32 {
        self.response.seq_no
    }

    /// Next message, or `None` once the connection has ended
    pub async fn recv(&mut self) -> Option<Message> {
        self.messages.recv().await
    }

    /// The message side as a [`tokio_stream::Stream`]
    pub fn into_stream(self) -> UnboundedReceiverStream<Message> {
        UnboundedReceiverStream::new(self.messages)
    }
}

/// A list request: the router's response plus its results
#[derive(Debug)]
pub struct Listing {
    /// Response to the list request
    pub response: PendingResponse,
    /// Children followed by [`ListEvent::Finished`]
    pub results: mpsc::UnboundedReceiver<ListEvent>,
}

impl Listing {
    /// Next list event, or `None` after [`ListEvent::Finished`] or when the
    /// connection has ended
    pub async fn recv(&mut self) -> Option<ListEvent> {
        self.results.recv().await
    }

    /// Gather every child until the router says it is finished
    pub async fn collect_children(mut self) -> Result<Vec<String>, ClientError> {
        let mut children = Vec::new();
        while let Some(event) = self.results.recv().await {
            match event {
                ListEvent::Child(uri) => children.push(uri),
                ListEvent::Finished => return Ok(children),
            }
        }
        Err(ClientError::ConnectionClosed)
    }
}
