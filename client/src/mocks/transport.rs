use crate::realtime::channel::SUBSCRIPTION_ID;
use crate::realtime::stomp::{Command, Frame, Inbound, decode_message};
use crate::realtime::{ChannelError, Connection, Transport};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use url::Url;

/// Transport whose connections are answered by a [`MockBroker`].
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

struct Inner {
    accepted: mpsc::UnboundedSender<MockPeer>,
    attempts: AtomicUsize,
    refusals: AtomicUsize,
}

impl MockTransport {
    /// Transport and the broker that receives its connections.
    #[must_use]
    pub fn new() -> (Self, MockBroker) {
        let (accepted, peers) = mpsc::unbounded_channel();
        let transport = Self {
            inner: Arc::new(Inner {
                accepted,
                attempts: AtomicUsize::new(0),
                refusals: AtomicUsize::new(0),
            }),
        };
        (transport, MockBroker { peers })
    }

    /// Fail the next `count` connection attempts.
    pub fn refuse_next(&self, count: usize) {
        self.inner.refusals.store(count, Ordering::SeqCst);
    }

    /// Connection attempts so far, refused ones included.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    type Connection = MockConnection;

    async fn connect(&self, url: &Url) -> Result<MockConnection, ChannelError> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .inner
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused {
            return Err(ChannelError::Transport("connection refused".to_string()));
        }

        let (to_client, from_broker) = mpsc::unbounded_channel();
        let (to_broker, from_client) = mpsc::unbounded_channel();
        let peer = MockPeer {
            url: url.clone(),
            to_client,
            from_client,
            message_ids: AtomicU64::new(0),
        };
        self.inner
            .accepted
            .send(peer)
            .map_err(|_| ChannelError::Transport("broker is gone".to_string()))?;

        Ok(MockConnection {
            to_broker,
            from_broker,
        })
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("attempts", &self.attempts())
            .finish_non_exhaustive()
    }
}

/// Client side of a mock connection.
#[derive(Debug)]
pub struct MockConnection {
    to_broker: mpsc::UnboundedSender<String>,
    from_broker: mpsc::UnboundedReceiver<Result<String, ChannelError>>,
}

impl Connection for MockConnection {
    async fn send(&mut self, text: String) -> Result<(), ChannelError> {
        self.to_broker.send(text).map_err(|_| ChannelError::Closed)
    }

    async fn recv(&mut self) -> Option<Result<String, ChannelError>> {
        self.from_broker.recv().await
    }

    async fn close(&mut self) {
        self.from_broker.close();
    }
}

/// Accepts connections opened through a [`MockTransport`].
#[derive(Debug)]
pub struct MockBroker {
    peers: mpsc::UnboundedReceiver<MockPeer>,
}

impl MockBroker {
    /// Wait for the next connection.
    pub async fn accept(&mut self) -> Option<MockPeer> {
        self.peers.recv().await
    }

    /// A connection that is already waiting, if any.
    pub fn try_accept(&mut self) -> Option<MockPeer> {
        self.peers.try_recv().ok()
    }
}

/// Broker side of one connection. Dropping it closes the connection.
#[derive(Debug)]
pub struct MockPeer {
    url: Url,
    to_client: mpsc::UnboundedSender<Result<String, ChannelError>>,
    from_client: mpsc::UnboundedReceiver<String>,
    message_ids: AtomicU64,
}

impl MockPeer {
    /// URL the client connected to.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// The `token` query parameter.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(name, _)| name == "token")
            .map(|(_, value)| value.into_owned())
    }

    /// Next raw text the client sent.
    pub async fn next_text(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next frame the client sent, skipping heartbeats.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let text = self.next_text().await?;
            for inbound in decode_message(&text) {
                if let Ok(Inbound::Frame(frame)) = inbound {
                    return Some(frame);
                }
            }
        }
    }

    /// A frame the client already sent, without waiting.
    pub fn try_next_frame(&mut self) -> Option<Frame> {
        while let Ok(text) = self.from_client.try_recv() {
            for inbound in decode_message(&text) {
                if let Ok(Inbound::Frame(frame)) = inbound {
                    return Some(frame);
                }
            }
        }
        None
    }

    /// Send raw text to the client.
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.to_client.send(Ok(text.into()));
    }

    /// Send a frame to the client.
    pub fn send_frame(&self, frame: &Frame) {
        self.send_text(frame.encode());
    }

    /// Answer CONNECT (without heartbeats) and wait for SUBSCRIBE.
    ///
    /// Returns the SUBSCRIBE frame, or `None` if the client misbehaved or
    /// went away.
    pub async fn accept_handshake(&mut self) -> Option<Frame> {
        let connect = self.next_frame().await?;
        if connect.command != Command::Connect {
            return None;
        }
        self.send_frame(
            &Frame::new(Command::Connected)
                .header("version", "1.2")
                .header("heart-beat", "0,0"),
        );

        let subscribe = self.next_frame().await?;
        (subscribe.command == Command::Subscribe).then_some(subscribe)
    }

    /// Deliver `body` on the ticket subscription.
    pub fn push_update(&self, body: &str) {
        let id = self.message_ids.fetch_add(1, Ordering::Relaxed);
        let mut frame = Frame::new(Command::Message)
            .header("destination", "/user/queue/tickets")
            .header("subscription", SUBSCRIPTION_ID)
            .header("message-id", id.to_string());
        frame.body = body.to_string();
        self.send_frame(&frame);
    }

    /// Send an ERROR frame.
    pub fn send_error(&self, message: &str) {
        self.send_frame(&Frame::new(Command::Error).header("message", message));
    }

    /// Fail the connection with a transport error.
    pub fn fail(&self, reason: &str) {
        let _ = self.to_client.send(Err(ChannelError::Transport(reason.to_string())));
    }

    /// Close the connection.
    pub fn hang_up(self) {
        drop(self);
    }
}
