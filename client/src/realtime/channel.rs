//! Supervised STOMP subscription.
//!
//! A single background task owns the connection. It performs the STOMP
//! handshake, subscribes to the ticket destination, keeps heartbeats flowing
//! and reconnects after a fixed delay whenever the connection drops.
//!
//! Every `connect` starts a new generation. Callbacks only fire for the
//! current generation, so nothing is delivered once `disconnect` returns and
//! a stale task can never resubscribe.

use super::observers::{Observers, Subscription};
use super::stomp::{Command, Frame, Heartbeat, Inbound, decode_message};
use super::transport::{Connection, Transport};
use super::{ChannelError, ConnectionState};
use crate::config::RealtimeConfig;
use crate::session::TicketUpdate;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use url::Url;

/// Subscription id used for the ticket destination.
pub const SUBSCRIPTION_ID: &str = "sub-0";

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSettings {
    /// Broker WebSocket endpoint, without the token
    pub url: String,
    /// Destination to subscribe to
    pub destination: String,
    /// Pause between a drop and the next attempt
    pub reconnect_delay: Duration,
    /// Heartbeats we offer in CONNECT
    pub heartbeat: Heartbeat,
}

impl From<&RealtimeConfig> for ChannelSettings {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            url: config.url.clone(),
            destination: config.destination.clone(),
            reconnect_delay: config.reconnect_delay(),
            heartbeat: Heartbeat {
                outgoing: Duration::from_millis(config.heartbeat_outgoing_ms),
                incoming: Duration::from_millis(config.heartbeat_incoming_ms),
            },
        }
    }
}

/// Authenticated subscription to the user's ticket updates.
pub struct RealtimeChannel<T: Transport> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    transport: T,
    settings: ChannelSettings,
    lifecycle: Mutex<Lifecycle>,
    ticket_updates: Observers<TicketUpdate>,
    connection_changes: Observers<bool>,
    errors: Observers<ChannelError>,
}

#[derive(Default)]
struct Lifecycle {
    generation: u64,
    state: ConnectionState,
    supervisor: Option<JoinHandle<()>>,
}

impl<T: Transport> RealtimeChannel<T> {
    /// Channel over `transport`; nothing happens until [`Self::connect`].
    #[must_use]
    pub fn new(transport: T, settings: ChannelSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                settings,
                lifecycle: Mutex::new(Lifecycle::default()),
                ticket_updates: Observers::new(),
                connection_changes: Observers::new(),
                errors: Observers::new(),
            }),
        }
    }

    /// Start connecting with `token`. Does nothing while a connection (or
    /// connection attempt) is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self, token: &str) {
        let mut lifecycle = self.shared.lifecycle();
        if lifecycle.supervisor.as_ref().is_some_and(|task| !task.is_finished()) {
            tracing::debug!("Realtime channel already running");
            return;
        }

        lifecycle.generation += 1;
        lifecycle.state = ConnectionState::Connecting;
        let generation = lifecycle.generation;

        let shared = Arc::clone(&self.shared);
        let token = token.to_string();
        lifecycle.supervisor = Some(tokio::spawn(async move {
            shared.supervise(&token, generation).await;
        }));

        tracing::info!(url = %self.shared.settings.url, generation, "Realtime channel started");
    }

    /// Stop the channel. No callback fires for this connection afterwards.
    pub fn disconnect(&self) {
        let (was_connected, supervisor) = {
            let mut lifecycle = self.shared.lifecycle();
            lifecycle.generation += 1;
            let previous = std::mem::replace(&mut lifecycle.state, ConnectionState::Disconnected);
            (previous == ConnectionState::Connected, lifecycle.supervisor.take())
        };

        let Some(supervisor) = supervisor else {
            return;
        };
        supervisor.abort();
        tracing::info!("Realtime channel stopped");

        if was_connected {
            metrics::gauge!("realtime.connected").set(0.0);
            self.shared.connection_changes.notify(&false);
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.lifecycle().state
    }

    /// Whether the subscription is live.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Called with every decoded ticket update.
    pub fn on_ticket_update<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TicketUpdate) + Send + Sync + 'static,
    {
        self.shared.ticket_updates.register(callback)
    }

    /// Called with `true` when the subscription goes live and `false` when it
    /// is lost or stopped.
    pub fn on_connection_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.shared.connection_changes.register(callback)
    }

    /// Called with transport and broker errors.
    pub fn on_error<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ChannelError) + Send + Sync + 'static,
    {
        self.shared.errors.register(callback)
    }
}

impl<T: Transport> Drop for RealtimeChannel<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<T: Transport> std::fmt::Debug for RealtimeChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("url", &self.shared.settings.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Shared<T> {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lifecycle().generation == generation
    }

    /// Move to `to` if `generation` is still current, reporting changes of
    /// the connected flag.
    fn transition(&self, generation: u64, to: ConnectionState) {
        let from = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.generation != generation {
                return;
            }
            std::mem::replace(&mut lifecycle.state, to)
        };

        let was_connected = from == ConnectionState::Connected;
        let is_connected = to == ConnectionState::Connected;
        if was_connected != is_connected {
            metrics::gauge!("realtime.connected").set(if is_connected { 1.0 } else { 0.0 });
            self.connection_changes.notify(&is_connected);
        }
    }

    fn report_error(&self, generation: u64, error: &ChannelError) {
        if self.is_current(generation) {
            self.errors.notify(error);
        }
    }

    fn endpoint(&self, token: &str) -> Result<Url, ChannelError> {
        let mut url =
            Url::parse(&self.settings.url).map_err(|e| ChannelError::Config(e.to_string()))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }

    async fn supervise(&self, token: &str, generation: u64) {
        let url = match self.endpoint(token) {
            Ok(url) => url,
            Err(error) => {
                tracing::error!(%error, "Realtime channel cannot start");
                self.transition(generation, ConnectionState::Disconnected);
                self.report_error(generation, &error);
                return;
            },
        };

        let mut attempt: u64 = 0;
        loop {
            if !self.is_current(generation) {
                return;
            }
            if attempt > 0 {
                metrics::counter!("realtime.reconnects").increment(1);
                tracing::info!(attempt, "Reconnecting realtime channel");
            }
            attempt += 1;

            match self.transport.connect(&url).await {
                Ok(mut connection) => {
                    let outcome = self.run_session(&mut connection, generation).await;
                    connection.close().await;
                    self.transition(generation, ConnectionState::Connecting);

                    match outcome {
                        Ok(()) | Err(ChannelError::Closed) => {
                            tracing::info!("Realtime connection closed by peer");
                        },
                        Err(error) => {
                            tracing::warn!(%error, "Realtime connection lost");
                            self.report_error(generation, &error);
                        },
                    }
                },
                Err(error) => {
                    tracing::warn!(%error, "Realtime connection failed");
                    self.report_error(generation, &error);
                },
            }

            if !self.is_current(generation) {
                return;
            }
            tokio::time::sleep(self.settings.reconnect_delay).await;
        }
    }

    /// Handshake, subscribe, then pump frames until the connection ends.
    async fn run_session(
        &self,
        connection: &mut T::Connection,
        generation: u64,
    ) -> Result<(), ChannelError> {
        let url = Url::parse(&self.settings.url).map_err(|e| ChannelError::Config(e.to_string()))?;
        let host = url.host_str().unwrap_or("localhost");

        connection
            .send(Frame::connect(host, self.settings.heartbeat).encode())
            .await?;

        let connected = tokio::time::timeout(HANDSHAKE_TIMEOUT, await_connected(connection))
            .await
            .map_err(|_| ChannelError::Transport("STOMP handshake timed out".to_string()))??;

        let heartbeat = self.settings.heartbeat.negotiate(connected.get("heart-beat"));

        if !self.is_current(generation) {
            return Ok(());
        }
        connection
            .send(Frame::subscribe(SUBSCRIPTION_ID, &self.settings.destination).encode())
            .await?;

        metrics::counter!("realtime.connections").increment(1);
        tracing::info!(
            destination = %self.settings.destination,
            outgoing_ms = heartbeat.outgoing.as_millis(),
            incoming_ms = heartbeat.incoming.as_millis(),
            "Realtime subscription active"
        );
        self.transition(generation, ConnectionState::Connected);

        let mut outgoing = heartbeat_interval(heartbeat.outgoing);
        // Tolerate one missed beat before declaring the peer dead
        let window = (!heartbeat.incoming.is_zero()).then(|| heartbeat.incoming * 2);
        let mut deadline = window.map(|window| Instant::now() + window);

        loop {
            tokio::select! {
                received = connection.recv() => {
                    let text = match received {
                        None => return Ok(()),
                        Some(Err(error)) => return Err(error),
                        Some(Ok(text)) => text,
                    };
                    if let Some(window) = window {
                        deadline = Some(Instant::now() + window);
                    }
                    self.handle_message(&text, generation)?;
                }
                () = tick(&mut outgoing) => {
                    connection.send("\n".to_string()).await?;
                }
                () = expire(deadline) => {
                    return Err(ChannelError::HeartbeatTimeout);
                }
            }
        }
    }

    fn handle_message(&self, text: &str, generation: u64) -> Result<(), ChannelError> {
        for inbound in decode_message(text) {
            match inbound {
                Ok(Inbound::Heartbeat) => tracing::trace!("Heartbeat received"),
                Ok(Inbound::Frame(frame)) => match frame.command {
                    Command::Message => self.handle_update(&frame, generation),
                    Command::Error => {
                        let message = frame
                            .get("message")
                            .map(str::to_string)
                            .filter(|message| !message.is_empty())
                            .unwrap_or_else(|| frame.body.trim().to_string());
                        return Err(ChannelError::Server(message));
                    },
                    other => tracing::debug!(command = ?other, "Ignoring frame"),
                },
                Err(error) => {
                    metrics::counter!("realtime.malformed_frames").increment(1);
                    tracing::warn!(%error, "Dropping malformed frame");
                },
            }
        }
        Ok(())
    }

    fn handle_update(&self, frame: &Frame, generation: u64) {
        match serde_json::from_str::<TicketUpdate>(&frame.body) {
            Ok(update) => {
                metrics::counter!("realtime.messages").increment(1);
                tracing::debug!(?update, "Ticket update received");
                if self.is_current(generation) {
                    self.ticket_updates.notify(&update);
                }
            },
            Err(error) => {
                metrics::counter!("realtime.decode_errors").increment(1);
                tracing::warn!(%error, body = %frame.body, "Dropping undecodable ticket update");
            },
        }
    }
}

/// Read until the broker answers CONNECT.
async fn await_connected<C: Connection>(connection: &mut C) -> Result<Frame, ChannelError> {
    loop {
        let text = connection.recv().await.ok_or(ChannelError::Closed)??;
        for inbound in decode_message(&text) {
            match inbound? {
                Inbound::Frame(frame) if frame.command == Command::Connected => return Ok(frame),
                Inbound::Frame(frame) if frame.command == Command::Error => {
                    return Err(ChannelError::Server(
                        frame.get("message").unwrap_or("Broker refused the connection").to_string(),
                    ));
                },
                _ => {},
            }
        }
    }
}

fn heartbeat_interval(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        },
        None => std::future::pending().await,
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::realtime::WsTransport;

    #[test]
    fn test_settings_from_config() {
        let config = ClientConfig::default();
        let settings = ChannelSettings::from(&config.realtime);

        assert_eq!(settings.reconnect_delay, Duration::from_secs(3));
        assert_eq!(settings.heartbeat.outgoing, Duration::from_secs(4));
        assert_eq!(settings.heartbeat.incoming, Duration::from_secs(4));
        assert_eq!(settings.destination, "/user/queue/tickets");
    }

    #[tokio::test]
    async fn test_endpoint_carries_encoded_token() {
        let settings = ChannelSettings::from(&ClientConfig::default().realtime);
        let channel = RealtimeChannel::new(WsTransport, settings);

        let url = channel.shared.endpoint("a b+c").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8080/ws?token=a+b%2Bc");
    }

    #[tokio::test]
    async fn test_invalid_url_reports_and_stops() {
        let mut settings = ChannelSettings::from(&ClientConfig::default().realtime);
        settings.url = "not a url".to_string();
        let channel = RealtimeChannel::new(WsTransport, settings);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _errors = channel.on_error(move |error| {
            let _ = tx.send(error.clone());
        });

        channel.connect("jwt");
        assert!(matches!(rx.recv().await.unwrap(), ChannelError::Config(_)));
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_without_connect_is_quiet() {
        let channel = RealtimeChannel::new(
            WsTransport,
            ChannelSettings::from(&ClientConfig::default().realtime),
        );
        let fired = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&fired);
        let _changes = channel.on_connection_change(move |connected| {
            seen.lock().unwrap().push(*connected);
        });

        channel.disconnect();
        assert!(fired.lock().unwrap().is_empty());
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }
}
