//! Minimal STOMP 1.2 frame codec.
//!
//! Only the frames a subscribing client needs are supported. Frames travel as
//! WebSocket text messages; one message may hold several frames and bare EOLs
//! (heartbeats).

use super::ChannelError;
use std::fmt::Write as _;
use std::time::Duration;

/// STOMP frame commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Client handshake
    Connect,
    /// Server handshake reply
    Connected,
    /// Start a subscription
    Subscribe,
    /// Stop a subscription
    Unsubscribe,
    /// Graceful close
    Disconnect,
    /// Subscription delivery
    Message,
    /// Receipt acknowledgement
    Receipt,
    /// Server-side failure
    Error,
}

impl Command {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "CONNECT" => Self::Connect,
            "CONNECTED" => Self::Connected,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            _ => return None,
        })
    }

    /// CONNECT and CONNECTED headers are never escaped.
    const fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

/// One STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command
    pub command: Command,
    /// Headers in wire order
    pub headers: Vec<(String, String)>,
    /// Body text
    pub body: String,
}

impl Frame {
    /// Frame without headers or body.
    #[must_use]
    pub const fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Append a header.
    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// First value of header `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// CONNECT handshake announcing our heartbeat intervals.
    #[must_use]
    pub fn connect(host: &str, heartbeat: Heartbeat) -> Self {
        Self::new(Command::Connect)
            .header("accept-version", "1.2")
            .header("host", host)
            .header(
                "heart-beat",
                format!("{},{}", millis(heartbeat.outgoing), millis(heartbeat.incoming)),
            )
    }

    /// SUBSCRIBE to `destination` under subscription `id`.
    #[must_use]
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    /// Graceful DISCONNECT.
    #[must_use]
    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect)
    }

    /// Serialize, including the terminating NUL.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');

        for (name, value) in &self.headers {
            if self.command.escapes_headers() {
                let _ = writeln!(out, "{}:{}", escape(name), escape(value));
            } else {
                let _ = writeln!(out, "{name}:{value}");
            }
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one frame (without its trailing NUL).
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Protocol`] for unknown commands or malformed headers.
    pub fn decode(raw: &str) -> Result<Self, ChannelError> {
        let raw = raw.trim_start_matches(['\r', '\n']);
        let (head, body) = raw
            .split_once("\n\n")
            .or_else(|| raw.split_once("\r\n\r\n"))
            .unwrap_or((raw, ""));

        let mut lines = head.lines();
        let command_line = lines.next().unwrap_or_default().trim_end_matches('\r');
        let command = Command::parse(command_line).ok_or_else(|| {
            ChannelError::Protocol(format!("unknown command {command_line:?}"))
        })?;

        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ChannelError::Protocol(format!("malformed header {line:?}")))?;

            if command.escapes_headers() {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        Ok(Self {
            command,
            headers,
            body: body.to_string(),
        })
    }
}

/// What one inbound text message contained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A bare EOL keep-alive
    Heartbeat,
    /// A frame
    Frame(Frame),
}

/// Split an inbound text message into heartbeats and frames.
///
/// Each element is decoded independently so one bad frame does not hide its
/// neighbours.
#[must_use]
pub fn decode_message(text: &str) -> Vec<Result<Inbound, ChannelError>> {
    let mut out = Vec::new();

    for chunk in text.split('\0') {
        let trimmed = chunk.trim_start_matches(['\r', '\n']);
        if trimmed.is_empty() {
            if !chunk.is_empty() {
                out.push(Ok(Inbound::Heartbeat));
            }
            continue;
        }
        out.push(Frame::decode(trimmed).map(Inbound::Frame));
    }

    out
}

/// Heartbeat intervals; zero means "none".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Heartbeat {
    /// How often we send
    pub outgoing: Duration,
    /// How often we want to receive
    pub incoming: Duration,
}

impl Heartbeat {
    /// Intervals in effect after the server answered with `heart-beat:sx,sy`.
    ///
    /// Each direction uses the larger of the two values, or none if either
    /// side declined.
    #[must_use]
    pub fn negotiate(self, server: Option<&str>) -> Self {
        let (server_outgoing, server_incoming) = server
            .and_then(|value| value.split_once(','))
            .and_then(|(sx, sy)| Some((sx.trim().parse::<u64>().ok()?, sy.trim().parse::<u64>().ok()?)))
            .unwrap_or((0, 0));

        let pick = |ours: Duration, theirs: u64| {
            if ours.is_zero() || theirs == 0 {
                Duration::ZERO
            } else {
                ours.max(Duration::from_millis(theirs))
            }
        };

        Self {
            outgoing: pick(self.outgoing, server_incoming),
            incoming: pick(self.incoming, server_outgoing),
        }
    }
}

fn millis(duration: Duration) -> u128 {
    duration.as_millis()
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(value: &str) -> Result<String, ChannelError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(ChannelError::Protocol(format!(
                    "invalid header escape \\{}",
                    other.map(String::from).unwrap_or_default()
                )));
            },
        }
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Test code can use unwrap/panic
mod tests {
    use super::*;

    #[test]
    fn test_connect_frame_layout() {
        let frame = Frame::connect(
            "localhost",
            Heartbeat {
                outgoing: Duration::from_millis(4000),
                incoming: Duration::from_millis(4000),
            },
        );
        assert_eq!(
            frame.encode(),
            "CONNECT\naccept-version:1.2\nhost:localhost\nheart-beat:4000,4000\n\n\0"
        );
    }

    #[test]
    fn test_subscribe_frame_layout() {
        assert_eq!(
            Frame::subscribe("sub-0", "/user/queue/tickets").encode(),
            "SUBSCRIBE\nid:sub-0\ndestination:/user/queue/tickets\nack:auto\n\n\0"
        );
    }

    #[test]
    fn test_decodes_message_frame() {
        let text = "MESSAGE\ndestination:/user/queue/tickets\nsubscription:sub-0\nmessage-id:7\n\n{\"queuePosition\":3}\0";
        let decoded = decode_message(text);
        assert_eq!(decoded.len(), 1);

        let Ok(Inbound::Frame(frame)) = &decoded[0] else {
            panic!("expected a frame, got {decoded:?}");
        };
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.get("subscription"), Some("sub-0"));
        assert_eq!(frame.body, "{\"queuePosition\":3}");
    }

    #[test]
    fn test_heartbeats_and_frames_share_a_message() {
        let decoded = decode_message("\nCONNECTED\nversion:1.2\n\n\0\n");
        assert!(matches!(decoded.as_slice(), [Ok(Inbound::Frame(_)), Ok(Inbound::Heartbeat)]));

        assert_eq!(decode_message("\n"), vec![Ok(Inbound::Heartbeat)]);
    }

    #[test]
    fn test_unknown_command_is_protocol_error() {
        assert!(matches!(
            Frame::decode("BOGUS\n\n"),
            Err(ChannelError::Protocol(_))
        ));
    }

    #[test]
    fn test_header_escaping_round_trips() {
        let frame = Frame::new(Command::Error).header("message", "bad: token\nexpired");
        let encoded = frame.encode();
        assert!(encoded.contains("message:bad\\c token\\nexpired"));

        let decoded = Frame::decode(encoded.trim_end_matches('\0')).unwrap();
        assert_eq!(decoded.get("message"), Some("bad: token\nexpired"));
    }

    #[test]
    fn test_heartbeat_negotiation() {
        let ours = Heartbeat {
            outgoing: Duration::from_millis(4000),
            incoming: Duration::from_millis(4000),
        };

        let agreed = ours.negotiate(Some("10000,2000"));
        assert_eq!(agreed.outgoing, Duration::from_millis(4000));
        assert_eq!(agreed.incoming, Duration::from_millis(10000));

        let declined = ours.negotiate(Some("0,0"));
        assert_eq!(declined, Heartbeat::default());
        assert_eq!(ours.negotiate(None), Heartbeat::default());
    }
}
