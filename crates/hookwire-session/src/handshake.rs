use std::io::{Read, Write};

use hookwire_frame::FramedChannel;
use serde_json::Value;
use tracing::debug;

use crate::error::{ProtocolError, Result};
use crate::message::Message;

/// Handshake field carrying the protocol version.
pub const VERSION_KEY: &str = "version";
/// Handshake field carrying the capability list.
pub const CAPABILITIES_KEY: &str = "capabilities";

const MAX_CAPABILITIES: usize = 64;
const MAX_CAPABILITY_LEN: usize = 64;

/// Versioned capability declaration exchanged before any event.
///
/// Wire form: `{"version": 1, "capabilities": ["..."]}`. `capabilities`
/// may be omitted. Other fields are kept in [`Handshake::message`] but not
/// interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct Handshake {
    /// Protocol version.
    pub version: u64,
    /// Capabilities declared by the sender.
    pub capabilities: Vec<String>,
    /// The handshake exactly as it appeared on the wire.
    pub message: Message,
}

impl Handshake {
    /// Handshake carrying only a version.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            capabilities: Vec::new(),
            message: Message::new().with(VERSION_KEY, version),
        }
    }

    /// Handshake declaring `capabilities`, as sent in an acknowledgement.
    pub fn with_capabilities(version: u64, capabilities: Vec<String>) -> Self {
        let message = Message::new()
            .with(VERSION_KEY, version)
            .with(CAPABILITIES_KEY, capabilities.clone());
        Self {
            version,
            capabilities,
            message,
        }
    }

    /// Interpret a decoded message as a handshake.
    pub fn from_message(message: &Message) -> std::result::Result<Self, ProtocolError> {
        let version = match message.get(VERSION_KEY) {
            Some(value) => value.as_u64().ok_or_else(|| {
                ProtocolError::UnexpectedMessage(format!(
                    "handshake \"{VERSION_KEY}\" must be an unsigned integer, got {value}"
                ))
            })?,
            None => {
                return Err(ProtocolError::UnexpectedMessage(format!(
                    "expected handshake with \"{VERSION_KEY}\", got {}",
                    describe(message)
                )))
            }
        };

        let capabilities = match message.get(CAPABILITIES_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => parse_capabilities(items)?,
            Some(other) => {
                return Err(ProtocolError::UnexpectedMessage(format!(
                    "handshake \"{CAPABILITIES_KEY}\" must be an array, got {other}"
                )))
            }
        };

        Ok(Self {
            version,
            capabilities,
            message: message.clone(),
        })
    }

    /// Encode as a message, unknown fields included.
    pub fn to_message(&self) -> Message {
        self.message.clone()
    }

    /// A field of the handshake this type does not interpret.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.message.get(key)
    }

    /// Whether the sender declared `capability`.
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

/// Configuration for handshake negotiation.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Expect a handshake frame before any event.
    pub required: bool,
    /// Lowest accepted protocol version.
    pub min_version: u64,
    /// Highest accepted protocol version.
    pub max_version: u64,
    /// Reply to the parent's handshake with the accepted version.
    pub acknowledge: bool,
    /// Capabilities announced in the acknowledgement.
    pub capabilities: Vec<String>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            required: true,
            min_version: 1,
            max_version: 1,
            acknowledge: false,
            capabilities: Vec::new(),
        }
    }
}

/// Check an offered handshake against the supported version range.
pub fn negotiate(
    offered: &Handshake,
    config: &HandshakeConfig,
) -> std::result::Result<u64, ProtocolError> {
    if offered.version < config.min_version || offered.version > config.max_version {
        return Err(ProtocolError::HandshakeMismatch {
            offered: offered.version,
            min: config.min_version,
            max: config.max_version,
        });
    }
    Ok(offered.version)
}

/// Receive, validate and optionally acknowledge the parent's handshake.
pub fn accept_handshake<T: Read + Write>(
    channel: &mut FramedChannel<T>,
    config: &HandshakeConfig,
) -> Result<Handshake> {
    let body = channel.receive_frame()?;
    let message = Message::decode(&body)?;
    let offered = Handshake::from_message(&message)?;
    let version = negotiate(&offered, config)?;

    if config.acknowledge {
        let reply = Handshake::with_capabilities(version, config.capabilities.clone());
        channel.send_frame(&reply.to_message().encode())?;
        debug!(version, "acknowledged handshake");
    }

    Ok(offered)
}

fn parse_capabilities(items: &[Value]) -> std::result::Result<Vec<String>, ProtocolError> {
    if items.len() > MAX_CAPABILITIES {
        return Err(ProtocolError::UnexpectedMessage(format!(
            "too many capabilities in handshake: {} (max {})",
            items.len(),
            MAX_CAPABILITIES
        )));
    }

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item.as_str() {
            Some(name) if !name.is_empty() && name.len() <= MAX_CAPABILITY_LEN => {
                if !out.iter().any(|c: &String| c == name) {
                    out.push(name.to_string());
                }
            }
            _ => {
                return Err(ProtocolError::UnexpectedMessage(format!(
                    "invalid capability in handshake: {item}"
                )))
            }
        }
    }
    Ok(out)
}

fn describe(message: &Message) -> String {
    match message.event() {
        Some(event) => format!("event \"{event}\""),
        None => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;

    use hookwire_frame::ChannelError;

    use super::*;
    use crate::error::SessionError;

    fn hello(json: &str) -> Message {
        Message::decode(json.as_bytes()).unwrap()
    }

    #[test]
    fn parses_minimal_handshake() {
        let hs = Handshake::from_message(&hello(r#"{"version":1}"#)).unwrap();
        assert_eq!(hs, Handshake::new(1));
    }

    #[test]
    fn parses_capabilities_and_dedups() {
        let hs = Handshake::from_message(&hello(
            r#"{"version":2,"capabilities":["ack","progress","ack"]}"#,
        ))
        .unwrap();
        assert_eq!(hs.version, 2);
        assert_eq!(hs.capabilities, vec!["ack", "progress"]);
        assert!(hs.supports("progress"));
        assert!(!hs.supports("bye"));
    }

    #[test]
    fn event_instead_of_handshake_is_unexpected() {
        let err = Handshake::from_message(&hello(r#"{"event":"PreInstall"}"#)).unwrap_err();
        assert!(
            matches!(err, ProtocolError::UnexpectedMessage(ref m) if m.contains("PreInstall")),
            "{err:?}"
        );
    }

    #[test]
    fn non_integer_version_is_unexpected() {
        for json in [r#"{"version":"1"}"#, r#"{"version":-1}"#, r#"{"version":1.5}"#] {
            let err = Handshake::from_message(&hello(json)).unwrap_err();
            assert!(matches!(err, ProtocolError::UnexpectedMessage(_)), "{json}");
        }
    }

    #[test]
    fn invalid_capabilities_are_unexpected() {
        for json in [
            r#"{"version":1,"capabilities":"ack"}"#,
            r#"{"version":1,"capabilities":[1]}"#,
            r#"{"version":1,"capabilities":[""]}"#,
        ] {
            let err = Handshake::from_message(&hello(json)).unwrap_err();
            assert!(matches!(err, ProtocolError::UnexpectedMessage(_)), "{json}");
        }
    }

    #[test]
    fn negotiate_checks_range() {
        let cfg = HandshakeConfig {
            min_version: 1,
            max_version: 2,
            ..HandshakeConfig::default()
        };
        assert_eq!(negotiate(&Handshake::new(1), &cfg).unwrap(), 1);
        assert_eq!(negotiate(&Handshake::new(2), &cfg).unwrap(), 2);
        assert!(matches!(
            negotiate(&Handshake::new(3), &cfg),
            Err(ProtocolError::HandshakeMismatch {
                offered: 3,
                min: 1,
                max: 2
            })
        ));
        assert!(negotiate(&Handshake::new(0), &cfg).is_err());
    }

    #[test]
    fn to_message_roundtrip() {
        let hs = Handshake::with_capabilities(1, vec!["ack".to_string()]);
        assert_eq!(Handshake::from_message(&hs.to_message()).unwrap(), hs);
    }

    #[test]
    fn extra_fields_are_kept_verbatim() {
        let hs = Handshake::from_message(&hello(r#"{"version":1,"apt":"2.7.14"}"#)).unwrap();

        assert_eq!(hs.version, 1);
        assert_eq!(hs.field("apt").and_then(Value::as_str), Some("2.7.14"));
        assert_eq!(hs.to_message().to_string(), r#"{"apt":"2.7.14","version":1}"#);
        assert!(hs.field(CAPABILITIES_KEY).is_none());
    }

    #[test]
    fn accept_without_acknowledgement_sends_nothing() {
        let (left, right) = UnixStream::pair().unwrap();
        let mut parent = FramedChannel::new(left);
        let mut hook = FramedChannel::new(right);

        parent.send_frame(br#"{"version":1}"#).unwrap();
        let hs = accept_handshake(&mut hook, &HandshakeConfig::default()).unwrap();
        assert_eq!(hs.version, 1);

        drop(hook);
        assert!(matches!(parent.receive_frame(), Err(ChannelError::Closed)));
    }

    #[test]
    fn accept_with_acknowledgement_replies() {
        let (left, right) = UnixStream::pair().unwrap();
        let mut parent = FramedChannel::new(left);
        let mut hook = FramedChannel::new(right);
        let cfg = HandshakeConfig {
            acknowledge: true,
            capabilities: vec!["ack".to_string()],
            ..HandshakeConfig::default()
        };

        parent.send_frame(br#"{"version":1}"#).unwrap();
        accept_handshake(&mut hook, &cfg).unwrap();

        let reply = Message::decode(&parent.receive_frame().unwrap()).unwrap();
        let reply = Handshake::from_message(&reply).unwrap();
        assert_eq!(reply.version, 1);
        assert_eq!(reply.capabilities, vec!["ack"]);
    }

    #[test]
    fn accept_rejects_mismatched_version_without_reply() {
        let (left, right) = UnixStream::pair().unwrap();
        let mut parent = FramedChannel::new(left);
        let mut hook = FramedChannel::new(right);
        let cfg = HandshakeConfig {
            acknowledge: true,
            ..HandshakeConfig::default()
        };

        parent.send_frame(br#"{"version":9}"#).unwrap();
        let err = accept_handshake(&mut hook, &cfg).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Protocol(ProtocolError::HandshakeMismatch { offered: 9, .. })
        ));

        drop(hook);
        assert!(matches!(parent.receive_frame(), Err(ChannelError::Closed)));
    }

    #[test]
    fn accept_propagates_close() {
        let (left, right) = UnixStream::pair().unwrap();
        drop(left);

        let mut hook = FramedChannel::new(right);
        let err = accept_handshake(&mut hook, &HandshakeConfig::default()).unwrap_err();
        assert!(matches!(err, SessionError::Channel(ChannelError::Closed)));
    }
}
