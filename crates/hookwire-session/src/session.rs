use std::fmt;
use std::io::{Read, Write};

use hookwire_frame::{ChannelError, FramedChannel};
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::handshake::{accept_handshake, Handshake, HandshakeConfig};
use crate::message::Message;

/// Event name that ends a session without waiting for the channel to close.
pub const DEFAULT_TERMINATION_EVENT: &str = "Bye";

/// Lifecycle of a hook session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the parent's handshake frame.
    AwaitingHandshake,
    /// Exchanging event messages.
    Active,
    /// The parent ended the session cleanly.
    Closed,
    /// A channel or protocol error ended the session.
    Failed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::AwaitingHandshake => "awaiting_handshake",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        }
    }

    /// Whether no further frames will be processed.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business logic of a hook: receives every decoded event message.
pub trait HookHandler {
    /// Called once after the parent's handshake is accepted.
    ///
    /// [`Handshake::message`] holds the frame as received, unknown fields
    /// included.
    fn on_handshake(&mut self, _handshake: &Handshake) {}

    /// Handle one event message.
    ///
    /// A returned message is sent back to the parent as a response frame.
    fn on_message(&mut self, message: &Message) -> Option<Message>;
}

impl<F> HookHandler for F
where
    F: FnMut(&Message) -> Option<Message>,
{
    fn on_message(&mut self, message: &Message) -> Option<Message> {
        self(message)
    }
}

/// Configuration for the session protocol.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Handshake negotiation.
    pub handshake: HandshakeConfig,
    /// `event` value that ends the session. `None` waits for channel close.
    pub termination_event: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake: HandshakeConfig::default(),
            termination_event: Some(DEFAULT_TERMINATION_EVENT.to_string()),
        }
    }
}

/// Result of a completed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Final state.
    pub state: SessionState,
    /// Version accepted during the handshake.
    pub protocol_version: Option<u64>,
    /// Event messages delivered to the handler.
    pub messages: usize,
    /// Frames sent back to the parent, handshake acknowledgement included.
    pub responses: usize,
}

/// A hook session over one framed channel.
pub struct Session<T> {
    channel: FramedChannel<T>,
    config: SessionConfig,
    state: SessionState,
    handshake: Option<Handshake>,
    messages: usize,
    responses: usize,
}

impl<T: Read + Write> Session<T> {
    /// Start a session; it waits for a handshake unless the config says otherwise.
    pub fn new(channel: FramedChannel<T>, config: SessionConfig) -> Self {
        let state = if config.handshake.required {
            SessionState::AwaitingHandshake
        } else {
            SessionState::Active
        };
        Self {
            channel,
            config,
            state,
            handshake: None,
            messages: 0,
            responses: 0,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handshake accepted from the parent, if any.
    pub fn handshake(&self) -> Option<&Handshake> {
        self.handshake.as_ref()
    }

    /// Borrow the framed channel.
    pub fn channel(&self) -> &FramedChannel<T> {
        &self.channel
    }

    /// Mutably borrow the framed channel.
    pub fn channel_mut(&mut self) -> &mut FramedChannel<T> {
        &mut self.channel
    }

    /// Consume the session and return the channel for release.
    pub fn into_channel(self) -> FramedChannel<T> {
        self.channel
    }

    /// Drive the session until the parent closes the channel, sends the
    /// termination event, or an error occurs.
    ///
    /// Errors leave the session in [`SessionState::Failed`].
    pub fn run<H: HookHandler + ?Sized>(&mut self, handler: &mut H) -> Result<SessionSummary> {
        match self.drive(handler) {
            Ok(()) => Ok(self.summary()),
            Err(err) => {
                warn!(state = %self.state, error = %err, "hook session failed");
                self.state = SessionState::Failed;
                Err(err)
            }
        }
    }

    /// Snapshot of the session counters.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            state: self.state,
            protocol_version: self.handshake.as_ref().map(|hs| hs.version),
            messages: self.messages,
            responses: self.responses,
        }
    }

    fn drive<H: HookHandler + ?Sized>(&mut self, handler: &mut H) -> Result<()> {
        loop {
            match self.state {
                SessionState::AwaitingHandshake => self.await_handshake(handler)?,
                SessionState::Active => self.process_next(handler)?,
                SessionState::Closed | SessionState::Failed => return Ok(()),
            }
        }
    }

    fn await_handshake<H: HookHandler + ?Sized>(&mut self, handler: &mut H) -> Result<()> {
        match accept_handshake(&mut self.channel, &self.config.handshake) {
            Ok(handshake) => {
                info!(
                    version = handshake.version,
                    capabilities = ?handshake.capabilities,
                    "handshake accepted"
                );
                if self.config.handshake.acknowledge {
                    self.responses += 1;
                }
                handler.on_handshake(&handshake);
                self.handshake = Some(handshake);
                self.state = SessionState::Active;
                Ok(())
            }
            Err(SessionError::Channel(ChannelError::Closed)) => {
                info!("channel closed before handshake");
                self.state = SessionState::Closed;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn process_next<H: HookHandler + ?Sized>(&mut self, handler: &mut H) -> Result<()> {
        let body = match self.channel.receive_frame() {
            Ok(body) => body,
            Err(ChannelError::Closed) => {
                info!(messages = self.messages, "channel closed by parent");
                self.state = SessionState::Closed;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let message = Message::decode(&body)?;
        self.messages += 1;
        debug!(event = message.event(), len = body.len(), "received message");

        if let Some(reply) = handler.on_message(&message) {
            self.channel.send_frame(&reply.encode())?;
            self.responses += 1;
        }

        if self.is_termination(&message) {
            info!(messages = self.messages, "termination event received");
            self.state = SessionState::Closed;
        }
        Ok(())
    }

    fn is_termination(&self, message: &Message) -> bool {
        match (&self.config.termination_event, message.event()) {
            (Some(expected), Some(event)) => expected == event,
            _ => false,
        }
    }
}
