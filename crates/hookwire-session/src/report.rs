use std::collections::HashMap;

use hookwire_frame::{ChannelError, FrameConfig, FramedChannel};
use hookwire_transport::{
    acquire_from_process, acquire_with_var, AcquireError, Release, DEFAULT_SOCKET_VAR,
};
use tracing::{debug, info, warn};

use crate::error::{ProtocolError, SessionError};
use crate::session::{HookHandler, Session, SessionConfig, SessionSummary};

/// Exit code for a session the parent ended cleanly.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for any acquisition, transport or protocol failure.
pub const EXIT_FAILURE: i32 = 1;

/// Any failure of a hook invocation, classified by layer.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error(transparent)]
    Channel(ChannelError),

    #[error(transparent)]
    Protocol(ProtocolError),
}

impl HookError {
    /// Classified name of the failure, e.g. `MalformedPayload`.
    pub fn kind(&self) -> &'static str {
        match self {
            HookError::Acquire(err) => err.kind(),
            HookError::Channel(err) => err.kind(),
            HookError::Protocol(err) => err.kind(),
        }
    }
}

impl From<SessionError> for HookError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Channel(err) => HookError::Channel(err),
            SessionError::Protocol(err) => HookError::Protocol(err),
        }
    }
}

/// Final result of a hook invocation, ready for the process boundary.
#[derive(Debug)]
pub enum Outcome {
    Completed(SessionSummary),
    Failed(HookError),
}

impl Outcome {
    /// Whether the parent ended the session cleanly.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Completed(_) => EXIT_SUCCESS,
            Outcome::Failed(_) => EXIT_FAILURE,
        }
    }

    /// The failure, if any.
    pub fn error(&self) -> Option<&HookError> {
        match self {
            Outcome::Completed(_) => None,
            Outcome::Failed(err) => Some(err),
        }
    }
}

/// Release the channel and classify the session result.
///
/// The handle is released on every path, before the result is inspected.
pub fn conclude<R: Release + ?Sized>(
    handle: &mut R,
    result: std::result::Result<SessionSummary, SessionError>,
) -> Outcome {
    let released = handle.release();
    debug!(released, "released hook channel");

    match result {
        Ok(summary) => {
            info!(
                state = %summary.state,
                messages = summary.messages,
                responses = summary.responses,
                "hook session completed"
            );
            Outcome::Completed(summary)
        }
        Err(err) => {
            let err = HookError::from(err);
            warn!(kind = err.kind(), error = %err, "hook session failed");
            Outcome::Failed(err)
        }
    }
}

/// Where to look up the descriptor variable.
#[derive(Debug, Clone)]
pub enum ChannelSource {
    /// An injected environment mapping.
    Env(HashMap<String, String>),
    /// The process environment.
    Process,
}

/// Configuration for a full hook invocation.
#[derive(Debug, Clone)]
pub struct HookConfig {
    /// Environment variable naming the inherited descriptor.
    pub socket_var: String,
    /// Framing limits and socket timeouts.
    pub frame: FrameConfig,
    /// Session protocol behavior.
    pub session: SessionConfig,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            socket_var: DEFAULT_SOCKET_VAR.to_string(),
            frame: FrameConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

/// Acquire the inherited channel, run one session and report the outcome.
pub fn run_hook<H: HookHandler + ?Sized>(
    source: &ChannelSource,
    config: &HookConfig,
    handler: &mut H,
) -> Outcome {
    let acquired = match source {
        ChannelSource::Env(env) => acquire_with_var(env, &config.socket_var),
        ChannelSource::Process => acquire_from_process(&config.socket_var),
    };
    let handle = match acquired {
        Ok(handle) => handle,
        Err(err) => {
            warn!(kind = err.kind(), error = %err, "hook channel unavailable");
            return Outcome::Failed(err.into());
        }
    };

    info!(
        var = %config.socket_var,
        source_fd = ?handle.source_fd(),
        fd = ?handle.raw_fd(),
        peer = ?handle.peer_credentials(),
        "hook channel acquired"
    );

    // On failure the handle is dropped here, which releases it.
    let channel = match FramedChannel::with_config_handle(handle, config.frame.clone()) {
        Ok(channel) => channel,
        Err(err) => {
            warn!(kind = err.kind(), error = %err, "hook channel setup failed");
            return Outcome::Failed(HookError::Channel(err));
        }
    };

    let mut session = Session::new(channel, config.session.clone());
    let result = session.run(handler);
    let mut channel = session.into_channel();
    conclude(channel.get_mut(), result)
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;

    use hookwire_transport::ChannelHandle;

    use super::*;
    use crate::message::Message;
    use crate::session::SessionState;

    #[derive(Default)]
    struct CountingRelease {
        calls: usize,
        released: bool,
    }

    impl Release for CountingRelease {
        fn release(&mut self) -> bool {
            self.calls += 1;
            !std::mem::replace(&mut self.released, true)
        }
    }

    fn summary() -> SessionSummary {
        SessionSummary {
            state: SessionState::Closed,
            protocol_version: Some(1),
            messages: 2,
            responses: 0,
        }
    }

    fn env_for(stream: &UnixStream) -> ChannelSource {
        ChannelSource::Env(HashMap::from([(
            DEFAULT_SOCKET_VAR.to_string(),
            stream.as_raw_fd().to_string(),
        )]))
    }

    #[test]
    fn completed_releases_and_exits_zero() {
        let mut handle = CountingRelease::default();
        let outcome = conclude(&mut handle, Ok(summary()));

        assert!(outcome.is_success());
        assert_eq!(outcome.exit_code(), EXIT_SUCCESS);
        assert!(outcome.error().is_none());
        assert_eq!(handle.calls, 1);
        assert!(handle.released);
    }

    #[test]
    fn failure_releases_and_classifies() {
        let mut handle = CountingRelease::default();
        let err = SessionError::Protocol(ProtocolError::MalformedPayload("bad".to_string()));
        let outcome = conclude(&mut handle, Err(err));

        assert_eq!(outcome.exit_code(), EXIT_FAILURE);
        assert_eq!(outcome.error().map(HookError::kind), Some("MalformedPayload"));
        assert_eq!(handle.calls, 1);
    }

    #[test]
    fn channel_handle_is_closed_once() {
        let (left, mut right) = UnixStream::pair().unwrap();
        let mut handle = ChannelHandle::from(left);

        let outcome = conclude(&mut handle, Err(ChannelError::Timeout.into()));
        assert_eq!(outcome.error().map(HookError::kind), Some("Timeout"));
        assert!(handle.is_closed());
        assert!(!handle.release());

        let mut buf = [0u8; 1];
        assert_eq!(right.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn error_kinds_cover_every_layer() {
        let acquire: HookError = AcquireError::MissingVariable {
            var: "X".to_string(),
        }
        .into();
        assert_eq!(acquire.kind(), "MissingVariable");
        assert_eq!(HookError::Channel(ChannelError::Closed).kind(), "Closed");
        assert_eq!(
            HookError::from(SessionError::Protocol(ProtocolError::HandshakeMismatch {
                offered: 2,
                min: 1,
                max: 1
            }))
            .kind(),
            "HandshakeMismatch"
        );
    }

    #[test]
    fn run_hook_missing_variable() {
        let source = ChannelSource::Env(HashMap::new());
        let mut handler = |_: &Message| -> Option<Message> { None };
        let outcome = run_hook(&source, &HookConfig::default(), &mut handler);

        assert_eq!(outcome.exit_code(), EXIT_FAILURE);
        assert_eq!(outcome.error().map(HookError::kind), Some("MissingVariable"));
    }

    #[test]
    fn run_hook_invalid_descriptor() {
        let source = ChannelSource::Env(HashMap::from([(
            DEFAULT_SOCKET_VAR.to_string(),
            "not-a-number".to_string(),
        )]));
        let mut handler = |_: &Message| -> Option<Message> { None };
        let outcome = run_hook(&source, &HookConfig::default(), &mut handler);
        assert_eq!(outcome.error().map(HookError::kind), Some("InvalidDescriptor"));
    }

    #[test]
    fn run_hook_end_to_end() {
        let (left, right) = UnixStream::pair().unwrap();
        let source = env_for(&right);

        let mut parent = FramedChannel::new(left);
        parent.send_frame(br#"{"version":1}"#).unwrap();
        parent.send_frame(br#"{"event":"PreInstall"}"#).unwrap();
        drop(parent);

        let mut events = Vec::new();
        let mut handler = |message: &Message| -> Option<Message> {
            events.push(message.clone());
            None
        };
        let outcome = run_hook(&source, &HookConfig::default(), &mut handler);

        assert_eq!(outcome.exit_code(), EXIT_SUCCESS);
        match outcome {
            Outcome::Completed(summary) => {
                assert_eq!(summary.state, SessionState::Closed);
                assert_eq!(summary.protocol_version, Some(1));
                assert_eq!(summary.messages, 1);
            }
            Outcome::Failed(err) => panic!("unexpected failure: {err}"),
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event(), Some("PreInstall"));
    }

    #[test]
    fn run_hook_malformed_payload() {
        let (left, right) = UnixStream::pair().unwrap();
        let source = env_for(&right);

        let mut parent = FramedChannel::new(left);
        parent.send_frame(br#"{"version":1}"#).unwrap();
        parent.send_frame(b"{\"event\":\"Pre\xffInstall\"").unwrap();
        drop(parent);

        let mut handler = |_: &Message| -> Option<Message> { None };
        let outcome = run_hook(&source, &HookConfig::default(), &mut handler);

        assert_eq!(outcome.exit_code(), EXIT_FAILURE);
        assert_eq!(outcome.error().map(HookError::kind), Some("MalformedPayload"));
    }
}
