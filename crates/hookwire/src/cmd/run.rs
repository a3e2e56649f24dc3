use std::io::{self, Write};
use std::time::Duration;

use hookwire_frame::FrameConfig;
use hookwire_session::{
    run_hook, ChannelSource, Handshake, HandshakeConfig, HookConfig, HookHandler, Message,
    SessionConfig,
};
use tracing::{debug, warn};

use crate::cmd::RunArgs;
use crate::exit::{outcome_result, CliError, CliResult};
use crate::output::{write_message, MessageKind, OutputFormat};

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let config = hook_config(&args)?;
    let mut printer = Printer::new(io::stdout(), format, args.ack);
    let outcome = run_hook(&ChannelSource::Process, &config, &mut printer);
    let code = outcome_result(outcome)?;
    match printer.output_error.take() {
        Some(err) => Err(CliError::output(err)),
        None => Ok(code),
    }
}

pub(crate) fn hook_config(args: &RunArgs) -> CliResult<HookConfig> {
    if args.max_frame_size == 0 {
        return Err(CliError::usage("max frame size must be greater than zero"));
    }
    let timeout = args.timeout.as_deref().map(parse_duration).transpose()?;

    let termination_event = if args.termination_event.is_empty() {
        None
    } else {
        Some(args.termination_event.clone())
    };

    Ok(HookConfig {
        socket_var: args.socket_var.clone(),
        frame: FrameConfig {
            max_frame_size: args.max_frame_size,
            read_timeout: timeout,
            write_timeout: timeout,
        },
        session: SessionConfig {
            handshake: HandshakeConfig {
                required: !args.no_handshake,
                acknowledge: args.ack_handshake,
                ..HandshakeConfig::default()
            },
            termination_event,
        },
    })
}

/// Prints every message and optionally acknowledges events.
///
/// The first output error is kept and reported once the session ends;
/// nothing more is written after it.
struct Printer<W> {
    out: W,
    format: OutputFormat,
    ack: bool,
    printed: usize,
    output_error: Option<io::Error>,
}

impl<W: Write> Printer<W> {
    fn new(out: W, format: OutputFormat, ack: bool) -> Self {
        Self {
            out,
            format,
            ack,
            printed: 0,
            output_error: None,
        }
    }

    fn print(&mut self, message: &Message, kind: MessageKind) {
        let index = self.printed;
        self.printed += 1;
        if self.output_error.is_some() {
            return;
        }
        if let Err(err) = write_message(&mut self.out, message, kind, index, self.format) {
            warn!(error = %err, index, "failed to write message to stdout");
            self.output_error = Some(err);
        }
    }
}

impl<W: Write> HookHandler for Printer<W> {
    fn on_handshake(&mut self, handshake: &Handshake) {
        self.print(&handshake.message, MessageKind::Handshake);
    }

    fn on_message(&mut self, message: &Message) -> Option<Message> {
        self.print(message, MessageKind::Event);
        if !self.ack {
            return None;
        }
        debug!(event = message.event(), "acknowledging event");
        Some(ack_for(message))
    }
}

fn ack_for(message: &Message) -> Message {
    let mut reply = Message::new().with("ack", true);
    if let Some(id) = message.get("id") {
        reply.insert("id", id.clone());
    }
    reply
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
