use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod envinfo;
pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show version information.
    Version(VersionArgs),
    /// Check the hook socket and print the resolved session settings.
    ///
    /// Accepts the same options as the hook session. The descriptor is
    /// duplicated and inspected but never read from or written to.
    Envinfo(RunArgs),
}

pub fn dispatch(
    command: Option<Command>,
    run_args: RunArgs,
    format: OutputFormat,
) -> CliResult<i32> {
    match command {
        None => run::run(run_args, format),
        Some(Command::Version(args)) => version::run(args),
        Some(Command::Envinfo(args)) => envinfo::run(args, format),
    }
}

/// Options for the hook session (the default action).
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Environment variable holding the inherited socket descriptor.
    #[arg(
        long,
        value_name = "NAME",
        env = "HOOKWIRE_SOCKET_VAR",
        default_value = hookwire_transport::DEFAULT_SOCKET_VAR
    )]
    pub socket_var: String,
    /// Largest accepted frame body in bytes.
    #[arg(
        long,
        value_name = "BYTES",
        env = "HOOKWIRE_MAX_FRAME_SIZE",
        default_value_t = hookwire_frame::DEFAULT_MAX_FRAME_SIZE
    )]
    pub max_frame_size: usize,
    /// Read and write timeout on the channel (e.g. 5s, 500ms). Default: none.
    #[arg(long, value_name = "DURATION", env = "HOOKWIRE_TIMEOUT")]
    pub timeout: Option<String>,
    /// Treat the first frame as an event instead of a handshake.
    #[arg(long, conflicts_with = "ack_handshake")]
    pub no_handshake: bool,
    /// Reply to the parent's handshake with the accepted version.
    #[arg(long)]
    pub ack_handshake: bool,
    /// Reply `{"ack": true}` to every event.
    #[arg(long)]
    pub ack: bool,
    /// Event name that ends the session. Pass an empty string to disable.
    #[arg(long, value_name = "EVENT", default_value = hookwire_session::DEFAULT_TERMINATION_EVENT)]
    pub termination_event: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
