mod cmd;
mod exit;
mod logging;
mod output;

use std::ffi::OsString;

use clap::error::ErrorKind;
use clap::parser::ValueSource;
use clap::{ArgMatches, Args, CommandFactory, FromArgMatches, Parser};

use crate::cmd::{Command, RunArgs};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "hookwire",
    version,
    about = "Run an APT-style JSON hook over an inherited socket"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

/// Parse arguments, rejecting hook-session options written before a
/// subcommand. Global flags are accepted on either side.
fn parse_cli<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let mut command = Cli::command();
    let matches = command.try_get_matches_from_mut(args)?;

    if let Some((name, _)) = matches.subcommand() {
        if let Some(flag) = session_flag_on_command_line(&matches) {
            return Err(command.error(
                ErrorKind::ArgumentConflict,
                format!("--{flag} applies to the hook session and cannot be used with '{name}'"),
            ));
        }
    }

    Cli::from_arg_matches(&matches).map_err(|err| err.format(&mut command))
}

/// Long name of the first hook-session option typed on the command line.
///
/// Values taken from the environment or defaults do not count.
fn session_flag_on_command_line(matches: &ArgMatches) -> Option<String> {
    let session = RunArgs::augment_args(clap::Command::new("session"));
    let arg = session.get_arguments().find(|arg| {
        matches.value_source(arg.get_id().as_str()) == Some(ValueSource::CommandLine)
    })?;
    Some(arg.get_long().unwrap_or(arg.get_id().as_str()).to_string())
}

fn main() {
    let cli = parse_cli(std::env::args_os()).unwrap_or_else(|err| err.exit());
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::dispatch(cli.command, cli.run, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
