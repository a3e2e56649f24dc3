use std::fmt;
use std::io;

use hookwire_session::{HookError, Outcome, EXIT_FAILURE, EXIT_SUCCESS};

pub const SUCCESS: i32 = EXIT_SUCCESS;
pub const FAILURE: i32 = EXIT_FAILURE;
pub const USAGE: i32 = 64;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub kind: Option<&'static str>,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            kind: None,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }

    /// Hook output could not be written to stdout.
    pub fn output(err: io::Error) -> Self {
        Self {
            code: FAILURE,
            kind: Some("OutputFailed"),
            message: format!("failed to write hook output: {err}"),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "[{kind}] {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for CliError {}

impl From<HookError> for CliError {
    fn from(err: HookError) -> Self {
        Self {
            code: FAILURE,
            kind: Some(err.kind()),
            message: err.to_string(),
        }
    }
}

/// Exit code for a finished hook, or the error to print.
pub fn outcome_result(outcome: Outcome) -> CliResult<i32> {
    match outcome {
        Outcome::Completed(_) => Ok(SUCCESS),
        Outcome::Failed(err) => Err(err.into()),
    }
}
