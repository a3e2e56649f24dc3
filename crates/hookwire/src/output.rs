use std::io::{self, IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use hookwire_session::Message;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Which part of the session a printed message came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Handshake,
    Event,
}

impl MessageKind {
    fn as_str(self) -> &'static str {
        match self {
            MessageKind::Handshake => "handshake",
            MessageKind::Event => "event",
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    kind: MessageKind,
    index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    event: Option<&'a str>,
    message: &'a Message,
    timestamp: String,
}

pub fn render_message(
    message: &Message,
    kind: MessageKind,
    index: usize,
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                kind,
                index,
                event: message.event(),
                message,
                timestamp: now_unix_seconds(),
            };
            serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "KIND", "KEY", "VALUE"]);
            for (key, value) in message.as_map() {
                table.add_row(vec![
                    index.to_string(),
                    kind.as_str().to_string(),
                    key.clone(),
                    value_preview(value),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Pretty => {
            let body = serde_json::to_string_pretty(message).unwrap_or_else(|_| "{}".to_string());
            match message.event() {
                Some(event) => format!("#{index} {} {event}\n{body}", kind.as_str()),
                None => format!("#{index} {}\n{body}", kind.as_str()),
            }
        }
        OutputFormat::Raw => message.to_string(),
    }
}

/// Write one rendered message and flush, so each line reaches the reader
/// before the next frame is awaited.
pub fn write_message<W: Write>(
    out: &mut W,
    message: &Message,
    kind: MessageKind,
    index: usize,
    format: OutputFormat,
) -> io::Result<()> {
    writeln!(out, "{}", render_message(message, kind, index, format))?;
    out.flush()
}

fn value_preview(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
