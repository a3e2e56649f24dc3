use std::collections::BTreeMap;
use std::time::Duration;

use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use hookwire_session::HookConfig;
use hookwire_transport::{acquire_from_process, ChannelHandle};
use serde::Serialize;

use crate::cmd::run::hook_config;
use crate::cmd::RunArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

const READY: &str = "Ready";

const ENV_VARS: &[&str] = &[
    hookwire_transport::DEFAULT_SOCKET_VAR,
    "HOOKWIRE_SOCKET_VAR",
    "HOOKWIRE_MAX_FRAME_SIZE",
    "HOOKWIRE_TIMEOUT",
];

#[derive(Serialize)]
struct PeerInfo {
    uid: u32,
    gid: u32,
    pid: u32,
}

#[derive(Serialize)]
struct SocketInfo {
    var: String,
    value: Option<String>,
    /// `Ready`, or the classified acquisition failure.
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fd: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    peer: Option<PeerInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct SessionInfo {
    max_frame_size: usize,
    read_timeout_ms: Option<u64>,
    write_timeout_ms: Option<u64>,
    handshake_required: bool,
    acknowledge_handshake: bool,
    termination_event: Option<String>,
}

#[derive(Serialize)]
struct EnvInfoOutput {
    version: String,
    target: String,
    os: String,
    arch: String,
    socket: SocketInfo,
    session: SessionInfo,
    environment: BTreeMap<String, Option<String>>,
}

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let config = hook_config(&args)?;

    let output = EnvInfoOutput {
        version: env!("CARGO_PKG_VERSION").to_string(),
        target: option_env!("HOOKWIRE_BUILD_TARGET")
            .unwrap_or("unknown")
            .to_string(),
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        socket: inspect_socket(&config.socket_var),
        session: session_info(&config),
        environment: ENV_VARS
            .iter()
            .map(|name| (name.to_string(), std::env::var(name).ok()))
            .collect(),
    };

    print_envinfo(&output, format);
    Ok(SUCCESS)
}

/// Acquire and immediately release the hook socket named by `var`.
fn inspect_socket(var: &str) -> SocketInfo {
    let value = std::env::var_os(var).map(|v| v.to_string_lossy().into_owned());
    match acquire_from_process(var) {
        Ok(handle) => describe_handle(var, value, handle),
        Err(err) => SocketInfo {
            var: var.to_string(),
            value,
            status: err.kind(),
            fd: None,
            peer: None,
            error: Some(err.to_string()),
        },
    }
}

fn describe_handle(var: &str, value: Option<String>, handle: ChannelHandle) -> SocketInfo {
    let peer = handle
        .peer_credentials()
        .map(|(uid, gid, pid)| PeerInfo { uid, gid, pid });
    SocketInfo {
        var: var.to_string(),
        value,
        status: READY,
        fd: handle.source_fd().or(handle.raw_fd()),
        peer,
        error: None,
    }
}

fn session_info(config: &HookConfig) -> SessionInfo {
    let millis = |d: Option<Duration>| d.map(|d| d.as_millis() as u64);
    SessionInfo {
        max_frame_size: config.frame.max_frame_size,
        read_timeout_ms: millis(config.frame.read_timeout),
        write_timeout_ms: millis(config.frame.write_timeout),
        handshake_required: config.session.handshake.required,
        acknowledge_handshake: config.session.handshake.acknowledge,
        termination_event: config.session.termination_event.clone(),
    }
}

fn print_envinfo(output: &EnvInfoOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table => println!("{}", envinfo_table(output)),
        OutputFormat::Pretty => {
            let socket = &output.socket;
            println!("hookwire {} ({})\n", output.version, output.target);
            println!(
                "  Socket:     {}={} -> {}",
                socket.var,
                socket.value.as_deref().unwrap_or("(not set)"),
                socket.status
            );
            if let Some(peer) = &socket.peer {
                println!(
                    "  Peer:       pid {} uid {} gid {}",
                    peer.pid, peer.uid, peer.gid
                );
            }
            if let Some(error) = &socket.error {
                println!("  Error:      {error}");
            }
            println!("  Max frame:  {} bytes", output.session.max_frame_size);
            println!(
                "  Timeout:    {}",
                output
                    .session
                    .read_timeout_ms
                    .map(|ms| format!("{ms}ms"))
                    .unwrap_or_else(|| "none".to_string())
            );
            println!("\n  Environment:");
            for (k, v) in &output.environment {
                println!("    {:<24} {}", k, v.as_deref().unwrap_or("(not set)"));
            }
        }
        OutputFormat::Raw => println!("{}", output.socket.status),
    }
}

fn envinfo_table(output: &EnvInfoOutput) -> Table {
    let socket = &output.socket;
    let session = &output.session;
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["FIELD", "VALUE"])
        .add_row(vec!["version".to_string(), output.version.clone()])
        .add_row(vec!["target".to_string(), output.target.clone()])
        .add_row(vec!["socket_var".to_string(), socket.var.clone()])
        .add_row(vec![
            "socket_value".to_string(),
            socket.value.clone().unwrap_or_default(),
        ])
        .add_row(vec!["socket_status".to_string(), socket.status.to_string()])
        .add_row(vec![
            "max_frame_size".to_string(),
            session.max_frame_size.to_string(),
        ])
        .add_row(vec![
            "termination_event".to_string(),
            session.termination_event.clone().unwrap_or_default(),
        ]);
    if let Some(peer) = &socket.peer {
        table.add_row(vec!["peer_pid".to_string(), peer.pid.to_string()]);
    }
    if let Some(error) = &socket.error {
        table.add_row(vec!["socket_error".to_string(), error.clone()]);
    }
    table
}
