//! ---
//! rcc_section: "01-core-functionality"
//! rcc_subsection: "binary"
//! rcc_type: "source"
//! rcc_scope: "code"
//! rcc_description: "Binary entrypoint for the refrigeration controller daemon."
//! rcc_version: "v0.1.0"
//! rcc_owner: "tbd"
//! ---
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rcc_common::{init_tracing, AppConfig};
use rcc_core::{load_setpoints, save_setpoints, ColdRoomRuntime, OperatorSignal, StatusBoard};
use rcc_sck::text::frame_to_hex_line;
use rcc_sck::{decode_frame, encode, format_hex_line, CommandId, Frame, STX};
use rcc_transport::MockUart;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = "configs/rccd.dev.toml";

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Walk-in refrigeration controller daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the control loop with an interactive UART console on stdin")]
    Run,
    #[command(about = "Drive a short scripted session against mock UARTs and print the traffic")]
    Demo {
        #[arg(long, default_value_t = 5, help = "Control ticks to simulate")]
        ticks: u32,
    },
    #[command(about = "Encode an SCK frame and print it as a hex line")]
    Frame {
        #[arg(long, value_parser = parse_command_id, help = "Command id, e.g. 0x0001 or set-config")]
        command: u16,
        #[arg(long, default_value_t = 0, help = "Transaction id")]
        tid: u8,
        #[arg(long, help = "Mark the frame as a status reply instead of a command")]
        status: bool,
        #[arg(default_value = "", help = "Payload text, e.g. target_temp_c=3.0")]
        payload: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Frame {
        command,
        tid,
        status,
        payload,
    }) = &cli.command
    {
        return print_frame(*command, *tid, *status, payload);
    }

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from(DEFAULT_CONFIG));
    let loaded = AppConfig::load_or_default(&candidates)?;
    let config = loaded.config;
    init_tracing("rccd", &config.logging)?;
    match &loaded.source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found; using defaults"),
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config).await,
        Commands::Demo { ticks } => run_demo(config, ticks),
        Commands::Frame { .. } => Ok(()),
    }
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    let monitor = MockUart::new("monitor");
    let io = MockUart::new("io");
    let mut runtime = ColdRoomRuntime::new(&config, monitor.clone(), io.clone())
        .context("configured setpoints are invalid")?;

    if config.persistence.enabled {
        match load_setpoints(&config.persistence.path) {
            Ok(Some(saved)) => {
                runtime.restore_setpoints(saved)?;
                info!(path = %config.persistence.path.display(), "setpoints restored");
            }
            Ok(None) => info!("no persisted setpoints; using configured values"),
            Err(err) => warn!(error = %err, "ignoring unreadable setpoint file"),
        }
    }

    let (signal_tx, signal_rx) = mpsc::channel(8);
    let console = tokio::spawn(console_loop(
        spawn_stdin_reader()?,
        monitor.clone(),
        io.clone(),
        runtime.status_board(),
        signal_tx.clone(),
    ));
    let printer = tokio::spawn(print_traffic(monitor, io, config.runtime.poll_interval));
    let ctrl_c = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received; shutting down");
            let _ = signal_tx.send(OperatorSignal::Shutdown).await;
        }
    });

    info!("daemon running; type `help` for console commands");
    runtime.run(signal_rx).await?;

    console.abort();
    printer.abort();
    ctrl_c.abort();

    if config.persistence.enabled {
        save_setpoints(&runtime.config(), &config.persistence.path)
            .with_context(|| format!("failed to save setpoints to {}", config.persistence.path.display()))?;
        info!(path = %config.persistence.path.display(), "setpoints saved");
    }
    Ok(())
}

/// Read stdin on a plain thread. A blocked read there never holds up runtime
/// shutdown; the thread ends with the process.
fn spawn_stdin_reader() -> Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::Builder::new()
        .name("rccd-console".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!(error = %err, "console read failed");
                        break;
                    }
                };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        })
        .context("failed to start console reader")?;
    Ok(rx)
}

async fn console_loop(
    mut lines: mpsc::Receiver<String>,
    monitor: MockUart,
    io: MockUart,
    status: StatusBoard,
    signals: mpsc::Sender<OperatorSignal>,
) {
    while let Some(line) = lines.recv().await {
        let line = line.trim();
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        match verb {
            "" => {}
            "monitor" => monitor.inject_line(rest),
            "io" => io.inject_line(rest),
            "status" => println!("{}", status.latest()),
            "ack" => {
                if signals.send(OperatorSignal::AcknowledgeFault).await.is_err() {
                    break;
                }
            }
            "quit" | "exit" => break,
            "help" => print_console_help(),
            other => println!("unknown console command `{other}`; type `help`"),
        }
    }
    let _ = signals.send(OperatorSignal::Shutdown).await;
}

fn print_console_help() {
    println!("monitor <line>   send a line to the monitor UART (e.g. `monitor GET STATUS`)");
    println!("io <line>        send a line to the IO mimic UART (e.g. `io SET_SENSOR air_temp_c=7.5`)");
    println!("status           print the latest published status");
    println!("ack              acknowledge a latched fault");
    println!("quit             stop the controller");
}

async fn print_traffic(monitor: MockUart, io: MockUart, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        for (name, uart) in [("monitor", &monitor), ("io", &io)] {
            for line in render_tx(&uart.drain_tx()) {
                println!("[{name}] {line}");
            }
        }
    }
}

/// Split transmitted bytes into printable lines; binary frames become hex lines.
fn render_tx(bytes: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut rest = bytes;
    while !rest.is_empty() {
        if rest[0] == STX {
            match decode_frame(rest) {
                Ok((_, used)) => {
                    lines.push(format_hex_line(&rest[..used]));
                    rest = &rest[used..];
                }
                Err(_) => {
                    lines.push(format_hex_line(rest));
                    break;
                }
            }
            continue;
        }
        let end = rest
            .iter()
            .position(|&b| b == b'\n' || b == STX)
            .unwrap_or(rest.len());
        let text = String::from_utf8_lossy(&rest[..end]);
        let text = text.trim();
        if !text.is_empty() {
            lines.push(text.to_string());
        }
        rest = if end < rest.len() && rest[end] == b'\n' {
            &rest[end + 1..]
        } else {
            &rest[end..]
        };
    }
    lines
}

fn run_demo(config: AppConfig, ticks: u32) -> Result<()> {
    let monitor = MockUart::new("monitor");
    let io = MockUart::new("io");
    let mut runtime = ColdRoomRuntime::new(&config, monitor.clone(), io.clone())
        .context("configured setpoints are invalid")?;
    let tick = config.runtime.tick_interval;

    monitor.inject_line("GET CONFIG");
    let set_config = Frame::new_command(1, CommandId::SetConfig, "target_temp_c=3.5");
    monitor.inject_rx(&encode(&set_config)?);
    io.inject_line("SET_SENSOR air_temp_c=9.0");
    for _ in 0..ticks {
        runtime.tick(tick);
    }
    monitor.inject_line("GET STATUS");
    io.inject_line("GET IO");
    runtime.service_channels();

    for (name, uart) in [("monitor", &monitor), ("io", &io)] {
        for line in render_tx(&uart.drain_tx()) {
            println!("[{name}] {line}");
        }
    }
    println!("final status: {}", runtime.status());
    Ok(())
}

fn print_frame(command: u16, tid: u8, status: bool, payload: &str) -> Result<()> {
    let frame = if status {
        Frame::new_status(tid, command, payload)
    } else {
        Frame::new_command(tid, command, payload)
    };
    println!("{}", frame_to_hex_line(&frame)?);
    Ok(())
}

fn parse_command_id(raw: &str) -> Result<u16, String> {
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        return u16::from_str_radix(hex, 16).map_err(|err| err.to_string());
    }
    let named = match raw {
        "set-config" => CommandId::SetConfig,
        "get-config" => CommandId::GetConfig,
        "get-status" => CommandId::GetStatus,
        "set-sensor" => CommandId::SetSensor,
        "set-input" => CommandId::SetInput,
        "get-io" => CommandId::GetIo,
        other => {
            return other
                .parse::<u16>()
                .map_err(|_| format!("unknown command `{other}`"))
        }
    };
    Ok(named.code())
}
