use crate::mqtt_manager::MqttHandle;
use crate::protocol::Frame;
use crate::types::{DeviceState, Scrollback};
use anyhow::Result;
use log::info;
use std::sync::Arc;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, RwLock};

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Publish a control frame to the device
    Send(Frame),
    /// Print the device snapshot as JSON
    ShowState,
    Help,
    Quit,
}

/// Reads command lines from stdin and turns them into control frames.
/// Bad input never terminates the loop; it lands in the scrollback.
pub async fn run(
    handle: MqttHandle,
    device: Arc<RwLock<DeviceState>>,
    scrollback: Arc<Mutex<Scrollback>>,
) -> Result<()> {
    let mut lines = BufReader::new(stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(None) => {}

            Ok(Some(ConsoleCommand::Send(frame))) => {
                match handle.publish(frame).await {
                    Ok(()) => scrollback.lock().await.info("Message published"),
                    Err(e) => scrollback
                        .lock()
                        .await
                        .error(format!("Failed to queue message: {}", e)),
                }
            }

            Ok(Some(ConsoleCommand::ShowState)) => {
                let state = device.read().await.clone();
                match serde_json::to_string_pretty(&state) {
                    Ok(json) => println!("{}", json),
                    Err(e) => scrollback
                        .lock()
                        .await
                        .error(format!("Failed to render state: {}", e)),
                }
            }

            Ok(Some(ConsoleCommand::Help)) => print_help(),

            Ok(Some(ConsoleCommand::Quit)) => {
                info!("Quit requested from console");
                break;
            }

            Err(msg) => scrollback.lock().await.warning(msg),
        }
    }

    Ok(())
}

/// Parse one console line. `Ok(None)` means the line was blank.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let (keyword, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (trimmed, ""),
    };

    let command = match keyword {
        "report" => ConsoleCommand::Send(Frame::FullReport),

        "filename" => {
            if arg.is_empty() {
                return Err("Usage: filename <name>".to_string());
            }
            ConsoleCommand::Send(Frame::Filename(arg.to_string()))
        }

        "enable" => ConsoleCommand::Send(Frame::Enabled(parse_switch(arg)?)),

        "rate" => {
            let hz: u32 = arg
                .parse()
                .map_err(|_| format!("Invalid sample rate: {:?}", arg))?;
            ConsoleCommand::Send(Frame::SampleRate(hz))
        }

        "sdref" => ConsoleCommand::Send(Frame::SdcardRef(parse_switch(arg)?)),

        "broadcast" => ConsoleCommand::Send(Frame::Broadcast(parse_switch(arg)?)),

        "state" => ConsoleCommand::ShowState,

        "help" => ConsoleCommand::Help,

        "quit" | "exit" => ConsoleCommand::Quit,

        unknown => return Err(format!("Unknown command: {}", unknown)),
    };

    Ok(Some(command))
}

fn parse_switch(arg: &str) -> Result<bool, String> {
    match arg {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(format!("Expected on|off, got {:?}", arg)),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  report            request a full device report");
    println!("  filename <name>   set the log file name");
    println!("  enable on|off     start or stop logging");
    println!("  rate <hz>         set the sample rate");
    println!("  sdref on|off      hold or release the SD card reference");
    println!("  broadcast on|off  toggle periodic status broadcasts");
    println!("  state             print the last reported device state");
    println!("  help              this text");
    println!("  quit              exit");
}
