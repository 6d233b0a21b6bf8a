use std::collections::HashMap;
use std::sync::Arc;

use hubwire_frame::feedback::{
    BUFFER_EMPTY_COMMAND_COMPLETED, BUFFER_EMPTY_COMMAND_IN_PROGRESS, CURRENT_COMMAND_DISCARDED,
    IDLE,
};
use hubwire_frame::port_output::start_speed;
use hubwire_frame::{
    dissect, frame_message, MessageType, MotorProfile, PortCommandOptions, RawMessage,
};
use hubwire_messenger::{MessengerConfig, OutboundMessenger, PortCommandExecutionStatus};
use hubwire_transport::MemoryTransport;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cmd::SimulateArgs;
use crate::exit::{
    frame_error, messenger_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS, USAGE,
};
use crate::output::{print_json, print_rows, OutputFormat};

#[derive(Serialize)]
struct CommandRecord {
    port: u8,
    command: u8,
    speed: i8,
    statuses: Vec<PortCommandExecutionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    if args.ports.is_empty() {
        return Err(CliError::new(USAGE, "at least one --port is required"));
    }
    let config = match &args.config {
        Some(path) => MessengerConfig::from_json_file(path)
            .map_err(|err| messenger_error("config", err))?,
        None => MessengerConfig::default(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime: {err}")))?;
    let records = runtime.block_on(simulate(&args, config))?;

    print_records(&records, format);
    if records.iter().any(|record| record.error.is_some()) {
        Ok(FAILURE)
    } else {
        Ok(SUCCESS)
    }
}

async fn simulate(args: &SimulateArgs, config: MessengerConfig) -> CliResult<Vec<CommandRecord>> {
    let transport = Arc::new(MemoryTransport::new());
    let messenger = OutboundMessenger::for_transport(transport.clone(), config)
        .map_err(|err| messenger_error("messenger", err))?;
    let hub = spawn_hub(&transport, args.discard_first);

    let mut pending = Vec::new();
    for &port in &args.ports {
        for command in 0..args.commands {
            let speed = ((i16::from(command) + 1) * 10).min(100) as i8;
            let message = start_speed(
                port,
                speed,
                100,
                MotorProfile::DontUseProfiles,
                PortCommandOptions::default(),
            )
            .map_err(|err| frame_error("command", err))?;
            let mut result = messenger.send_port_output_command(message);
            result.start();
            pending.push((port, command, speed, result));
        }
    }

    let mut records = Vec::with_capacity(pending.len());
    for (port, command, speed, mut result) in pending {
        let mut statuses = Vec::new();
        let mut error = None;
        while let Some(item) = result.next().await {
            match item {
                Ok(status) => statuses.push(status),
                Err(err) => {
                    error = Some(err.to_string());
                    break;
                }
            }
        }
        info!(port, command, ?statuses, ?error, "command settled");
        records.push(CommandRecord {
            port,
            command,
            speed,
            statuses,
            error,
        });
    }

    messenger.dispose();
    hub.abort();
    Ok(records)
}

/// Answer port output commands with feedback, the way a hub with an empty
/// buffer does.
fn spawn_hub(transport: &Arc<MemoryTransport>, discard_first: bool) -> JoinHandle<()> {
    let hub = Arc::clone(transport);
    let mut written = hub.subscribe_writes();
    tokio::spawn(async move {
        let mut seen: HashMap<u8, usize> = HashMap::new();
        loop {
            let packet = match written.recv().await {
                Ok(packet) => packet,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            let Ok(message) = dissect(packet) else {
                continue;
            };
            if message.message_type() != MessageType::PortOutputCommand {
                continue;
            }
            let Some(&port) = message.payload.first() else {
                continue;
            };

            let count = seen.entry(port).or_insert(0);
            *count += 1;
            let replies: &[u8] = if discard_first && *count == 1 {
                &[CURRENT_COMMAND_DISCARDED]
            } else {
                &[
                    BUFFER_EMPTY_COMMAND_IN_PROGRESS,
                    BUFFER_EMPTY_COMMAND_COMPLETED | IDLE,
                ]
            };
            for &bits in replies {
                let feedback = RawMessage::new(MessageType::PortOutputCommandFeedback, vec![port, bits]);
                if let Ok(packet) = frame_message(&feedback) {
                    debug!(port, bits, "hub feedback");
                    hub.notify(packet);
                }
            }
        }
    })
}

fn status_line(record: &CommandRecord) -> String {
    let statuses = record
        .statuses
        .iter()
        .map(|status| status.name())
        .collect::<Vec<_>>()
        .join(" -> ");
    match &record.error {
        Some(err) if statuses.is_empty() => format!("error: {err}"),
        Some(err) => format!("{statuses} -> error: {err}"),
        None => statuses,
    }
}

fn print_records(records: &[CommandRecord], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&records),
        OutputFormat::Table => print_rows(
            vec!["PORT", "COMMAND", "SPEED", "RESULT"],
            records
                .iter()
                .map(|record| {
                    vec![
                        record.port.to_string(),
                        record.command.to_string(),
                        record.speed.to_string(),
                        status_line(record),
                    ]
                })
                .collect(),
        ),
        OutputFormat::Pretty => {
            for record in records {
                println!(
                    "port {} command {} (speed {}): {}",
                    record.port,
                    record.command,
                    record.speed,
                    status_line(record)
                );
            }
        }
    }
}
