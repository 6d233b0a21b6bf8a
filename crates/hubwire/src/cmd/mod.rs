use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod dissect;
pub mod feedback;
pub mod frame;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Frame one outbound message.
    Frame(FrameArgs),
    /// Decode one inbound packet.
    Dissect(DissectArgs),
    /// Decode a port output command feedback byte.
    Feedback(FeedbackArgs),
    /// Drive the messenger against a simulated hub.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Frame(args) => frame::run(args, format),
        Command::Dissect(args) => dissect::run(args, format),
        Command::Feedback(args) => feedback::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct FrameArgs {
    /// Message type, by name (e.g. `hub-actions`) or value (e.g. `0x02`).
    #[arg(long = "type", value_name = "TYPE")]
    pub message_type: String,
    /// Payload bytes as hex.
    #[arg(long, default_value = "")]
    pub payload: String,
}

#[derive(Args, Debug)]
pub struct DissectArgs {
    /// Packet bytes as hex, header included.
    pub packet: String,
}

#[derive(Args, Debug)]
pub struct FeedbackArgs {
    /// Feedback byte (`0xNN` or decimal).
    pub byte: String,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Messenger config (JSON). Defaults apply to missing fields.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Port to command; repeat for several ports.
    #[arg(long = "port", value_name = "N", default_values_t = vec![0u8, 1u8])]
    pub ports: Vec<u8>,
    /// Commands sent to each port.
    #[arg(long, default_value = "3")]
    pub commands: u8,
    /// Have the hub discard the first command on every port.
    #[arg(long)]
    pub discard_first: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
