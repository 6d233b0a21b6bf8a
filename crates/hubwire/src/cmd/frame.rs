use hubwire_frame::{frame_message, MessageType, RawMessage};
use serde::Serialize;

use crate::cmd::FrameArgs;
use crate::exit::{frame_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{hex, parse_byte, parse_hex, print_fields, print_json, OutputFormat};

#[derive(Serialize)]
struct FrameOutput {
    message_type: &'static str,
    type_code: u8,
    length: u8,
    packet: String,
}

pub fn run(args: FrameArgs, format: OutputFormat) -> CliResult<i32> {
    let message_type = parse_message_type(&args.message_type)?;
    let payload = parse_hex(&args.payload)?;
    let message = RawMessage::new(message_type, payload);
    let packet = frame_message(&message).map_err(|err| frame_error("frame failed", err))?;

    let out = FrameOutput {
        message_type: message_type.name(),
        type_code: message_type.as_u8(),
        length: packet[0],
        packet: hex(&packet),
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => print_fields(&[
            ("message type", format!("{message_type}")),
            ("length", out.length.to_string()),
            ("packet", out.packet.clone()),
        ]),
        OutputFormat::Pretty => println!("{}", out.packet),
    }
    Ok(SUCCESS)
}

pub fn parse_message_type(input: &str) -> CliResult<MessageType> {
    let input = input.trim();
    let found = if input.starts_with("0x") || input.starts_with("0X") {
        MessageType::from_u8(parse_byte(input)?)
    } else {
        MessageType::from_name(&input.to_ascii_lowercase())
    };
    found.ok_or_else(|| CliError::new(USAGE, format!("unknown message type: {input}")))
}
