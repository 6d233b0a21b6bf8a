use bytes::Bytes;
use hubwire_frame::{
    dissect, GenericErrorMessage, InboundMessage, MessageType, PortOutputCommandFeedbackMessage,
};
use serde::Serialize;

use crate::cmd::DissectArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{hex, parse_hex, print_fields, print_json, OutputFormat};

#[derive(Serialize)]
struct DissectOutput {
    message_type: &'static str,
    type_code: u8,
    payload_size: usize,
    payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    decoded: Option<String>,
}

pub fn run(args: DissectArgs, format: OutputFormat) -> CliResult<i32> {
    let packet = parse_hex(&args.packet)?;
    let message = dissect(Bytes::from(packet)).map_err(|err| frame_error("dissect failed", err))?;
    let message_type = message.message_type();

    let out = DissectOutput {
        message_type: message_type.name(),
        type_code: message_type.as_u8(),
        payload_size: message.payload.len(),
        payload: hex(&message.payload),
        decoded: decode(&message)?,
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut rows = vec![
                ("message type", format!("{message_type}")),
                ("payload size", out.payload_size.to_string()),
                ("payload", out.payload.clone()),
            ];
            if let Some(decoded) = &out.decoded {
                rows.push(("decoded", decoded.clone()));
            }
            print_fields(&rows);
        }
        OutputFormat::Pretty => match &out.decoded {
            Some(decoded) => println!("{}: {decoded}", out.message_type),
            None => println!("{}: {}", out.message_type, out.payload),
        },
    }
    Ok(SUCCESS)
}

/// Human summary for the reply kinds the messenger itself consumes.
fn decode(message: &InboundMessage) -> CliResult<Option<String>> {
    let decoded = match message.message_type() {
        MessageType::GenericError => GenericErrorMessage::parse(message)
            .map_err(|err| frame_error("generic error", err))?
            .to_string(),
        MessageType::PortOutputCommandFeedback => {
            let feedback = PortOutputCommandFeedbackMessage::parse(message)
                .map_err(|err| frame_error("feedback", err))?;
            feedback
                .feedbacks
                .iter()
                .map(|entry| {
                    format!(
                        "port {} -> {}",
                        entry.port_id,
                        super::feedback::flag_names(entry.feedback).join("|")
                    )
                })
                .collect::<Vec<_>>()
                .join(", ")
        }
        _ => return Ok(None),
    };
    Ok(Some(decoded))
}
