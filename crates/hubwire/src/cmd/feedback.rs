use hubwire_frame::PortOutputCommandFeedback;
use serde::Serialize;

use crate::cmd::FeedbackArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{parse_byte, print_rows, print_json, OutputFormat};

#[derive(Serialize)]
struct FeedbackOutput {
    byte: u8,
    buffer_empty_command_in_progress: bool,
    buffer_empty_command_completed: bool,
    current_command_discarded: bool,
    idle: bool,
    busy_or_full: bool,
    execution_error: bool,
}

pub fn run(args: FeedbackArgs, format: OutputFormat) -> CliResult<i32> {
    let byte = parse_byte(&args.byte)?;
    let flags = PortOutputCommandFeedback::from_byte(byte);

    match format {
        OutputFormat::Json => print_json(&FeedbackOutput {
            byte,
            buffer_empty_command_in_progress: flags.buffer_empty_command_in_progress,
            buffer_empty_command_completed: flags.buffer_empty_command_completed,
            current_command_discarded: flags.current_command_discarded,
            idle: flags.idle,
            busy_or_full: flags.busy_or_full,
            execution_error: flags.execution_error,
        }),
        OutputFormat::Table => print_rows(
            vec!["FLAG", "SET"],
            flag_table(flags)
                .into_iter()
                .map(|(name, set)| vec![name.to_string(), set.to_string()])
                .collect(),
        ),
        OutputFormat::Pretty => println!("0x{byte:02x}: {}", flag_names(flags).join("|")),
    }
    Ok(SUCCESS)
}

fn flag_table(flags: PortOutputCommandFeedback) -> [(&'static str, bool); 6] {
    [
        ("buffer_empty_command_in_progress", flags.buffer_empty_command_in_progress),
        ("buffer_empty_command_completed", flags.buffer_empty_command_completed),
        ("current_command_discarded", flags.current_command_discarded),
        ("idle", flags.idle),
        ("busy_or_full", flags.busy_or_full),
        ("execution_error", flags.execution_error),
    ]
}

/// Names of the set flags, or `none`.
pub fn flag_names(flags: PortOutputCommandFeedback) -> Vec<&'static str> {
    let names: Vec<_> = flag_table(flags)
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect();
    if names.is_empty() {
        vec!["none"]
    } else {
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_bits() {
        let flags = PortOutputCommandFeedback::from_byte(0x0A);
        assert_eq!(flag_names(flags), vec!["buffer_empty_command_completed", "idle"]);
        assert_eq!(flag_names(PortOutputCommandFeedback::from_byte(0)), vec!["none"]);
    }
}
