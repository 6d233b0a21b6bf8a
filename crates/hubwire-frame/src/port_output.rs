use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};
use crate::message::RawPortOutputCommandMessage;

const SUB_COMMAND_START_SPEED: u8 = 0x07;
const SUB_COMMAND_GOTO_ABSOLUTE_POSITION: u8 = 0x0D;
const SUB_COMMAND_WRITE_DIRECT_MODE_DATA: u8 = 0x51;

const MODE_POWER: u8 = 0x00;
const MODE_ENCODER_PRESET: u8 = 0x02;

/// When the hub should start the command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum StartupMode {
    BufferIfNecessary = 0x00,
    #[default]
    ExecuteImmediately = 0x10,
}

/// What the hub should report once the command finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum CompletionMode {
    NoAction = 0x00,
    #[default]
    CommandFeedback = 0x01,
}

/// Startup and completion flags for one command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortCommandOptions {
    pub startup: StartupMode,
    pub completion: CompletionMode,
}

impl PortCommandOptions {
    fn flags(self) -> u8 {
        self.startup as u8 | self.completion as u8
    }

    fn wait_for_feedback(self) -> bool {
        self.completion == CompletionMode::CommandFeedback
    }
}

/// Motor state after a positional command finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum MotorEndState {
    Float = 0x00,
    Hold = 0x7E,
    #[default]
    Brake = 0x7F,
}

/// Acceleration/deceleration profile selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum MotorProfile {
    #[default]
    DontUseProfiles = 0x00,
    AccelerationProfile = 0x01,
    DecelerationProfile = 0x02,
    AccelerationAndDeceleration = 0x03,
}

/// Start the motor at a raw power level (-100..=100).
pub fn start_power(
    port_id: u8,
    power: i8,
    options: PortCommandOptions,
) -> Result<RawPortOutputCommandMessage> {
    check_range("power", power, -100, 100)?;
    let mut payload = header(port_id, options, SUB_COMMAND_WRITE_DIRECT_MODE_DATA);
    payload.put_u8(MODE_POWER);
    payload.put_i8(power);
    Ok(finish(port_id, options, payload))
}

/// Start the motor at a regulated speed (-100..=100).
pub fn start_speed(
    port_id: u8,
    speed: i8,
    max_power: u8,
    profile: MotorProfile,
    options: PortCommandOptions,
) -> Result<RawPortOutputCommandMessage> {
    check_range("speed", speed, -100, 100)?;
    check_range("max power", max_power, 0, 100)?;
    let mut payload = header(port_id, options, SUB_COMMAND_START_SPEED);
    payload.put_i8(speed);
    payload.put_u8(max_power);
    payload.put_u8(profile as u8);
    Ok(finish(port_id, options, payload))
}

/// Rotate to an absolute encoder position (degrees).
pub fn goto_absolute_position(
    port_id: u8,
    position: i32,
    speed: u8,
    max_power: u8,
    end_state: MotorEndState,
    profile: MotorProfile,
    options: PortCommandOptions,
) -> Result<RawPortOutputCommandMessage> {
    check_range("speed", speed, 0, 100)?;
    check_range("max power", max_power, 0, 100)?;
    let mut payload = header(port_id, options, SUB_COMMAND_GOTO_ABSOLUTE_POSITION);
    payload.put_i32_le(position);
    payload.put_u8(speed);
    payload.put_u8(max_power);
    payload.put_u8(end_state as u8);
    payload.put_u8(profile as u8);
    Ok(finish(port_id, options, payload))
}

/// Redefine the current encoder position.
pub fn preset_encoder(
    port_id: u8,
    position: i32,
    options: PortCommandOptions,
) -> RawPortOutputCommandMessage {
    let mut payload = header(port_id, options, SUB_COMMAND_WRITE_DIRECT_MODE_DATA);
    payload.put_u8(MODE_ENCODER_PRESET);
    payload.put_i32_le(position);
    finish(port_id, options, payload)
}

fn header(port_id: u8, options: PortCommandOptions, sub_command: u8) -> BytesMut {
    let mut payload = BytesMut::with_capacity(12);
    payload.put_u8(port_id);
    payload.put_u8(options.flags());
    payload.put_u8(sub_command);
    payload
}

fn finish(
    port_id: u8,
    options: PortCommandOptions,
    payload: BytesMut,
) -> RawPortOutputCommandMessage {
    RawPortOutputCommandMessage::new(port_id, options.wait_for_feedback(), payload.freeze())
}

fn check_range<T: PartialOrd + std::fmt::Display>(
    name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(FrameError::InvalidPayload(format!(
            "{name} {value} out of range {min}..={max}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::frame_message;
    use crate::message_type::MessageType;

    #[test]
    fn start_speed_layout() {
        let cmd = start_speed(
            1,
            -50,
            100,
            MotorProfile::AccelerationAndDeceleration,
            PortCommandOptions::default(),
        )
        .unwrap();

        assert_eq!(cmd.port_id, 1);
        assert!(cmd.wait_for_feedback);
        assert_eq!(cmd.message.message_type, MessageType::PortOutputCommand);
        assert_eq!(
            cmd.message.payload.as_ref(),
            &[0x01, 0x11, 0x07, 0xCE, 0x64, 0x03]
        );
    }

    #[test]
    fn no_action_completion_skips_feedback() {
        let options = PortCommandOptions {
            startup: StartupMode::BufferIfNecessary,
            completion: CompletionMode::NoAction,
        };
        let cmd = start_power(0, 30, options).unwrap();
        assert!(!cmd.wait_for_feedback);
        assert_eq!(cmd.message.payload.as_ref(), &[0x00, 0x00, 0x51, 0x00, 0x1E]);
    }

    #[test]
    fn goto_position_frames() {
        let cmd = goto_absolute_position(
            2,
            -90,
            50,
            80,
            MotorEndState::Hold,
            MotorProfile::DontUseProfiles,
            PortCommandOptions::default(),
        )
        .unwrap();
        let packet = frame_message(&cmd.message).unwrap();
        assert_eq!(
            packet.as_ref(),
            &[
                0x0C, 0x00, 0x81, 0x02, 0x11, 0x0D, 0xA6, 0xFF, 0xFF, 0xFF, 0x32, 0x50, 0x7E,
                0x00
            ]
        );
    }

    #[test]
    fn preset_encoder_layout() {
        let cmd = preset_encoder(3, 360, PortCommandOptions::default());
        assert_eq!(
            cmd.message.payload.as_ref(),
            &[0x03, 0x11, 0x51, 0x02, 0x68, 0x01, 0x00, 0x00]
        );
    }

    #[test]
    fn out_of_range_speed_rejected() {
        let err = start_speed(
            0,
            101,
            100,
            MotorProfile::DontUseProfiles,
            PortCommandOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, FrameError::InvalidPayload(_)));
    }
}
