use bytes::Bytes;

use crate::codec::InboundMessage;
use crate::error::{FrameError, Result};
use crate::message::RawMessage;
use crate::message_type::MessageType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HubProperty {
    AdvertisingName = 0x01,
    Button = 0x02,
    FirmwareVersion = 0x03,
    HardwareVersion = 0x04,
    Rssi = 0x05,
    BatteryVoltage = 0x06,
    BatteryType = 0x07,
    ManufacturerName = 0x08,
    RadioFirmwareVersion = 0x09,
    WirelessProtocolVersion = 0x0A,
    SystemTypeId = 0x0B,
    HardwareNetworkId = 0x0C,
    PrimaryMacAddress = 0x0D,
    SecondaryMacAddress = 0x0E,
    HardwareNetworkFamily = 0x0F,
}

impl HubProperty {
    pub fn from_u8(value: u8) -> Option<Self> {
        let property = match value {
            0x01 => Self::AdvertisingName,
            0x02 => Self::Button,
            0x03 => Self::FirmwareVersion,
            0x04 => Self::HardwareVersion,
            0x05 => Self::Rssi,
            0x06 => Self::BatteryVoltage,
            0x07 => Self::BatteryType,
            0x08 => Self::ManufacturerName,
            0x09 => Self::RadioFirmwareVersion,
            0x0A => Self::WirelessProtocolVersion,
            0x0B => Self::SystemTypeId,
            0x0C => Self::HardwareNetworkId,
            0x0D => Self::PrimaryMacAddress,
            0x0E => Self::SecondaryMacAddress,
            0x0F => Self::HardwareNetworkFamily,
            _ => return None,
        };
        Some(property)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HubPropertyOperation {
    Set = 0x01,
    EnableUpdates = 0x02,
    DisableUpdates = 0x03,
    Reset = 0x04,
    RequestUpdate = 0x05,
    Update = 0x06,
}

/// Build a one-shot property read request.
pub fn request_update(property: HubProperty) -> RawMessage {
    RawMessage::new(
        MessageType::HubProperties,
        vec![property as u8, HubPropertyOperation::RequestUpdate as u8],
    )
}

/// Typed value of a property reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubPropertyValue {
    Name(String),
    Button(bool),
    Rssi(i8),
    Percent(u8),
    Raw(Bytes),
}

/// A hub property update sent by the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubPropertyReply {
    pub property: HubProperty,
    pub value: Bytes,
}

impl HubPropertyReply {
    /// Parse the `[property, 0x06, value…]` payload.
    pub fn parse(message: &InboundMessage) -> Result<Self> {
        if message.message_type() != MessageType::HubProperties {
            return Err(FrameError::UnexpectedMessageType {
                expected: MessageType::HubProperties,
                actual: message.message_type(),
            });
        }

        let payload = &message.payload;
        if payload.len() < 2 {
            return Err(FrameError::Truncated {
                needed: 2,
                actual: payload.len(),
            });
        }
        if payload[1] != HubPropertyOperation::Update as u8 {
            return Err(FrameError::InvalidPayload(format!(
                "hub property operation 0x{:02x} is not an update",
                payload[1]
            )));
        }
        let property = HubProperty::from_u8(payload[0]).ok_or_else(|| {
            FrameError::InvalidPayload(format!("unknown hub property 0x{:02x}", payload[0]))
        })?;

        Ok(Self {
            property,
            value: payload.slice(2..),
        })
    }

    /// Interpret the value according to its property.
    pub fn decode(&self) -> HubPropertyValue {
        match (self.property, self.value.first()) {
            (HubProperty::AdvertisingName | HubProperty::ManufacturerName, _) => {
                HubPropertyValue::Name(String::from_utf8_lossy(&self.value).into_owned())
            }
            (HubProperty::Button, Some(&state)) => HubPropertyValue::Button(state != 0),
            (HubProperty::Rssi, Some(&rssi)) => HubPropertyValue::Rssi(rssi as i8),
            (HubProperty::BatteryVoltage, Some(&percent)) => HubPropertyValue::Percent(percent),
            _ => HubPropertyValue::Raw(self.value.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{dissect, frame_message};

    #[test]
    fn request_layout() {
        let packet = frame_message(&request_update(HubProperty::BatteryVoltage)).unwrap();
        assert_eq!(packet.as_ref(), &[0x03, 0x00, 0x01, 0x06, 0x05]);
    }

    #[test]
    fn parses_battery_reply() {
        let inbound = dissect(Bytes::from_static(&[0x04, 0x00, 0x01, 0x06, 0x06, 0x5A])).unwrap();
        let reply = HubPropertyReply::parse(&inbound).unwrap();
        assert_eq!(reply.property, HubProperty::BatteryVoltage);
        assert_eq!(reply.decode(), HubPropertyValue::Percent(90));
    }

    #[test]
    fn parses_name_reply() {
        let inbound = dissect(Bytes::from_static(&[
            0x06, 0x00, 0x01, 0x01, 0x06, b'H', b'u', b'b',
        ]))
        .unwrap();
        let reply = HubPropertyReply::parse(&inbound).unwrap();
        assert_eq!(reply.decode(), HubPropertyValue::Name("Hub".to_string()));
    }

    #[test]
    fn negative_rssi() {
        let inbound = dissect(Bytes::from_static(&[0x04, 0x00, 0x01, 0x05, 0x06, 0xC4])).unwrap();
        let reply = HubPropertyReply::parse(&inbound).unwrap();
        assert_eq!(reply.decode(), HubPropertyValue::Rssi(-60));
    }

    #[test]
    fn non_update_operation_rejected() {
        let inbound = dissect(Bytes::from_static(&[0x03, 0x00, 0x01, 0x06, 0x05])).unwrap();
        assert!(matches!(
            HubPropertyReply::parse(&inbound),
            Err(FrameError::InvalidPayload(_))
        ));
    }
}
