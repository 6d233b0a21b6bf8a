use std::fmt;

/// One-byte message type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MessageType {
    HubProperties = 0x01,
    HubActions = 0x02,
    HubAlerts = 0x03,
    HubAttachedIo = 0x04,
    GenericError = 0x05,
    HwNetworkCommands = 0x08,
    FwUpdateGoIntoBootMode = 0x10,
    FwUpdateLockMemory = 0x11,
    FwUpdateLockStatusRequest = 0x12,
    FwLockStatus = 0x13,
    PortInformationRequest = 0x21,
    PortModeInformationRequest = 0x22,
    PortInputFormatSetupSingle = 0x41,
    PortInputFormatSetupCombined = 0x42,
    PortInformation = 0x43,
    PortModeInformation = 0x44,
    PortValueSingle = 0x45,
    PortValueCombined = 0x46,
    PortInputFormatSingle = 0x47,
    PortInputFormatCombined = 0x48,
    VirtualPortSetup = 0x61,
    PortOutputCommand = 0x81,
    PortOutputCommandFeedback = 0x82,
}

impl MessageType {
    /// Look up a message type by its wire value.
    pub fn from_u8(value: u8) -> Option<Self> {
        let ty = match value {
            0x01 => Self::HubProperties,
            0x02 => Self::HubActions,
            0x03 => Self::HubAlerts,
            0x04 => Self::HubAttachedIo,
            0x05 => Self::GenericError,
            0x08 => Self::HwNetworkCommands,
            0x10 => Self::FwUpdateGoIntoBootMode,
            0x11 => Self::FwUpdateLockMemory,
            0x12 => Self::FwUpdateLockStatusRequest,
            0x13 => Self::FwLockStatus,
            0x21 => Self::PortInformationRequest,
            0x22 => Self::PortModeInformationRequest,
            0x41 => Self::PortInputFormatSetupSingle,
            0x42 => Self::PortInputFormatSetupCombined,
            0x43 => Self::PortInformation,
            0x44 => Self::PortModeInformation,
            0x45 => Self::PortValueSingle,
            0x46 => Self::PortValueCombined,
            0x47 => Self::PortInputFormatSingle,
            0x48 => Self::PortInputFormatCombined,
            0x61 => Self::VirtualPortSetup,
            0x81 => Self::PortOutputCommand,
            0x82 => Self::PortOutputCommandFeedback,
            _ => return None,
        };
        Some(ty)
    }

    /// Look up a message type by its [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|ty| ty.name() == name)
    }

    /// Wire value of this message type.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable name, used in logs and CLI output.
    pub fn name(self) -> &'static str {
        match self {
            Self::HubProperties => "hub-properties",
            Self::HubActions => "hub-actions",
            Self::HubAlerts => "hub-alerts",
            Self::HubAttachedIo => "hub-attached-io",
            Self::GenericError => "generic-error",
            Self::HwNetworkCommands => "hw-network-commands",
            Self::FwUpdateGoIntoBootMode => "fw-update-go-into-boot-mode",
            Self::FwUpdateLockMemory => "fw-update-lock-memory",
            Self::FwUpdateLockStatusRequest => "fw-update-lock-status-request",
            Self::FwLockStatus => "fw-lock-status",
            Self::PortInformationRequest => "port-information-request",
            Self::PortModeInformationRequest => "port-mode-information-request",
            Self::PortInputFormatSetupSingle => "port-input-format-setup-single",
            Self::PortInputFormatSetupCombined => "port-input-format-setup-combined",
            Self::PortInformation => "port-information",
            Self::PortModeInformation => "port-mode-information",
            Self::PortValueSingle => "port-value-single",
            Self::PortValueCombined => "port-value-combined",
            Self::PortInputFormatSingle => "port-input-format-single",
            Self::PortInputFormatCombined => "port-input-format-combined",
            Self::VirtualPortSetup => "virtual-port-setup",
            Self::PortOutputCommand => "port-output-command",
            Self::PortOutputCommandFeedback => "port-output-command-feedback",
        }
    }

    /// Every known message type, in wire-value order.
    pub const ALL: [MessageType; 23] = [
        Self::HubProperties,
        Self::HubActions,
        Self::HubAlerts,
        Self::HubAttachedIo,
        Self::GenericError,
        Self::HwNetworkCommands,
        Self::FwUpdateGoIntoBootMode,
        Self::FwUpdateLockMemory,
        Self::FwUpdateLockStatusRequest,
        Self::FwLockStatus,
        Self::PortInformationRequest,
        Self::PortModeInformationRequest,
        Self::PortInputFormatSetupSingle,
        Self::PortInputFormatSetupCombined,
        Self::PortInformation,
        Self::PortModeInformation,
        Self::PortValueSingle,
        Self::PortValueCombined,
        Self::PortInputFormatSingle,
        Self::PortInputFormatCombined,
        Self::VirtualPortSetup,
        Self::PortOutputCommand,
        Self::PortOutputCommandFeedback,
    ];
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02x})", self.name(), self.as_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_round_trip() {
        for ty in MessageType::ALL {
            assert_eq!(MessageType::from_u8(ty.as_u8()), Some(ty));
        }
    }

    #[test]
    fn unknown_values_rejected() {
        assert_eq!(MessageType::from_u8(0x00), None);
        assert_eq!(MessageType::from_u8(0x83), None);
        assert_eq!(MessageType::from_u8(0xFF), None);
    }

    #[test]
    fn names_resolve() {
        assert_eq!(
            MessageType::from_name("port-output-command"),
            Some(MessageType::PortOutputCommand)
        );
        assert_eq!(MessageType::from_name("nope"), None);
    }

    #[test]
    fn display_includes_hex() {
        assert_eq!(
            MessageType::GenericError.to_string(),
            "generic-error (0x05)"
        );
    }
}
