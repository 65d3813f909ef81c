//! # HID Protocol Constants and Types
//!
//! Report identifiers, configuration sub-commands and feature command ids of
//! the console's vendor sub-protocol.
//!
//! Sources:
//! - https://github.com/dekuNukem/Nintendo_Switch_Reverse_Engineering/blob/master/USB-HID-Notes.md
//! - https://github.com/dekuNukem/Nintendo_Switch_Reverse_Engineering/blob/master/bluetooth_hid_subcommands_notes.md

/// Every report in either direction is one 64-byte block
pub const REPORT_SIZE: usize = 64;

/// A complete report, byte 0 being the report id
pub type Report = [u8; REPORT_SIZE];

/// Console -> device report ids
pub mod output {
    /// Empty report, acknowledged by ignoring it
    pub const NOOP: u8 = 0x00;
    /// Rumble + feature command
    pub const COMMAND: u8 = 0x01;
    /// Rumble only
    pub const RUMBLE: u8 = 0x10;
    /// USB configuration sub-command
    pub const CONFIGURATION: u8 = 0x80;
}

/// Device -> console report ids
pub mod input {
    /// Feature command reply
    pub const COMMAND_REPLY: u8 = 0x21;
    /// Periodic full input report; also used for USB timeout acks
    pub const STANDARD: u8 = 0x30;
    /// USB configuration reply
    pub const CONFIGURATION_REPLY: u8 = 0x81;
}

/// Byte offsets inside console output reports
pub mod offset {
    /// Configuration sub-command in a 0x80 report
    pub const CONFIG_SUBCOMMAND: usize = 1;
    /// Start of the 8 rumble bytes in 0x01/0x10 reports
    pub const RUMBLE: usize = 2;
    /// Feature command id in a 0x01 report
    pub const COMMAND_ID: usize = 10;
    /// First argument byte of a feature command
    pub const COMMAND_ARGS: usize = 11;
}

/// Byte offsets inside command reply reports
pub mod reply {
    /// Copy of the current battery/buttons/sticks block
    pub const INPUTS: usize = 2;
    /// Acknowledgement byte
    pub const ACK: usize = 13;
    /// Echoed command id
    pub const COMMAND_ID: usize = 14;
    /// Reply data
    pub const DATA: usize = 15;
}

/// Configuration sub-commands carried by 0x80 reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConfigCommand {
    Identify = 0x01,
    Handshake = 0x02,
    BaudRate = 0x03,
    DisableUsbTimeout = 0x04,
    EnableUsbTimeout = 0x05,
}

impl TryFrom<u8> for ConfigCommand {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Identify),
            0x02 => Ok(Self::Handshake),
            0x03 => Ok(Self::BaudRate),
            0x04 => Ok(Self::DisableUsbTimeout),
            0x05 => Ok(Self::EnableUsbTimeout),
            other => Err(other),
        }
    }
}

/// Feature command ids carried by 0x01 reports
pub mod command {
    pub const GET_CONTROLLER_STATE: u8 = 0x00;
    pub const BLUETOOTH_PAIR_REQUEST: u8 = 0x01;
    pub const REQUEST_DEVICE_INFO: u8 = 0x02;
    pub const SET_INPUT_MODE: u8 = 0x03;
    pub const TRIGGER_BUTTONS: u8 = 0x04;
    pub const SET_SHIPMENT_MODE: u8 = 0x08;
    pub const SPI_READ: u8 = 0x10;
    pub const SET_NFC_IR_CONFIG: u8 = 0x21;
    pub const SET_NFC_IR_STATE: u8 = 0x22;
    pub const SET_PLAYER_LIGHTS: u8 = 0x30;
    pub const GET_PLAYER_LIGHTS: u8 = 0x31;
    pub const UNKNOWN_33: u8 = 0x33;
    pub const SET_HOME_LIGHT: u8 = 0x38;
    pub const TOGGLE_IMU: u8 = 0x40;
    pub const IMU_SENSITIVITY: u8 = 0x41;
    pub const READ_IMU: u8 = 0x43;
    pub const ENABLE_VIBRATION: u8 = 0x48;
    pub const GET_VOLTAGE: u8 = 0x50;
}

/// Input mode the console starts in (standard full report)
pub const DEFAULT_INPUT_MODE: u8 = 0x30;

/// Battery full (high nibble) + wired connection (low nibble)
pub const BATTERY_CONNECTION: u8 = 0xF8;

/// Vibrator report byte in periodic reports
pub const VIBRATOR_REPORT: u8 = 0x09;
