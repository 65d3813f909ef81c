//! # Feature Commands
//!
//! Table-driven handling of the `0x01` output report. Each entry maps a
//! command id to a handler that writes the acknowledgement and reply data
//! into a `0x21` report. Unknown ids get the generic `80 <id> 03` reply so
//! the console's command loop never stalls.

use super::protocol::{command, input, reply, Report, DEFAULT_INPUT_MODE, REPORT_SIZE};
use crate::controller::calibration::CalibrationStore;
use crate::controller::identity::DeviceIdentity;
use tracing::debug;

/// Largest SPI read that fits after the echoed address and length
pub const MAX_SPI_READ: usize = REPORT_SIZE - SPI_DATA_OFFSET;

const SPI_DATA_OFFSET: usize = reply::DATA + 5;

/// Console-controlled settings changed by feature commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    pub input_mode: u8,
    pub player_lights: u8,
    pub imu_enabled: bool,
    pub vibration_enabled: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            input_mode: DEFAULT_INPUT_MODE,
            player_lights: 0,
            imu_enabled: false,
            vibration_enabled: false,
        }
    }
}

/// Everything a handler may read or change
pub struct CommandContext<'a> {
    pub identity: &'a DeviceIdentity,
    pub store: &'a CalibrationStore,
    pub settings: &'a mut ControllerSettings,
}

/// A `0x21` reply under construction
pub struct Reply {
    report: Report,
}

impl Reply {
    fn new(id: u8) -> Self {
        let mut report = [0u8; REPORT_SIZE];
        report[0] = input::COMMAND_REPLY;
        report[reply::COMMAND_ID] = id;
        Self { report }
    }

    /// Set the acknowledgement byte
    pub fn ack(&mut self, ack: u8) -> &mut Self {
        self.report[reply::ACK] = ack;
        self
    }

    /// Write reply data starting at byte 15
    pub fn data(&mut self, bytes: &[u8]) -> &mut Self {
        self.data_at(0, bytes)
    }

    /// Write reply data at `offset` past byte 15
    pub fn data_at(&mut self, offset: usize, bytes: &[u8]) -> &mut Self {
        let start = reply::DATA + offset;
        self.report[start..start + bytes.len()].copy_from_slice(bytes);
        self
    }

    /// Mutable view of the reply data area
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.report[reply::DATA..]
    }

    pub fn into_report(self) -> Report {
        self.report
    }
}

/// Handler signature: context, command arguments (report bytes 11..), reply
pub type Handler = fn(&mut CommandContext<'_>, &[u8], &mut Reply);

/// One entry of the command table
pub struct CommandEntry {
    pub id: u8,
    pub name: &'static str,
    pub handler: Handler,
}

/// Every recognized feature command
pub static COMMANDS: &[CommandEntry] = &[
    CommandEntry {
        id: command::GET_CONTROLLER_STATE,
        name: "get controller state",
        handler: |_, _, r| {
            r.ack(0x80).data(&[0x03]);
        },
    },
    CommandEntry {
        id: command::BLUETOOTH_PAIR_REQUEST,
        name: "bluetooth pair",
        // Wired: always report an existing pairing
        handler: |_, _, r| {
            r.ack(0x81).data(&[0x03]);
        },
    },
    CommandEntry {
        id: command::REQUEST_DEVICE_INFO,
        name: "device info",
        handler: |ctx, _, r| {
            r.ack(0x82).data(&ctx.identity.to_bytes());
        },
    },
    CommandEntry {
        id: command::SET_INPUT_MODE,
        name: "set input mode",
        handler: |ctx, args, r| {
            ctx.settings.input_mode = args[0];
            r.ack(0x80).data(&[args[0]]);
        },
    },
    CommandEntry {
        id: command::TRIGGER_BUTTONS,
        name: "trigger buttons elapsed",
        handler: |_, _, r| {
            r.ack(0x83);
        },
    },
    CommandEntry {
        id: command::SET_SHIPMENT_MODE,
        name: "set shipment mode",
        handler: |_, _, r| {
            r.ack(0x80);
        },
    },
    CommandEntry {
        id: command::SPI_READ,
        name: "spi read",
        handler: spi_read,
    },
    CommandEntry {
        id: command::SET_NFC_IR_CONFIG,
        name: "set nfc/ir config",
        handler: |_, _, r| {
            r.ack(0x80);
        },
    },
    CommandEntry {
        id: command::SET_NFC_IR_STATE,
        name: "set nfc/ir state",
        handler: |_, _, r| {
            r.ack(0x80);
        },
    },
    CommandEntry {
        id: command::SET_PLAYER_LIGHTS,
        name: "set player lights",
        handler: |ctx, args, r| {
            ctx.settings.player_lights = args[0];
            r.ack(0x80);
        },
    },
    CommandEntry {
        id: command::GET_PLAYER_LIGHTS,
        name: "get player lights",
        handler: |ctx, _, r| {
            r.ack(0xB0).data(&[ctx.settings.player_lights]);
        },
    },
    CommandEntry {
        id: command::UNKNOWN_33,
        name: "unknown 0x33",
        handler: |_, _, r| {
            r.ack(0x80).data(&[0x03]);
        },
    },
    CommandEntry {
        id: command::SET_HOME_LIGHT,
        name: "set home light",
        handler: |_, _, r| {
            r.ack(0x80).data(&[0x00]);
        },
    },
    CommandEntry {
        id: command::TOGGLE_IMU,
        name: "toggle imu",
        handler: |ctx, args, r| {
            ctx.settings.imu_enabled = args[0] != 0;
            r.ack(0x80).data(&[0x00]);
        },
    },
    CommandEntry {
        id: command::IMU_SENSITIVITY,
        name: "imu sensitivity",
        handler: |_, _, r| {
            r.ack(0x80);
        },
    },
    CommandEntry {
        id: command::READ_IMU,
        name: "read imu",
        handler: |_, args, r| {
            r.ack(0xC0).data(&args[..2]);
        },
    },
    CommandEntry {
        id: command::ENABLE_VIBRATION,
        name: "enable vibration",
        handler: |ctx, args, r| {
            ctx.settings.vibration_enabled = args[0] != 0;
            r.ack(0x80).data(&[0x00]);
        },
    },
    CommandEntry {
        id: command::GET_VOLTAGE,
        name: "get voltage",
        handler: |_, _, r| {
            r.ack(0xD0).data(&[0x83, 0x06]);
        },
    },
];

/// `args`: address (LE32), length. Reply echoes both, then the data.
fn spi_read(ctx: &mut CommandContext<'_>, args: &[u8], r: &mut Reply) {
    let address = u32::from_le_bytes([args[0], args[1], args[2], args[3]]);
    let length = args[4];
    let count = (length as usize).min(MAX_SPI_READ);

    r.ack(0x90).data(&args[..5]);
    ctx.store.read_address(address, &mut r.data_mut()[5..5 + count]);
    debug!("SPI read 0x{:04X} len {}", address, length);
}

/// Look up a command by id
pub fn lookup(id: u8) -> Option<&'static CommandEntry> {
    COMMANDS.iter().find(|entry| entry.id == id)
}

/// Run the handler for `id` and return the finished reply.
///
/// `args` must be the full argument area of a 64-byte report (53 bytes).
pub fn dispatch(ctx: &mut CommandContext<'_>, id: u8, args: &[u8]) -> Report {
    let mut r = Reply::new(id);

    match lookup(id) {
        Some(entry) => {
            debug!("Command 0x{:02X} ({})", id, entry.name);
            (entry.handler)(ctx, args, &mut r);
        }
        None => {
            debug!("Unknown command 0x{:02X}", id);
            r.ack(0x80).data(&[0x03]);
        }
    }

    r.into_report()
}
