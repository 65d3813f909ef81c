//! Device identity reported during the handshake.

use super::calibration::CONTROLLER_TYPE_PRO;
use rand::Rng;

/// Fixed vendor prefix of the hardware address
pub const MAC_PREFIX: [u8; 3] = [0x7C, 0xBB, 0x8A];

/// Serialized size of [`DeviceIdentity`] in a device-info reply
pub const DEVICE_INFO_SIZE: usize = 12;

/// Firmware version, controller type and hardware address.
///
/// Generated once at startup; constant afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub major_version: u8,
    pub minor_version: u8,
    pub controller_type: u8,
    pub mac_address: [u8; 6],
    /// Non-zero when colors are stored in flash
    pub stored_colors: u8,
}

impl DeviceIdentity {
    /// Identity with a fixed address suffix
    pub fn with_mac_suffix(suffix: [u8; 3]) -> Self {
        Self {
            major_version: 0x04,
            minor_version: 0x91,
            controller_type: CONTROLLER_TYPE_PRO,
            mac_address: [
                MAC_PREFIX[0],
                MAC_PREFIX[1],
                MAC_PREFIX[2],
                suffix[0],
                suffix[1],
                suffix[2],
            ],
            stored_colors: 0x02,
        }
    }

    /// Identity with a random address suffix
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        Self::with_mac_suffix(rng.random())
    }

    /// Device-info reply layout:
    /// `[major, minor, type, 0x02, mac x6, 0x01, stored_colors]`
    pub fn to_bytes(&self) -> [u8; DEVICE_INFO_SIZE] {
        let mut bytes = [0u8; DEVICE_INFO_SIZE];
        bytes[0] = self.major_version;
        bytes[1] = self.minor_version;
        bytes[2] = self.controller_type;
        bytes[3] = 0x02;
        bytes[4..10].copy_from_slice(&self.mac_address);
        bytes[10] = 0x01;
        bytes[11] = self.stored_colors;
        bytes
    }

    /// Hardware address in reverse byte order, as sent in identify replies
    pub fn mac_reversed(&self) -> [u8; 6] {
        let mut mac = self.mac_address;
        mac.reverse();
        mac
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let m = self.mac_address;
        write!(
            f,
            "fw {:02X}.{:02X} type 0x{:02X} mac {:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.major_version, self.minor_version, self.controller_type, m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}
