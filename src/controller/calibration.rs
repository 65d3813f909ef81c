//! # Calibration / Identity Store
//!
//! An immutable image standing in for the controller's SPI flash. The console
//! reads factory data (serial, IMU calibration, stick calibration, colors) and
//! user calibration overrides from it during the handshake.
//!
//! ## Banks
//!
//! | Bank | Contents |
//! |------|----------|
//! | 0x6000 | Factory: serial, device type, IMU and stick calibration, colors |
//! | 0x8000 | User: stick and motion calibration overrides |
//!
//! A read is served from the bank containing the address; unknown banks read
//! as `0xFF`.
//!
//! ## Stick calibration
//!
//! Each stick stores three 3-byte pairs of packed 12-bit values. The left
//! stick is ordered (above-center, center, below-center), the right stick
//! (center, below-center, above-center). The engine clamps report axes to
//! `center - below ..= center + above`.

use serde::Deserialize;

/// Bytes per flash bank
pub const BANK_SIZE: usize = 0x100;

/// Factory configuration bank
pub const FACTORY_BANK_ADDRESS: u32 = 0x6000;

/// User calibration bank
pub const USER_BANK_ADDRESS: u32 = 0x8000;

/// Fill returned for addresses with no backing data
pub const UNMAPPED_FILL: u8 = 0xFF;

/// Device type stored at factory offset 0x12 (Pro Controller)
pub const CONTROLLER_TYPE_PRO: u8 = 0x03;

const LEFT_STICK_OFFSET: usize = 0x3D;
const RIGHT_STICK_OFFSET: usize = 0x46;
const BODY_COLOR_OFFSET: usize = 0x50;
const BUTTON_COLOR_OFFSET: usize = 0x53;
const LEFT_GRIP_COLOR_OFFSET: usize = 0x56;
const RIGHT_GRIP_COLOR_OFFSET: usize = 0x59;

/// Factory bank contents up to the end of the stick parameters. The rest of
/// the bank is zero.
const FACTORY_DATA: [u8; 0xB0] = [
    // 0x00: serial number (unset)
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    // 0x10
    0xFF, 0xFF,
    // 0x12: device type, unknown
    CONTROLLER_TYPE_PRO, 0xA0,
    // 0x14
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    // 0x1B: color options
    0x02,
    // 0x1C
    0xFF, 0xFF, 0xFF, 0xFF,
    // 0x20: IMU factory calibration
    0xE3, 0xFF, 0x39, 0xFF, 0xED, 0x01, 0x00, 0x40,
    0x00, 0x40, 0x00, 0x40, 0x09, 0x00, 0xEA, 0xFF,
    0xA1, 0xFF, 0x3B, 0x34, 0x3B, 0x34, 0x3B, 0x34,
    // 0x38
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    // 0x3D: left stick (above, center, below)
    0xA4, 0x46, 0x6A, 0x00, 0x08, 0x80, 0xA4, 0x46, 0x6A,
    // 0x46: right stick (center, below, above)
    0x00, 0x08, 0x80, 0xA4, 0x46, 0x6A, 0xA4, 0x46, 0x6A,
    // 0x4F
    0xFF,
    // 0x50: body, buttons, left grip, right grip
    0x1B, 0x1B, 0x1D,
    0xFF, 0xFF, 0xFF,
    0xEC, 0x00, 0x8C,
    0xEC, 0x00, 0x8C,
    // 0x5C
    0x01,
    // 0x5D
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF,
    // 0x80: six-axis horizontal offsets
    0x50, 0xFD, 0x00, 0x00, 0xC6, 0x0F,
    // 0x86: left stick parameters
    0x0F, 0x30, 0x61, 0xAE, 0x90, 0xD9, 0xD4, 0x14,
    0x54, 0x41, 0x15, 0x54, 0xC7, 0x79, 0x9C, 0x33,
    0x36, 0x63,
    // 0x98: right stick parameters
    0x0F, 0x30, 0x61, 0xAE, 0x90, 0xD9, 0xD4, 0x14,
    0x54, 0x41, 0x15, 0x54, 0xC7, 0x79, 0x9C, 0x33,
    0x36, 0x63,
    // 0xAA
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];

/// User bank contents; the rest of the bank is zero.
const USER_DATA: [u8; 0x3F] = [
    // 0x00
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    // 0x10: left stick (magic + calibration)
    0xB2, 0xA1, 0xA4, 0x46, 0x6A, 0x00, 0x08, 0x80,
    0xA4, 0x46, 0x6A,
    // 0x1B: right stick (magic + calibration)
    0xB2, 0xA1, 0x00, 0x08, 0x80, 0xA4, 0x46, 0x6A,
    0xA4, 0x46, 0x6A,
    // 0x26: motion (unset)
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    // 0x36
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00,
];

const fn bank_image<const N: usize>(data: &[u8; N]) -> [u8; BANK_SIZE] {
    let mut image = [0u8; BANK_SIZE];
    let mut i = 0;

    while i < N && i < BANK_SIZE {
        image[i] = data[i];
        i += 1;
    }

    image
}

/// An RGB color as stored in flash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Rgb(pub [u8; 3]);

impl TryFrom<String> for Rgb {
    type Error = String;

    /// Parse `RRGGBB` (an optional leading `#` is accepted)
    fn try_from(value: String) -> Result<Self, Self::Error> {
        let hex = value.trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("color must be a 6-digit hex value like FF8800, got '{}'", value));
        }

        let mut rgb = [0u8; 3];
        for (i, component) in rgb.iter_mut().enumerate() {
            *component = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|e| format!("invalid color '{}': {}", value, e))?;
        }
        Ok(Rgb(rgb))
    }
}

/// Colors reported to the console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerColors {
    pub body: Rgb,
    pub buttons: Rgb,
    pub left_grip: Rgb,
    pub right_grip: Rgb,
}

impl Default for ControllerColors {
    fn default() -> Self {
        Self {
            body: Rgb([0x1B, 0x1B, 0x1D]),
            buttons: Rgb([0xFF, 0xFF, 0xFF]),
            left_grip: Rgb([0x00, 0x89, 0xEB]),
            right_grip: Rgb([0x00, 0x89, 0xEB]),
        }
    }
}

/// Unpack two 12-bit values from a 3-byte group.
///
/// Layout: `[x_lo8] [y_lo4 | x_hi4] [y_hi8]`
pub fn unpack_pair(bytes: &[u8]) -> (u16, u16) {
    let x = ((bytes[1] as u16 & 0x0F) << 8) | bytes[0] as u16;
    let y = ((bytes[2] as u16) << 4) | (bytes[1] as u16 >> 4);
    (x, y)
}

/// Usable 12-bit range of one stick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StickRange {
    pub min: (u16, u16),
    pub center: (u16, u16),
    pub max: (u16, u16),
}

impl StickRange {
    const AXIS_MAX: u16 = 0x0FFF;

    fn from_parts(center: (u16, u16), below: (u16, u16), above: (u16, u16)) -> Self {
        Self {
            min: (center.0.saturating_sub(below.0), center.1.saturating_sub(below.1)),
            center,
            max: (
                (center.0 + above.0).min(Self::AXIS_MAX),
                (center.1 + above.1).min(Self::AXIS_MAX),
            ),
        }
    }

    /// Left stick calibration: above, center, below
    pub fn from_left(cal: &[u8]) -> Self {
        let above = unpack_pair(&cal[0..3]);
        let center = unpack_pair(&cal[3..6]);
        let below = unpack_pair(&cal[6..9]);
        Self::from_parts(center, below, above)
    }

    /// Right stick calibration: center, below, above
    pub fn from_right(cal: &[u8]) -> Self {
        let center = unpack_pair(&cal[0..3]);
        let below = unpack_pair(&cal[3..6]);
        let above = unpack_pair(&cal[6..9]);
        Self::from_parts(center, below, above)
    }

    #[inline]
    pub fn clamp_x(&self, x: u16) -> u16 {
        x.clamp(self.min.0, self.max.0)
    }

    #[inline]
    pub fn clamp_y(&self, y: u16) -> u16 {
        y.clamp(self.min.1, self.max.1)
    }
}

/// A registered flash bank
#[derive(Debug, Clone)]
struct FlashBank {
    address: u32,
    data: [u8; BANK_SIZE],
}

/// Immutable flash image plus stick ranges derived from it
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    banks: [FlashBank; 2],
    left: StickRange,
    right: StickRange,
}

impl Default for CalibrationStore {
    fn default() -> Self {
        Self::new(&ControllerColors::default())
    }
}

impl CalibrationStore {
    /// Build the image, injecting `colors` into the factory bank
    pub fn new(colors: &ControllerColors) -> Self {
        let mut factory = bank_image(&FACTORY_DATA);
        for (offset, rgb) in [
            (BODY_COLOR_OFFSET, colors.body),
            (BUTTON_COLOR_OFFSET, colors.buttons),
            (LEFT_GRIP_COLOR_OFFSET, colors.left_grip),
            (RIGHT_GRIP_COLOR_OFFSET, colors.right_grip),
        ] {
            factory[offset..offset + 3].copy_from_slice(&rgb.0);
        }

        let left = StickRange::from_left(&factory[LEFT_STICK_OFFSET..LEFT_STICK_OFFSET + 9]);
        let right = StickRange::from_right(&factory[RIGHT_STICK_OFFSET..RIGHT_STICK_OFFSET + 9]);

        Self {
            banks: [
                FlashBank {
                    address: FACTORY_BANK_ADDRESS,
                    data: factory,
                },
                FlashBank {
                    address: USER_BANK_ADDRESS,
                    data: bank_image(&USER_DATA),
                },
            ],
            left,
            right,
        }
    }

    /// Fill `out` with bytes from `bank_address` starting at `offset`.
    ///
    /// Unknown banks, and any bytes past the end of a bank, read as
    /// [`UNMAPPED_FILL`].
    pub fn read(&self, bank_address: u32, offset: u8, out: &mut [u8]) {
        out.fill(UNMAPPED_FILL);

        let Some(bank) = self.banks.iter().find(|bank| bank.address == bank_address) else {
            return;
        };

        let start = offset as usize;
        let available = &bank.data[start..];
        let count = out.len().min(available.len());
        out[..count].copy_from_slice(&available[..count]);
    }

    /// Read using a flat flash address (bank in the upper bits, offset in the low byte)
    pub fn read_address(&self, address: u32, out: &mut [u8]) {
        self.read(address & !0xFF, (address & 0xFF) as u8, out);
    }

    /// Left stick range
    pub fn left_stick(&self) -> StickRange {
        self.left
    }

    /// Right stick range
    pub fn right_stick(&self) -> StickRange {
        self.right
    }
}
