//! # Controller State
//!
//! The decoded controller state shared between the UART decoder and the HID
//! engine.
//!
//! ## Axes
//!
//! Axes are unsigned 16-bit values with neutral at mid-scale. The host sends
//! 8-bit axes which are widened by bit replication (`v << 8 | v`), so both ends
//! of the range are reachable:
//!
//! | Wire | State |
//! |------|-------|
//! | 0x00 | 0x0000 |
//! | 0x80 | 0x8080 |
//! | 0xFF | 0xFFFF |
//!
//! ## Hat
//!
//! The D-pad arrives as a single hat byte and is stored as four flags. Only
//! the 8 compass directions plus neutral exist; anything else is neutral.

/// Neutral stick position
pub const JOYSTICK_MID: u16 = 0x7FFF;

/// Widen an 8-bit wire axis to the 16-bit state range
///
/// # Examples
///
/// ```
/// use procon_bridge::controller::state::expand_axis;
///
/// assert_eq!(expand_axis(0x00), 0x0000);
/// assert_eq!(expand_axis(0x80), 0x8080);
/// assert_eq!(expand_axis(0xFF), 0xFFFF);
/// ```
#[inline]
pub fn expand_axis(value: u8) -> u16 {
    (value as u16) << 8 | value as u16
}

/// Digital buttons (D-pad excluded)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Buttons {
    pub a: bool,
    pub b: bool,
    pub x: bool,
    pub y: bool,
    pub l: bool,
    pub r: bool,
    pub zl: bool,
    pub zr: bool,
    pub minus: bool,
    pub plus: bool,
    pub l3: bool,
    pub r3: bool,
    pub home: bool,
    pub capture: bool,
}

impl Buttons {
    /// Bit positions of each button in the UART button mask
    pub const A: u16 = 1 << 0;
    pub const B: u16 = 1 << 1;
    pub const X: u16 = 1 << 2;
    pub const Y: u16 = 1 << 3;
    pub const L: u16 = 1 << 4;
    pub const R: u16 = 1 << 5;
    pub const ZL: u16 = 1 << 6;
    pub const ZR: u16 = 1 << 7;
    pub const MINUS: u16 = 1 << 8;
    pub const PLUS: u16 = 1 << 9;
    pub const L3: u16 = 1 << 10;
    pub const R3: u16 = 1 << 11;
    pub const HOME: u16 = 1 << 12;
    pub const CAPTURE: u16 = 1 << 13;

    /// Decode a UART button mask. Bits 14 and 15 are ignored.
    pub fn from_mask(mask: u16) -> Self {
        let pressed = |bit: u16| mask & bit != 0;
        Self {
            a: pressed(Self::A),
            b: pressed(Self::B),
            x: pressed(Self::X),
            y: pressed(Self::Y),
            l: pressed(Self::L),
            r: pressed(Self::R),
            zl: pressed(Self::ZL),
            zr: pressed(Self::ZR),
            minus: pressed(Self::MINUS),
            plus: pressed(Self::PLUS),
            l3: pressed(Self::L3),
            r3: pressed(Self::R3),
            home: pressed(Self::HOME),
            capture: pressed(Self::CAPTURE),
        }
    }

    /// Encode back into a UART button mask
    pub fn to_mask(&self) -> u16 {
        [
            (self.a, Self::A),
            (self.b, Self::B),
            (self.x, Self::X),
            (self.y, Self::Y),
            (self.l, Self::L),
            (self.r, Self::R),
            (self.zl, Self::ZL),
            (self.zr, Self::ZR),
            (self.minus, Self::MINUS),
            (self.plus, Self::PLUS),
            (self.l3, Self::L3),
            (self.r3, Self::R3),
            (self.home, Self::HOME),
            (self.capture, Self::CAPTURE),
        ]
        .iter()
        .filter(|(pressed, _)| *pressed)
        .fold(0, |mask, (_, bit)| mask | bit)
    }
}

/// D-pad flags. Diagonals set two flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dpad {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

/// Hat directions as sent on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Hat {
    Up = 0x00,
    UpRight = 0x01,
    Right = 0x02,
    DownRight = 0x03,
    Down = 0x04,
    DownLeft = 0x05,
    Left = 0x06,
    UpLeft = 0x07,
    Neutral = 0x08,
}

impl Hat {
    /// Decode a hat byte; values outside the defined set are neutral.
    pub fn from_byte(value: u8) -> Self {
        match value {
            0x00 => Hat::Up,
            0x01 => Hat::UpRight,
            0x02 => Hat::Right,
            0x03 => Hat::DownRight,
            0x04 => Hat::Down,
            0x05 => Hat::DownLeft,
            0x06 => Hat::Left,
            0x07 => Hat::UpLeft,
            _ => Hat::Neutral,
        }
    }

    /// Expand into D-pad flags
    pub fn to_dpad(self) -> Dpad {
        let (up, right, down, left) = match self {
            Hat::Up => (true, false, false, false),
            Hat::UpRight => (true, true, false, false),
            Hat::Right => (false, true, false, false),
            Hat::DownRight => (false, true, true, false),
            Hat::Down => (false, false, true, false),
            Hat::DownLeft => (false, false, true, true),
            Hat::Left => (false, false, false, true),
            Hat::UpLeft => (true, false, false, true),
            Hat::Neutral => (false, false, false, false),
        };
        Dpad { up, down, left, right }
    }
}

/// One motion sample: accelerometer then gyroscope, raw sensor units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionSample {
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
}

impl MotionSample {
    /// Decode from 12 little-endian bytes (accel x/y/z, gyro x/y/z)
    pub fn from_le_bytes(bytes: &[u8; 12]) -> Self {
        let value = |i: usize| i16::from_le_bytes([bytes[i * 2], bytes[i * 2 + 1]]);
        Self {
            accel: [value(0), value(1), value(2)],
            gyro: [value(3), value(4), value(5)],
        }
    }

    /// Values in wire order
    pub fn to_array(&self) -> [i16; 6] {
        [
            self.accel[0],
            self.accel[1],
            self.accel[2],
            self.gyro[0],
            self.gyro[1],
            self.gyro[2],
        ]
    }
}

/// Complete controller state for one report cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputState {
    pub buttons: Buttons,
    pub dpad: Dpad,

    pub lx: u16,
    pub ly: u16,
    pub rx: u16,
    pub ry: u16,

    /// Motion samples; all zero when the host has no sensor
    pub motion: [MotionSample; 3],
}

impl Default for InputState {
    fn default() -> Self {
        Self::neutral()
    }
}

impl InputState {
    /// Nothing pressed, sticks centered, no motion
    pub const fn neutral() -> Self {
        Self {
            buttons: Buttons {
                a: false,
                b: false,
                x: false,
                y: false,
                l: false,
                r: false,
                zl: false,
                zr: false,
                minus: false,
                plus: false,
                l3: false,
                r3: false,
                home: false,
                capture: false,
            },
            dpad: Dpad {
                up: false,
                down: false,
                left: false,
                right: false,
            },
            lx: JOYSTICK_MID,
            ly: JOYSTICK_MID,
            rx: JOYSTICK_MID,
            ry: JOYSTICK_MID,
            motion: [MotionSample {
                accel: [0; 3],
                gyro: [0; 3],
            }; 3],
        }
    }
}

/// The most recently decoded state.
///
/// Writes replace the whole value, so a reader only ever observes a complete
/// state. If decoding ever moves into an interrupt handler this must become a
/// single atomic swap (e.g. a critical-section cell) to keep that guarantee.
#[derive(Debug, Clone, Default)]
pub struct LiveInput {
    current: InputState,
    updates: u64,
}

impl LiveInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot with a freshly decoded state
    pub fn publish(&mut self, state: InputState) {
        self.current = state;
        self.updates = self.updates.wrapping_add(1);
    }

    /// Copy out the current snapshot
    pub fn snapshot(&self) -> InputState {
        self.current
    }

    /// Number of states published so far
    pub fn updates(&self) -> u64 {
        self.updates
    }
}
