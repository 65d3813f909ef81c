//! # Input Report Builder
//!
//! Builds the periodic `0x30` report and the 10-byte input block that is
//! also copied into every command reply.
//!
//! ## Layout
//!
//! | Byte | Contents |
//! |------|----------|
//! | 0 | Report id `0x30` |
//! | 1 | Frame counter |
//! | 2 | Battery / connection (`0xF8`) |
//! | 3 | Y, X, B, A, SR, SL, R, ZR |
//! | 4 | Minus, Plus, R3, L3, Home, Capture, -, Charging grip |
//! | 5 | Down, Up, Right, Left, SL, SR, L, ZL |
//! | 6..9 | Left stick (two packed 12-bit values) |
//! | 9..12 | Right stick |
//! | 12 | Vibrator report |
//! | 13..49 | Three IMU samples (accel xyz, gyro xyz; LE i16) |

use super::protocol::{input, Report, BATTERY_CONNECTION, REPORT_SIZE, VIBRATOR_REPORT};
use crate::controller::calibration::{CalibrationStore, StickRange};
use crate::controller::state::{InputState, MotionSample};

/// Size of the battery/buttons/sticks block (report bytes 2..12)
pub const INPUT_BLOCK_SIZE: usize = 10;

const INPUT_BLOCK_OFFSET: usize = 2;
const VIBRATOR_OFFSET: usize = 12;
const IMU_OFFSET: usize = 13;
const IMU_SAMPLE_SIZE: usize = 12;

/// Always set: the console treats the device as docked in a charging grip
const CHARGING_GRIP: u8 = 1 << 7;

/// Factors applied to raw motion samples before they are reported
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionScale {
    pub accel: f32,
    pub gyro: f32,
}

impl Default for MotionScale {
    fn default() -> Self {
        Self { accel: 1.0, gyro: 1.0 }
    }
}

impl MotionScale {
    fn apply(value: i16, factor: f32) -> i16 {
        // `as` saturates on overflow
        (value as f32 * factor).round() as i16
    }

    /// Scale one sample into wire order
    pub fn scale(&self, sample: &MotionSample) -> [i16; 6] {
        let mut values = sample.to_array();
        for (i, value) in values.iter_mut().enumerate() {
            let factor = if i < 3 { self.accel } else { self.gyro };
            *value = Self::apply(*value, factor);
        }
        values
    }
}

/// Pack two 12-bit values into 3 bytes.
///
/// Layout: `[x_lo8] [y_lo4 | x_hi4] [y_hi8]`
///
/// # Examples
///
/// ```
/// use procon_bridge::hid::report::pack_stick;
///
/// assert_eq!(pack_stick(0x800, 0x800), [0x00, 0x08, 0x80]);
/// ```
pub fn pack_stick(x: u16, y: u16) -> [u8; 3] {
    [
        (x & 0xFF) as u8,
        (((x >> 8) & 0x0F) | ((y & 0x0F) << 4)) as u8,
        ((y >> 4) & 0xFF) as u8,
    ]
}

/// Convert a 16-bit state axis to the 12-bit report range
#[inline]
fn to_12bit(value: u16) -> u16 {
    value >> 4
}

/// Scale, clamp and pack one stick. The console's vertical axis points the
/// other way, so Y is negated modulo 4096 after clamping.
pub fn stick_bytes(range: &StickRange, x: u16, y: u16) -> [u8; 3] {
    let x = range.clamp_x(to_12bit(x));
    let y = range.clamp_y(to_12bit(y));
    pack_stick(x, 0u16.wrapping_sub(y) & 0x0FFF)
}

/// Builds report bytes from [`InputState`]
#[derive(Debug, Clone, Copy)]
pub struct ReportBuilder {
    left: StickRange,
    right: StickRange,
    motion_scale: MotionScale,
}

impl ReportBuilder {
    /// Take stick ranges from the calibration store
    pub fn new(store: &CalibrationStore, motion_scale: MotionScale) -> Self {
        Self {
            left: store.left_stick(),
            right: store.right_stick(),
            motion_scale,
        }
    }

    /// Battery, buttons and sticks (report bytes 2..12)
    pub fn input_block(&self, state: &InputState) -> [u8; INPUT_BLOCK_SIZE] {
        let b = &state.buttons;
        let d = &state.dpad;
        let bit = |pressed: bool, n: u8| if pressed { 1u8 << n } else { 0 };

        let mut block = [0u8; INPUT_BLOCK_SIZE];
        block[0] = BATTERY_CONNECTION;
        block[1] = bit(b.y, 0) | bit(b.x, 1) | bit(b.b, 2) | bit(b.a, 3) | bit(b.r, 6) | bit(b.zr, 7);
        block[2] = bit(b.minus, 0)
            | bit(b.plus, 1)
            | bit(b.r3, 2)
            | bit(b.l3, 3)
            | bit(b.home, 4)
            | bit(b.capture, 5)
            | CHARGING_GRIP;
        block[3] = bit(d.down, 0) | bit(d.up, 1) | bit(d.right, 2) | bit(d.left, 3) | bit(b.l, 6) | bit(b.zl, 7);
        block[4..7].copy_from_slice(&stick_bytes(&self.left, state.lx, state.ly));
        block[7..10].copy_from_slice(&stick_bytes(&self.right, state.rx, state.ry));
        block
    }

    /// Full periodic report. Motion is only included when the console has
    /// enabled the IMU.
    pub fn build(&self, state: &InputState, counter: u8, imu_enabled: bool) -> Report {
        let mut report = [0u8; REPORT_SIZE];
        report[0] = input::STANDARD;
        report[1] = counter;
        report[INPUT_BLOCK_OFFSET..INPUT_BLOCK_OFFSET + INPUT_BLOCK_SIZE].copy_from_slice(&self.input_block(state));
        report[VIBRATOR_OFFSET] = VIBRATOR_REPORT;

        if imu_enabled {
            for (i, sample) in state.motion.iter().enumerate() {
                let start = IMU_OFFSET + i * IMU_SAMPLE_SIZE;
                for (j, value) in self.motion_scale.scale(sample).iter().enumerate() {
                    report[start + j * 2..start + j * 2 + 2].copy_from_slice(&value.to_le_bytes());
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::state::JOYSTICK_MID;

    fn builder() -> ReportBuilder {
        ReportBuilder::new(&CalibrationStore::default(), MotionScale::default())
    }

    #[test]
    fn test_pack_stick() {
        assert_eq!(pack_stick(0x800, 0x800), [0x00, 0x08, 0x80]);
        assert_eq!(pack_stick(0xFFF, 0x000), [0xFF, 0x0F, 0x00]);
        assert_eq!(pack_stick(0x000, 0xFFF), [0x00, 0xF0, 0xFF]);
        assert_eq!(pack_stick(0x123, 0x456), [0x23, 0x61, 0x45]);
    }

    #[test]
    fn test_neutral_sticks() {
        let range = CalibrationStore::default().left_stick();
        // 0x7FFF >> 4 = 0x7FF; -0x7FF mod 4096 = 0x801
        assert_eq!(stick_bytes(&range, JOYSTICK_MID, JOYSTICK_MID), pack_stick(0x7FF, 0x801));
    }

    #[test]
    fn test_sticks_are_clamped_to_calibration() {
        let range = CalibrationStore::default().left_stick();
        assert_eq!(stick_bytes(&range, 0x0000, 0x0000), pack_stick(0x15C, 0x1000 - 0x15C));
        assert_eq!(stick_bytes(&range, 0xFFFF, 0xFFFF), pack_stick(0xEA4, 0x1000 - 0xEA4));
    }

    #[test]
    fn test_neutral_report() {
        let report = builder().build(&InputState::neutral(), 7, false);
        assert_eq!(report[0], 0x30);
        assert_eq!(report[1], 7);
        assert_eq!(report[2], 0xF8);
        assert_eq!(&report[3..6], &[0x00, 0x80, 0x00]);
        assert_eq!(report[12], 0x09);
        assert!(report[13..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_button_bits() {
        let b = builder();
        let mut state = InputState::neutral();

        state.buttons.a = true;
        assert_eq!(b.build(&state, 0, false)[3], 0x08);

        state.buttons = Default::default();
        state.buttons.zr = true;
        state.buttons.y = true;
        assert_eq!(b.build(&state, 0, false)[3], 0x81);

        state.buttons = Default::default();
        state.buttons.home = true;
        state.buttons.minus = true;
        assert_eq!(b.build(&state, 0, false)[4], 0x80 | 0x10 | 0x01);

        state.buttons = Default::default();
        state.buttons.zl = true;
        state.dpad.up = true;
        state.dpad.left = true;
        assert_eq!(b.build(&state, 0, false)[5], 0x80 | 0x02 | 0x08);
    }

    #[test]
    fn test_input_block_matches_report() {
        let b = builder();
        let mut state = InputState::neutral();
        state.buttons.b = true;
        state.rx = 0x1234;
        let report = b.build(&state, 0, false);
        assert_eq!(&report[2..12], &b.input_block(&state));
    }

    #[test]
    fn test_imu_block_only_when_enabled() {
        let b = builder();
        let mut state = InputState::neutral();
        state.motion[0] = MotionSample {
            accel: [1, -1, 0x1000],
            gyro: [2, 3, 4],
        };
        state.motion[2].gyro[2] = -2;

        let off = b.build(&state, 0, false);
        assert!(off[13..49].iter().all(|&b| b == 0));

        let on = b.build(&state, 0, true);
        assert_eq!(&on[13..19], &[0x01, 0x00, 0xFF, 0xFF, 0x00, 0x10]);
        assert_eq!(&on[19..25], &[0x02, 0x00, 0x03, 0x00, 0x04, 0x00]);
        assert_eq!(&on[47..49], &[0xFE, 0xFF]);
        assert!(on[49..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_motion_scale() {
        let scale = MotionScale { accel: 2.0, gyro: 0.5 };
        let sample = MotionSample {
            accel: [100, -100, i16::MAX],
            gyro: [100, -101, 1],
        };
        assert_eq!(scale.scale(&sample), [200, -200, i16::MAX, 50, -51, 1]);
    }
}
