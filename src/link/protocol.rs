//! # UART Link Protocol Constants and Types
//!
//! Core definitions for the host <-> bridge serial framing.
//!
//! ```text
//! Input  : [0xAA][version][length][btn_lo][btn_hi][hat][lx][ly][rx][ry][motion..][sum]
//! Rumble : [0xBB][0x01][8 rumble bytes][sum]
//! ```
//!
//! `length` counts every byte after itself, checksum included.

use crate::controller::state::MotionSample;

/// Start-of-frame marker for input frames (host -> bridge)
pub const INPUT_FRAME_MARKER: u8 = 0xAA;

/// Start-of-frame marker for rumble frames (bridge -> host)
pub const RUMBLE_FRAME_MARKER: u8 = 0xBB;

/// Rumble frame type byte
pub const RUMBLE_FRAME_TYPE: u8 = 0x01;

/// Basic frame: buttons, hat and axes only
pub const FRAME_VERSION_BASIC: u8 = 0x01;

/// Extended frame: basic fields followed by up to three motion samples
pub const FRAME_VERSION_MOTION: u8 = 0x02;

/// Marker + version + length
pub const INPUT_HEADER_SIZE: usize = 3;

/// buttons(2) + hat(1) + axes(4)
pub const INPUT_PAYLOAD_SIZE: usize = 7;

/// Six little-endian i16 values per motion sample
pub const MOTION_SAMPLE_SIZE: usize = 12;

/// Maximum motion samples carried by one frame
pub const MOTION_SAMPLE_COUNT: usize = 3;

/// Smallest legal length field (payload + checksum)
pub const MIN_FRAME_LENGTH: u8 = (INPUT_PAYLOAD_SIZE + 1) as u8;

/// Largest legal length field (payload + all motion samples + checksum)
pub const MAX_FRAME_LENGTH: u8 =
    (INPUT_PAYLOAD_SIZE + MOTION_SAMPLE_SIZE * MOTION_SAMPLE_COUNT + 1) as u8;

/// Largest complete input frame on the wire
pub const MAX_INPUT_FRAME_SIZE: usize = INPUT_HEADER_SIZE + MAX_FRAME_LENGTH as usize;

/// Raw rumble bytes per console write
pub const RUMBLE_PAYLOAD_SIZE: usize = 8;

/// Marker + type + payload + checksum
pub const RUMBLE_FRAME_SIZE: usize = 2 + RUMBLE_PAYLOAD_SIZE + 1;

/// Partial frames older than this are discarded
pub const DEFAULT_IDLE_TIMEOUT_MS: u32 = 20;

/// Default UART baud rate
pub const DEFAULT_BAUD_RATE: u32 = 921_600;

/// Alternate UART baud rate for hosts that cannot reach the default
pub const ALTERNATE_BAUD_RATE: u32 = 500_000;

/// Hat byte value for "nothing pressed"
pub const HAT_NEUTRAL: u8 = 0x08;

/// Raw rumble payload as written by the console
pub type RumblePayload = [u8; RUMBLE_PAYLOAD_SIZE];

/// Wire-level contents of an input frame, before decoding into controller state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInputFrame {
    /// Button bitmask (little-endian on the wire)
    pub buttons: u16,

    /// Hat direction byte
    pub hat: u8,

    /// 8-bit stick axes: lx, ly, rx, ry
    pub axes: [u8; 4],

    /// Motion samples (only sent with [`FRAME_VERSION_MOTION`])
    pub motion: heapless::Vec<MotionSample, MOTION_SAMPLE_COUNT>,
}

impl Default for RawInputFrame {
    fn default() -> Self {
        Self {
            buttons: 0,
            hat: HAT_NEUTRAL,
            axes: [0x80; 4],
            motion: heapless::Vec::new(),
        }
    }
}

impl RawInputFrame {
    /// Frame version required to carry this frame's contents
    pub fn version(&self) -> u8 {
        if self.motion.is_empty() {
            FRAME_VERSION_BASIC
        } else {
            FRAME_VERSION_MOTION
        }
    }

    /// Length field value for this frame (payload + checksum)
    pub fn length(&self) -> u8 {
        (INPUT_PAYLOAD_SIZE + self.motion.len() * MOTION_SAMPLE_SIZE + 1) as u8
    }
}

/// Checks whether a length field is acceptable for the given frame version.
///
/// Returns the number of motion samples the frame carries.
pub fn motion_samples_for(version: u8, length: u8) -> Option<usize> {
    match version {
        FRAME_VERSION_BASIC if length == MIN_FRAME_LENGTH => Some(0),
        FRAME_VERSION_MOTION => {
            let extension = (length as usize).checked_sub(MIN_FRAME_LENGTH as usize)?;
            if extension % MOTION_SAMPLE_SIZE != 0 {
                return None;
            }
            let samples = extension / MOTION_SAMPLE_SIZE;
            (samples <= MOTION_SAMPLE_COUNT).then_some(samples)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_constants() {
        assert_eq!(INPUT_FRAME_MARKER, 0xAA);
        assert_eq!(RUMBLE_FRAME_MARKER, 0xBB);
        assert_ne!(INPUT_FRAME_MARKER, RUMBLE_FRAME_MARKER);
        assert_eq!(MIN_FRAME_LENGTH, 8);
        assert_eq!(MAX_FRAME_LENGTH, 44);
        assert_eq!(MAX_INPUT_FRAME_SIZE, 47);
        assert_eq!(RUMBLE_FRAME_SIZE, 11);
    }

    #[test]
    fn test_baud_rates() {
        assert_eq!(DEFAULT_BAUD_RATE, 921_600);
        assert_eq!(ALTERNATE_BAUD_RATE, 500_000);
    }

    #[test]
    fn test_basic_frame_length_must_be_exact() {
        assert_eq!(motion_samples_for(FRAME_VERSION_BASIC, 8), Some(0));
        assert_eq!(motion_samples_for(FRAME_VERSION_BASIC, 9), None);
        assert_eq!(motion_samples_for(FRAME_VERSION_BASIC, 20), None);
    }

    #[test]
    fn test_motion_frame_lengths() {
        assert_eq!(motion_samples_for(FRAME_VERSION_MOTION, 8), Some(0));
        assert_eq!(motion_samples_for(FRAME_VERSION_MOTION, 20), Some(1));
        assert_eq!(motion_samples_for(FRAME_VERSION_MOTION, 44), Some(3));
        assert_eq!(motion_samples_for(FRAME_VERSION_MOTION, 21), None);
        assert_eq!(motion_samples_for(FRAME_VERSION_MOTION, 56), None);
        assert_eq!(motion_samples_for(FRAME_VERSION_MOTION, 7), None);
    }

    #[test]
    fn test_unknown_version_rejected() {
        assert_eq!(motion_samples_for(0x00, 8), None);
        assert_eq!(motion_samples_for(0x7F, 8), None);
    }

    #[test]
    fn test_raw_frame_version_follows_motion() {
        let mut frame = RawInputFrame::default();
        assert_eq!(frame.version(), FRAME_VERSION_BASIC);
        assert_eq!(frame.length(), 8);

        frame.motion.push(MotionSample::default()).unwrap();
        assert_eq!(frame.version(), FRAME_VERSION_MOTION);
        assert_eq!(frame.length(), 20);
    }
}
