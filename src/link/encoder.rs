//! # UART Frame Encoder
//!
//! Builds rumble frames for the host and input frames for host-side tooling.

use super::checksum::sum8;
use super::protocol::*;

/// Encode a console rumble write into a rumble frame
///
/// # Arguments
///
/// * `payload` - The 8 raw rumble bytes from the console output report
///
/// # Returns
///
/// * `[u8; 11]` - Complete frame: marker, type, payload, checksum
///
/// # Examples
///
/// ```
/// use procon_bridge::link::encoder::encode_rumble_frame;
///
/// let frame = encode_rumble_frame(&[0x00, 0x01, 0x40, 0x40, 0x00, 0x01, 0x40, 0x40]);
/// assert_eq!(frame[0], 0xBB);
/// assert_eq!(frame.len(), 11);
/// ```
pub fn encode_rumble_frame(payload: &RumblePayload) -> [u8; RUMBLE_FRAME_SIZE] {
    let mut frame = [0u8; RUMBLE_FRAME_SIZE];
    frame[0] = RUMBLE_FRAME_MARKER;
    frame[1] = RUMBLE_FRAME_TYPE;
    frame[2..2 + RUMBLE_PAYLOAD_SIZE].copy_from_slice(payload);
    frame[RUMBLE_FRAME_SIZE - 1] = sum8(&frame[..RUMBLE_FRAME_SIZE - 1]);
    frame
}

/// Encode an input frame the way a host would send it
///
/// The frame version is chosen from the contents: frames carrying motion
/// samples are sent as [`FRAME_VERSION_MOTION`].
pub fn encode_input_frame(raw: &RawInputFrame) -> heapless::Vec<u8, MAX_INPUT_FRAME_SIZE> {
    let mut frame = heapless::Vec::new();

    // Capacity covers the largest frame, so pushes below cannot fail
    let _ = frame.push(INPUT_FRAME_MARKER);
    let _ = frame.push(raw.version());
    let _ = frame.push(raw.length());
    let _ = frame.extend_from_slice(&raw.buttons.to_le_bytes());
    let _ = frame.push(raw.hat);
    let _ = frame.extend_from_slice(&raw.axes);

    for sample in &raw.motion {
        for value in sample.to_array() {
            let _ = frame.extend_from_slice(&value.to_le_bytes());
        }
    }

    let checksum = sum8(&frame);
    let _ = frame.push(checksum);

    frame
}
