//! # UART Input Frame Decoder
//!
//! Streaming decoder that pulls well-formed input frames out of a continuous,
//! possibly interrupted byte stream.
//!
//! ## State machine
//!
//! ```text
//! Searching --marker--> Header --version,length ok--> Accumulating --complete--> Searching
//!     ^                   |                               |
//!     +-- bad length -----+                               |
//!     +-- bad checksum / version (replay buffered bytes) -+
//!     +-- idle gap > timeout (stale, discard) ------------+
//! ```
//!
//! Corruption is expected on a noisy link, so no failure is ever surfaced to
//! the caller. Failures are only counted in [`DecoderStats`].

use super::checksum::verify;
use super::protocol::*;
use crate::controller::state::{expand_axis, Buttons, Hat, InputState, MotionSample};

/// Running counters for frames seen by the decoder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames decoded and published
    pub accepted: u64,
    /// Frames dropped because the checksum did not match
    pub checksum_errors: u64,
    /// Frames abandoned because the length field was out of range
    pub length_errors: u64,
    /// Frames dropped because the version/length combination is unknown
    pub version_errors: u64,
    /// Partial frames discarded after an idle gap
    pub stale_resets: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    /// Discarding bytes until a frame marker shows up
    Searching,
    /// Marker seen, collecting version and length
    Header,
    /// Collecting the remainder of a frame of `total` bytes
    Accumulating { total: usize },
}

/// Streaming input frame decoder.
///
/// Owns its buffer and cursor; never allocates.
///
/// # Examples
///
/// ```
/// use procon_bridge::link::decoder::FrameDecoder;
///
/// let mut decoder = FrameDecoder::new(20);
/// let frame = [0xAA, 0x01, 0x08, 0x01, 0x00, 0x08, 0x80, 0x80, 0x80, 0x80, 0xBC];
/// let state = decoder.feed(&frame, 0).expect("valid frame");
/// assert!(state.buttons.a);
/// ```
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    buffer: heapless::Vec<u8, MAX_INPUT_FRAME_SIZE>,
    state: DecoderState,
    last_byte_ms: Option<u32>,
    idle_timeout_ms: u32,
    stats: DecoderStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TIMEOUT_MS)
    }
}

impl FrameDecoder {
    /// Create a decoder that discards partial frames after `idle_timeout_ms`
    pub fn new(idle_timeout_ms: u32) -> Self {
        Self {
            buffer: heapless::Vec::new(),
            state: DecoderState::Searching,
            last_byte_ms: None,
            idle_timeout_ms,
            stats: DecoderStats::default(),
        }
    }

    /// Counters accumulated since creation
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// True while a frame is partially received
    pub fn in_frame(&self) -> bool {
        self.state != DecoderState::Searching
    }

    /// Feed a batch of bytes received at `now_ms`.
    ///
    /// Returns the last state decoded from the batch, if any. Earlier frames
    /// in the same batch are superseded.
    pub fn feed(&mut self, bytes: &[u8], now_ms: u32) -> Option<InputState> {
        let mut latest = None;
        for &byte in bytes {
            if let Some(state) = self.push(byte, now_ms) {
                latest = Some(state);
            }
        }
        latest
    }

    /// Feed one byte received at `now_ms`
    pub fn push(&mut self, byte: u8, now_ms: u32) -> Option<InputState> {
        if let Some(last) = self.last_byte_ms {
            if self.in_frame() && now_ms.wrapping_sub(last) > self.idle_timeout_ms {
                self.stats.stale_resets += 1;
                tracing::trace!("discarding stale partial frame ({} bytes)", self.buffer.len());
                self.reset();
            }
        }
        self.last_byte_ms = Some(now_ms);

        self.step(byte)
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.state = DecoderState::Searching;
    }

    fn step(&mut self, byte: u8) -> Option<InputState> {
        match self.state {
            DecoderState::Searching => {
                if byte == INPUT_FRAME_MARKER {
                    // Buffer is empty while searching
                    let _ = self.buffer.push(byte);
                    self.state = DecoderState::Header;
                }
                None
            }
            DecoderState::Header => {
                let _ = self.buffer.push(byte);
                if self.buffer.len() < INPUT_HEADER_SIZE {
                    return None;
                }

                let length = byte;
                if !(MIN_FRAME_LENGTH..=MAX_FRAME_LENGTH).contains(&length) {
                    self.stats.length_errors += 1;
                    tracing::trace!("invalid frame length {}", length);
                    return self.resync();
                }

                self.state = DecoderState::Accumulating {
                    total: INPUT_HEADER_SIZE + length as usize,
                };
                None
            }
            DecoderState::Accumulating { total } => {
                let _ = self.buffer.push(byte);
                if self.buffer.len() < total {
                    return None;
                }
                self.complete()
            }
        }
    }

    fn complete(&mut self) -> Option<InputState> {
        if !verify(&self.buffer) {
            self.stats.checksum_errors += 1;
            tracing::trace!("checksum mismatch, resynchronizing");
            return self.resync();
        }

        match decode_frame(&self.buffer) {
            Some(state) => {
                self.stats.accepted += 1;
                self.reset();
                Some(state)
            }
            None => {
                self.stats.version_errors += 1;
                tracing::trace!("unsupported frame version 0x{:02X}", self.buffer[1]);
                self.resync()
            }
        }
    }

    /// Abandon the current frame and rescan everything after its marker.
    ///
    /// A marker that arrived inside a rejected frame is picked up again
    /// instead of being swallowed with it.
    fn resync(&mut self) -> Option<InputState> {
        let pending = self.buffer.clone();
        self.reset();

        let mut latest = None;
        for &byte in pending.iter().skip(1) {
            if let Some(state) = self.step(byte) {
                latest = Some(state);
            }
        }
        latest
    }
}

/// Decode a complete, checksum-verified input frame.
///
/// Returns `None` if the version/length combination is not supported.
pub fn decode_frame(frame: &[u8]) -> Option<InputState> {
    if frame.len() < INPUT_HEADER_SIZE || frame[0] != INPUT_FRAME_MARKER {
        return None;
    }

    let version = frame[1];
    let length = frame[2];
    if frame.len() != INPUT_HEADER_SIZE + length as usize {
        return None;
    }
    let samples = motion_samples_for(version, length)?;

    let payload = &frame[INPUT_HEADER_SIZE..];
    let buttons = u16::from_le_bytes([payload[0], payload[1]]);
    let hat = Hat::from_byte(payload[2]);

    let mut state = InputState::neutral();
    state.buttons = Buttons::from_mask(buttons);
    state.dpad = hat.to_dpad();
    state.lx = expand_axis(payload[3]);
    state.ly = expand_axis(payload[4]);
    state.rx = expand_axis(payload[5]);
    state.ry = expand_axis(payload[6]);

    let motion = &payload[INPUT_PAYLOAD_SIZE..];
    for (slot, chunk) in state
        .motion
        .iter_mut()
        .zip(motion.chunks_exact(MOTION_SAMPLE_SIZE))
        .take(samples)
    {
        let mut bytes = [0u8; MOTION_SAMPLE_SIZE];
        bytes.copy_from_slice(chunk);
        *slot = MotionSample::from_le_bytes(&bytes);
    }

    Some(state)
}
