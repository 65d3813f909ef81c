//! # Rumble Forwarder
//!
//! Re-frames rumble payloads written by the console and sends them back to
//! the host. One frame per console write, no retry: the console repeats
//! rumble state, so a lost frame is corrected by the next one.

use crate::link::encoder::encode_rumble_frame;
use crate::link::protocol::RumblePayload;
use crate::serial::port_trait::SerialPortIO;
use tracing::{debug, warn};

/// Sends rumble frames over a serial writer
pub struct RumbleForwarder<P: SerialPortIO> {
    port: P,
    sent: u64,
    failed: u64,
}

impl<P: SerialPortIO> RumbleForwarder<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            sent: 0,
            failed: 0,
        }
    }

    /// Frame and write one payload.
    ///
    /// Write failures are logged and counted, never returned.
    pub async fn forward(&mut self, payload: &RumblePayload) {
        let frame = encode_rumble_frame(payload);

        let result = match self.port.write_all(&frame).await {
            Ok(()) => self.port.flush().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.sent += 1;
                debug!("Rumble {:02X?}", payload);
            }
            Err(e) => {
                self.failed += 1;
                warn!("Failed to forward rumble frame: {}", e);
            }
        }
    }

    /// Frames written successfully
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Frames lost to write errors
    pub fn failed(&self) -> u64 {
        self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::port_trait::mocks::RecordingPort;
    use std::io;

    #[tokio::test]
    async fn test_forward_writes_framed_payload() {
        let port = RecordingPort::new();
        let mut forwarder = RumbleForwarder::new(port.clone());

        forwarder.forward(&[0x00, 0x01, 0x40, 0x40, 0x00, 0x01, 0x40, 0x40]).await;

        let written = port.frames();
        assert_eq!(written.len(), 1);
        let frame = &written[0];
        assert_eq!(frame.len(), 11);
        assert_eq!(&frame[..2], &[0xBB, 0x01]);
        assert_eq!(&frame[2..10], &[0x00, 0x01, 0x40, 0x40, 0x00, 0x01, 0x40, 0x40]);
        let sum = frame[..10].iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        assert_eq!(frame[10], sum);
        assert_eq!(forwarder.sent(), 1);
    }

    #[tokio::test]
    async fn test_one_frame_per_call() {
        let port = RecordingPort::new();
        let mut forwarder = RumbleForwarder::new(port.clone());

        forwarder.forward(&[0; 8]).await;
        forwarder.forward(&[0; 8]).await;
        forwarder.forward(&[0xFF; 8]).await;

        assert_eq!(port.frames().len(), 3);
        assert_eq!(port.flushes(), 3);
        assert_eq!(forwarder.sent(), 3);
    }

    #[tokio::test]
    async fn test_write_error_is_swallowed() {
        let port = RecordingPort::new();
        port.fail_writes(io::ErrorKind::BrokenPipe);
        let mut forwarder = RumbleForwarder::new(port.clone());

        forwarder.forward(&[1; 8]).await;

        assert!(port.frames().is_empty());
        assert_eq!(forwarder.sent(), 0);
        assert_eq!(forwarder.failed(), 1);
    }

    #[tokio::test]
    async fn test_flush_error_counts_as_failure() {
        let port = RecordingPort::new();
        port.fail_flushes(io::ErrorKind::TimedOut);
        let mut forwarder = RumbleForwarder::new(port.clone());

        forwarder.forward(&[1; 8]).await;

        assert_eq!(forwarder.failed(), 1);
    }
}
