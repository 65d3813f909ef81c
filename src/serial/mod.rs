//! # Serial Communication Module
//!
//! Handles the UART link to the host that supplies controller input.
//!
//! This module handles:
//! - Opening the UART at 921,600 baud (500,000 alternate), 8N1
//! - A reader task forwarding raw byte chunks to the run loop
//! - The write half used for rumble frames

pub mod port_trait;

use crate::error::{BridgeError, Result};
use crate::link::protocol::{ALTERNATE_BAUD_RATE, DEFAULT_BAUD_RATE};
use bytes::{Bytes, BytesMut};
use port_trait::TokioSerialPort;
use tokio::io::{AsyncRead, AsyncReadExt, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

/// Default UART device paths to try (in order of preference)
pub const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyAMA0", // Raspberry Pi primary UART
    "/dev/ttyS0",   // SoC / mini UART
    "/dev/ttyUSB0", // USB-to-serial adapters
];

/// Buffered read chunks between the reader task and the run loop
pub const READ_CHANNEL_CAPACITY: usize = 64;

const READ_BUFFER_SIZE: usize = 256;

/// Write half of the UART as used by the rumble forwarder
pub type UartWriter = TokioSerialPort<WriteHalf<SerialStream>>;

/// Check a configured baud rate
pub fn is_supported_baud_rate(baud_rate: u32) -> bool {
    baud_rate == DEFAULT_BAUD_RATE || baud_rate == ALTERNATE_BAUD_RATE
}

/// UART connection to the input host
pub struct UartLink {
    /// Serial port handle
    port: SerialStream,
    /// Device path (e.g., /dev/ttyAMA0)
    device_path: String,
}

impl std::fmt::Debug for UartLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UartLink")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl UartLink {
    /// Open the UART, auto-detecting the device
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::SerialPortNotFound`] if none of the default
    /// paths can be opened
    pub fn open(baud_rate: u32) -> Result<Self> {
        Self::open_with_paths(DEFAULT_DEVICE_PATHS, baud_rate)
    }

    /// Open the first device in `paths` that succeeds
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/ttyAMA0"])
    /// * `baud_rate` - Line rate; must be 921600 or 500000
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        if !is_supported_baud_rate(baud_rate) {
            return Err(BridgeError::Serial(format!(
                "Unsupported baud rate {} (expected {} or {})",
                baud_rate, DEFAULT_BAUD_RATE, ALTERNATE_BAUD_RATE
            )));
        }

        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened UART {} at {} baud", path, baud_rate);
                    return Ok(Self {
                        port,
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(BridgeError::SerialPortNotFound(paths.join(", ")))
    }

    fn open_port(path: &str, baud_rate: u32) -> Result<SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| BridgeError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Split the port: reads are moved to a background task delivering
    /// chunks on the returned channel, the write half is returned for rumble.
    pub fn start(self) -> (mpsc::Receiver<Bytes>, UartWriter, JoinHandle<()>) {
        let (reader, writer) = tokio::io::split(self.port);
        let (tx, rx) = mpsc::channel(READ_CHANNEL_CAPACITY);
        let handle = tokio::spawn(read_loop(reader, tx));
        (rx, TokioSerialPort::new(writer), handle)
    }
}

/// Forward everything read from `reader` as byte chunks until EOF, a read
/// error, or the receiver going away.
pub async fn read_loop<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::Sender<Bytes>) {
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

    loop {
        buf.reserve(READ_BUFFER_SIZE);
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                warn!("UART closed");
                break;
            }
            Ok(n) => {
                debug!("UART read {} bytes", n);
                if tx.send(buf.split().freeze()).await.is_err() {
                    debug!("UART receiver dropped, stopping reader");
                    break;
                }
            }
            Err(e) => {
                warn!("UART read failed: {}", e);
                break;
            }
        }
    }
}
