//! # Error Types
//!
//! Custom error types for the bridge's I/O shell using `thiserror`. The
//! protocol engine itself has no error path.

use thiserror::Error;

/// Main error type for Procon Bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port could not be opened or written
    #[error("Serial error: {0}")]
    Serial(String),

    /// None of the candidate serial devices could be opened
    #[error("No serial device found (tried: {0})")]
    SerialPortNotFound(String),

    /// USB gadget setup or transport failure
    #[error("USB gadget error: {0}")]
    Gadget(String),
}

/// Result type alias for Procon Bridge
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = BridgeError::SerialPortNotFound("/dev/ttyS0, /dev/ttyAMA0".to_string());
        assert_eq!(err.to_string(), "No serial device found (tried: /dev/ttyS0, /dev/ttyAMA0)");

        let err = BridgeError::Gadget("no UDC".to_string());
        assert_eq!(err.to_string(), "USB gadget error: no UDC");
    }

    #[test]
    fn test_io_conversion() {
        fn fails() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(BridgeError::Io(_))));
    }
}
