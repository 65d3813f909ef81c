//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::controller::calibration::{ControllerColors, Rgb};
use crate::error::{BridgeError, Result};
use crate::hid::engine::ReportTiming;
use crate::hid::report::MotionScale;
use crate::link::protocol::{DEFAULT_BAUD_RATE, DEFAULT_IDLE_TIMEOUT_MS};
use crate::serial::is_supported_baud_rate;

/// Serial port value that selects auto-detection
pub const AUTO_DETECT: &str = "auto";

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub usb: UsbConfig,
    #[serde(default)]
    pub colors: ColorConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// UART configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    /// Device path, or "auto" to probe the usual UART devices
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Gap after which a partial frame is discarded
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u32,
}

/// USB gadget configuration
#[derive(Debug, Deserialize, Clone)]
pub struct UsbConfig {
    #[serde(default = "default_hidg_device")]
    pub hidg_device: String,

    /// UDC name; empty picks the first one found
    #[serde(default)]
    pub udc: String,

    /// Create and bind the gadget through configfs at startup
    #[serde(default)]
    pub configure_gadget: bool,

    #[serde(default = "default_keepalive_ms")]
    pub keepalive_ms: u32,

    #[serde(default = "default_min_report_interval_ms")]
    pub min_report_interval_ms: u32,

    #[serde(default = "default_udc_poll_ms")]
    pub udc_poll_ms: u64,
}

/// Colors written into the factory flash image (RRGGBB)
#[derive(Debug, Deserialize, Clone)]
pub struct ColorConfig {
    #[serde(default = "default_body_color")]
    pub body: Rgb,

    #[serde(default = "default_button_color")]
    pub buttons: Rgb,

    #[serde(default = "default_grip_color")]
    pub left_grip: Rgb,

    #[serde(default = "default_grip_color")]
    pub right_grip: Rgb,
}

/// Motion sample scaling
#[derive(Debug, Deserialize, Clone)]
pub struct MotionConfig {
    #[serde(default = "default_scale")]
    pub accel_scale: f32,

    #[serde(default = "default_scale")]
    pub gyro_scale: f32,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Also write daily log files here
    #[serde(default)]
    pub log_dir: Option<String>,
}

// Default value functions
fn default_serial_port() -> String { AUTO_DETECT.to_string() }
fn default_baud_rate() -> u32 { DEFAULT_BAUD_RATE }
fn default_idle_timeout_ms() -> u32 { DEFAULT_IDLE_TIMEOUT_MS }

fn default_hidg_device() -> String { "/dev/hidg0".to_string() }
fn default_keepalive_ms() -> u32 { crate::hid::engine::DEFAULT_KEEPALIVE_MS }
fn default_min_report_interval_ms() -> u32 { crate::hid::engine::DEFAULT_MIN_REPORT_INTERVAL_MS }
fn default_udc_poll_ms() -> u64 { 100 }

fn default_body_color() -> Rgb { ControllerColors::default().body }
fn default_button_color() -> Rgb { ControllerColors::default().buttons }
fn default_grip_color() -> Rgb { ControllerColors::default().left_grip }

fn default_scale() -> f32 { 1.0 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            hidg_device: default_hidg_device(),
            udc: String::new(),
            configure_gadget: false,
            keepalive_ms: default_keepalive_ms(),
            min_report_interval_ms: default_min_report_interval_ms(),
            udc_poll_ms: default_udc_poll_ms(),
        }
    }
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            body: default_body_color(),
            buttons: default_button_color(),
            left_grip: default_grip_color(),
            right_grip: default_grip_color(),
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            accel_scale: default_scale(),
            gyro_scale: default_scale(),
        }
    }
}

impl ColorConfig {
    pub fn to_controller_colors(&self) -> ControllerColors {
        ControllerColors {
            body: self.body,
            buttons: self.buttons,
            left_grip: self.left_grip,
            right_grip: self.right_grip,
        }
    }
}

impl MotionConfig {
    pub fn to_motion_scale(&self) -> MotionScale {
        MotionScale {
            accel: self.accel_scale,
            gyro: self.gyro_scale,
        }
    }
}

impl UsbConfig {
    pub fn report_timing(&self) -> ReportTiming {
        ReportTiming {
            keepalive_ms: self.keepalive_ms,
            min_interval_ms: self.min_report_interval_ms,
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> BridgeError {
    BridgeError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use procon_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// println!("UART: {} @ {}", config.serial.port, config.serial.baud_rate);
    /// # Ok::<(), procon_bridge::error::BridgeError>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty (use \"auto\" to auto-detect)"));
        }

        if !is_supported_baud_rate(self.serial.baud_rate) {
            return Err(invalid("baud_rate must be one of: 921600, 500000"));
        }

        if self.serial.idle_timeout_ms == 0 || self.serial.idle_timeout_ms > 1000 {
            return Err(invalid("idle_timeout_ms must be between 1 and 1000"));
        }

        if self.usb.hidg_device.is_empty() {
            return Err(invalid("hidg_device cannot be empty"));
        }

        if self.usb.keepalive_ms == 0 || self.usb.keepalive_ms > 1000 {
            return Err(invalid("keepalive_ms must be between 1 and 1000"));
        }

        if self.usb.min_report_interval_ms == 0 || self.usb.min_report_interval_ms > self.usb.keepalive_ms {
            return Err(invalid("min_report_interval_ms must be between 1 and keepalive_ms"));
        }

        if self.usb.udc_poll_ms == 0 || self.usb.udc_poll_ms > 10000 {
            return Err(invalid("udc_poll_ms must be between 1 and 10000"));
        }

        for (name, value) in [
            ("accel_scale", self.motion.accel_scale),
            ("gyro_scale", self.motion.gyro_scale),
        ] {
            if !value.is_finite() || value <= 0.0 || value > 16.0 {
                return Err(invalid(format!("{} must be greater than 0.0 and at most 16.0", name)));
            }
        }

        if let Some(dir) = &self.logging.log_dir {
            if dir.is_empty() {
                return Err(invalid("log_dir cannot be empty when set"));
            }
        }

        Ok(())
    }
}
