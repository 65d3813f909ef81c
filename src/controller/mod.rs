//! # Controller Module
//!
//! Everything the bridge knows about the controller it impersonates.
//!
//! This module handles:
//! - Decoded input state and the live snapshot shared by decoder and engine
//! - The synthetic SPI flash image (factory/user calibration, colors)
//! - Stick ranges derived from that calibration
//! - Device identity (firmware version, controller type, hardware address)

pub mod state;
pub mod calibration;
pub mod identity;
