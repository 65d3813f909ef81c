//! # HID Module
//!
//! Console-facing side of the bridge: the vendor sub-protocol a wired Pro
//! Controller speaks over its HID interface.
//!
//! This module handles:
//! - Report ids, configuration sub-commands and feature command ids
//! - Periodic input report building (buttons, 12-bit sticks, IMU block)
//! - Feature command dispatch and the synthetic SPI flash reads
//! - The mount/handshake/ready state machine and report pacing
//! - USB descriptor data for the gadget

pub mod protocol;
pub mod report;
pub mod commands;
pub mod engine;
pub mod descriptor;
