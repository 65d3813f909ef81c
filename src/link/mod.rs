//! # UART Link Protocol Module
//!
//! Framing used between the input host and the bridge over the serial link.
//!
//! This module handles:
//! - Input frames (host -> bridge): buttons, hat, four stick axes, optional motion
//! - Rumble frames (bridge -> host): the raw 8-byte rumble payload
//! - 8-bit additive checksums
//! - Streaming frame synchronization and corruption rejection

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod checksum;
