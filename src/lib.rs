//! # Procon Bridge Library
//!
//! Impersonate a wired Switch Pro Controller over USB while the actual
//! inputs arrive from a host over UART.
//!
//! The host streams framed input state ([`link`]); the bridge decodes it,
//! answers the console's configuration handshake and subcommands
//! ([`hid`]), sends standard input reports through the USB HID gadget
//! ([`usb`]) and forwards rumble back to the host ([`rumble`]).

pub mod bridge;
pub mod config;
pub mod controller;
pub mod error;
pub mod hid;
pub mod link;
pub mod rumble;
pub mod serial;
pub mod usb;
