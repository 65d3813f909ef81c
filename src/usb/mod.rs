//! # USB Transport Module
//!
//! The seam between the protocol engine and whatever carries its reports.
//!
//! This module handles:
//! - The non-blocking [`ReportSink`] the engine writes through
//! - Transport events (mount, unmount, console output reports)
//! - The Linux HID gadget implementation in [`gadget`]

pub mod gadget;

use crate::hid::protocol::Report;
use bytes::Bytes;

/// Non-blocking destination for device -> console reports
#[cfg_attr(test, mockall::automock)]
pub trait ReportSink {
    /// Whether a report can be accepted right now
    fn is_ready(&self) -> bool;

    /// Hand one report to the transport. `false` means it was not taken and
    /// should be retried on a later tick.
    fn send_report(&mut self, report: &Report) -> bool;
}

/// Something the transport observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsbEvent {
    /// Host configured the device
    Mounted,
    /// Host went away
    Unmounted,
    /// Console -> device report, as received
    OutputReport(Bytes),
}
