//! # HID Protocol Engine
//!
//! The console-facing state machine. One [`ProtocolEngine`] value owns all
//! engine state; the USB transport feeds it output reports and calls
//! [`ProtocolEngine::tick`] once per loop iteration.
//!
//! ## States
//!
//! ```text
//! Unmounted -> Mounted -> Configuring -> Ready
//!                 ^                        |
//!                 +------ mount/unmount ---+
//! ```
//!
//! - Mount and unmount both return to `Mounted` and clear the ready flag
//! - Any configuration sub-command before `Ready` moves to `Configuring`
//! - "Disable USB timeout" moves to `Ready`
//!
//! ## Emission
//!
//! Replies are queued and drained first, one per tick, as soon as the
//! transport is ready. The periodic `0x30` report is only produced in
//! `Ready`, no sooner than the minimum interval after the last send, and is
//! suppressed when its content (counter excluded) matches the last periodic
//! report unless the keepalive interval has passed.

use super::commands::{self, CommandContext, ControllerSettings};
use super::protocol::{input, offset, output, reply, ConfigCommand, Report, REPORT_SIZE};
use super::report::{MotionScale, ReportBuilder, INPUT_BLOCK_SIZE};
use crate::controller::calibration::CalibrationStore;
use crate::controller::identity::DeviceIdentity;
use crate::controller::state::InputState;
use crate::link::protocol::{RumblePayload, RUMBLE_PAYLOAD_SIZE};
use crate::usb::ReportSink;
use heapless::Deque;
use tracing::{debug, info, warn};

/// Pending reply capacity
pub const RESPONSE_QUEUE_DEPTH: usize = 4;

/// Longest silence allowed while ready
pub const DEFAULT_KEEPALIVE_MS: u32 = 5;

/// Shortest gap between periodic reports
pub const DEFAULT_MIN_REPORT_INTERVAL_MS: u32 = 5;

/// Console-visible link state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Unmounted,
    /// Mounted, not yet identified
    Mounted,
    /// Handshake in progress
    Configuring,
    /// Periodic reports enabled
    Ready,
}

/// Report pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportTiming {
    pub keepalive_ms: u32,
    pub min_interval_ms: u32,
}

impl Default for ReportTiming {
    fn default() -> Self {
        Self {
            keepalive_ms: DEFAULT_KEEPALIVE_MS,
            min_interval_ms: DEFAULT_MIN_REPORT_INTERVAL_MS,
        }
    }
}

/// Counters for observability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub replies_sent: u64,
    pub reports_sent: u64,
    pub replies_dropped: u64,
    pub send_failures: u64,
}

pub struct ProtocolEngine {
    state: LinkState,
    identity: DeviceIdentity,
    store: CalibrationStore,
    builder: ReportBuilder,
    settings: ControllerSettings,
    timing: ReportTiming,

    responses: Deque<Report, RESPONSE_QUEUE_DEPTH>,
    counter: u8,
    last_report: Option<Report>,
    last_send_ms: u32,

    stats: EngineStats,
}

impl ProtocolEngine {
    /// Create an engine in `Unmounted`
    pub fn new(
        identity: DeviceIdentity,
        store: CalibrationStore,
        motion_scale: MotionScale,
        timing: ReportTiming,
    ) -> Self {
        let builder = ReportBuilder::new(&store, motion_scale);
        Self {
            state: LinkState::Unmounted,
            identity,
            store,
            builder,
            settings: ControllerSettings::default(),
            timing,
            responses: Deque::new(),
            counter: 0,
            last_report: None,
            last_send_ms: 0,
            stats: EngineStats::default(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LinkState::Ready
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Counter value the next transmitted report will carry
    pub fn counter(&self) -> u8 {
        self.counter
    }

    /// Number of replies waiting to be sent
    pub fn pending_replies(&self) -> usize {
        self.responses.len()
    }

    /// Host configured the device
    pub fn on_mount(&mut self) {
        info!("USB mounted");
        self.reset_session();
        self.enqueue(self.identify_reply());
    }

    /// Host released the device
    pub fn on_unmount(&mut self) {
        info!("USB unmounted");
        self.reset_session();
    }

    fn reset_session(&mut self) {
        self.state = LinkState::Mounted;
        self.settings = ControllerSettings::default();
        self.responses.clear();
        self.last_report = None;
    }

    /// Handle one console output report.
    ///
    /// Returns the rumble payload to forward for every `0x01` and `0x10`
    /// report. Short reports are zero-padded.
    pub fn handle_output_report(&mut self, data: &[u8]) -> Option<RumblePayload> {
        let &report_id = data.first()?;

        let mut report = [0u8; REPORT_SIZE];
        let len = data.len().min(REPORT_SIZE);
        report[..len].copy_from_slice(&data[..len]);

        match report_id {
            output::NOOP => None,
            output::COMMAND => {
                self.handle_command(&report);
                Some(Self::rumble_payload(&report))
            }
            output::RUMBLE => Some(Self::rumble_payload(&report)),
            output::CONFIGURATION => {
                self.handle_config(report[offset::CONFIG_SUBCOMMAND]);
                None
            }
            other => {
                debug!("Ignoring output report 0x{:02X}", other);
                None
            }
        }
    }

    fn rumble_payload(report: &Report) -> RumblePayload {
        let mut payload = [0u8; RUMBLE_PAYLOAD_SIZE];
        payload.copy_from_slice(&report[offset::RUMBLE..offset::RUMBLE + RUMBLE_PAYLOAD_SIZE]);
        payload
    }

    fn handle_config(&mut self, sub: u8) {
        if self.state != LinkState::Ready {
            self.state = LinkState::Configuring;
        }

        let mut report = [0u8; REPORT_SIZE];
        match ConfigCommand::try_from(sub) {
            Ok(ConfigCommand::Identify) => {
                debug!("Config: identify");
                report = self.identify_reply();
            }
            Ok(ConfigCommand::Handshake) | Ok(ConfigCommand::BaudRate) => {
                debug!("Config: 0x{:02X}", sub);
                report[0] = input::CONFIGURATION_REPLY;
                report[1] = sub;
            }
            Ok(ConfigCommand::DisableUsbTimeout) => {
                report[0] = input::STANDARD;
                report[1] = sub;
                if self.state != LinkState::Ready {
                    info!("Handshake complete, sending input reports");
                    self.state = LinkState::Ready;
                }
            }
            Ok(ConfigCommand::EnableUsbTimeout) | Err(_) => {
                debug!("Config: 0x{:02X}", sub);
                report[0] = input::STANDARD;
                report[1] = sub;
            }
        }

        self.enqueue(report);
    }

    fn handle_command(&mut self, report: &Report) {
        let id = report[offset::COMMAND_ID];
        let mut ctx = CommandContext {
            identity: &self.identity,
            store: &self.store,
            settings: &mut self.settings,
        };
        let reply = commands::dispatch(&mut ctx, id, &report[offset::COMMAND_ARGS..]);
        self.enqueue(reply);
    }

    fn identify_reply(&self) -> Report {
        let mut report = [0u8; REPORT_SIZE];
        report[0] = input::CONFIGURATION_REPLY;
        report[1] = ConfigCommand::Identify as u8;
        report[2] = 0x00;
        report[3] = self.identity.controller_type;
        report[4..10].copy_from_slice(&self.identity.mac_reversed());
        report
    }

    fn enqueue(&mut self, report: Report) {
        if self.responses.is_full() {
            if let Some(dropped) = self.responses.pop_front() {
                warn!("Reply queue full, dropping 0x{:02X} reply", dropped[0]);
                self.stats.replies_dropped += 1;
            }
        }
        // Cannot fail: a slot was freed above
        let _ = self.responses.push_back(report);
    }

    /// Run one scheduling step. Sends at most one report.
    ///
    /// Returns `true` when a report was handed to the transport.
    pub fn tick<S: ReportSink + ?Sized>(&mut self, input_state: &InputState, sink: &mut S, now_ms: u32) -> bool {
        if self.state == LinkState::Unmounted {
            return false;
        }

        if let Some(queued) = self.responses.front() {
            if !sink.is_ready() {
                return false;
            }

            let mut report = *queued;
            if report[0] == input::COMMAND_REPLY {
                report[1] = self.counter;
                report[reply::INPUTS..reply::INPUTS + INPUT_BLOCK_SIZE]
                    .copy_from_slice(&self.builder.input_block(input_state));
            }

            if !self.send(sink, &report, now_ms) {
                return false;
            }
            self.responses.pop_front();
            self.stats.replies_sent += 1;
            return true;
        }

        if self.state != LinkState::Ready {
            return false;
        }

        let elapsed = now_ms.wrapping_sub(self.last_send_ms);
        if elapsed < self.timing.min_interval_ms {
            return false;
        }

        let report = self.builder.build(input_state, self.counter, self.settings.imu_enabled);
        let changed = self
            .last_report
            .map_or(true, |last| last[2..] != report[2..] || last[0] != report[0]);
        if !changed && elapsed < self.timing.keepalive_ms {
            return false;
        }

        if !sink.is_ready() || !self.send(sink, &report, now_ms) {
            return false;
        }
        self.last_report = Some(report);
        self.stats.reports_sent += 1;
        true
    }

    fn send<S: ReportSink + ?Sized>(&mut self, sink: &mut S, report: &Report, now_ms: u32) -> bool {
        if !sink.send_report(report) {
            self.stats.send_failures += 1;
            return false;
        }
        self.counter = self.counter.wrapping_add(1);
        self.last_send_ms = now_ms;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::calibration::ControllerColors;
    use crate::hid::protocol::command;
    use crate::usb::MockReportSink;

    /// Records everything it is given
    #[derive(Default)]
    struct RecordingSink {
        sent: Vec<Report>,
        busy: bool,
    }

    impl ReportSink for RecordingSink {
        fn is_ready(&self) -> bool {
            !self.busy
        }

        fn send_report(&mut self, report: &Report) -> bool {
            self.sent.push(*report);
            true
        }
    }

    fn engine() -> ProtocolEngine {
        ProtocolEngine::new(
            DeviceIdentity::with_mac_suffix([0x01, 0x02, 0x03]),
            CalibrationStore::new(&ControllerColors::default()),
            MotionScale::default(),
            ReportTiming::default(),
        )
    }

    fn config(sub: u8) -> [u8; 2] {
        [output::CONFIGURATION, sub]
    }

    fn feature(id: u8, args: &[u8]) -> Report {
        let mut report = [0u8; REPORT_SIZE];
        report[0] = output::COMMAND;
        report[offset::COMMAND_ID] = id;
        report[offset::COMMAND_ARGS..offset::COMMAND_ARGS + args.len()].copy_from_slice(args);
        report
    }

    /// Mount, drain the identify, complete the handshake
    fn ready_engine(sink: &mut RecordingSink) -> ProtocolEngine {
        let mut e = engine();
        let neutral = InputState::neutral();
        e.on_mount();
        e.handle_output_report(&config(0x04));
        while e.pending_replies() > 0 {
            e.tick(&neutral, sink, 0);
        }
        sink.sent.clear();
        e
    }

    #[test]
    fn test_starts_unmounted_and_silent() {
        let mut e = engine();
        let mut sink = RecordingSink::default();
        assert_eq!(e.state(), LinkState::Unmounted);
        assert!(!e.tick(&InputState::neutral(), &mut sink, 100));
        assert!(sink.sent.is_empty());
    }

    #[test]
    fn test_mount_queues_identify() {
        let mut e = engine();
        let mut sink = RecordingSink::default();
        e.on_mount();
        assert_eq!(e.state(), LinkState::Mounted);

        assert!(e.tick(&InputState::neutral(), &mut sink, 0));
        let identify = sink.sent[0];
        assert_eq!(&identify[..4], &[0x81, 0x01, 0x00, 0x03]);
        assert_eq!(&identify[4..10], &[0x03, 0x02, 0x01, 0x8A, 0xBB, 0x7C]);

        // Not ready: nothing periodic
        assert!(!e.tick(&InputState::neutral(), &mut sink, 50));
    }

    #[test]
    fn test_handshake_scenario() {
        let mut e = engine();
        let mut sink = RecordingSink::default();
        let neutral = InputState::neutral();
        e.on_mount();
        e.tick(&neutral, &mut sink, 0);

        e.handle_output_report(&config(0x02));
        assert_eq!(e.state(), LinkState::Configuring);
        e.handle_output_report(&config(0x03));
        e.handle_output_report(&config(0x02));
        e.handle_output_report(&config(0x04));
        assert_eq!(e.state(), LinkState::Ready);

        for now in 2..6 {
            assert!(e.tick(&neutral, &mut sink, now));
        }
        let ids: Vec<[u8; 2]> = sink.sent.iter().map(|r| [r[0], r[1]]).collect();
        assert_eq!(ids[1..], [[0x81, 0x02], [0x81, 0x03], [0x81, 0x02], [0x30, 0x04]]);

        // Periodic reports start once the minimum interval has passed
        assert!(!e.tick(&neutral, &mut sink, 6));
        assert!(e.tick(&neutral, &mut sink, 10));
        assert_eq!(sink.sent.last().map(|r| r[0]), Some(0x30));
        assert_eq!(sink.sent.last().map(|r| r[12]), Some(0x09));
    }

    #[test]
    fn test_config_replies() {
        let mut e = engine();
        let mut sink = RecordingSink::default();
        e.handle_output_report(&config(0x05));
        e.handle_output_report(&config(0x42));
        e.tick(&InputState::neutral(), &mut sink, 0);
        e.tick(&InputState::neutral(), &mut sink, 0);
        assert_eq!(&sink.sent[0][..2], &[0x30, 0x05]);
        assert_eq!(&sink.sent[1][..2], &[0x30, 0x42]);
        assert_ne!(e.state(), LinkState::Ready);
    }

    #[test]
    fn test_end_to_end_button_a() {
        let mut sink = RecordingSink::default();
        let mut e = ready_engine(&mut sink);

        let mut decoder = crate::link::decoder::FrameDecoder::default();
        let frame = [0xAA, 0x01, 0x08, 0x01, 0x00, 0x00, 0x80, 0x80, 0x80, 0x80, 0xB4];
        let state = decoder.feed(&frame, 0).expect("frame decodes");
        assert!(state.buttons.a);
        assert_eq!(state.lx, 0x8080);

        assert!(e.tick(&state, &mut sink, 10));
        let report = sink.sent[0];
        assert_eq!(report[0], 0x30);
        assert_eq!(report[3] & 0x08, 0x08);
    }

    #[test]
    fn test_dedup_and_keepalive() {
        let mut sink = RecordingSink::default();
        let mut e = ready_engine(&mut sink);
        let neutral = InputState::neutral();

        assert!(e.tick(&neutral, &mut sink, 100));
        // Identical content inside the keepalive window
        for now in 101..105 {
            assert!(!e.tick(&neutral, &mut sink, now));
        }
        assert_eq!(sink.sent.len(), 1);

        // Keepalive forces exactly one resend
        assert!(e.tick(&neutral, &mut sink, 105));
        assert!(!e.tick(&neutral, &mut sink, 106));
        assert_eq!(sink.sent.len(), 2);
        assert_eq!(sink.sent[0][2..], sink.sent[1][2..]);
        assert_eq!(sink.sent[1][1], sink.sent[0][1].wrapping_add(1));
    }

    #[test]
    fn test_changed_content_waits_for_min_interval() {
        let mut sink = RecordingSink::default();
        let mut e = ProtocolEngine::new(
            DeviceIdentity::with_mac_suffix([0; 3]),
            CalibrationStore::default(),
            MotionScale::default(),
            ReportTiming {
                keepalive_ms: 5,
                min_interval_ms: 2,
            },
        );
        e.on_mount();
        e.handle_output_report(&config(0x04));
        e.tick(&InputState::neutral(), &mut sink, 0);
        e.tick(&InputState::neutral(), &mut sink, 0);
        sink.sent.clear();

        let mut pressed = InputState::neutral();
        assert!(e.tick(&pressed, &mut sink, 10));
        pressed.buttons.b = true;
        assert!(!e.tick(&pressed, &mut sink, 11));
        assert!(e.tick(&pressed, &mut sink, 12));
        assert_eq!(sink.sent[1][3], 0x04);
    }

    #[test]
    fn test_counter_wraps() {
        let mut sink = RecordingSink::default();
        let mut e = ready_engine(&mut sink);
        let start = e.counter();

        let mut now = 1000;
        for _ in 0..300 {
            assert!(e.tick(&InputState::neutral(), &mut sink, now));
            now += 5;
        }
        assert_eq!(e.counter(), start.wrapping_add((300 % 256) as u8));
        let counters: Vec<u8> = sink.sent.iter().map(|r| r[1]).collect();
        for pair in counters.windows(2) {
            assert_eq!(pair[1], pair[0].wrapping_add(1));
        }
    }

    #[test]
    fn test_backpressure_skips_without_advancing_counter() {
        let mut e = engine();
        e.on_mount();

        let mut sink = MockReportSink::new();
        sink.expect_is_ready().times(1).return_const(false);
        sink.expect_send_report().never();
        assert!(!e.tick(&InputState::neutral(), &mut sink, 0));
        assert_eq!(e.counter(), 0);
        assert_eq!(e.pending_replies(), 1);

        let mut sink = MockReportSink::new();
        sink.expect_is_ready().return_const(true);
        sink.expect_send_report().times(1).return_const(false);
        assert!(!e.tick(&InputState::neutral(), &mut sink, 1));
        assert_eq!(e.counter(), 0);
        assert_eq!(e.pending_replies(), 1);
        assert_eq!(e.stats().send_failures, 1);

        let mut sink = MockReportSink::new();
        sink.expect_is_ready().return_const(true);
        sink.expect_send_report()
            .withf(|report| report[0] == 0x81 && report[1] == 0x01)
            .times(1)
            .return_const(true);
        assert!(e.tick(&InputState::neutral(), &mut sink, 2));
        assert_eq!(e.counter(), 1);
        assert_eq!(e.pending_replies(), 0);
    }

    #[test]
    fn test_command_reply_carries_counter_and_inputs() {
        let mut sink = RecordingSink::default();
        let mut e = ready_engine(&mut sink);
        let counter = e.counter();

        let mut state = InputState::neutral();
        state.buttons.x = true;
        e.handle_output_report(&feature(command::GET_CONTROLLER_STATE, &[]));
        assert!(e.tick(&state, &mut sink, 10));

        let reply = sink.sent[0];
        assert_eq!(reply[0], 0x21);
        assert_eq!(reply[1], counter);
        assert_eq!(reply[2], 0xF8);
        assert_eq!(reply[3], 0x02);
        assert_eq!(&reply[13..16], &[0x80, 0x00, 0x03]);
    }

    #[test]
    fn test_spi_read_through_engine() {
        let mut sink = RecordingSink::default();
        let mut e = ready_engine(&mut sink);
        e.handle_output_report(&feature(command::SPI_READ, &[0x10, 0x80, 0x00, 0x00, 0x02]));
        e.tick(&InputState::neutral(), &mut sink, 0);
        assert_eq!(&sink.sent[0][13..22], &[0x90, 0x10, 0x10, 0x80, 0x00, 0x00, 0x02, 0xB2, 0xA1]);
    }

    #[test]
    fn test_every_rumble_write_is_forwarded() {
        let mut e = engine();
        e.on_mount();

        let mut rumble = [0u8; 10];
        rumble[0] = output::RUMBLE;
        rumble[2..10].copy_from_slice(&[0x00, 0x01, 0x40, 0x40, 0x00, 0x01, 0x40, 0x40]);
        assert_eq!(
            e.handle_output_report(&rumble),
            Some([0x00, 0x01, 0x40, 0x40, 0x00, 0x01, 0x40, 0x40])
        );
        assert!(!e.settings().vibration_enabled);

        // Command reports carry rumble too
        let forwarded = e.handle_output_report(&feature(command::GET_CONTROLLER_STATE, &[]));
        assert_eq!(forwarded, Some([0; 8]));

        // A remount does not gate rumble either
        e.on_unmount();
        e.on_mount();
        assert!(e.handle_output_report(&rumble).is_some());
    }

    #[test]
    fn test_enable_vibration_only_stores_flag() {
        let mut e = engine();
        e.on_mount();
        e.handle_output_report(&feature(command::ENABLE_VIBRATION, &[0x01]));
        assert!(e.settings().vibration_enabled);
        e.handle_output_report(&feature(command::ENABLE_VIBRATION, &[0x00]));
        assert!(!e.settings().vibration_enabled);
    }

    #[test]
    fn test_ignored_reports() {
        let mut e = engine();
        e.on_mount();
        let before = e.pending_replies();
        assert_eq!(e.handle_output_report(&[]), None);
        assert_eq!(e.handle_output_report(&[0x00, 0x01]), None);
        assert_eq!(e.handle_output_report(&[0x82, 0x01]), None);
        assert_eq!(e.pending_replies(), before);
    }

    #[test]
    fn test_queue_overflow_drops_oldest() {
        let mut e = engine();
        let mut sink = RecordingSink::default();
        e.on_mount();
        e.tick(&InputState::neutral(), &mut sink, 0);
        sink.sent.clear();

        for id in 0..6u8 {
            e.handle_output_report(&feature(0x60 + id, &[]));
        }
        assert_eq!(e.pending_replies(), RESPONSE_QUEUE_DEPTH);
        assert_eq!(e.stats().replies_dropped, 2);

        while e.tick(&InputState::neutral(), &mut sink, 0) {}
        let ids: Vec<u8> = sink.sent.iter().map(|r| r[14]).collect();
        assert_eq!(ids, vec![0x62, 0x63, 0x64, 0x65]);
    }

    #[test]
    fn test_unmount_returns_to_mounted() {
        let mut sink = RecordingSink::default();
        let mut e = ready_engine(&mut sink);
        e.handle_output_report(&feature(command::TOGGLE_IMU, &[0x01]));
        assert!(e.settings().imu_enabled);

        e.on_unmount();
        assert_eq!(e.state(), LinkState::Mounted);
        assert_eq!(e.pending_replies(), 0);
        assert!(!e.settings().imu_enabled);
        assert!(!e.tick(&InputState::neutral(), &mut sink, 500));
    }

    #[test]
    fn test_busy_sink_holds_periodic_report() {
        let mut sink = RecordingSink::default();
        let mut e = ready_engine(&mut sink);
        sink.busy = true;
        assert!(!e.tick(&InputState::neutral(), &mut sink, 100));
        sink.busy = false;
        assert!(e.tick(&InputState::neutral(), &mut sink, 101));
        assert_eq!(sink.sent.len(), 1);
    }
}
