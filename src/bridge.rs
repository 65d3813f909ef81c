//! # Bridge Run Loop
//!
//! Glues the transports to the protocol core. [`Bridge::step`] performs one
//! loop iteration in a fixed order:
//!
//! 1. Service pending USB events (mount, unmount, console output reports)
//! 2. Drain every serial chunk already received through the frame decoder
//! 3. Snapshot the live input state
//! 4. Run the engine tick (at most one report sent)
//! 5. Track link state transitions for logging
//!
//! Nothing in a step waits for I/O except a rumble frame write, which is a
//! short bounded serial write.

use crate::controller::state::{InputState, LiveInput};
use crate::hid::engine::{LinkState, ProtocolEngine};
use crate::link::decoder::FrameDecoder;
use crate::rumble::RumbleForwarder;
use crate::serial::port_trait::SerialPortIO;
use crate::usb::{ReportSink, UsbEvent};
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// How often link statistics are logged
pub const STATUS_LOG_INTERVAL_MS: u32 = 10_000;

/// Observes engine state between ticks and logs changes
#[derive(Debug)]
pub struct LinkStatus {
    state: LinkState,
    last_log_ms: u32,
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self {
            state: LinkState::Unmounted,
            last_log_ms: 0,
        }
    }
}

impl LinkStatus {
    /// Record the current state; returns the previous one on change
    pub fn observe(&mut self, state: LinkState) -> Option<LinkState> {
        if state == self.state {
            return None;
        }
        let previous = std::mem::replace(&mut self.state, state);
        Some(previous)
    }

    /// Whether a periodic status line is due
    pub fn status_due(&mut self, now_ms: u32) -> bool {
        if now_ms.wrapping_sub(self.last_log_ms) < STATUS_LOG_INTERVAL_MS {
            return false;
        }
        self.last_log_ms = now_ms;
        true
    }
}

/// Owns the protocol core and the output halves of both transports
pub struct Bridge<S: ReportSink, P: SerialPortIO> {
    engine: ProtocolEngine,
    decoder: FrameDecoder,
    live: LiveInput,
    sink: S,
    rumble: RumbleForwarder<P>,
    status: LinkStatus,
}

impl<S: ReportSink, P: SerialPortIO> Bridge<S, P> {
    pub fn new(engine: ProtocolEngine, decoder: FrameDecoder, sink: S, rumble: RumbleForwarder<P>) -> Self {
        Self {
            engine,
            decoder,
            live: LiveInput::new(),
            sink,
            rumble,
            status: LinkStatus::default(),
        }
    }

    pub fn engine(&self) -> &ProtocolEngine {
        &self.engine
    }

    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }

    pub fn input(&self) -> InputState {
        self.live.snapshot()
    }

    pub fn rumble(&self) -> &RumbleForwarder<P> {
        &self.rumble
    }

    /// Run one loop iteration. Returns `true` if a report was sent.
    pub async fn step(
        &mut self,
        usb_events: &mut mpsc::Receiver<UsbEvent>,
        serial_chunks: &mut mpsc::Receiver<Bytes>,
        now_ms: u32,
    ) -> bool {
        // 1. USB transport
        while let Ok(event) = usb_events.try_recv() {
            match event {
                UsbEvent::Mounted => self.engine.on_mount(),
                UsbEvent::Unmounted => self.engine.on_unmount(),
                UsbEvent::OutputReport(data) => {
                    if let Some(payload) = self.engine.handle_output_report(&data) {
                        self.rumble.forward(&payload).await;
                    }
                }
            }
        }

        // 2. Serial input, bounded by what has already arrived
        while let Ok(chunk) = serial_chunks.try_recv() {
            if let Some(state) = self.decoder.feed(&chunk, now_ms) {
                self.live.publish(state);
            }
        }

        // 3. Snapshot
        let input = self.live.snapshot();

        // 4. Engine tick
        let sent = self.engine.tick(&input, &mut self.sink, now_ms);

        // 5. Observability
        self.observe(now_ms);

        sent
    }

    fn observe(&mut self, now_ms: u32) {
        let state = self.engine.state();
        if let Some(previous) = self.status.observe(state) {
            info!("Link state {:?} -> {:?}", previous, state);
        }

        if self.status.status_due(now_ms) {
            let engine = self.engine.stats();
            let decoder = self.decoder.stats();
            debug!(
                "Status: {:?}, reports {}, replies {}, dropped {}, send failures {}, frames {}, checksum errors {}, length errors {}, version errors {}, stale resets {}, rumble {}/{}",
                state,
                engine.reports_sent,
                engine.replies_sent,
                engine.replies_dropped,
                engine.send_failures,
                decoder.accepted,
                decoder.checksum_errors,
                decoder.length_errors,
                decoder.version_errors,
                decoder.stale_resets,
                self.rumble.sent(),
                self.rumble.failed(),
            );
        }
    }
}
