//! # Linux HID Gadget Transport
//!
//! Runs the console-facing side on a board with a USB device controller
//! (UDC) through the kernel's `f_hid` gadget function.
//!
//! ## Pieces
//!
//! - [`configure_gadget`] builds the gadget in configfs (VID/PID, strings,
//!   HID function with the report descriptor) and binds it to the UDC
//! - A reader task turns each read of `/dev/hidgN` into
//!   [`UsbEvent::OutputReport`]
//! - A writer task drains reports queued through [`ChannelSink`]
//! - A monitor task polls `/sys/class/udc/<udc>/state` and emits
//!   [`UsbEvent::Mounted`] / [`UsbEvent::Unmounted`] on change

use super::{ReportSink, UsbEvent};
use crate::error::{BridgeError, Result};
use crate::hid::descriptor::{
    DEVICE_RELEASE, MANUFACTURER, PRODUCT, PRODUCT_ID, REPORT_DESCRIPTOR, SERIAL_NUMBER, VENDOR_ID,
};
use crate::hid::protocol::{Report, REPORT_SIZE};
use bytes::BytesMut;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// configfs mount point
pub const CONFIGFS_ROOT: &str = "/sys/kernel/config";

/// Where UDCs are listed
pub const UDC_CLASS_DIR: &str = "/sys/class/udc";

/// Gadget directory name under `usb_gadget/`
pub const GADGET_NAME: &str = "procon";

/// Reports the writer task may hold before the sink reports busy
pub const WRITE_QUEUE_DEPTH: usize = 2;

/// Transport events buffered for the run loop
pub const EVENT_QUEUE_DEPTH: usize = 32;

/// Pause after a failed read of the HID device (host not attached yet)
const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

/// USB language id for English (US)
const LANG_EN_US: &str = "0x409";

/// Build the gadget under `configfs_root` and bind it to `udc`.
///
/// An existing gadget with the same name is left in place and only
/// rebound, so restarting the bridge does not require a cleanup step.
pub async fn configure_gadget(configfs_root: &Path, udc: &str) -> Result<PathBuf> {
    let gadget = configfs_root.join("usb_gadget").join(GADGET_NAME);
    let function = gadget.join("functions").join("hid.usb0");
    let config = gadget.join("configs").join("c.1");

    if gadget.join("UDC").exists() {
        info!("Gadget {} already exists, rebinding", gadget.display());
    } else {
        info!("Creating gadget {}", gadget.display());

        write_attr(&gadget, "idVendor", format!("0x{:04x}", VENDOR_ID)).await?;
        write_attr(&gadget, "idProduct", format!("0x{:04x}", PRODUCT_ID)).await?;
        write_attr(&gadget, "bcdDevice", format!("0x{:04x}", DEVICE_RELEASE)).await?;
        write_attr(&gadget, "bcdUSB", "0x0200").await?;

        let strings = gadget.join("strings").join(LANG_EN_US);
        write_attr(&strings, "manufacturer", MANUFACTURER).await?;
        write_attr(&strings, "product", PRODUCT).await?;
        write_attr(&strings, "serialnumber", SERIAL_NUMBER).await?;

        write_attr(&function, "protocol", "0").await?;
        write_attr(&function, "subclass", "0").await?;
        write_attr(&function, "report_length", REPORT_SIZE.to_string()).await?;
        write_attr(&function, "report_desc", REPORT_DESCRIPTOR).await?;

        write_attr(&config.join("strings").join(LANG_EN_US), "configuration", PRODUCT).await?;
        write_attr(&config, "MaxPower", "500").await?;

        let link = config.join("hid.usb0");
        if !link.exists() {
            tokio::fs::symlink(&function, &link).await?;
        }
    }

    write_attr(&gadget, "UDC", udc).await?;
    info!("Gadget bound to UDC {}", udc);
    Ok(gadget)
}

async fn write_attr(dir: &Path, name: &str, value: impl AsRef<[u8]>) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(name);
    tokio::fs::write(&path, value)
        .await
        .map_err(|e| BridgeError::Gadget(format!("Failed to write {}: {}", path.display(), e)))
}

/// First UDC listed in `class_dir`
pub async fn find_udc(class_dir: &Path) -> Result<String> {
    let mut entries = tokio::fs::read_dir(class_dir)
        .await
        .map_err(|e| BridgeError::Gadget(format!("Cannot list {}: {}", class_dir.display(), e)))?;

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();

    names
        .into_iter()
        .next()
        .ok_or_else(|| BridgeError::Gadget(format!("No UDC found in {}", class_dir.display())))
}

/// [`ReportSink`] feeding a bounded channel drained by the writer task.
///
/// Busy whenever the channel is full, so the engine's backpressure path
/// follows the device's actual write speed.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Report>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Report>) -> Self {
        Self { tx }
    }
}

impl ReportSink for ChannelSink {
    fn is_ready(&self) -> bool {
        self.tx.capacity() > 0
    }

    fn send_report(&mut self, report: &Report) -> bool {
        self.tx.try_send(*report).is_ok()
    }
}

/// Tracks the UDC state file and reports edges
#[derive(Debug, Default)]
pub struct MountTracker {
    configured: bool,
}

impl MountTracker {
    pub fn is_mounted(&self) -> bool {
        self.configured
    }

    /// Feed the current state string; returns an event on change.
    ///
    /// `suspended` keeps the previous mount state: a sleeping console resumes
    /// without repeating the handshake.
    pub fn update(&mut self, state: &str) -> Option<UsbEvent> {
        let configured = match state.trim() {
            "configured" => true,
            "suspended" => self.configured,
            _ => false,
        };
        if configured == self.configured {
            return None;
        }

        self.configured = configured;
        debug!("UDC state: {}", state.trim());
        Some(if configured { UsbEvent::Mounted } else { UsbEvent::Unmounted })
    }
}

/// Poll `state_path` and send mount edges until the receiver goes away
pub async fn monitor_udc_state(state_path: PathBuf, poll: Duration, tx: mpsc::Sender<UsbEvent>) {
    let mut tracker = MountTracker::default();
    let mut ticker = tokio::time::interval(poll);

    loop {
        ticker.tick().await;

        let state = match tokio::fs::read_to_string(&state_path).await {
            Ok(state) => state,
            Err(e) => {
                debug!("Cannot read {}: {}", state_path.display(), e);
                String::from("not attached")
            }
        };

        if let Some(event) = tracker.update(&state) {
            if tx.send(event).await.is_err() {
                break;
            }
        }
    }
}

/// Read console output reports until the receiver goes away.
///
/// Each successful read is one report. Read failures (typically the host not
/// being attached) are retried after a short pause.
pub async fn read_output_reports<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::Sender<UsbEvent>) {
    let mut buf = BytesMut::with_capacity(REPORT_SIZE);

    loop {
        buf.clear();
        buf.reserve(REPORT_SIZE);
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                debug!("HID device returned EOF");
                break;
            }
            Ok(_) => {
                if tx.send(UsbEvent::OutputReport(buf.split().freeze())).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("HID read failed: {}", e);
                tokio::time::sleep(READ_RETRY_DELAY).await;
            }
        }
    }
}

/// Write queued reports to the HID device until the sender side closes
pub async fn write_input_reports<W: AsyncWrite + Unpin>(mut writer: W, mut rx: mpsc::Receiver<Report>) {
    while let Some(report) = rx.recv().await {
        let result = match writer.write_all(&report).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            warn!("HID write of 0x{:02X} report failed: {}", report[0], e);
        }
    }
}

/// Running gadget transport
pub struct HidGadget {
    pub sink: ChannelSink,
    pub events: mpsc::Receiver<UsbEvent>,
    pub tasks: GadgetTasks,
}

/// Background tasks of a running gadget
#[derive(Debug)]
pub struct GadgetTasks(Vec<JoinHandle<()>>);

impl GadgetTasks {
    /// Stop all transport tasks
    pub fn shutdown(self) {
        for task in self.0 {
            task.abort();
        }
    }
}

impl HidGadget {
    /// Open `device` and start the reader, writer and UDC monitor tasks
    ///
    /// # Arguments
    ///
    /// * `device` - HID gadget node (e.g. /dev/hidg0)
    /// * `udc_state` - UDC state file (e.g. /sys/class/udc/fe980000.usb/state)
    /// * `poll` - UDC state polling period
    pub async fn start(device: &Path, udc_state: PathBuf, poll: Duration) -> Result<Self> {
        let open_err = |e: std::io::Error| BridgeError::Gadget(format!("Failed to open {}: {}", device.display(), e));
        let reader = tokio::fs::File::open(device).await.map_err(open_err)?;
        let writer = tokio::fs::OpenOptions::new()
            .write(true)
            .open(device)
            .await
            .map_err(open_err)?;
        info!("Opened HID gadget {}", device.display());

        let (event_tx, events) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let (report_tx, report_rx) = mpsc::channel(WRITE_QUEUE_DEPTH);

        let tasks = GadgetTasks(vec![
            tokio::spawn(read_output_reports(reader, event_tx.clone())),
            tokio::spawn(write_input_reports(writer, report_rx)),
            tokio::spawn(monitor_udc_state(udc_state, poll, event_tx)),
        ]);

        Ok(Self {
            sink: ChannelSink::new(report_tx),
            events,
            tasks,
        })
    }
}

/// State file of `udc`
pub fn udc_state_path(udc: &str) -> PathBuf {
    Path::new(UDC_CLASS_DIR).join(udc).join("state")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_configure_gadget_builds_tree() {
        let root = TempDir::new().unwrap();
        let gadget = configure_gadget(root.path(), "fe980000.usb").await.unwrap();

        let read = |p: &str| std::fs::read(gadget.join(p)).unwrap();
        assert_eq!(read("idVendor"), b"0x057e");
        assert_eq!(read("idProduct"), b"0x2009");
        assert_eq!(read("strings/0x409/product"), b"Pro Controller");
        assert_eq!(read("functions/hid.usb0/report_length"), b"64");
        assert_eq!(read("functions/hid.usb0/report_desc"), REPORT_DESCRIPTOR.to_vec());
        assert_eq!(read("UDC"), b"fe980000.usb");
        assert!(gadget.join("configs/c.1/hid.usb0").exists());
    }

    #[tokio::test]
    async fn test_configure_gadget_twice_rebinds() {
        let root = TempDir::new().unwrap();
        configure_gadget(root.path(), "udc.0").await.unwrap();
        let gadget = configure_gadget(root.path(), "udc.1").await.unwrap();
        assert_eq!(std::fs::read(gadget.join("UDC")).unwrap(), b"udc.1");
    }

    #[tokio::test]
    async fn test_find_udc() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(find_udc(dir.path()).await, Err(BridgeError::Gadget(_))));

        std::fs::create_dir(dir.path().join("musb-hdrc.1")).unwrap();
        std::fs::create_dir(dir.path().join("fe980000.usb")).unwrap();
        assert_eq!(find_udc(dir.path()).await.unwrap(), "fe980000.usb");
    }

    #[test]
    fn test_mount_tracker_edges() {
        let mut tracker = MountTracker::default();
        assert_eq!(tracker.update("not attached\n"), None);
        assert_eq!(tracker.update("configured\n"), Some(UsbEvent::Mounted));
        assert_eq!(tracker.update("configured\n"), None);
        assert!(tracker.is_mounted());
        assert_eq!(tracker.update("not attached\n"), Some(UsbEvent::Unmounted));
        assert!(!tracker.is_mounted());
    }

    #[test]
    fn test_mount_tracker_survives_suspend() {
        let mut tracker = MountTracker::default();
        assert_eq!(tracker.update("configured\n"), Some(UsbEvent::Mounted));
        assert_eq!(tracker.update("suspended\n"), None);
        assert!(tracker.is_mounted());
        assert_eq!(tracker.update("configured\n"), None);
        assert!(tracker.is_mounted());
    }

    #[test]
    fn test_mount_tracker_unmounts_on_lower_states() {
        for state in ["not attached", "default", "addressed"] {
            let mut tracker = MountTracker::default();
            tracker.update("configured");
            assert_eq!(tracker.update(state), Some(UsbEvent::Unmounted), "{}", state);
        }

        // Suspended before ever configuring is not a mount
        let mut tracker = MountTracker::default();
        assert_eq!(tracker.update("suspended"), None);
        assert!(!tracker.is_mounted());
    }

    #[test]
    fn test_channel_sink_backpressure() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut sink = ChannelSink::new(tx);
        let report = [0x30; REPORT_SIZE];

        assert!(sink.is_ready());
        assert!(sink.send_report(&report));
        assert!(!sink.is_ready());
        assert!(!sink.send_report(&report));

        assert_eq!(rx.try_recv().unwrap()[0], 0x30);
        assert!(sink.is_ready());
    }

    #[tokio::test]
    async fn test_read_output_reports() {
        let reader = tokio_test::io::Builder::new()
            .read(&[0x80, 0x02])
            .read(&[0x01, 0x00, 0x00])
            .build();
        let (tx, mut rx) = mpsc::channel(4);

        read_output_reports(reader, tx).await;

        assert_eq!(
            rx.recv().await,
            Some(UsbEvent::OutputReport(Bytes::from_static(&[0x80, 0x02])))
        );
        assert_eq!(
            rx.recv().await,
            Some(UsbEvent::OutputReport(Bytes::from_static(&[0x01, 0x00, 0x00])))
        );
    }

    #[tokio::test]
    async fn test_write_input_reports() {
        let first = [0x81; REPORT_SIZE];
        let second = [0x30; REPORT_SIZE];
        let writer = tokio_test::io::Builder::new().write(&first).write(&second).build();
        let (tx, rx) = mpsc::channel(2);

        tx.send(first).await.unwrap();
        tx.send(second).await.unwrap();
        drop(tx);

        write_input_reports(writer, rx).await;
    }

    #[tokio::test]
    async fn test_monitor_reports_mount() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join("state");
        std::fs::write(&state, "configured\n").unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        let task = tokio::spawn(monitor_udc_state(state.clone(), Duration::from_millis(5), tx));

        assert_eq!(rx.recv().await, Some(UsbEvent::Mounted));
        std::fs::write(&state, "not attached\n").unwrap();
        assert_eq!(rx.recv().await, Some(UsbEvent::Unmounted));

        task.abort();
    }

    #[test]
    fn test_udc_state_path() {
        assert_eq!(
            udc_state_path("fe980000.usb"),
            PathBuf::from("/sys/class/udc/fe980000.usb/state")
        );
    }
}
