//! Telemetry Link: unsolicited status stream from the drone
//!
//! The drone pushes a status line several times per second to a fixed
//! local port:
//!
//! ```text
//! pitch:0;roll:0;yaw:0;vgx:0;vgy:0;vgz:0;templ:60;temph:62;tof:10;h:0;bat:87;baro:-45.2;time:0;agx:2.0;agy:-3.0;agz:-999.0;
//! ```
//!
//! The receiver thread decodes each datagram and publishes it as the
//! latest [`TelemetrySnapshot`]. Readers never block the receiver.
//! Nothing here correlates with commands, and a receive error only clears
//! the healthy flag.

use crate::config::{TelemetryConfig, TimeoutConfig};
use crate::error::{Error, Result};
use crate::link::reply::decode;
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const MAX_STATUS_SIZE: usize = 1518;

/// One decoded status datagram
#[derive(Debug, Clone)]
pub struct TelemetrySnapshot {
    /// Decoded payload as received
    pub raw: String,
    /// `key:value` pairs
    pub fields: BTreeMap<String, String>,
    pub received_at: Instant,
    /// Packet number since the link started (1-based)
    pub sequence: u64,
}

impl TelemetrySnapshot {
    fn new(raw: String, sequence: u64) -> Self {
        let fields = parse_status(&raw);
        Self {
            raw,
            fields,
            received_at: Instant::now(),
            sequence,
        }
    }

    /// Raw text of a field
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Battery percentage (`bat`)
    pub fn battery(&self) -> Option<u32> {
        self.field("bat")?.parse().ok()
    }

    /// Height above takeoff point in cm (`h`)
    pub fn height_cm(&self) -> Option<i32> {
        self.field("h")?.parse().ok()
    }

    /// Time since this snapshot arrived
    pub fn age(&self) -> Duration {
        self.received_at.elapsed()
    }
}

/// Split a `key:value;key:value;` status line into its fields
///
/// Segments without a `:` are skipped.
pub fn parse_status(status: &str) -> BTreeMap<String, String> {
    status
        .trim()
        .split(';')
        .filter_map(|pair| {
            let (key, value) = pair.split_once(':')?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Datagram input read by the receiver thread
///
/// Reads must return within a bounded time (`WouldBlock` or `TimedOut`
/// when idle) so the thread notices a stop request.
pub trait StatusSocket: Send + 'static {
    fn recv_status(&mut self, buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

impl StatusSocket for UdpSocket {
    fn recv_status(&mut self, buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.recv_from(buffer)
    }
}

/// State shared between the link and its receiver thread
#[derive(Default)]
struct Shared {
    latest: ArcSwapOption<TelemetrySnapshot>,
    healthy: AtomicBool,
    packets: AtomicU64,
    errors: AtomicU64,
}

struct Receiver {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Receiver for the telemetry stream
pub struct TelemetryLink {
    bind_addr: SocketAddr,
    poll: Duration,
    shared: Arc<Shared>,
    receiver: Mutex<Option<Receiver>>,
}

impl TelemetryLink {
    pub fn new(config: &TelemetryConfig, timeouts: &TimeoutConfig) -> Self {
        Self {
            bind_addr: config.bind_addr(),
            poll: timeouts.poll(),
            shared: Arc::new(Shared::default()),
            receiver: Mutex::new(None),
        }
    }

    /// Bind the telemetry socket and start receiving
    pub fn start(&self) -> Result<()> {
        let mut receiver = self.receiver.lock();
        if receiver.is_some() {
            return Ok(());
        }

        let socket = UdpSocket::bind(self.bind_addr)?;
        socket.set_read_timeout(Some(self.poll))?;
        let local_addr = socket.local_addr()?;

        *receiver = Some(self.spawn_receiver(socket, local_addr)?);
        Ok(())
    }

    /// Start receiving from an already open socket
    ///
    /// No-op while the link is running (`socket` is dropped).
    pub fn start_with<S: StatusSocket>(&self, socket: S, local_addr: SocketAddr) -> Result<()> {
        let mut receiver = self.receiver.lock();
        if receiver.is_some() {
            return Ok(());
        }
        *receiver = Some(self.spawn_receiver(socket, local_addr)?);
        Ok(())
    }

    fn spawn_receiver<S: StatusSocket>(&self, socket: S, local_addr: SocketAddr) -> Result<Receiver> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = {
            let shutdown = Arc::clone(&shutdown);
            let shared = Arc::clone(&self.shared);
            thread::Builder::new()
                .name("telemetry-receiver".to_string())
                .spawn(move || Self::receive_loop(socket, shared, shutdown))
                .map_err(|e| Error::Other(format!("Failed to spawn telemetry receiver: {}", e)))?
        };

        log::info!("Telemetry link listening on {}", local_addr);
        Ok(Receiver {
            local_addr,
            shutdown,
            handle: Some(handle),
        })
    }

    /// Stop receiving and release the socket
    ///
    /// The last snapshot stays readable.
    pub fn stop(&self) -> Result<()> {
        let Some(mut receiver) = self.receiver.lock().take() else {
            return Ok(());
        };
        receiver.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = receiver.handle.take() {
            handle.join().map_err(|_| Error::ThreadPanic)?;
        }
        self.shared.healthy.store(false, Ordering::Relaxed);
        log::info!("Telemetry link stopped");
        Ok(())
    }

    fn receive_loop<S: StatusSocket>(mut socket: S, shared: Arc<Shared>, shutdown: Arc<AtomicBool>) {
        log::info!("Telemetry receiver started");
        let mut buffer = [0u8; MAX_STATUS_SIZE];

        while !shutdown.load(Ordering::Relaxed) {
            match socket.recv_status(&mut buffer) {
                Ok((len, src)) => {
                    let sequence = shared.packets.fetch_add(1, Ordering::Relaxed) + 1;
                    let snapshot = TelemetrySnapshot::new(decode(&buffer[..len]), sequence);
                    log::trace!("Telemetry #{} from {}: {}", sequence, src, snapshot.raw.trim());
                    shared.latest.store(Some(Arc::new(snapshot)));
                    shared.healthy.store(true, Ordering::Relaxed);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) => {
                    let errors = shared.errors.fetch_add(1, Ordering::Relaxed) + 1;
                    shared.healthy.store(false, Ordering::Relaxed);
                    log::warn!("Telemetry recv error #{}: {}", errors, e);
                    thread::sleep(Duration::from_millis(10));
                }
            }
        }

        log::info!("Telemetry receiver exiting");
    }

    /// Latest snapshot, if any packet has arrived
    pub fn latest(&self) -> Option<Arc<TelemetrySnapshot>> {
        self.shared.latest.load_full()
    }

    /// Latest raw status string, if any
    pub fn latest_status(&self) -> Option<String> {
        self.latest().map(|s| s.raw.clone())
    }

    /// Whether the last receive attempt delivered a packet
    pub fn is_healthy(&self) -> bool {
        self.shared.healthy.load(Ordering::Relaxed)
    }

    /// Packets received since construction
    pub fn packet_count(&self) -> u64 {
        self.shared.packets.load(Ordering::Relaxed)
    }

    /// Receive errors since construction
    pub fn error_count(&self) -> u64 {
        self.shared.errors.load(Ordering::Relaxed)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.receiver.lock().as_ref().map(|r| r.local_addr)
    }
}

impl Drop for TelemetryLink {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
