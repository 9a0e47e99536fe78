//! Command Link: request/reply channel to the drone
//!
//! One UDP socket is used for both directions. A listener thread receives
//! every datagram arriving on it and forwards those coming from the drone
//! into a small bounded mailbox; [`CommandLink::execute`] sends a command
//! and blocks on that mailbox with the command's timeout.
//!
//! # Execution rules
//!
//! - At most one command awaits a reply at a time (`exec_lock`).
//! - `rc` is fire-and-forget: it never waits for a reply, never takes the
//!   exec lock, and is rejected locally unless the drone is airborne.
//! - `takeoff` while airborne and `land` while grounded are rejected locally.
//! - After the first reply, a short secondary window catches the delayed
//!   completion notice some commands produce.
//! - Replies left in the mailbox from an earlier command are discarded
//!   before a new command is sent.
//!
//! Faults are reported inside [`CommandOutcome`]; `execute` never fails.

use crate::config::{DroneConfig, TimeoutConfig};
use crate::core::types::{CommandOutcome, FlightState, LinkFault, RcVelocity, Reply};
use crate::error::{Error, Result};
use crate::link::protocol::{CommandKind, Direction, DroneCommand, Query, TimeoutClass};
use crate::link::reply::{classify, decode, parse_numeric};
use crate::tracking::controller::VelocitySink;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Receive buffer size (one Ethernet frame)
const MAX_REPLY_SIZE: usize = 1518;

/// Mailbox depth; replies beyond this are dropped by the listener
const MAILBOX_CAPACITY: usize = 4;

/// Datagram payload, or a receive error description
type MailboxItem = std::result::Result<Vec<u8>, String>;

/// Running listener and the socket it reads
struct Session {
    socket: Arc<UdpSocket>,
    replies: Receiver<MailboxItem>,
    shutdown: Arc<AtomicBool>,
    listener: Option<JoinHandle<()>>,
}

/// Request/reply link to the drone
pub struct CommandLink {
    drone_addr: SocketAddr,
    bind_addr: SocketAddr,
    timeouts: TimeoutConfig,
    /// Serializes round-trip commands
    exec_lock: Mutex<()>,
    session: Mutex<Option<Session>>,
    flight: Arc<FlightState>,
    last_response: Mutex<String>,
    healthy: AtomicBool,
    /// Last parsed `height?` answer in dm
    last_height: AtomicU32,
}

impl CommandLink {
    /// Create a stopped link; call [`start`](Self::start) before sending
    pub fn new(drone: &DroneConfig, timeouts: &TimeoutConfig) -> Self {
        Self {
            drone_addr: drone.command_addr(),
            bind_addr: drone.local_command_addr(),
            timeouts: timeouts.clone(),
            exec_lock: Mutex::new(()),
            session: Mutex::new(None),
            flight: Arc::new(FlightState::new()),
            last_response: Mutex::new(String::new()),
            healthy: AtomicBool::new(false),
            last_height: AtomicU32::new(0),
        }
    }

    /// Bind the command socket and start the reply listener
    ///
    /// Calling `start` on a running link is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Ok(());
        }

        let socket = UdpSocket::bind(self.bind_addr)?;
        // Bounded reads so the listener notices shutdown
        socket.set_read_timeout(Some(self.timeouts.poll()))?;
        let socket = Arc::new(socket);

        let (tx, rx) = bounded(MAILBOX_CAPACITY);
        let shutdown = Arc::new(AtomicBool::new(false));

        let listener = {
            let socket = Arc::clone(&socket);
            let shutdown = Arc::clone(&shutdown);
            let drone_ip = self.drone_addr.ip();
            thread::Builder::new()
                .name("command-listener".to_string())
                .spawn(move || Self::listener_loop(socket, drone_ip, tx, shutdown))
                .map_err(|e| Error::Other(format!("Failed to spawn command listener: {}", e)))?
        };

        log::info!(
            "Command link started on {} (drone {})",
            socket.local_addr()?,
            self.drone_addr
        );

        *session = Some(Session {
            socket,
            replies: rx,
            shutdown,
            listener: Some(listener),
        });
        Ok(())
    }

    /// Stop the listener and release the socket
    ///
    /// Returns once the listener thread has exited. A command blocked in
    /// `execute` observes a receive fault.
    pub fn stop(&self) -> Result<()> {
        let Some(mut session) = self.session.lock().take() else {
            return Ok(());
        };

        log::info!("Stopping command link...");
        session.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = session.listener.take() {
            handle.join().map_err(|_| Error::ThreadPanic)?;
        }
        self.healthy.store(false, Ordering::Relaxed);
        log::info!("Command link stopped");
        Ok(())
    }

    /// Whether the listener is running
    pub fn is_started(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Local address of the bound command socket
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.session
            .lock()
            .as_ref()
            .and_then(|s| s.socket.local_addr().ok())
    }

    fn listener_loop(
        socket: Arc<UdpSocket>,
        drone_ip: IpAddr,
        tx: Sender<MailboxItem>,
        shutdown: Arc<AtomicBool>,
    ) {
        log::info!("Command listener started");
        let mut buffer = [0u8; MAX_REPLY_SIZE];

        while !shutdown.load(Ordering::Relaxed) {
            let item = match socket.recv_from(&mut buffer) {
                Ok((len, src)) => {
                    if src.ip() != drone_ip {
                        log::debug!("Ignoring {} byte datagram from {}", len, src);
                        continue;
                    }
                    log::debug!("<< reply from {}: {:?}", src, decode(&buffer[..len]));
                    Ok(buffer[..len].to_vec())
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => {
                    log::warn!("Command socket recv error: {}", e);
                    thread::sleep(Duration::from_millis(10));
                    Err(e.to_string())
                }
            };

            if tx.try_send(item).is_err() {
                log::warn!("Reply mailbox full, dropping datagram");
            }
        }

        log::info!("Command listener exiting");
    }

    /// Send a command and wait up to `timeout` for its reply
    pub fn execute(&self, command: &str, timeout: Duration) -> CommandOutcome {
        let command = command.trim();
        let outcome = match CommandKind::of(command) {
            CommandKind::FireAndForget => self.fire_and_forget(command),
            kind => self.round_trip(command, kind, timeout),
        };
        self.record(&outcome);
        outcome
    }

    /// Send a typed command with the timeout its class calls for
    pub fn send(&self, command: &DroneCommand) -> CommandOutcome {
        let text = command.to_string();
        if let Some(reason) = command.validate() {
            let outcome = CommandOutcome::rejected(&text, &reason, self.command_link_healthy());
            self.record(&outcome);
            return outcome;
        }
        let timeout = match command.timeout_class() {
            TimeoutClass::Long => self.timeouts.long(),
            TimeoutClass::Short => self.timeouts.short(),
            TimeoutClass::None => Duration::ZERO,
        };
        self.execute(&text, timeout)
    }

    fn fire_and_forget(&self, command: &str) -> CommandOutcome {
        if !self.flight.is_flying() {
            return CommandOutcome::rejected(command, "not flying", self.command_link_healthy());
        }
        let Some((socket, _)) = self.channels() else {
            return CommandOutcome::faulted(command, LinkFault::NotStarted);
        };

        log::debug!(">> send cmd: {}", command);
        match socket.send_to(command.as_bytes(), self.drone_addr) {
            Ok(_) => CommandOutcome::sent(command, self.command_link_healthy()),
            Err(e) => {
                log::warn!("Failed to send '{}': {}", command, e);
                CommandOutcome::faulted(command, LinkFault::Send(e.to_string()))
            }
        }
    }

    fn round_trip(&self, command: &str, kind: CommandKind, timeout: Duration) -> CommandOutcome {
        let _guard = self.exec_lock.lock();

        match kind {
            CommandKind::Takeoff if self.flight.is_flying() => {
                return CommandOutcome::rejected(command, "already flying", self.command_link_healthy());
            }
            CommandKind::Land if !self.flight.is_flying() => {
                return CommandOutcome::rejected(command, "not flying", self.command_link_healthy());
            }
            _ => {}
        }

        let Some((socket, replies)) = self.channels() else {
            return CommandOutcome::faulted(command, LinkFault::NotStarted);
        };

        while let Ok(stale) = replies.try_recv() {
            log::debug!("Discarding stale reply: {:?}", stale.map(|b| decode(&b)));
        }

        log::info!(">> send cmd: {}", command);
        if let Err(e) = socket.send_to(command.as_bytes(), self.drone_addr) {
            log::warn!("Failed to send '{}': {}", command, e);
            return CommandOutcome::faulted(command, LinkFault::Send(e.to_string()));
        }

        let first = match replies.recv_timeout(timeout) {
            Ok(Ok(payload)) => decode(&payload),
            Ok(Err(e)) => return CommandOutcome::faulted(command, LinkFault::Receive(e)),
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("No reply to '{}' within {:?}", command, timeout);
                return CommandOutcome::faulted(command, LinkFault::Timeout(timeout));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return CommandOutcome::faulted(
                    command,
                    LinkFault::Receive("command listener stopped".to_string()),
                );
            }
        };

        let second = secondary_reply(&replies, self.timeouts.secondary(), command);

        let reply = classify(Some(&first), second.as_deref());
        match &reply {
            Reply::Ambiguous(raw) => log::warn!("Unrecognized reply to '{}': {:?}", command, raw),
            Reply::Error | Reply::ErrorThenOk => log::warn!("Drone refused '{}'", command),
            _ => {}
        }

        let outcome = CommandOutcome::replied(command, first, second, reply);
        if outcome.acknowledged {
            match kind {
                CommandKind::Takeoff => self.flight.set_flying(true),
                CommandKind::Land => self.flight.set_flying(false),
                _ => {}
            }
        }
        outcome
    }

    fn channels(&self) -> Option<(Arc<UdpSocket>, Receiver<MailboxItem>)> {
        self.session
            .lock()
            .as_ref()
            .map(|s| (Arc::clone(&s.socket), s.replies.clone()))
    }

    fn record(&self, outcome: &CommandOutcome) {
        // Local rejections say nothing new about the link
        if !outcome.is_rejected() {
            self.healthy.store(outcome.link_healthy, Ordering::Relaxed);
        }
        // A delivered rc has no text of its own; keep the previous response
        if outcome.reply == Reply::NotExpected && outcome.fault.is_none() {
            return;
        }
        let text = outcome.response_text();
        log::debug!("'{}' -> {}", outcome.command, text);
        *self.last_response.lock() = text;
    }

    /// Last human-readable response or error text
    pub fn last_response(&self) -> String {
        self.last_response.lock().clone()
    }

    /// Whether the most recent exchange heard from the drone
    pub fn command_link_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Shared airborne flag
    pub fn flight_state(&self) -> Arc<FlightState> {
        Arc::clone(&self.flight)
    }

    pub fn is_flying(&self) -> bool {
        self.flight.is_flying()
    }

    // ---- typed commands ----

    /// Enter SDK mode
    pub fn command(&self) -> CommandOutcome {
        self.send(&DroneCommand::Command)
    }

    pub fn takeoff(&self) -> CommandOutcome {
        self.send(&DroneCommand::Takeoff)
    }

    pub fn land(&self) -> CommandOutcome {
        self.send(&DroneCommand::Land)
    }

    /// Velocity command; components are clamped to the device range
    pub fn rc(&self, left_right: i32, forward_back: i32, up_down: i32, yaw: i32) -> CommandOutcome {
        self.send(&DroneCommand::Rc(RcVelocity::new(
            left_right,
            forward_back,
            up_down,
            yaw,
        )))
    }

    pub fn streamon(&self) -> CommandOutcome {
        self.send(&DroneCommand::StreamOn)
    }

    pub fn streamoff(&self) -> CommandOutcome {
        self.send(&DroneCommand::StreamOff)
    }

    pub fn emergency(&self) -> CommandOutcome {
        self.send(&DroneCommand::Emergency)
    }

    /// Hover in place
    pub fn stop_motion(&self) -> CommandOutcome {
        self.send(&DroneCommand::Stop)
    }

    pub fn up(&self, cm: u32) -> CommandOutcome {
        self.send(&DroneCommand::Move(Direction::Up, cm))
    }

    pub fn down(&self, cm: u32) -> CommandOutcome {
        self.send(&DroneCommand::Move(Direction::Down, cm))
    }

    pub fn left(&self, cm: u32) -> CommandOutcome {
        self.send(&DroneCommand::Move(Direction::Left, cm))
    }

    pub fn right(&self, cm: u32) -> CommandOutcome {
        self.send(&DroneCommand::Move(Direction::Right, cm))
    }

    pub fn forward(&self, cm: u32) -> CommandOutcome {
        self.send(&DroneCommand::Move(Direction::Forward, cm))
    }

    pub fn back(&self, cm: u32) -> CommandOutcome {
        self.send(&DroneCommand::Move(Direction::Back, cm))
    }

    pub fn cw(&self, degrees: u32) -> CommandOutcome {
        self.send(&DroneCommand::Cw(degrees))
    }

    pub fn ccw(&self, degrees: u32) -> CommandOutcome {
        self.send(&DroneCommand::Ccw(degrees))
    }

    /// Fly to `(x, y, z)` cm relative to the current position
    pub fn go(&self, x: i32, y: i32, z: i32, speed: u32) -> CommandOutcome {
        self.send(&DroneCommand::Go { x, y, z, speed })
    }

    pub fn set_speed(&self, cm_per_s: u32) -> CommandOutcome {
        self.send(&DroneCommand::Speed(cm_per_s))
    }

    // ---- queries ----

    fn query(&self, query: Query) -> Result<f64> {
        let reply = self.send(&DroneCommand::Query(query)).into_result()?;
        parse_numeric(&reply).ok_or(Error::ProtocolAmbiguity(reply))
    }

    /// Query whose answer must be a non-negative whole number
    fn query_count(&self, query: Query) -> Result<u32> {
        let value = self.query(query)?;
        if value.fract() != 0.0 || !(0.0..=f64::from(u32::MAX)).contains(&value) {
            return Err(Error::ProtocolAmbiguity(format!(
                "expected a whole number for '{}', got {}",
                DroneCommand::Query(query),
                value
            )));
        }
        Ok(value as u32)
    }

    /// Battery level in percent
    pub fn battery(&self) -> Result<u32> {
        self.query_count(Query::Battery)
    }

    /// Motor-on time in seconds
    pub fn flight_time(&self) -> Result<u32> {
        self.query_count(Query::FlightTime)
    }

    /// Configured speed in cm/s
    pub fn speed(&self) -> Result<f64> {
        self.query(Query::Speed)
    }

    /// Height in dm
    ///
    /// Falls back to the last successfully read height (initially 0) when
    /// the query fails or its answer has no digits.
    pub fn height(&self) -> u32 {
        match self.send(&DroneCommand::Query(Query::Height)).into_result() {
            Ok(reply) => {
                let digits: String = reply.chars().filter(char::is_ascii_digit).collect();
                match digits.parse::<u32>() {
                    Ok(height) => {
                        self.last_height.store(height, Ordering::Relaxed);
                        height
                    }
                    Err(_) => self.last_height.load(Ordering::Relaxed),
                }
            }
            Err(e) => {
                log::debug!("height? failed ({}), using last value", e);
                self.last_height.load(Ordering::Relaxed)
            }
        }
    }
}

/// Wait for the delayed completion notice that may follow a reply
///
/// Absence is the common case. A receive error here does not change the
/// outcome of the command.
fn secondary_reply(
    replies: &Receiver<MailboxItem>,
    window: Duration,
    command: &str,
) -> Option<String> {
    match replies.recv_timeout(window) {
        Ok(Ok(payload)) => Some(decode(&payload)),
        Ok(Err(e)) => {
            log::warn!("Error on recv after reply to '{}': {}", command, e);
            None
        }
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => {
            log::warn!("Command listener stopped while waiting on '{}'", command);
            None
        }
    }
}

impl VelocitySink for CommandLink {
    fn send_velocity(&self, velocity: RcVelocity) -> CommandOutcome {
        self.send(&DroneCommand::Rc(velocity))
    }
}

impl Drop for CommandLink {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
