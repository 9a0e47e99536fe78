//! Shared helpers for integration tests
//!
//! [`FakeDrone`] is a loopback UDP responder that answers each command
//! with a scripted list of datagrams.

#![allow(dead_code)]

use drishti::config::{DroneConfig, TelemetryConfig, TimeoutConfig};
use drishti::{CommandLink, TelemetryLink};
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// One datagram the fake drone sends back
#[derive(Debug, Clone)]
pub struct Scripted {
    pub delay: Duration,
    pub payload: String,
}

/// Immediate reply
pub fn reply(payload: &str) -> Scripted {
    Scripted {
        delay: Duration::ZERO,
        payload: payload.to_string(),
    }
}

/// Reply sent `ms` milliseconds after the previous one
pub fn delayed(ms: u64, payload: &str) -> Scripted {
    Scripted {
        delay: Duration::from_millis(ms),
        payload: payload.to_string(),
    }
}

/// Answers `ok` to everything except `rc`, which gets nothing
pub fn always_ok(command: &str) -> Vec<Scripted> {
    if command.starts_with("rc ") {
        Vec::new()
    } else {
        vec![reply("ok")]
    }
}

/// Loopback drone
pub struct FakeDrone {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FakeDrone {
    pub fn spawn<F>(script: F) -> Self
    where
        F: Fn(&str) -> Vec<Scripted> + Send + 'static,
    {
        Self::spawn_on(LOCALHOST, script)
    }

    pub fn spawn_on<F>(ip: IpAddr, script: F) -> Self
    where
        F: Fn(&str) -> Vec<Scripted> + Send + 'static,
    {
        let socket = UdpSocket::bind(SocketAddr::new(ip, 0)).unwrap();
        socket
            .set_read_timeout(Some(Duration::from_millis(10)))
            .unwrap();
        let addr = socket.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = {
            let received = Arc::clone(&received);
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name("fake-drone".to_string())
                .spawn(move || {
                    let mut buffer = [0u8; 1518];
                    while !shutdown.load(Ordering::Relaxed) {
                        let Ok((len, src)) = socket.recv_from(&mut buffer) else {
                            continue;
                        };
                        let command = String::from_utf8_lossy(&buffer[..len]).to_string();
                        received.lock().push(command.clone());
                        for scripted in script(&command) {
                            thread::sleep(scripted.delay);
                            let _ = socket.send_to(scripted.payload.as_bytes(), src);
                        }
                    }
                })
                .unwrap()
        };

        Self {
            addr,
            received,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Commands received so far
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    /// Wait until at least `count` commands arrived
    pub fn wait_for_commands(&self, count: usize, timeout: Duration) -> Vec<String> {
        let deadline = Instant::now() + timeout;
        while self.received.lock().len() < count && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        self.received()
    }

    /// Command link pointed at this drone, bound to an ephemeral port
    pub fn link(&self) -> CommandLink {
        let link = CommandLink::new(&self.drone_config(), &test_timeouts());
        link.start().unwrap();
        link
    }

    pub fn drone_config(&self) -> DroneConfig {
        DroneConfig {
            ip: self.addr.ip(),
            command_port: self.addr.port(),
            local_ip: LOCALHOST,
            local_command_port: 0,
        }
    }
}

impl Drop for FakeDrone {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Short budgets so timeout tests run quickly
pub fn test_timeouts() -> TimeoutConfig {
    TimeoutConfig {
        short_ms: 300,
        long_ms: 600,
        secondary_ms: 80,
        poll_ms: 20,
    }
}

/// Started telemetry link on an ephemeral loopback port
pub fn telemetry_link() -> TelemetryLink {
    let config = TelemetryConfig {
        local_ip: LOCALHOST,
        local_port: 0,
    };
    let link = TelemetryLink::new(&config, &test_timeouts());
    link.start().unwrap();
    link
}

/// Poll `condition` until true or `timeout` elapses
pub fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}
