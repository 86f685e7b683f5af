//! Vehicle link over UDP, one framed message per datagram.

use std::io::ErrorKind;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::VehicleConfig;
use crate::telemetry::TelemetrySnapshot;

use super::codec::{self, MAX_FRAME_LEN};
use super::messages::LinkMessage;
use super::vehicle::{ListenerId, ListenerRegistry, MessageCallback, MessagePredicate, VehicleLink};

/// Socket read timeout. Bounds how long the receiver takes to notice shutdown.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Poll interval while waiting for the first telemetry message.
const CONNECT_POLL: Duration = Duration::from_millis(50);

pub struct UdpLink {
    /// Connected to the autopilot; shared by sender and receive thread.
    socket: UdpSocket,

    /// Latest telemetry, replaced on every telemetry frame.
    telemetry: RwLock<Option<TelemetrySnapshot>>,
    listeners: ListenerRegistry,

    /// Cleared on shutdown to stop the receive thread.
    running: AtomicBool,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl UdpLink {
    /// Bind, start the receive thread and wait for the autopilot to report
    /// telemetry. Fails if nothing arrives within the connect timeout.
    pub fn connect(config: &VehicleConfig) -> Result<Arc<Self>> {
        let Some(remote) = config.address.as_deref() else {
            bail!("vehicle link address not configured");
        };

        let socket = UdpSocket::bind(&config.bind)
            .with_context(|| format!("Failed to bind vehicle link socket on {}", config.bind))?;
        socket
            .connect(remote)
            .with_context(|| format!("Failed to target vehicle at {}", remote))?;

        let link = Self::start(socket)?;

        let deadline = Instant::now() + Duration::from_millis(config.connect_timeout_ms);
        while link.read_telemetry().is_none() {
            if Instant::now() >= deadline {
                link.shutdown();
                bail!(
                    "no telemetry from vehicle at {} within {} ms",
                    remote,
                    config.connect_timeout_ms
                );
            }
            thread::sleep(CONNECT_POLL);
        }
        info!(remote, "vehicle link established");
        Ok(link)
    }

    /// Wrap an already connected socket and spawn the receive thread.
    pub fn start(socket: UdpSocket) -> Result<Arc<Self>> {
        let rx_socket = socket.try_clone().context("Failed to clone link socket")?;
        rx_socket.set_read_timeout(Some(READ_TIMEOUT))?;
        let link = Arc::new(Self {
            socket,
            telemetry: RwLock::new(None),
            listeners: ListenerRegistry::new(),
            running: AtomicBool::new(true),
            receiver: Mutex::new(None),
        });

        let weak = Arc::downgrade(&link);
        let handle = thread::Builder::new()
            .name("vehicle-link-rx".into())
            .spawn(move || receive_loop(rx_socket, weak))
            .context("Failed to spawn link receiver")?;
        *link.receiver.lock() = Some(handle);
        Ok(link)
    }

    /// Stop the receive thread. Further inbound traffic is ignored.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.receiver.lock().take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    fn handle_frame(&self, frame: &[u8]) {
        match codec::decode(frame) {
            Ok(message) => {
                if let LinkMessage::Telemetry(snapshot) = &message {
                    *self.telemetry.write() = Some(*snapshot);
                }
                self.listeners.dispatch(&message);
            }
            Err(e) => debug!("dropping malformed frame: {}", e),
        }
    }
}

fn receive_loop(socket: UdpSocket, link: Weak<UdpLink>) {
    let mut buf = vec![0u8; MAX_FRAME_LEN];
    loop {
        let result = socket.recv(&mut buf);
        let Some(link) = link.upgrade() else {
            break;
        };
        if !link.running.load(Ordering::SeqCst) {
            break;
        }
        match result {
            Ok(n) => link.handle_frame(&buf[..n]),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => {
                // ICMP unreachable surfaces here while the autopilot is down
                debug!("vehicle link receive error: {}", e);
                thread::sleep(READ_TIMEOUT);
            }
        }
    }
    debug!("vehicle link receiver stopped");
}

impl VehicleLink for UdpLink {
    fn read_telemetry(&self) -> Option<TelemetrySnapshot> {
        *self.telemetry.read()
    }

    fn send(&self, message: &LinkMessage) -> Result<()> {
        let frame = codec::encode(message)?;
        let written = self
            .socket
            .send(&frame)
            .with_context(|| format!("Failed to send message {}", message.id()))?;
        if written != frame.len() {
            warn!(written, expected = frame.len(), "short datagram write");
        }
        Ok(())
    }

    fn subscribe(&self, predicate: MessagePredicate, callback: MessageCallback) -> ListenerId {
        self.listeners.subscribe(predicate, callback)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }
}

impl Drop for UdpLink {
    fn drop(&mut self) {
        self.shutdown();
    }
}
