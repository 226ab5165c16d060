use std::{
    io::ErrorKind,
    net::{Ipv4Addr, SocketAddr, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{sync_channel, Receiver, SyncSender},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use colored::{Color, Colorize};
use once_cell::sync::Lazy;

use super::{DetectionEvent, DetectorPacket, FrameSource, TrackingGate};
use crate::core::{error::CameraError, status::StatusBar};

static STA_ON: Lazy<Arc<str>> =
    Lazy::new(|| format!("{}", "DETECTOR".color(Color::Green)).into());
static STA_OFF: Lazy<Arc<str>> = Lazy::new(|| format!("{}", "DETECTOR".color(Color::Red)).into());

const READ_TIMEOUT: Duration = Duration::from_millis(250);
// a full face mesh with z is about 30 KB of JSON
const MAX_PACKET: usize = 65507;

type Ready = Result<(), CameraError>;

/// The camera session packets are currently stamped for.
struct Session {
    gate: TrackingGate,
    /// Taken by the first packet of the session.
    ready: Option<SyncSender<Ready>>,
}

type SessionSlot = Arc<Mutex<Option<Session>>>;

/// Receives detector results as JSON datagrams from the browser-side
/// capture page. One receiver thread owns the socket for the lifetime of
/// the source, so no packet is lost between sessions.
pub struct UdpSource {
    port: u16,
    local_addr: Option<SocketAddr>,
    session: SessionSlot,
    shutdown: Arc<AtomicBool>,
    sender: SyncSender<DetectionEvent>,
    receiver: Receiver<DetectionEvent>,
    last_received: Instant,
}

impl UdpSource {
    pub fn new(port: u16) -> Self {
        let (sender, receiver) = sync_channel(128);
        Self {
            port,
            local_addr: None,
            session: Arc::new(Mutex::new(None)),
            shutdown: Arc::new(AtomicBool::new(false)),
            sender,
            receiver,
            last_received: Instant::now(),
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn set_session(&self, session: Option<Session>) -> Result<(), CameraError> {
        let mut slot = self
            .session
            .lock()
            .map_err(|_| CameraError::Other("detector session lock poisoned".into()))?;
        *slot = session;
        Ok(())
    }
}

impl FrameSource for UdpSource {
    fn load(&mut self) -> anyhow::Result<()> {
        if self.local_addr.is_some() {
            return Ok(());
        }
        let socket = UdpSocket::bind(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), self.port))?;
        socket.set_read_timeout(Some(READ_TIMEOUT))?;
        let local_addr = socket.local_addr()?;
        log::info!("Listening for detector packets on {}", local_addr);

        let session = self.session.clone();
        let shutdown = self.shutdown.clone();
        let sender = self.sender.clone();
        thread::spawn(move || receive_loop(socket, session, shutdown, sender));
        self.local_addr = Some(local_addr);
        Ok(())
    }

    fn acquire(&mut self, gate: &TrackingGate, timeout: Duration) -> Result<(), CameraError> {
        if self.local_addr.is_none() {
            return Err(CameraError::Unavailable);
        }

        let (ready_tx, ready_rx) = sync_channel(1);
        self.set_session(Some(Session {
            gate: gate.clone(),
            ready: Some(ready_tx),
        }))?;

        // the first packet tells us whether the page got the camera
        match ready_rx.recv_timeout(timeout) {
            Ok(ready) => ready,
            Err(_) => Err(CameraError::Timeout(timeout)),
        }
    }

    fn release(&mut self) {
        if let Err(e) = self.set_session(None) {
            log::warn!("Failed to end detector session: {}", e);
        }
        // whatever is still queued belongs to the finished session
        let dropped = self.receiver.try_iter().count();
        log::debug!("Released detector, dropped {} queued results", dropped);
    }

    fn drain(&mut self) -> Vec<DetectionEvent> {
        let events: Vec<_> = self.receiver.try_iter().collect();
        if !events.is_empty() {
            self.last_received = Instant::now();
        }
        events
    }

    fn report(&self, status: &mut StatusBar) {
        if self.last_received.elapsed() < Duration::from_secs(1) {
            status.add_item(STA_ON.clone());
        } else {
            status.add_item(STA_OFF.clone());
        }
    }
}

impl Drop for UdpSource {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

fn receive_loop(
    socket: UdpSocket,
    session: SessionSlot,
    shutdown: Arc<AtomicBool>,
    sender: SyncSender<DetectionEvent>,
) {
    let mut buf = vec![0u8; MAX_PACKET];

    while !shutdown.load(Ordering::Acquire) {
        let size = match socket.recv(&mut buf) {
            Ok(size) => size,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) => {
                log::warn!("Detector socket failed: {}", e);
                break;
            }
        };

        let packet: DetectorPacket = match serde_json::from_slice(&buf[..size]) {
            Ok(packet) => packet,
            Err(e) => {
                log::debug!("Malformed detector packet: {}", e);
                continue;
            }
        };

        let Ok(mut slot) = session.lock() else {
            log::warn!("Detector session lock poisoned, stopping receiver");
            break;
        };
        let Some(active) = slot.as_mut().filter(|s| s.gate.is_active()) else {
            log::trace!("Dropping detector packet outside a session");
            continue;
        };
        let generation = active.gate.generation();

        match packet.into_detection() {
            Ok(detection) => {
                if let Some(ready) = active.ready.take() {
                    let _ = ready.try_send(Ok(()));
                }
                if let Err(e) = sender.try_send(DetectionEvent {
                    generation,
                    detection,
                }) {
                    log::warn!("Failed to queue detection: {}", e);
                }
            }
            Err(error) => match active.ready.take() {
                Some(ready) => {
                    let _ = ready.try_send(Err(error));
                }
                None => log::warn!("Camera error while tracking: {}", error),
            },
        }
    }
    log::debug!("Detector receiver stopped");
}
