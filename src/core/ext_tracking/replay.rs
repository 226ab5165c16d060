use std::{
    fs::File,
    io::{BufRead, BufReader},
    sync::{
        mpsc::{sync_channel, Receiver, SyncSender},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use colored::{Color, Colorize};
use once_cell::sync::Lazy;

use super::{DetectionEvent, DetectorPacket, FrameSource, TrackingGate};
use crate::core::{error::CameraError, status::StatusBar};

static STA_ON: Lazy<Arc<str>> = Lazy::new(|| format!("{}", "REPLAY".color(Color::Green)).into());
static STA_OFF: Lazy<Arc<str>> = Lazy::new(|| format!("{}", "REPLAY".color(Color::Red)).into());

/// Plays back a capture file, one detector packet per line, at a fixed rate.
pub struct ReplaySource {
    path: String,
    interval: Duration,
    packets: Arc<[DetectorPacket]>,
    sender: SyncSender<DetectionEvent>,
    receiver: Receiver<DetectionEvent>,
    last_received: Instant,
}

impl ReplaySource {
    pub fn new(path: &str, fps: f32) -> Self {
        let (sender, receiver) = sync_channel(128);
        Self {
            path: path.to_string(),
            interval: Duration::from_secs_f32(1. / fps.max(1.)),
            packets: Arc::from(Vec::new()),
            sender,
            receiver,
            last_received: Instant::now(),
        }
    }
}

fn read_capture(path: &str) -> anyhow::Result<Vec<DetectorPacket>> {
    let file = File::open(path).with_context(|| format!("open capture {}", path))?;
    let mut packets = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let packet = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: bad detector packet", path, number + 1))?;
        packets.push(packet);
    }
    Ok(packets)
}

impl FrameSource for ReplaySource {
    fn load(&mut self) -> anyhow::Result<()> {
        let packets = read_capture(&self.path)?;
        log::info!("Loaded {} packets from {}", packets.len(), self.path);
        self.packets = packets.into();
        Ok(())
    }

    fn acquire(&mut self, gate: &TrackingGate, _timeout: Duration) -> Result<(), CameraError> {
        let mut packets = self.packets.iter();
        match packets.next() {
            None => return Err(CameraError::NotFound),
            // a capture may open with the camera refusing
            Some(DetectorPacket::CameraError { reason }) => {
                return Err(CameraError::from_reason(reason))
            }
            Some(_) => {}
        }

        let packets = self.packets.clone();
        let sender = self.sender.clone();
        let gate = gate.clone();
        let generation = gate.generation();
        let interval = self.interval;

        thread::spawn(move || {
            for packet in packets.iter() {
                if !gate.accepts(generation) {
                    return;
                }
                match packet.clone().into_detection() {
                    Ok(detection) => {
                        if let Err(e) = sender.try_send(DetectionEvent {
                            generation,
                            detection,
                        }) {
                            log::warn!("Failed to queue replayed detection: {}", e);
                        }
                    }
                    Err(error) => log::warn!("Replayed camera error: {}", error),
                }
                thread::sleep(interval);
            }
            log::info!("Replay finished");
        });
        Ok(())
    }

    fn release(&mut self) {
        self.receiver.try_iter().for_each(drop);
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
