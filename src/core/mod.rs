use std::{
    net::{Ipv4Addr, SocketAddr, UdpSocket},
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use indicatif::MultiProgress;
use log::info;

use self::{
    avatar::osc_engine::OscEngine,
    config::PuppetConfig,
    error::PipelineError,
    ext_tracking::FrameSource,
    session::{Pipeline, TrackingState},
    status::StatusBar,
};

pub mod avatar;
pub mod bundle;
pub mod config;
pub mod error;
pub mod expression;
pub mod ext_tracking;
pub mod folders;
pub mod session;
pub mod status;

const CAMERA_RETRY: Duration = Duration::from_secs(5);

/// Runs the pipeline against a renderer listening for OSC.
pub struct PuppetApp<S: FrameSource> {
    pipeline: Pipeline<OscEngine, S>,
    config: PuppetConfig,
    multi: MultiProgress,
}

impl<S: FrameSource> PuppetApp<S> {
    pub fn new(config: PuppetConfig, source: S, multi: MultiProgress) -> anyhow::Result<Self> {
        let renderer = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), config.renderer_port);
        let upstream = UdpSocket::bind("0.0.0.0:0").context("bind upstream socket")?;
        upstream
            .connect(renderer)
            .with_context(|| format!("connect to renderer at {}", renderer))?;
        info!("Sending avatar updates to {}", renderer);

        let pipeline = Pipeline::new(OscEngine::new(upstream), source, config.settings());
        Ok(Self {
            pipeline,
            config,
            multi,
        })
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        self.pipeline.initialize(self.config.avatar.as_deref())?;
        self.pipeline.engine_mut().flush();

        let mut status = StatusBar::new(&self.multi);
        let interval = self.config.tick_interval();
        let mut next_attempt = Instant::now();
        let mut last_tick = Instant::now();

        loop {
            if self.pipeline.state() == TrackingState::Ready && Instant::now() >= next_attempt {
                match self.pipeline.start_tracking() {
                    Ok(()) => {}
                    Err(PipelineError::Camera(e)) => {
                        log::warn!("Camera: {}. Retrying in {:?}", e, CAMERA_RETRY);
                        next_attempt = Instant::now() + CAMERA_RETRY;
                    }
                    Err(e) => return Err(e.into()),
                }
                last_tick = Instant::now();
            }

            let dt = last_tick.elapsed().as_secs_f32();
            last_tick = Instant::now();

            let report = self.pipeline.tick(dt);
            let sent = self.pipeline.engine_mut().flush();

            status.record_tick(&report, sent);
            self.pipeline.report(&mut status);
            status.display();

            thread::sleep(interval.saturating_sub(last_tick.elapsed()));
        }
    }
}
