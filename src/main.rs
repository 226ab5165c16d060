use env_logger::Env;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;

use crate::core::{
    avatar::{aliases::print_aliases, manifest::list_avatars},
    config::PuppetConfig,
    ext_tracking::{replay::ReplaySource, udp::UdpSource},
    PuppetApp,
};

mod core;

fn main() -> anyhow::Result<()> {
    let logger = env_logger::Builder::from_env(Env::default().default_filter_or("info")).build();
    let level = logger.filter();
    let multi = MultiProgress::new();
    LogWrapper::new(multi.clone(), logger).try_init()?;
    log::set_max_level(level);

    let config = PuppetConfig::load();
    print_aliases();
    for (name, path) in list_avatars() {
        log::info!("Found avatar {} at {}", name, path);
    }

    // a capture file on the command line replaces the live detector
    match std::env::args().nth(1) {
        Some(capture) => {
            let source = ReplaySource::new(&capture, config.replay_fps);
            PuppetApp::new(config, source, multi)?.run()
        }
        None => {
            let source = UdpSource::new(config.listen_port);
            PuppetApp::new(config, source, multi)?.run()
        }
    }
}
