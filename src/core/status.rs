use std::{collections::VecDeque, sync::Arc, time::Instant};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::session::TickReport;

/// Sum of samples over the last second.
#[derive(Default)]
struct RateCounter {
    samples: VecDeque<(f32, Instant)>,
}

impl RateCounter {
    fn trip(&mut self, amount: f32) {
        self.samples.push_back((amount, Instant::now()));
        while let Some((_, time)) = self.samples.front() {
            if time.elapsed().as_secs_f32() > 1. {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn per_second(&self) -> f32 {
        let elapsed = self
            .samples
            .front()
            .map(|(_, time)| time.elapsed().as_secs_f32())
            .unwrap_or(0.);
        if elapsed <= f32::EPSILON {
            return 0.;
        }
        self.samples.iter().map(|(n, _)| n).sum::<f32>() / elapsed
    }
}

pub struct StatusBar {
    messages: Vec<Arc<str>>,
    spinner: ProgressBar,
    ticks: RateCounter,
    detections: RateCounter,
    faces: RateCounter,
    writes: RateCounter,
    sent: RateCounter,
    start: Instant,
}

impl StatusBar {
    pub fn new(multi: &MultiProgress) -> Self {
        let spinner = multi.add(ProgressBar::new_spinner());
        spinner.set_style(
            ProgressStyle::default_spinner().tick_chars("⠁⠂⠄⡀⡈⡐⡠⣀⣁⣂⣄⣌⣔⣤⣥⣦⣮⣶⣷⣿⡿⠿⢟⠟⡛⠛⠫⢋⠋⠍⡉⠉⠑⠡⢁"),
        );

        Self {
            messages: Vec::new(),
            spinner,
            ticks: RateCounter::default(),
            detections: RateCounter::default(),
            faces: RateCounter::default(),
            writes: RateCounter::default(),
            sent: RateCounter::default(),
            start: Instant::now(),
        }
    }

    /// Feeds one tick's outcome and the number of OSC messages it produced.
    pub fn record_tick(&mut self, report: &TickReport, sent: usize) {
        self.ticks.trip(1.);
        self.detections.trip(report.detections as f32);
        self.faces.trip(report.faces as f32);
        self.writes.trip(report.morph_writes as f32);
        self.sent.trip(sent as f32);
    }

    pub fn add_item(&mut self, str: Arc<str>) {
        self.messages.push(str);
    }

    pub fn display(&mut self) {
        if self.start.elapsed().as_secs() >= 1 {
            self.messages.push(format!("TICK:{:.0}/s", self.ticks.per_second()).into());
            self.messages.push(
                format!(
                    "DET:{:.0}/s FACE:{:.0}/s",
                    self.detections.per_second(),
                    self.faces.per_second()
                )
                .into(),
            );
            self.messages.push(
                format!(
                    "MORPH:{:.0}/s SEND:{:.0}/s",
                    self.writes.per_second(),
                    self.sent.per_second()
                )
                .into(),
            );
            self.spinner.set_message(self.messages.join("  "));
        } else {
            self.spinner.set_message("Initializing...");
        }
        self.spinner.tick();
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_counter_reads_zero() {
        assert_eq!(RateCounter::default().per_second(), 0.);
    }

    #[test]
    fn test_single_sample_reads_zero_not_infinity() {
        let mut counter = RateCounter::default();
        counter.trip(5.);
        assert!(counter.per_second().is_finite());
    }
}
