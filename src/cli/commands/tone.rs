//! `tone`: run the pipeline against a synthetic sine on a manual clock.

use std::sync::Arc;

use crate::cli::ViewArgs;
use crate::config::Config;
use crate::host::SyntheticSource;
use crate::viz::capture::frames_to_ns;
use crate::viz::{AudioInfo, Clock, FrameKind, ManualClock, Visualizer};

/// Process `seconds` of tone in video-frame steps. Runs faster than real
/// time since the clock only moves when the loop advances it.
fn simulate(config: &Config, seconds: f32) -> Visualizer {
    let capture = &config.capture;
    let fps = u64::from(capture.fps.max(1));
    let sample_rate = capture.sample_rate.max(1);
    let clock = Arc::new(ManualClock::new());
    let source = SyntheticSource::new(
        sample_rate,
        capture.channels,
        capture.tone_frequency,
        capture.tone_amplitude,
    );
    let info = AudioInfo {
        sample_rate,
        channels: capture.channels.max(1),
    };

    let mut viz = Visualizer::new(
        info,
        config.visualizer.clone(),
        Box::new(source.host()),
        clock.clone(),
    );
    viz.show();

    let ticks = (seconds.max(0.0) * fps as f32).round() as u64;
    let origin = clock.now_ns();
    let mut delivered = 0u64;
    for tick in 1..=ticks {
        // Whole frames up to this tick, so no drift accumulates
        let due = tick * u64::from(sample_rate) / fps;
        source.pump((due - delivered) as usize, origin + frames_to_ns(delivered as usize, sample_rate));
        delivered = due;
        clock.set_ns(origin + frames_to_ns(delivered as usize, sample_rate));
        viz.tick(1.0 / fps as f32);
    }
    tracing::debug!("Simulated {} ticks, {} frames", ticks, delivered);
    viz
}

pub fn cmd_tone(config: &Config, seconds: f32, json: bool, view: &ViewArgs) -> anyhow::Result<()> {
    let viz = simulate(config, seconds);
    let frame = viz.frame();

    if json {
        println!("{}", serde_json::to_string_pretty(frame)?);
        return Ok(());
    }

    let (mut renderer, glyphs) = view.renderer();
    if viz.render(&mut renderer, &glyphs) {
        println!("{}", renderer.text());
    } else {
        println!("(silent)");
    }

    if frame.kind == FrameKind::Spectrum
        && let Some(values) = frame.channels.first()
        && let Some((bar, db)) = values
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
    {
        let (low, high) = viz.bins().bar_frequency_range(bar);
        println!(
            "Peak: bar {} ({:.0}-{:.0} Hz) at {:.1} dBFS",
            bar, low, high, db
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viz::settings::DisplayMode;

    #[test]
    fn test_simulated_tone_peaks_at_its_frequency() {
        let mut config = Config::default();
        config.capture.channels = 1;
        config.capture.tone_frequency = 2000.0;
        config.visualizer.display_mode = DisplayMode::Bar;

        let viz = simulate(&config, 0.5);
        let bars = &viz.frame().channels[0];
        let peak = bars
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        let (low, high) = viz.bins().bar_frequency_range(peak);
        assert!(low <= 2000.0 && 2000.0 < high, "{}..{}", low, high);
    }

    #[test]
    fn test_zero_seconds_stays_silent() {
        let viz = simulate(&Config::default(), 0.0);
        assert!(viz.frame().silent);
    }
}
