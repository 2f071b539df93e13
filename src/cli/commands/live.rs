//! `live`: visualize the default input device in the terminal.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cli::ViewArgs;
use crate::config::Config;
use crate::host::CpalInputHost;
use crate::viz::{SystemClock, Visualizer};

/// ANSI: cursor home, clear screen.
const CLEAR: &str = "\x1b[H\x1b[2J";

pub fn cmd_live(config: &Config, seconds: f32, view: &ViewArgs) -> anyhow::Result<()> {
    let host = CpalInputHost::open_default()?;
    let info = host.info();
    println!("Capturing from '{}'", host.device_name());

    let mut viz = Visualizer::new(
        info,
        config.visualizer.clone(),
        Box::new(host),
        Arc::new(SystemClock::new()),
    );
    viz.show();

    let (mut renderer, glyphs) = view.renderer();
    let frame_time = Duration::from_secs_f64(1.0 / f64::from(config.capture.fps.max(1)));
    let deadline = Instant::now() + Duration::from_secs_f32(seconds.max(0.0));
    let mut last = Instant::now();
    let mut stdout = std::io::stdout();

    while Instant::now() < deadline {
        std::thread::sleep(frame_time.saturating_sub(last.elapsed()));
        let now = Instant::now();
        viz.tick((now - last).as_secs_f32());
        last = now;

        write!(stdout, "{CLEAR}")?;
        if viz.render(&mut renderer, &glyphs) {
            writeln!(stdout, "{}", renderer.text())?;
        } else {
            writeln!(stdout, "(silent, {:?})", viz.link_status())?;
        }
        stdout.flush()?;
    }

    viz.hide();
    Ok(())
}
