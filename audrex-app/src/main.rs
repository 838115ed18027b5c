mod app;
mod timeline;

pub use app::App;

use anyhow::Result;
use audrex_audio::BackendPreference;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use timeline::Timeline;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "audrex", about = "Run audio button-response trials")]
struct Args {
    /// Timeline JSON with stimuli and trial parameters
    #[arg(long)]
    timeline: PathBuf,
    /// TTF/OTF font for prompts and button labels
    #[arg(long)]
    font: Option<PathBuf>,
    /// Where to write trial results as JSON (stdout if omitted)
    #[arg(long)]
    out: Option<PathBuf>,
    /// Skip the audio device and time trials on the wall clock
    #[arg(long)]
    wall_clock: bool,
    /// Blank interval between trials
    #[arg(long, default_value_t = 500)]
    iti_ms: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let timeline = Timeline::load(&args.timeline)?;
    let cache = timeline.preload()?;

    let font = match &args.font {
        Some(path) => {
            let bytes = std::fs::read(path)?;
            Some(ab_glyph::FontArc::try_from_vec(bytes)?)
        }
        None => {
            tracing::warn!("no --font given, buttons are drawn without labels");
            None
        }
    };

    let preference = if args.wall_clock {
        BackendPreference::WallClockOnly
    } else {
        BackendPreference::Auto
    };

    let app = App::new(
        timeline.trials,
        cache,
        font,
        preference,
        Duration::from_millis(args.iti_ms),
        args.out,
    );
    app.run()?;

    Ok(())
}
