use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Parser};
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use flicker_guard::brightness::{BrightnessControl, NullBrightness, SysfsBacklight};
use flicker_guard::capture::{FrameSource, SyntheticSource};
use flicker_guard::clock::SystemClock;
use flicker_guard::surface::HeadlessSurface;
use flicker_guard::{Config, Monitor};

/// Watch a screen region for flicker and dim it while it lasts.
#[derive(Debug, Parser)]
#[command(name = "flicker-guard", version, about)]
struct Args {
    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use a scripted flickering test pattern instead of the screen.
    #[arg(long)]
    simulate: bool,

    /// Sysfs backlight directory, overriding the config file.
    #[arg(long)]
    backlight: Option<PathBuf>,

    /// Write the current overlay image to this PNG file.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// More output (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_brightness(config: &Config) -> Box<dyn BrightnessControl> {
    match &config.backlight {
        Some(dir) => match SysfsBacklight::open(dir) {
            Ok(backlight) => {
                info!(
                    device = %backlight.dir().display(),
                    max = backlight.max(),
                    "using sysfs backlight"
                );
                Box::new(backlight)
            }
            Err(e) => {
                warn!(error = %e, "backlight unavailable, continuing with overlay only");
                Box::new(NullBrightness::default())
            }
        },
        None => {
            info!("no backlight configured, continuing with overlay only");
            Box::new(NullBrightness::default())
        }
    }
}

#[cfg(feature = "screen-capture")]
fn open_screen() -> anyhow::Result<Box<dyn FrameSource>> {
    let screen = flicker_guard::capture::ScreenCapture::primary()
        .context("failed to open the primary display")?;
    Ok(Box::new(screen))
}

#[cfg(not(feature = "screen-capture"))]
fn open_screen() -> anyhow::Result<Box<dyn FrameSource>> {
    anyhow::bail!("built without the `screen-capture` feature; rerun with --simulate")
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(dir) = args.backlight {
        config.backlight = Some(dir);
    }

    let source: Box<dyn FrameSource> = if args.simulate {
        info!("using simulated frame source");
        Box::new(SyntheticSource::demo())
    } else {
        open_screen()?
    };
    let brightness = open_brightness(&config);
    let mut surface = HeadlessSurface::new(config.region);
    if let Some(path) = args.snapshot {
        surface = surface.with_snapshot(path);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .context("failed to install signal handler")?;
    }

    info!(
        region = %config.region,
        threshold = config.flicker_threshold,
        frequency_hz = config.flicker_frequency,
        "monitoring {}x{} area",
        config.region.width,
        config.region.height
    );
    info!("press Ctrl+C to exit");

    let mut monitor = Monitor::new(&config, source, brightness, surface, SystemClock::new());
    monitor.run(&shutdown);

    info!("protection disabled");
    Ok(())
}
