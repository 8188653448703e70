//! ARC AutoFire CLI
//!
//! Runs the detection session, or one of the template tools when asked.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use arc_autofire::autoclick::{ErrorCallback, InputError};
use arc_autofire::config::Overrides;
use arc_autofire::tools::{CaptureTarget, PreviewTarget, Tools};
use arc_autofire::vision::{desktop_grabber, SUPPORTED_HASH_SIZES};
use arc_autofire::{Session, SessionConfig, Settings};

/// Weapon-aware auto-fire for ARC Raiders
///
/// Equip a known weapon and hold the left mouse button to auto-fire.
/// Opening the quick menu or switching to an unknown weapon pauses it.
#[derive(Parser, Debug)]
#[command(name = "autofire", version, about)]
struct Cli {
    /// Enable debug output
    #[arg(long)]
    debug: bool,

    /// Detection loop delay in seconds
    #[arg(long)]
    loop_delay: Option<f64>,

    /// Hash distance threshold
    #[arg(long)]
    threshold: Option<u32>,

    /// Hash size, larger is more precise
    #[arg(long, value_parser = parse_hash_size)]
    hash_size: Option<u32>,

    /// Weapon capture region (slot 2)
    #[arg(long, num_args = 4, value_names = ["LEFT", "TOP", "RIGHT", "BOTTOM"], allow_negative_numbers = true)]
    weapon_region: Option<Vec<i32>>,

    /// Weapon capture region (slot 1)
    #[arg(long, num_args = 4, value_names = ["LEFT", "TOP", "RIGHT", "BOTTOM"], allow_negative_numbers = true)]
    weapon_region_alt: Option<Vec<i32>>,

    /// Menu capture region
    #[arg(long, num_args = 4, value_names = ["LEFT", "TOP", "RIGHT", "BOTTOM"], allow_negative_numbers = true)]
    menu_region: Option<Vec<i32>>,

    /// Screen width; default regions are scaled to it
    #[arg(long)]
    screen_width: Option<u32>,

    /// Screen height; default regions are scaled to it
    #[arg(long)]
    screen_height: Option<u32>,

    /// Settings file, created with defaults if missing
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Template image directory
    #[arg(long)]
    image_dir: Option<PathBuf>,

    /// Capture a new template
    #[arg(long, value_name = "TYPE")]
    capture_template: Option<CaptureTarget>,

    /// Seconds to wait before capturing a template
    #[arg(long, default_value_t = 3)]
    countdown: u64,

    /// Show live detection status
    #[arg(long, value_name = "TYPE")]
    preview: Option<PreviewTarget>,

    /// Stop the preview after this many refreshes
    #[arg(long, value_name = "N")]
    preview_frames: Option<u64>,

    /// Save the current capture and compare it with its template
    #[arg(long, value_name = "TYPE")]
    save_capture: Option<CaptureTarget>,
}

impl Cli {
    fn overrides(&self, settings: &Settings) -> Overrides {
        let region = |values: &Option<Vec<i32>>| -> Option<[i32; 4]> {
            values.as_deref().and_then(|v| v.try_into().ok())
        };

        let [width, height] = settings.regions.screen_resolution;
        let screen = (self.screen_width.is_some() || self.screen_height.is_some()).then(|| {
            (
                self.screen_width.unwrap_or(width),
                self.screen_height.unwrap_or(height),
            )
        });

        Overrides {
            loop_delay: self.loop_delay,
            threshold: self.threshold,
            hash_size: self.hash_size,
            weapon_region: region(&self.weapon_region),
            weapon_region_alt: region(&self.weapon_region_alt),
            menu_region: region(&self.menu_region),
            screen,
            image_dir: self.image_dir.clone(),
        }
    }
}

fn parse_hash_size(value: &str) -> Result<u32, String> {
    let size: u32 = value.parse().map_err(|e| format!("{}", e))?;
    if SUPPORTED_HASH_SIZES.contains(&size) {
        Ok(size)
    } else {
        Err(format!("expected one of {:?}", SUPPORTED_HASH_SIZES))
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(level)
        .format_timestamp_millis()
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> arc_autofire::Result<()> {
    let mut settings = Settings::load(&cli.config)?;
    settings.apply_overrides(&cli.overrides(&settings));

    let mut config = settings.normalize()?;
    config.debug = cli.debug;

    let stop = Arc::new(AtomicBool::new(false));

    if cli.capture_template.is_some() || cli.save_capture.is_some() || cli.preview.is_some() {
        return run_tool(cli, &config, &stop);
    }

    let on_error: ErrorCallback = Arc::new(|message: &str| {
        log::error!("Auto-click disabled: {}. Restart once the input backend works again", message);
    });
    let mut session = Session::new(config, Some(on_error))?;

    install_ctrlc(session.stop_handle());
    session.run();
    Ok(())
}

fn run_tool(cli: &Cli, config: &SessionConfig, stop: &Arc<AtomicBool>) -> arc_autofire::Result<()> {
    let grabber = desktop_grabber().ok_or_else(|| {
        InputError::Unavailable("screen capture needs the `desktop` feature".to_string())
    })?;
    let tools = Tools::new(config, grabber);

    if let Some(target) = cli.capture_template {
        tools.capture_template(target, Duration::from_secs(cli.countdown))?;
    } else if let Some(target) = cli.save_capture {
        tools.save_capture(target)?;
    } else if let Some(target) = cli.preview {
        install_ctrlc(Arc::clone(stop));
        tools.preview(target, stop, cli.preview_frames);
    }
    Ok(())
}

fn install_ctrlc(stop: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    }) {
        log::warn!("Could not install Ctrl+C handler: {}", e);
    }
}
