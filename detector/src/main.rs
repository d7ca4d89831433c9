mod filter;
mod recorder;
mod source;

use recorder::MotionLoop;
use screen_motion_common::config::Config;
use source::ScreenSource;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DEFAULT_CONFIG: &str = "config.toml";

#[tokio::main]
async fn main() {
    let explicit_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match load_config(explicit_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        threshold = config.detection.threshold,
        min_area = config.detection.min_area,
        ignore_regions = config.detection.ignore_regions.len(),
        min_capture_interval_ms = config.output.min_capture_interval_ms,
        output_dir = config.output.directory.display().to_string(),
        "starting screen motion detector"
    );

    let monitors = match tokio::task::spawn_blocking(source::list_monitors).await {
        Ok(Ok(m)) => m,
        Ok(Err(e)) => {
            error!(error = %e, "failed to enumerate monitors");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "monitor enumeration task failed");
            std::process::exit(1);
        }
    };
    for m in &monitors {
        let (pixel_width, pixel_height) = m.pixel_size();
        info!(
            index = m.index,
            width = m.width,
            height = m.height,
            pixel_width,
            pixel_height,
            x = m.x,
            y = m.y,
            primary = m.is_primary,
            "available monitor"
        );
    }

    let selection = config.capture.selection;
    let configured_index = config.capture.monitor_index;
    let prompt_monitors = monitors.clone();
    let monitor_index = match tokio::task::spawn_blocking(move || {
        source::resolve_monitor(
            selection,
            configured_index,
            &prompt_monitors,
            &mut std::io::stdin().lock(),
            &mut std::io::stdout(),
        )
    })
    .await
    {
        Ok(Ok(i)) => i,
        Ok(Err(e)) => {
            error!(error = %e, "no monitor to capture");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "monitor selection task failed");
            std::process::exit(1);
        }
    };

    let monitor = &monitors[monitor_index];
    info!(
        monitor = monitor_index,
        width = monitor.width,
        height = monitor.height,
        region = ?config.capture.region,
        "capturing monitor, press Ctrl+C to stop"
    );
    if monitor.is_scaled() && !config.detection.ignore_regions.is_empty() {
        let (pixel_width, pixel_height) = monitor.pixel_size();
        warn!(
            scale_factor = monitor.scale_factor,
            pixel_width,
            pixel_height,
            "display is scaled; ignore regions are in captured pixels, not logical points"
        );
    }

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        info!("interrupt received, stopping after the current cycle");
        signal_cancel.cancel();
    });

    let source = Arc::new(ScreenSource::new(config.capture.region));
    let motion_loop = MotionLoop::new(source, monitor_index, &config);
    match motion_loop.run(cancel).await {
        Ok(summary) => {
            info!(
                cycles = summary.cycles,
                artifacts = summary.artifacts,
                "stopped motion detection"
            );
        }
        Err(e) => {
            error!(error = %e, "motion detection stopped");
            std::process::exit(1);
        }
    }
}

/// An explicit path must exist; the default file falls back to built-in defaults.
fn load_config(explicit: Option<&Path>) -> Result<Config, String> {
    match explicit {
        Some(path) => Config::load(path)
            .map_err(|e| format!("Failed to load config from {}: {e}", path.display())),
        None => {
            let path = Path::new(DEFAULT_CONFIG);
            if path.exists() {
                Config::load(path)
                    .map_err(|e| format!("Failed to load config from {}: {e}", path.display()))
            } else {
                Ok(Config::default())
            }
        }
    }
}
