use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use screen_motion_common::config::MonitorSelection;
use screen_motion_common::frame::{Frame, FrameError, Region};
use screenshots::Screen;
use tracing::debug;

/// Acquires still frames of a monitor.
///
/// Implementations must always hand out RGB8 frames of the same layout so
/// consecutive captures can be diffed. `capture` is a blocking call; the
/// motion loop runs it on the blocking pool via [`capture_with_timeout`].
pub trait FrameSource: Send + Sync + 'static {
    fn capture(&self, monitor_index: usize) -> Result<Frame, CaptureError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture unavailable: no monitors found")]
    NoMonitors,
    #[error("capture unavailable: monitor {index} does not exist ({available} available)")]
    NoSuchMonitor { index: usize, available: usize },
    #[error("capture unavailable: region {region:?} exceeds monitor bounds {width}x{height}")]
    RegionOutOfBounds {
        region: Region,
        width: u32,
        height: u32,
    },
    #[error("capture unavailable: {0}")]
    Backend(String),
    #[error("capture unavailable: no frame within {0:?}")]
    Timeout(Duration),
    #[error("capture unavailable: {0}")]
    Frame(#[from] FrameError),
    #[error("failed to read monitor selection: {0}")]
    Prompt(std::io::Error),
    #[error("monitor selection aborted (end of input)")]
    SelectionAborted,
}

/// One display as reported by the capture backend.
///
/// Position and size are in logical points; captured frames come back in
/// physical pixels, `scale_factor` times larger.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorInfo {
    pub index: usize,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub scale_factor: f32,
    pub is_primary: bool,
}

impl MonitorInfo {
    /// Size of a full-monitor frame in pixels. Ignore regions use this geometry.
    pub fn pixel_size(&self) -> (u32, u32) {
        let scale = if self.scale_factor > 0.0 {
            self.scale_factor
        } else {
            1.0
        };
        (
            (self.width as f32 * scale).round() as u32,
            (self.height as f32 * scale).round() as u32,
        )
    }

    pub fn is_scaled(&self) -> bool {
        self.pixel_size() != (self.width, self.height)
    }
}

pub fn list_monitors() -> Result<Vec<MonitorInfo>, CaptureError> {
    let screens = Screen::all().map_err(|e| CaptureError::Backend(e.to_string()))?;
    Ok(screens
        .iter()
        .enumerate()
        .map(|(index, screen)| {
            let info = &screen.display_info;
            MonitorInfo {
                index,
                x: info.x,
                y: info.y,
                width: info.width,
                height: info.height,
                scale_factor: info.scale_factor,
                is_primary: info.is_primary,
            }
        })
        .collect())
}

/// Pick the monitor to sample.
///
/// `Prompt` keeps asking on `input` until a valid index is entered and fails
/// with `SelectionAborted` at end of input.
pub fn resolve_monitor(
    selection: MonitorSelection,
    configured_index: usize,
    monitors: &[MonitorInfo],
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<usize, CaptureError> {
    if monitors.is_empty() {
        return Err(CaptureError::NoMonitors);
    }

    match selection {
        MonitorSelection::Index => {
            if configured_index < monitors.len() {
                Ok(configured_index)
            } else {
                Err(CaptureError::NoSuchMonitor {
                    index: configured_index,
                    available: monitors.len(),
                })
            }
        }
        MonitorSelection::Primary => Ok(monitors
            .iter()
            .position(|m| m.is_primary)
            .unwrap_or(0)),
        MonitorSelection::Prompt => loop {
            write!(output, "Enter the monitor number to capture: ").map_err(CaptureError::Prompt)?;
            output.flush().map_err(CaptureError::Prompt)?;

            let mut line = String::new();
            let read = input.read_line(&mut line).map_err(CaptureError::Prompt)?;
            if read == 0 {
                return Err(CaptureError::SelectionAborted);
            }

            let retry = match line.trim().parse::<usize>() {
                Ok(index) if index < monitors.len() => return Ok(index),
                Ok(_) => writeln!(output, "Invalid monitor number. Please try again."),
                Err(_) => writeln!(output, "Please enter a valid number."),
            };
            retry.map_err(CaptureError::Prompt)?;
        },
    }
}

/// Live screen capture through the `screenshots` backend.
pub struct ScreenSource {
    region: Option<Region>,
}

impl ScreenSource {
    /// `region` restricts capture to an area of the monitor.
    pub fn new(region: Option<Region>) -> Self {
        Self { region }
    }
}

impl FrameSource for ScreenSource {
    fn capture(&self, monitor_index: usize) -> Result<Frame, CaptureError> {
        let screens = Screen::all().map_err(|e| CaptureError::Backend(e.to_string()))?;
        let screen = screens
            .get(monitor_index)
            .ok_or(CaptureError::NoSuchMonitor {
                index: monitor_index,
                available: screens.len(),
            })?;

        let captured_at_ms = Utc::now().timestamp_millis();
        let image = match self.region {
            Some(region) => {
                let info = &screen.display_info;
                if !region.fits_within(info.width, info.height) {
                    return Err(CaptureError::RegionOutOfBounds {
                        region,
                        width: info.width,
                        height: info.height,
                    });
                }
                screen.capture_area(
                    region.x as i32,
                    region.y as i32,
                    region.width,
                    region.height,
                )
            }
            None => screen.capture(),
        }
        .map_err(|e| CaptureError::Backend(e.to_string()))?;

        let (width, height) = image.dimensions();
        Frame::from_rgba(width, height, image.as_raw(), captured_at_ms).map_err(CaptureError::from)
    }
}

/// Run a blocking capture on the blocking pool, giving up after `timeout`.
pub async fn capture_with_timeout<S: FrameSource>(
    source: Arc<S>,
    monitor_index: usize,
    timeout: Duration,
) -> Result<Frame, CaptureError> {
    let task = tokio::task::spawn_blocking(move || source.capture(monitor_index));
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(CaptureError::Backend(format!("capture task failed: {e}"))),
        Err(_) => {
            debug!(?timeout, monitor_index, "capture timed out");
            Err(CaptureError::Timeout(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn monitors() -> Vec<MonitorInfo> {
        vec![
            MonitorInfo {
                index: 0,
                x: 0,
                y: 0,
                width: 1920,
                height: 1080,
                scale_factor: 1.0,
                is_primary: false,
            },
            MonitorInfo {
                index: 1,
                x: 1920,
                y: 0,
                width: 2560,
                height: 1440,
                scale_factor: 2.0,
                is_primary: true,
            },
        ]
    }

    fn resolve(selection: MonitorSelection, index: usize, input: &str) -> Result<usize, CaptureError> {
        let mut input = Cursor::new(input.as_bytes().to_vec());
        let mut output = Vec::new();
        resolve_monitor(selection, index, &monitors(), &mut input, &mut output)
    }

    #[test]
    fn fixed_index() {
        assert_eq!(resolve(MonitorSelection::Index, 1, "").unwrap(), 1);
        assert!(matches!(
            resolve(MonitorSelection::Index, 2, ""),
            Err(CaptureError::NoSuchMonitor {
                index: 2,
                available: 2
            })
        ));
    }

    #[test]
    fn primary_monitor() {
        assert_eq!(resolve(MonitorSelection::Primary, 0, "").unwrap(), 1);
    }

    #[test]
    fn pixel_size_follows_scale_factor() {
        let monitors = monitors();
        assert_eq!(monitors[0].pixel_size(), (1920, 1080));
        assert!(!monitors[0].is_scaled());
        assert_eq!(monitors[1].pixel_size(), (5120, 2880));
        assert!(monitors[1].is_scaled());

        let fractional = MonitorInfo {
            scale_factor: 1.25,
            ..monitors[0].clone()
        };
        assert_eq!(fractional.pixel_size(), (2400, 1350));

        let unreported = MonitorInfo {
            scale_factor: 0.0,
            ..monitors[0].clone()
        };
        assert_eq!(unreported.pixel_size(), (1920, 1080));
    }

    #[test]
    fn prompt_retries_until_valid() {
        let mut input = Cursor::new(b"abc\n7\n0\n".to_vec());
        let mut output = Vec::new();
        let index = resolve_monitor(
            MonitorSelection::Prompt,
            0,
            &monitors(),
            &mut input,
            &mut output,
        )
        .unwrap();
        assert_eq!(index, 0);

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("Please enter a valid number."));
        assert!(text.contains("Invalid monitor number."));
    }

    #[test]
    fn prompt_end_of_input() {
        assert!(matches!(
            resolve(MonitorSelection::Prompt, 0, "9\n"),
            Err(CaptureError::SelectionAborted)
        ));
    }

    #[test]
    fn no_monitors() {
        let mut input = Cursor::new(Vec::new());
        let mut output = Vec::new();
        assert!(matches!(
            resolve_monitor(MonitorSelection::Primary, 0, &[], &mut input, &mut output),
            Err(CaptureError::NoMonitors)
        ));
    }

    struct SlowSource;

    impl FrameSource for SlowSource {
        fn capture(&self, _monitor_index: usize) -> Result<Frame, CaptureError> {
            std::thread::sleep(Duration::from_millis(200));
            Err(CaptureError::NoMonitors)
        }
    }

    #[tokio::test]
    async fn capture_times_out() {
        let result =
            capture_with_timeout(Arc::new(SlowSource), 0, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(CaptureError::Timeout(_))));
    }
}
