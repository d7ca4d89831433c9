use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use screen_motion_common::frame::{Frame, Region};
use tracing::{debug, info, warn};

use super::keys::{artifact_file_name, temp_file_name};

const MOTION_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const IGNORED_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
const OUTLINE_THICKNESS: u64 = 2;
/// Upper bound on `_N` suffixes tried for one timestamp.
const MAX_COLLISIONS: u32 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("failed to create output directory {0}: {1}")]
    CreateDir(String, std::io::Error),
    #[error("failed to encode JPEG: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to write {0}: {1}")]
    Io(String, std::io::Error),
    #[error("no free file name for capture at {0} ms")]
    NameExhausted(i64),
}

/// Persists annotated motion captures as JPEG files.
pub struct ArtifactWriter {
    directory: PathBuf,
    jpeg_quality: u8,
    /// Drawn in magenta on every artifact so the masked areas are visible.
    ignored_outlines: Vec<Region>,
}

impl ArtifactWriter {
    pub fn new(directory: PathBuf, jpeg_quality: u8, ignored_outlines: Vec<Region>) -> Self {
        Self {
            directory,
            jpeg_quality,
            ignored_outlines,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Annotate a copy of `frame` with `regions` and save it.
    ///
    /// The JPEG is written to a hidden temp file and renamed into place, so a
    /// file with the final name is always complete. Existing files are never
    /// overwritten; a `_N` suffix is added instead.
    pub fn write(&self, frame: &Frame, regions: &[Region]) -> Result<PathBuf, WriteError> {
        let started = Instant::now();

        std::fs::create_dir_all(&self.directory)
            .map_err(|e| WriteError::CreateDir(self.directory.display().to_string(), e))?;

        let canvas = self.annotate(frame, regions);
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.jpeg_quality).encode_image(&canvas)?;

        let path = self.free_path(frame.captured_at_ms())?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = self.directory.join(temp_file_name(&file_name));

        if let Err(e) = std::fs::write(&tmp_path, &jpeg) {
            remove_scratch(&tmp_path);
            return Err(WriteError::Io(tmp_path.display().to_string(), e));
        }
        if let Err(e) = std::fs::rename(&tmp_path, &path) {
            remove_scratch(&tmp_path);
            return Err(WriteError::Io(path.display().to_string(), e));
        }

        info!(
            path = path.display().to_string(),
            regions = regions.len(),
            bytes = jpeg.len(),
            took_ms = started.elapsed().as_millis() as u64,
            "saved motion capture"
        );
        Ok(path)
    }

    /// Copy of the frame with ignore regions and motion regions outlined.
    pub fn annotate(&self, frame: &Frame, regions: &[Region]) -> RgbImage {
        let mut canvas = frame.image().clone();
        for region in &self.ignored_outlines {
            draw_outline(&mut canvas, region, IGNORED_COLOR);
        }
        for region in regions {
            draw_outline(&mut canvas, region, MOTION_COLOR);
        }
        canvas
    }

    fn free_path(&self, captured_at_ms: i64) -> Result<PathBuf, WriteError> {
        for collision in 0..MAX_COLLISIONS {
            let path = self
                .directory
                .join(artifact_file_name(captured_at_ms, collision));
            match path.try_exists() {
                Ok(false) => {
                    if collision > 0 {
                        debug!(collision, "file name taken, using suffix");
                    }
                    return Ok(path);
                }
                Ok(true) => continue,
                Err(e) => return Err(WriteError::Io(path.display().to_string(), e)),
            }
        }
        Err(WriteError::NameExhausted(captured_at_ms))
    }
}

fn remove_scratch(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = path.display().to_string(), error = %e, "failed to remove temp capture file");
        }
    }
}

/// Outline `region` with a band of `OUTLINE_THICKNESS` pixels drawn inside it,
/// clipped to the image.
fn draw_outline(image: &mut RgbImage, region: &Region, color: Rgb<u8>) {
    if region.is_empty() {
        return;
    }
    let (x0, y0, x1, y1) = (region.x as u64, region.y as u64, region.right(), region.bottom());
    let t = OUTLINE_THICKNESS;

    fill_rect(image, x0, y0, x1, (y0 + t).min(y1), color);
    fill_rect(image, x0, y1.saturating_sub(t).max(y0), x1, y1, color);
    fill_rect(image, x0, y0, (x0 + t).min(x1), y1, color);
    fill_rect(image, x1.saturating_sub(t).max(x0), y0, x1, y1, color);
}

fn fill_rect(image: &mut RgbImage, x0: u64, y0: u64, x1: u64, y1: u64, color: Rgb<u8>) {
    let x1 = x1.min(image.width() as u64);
    let y1 = y1.min(image.height() as u64);
    for y in y0..y1 {
        for x in x0..x1 {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}
