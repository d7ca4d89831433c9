use image::{imageops, GrayImage};
use screen_motion_common::frame::Region;
use tracing::debug;

use super::mask::MaskedFrame;

/// Outcome of comparing two consecutive frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotionVerdict {
    pub is_motion: bool,
    /// Bounding boxes of the surviving blobs, in row-major discovery order.
    pub regions: Vec<Region>,
    /// Sum of the surviving blobs' pixel areas (after dilation), so it is
    /// never below the number of changed pixels they contain.
    pub total_changed_area: u64,
}

impl MotionVerdict {
    pub fn none() -> Self {
        Self {
            is_motion: false,
            regions: Vec::new(),
            total_changed_area: 0,
        }
    }

    /// Largest bounding box by area, if any.
    pub fn largest(&self) -> Option<&Region> {
        self.regions.iter().max_by_key(|r| r.area())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("frame size changed from {previous:?} to {current:?}")]
    FrameSizeMismatch {
        previous: (u32, u32),
        current: (u32, u32),
    },
}

/// Frame-differencing motion classifier.
///
/// Algorithm:
/// 1. Convert both masked frames to luminance
/// 2. Absolute per-pixel difference, thresholded into an active/inactive mask
/// 3. Dilate the mask with a square kernel so fragments of one moving object
///    merge into a single blob
/// 4. Label 8-connected blobs and drop those holding fewer than `min_area`
///    changed pixels; dilation grows the reported box, not the count
///
/// `threshold` and `min_area` are the two sensitivity knobs: raising either
/// makes the detector less sensitive.
pub struct MotionClassifier {
    threshold: u8,
    min_area: u64,
    dilate_radius: u32,
}

/// A connected blob found in the active mask.
struct Blob {
    bounds: Region,
    /// Pixels in the dilated blob.
    area: u64,
    /// Pixels of the blob that were over the threshold before dilation.
    changed: u64,
}

impl MotionClassifier {
    pub fn new(threshold: u8, min_area: u64, dilate_radius: u32) -> Self {
        Self {
            threshold,
            min_area,
            dilate_radius,
        }
    }

    pub fn classify(
        &self,
        previous: &MaskedFrame,
        current: &MaskedFrame,
    ) -> Result<MotionVerdict, ClassifyError> {
        if previous.dimensions() != current.dimensions() {
            return Err(ClassifyError::FrameSizeMismatch {
                previous: previous.dimensions(),
                current: current.dimensions(),
            });
        }
        let (width, height) = current.dimensions();
        if width == 0 || height == 0 {
            return Ok(MotionVerdict::none());
        }

        let prev_luma = imageops::grayscale(previous.image());
        let curr_luma = imageops::grayscale(current.image());

        let changed = self.threshold_diff(&prev_luma, &curr_luma);
        let active_pixels = changed.iter().filter(|&&a| a).count();
        if active_pixels == 0 {
            debug!(threshold = self.threshold, "no pixel above threshold");
            return Ok(MotionVerdict::none());
        }

        let mut active = if self.dilate_radius > 0 {
            dilate(&changed, width, height, self.dilate_radius)
        } else {
            changed.clone()
        };
        for region in previous.ignored().iter().chain(current.ignored()) {
            clear_region(&mut active, width, region);
        }

        let blobs = connected_blobs(&active, &changed, width, height);
        let blob_count = blobs.len();
        let regions: Vec<(Region, u64)> = blobs
            .into_iter()
            .filter(|b| b.changed >= self.min_area)
            .map(|b| (b.bounds, b.area))
            .collect();
        let total_changed_area: u64 = regions.iter().map(|(_, area)| area).sum();

        debug!(
            active_pixels,
            blob_count,
            surviving = regions.len(),
            total_changed_area,
            min_area = self.min_area,
            "frame difference"
        );

        Ok(MotionVerdict {
            is_motion: !regions.is_empty(),
            regions: regions.into_iter().map(|(r, _)| r).collect(),
            total_changed_area,
        })
    }

    /// A pixel is active when its difference is non-zero and at least `threshold`.
    fn threshold_diff(&self, previous: &GrayImage, current: &GrayImage) -> Vec<bool> {
        previous
            .as_raw()
            .iter()
            .zip(current.as_raw())
            .map(|(&p, &c)| {
                let diff = p.abs_diff(c);
                diff > 0 && diff >= self.threshold
            })
            .collect()
    }
}

/// Square-kernel dilation, done as a horizontal then a vertical pass.
fn dilate(mask: &[bool], width: u32, height: u32, radius: u32) -> Vec<bool> {
    let (w, h, r) = (width as usize, height as usize, radius as usize);

    let mut horizontal = vec![false; mask.len()];
    for y in 0..h {
        let row = y * w;
        for x in (0..w).filter(|&x| mask[row + x]) {
            let lo = x.saturating_sub(r);
            let hi = (x + r).min(w - 1);
            horizontal[row + lo..=row + hi].fill(true);
        }
    }

    let mut out = vec![false; mask.len()];
    for y in 0..h {
        for x in (0..w).filter(|&x| horizontal[y * w + x]) {
            let lo = y.saturating_sub(r);
            let hi = (y + r).min(h - 1);
            for yy in lo..=hi {
                out[yy * w + x] = true;
            }
        }
    }
    out
}

fn clear_region(mask: &mut [bool], width: u32, region: &Region) {
    let w = width as usize;
    for y in region.y as usize..region.bottom() as usize {
        mask[y * w + region.x as usize..y * w + region.right() as usize].fill(false);
    }
}

/// 8-connected component labeling over `mask`; blobs are returned in the
/// order their first pixel is met scanning row by row. `changed` marks the
/// pixels counted in [`Blob::changed`].
fn connected_blobs(mask: &[bool], changed: &[bool], width: u32, height: u32) -> Vec<Blob> {
    let (w, h) = (width as usize, height as usize);
    let mut visited = vec![false; mask.len()];
    let mut stack = Vec::new();
    let mut blobs = Vec::new();

    for start in 0..mask.len() {
        if !mask[start] || visited[start] {
            continue;
        }

        visited[start] = true;
        stack.push(start);
        let (mut min_x, mut min_y) = (start % w, start / w);
        let (mut max_x, mut max_y) = (min_x, min_y);
        let (mut area, mut changed_in_blob) = (0u64, 0u64);

        while let Some(idx) = stack.pop() {
            let (x, y) = (idx % w, idx / w);
            area += 1;
            if changed[idx] {
                changed_in_blob += 1;
            }
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);

            for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    let n = ny * w + nx;
                    if mask[n] && !visited[n] {
                        visited[n] = true;
                        stack.push(n);
                    }
                }
            }
        }

        blobs.push(Blob {
            bounds: Region::new(
                min_x as u32,
                min_y as u32,
                (max_x - min_x + 1) as u32,
                (max_y - min_y + 1) as u32,
            ),
            area,
            changed: changed_in_blob,
        });
    }

    blobs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::mask;
    use image::{Rgb, RgbImage};
    use screen_motion_common::frame::Frame;

    const W: u32 = 100;
    const H: u32 = 80;

    fn background() -> RgbImage {
        RgbImage::from_pixel(W, H, Rgb([40, 40, 40]))
    }

    fn with_square(mut image: RgbImage, region: Region, value: u8) -> RgbImage {
        for y in region.y..region.bottom() as u32 {
            for x in region.x..region.right() as u32 {
                image.put_pixel(x, y, Rgb([value, value, value]));
            }
        }
        image
    }

    fn masked(image: RgbImage, ignore: &[Region]) -> MaskedFrame {
        mask::apply(&Frame::new(image, 0), ignore).unwrap()
    }

    fn classifier() -> MotionClassifier {
        MotionClassifier::new(25, 100, 1)
    }

    #[test]
    fn identical_frames_no_motion() {
        let a = masked(background(), &[]);
        let b = masked(background(), &[]);
        let verdict = classifier().classify(&a, &b).unwrap();
        assert_eq!(verdict, MotionVerdict::none());
    }

    #[test]
    fn identical_frames_no_motion_at_zero_threshold() {
        let a = masked(background(), &[]);
        let b = masked(background(), &[]);
        let verdict = MotionClassifier::new(0, 0, 1).classify(&a, &b).unwrap();
        assert!(!verdict.is_motion);
        assert!(verdict.regions.is_empty());
    }

    #[test]
    fn change_inside_ignore_region_is_invisible() {
        let ignore = [Region::new(0, 60, 100, 20)];
        let changed = with_square(background(), Region::new(10, 62, 50, 15), 255);
        let a = masked(background(), &ignore);
        let b = masked(changed, &ignore);
        let verdict = classifier().classify(&a, &b).unwrap();
        assert!(!verdict.is_motion);
        assert_eq!(verdict.total_changed_area, 0);
    }

    #[test]
    fn dilation_does_not_leak_into_ignore_region() {
        let ignore = [Region::new(0, 50, 100, 30)];
        // Square ends right at the ignore boundary; the dilated row below it is cleared.
        let square = Region::new(20, 30, 20, 20);
        let a = masked(background(), &ignore);
        let b = masked(with_square(background(), square, 200), &ignore);
        let verdict = classifier().classify(&a, &b).unwrap();
        assert!(verdict.is_motion);
        assert_eq!(verdict.regions.len(), 1);
        assert_eq!(verdict.regions[0].bottom(), 50);
    }

    #[test]
    fn square_change_is_reported() {
        let square = Region::new(30, 30, 20, 20);
        let a = masked(background(), &[]);
        let b = masked(with_square(background(), square, 120), &[]);
        let verdict = classifier().classify(&a, &b).unwrap();

        assert!(verdict.is_motion);
        assert_eq!(verdict.regions.len(), 1);
        assert!(verdict.regions[0].covers(&square));
        assert_eq!(verdict.regions[0], Region::new(29, 29, 22, 22));
        assert!(verdict.total_changed_area >= square.area());
        assert_eq!(verdict.total_changed_area, 22 * 22);
    }

    #[test]
    fn small_change_is_filtered() {
        let a = masked(background(), &[]);
        let b = masked(with_square(background(), Region::new(10, 10, 5, 5), 255), &[]);
        let verdict = classifier().classify(&a, &b).unwrap();
        assert!(!verdict.is_motion);
        assert!(verdict.regions.is_empty());
    }

    #[test]
    fn min_area_counts_pixels_before_dilation() {
        // 9x9 = 81 changed pixels, grown to 11x11 = 121 by dilation.
        let a = masked(background(), &[]);
        let b = masked(with_square(background(), Region::new(30, 30, 9, 9), 200), &[]);
        let verdict = classifier().classify(&a, &b).unwrap();
        assert!(!verdict.is_motion);
        assert!(verdict.regions.is_empty());
        assert_eq!(verdict.total_changed_area, 0);

        // 10x10 = 100 changed pixels reaches the cutoff; the box is still dilated.
        let b = masked(with_square(background(), Region::new(30, 30, 10, 10), 200), &[]);
        let verdict = classifier().classify(&a, &b).unwrap();
        assert!(verdict.is_motion);
        assert_eq!(verdict.regions, vec![Region::new(29, 29, 12, 12)]);
        assert_eq!(verdict.total_changed_area, 144);
    }

    #[test]
    fn merged_fragments_count_together() {
        // Two 8x8 fragments, 64 changed pixels each, joined by dilation.
        let left = Region::new(10, 10, 8, 8);
        let right = Region::new(19, 10, 8, 8);
        let changed = with_square(with_square(background(), left, 200), right, 200);
        let a = masked(background(), &[]);
        let b = masked(changed, &[]);

        let verdict = classifier().classify(&a, &b).unwrap();
        assert_eq!(verdict.regions, vec![Region::new(9, 9, 19, 10)]);

        let undilated = MotionClassifier::new(25, 100, 0).classify(&a, &b).unwrap();
        assert!(!undilated.is_motion);
    }

    #[test]
    fn difference_below_threshold_is_ignored() {
        let a = masked(background(), &[]);
        // 40 -> 60 is a delta of 20, under the cutoff of 25.
        let b = masked(with_square(background(), Region::new(0, 0, 50, 50), 60), &[]);
        let verdict = classifier().classify(&a, &b).unwrap();
        assert!(!verdict.is_motion);
    }

    #[test]
    fn separate_blobs_in_discovery_order() {
        let lower = Region::new(5, 50, 15, 15);
        let upper = Region::new(60, 5, 15, 15);
        let changed = with_square(with_square(background(), lower, 200), upper, 200);
        let a = masked(background(), &[]);
        let b = masked(changed, &[]);
        let verdict = classifier().classify(&a, &b).unwrap();

        assert_eq!(verdict.regions.len(), 2);
        assert!(verdict.regions[0].covers(&upper));
        assert!(verdict.regions[1].covers(&lower));
        assert_eq!(verdict.total_changed_area, 2 * 17 * 17);
    }

    #[test]
    fn dilation_merges_nearby_fragments() {
        let left = Region::new(10, 10, 10, 10);
        let right = Region::new(22, 10, 10, 10);
        let changed = with_square(with_square(background(), left, 200), right, 200);
        let a = masked(background(), &[]);
        let b = masked(changed, &[]);

        let merged = classifier().classify(&a, &b).unwrap();
        assert_eq!(merged.regions.len(), 1);
        assert!(merged.regions[0].covers(&left));
        assert!(merged.regions[0].covers(&right));

        let undilated = MotionClassifier::new(25, 50, 0).classify(&a, &b).unwrap();
        assert_eq!(undilated.regions, vec![left, right]);
    }

    #[test]
    fn diagonal_pixels_are_connected() {
        let mut changed = background();
        for i in 0..12 {
            changed.put_pixel(10 + i, 10 + i, Rgb([255, 255, 255]));
        }
        let a = masked(background(), &[]);
        let b = masked(changed, &[]);
        let verdict = MotionClassifier::new(25, 12, 0).classify(&a, &b).unwrap();
        assert_eq!(verdict.regions, vec![Region::new(10, 10, 12, 12)]);
        assert_eq!(verdict.total_changed_area, 12);
    }

    #[test]
    fn largest_region() {
        let small = Region::new(5, 5, 12, 12);
        let big = Region::new(50, 40, 30, 30);
        let changed = with_square(with_square(background(), small, 200), big, 200);
        let a = masked(background(), &[]);
        let b = masked(changed, &[]);
        let verdict = classifier().classify(&a, &b).unwrap();
        assert!(verdict.largest().unwrap().covers(&big));
        assert_eq!(MotionVerdict::none().largest(), None);
    }

    #[test]
    fn size_mismatch_is_an_error() {
        let a = masked(background(), &[]);
        let b = masked(RgbImage::new(W + 1, H), &[]);
        let result = classifier().classify(&a, &b);
        assert!(matches!(
            result,
            Err(ClassifyError::FrameSizeMismatch {
                previous: (100, 80),
                current: (101, 80)
            })
        ));
    }
}
