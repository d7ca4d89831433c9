use image::RgbImage;
use screen_motion_common::frame::{Frame, Region};

/// A frame with its ignore regions blanked out.
///
/// Masked pixels are zeroed, so identical masks on both sides of a
/// comparison contribute a difference of exactly zero. The regions are kept
/// so the classifier can keep dilated blobs out of them as well.
#[derive(Debug, Clone)]
pub struct MaskedFrame {
    image: RgbImage,
    ignored: Vec<Region>,
}

#[derive(Debug, thiserror::Error)]
pub enum MaskError {
    #[error("ignore region {region:?} exceeds frame bounds {width}x{height}")]
    InvalidRegion {
        region: Region,
        width: u32,
        height: u32,
    },
}

/// Copy `frame` and zero every pixel inside any of `ignore`.
pub fn apply(frame: &Frame, ignore: &[Region]) -> Result<MaskedFrame, MaskError> {
    let (width, height) = frame.dimensions();
    if let Some(region) = ignore.iter().find(|r| !r.fits_within(width, height)) {
        return Err(MaskError::InvalidRegion {
            region: *region,
            width,
            height,
        });
    }

    let mut image = frame.image().clone();
    let stride = width as usize * 3;
    let buf: &mut [u8] = &mut image;
    for region in ignore {
        let start_col = region.x as usize * 3;
        let end_col = region.right() as usize * 3;
        for y in region.y as usize..region.bottom() as usize {
            buf[y * stride + start_col..y * stride + end_col].fill(0);
        }
    }

    Ok(MaskedFrame {
        image,
        ignored: ignore.to_vec(),
    })
}

impl MaskedFrame {
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn ignored(&self) -> &[Region] {
        &self.ignored
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}
