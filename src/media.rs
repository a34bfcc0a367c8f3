//! The boundary between the catalog and whatever decodes media bytes.
//!
//! Probing a file for width/height/duration and rendering a thumbnail are
//! treated as a pluggable collaborator rather than something this crate
//! hardcodes a single decoder for: video and audio demuxing in particular is
//! out of scope here, so [`MediaToolkit`] lets a caller wire in ffmpeg,
//! a GStreamer pipeline, or anything else that can answer these two
//! questions, while [`ImageToolkit`] gives a real, dependency-light
//! implementation for the image formats this crate already depends on via
//! the `image` crate.

use crate::error::Result;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Probe {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<f64>,
    pub bitrate: Option<f64>,
}

pub trait MediaToolkit: Send + Sync {
    /// Reads whatever dimensions/duration can be determined from `path`.
    /// A toolkit that can't introspect a given format returns `Probe::default()`
    /// rather than erroring, since metadata is always optional.
    fn probe(&self, path: &Path) -> Result<Probe>;

    /// Renders a thumbnail no larger than `max_width` x `max_height`,
    /// preserving aspect ratio, and writes it as a JPEG to `dest`.
    fn thumbnail(&self, path: &Path, max_width: u32, max_height: u32, dest: &Path) -> Result<()>;
}

/// A [`MediaToolkit`] backed by the `image` crate: handles every still-image
/// format that crate decodes, and no-ops (returns an empty probe, skips the
/// thumbnail) for anything else. Video/audio support is exactly the kind of
/// specific decoding toolkit this crate leaves to an injected collaborator.
pub struct ImageToolkit;

impl MediaToolkit for ImageToolkit {
    fn probe(&self, path: &Path) -> Result<Probe> {
        match image::image_dimensions(path) {
            Ok((width, height)) => Ok(Probe {
                width: Some(width),
                height: Some(height),
                duration: None,
                bitrate: None,
            }),
            Err(_) => Ok(Probe::default()),
        }
    }

    fn thumbnail(&self, path: &Path, max_width: u32, max_height: u32, dest: &Path) -> Result<()> {
        let img = match image::open(path) {
            Ok(img) => img,
            Err(_) => return Ok(()),
        };
        let resized = img.thumbnail(max_width, max_height);
        let flattened = if resized.color().has_alpha() {
            composite_onto_checkerboard(&resized)
        } else {
            resized.to_rgb8()
        };

        let mut file = std::fs::File::create(dest)?;
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut file, THUMBNAIL_JPEG_QUALITY);
        encoder.encode_image(&flattened)?;
        Ok(())
    }
}

const THUMBNAIL_JPEG_QUALITY: u8 = 50;
const CHECKER_SIZE: u32 = 8;
const CHECKER_LIGHT: [u8; 3] = [204, 204, 204];
const CHECKER_DARK: [u8; 3] = [153, 153, 153];

/// Flattens an image with an alpha channel onto an 8px checkerboard (the
/// usual "transparent" placeholder pattern) so a JPEG thumbnail, which has no
/// alpha channel of its own, doesn't show transparent regions as solid black.
fn composite_onto_checkerboard(img: &image::DynamicImage) -> image::RgbImage {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut out = image::RgbImage::new(width, height);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let checker = if ((x / CHECKER_SIZE) + (y / CHECKER_SIZE)) % 2 == 0 {
            CHECKER_LIGHT
        } else {
            CHECKER_DARK
        };
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let blend = |fg: u8, bg: u8| ((fg as f32 * alpha) + (bg as f32 * (1.0 - alpha))).round() as u8;
        out.put_pixel(x, y, image::Rgb([blend(r, checker[0]), blend(g, checker[1]), blend(b, checker[2])]));
    }
    out
}
