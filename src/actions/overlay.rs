//! Debug overlay rendering for traceability.
//!
//! Click steps leave two artifacts beside the step screenshots: a copy
//! with a filled circle at the tap point, and a copy with the described
//! target's bounding box (plus an optional title strip naming the
//! instruction). Overlay failures are never fatal to the run.

use ab_glyph::{FontVec, PxScale};
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;
use thiserror::Error;

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TITLE_STRIP_HEIGHT: u32 = 100;

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("failed to decode screenshot: {0}")]
    Decode(String),
    #[error("failed to save overlay: {0}")]
    Save(String),
}

/// Load an overlay font from disk. A missing or unreadable font is not an
/// error for the caller; the title strip is simply skipped.
pub fn load_font(path: &Path) -> Option<FontVec> {
    let bytes = std::fs::read(path).ok()?;
    FontVec::try_from_vec(bytes).ok()
}

fn decode(png: &[u8]) -> Result<RgbImage, OverlayError> {
    Ok(image::load_from_memory(png)
        .map_err(|e| OverlayError::Decode(e.to_string()))?
        .to_rgb8())
}

fn save(img: &RgbImage, out: &Path) -> Result<(), OverlayError> {
    img.save(out).map_err(|e| OverlayError::Save(e.to_string()))
}

/// Draw a filled white circle at the tap point, radius min(w, h)/50.
pub fn draw_click_marker(png: &[u8], point: (i32, i32), out: &Path) -> Result<(), OverlayError> {
    let mut img = decode(png)?;
    let radius = (img.width().min(img.height()) / 50) as i32;
    draw_filled_circle_mut(&mut img, point, radius, Rgb([255, 255, 255]));
    save(&img, out)
}

/// Draw a 3-pixel rectangle around the described target. With a label and
/// a font, the image grows a white title strip naming the instruction.
pub fn draw_target_box(
    png: &[u8],
    bbox: [i32; 4],
    label: Option<&str>,
    font: Option<&FontVec>,
    out: &Path,
) -> Result<(), OverlayError> {
    let mut img = decode(png)?;
    let (width, height) = (img.width() as i32, img.height() as i32);

    let x1 = bbox[0].clamp(0, width - 1);
    let y1 = bbox[1].clamp(0, height - 1);
    let x2 = bbox[2].clamp(0, width - 1);
    let y2 = bbox[3].clamp(0, height - 1);
    if x2 > x1 && y2 > y1 {
        for inset in 0..3 {
            let w = (x2 - x1 - 2 * inset).max(1) as u32;
            let h = (y2 - y1 - 2 * inset).max(1) as u32;
            draw_hollow_rect_mut(
                &mut img,
                Rect::at(x1 + inset, y1 + inset).of_size(w, h),
                BOX_COLOR,
            );
        }
    }

    if let (Some(label), Some(font)) = (label, font) {
        let titled = add_title_strip(&img, label, font);
        return save(&titled, out);
    }
    save(&img, out)
}

/// Extend the canvas upward by a white strip carrying the label text.
fn add_title_strip(img: &RgbImage, label: &str, font: &FontVec) -> RgbImage {
    let (width, height) = img.dimensions();
    let mut titled = RgbImage::from_pixel(width, height + TITLE_STRIP_HEIGHT, Rgb([255, 255, 255]));
    imageops::replace(&mut titled, img, 0, TITLE_STRIP_HEIGHT as i64);
    draw_text_mut(
        &mut titled,
        Rgb([0, 0, 0]),
        (width / 50) as i32,
        33,
        PxScale::from(32.0),
        font,
        label,
    );
    titled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_png() -> Vec<u8> {
        let img = RgbImage::from_pixel(200, 300, Rgb([10, 20, 30]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn click_marker_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("click.png");
        draw_click_marker(&sample_png(), (100, 150), &out).unwrap();

        let marked = image::open(&out).unwrap().to_rgb8();
        assert_eq!(marked.get_pixel(100, 150), &Rgb([255, 255, 255]));
    }

    #[test]
    fn target_box_is_written_without_font() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("bbox.png");
        draw_target_box(&sample_png(), [20, 30, 120, 130], Some("ignored"), None, &out).unwrap();

        let boxed = image::open(&out).unwrap().to_rgb8();
        // canvas unchanged when no font is available
        assert_eq!(boxed.dimensions(), (200, 300));
        assert_eq!(boxed.get_pixel(20, 30), &Rgb([255, 0, 0]));
    }

    #[test]
    fn degenerate_box_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("bbox.png");
        draw_target_box(&sample_png(), [500, 500, 400, 400], None, None, &out).unwrap();
    }

    #[test]
    fn garbage_png_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("x.png");
        assert!(draw_click_marker(&[1, 2, 3], (0, 0), &out).is_err());
    }
}
