//! Frame geometry helpers shared by the models and the loop: downscaling,
//! letterboxing, enrollment crops, box overlays and non-maximum suppression.

use crate::types::BoundingBox;
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

/// Side length of a saved enrollment face.
pub const ENROLLMENT_FACE_SIZE: u32 = 200;

/// Frame shrunk by an integer factor for face work.
///
/// A factor of 0 or 1 returns an unscaled copy.
pub fn downscale(frame: &RgbImage, factor: u32) -> RgbImage {
    if factor <= 1 {
        return frame.clone();
    }
    let width = (frame.width() / factor).max(1);
    let height = (frame.height() / factor).max(1);
    imageops::resize(frame, width, height, FilterType::Triangle)
}

/// Metadata for coordinate de-mapping after letterbox resize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl LetterboxInfo {
    /// Map a point from letterboxed model space back to the source image.
    pub fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Fit `image` inside a `size`×`size` canvas filled with `fill`, preserving
/// aspect ratio and centering the content.
pub fn letterbox(image: &RgbImage, size: u32, fill: Rgb<u8>) -> (RgbImage, LetterboxInfo) {
    let (width, height) = image.dimensions();
    let scale = (size as f32 / width.max(1) as f32).min(size as f32 / height.max(1) as f32);

    let new_w = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, size);
    let pad_x = (size - new_w) as f32 / 2.0;
    let pad_y = (size - new_h) as f32 / 2.0;

    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, fill);
    imageops::replace(
        &mut canvas,
        &resized,
        pad_x.floor() as i64,
        pad_y.floor() as i64,
    );

    (canvas, LetterboxInfo { scale, pad_x, pad_y })
}

/// Crop a face from the full-resolution frame for enrollment.
///
/// `bbox` is in downscaled coordinates; it is scaled by `factor`, clamped to
/// the frame and resized to [`ENROLLMENT_FACE_SIZE`] square. Returns `None`
/// when nothing of the box lies inside the frame.
pub fn crop_enrollment_face(frame: &RgbImage, bbox: &BoundingBox, factor: u32) -> Option<RgbImage> {
    let full = bbox.scaled(factor.max(1) as f32);
    let (fw, fh) = frame.dimensions();

    let left = full.x.max(0.0).floor() as u32;
    let top = full.y.max(0.0).floor() as u32;
    let right = (full.right().min(fw as f32).ceil().max(0.0) as u32).min(fw);
    let bottom = (full.bottom().min(fh as f32).ceil().max(0.0) as u32).min(fh);

    if right <= left || bottom <= top {
        return None;
    }

    let crop = imageops::crop_imm(frame, left, top, right - left, bottom - top).to_image();
    Some(imageops::resize(
        &crop,
        ENROLLMENT_FACE_SIZE,
        ENROLLMENT_FACE_SIZE,
        FilterType::Triangle,
    ))
}

/// Draw a hollow rectangle of the given stroke width, clipped to the image.
pub fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>, thickness: u32) {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let clamp_x = |v: f32| (v.max(0.0) as u32).min(w - 1);
    let clamp_y = |v: f32| (v.max(0.0) as u32).min(h - 1);

    let (x0, x1) = (clamp_x(bbox.x), clamp_x(bbox.right()));
    let (y0, y1) = (clamp_y(bbox.y), clamp_y(bbox.bottom()));

    for t in 0..thickness {
        for x in x0..=x1 {
            image.put_pixel(x, (y0 + t).min(h - 1), color);
            image.put_pixel(x, y1.saturating_sub(t), color);
        }
        for y in y0..=y1 {
            image.put_pixel((x0 + t).min(w - 1), y, color);
            image.put_pixel(x1.saturating_sub(t), y, color);
        }
    }
}

/// Pixel height of a [`draw_label`] line.
pub const LABEL_HEIGHT: u32 = 8;

/// Write `text` in an 8×8 bitmap font with its top-left corner at `(x, y)`.
///
/// Characters without a glyph are drawn as blanks; pixels past the image
/// edge are clipped.
pub fn draw_label(image: &mut RgbImage, x: u32, y: u32, text: &str, color: Rgb<u8>) {
    let (w, h) = image.dimensions();
    for (i, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch) else {
            continue;
        };
        let left = x.saturating_add(i as u32 * 8);
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..8u32 {
                if bits & (1 << col) == 0 {
                    continue;
                }
                let (px, py) = (left.saturating_add(col), y.saturating_add(row as u32));
                if px < w && py < h {
                    image.put_pixel(px, py, color);
                }
            }
        }
    }
}

/// Greedy non-maximum suppression, highest confidence first.
///
/// Items for which `same_group` is false never suppress each other, which
/// gives per-class suppression for object detections.
pub fn non_max_suppression<T: Clone>(
    mut items: Vec<T>,
    bbox: impl Fn(&T) -> &BoundingBox,
    same_group: impl Fn(&T, &T) -> bool,
    iou_threshold: f32,
) -> Vec<T> {
    items.sort_by(|a, b| {
        bbox(b)
            .confidence
            .partial_cmp(&bbox(a).confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<T> = Vec::new();
    for item in items {
        let suppressed = keep
            .iter()
            .any(|k| same_group(k, &item) && bbox(k).iou(bbox(&item)) > iou_threshold);
        if !suppressed {
            keep.push(item);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox {
            confidence: conf,
            ..BoundingBox::new(x, y, w, h)
        }
    }

    #[test]
    fn test_downscale_quarter() {
        let frame = RgbImage::new(640, 480);
        let small = downscale(&frame, 4);
        assert_eq!(small.dimensions(), (160, 120));
    }

    #[test]
    fn test_downscale_factor_one_is_copy() {
        let frame = RgbImage::from_pixel(8, 6, Rgb([1, 2, 3]));
        assert_eq!(downscale(&frame, 1), frame);
    }

    #[test]
    fn test_letterbox_pads_short_side() {
        let image = RgbImage::from_pixel(320, 240, Rgb([200, 200, 200]));
        let (canvas, info) = letterbox(&image, 640, Rgb([114, 114, 114]));

        assert_eq!(canvas.dimensions(), (640, 640));
        assert!((info.scale - 2.0).abs() < 1e-6);
        assert_eq!(info.pad_x, 0.0);
        assert_eq!(info.pad_y, 80.0);
        assert_eq!(canvas.get_pixel(10, 10), &Rgb([114, 114, 114]));
        assert_eq!(canvas.get_pixel(320, 320), &Rgb([200, 200, 200]));
    }

    #[test]
    fn test_letterbox_unmap_roundtrip() {
        let image = RgbImage::new(320, 240);
        let (_, info) = letterbox(&image, 640, Rgb([0, 0, 0]));

        let (x, y) = (100.0f32, 50.0f32);
        let (rx, ry) = info.unmap(x * info.scale + info.pad_x, y * info.scale + info.pad_y);
        assert!((rx - x).abs() < 0.1, "x: {rx} vs {x}");
        assert!((ry - y).abs() < 0.1, "y: {ry} vs {y}");
    }

    #[test]
    fn test_crop_enrollment_face_scales_back() {
        // Red square at full-res (40..120, 40..120); detection box at quarter scale.
        let mut frame = RgbImage::from_pixel(400, 400, Rgb([0, 0, 255]));
        for y in 40..120 {
            for x in 40..120 {
                frame.put_pixel(x, y, Rgb([255, 0, 0]));
            }
        }
        let bbox = BoundingBox::new(10.0, 10.0, 20.0, 20.0);

        let crop = crop_enrollment_face(&frame, &bbox, 4).unwrap();
        assert_eq!(crop.dimensions(), (ENROLLMENT_FACE_SIZE, ENROLLMENT_FACE_SIZE));
        assert_eq!(crop.get_pixel(100, 100), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_crop_enrollment_face_outside_frame() {
        let frame = RgbImage::new(100, 100);
        let bbox = BoundingBox::new(200.0, 200.0, 10.0, 10.0);
        assert!(crop_enrollment_face(&frame, &bbox, 4).is_none());
    }

    #[test]
    fn test_draw_box_outline() {
        let mut image = RgbImage::new(20, 20);
        let green = Rgb([0, 255, 0]);
        draw_box(&mut image, &BoundingBox::new(5.0, 5.0, 10.0, 10.0), green, 1);

        assert_eq!(image.get_pixel(5, 5), &green);
        assert_eq!(image.get_pixel(15, 10), &green);
        assert_eq!(image.get_pixel(10, 10), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_label_marks_glyph_pixels() {
        let mut image = RgbImage::new(40, 12);
        let white = Rgb([255, 255, 255]);
        draw_label(&mut image, 2, 2, "Hi", white);

        let lit: Vec<(u32, u32)> = image
            .enumerate_pixels()
            .filter(|(_, _, px)| **px == white)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!lit.is_empty());
        assert!(lit.iter().all(|&(x, y)| (2..18).contains(&x) && (2..10).contains(&y)));
    }

    #[test]
    fn test_draw_label_clips_at_edge() {
        let mut image = RgbImage::new(6, 4);
        draw_label(&mut image, 3, 1, "WW", Rgb([255, 0, 0]));
        assert_eq!(image.dimensions(), (6, 4));
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let detections = vec![
            scored(0.0, 0.0, 100.0, 100.0, 0.9),
            scored(5.0, 5.0, 100.0, 100.0, 0.8),
            scored(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let result = non_max_suppression(detections, |b| b, |_, _| true, 0.4);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_groups_do_not_suppress_each_other() {
        let detections = vec![
            (0usize, scored(0.0, 0.0, 100.0, 100.0, 0.9)),
            (1usize, scored(5.0, 5.0, 100.0, 100.0, 0.8)),
        ];
        let result = non_max_suppression(detections, |(_, b)| b, |a, b| a.0 == b.0, 0.4);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_nms_empty() {
        let result = non_max_suppression(Vec::<BoundingBox>::new(), |b| b, |_, _| true, 0.4);
        assert!(result.is_empty());
    }
}
