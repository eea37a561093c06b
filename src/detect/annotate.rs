// SPDX-License-Identifier: GPL-3.0-only

//! Draws the ROI rectangle, gate line, detection boxes and a summary line
//! onto a copy of the source frame, then encodes it as PNG (§4.C step 7).
//! Annotation is optional and never sits on the counting path.

use crate::detect::Detection;
use crate::errors::{PipelineError, PipelineResult};
use crate::frame::Frame;
use image::{ImageBuffer, Rgb, RgbImage};
use std::io::Cursor;

const ROI_COLOR: Rgb<u8> = Rgb([40, 180, 40]);
const GATE_COLOR: Rgb<u8> = Rgb([220, 40, 40]);
const BOX_COLOR: Rgb<u8> = Rgb([255, 200, 0]);
const CENTROID_COLOR: Rgb<u8> = Rgb([0, 160, 255]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

// 3x5 bitmap font, digits 0-9 only, enough for area/count labels.
const DIGITS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111], // 0
    [0b010, 0b110, 0b010, 0b010, 0b111], // 1
    [0b111, 0b001, 0b111, 0b100, 0b111], // 2
    [0b111, 0b001, 0b111, 0b001, 0b111], // 3
    [0b101, 0b101, 0b111, 0b001, 0b001], // 4
    [0b111, 0b100, 0b111, 0b001, 0b111], // 5
    [0b111, 0b100, 0b111, 0b101, 0b111], // 6
    [0b111, 0b001, 0b001, 0b001, 0b001], // 7
    [0b111, 0b101, 0b111, 0b101, 0b111], // 8
    [0b111, 0b101, 0b111, 0b001, 0b111], // 9
];

fn draw_digit(img: &mut RgbImage, x: u32, y: u32, digit: u8, color: Rgb<u8>) {
    let glyph = DIGITS[(digit % 10) as usize];
    for (row, bits) in glyph.iter().enumerate() {
        for col in 0..3u32 {
            if bits & (1 << (2 - col)) != 0 {
                let px = x + col;
                let py = y + row as u32;
                if px < img.width() && py < img.height() {
                    img.put_pixel(px, py, color);
                }
            }
        }
    }
}

fn draw_number(img: &mut RgbImage, x: u32, y: u32, value: u64, color: Rgb<u8>) {
    let text = value.to_string();
    for (i, ch) in text.chars().enumerate() {
        if let Some(d) = ch.to_digit(10) {
            draw_digit(img, x + (i as u32) * 4, y, d as u8, color);
        }
    }
}

fn draw_hline(img: &mut RgbImage, y: u32, color: Rgb<u8>) {
    if y >= img.height() {
        return;
    }
    for x in 0..img.width() {
        img.put_pixel(x, y, color);
    }
}

fn draw_rect(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    let (width, height) = (img.width(), img.height());
    let x1 = (x + w).min(width.saturating_sub(1));
    let y1 = (y + h).min(height.saturating_sub(1));
    for px in x..=x1 {
        if y < height {
            img.put_pixel(px, y, color);
        }
        if y1 < height {
            img.put_pixel(px, y1, color);
        }
    }
    for py in y..=y1 {
        if x < width {
            img.put_pixel(x, py, color);
        }
        if x1 < width {
            img.put_pixel(x1, py, color);
        }
    }
}

/// Render an annotated copy of `frame` and encode it as PNG bytes. A PNG
/// encode failure surfaces as `DetectorTransient` rather than silently
/// returning an empty buffer a caller can't distinguish from "no detections".
pub fn annotate_counting_frame(
    frame: &Frame,
    roi_y0: u32,
    roi_height: u32,
    gate_y: u32,
    detections: &[Detection],
    crossing_count: u64,
) -> PipelineResult<Vec<u8>> {
    let mut img: RgbImage = ImageBuffer::from_fn(frame.width, frame.height, |x, y| {
        let v = frame.pixel(x, y).unwrap_or(0);
        Rgb([v, v, v])
    });

    draw_rect(&mut img, 0, roi_y0, frame.width.saturating_sub(1), roi_height, ROI_COLOR);
    draw_hline(&mut img, gate_y, GATE_COLOR);

    for detection in detections {
        draw_rect(
            &mut img,
            detection.bbox_x,
            detection.bbox_y,
            detection.bbox_w,
            detection.bbox_h,
            BOX_COLOR,
        );
        if detection.centroid_x < img.width() && detection.centroid_y < img.height() {
            img.put_pixel(detection.centroid_x, detection.centroid_y, CENTROID_COLOR);
        }
        draw_number(
            &mut img,
            detection.bbox_x,
            detection.bbox_y.saturating_sub(6),
            detection.area as u64,
            BOX_COLOR,
        );
    }

    draw_number(&mut img, 2, 2, crossing_count, TEXT_COLOR);

    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|err| PipelineError::DetectorTransient(format!("annotated-frame PNG encode failed: {err}")))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotated_output_is_nonempty_png() {
        let frame = Frame::new(20, 20, 0, vec![128u8; 400]);
        let png = annotate_counting_frame(&frame, 5, 10, 10, &[], 0).unwrap();
        assert!(!png.is_empty());
        // PNG magic bytes.
        assert_eq!(&png[0..4], &[0x89, 0x50, 0x4e, 0x47]);
    }
}
