// SPDX-License-Identifier: GPL-3.0-only

//! Edge detection and adaptive thresholding shared by the counting
//! multi-strategy variant (§4.C) and the defect detector (§4.C'). Hand-rolled
//! over raw `&[u8]` gray buffers, same stride-indexed idiom as
//! [`crate::detect::morphology`].

use crate::detect::morphology::Mask;

#[inline]
fn at(gray: &[u8], width: u32, height: u32, x: i32, y: i32) -> f32 {
    if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
        return 0.0;
    }
    gray[(y as usize) * (width as usize) + (x as usize)] as f32
}

/// 5x5 Gaussian blur (sigma ~= 1.0), separable kernel applied as one pass
/// for simplicity over the small ROI sizes this pipeline runs on.
pub fn gaussian_blur_5x5(gray: &[u8], width: u32, height: u32) -> Vec<u8> {
    const KERNEL: [f32; 5] = [1.0, 4.0, 6.0, 4.0, 1.0];
    const NORM: f32 = 16.0 * 16.0;
    let mut out = vec![0u8; gray.len()];
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let mut acc = 0.0f32;
            for (ky, &wy) in KERNEL.iter().enumerate() {
                for (kx, &wx) in KERNEL.iter().enumerate() {
                    let sx = x + kx as i32 - 2;
                    let sy = y + ky as i32 - 2;
                    acc += wx * wy * at(gray, width, height, sx, sy);
                }
            }
            out[(y as usize) * (width as usize) + (x as usize)] = (acc / NORM).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Sample mean and population standard deviation of a gray buffer.
pub fn mean_stddev(gray: &[u8]) -> (f32, f32) {
    if gray.is_empty() {
        return (0.0, 0.0);
    }
    let n = gray.len() as f32;
    let mean = gray.iter().map(|&p| p as f32).sum::<f32>() / n;
    let variance = gray.iter().map(|&p| (p as f32 - mean).powi(2)).sum::<f32>() / n;
    (mean, variance.sqrt())
}

struct Gradients {
    magnitude: Vec<f32>,
    direction: Vec<f32>,
}

fn sobel(gray: &[u8], width: u32, height: u32) -> Gradients {
    let mut magnitude = vec![0.0f32; gray.len()];
    let mut direction = vec![0.0f32; gray.len()];
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let gx = -at(gray, width, height, x - 1, y - 1) - 2.0 * at(gray, width, height, x - 1, y)
                - at(gray, width, height, x - 1, y + 1)
                + at(gray, width, height, x + 1, y - 1)
                + 2.0 * at(gray, width, height, x + 1, y)
                + at(gray, width, height, x + 1, y + 1);
            let gy = -at(gray, width, height, x - 1, y - 1) - 2.0 * at(gray, width, height, x, y - 1)
                - at(gray, width, height, x + 1, y - 1)
                + at(gray, width, height, x - 1, y + 1)
                + 2.0 * at(gray, width, height, x, y + 1)
                + at(gray, width, height, x + 1, y + 1);
            let idx = (y as usize) * (width as usize) + (x as usize);
            magnitude[idx] = (gx * gx + gy * gy).sqrt();
            direction[idx] = gy.atan2(gx);
        }
    }
    Gradients { magnitude, direction }
}

/// Canny edge detector: Sobel gradients, non-maximum suppression, double
/// threshold with hysteresis (§4.C, §4.C').
pub fn canny(gray: &[u8], width: u32, height: u32, low: f32, high: f32) -> Mask {
    let Gradients { magnitude, direction } = sobel(gray, width, height);
    let w = width as usize;
    let h = height as usize;

    let mut suppressed = vec![0.0f32; magnitude.len()];
    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let idx = y * w + x;
            let angle = direction[idx].to_degrees().rem_euclid(180.0);
            let (dx1, dy1, dx2, dy2) = if !(22.5..157.5).contains(&angle) {
                (1, 0, -1, 0)
            } else if angle < 67.5 {
                (1, -1, -1, 1)
            } else if angle < 112.5 {
                (0, 1, 0, -1)
            } else {
                (1, 1, -1, -1)
            };
            let n1 = magnitude[((y as i32 + dy1) as usize) * w + ((x as i32 + dx1) as usize)];
            let n2 = magnitude[((y as i32 + dy2) as usize) * w + ((x as i32 + dx2) as usize)];
            if magnitude[idx] >= n1 && magnitude[idx] >= n2 {
                suppressed[idx] = magnitude[idx];
            }
        }
    }

    let mut mask = Mask::zeros(width, height);
    let mut strong: Vec<usize> = Vec::new();
    for (idx, &m) in suppressed.iter().enumerate() {
        if m >= high {
            mask.data[idx] = 255;
            strong.push(idx);
        }
    }
    // Hysteresis: grow from strong edges through weak (>= low) neighbours.
    while let Some(idx) = strong.pop() {
        let x = (idx % w) as i32;
        let y = (idx / w) as i32;
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = x + dx;
                let ny = y + dy;
                if nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32 {
                    continue;
                }
                let nidx = (ny as usize) * w + (nx as usize);
                if mask.data[nidx] == 0 && suppressed[nidx] >= low {
                    mask.data[nidx] = 255;
                    strong.push(nidx);
                }
            }
        }
    }
    mask
}

/// Local-mean adaptive threshold binarisation (§4.C multi-strategy
/// variant): a pixel is foreground if it is darker/brighter than its
/// neighbourhood mean by more than `c`.
pub fn adaptive_threshold(gray: &[u8], width: u32, height: u32, block_size: u32, c: f32) -> Mask {
    let half = (block_size / 2).max(1) as i32;
    let mut mask = Mask::zeros(width, height);
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let mut sum = 0.0f32;
            let mut count = 0.0f32;
            for dy in -half..=half {
                for dx in -half..=half {
                    sum += at(gray, width, height, x + dx, y + dy);
                    count += 1.0;
                }
            }
            let local_mean = sum / count;
            let pixel = at(gray, width, height, x, y);
            if (pixel - local_mean).abs() > c {
                mask.set(x as u32, y as u32, 255);
            }
        }
    }
    mask
}
