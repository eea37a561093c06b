// SPDX-License-Identifier: GPL-3.0-only

//! 4-connected connected-component labelling with area/bbox statistics
//! (§4.C step 4). Label 0 is background and is never returned as a component.

use crate::detect::morphology::Mask;

/// One labelled connected region before the area filter (§4.C step 5) is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentStats {
    pub bbox_x: u32,
    pub bbox_y: u32,
    pub bbox_w: u32,
    pub bbox_h: u32,
    pub centroid_x: u32,
    pub centroid_y: u32,
    pub area: u32,
}

/// Label every foreground (255) pixel of `mask` into 4-connected components
/// and return their statistics. Background (label 0) is excluded.
pub fn label_components(mask: &Mask) -> Vec<ComponentStats> {
    let width = mask.width as usize;
    let height = mask.height as usize;
    let mut labels = vec![0u32; width * height];
    let mut next_label = 1u32;
    let mut stats = Vec::new();
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for start_y in 0..height {
        for start_x in 0..width {
            let idx = start_y * width + start_x;
            if mask.data[idx] != 255 || labels[idx] != 0 {
                continue;
            }

            let label = next_label;
            next_label += 1;
            stack.push((start_x, start_y));
            labels[idx] = label;

            let mut min_x = start_x as u32;
            let mut max_x = start_x as u32;
            let mut min_y = start_y as u32;
            let mut max_y = start_y as u32;
            let mut area: u64 = 0;
            let mut sum_x: u64 = 0;
            let mut sum_y: u64 = 0;

            while let Some((x, y)) = stack.pop() {
                area += 1;
                sum_x += x as u64;
                sum_y += y as u64;
                min_x = min_x.min(x as u32);
                max_x = max_x.max(x as u32);
                min_y = min_y.min(y as u32);
                max_y = max_y.max(y as u32);

                let neighbours = [
                    (x.checked_sub(1), Some(y)),
                    (Some(x + 1), Some(y)),
                    (Some(x), y.checked_sub(1)),
                    (Some(x), Some(y + 1)),
                ];
                for (nx, ny) in neighbours {
                    let (Some(nx), Some(ny)) = (nx, ny) else { continue };
                    if nx >= width || ny >= height {
                        continue;
                    }
                    let nidx = ny * width + nx;
                    if mask.data[nidx] == 255 && labels[nidx] == 0 {
                        labels[nidx] = label;
                        stack.push((nx, ny));
                    }
                }
            }

            stats.push(ComponentStats {
                bbox_x: min_x,
                bbox_y: min_y,
                bbox_w: max_x - min_x + 1,
                bbox_h: max_y - min_y + 1,
                centroid_x: (sum_x / area) as u32,
                centroid_y: (sum_y / area) as u32,
                area: area as u32,
            });
        }
    }

    stats
}
