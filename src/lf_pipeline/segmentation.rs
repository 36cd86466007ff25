//! Region partition of a view's inverse-depth map.
//!
//! Encoder and decoder must arrive at byte-identical partitions without
//! transmitting them, so everything here is deterministic: centroids are
//! seeded evenly over the depth range, refined for a fixed iteration
//! count, and the final label map gets one 3x3 majority pass for spatial
//! coherence.

/// Partition of one view's inverse-depth map into `regions` regions.
/// Labels are 1-based; `region_sizes` is ordered by region id.
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub labels: Vec<u32>,
    pub region_sizes: Vec<(u32, usize)>,
    pub regions: u32,
}

pub fn segment_inverse_depth(
    depth: &[u16],
    width: usize,
    height: usize,
    regions: u32,
    iterations: u32,
) -> Segmentation {
    debug_assert_eq!(depth.len(), width * height);
    let k = regions.max(1) as usize;

    let min = depth.iter().copied().min().unwrap_or(0) as f64;
    let max = depth.iter().copied().max().unwrap_or(0) as f64;

    // Evenly spaced centroid seeds across the observed depth range.
    let mut centroids: Vec<f64> = (0..k)
        .map(|i| min + (max - min) * (i as f64 + 0.5) / k as f64)
        .collect();

    let mut labels = vec![0u32; depth.len()];
    for _ in 0..iterations.max(1) {
        // Assignment: nearest centroid, ties to the smaller id.
        for (p, &d) in depth.iter().enumerate() {
            let mut best = 0usize;
            let mut best_dist = f64::INFINITY;
            for (i, &c) in centroids.iter().enumerate() {
                let dist = (d as f64 - c).abs();
                if dist < best_dist {
                    best_dist = dist;
                    best = i;
                }
            }
            labels[p] = best as u32 + 1;
        }

        // Update: mean of the assigned samples; empty clusters keep their
        // centroid so the region count never collapses.
        let mut sums = vec![0.0f64; k];
        let mut counts = vec![0usize; k];
        for (p, &d) in depth.iter().enumerate() {
            let i = labels[p] as usize - 1;
            sums[i] += d as f64;
            counts[i] += 1;
        }
        for i in 0..k {
            if counts[i] > 0 {
                centroids[i] = sums[i] / counts[i] as f64;
            }
        }
    }

    majority_smooth(&mut labels, width, height, k);

    let mut region_sizes: Vec<(u32, usize)> = (1..=k as u32).map(|id| (id, 0)).collect();
    for &label in &labels {
        region_sizes[label as usize - 1].1 += 1;
    }

    Segmentation {
        labels,
        region_sizes,
        regions: k as u32,
    }
}

/// One 3x3 majority vote over the label map; ties keep the smaller label.
fn majority_smooth(labels: &mut [u32], width: usize, height: usize, k: usize) {
    let snapshot = labels.to_vec();
    let mut votes = vec![0usize; k + 1];

    for y in 0..height {
        for x in 0..width {
            votes.iter_mut().for_each(|v| *v = 0);
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    let ny = y as i32 + dy;
                    let nx = x as i32 + dx;
                    if ny < 0 || nx < 0 || ny >= height as i32 || nx >= width as i32 {
                        continue;
                    }
                    votes[snapshot[ny as usize * width + nx as usize] as usize] += 1;
                }
            }
            let mut best = snapshot[y * width + x] as usize;
            for (label, &count) in votes.iter().enumerate().skip(1) {
                if count > votes[best] {
                    best = label;
                }
            }
            labels[y * width + x] = best as u32;
        }
    }
}
