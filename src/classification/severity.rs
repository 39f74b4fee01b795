//! Size and feature heuristics for issue severity.
//!
//! Both heuristics work on a 224x224 grayscale copy of the photo and vote
//! independently; the combined result is the more severe of the two votes.

use std::collections::VecDeque;

use anyhow::bail;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

use crate::logging::structured::LogContext;
use crate::validation::stats::{laplacian_variance, to_gray};

pub const ANALYSIS_SIZE: u32 = 224;

/// Foreground cut-off for potholes (dark asphalt cavities).
pub const POTHOLE_DARK_THRESHOLD: u8 = 80;
pub const CANNY_LOW: f64 = 50.0;
pub const CANNY_HIGH: f64 = 150.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Small,
    Medium,
    Large,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Small => "small",
            Severity::Medium => "medium",
            Severity::Large => "large",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grayscale copy resized to the analysis square.
pub fn analysis_gray(image: &DynamicImage) -> anyhow::Result<GrayImage> {
    if image.width() == 0 || image.height() == 0 {
        bail!("empty image {}x{}", image.width(), image.height());
    }
    let gray = to_gray(image);
    Ok(image::imageops::resize(
        &gray,
        ANALYSIS_SIZE,
        ANALYSIS_SIZE,
        FilterType::Triangle,
    ))
}

/// Larger of the two votes. A failed vote counts as `Medium`.
pub fn combine_votes(
    by_size: anyhow::Result<Severity>,
    by_features: anyhow::Result<Severity>,
    ctx: &LogContext,
) -> Severity {
    let vote = |result: anyhow::Result<Severity>, heuristic: &str| match result {
        Ok(s) => s,
        Err(e) => {
            log::warn!(
                "{} SEVERITY_HEURISTIC_FAILED heuristic={} error=\"{}\" fallback=medium",
                ctx,
                heuristic,
                e
            );
            Severity::Medium
        }
    };
    let size = vote(by_size, "size");
    let features = vote(by_features, "features");
    let combined = size.max(features);

    log::info!(
        "{} SEVERITY_ESTIMATED severity={} size={} features={}",
        ctx,
        combined,
        size,
        features
    );
    combined
}

/// Run both heuristics for `label`.
pub fn estimate_severity(image: &DynamicImage, label: &str, ctx: &LogContext) -> Severity {
    let gray = match analysis_gray(image) {
        Ok(g) => g,
        Err(e) => {
            log::warn!(
                "{} SEVERITY_HEURISTIC_FAILED heuristic=prepare error=\"{}\" fallback=medium",
                ctx,
                e
            );
            return Severity::Medium;
        }
    };
    combine_votes(
        severity_by_size(&gray, label),
        severity_by_features(&gray, label),
        ctx,
    )
}

/// Largest foreground region: mean of its pixel-area and bounding-box
/// fractions, with pothole-specific dimension cut-offs.
pub fn severity_by_size(gray: &GrayImage, label: &str) -> anyhow::Result<Severity> {
    let total = pixel_count(gray)?;
    let pothole = label == "pothole";

    // foreground is at or below the cut-off
    let threshold = if pothole {
        POTHOLE_DARK_THRESHOLD
    } else {
        otsu_threshold(gray)
    };
    let mask: Vec<bool> = gray.pixels().map(|p| p.0[0] <= threshold).collect();

    let Some(blob) = largest_component(&mask, gray.width(), gray.height()) else {
        return Ok(Severity::Small);
    };

    let area_ratio = blob.area as f64 / total;
    let bbox_ratio = (blob.width() * blob.height()) as f64 / total;
    let avg = (area_ratio + bbox_ratio) / 2.0;
    let (w, h) = (blob.width(), blob.height());

    let severity = if pothole {
        if avg > 0.25 || w > 150 || h > 150 {
            Severity::Large
        } else if avg > 0.12 || w > 80 || h > 80 {
            Severity::Medium
        } else {
            Severity::Small
        }
    } else if avg > 0.30 || bbox_ratio > 0.40 {
        Severity::Large
    } else if avg > 0.15 || bbox_ratio > 0.20 {
        Severity::Medium
    } else {
        Severity::Small
    };
    Ok(severity)
}

/// Potholes: dark ratio and Canny edge density (0.6/0.4).
/// Garbage: Laplacian variance and Otsu coverage (0.5/0.5).
/// Other labels vote `Medium`.
pub fn severity_by_features(gray: &GrayImage, label: &str) -> anyhow::Result<Severity> {
    let total = pixel_count(gray)?;

    match label {
        "pothole" => {
            let dark = gray
                .pixels()
                .filter(|p| p.0[0] < POTHOLE_DARK_THRESHOLD)
                .count() as f64;
            let edges = canny(gray, CANNY_LOW, CANNY_HIGH)
                .iter()
                .filter(|&&e| e)
                .count() as f64;
            let score = (dark / total * 0.6 + edges / total * 0.4) * 100.0;
            Ok(bucket(score, 7.0, 15.0))
        }
        "garbage" => {
            let texture = laplacian_variance(gray);
            let t = otsu_threshold(gray);
            let coverage = gray.pixels().filter(|p| p.0[0] <= t).count() as f64 / total;
            let score = (texture / 100.0 * 0.5 + coverage * 0.5) * 100.0;
            Ok(bucket(score, 10.0, 20.0))
        }
        _ => Ok(Severity::Medium),
    }
}

fn bucket(score: f64, medium_above: f64, large_above: f64) -> Severity {
    if score > large_above {
        Severity::Large
    } else if score > medium_above {
        Severity::Medium
    } else {
        Severity::Small
    }
}

fn pixel_count(gray: &GrayImage) -> anyhow::Result<f64> {
    let n = gray.width() as u64 * gray.height() as u64;
    if n == 0 {
        bail!("empty analysis image");
    }
    Ok(n as f64)
}

/// Otsu's threshold: pixels `<= t` form the darker class.
pub fn otsu_threshold(gray: &GrayImage) -> u8 {
    let mut hist = [0u64; 256];
    for p in gray.pixels() {
        hist[p.0[0] as usize] += 1;
    }
    let total: u64 = hist.iter().sum();
    let sum_all: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    let mut weight_bg = 0u64;
    let mut sum_bg = 0.0;
    let mut best = 0.0;
    let mut threshold = 0u8;

    for t in 0..256usize {
        weight_bg += hist[t];
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }
        sum_bg += t as f64 * hist[t] as f64;
        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (sum_all - sum_bg) / weight_fg as f64;
        let between = weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg).powi(2);
        if between > best {
            best = between;
            threshold = t as u8;
        }
    }
    threshold
}

/// Connected region summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blob {
    pub area: usize,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl Blob {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
}

/// Largest 8-connected `true` region of a row-major mask.
pub fn largest_component(mask: &[bool], width: u32, height: u32) -> Option<Blob> {
    let (w, h) = (width as usize, height as usize);
    let mut seen = vec![false; mask.len()];
    let mut queue = VecDeque::new();
    let mut best: Option<Blob> = None;

    for start in 0..mask.len() {
        if !mask[start] || seen[start] {
            continue;
        }
        seen[start] = true;
        queue.push_back(start);

        let mut blob = Blob {
            area: 0,
            min_x: u32::MAX,
            min_y: u32::MAX,
            max_x: 0,
            max_y: 0,
        };

        while let Some(idx) = queue.pop_front() {
            let (x, y) = (idx % w, idx / w);
            blob.area += 1;
            blob.min_x = blob.min_x.min(x as u32);
            blob.max_x = blob.max_x.max(x as u32);
            blob.min_y = blob.min_y.min(y as u32);
            blob.max_y = blob.max_y.max(y as u32);

            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                    if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                        continue;
                    }
                    let n = ny as usize * w + nx as usize;
                    if mask[n] && !seen[n] {
                        seen[n] = true;
                        queue.push_back(n);
                    }
                }
            }
        }

        if best.map_or(true, |b| blob.area > b.area) {
            best = Some(blob);
        }
    }
    best
}

/// Canny edge map: 3x3 Sobel, L1 magnitude, non-maximum suppression and
/// hysteresis between `low` and `high`.
pub fn canny(gray: &GrayImage, low: f64, high: f64) -> Vec<bool> {
    let (w, h) = (gray.width() as i64, gray.height() as i64);
    let n = (w * h) as usize;
    let px = |x: i64, y: i64| -> f64 {
        let cx = x.clamp(0, w - 1) as u32;
        let cy = y.clamp(0, h - 1) as u32;
        gray.get_pixel(cx, cy).0[0] as f64
    };

    let mut gx = vec![0.0; n];
    let mut gy = vec![0.0; n];
    let mut mag = vec![0.0; n];
    for y in 0..h {
        for x in 0..w {
            let i = (y * w + x) as usize;
            gx[i] = (px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x - 1, y) + px(x - 1, y + 1));
            gy[i] = (px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x, y - 1) + px(x + 1, y - 1));
            mag[i] = gx[i].abs() + gy[i].abs();
        }
    }

    let at = |x: i64, y: i64| -> f64 {
        if x < 0 || y < 0 || x >= w || y >= h {
            0.0
        } else {
            mag[(y * w + x) as usize]
        }
    };

    let tan_22_5 = std::f64::consts::FRAC_PI_8.tan();
    let tan_67_5 = (3.0 * std::f64::consts::FRAC_PI_8).tan();

    // 0 none, 1 weak, 2 strong
    let mut class = vec![0u8; n];
    for y in 0..h {
        for x in 0..w {
            let i = (y * w + x) as usize;
            let m = mag[i];
            if m <= low {
                continue;
            }
            let (ax, ay) = (gx[i].abs(), gy[i].abs());
            let (a, b) = if ay <= ax * tan_22_5 {
                (at(x - 1, y), at(x + 1, y))
            } else if ay >= ax * tan_67_5 {
                (at(x, y - 1), at(x, y + 1))
            } else if gx[i] * gy[i] > 0.0 {
                (at(x - 1, y - 1), at(x + 1, y + 1))
            } else {
                (at(x + 1, y - 1), at(x - 1, y + 1))
            };
            if m > a && m >= b {
                class[i] = if m > high { 2 } else { 1 };
            }
        }
    }

    let mut edges = vec![false; n];
    let mut stack: Vec<usize> = (0..n).filter(|&i| class[i] == 2).collect();
    for &i in &stack {
        edges[i] = true;
    }
    while let Some(i) = stack.pop() {
        let (x, y) = (i as i64 % w, i as i64 / w);
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w || ny >= h {
                    continue;
                }
                let j = (ny * w + nx) as usize;
                if class[j] == 1 && !edges[j] {
                    edges[j] = true;
                    stack.push(j);
                }
            }
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn square(size: u32, bg: u8, fg: u8, x0: u32, y0: u32, side: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if x >= x0 && x < x0 + side && y >= y0 && y < y0 + side {
                Luma([fg])
            } else {
                Luma([bg])
            }
        })
    }

    fn ctx() -> LogContext {
        LogContext::new("test-report")
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Small < Severity::Medium);
        assert!(Severity::Medium < Severity::Large);
        assert_eq!(serde_json::to_value(Severity::Large).unwrap(), "large");
    }

    #[test]
    fn test_combine_takes_max() {
        let s = combine_votes(Ok(Severity::Small), Ok(Severity::Large), &ctx());
        assert_eq!(s, Severity::Large);
        let s = combine_votes(Ok(Severity::Medium), Ok(Severity::Small), &ctx());
        assert_eq!(s, Severity::Medium);
    }

    #[test]
    fn test_failed_vote_counts_as_medium() {
        let s = combine_votes(Err(anyhow::anyhow!("boom")), Ok(Severity::Small), &ctx());
        assert_eq!(s, Severity::Medium);
        let s = combine_votes(Err(anyhow::anyhow!("boom")), Ok(Severity::Large), &ctx());
        assert_eq!(s, Severity::Large);
    }

    #[test]
    fn test_pothole_size_thresholds() {
        // no dark pixels
        let bright = GrayImage::from_pixel(224, 224, Luma([200]));
        assert_eq!(severity_by_size(&bright, "pothole").unwrap(), Severity::Small);

        // 40x40 dark patch: small
        let g = square(224, 200, 20, 10, 10, 40);
        assert_eq!(severity_by_size(&g, "pothole").unwrap(), Severity::Small);

        // 90 px wide: medium by dimension
        let g = square(224, 200, 20, 10, 10, 90);
        assert_eq!(severity_by_size(&g, "pothole").unwrap(), Severity::Medium);

        // 160 px wide: large by dimension
        let g = square(224, 200, 20, 10, 10, 160);
        assert_eq!(severity_by_size(&g, "pothole").unwrap(), Severity::Large);
    }

    #[test]
    fn test_pothole_size_threshold_is_inclusive() {
        let g = square(224, 200, 80, 0, 0, 200);
        assert_eq!(severity_by_size(&g, "pothole").unwrap(), Severity::Large);
        let g = square(224, 200, 81, 0, 0, 200);
        assert_eq!(severity_by_size(&g, "pothole").unwrap(), Severity::Small);
        // the dark-ratio feature stays strict
        let flat = GrayImage::from_pixel(224, 224, Luma([80]));
        assert_eq!(severity_by_features(&flat, "pothole").unwrap(), Severity::Small);
    }

    #[test]
    fn test_garbage_size_uses_otsu() {
        // dark block covering ~36% of the frame
        let g = square(224, 220, 30, 0, 0, 134);
        assert_eq!(severity_by_size(&g, "garbage").unwrap(), Severity::Large);

        let g = square(224, 220, 30, 0, 0, 50);
        assert_eq!(severity_by_size(&g, "garbage").unwrap(), Severity::Small);
    }

    #[test]
    fn test_feature_votes() {
        let flat = GrayImage::from_pixel(224, 224, Luma([200]));
        assert_eq!(severity_by_features(&flat, "pothole").unwrap(), Severity::Small);
        assert_eq!(severity_by_features(&flat, "street_light").unwrap(), Severity::Medium);

        let dark = GrayImage::from_pixel(224, 224, Luma([10]));
        assert_eq!(severity_by_features(&dark, "pothole").unwrap(), Severity::Large);

        // checkerboard: huge Laplacian variance
        let busy = GrayImage::from_fn(224, 224, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        assert_eq!(severity_by_features(&busy, "garbage").unwrap(), Severity::Large);
    }

    #[test]
    fn test_empty_image_is_error() {
        let empty = GrayImage::new(0, 0);
        assert!(severity_by_size(&empty, "pothole").is_err());
        assert!(severity_by_features(&empty, "garbage").is_err());
        let s = estimate_severity(&DynamicImage::new_luma8(0, 0), "pothole", &ctx());
        assert_eq!(s, Severity::Medium);
    }

    #[test]
    fn test_otsu_bimodal() {
        let g = square(100, 200, 40, 0, 0, 50);
        let t = otsu_threshold(&g);
        assert!((40..200).contains(&t));
    }

    #[test]
    fn test_largest_component_eight_connected() {
        // diagonal line joins under 8-connectivity
        #[rustfmt::skip]
        let mask = vec![
            true,  false, false, false,
            false, true,  false, true,
            false, false, true,  false,
            false, false, false, false,
        ];
        let blob = largest_component(&mask, 4, 4).unwrap();
        assert_eq!(blob.area, 4);
        assert_eq!((blob.width(), blob.height()), (4, 3));
        assert!(largest_component(&[false; 4], 2, 2).is_none());
    }

    #[test]
    fn test_canny_finds_step_edge() {
        let g = GrayImage::from_fn(32, 32, |x, _| if x < 16 { Luma([0]) } else { Luma([255]) });
        let edges = canny(&g, CANNY_LOW, CANNY_HIGH);
        let count = edges.iter().filter(|&&e| e).count();
        assert!(count >= 32, "count={}", count);
        // edges hug the step, nothing far from it
        for (i, &e) in edges.iter().enumerate() {
            if e {
                let x = i % 32;
                assert!((14..=17).contains(&x));
            }
        }

        let flat = GrayImage::from_pixel(32, 32, Luma([128]));
        assert!(canny(&flat, CANNY_LOW, CANNY_HIGH).iter().all(|&e| !e));
    }
}
