//! Grayscale pixel statistics shared by the quality checks and the
//! severity heuristics.

use image::{DynamicImage, GrayImage, Luma, RgbImage};

/// Convert RGB to grayscale using ITU-R BT.601 luminance.
pub fn rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    let (w, h) = rgb.dimensions();
    let mut gray = GrayImage::new(w, h);
    for (x, y, p) in rgb.enumerate_pixels() {
        let luma = 0.299 * p.0[0] as f32 + 0.587 * p.0[1] as f32 + 0.114 * p.0[2] as f32;
        gray.put_pixel(x, y, Luma([luma.round().clamp(0.0, 255.0) as u8]));
    }
    gray
}

/// Grayscale view of any decoded image. Single-channel input is used as is.
pub fn to_gray(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other => rgb_to_gray(&other.to_rgb8()),
    }
}

pub fn mean_intensity(img: &GrayImage) -> f64 {
    let n = img.as_raw().len();
    if n == 0 {
        return 0.0;
    }
    img.as_raw().iter().map(|&v| v as f64).sum::<f64>() / n as f64
}

/// Population standard deviation of pixel intensities.
pub fn std_dev(img: &GrayImage) -> f64 {
    let n = img.as_raw().len();
    if n == 0 {
        return 0.0;
    }
    let mean = mean_intensity(img);
    let var = img
        .as_raw()
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n as f64;
    var.sqrt()
}

/// Variance of the 4-neighbour Laplacian `[0,1,0; 1,-4,1; 0,1,0]`.
///
/// Borders are reflected (`gfedcb|abcdefgh|gfedcba`) so every pixel
/// contributes. Images smaller than 3x3 return 0.
pub fn laplacian_variance(img: &GrayImage) -> f64 {
    let (w, h) = img.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }

    let px = |x: i64, y: i64| -> f64 {
        let x = reflect(x, w as i64);
        let y = reflect(y, h as i64);
        img.get_pixel(x as u32, y as u32).0[0] as f64
    };

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let count = (w as u64 * h as u64) as f64;

    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let lap = px(x, y - 1) + px(x, y + 1) + px(x - 1, y) + px(x + 1, y) - 4.0 * px(x, y);
            sum += lap;
            sum_sq += lap * lap;
        }
    }

    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}

/// Reflect-101 border index.
pub(crate) fn reflect(i: i64, len: i64) -> i64 {
    if len == 1 {
        return 0;
    }
    let mut i = i;
    while i < 0 || i >= len {
        if i < 0 {
            i = -i;
        }
        if i >= len {
            i = 2 * (len - 1) - i;
        }
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_gray_white_and_black() {
        let white = RgbImage::from_pixel(4, 4, Rgb([255, 255, 255]));
        assert!(rgb_to_gray(&white).pixels().all(|p| p.0[0] == 255));
        let black = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
        assert!(rgb_to_gray(&black).pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn test_uniform_image_has_no_variation() {
        let img = GrayImage::from_pixel(50, 50, Luma([128]));
        assert_eq!(mean_intensity(&img), 128.0);
        assert_eq!(std_dev(&img), 0.0);
        assert_eq!(laplacian_variance(&img), 0.0);
    }

    #[test]
    fn test_checkerboard_is_sharp() {
        let img = GrayImage::from_fn(100, 100, |x, y| {
            if (x / 5 + y / 5) % 2 == 0 {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        assert!(laplacian_variance(&img) > 1000.0);
        assert!(std_dev(&img) > 100.0);
    }

    #[test]
    fn test_tiny_image_laplacian_zero() {
        let img = GrayImage::from_pixel(2, 2, Luma([10]));
        assert_eq!(laplacian_variance(&img), 0.0);
    }

    #[test]
    fn test_reflect() {
        assert_eq!(reflect(-1, 5), 1);
        assert_eq!(reflect(5, 5), 3);
        assert_eq!(reflect(2, 5), 2);
        assert_eq!(reflect(-3, 1), 0);
    }
}
