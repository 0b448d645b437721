//! Gray-level noise suppression ahead of edge detection.

use image::{GrayImage, Luma};

use crate::params::Smoothing;

/// Apply the configured smoothing; `Smoothing::None` returns a copy.
pub fn smooth(gray: &GrayImage, smoothing: &Smoothing) -> GrayImage {
    match *smoothing {
        Smoothing::None => gray.clone(),
        Smoothing::Gaussian { sigma } => imageproc::filter::gaussian_blur_f32(gray, sigma),
        Smoothing::Bilateral {
            diameter,
            sigma_color,
            sigma_space,
        } => bilateral_filter(gray, diameter, sigma_color, sigma_space),
    }
}

/// Edge-preserving bilateral filter over a circular `diameter` window.
///
/// Each output pixel is a weighted mean of its neighbours, weighted by
/// spatial distance (`sigma_space`) and intensity difference
/// (`sigma_color`). Borders are replicated.
pub fn bilateral_filter(
    src: &GrayImage,
    diameter: u32,
    sigma_color: f32,
    sigma_space: f32,
) -> GrayImage {
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return src.clone();
    }

    let radius = (diameter / 2).max(1) as i64;
    let space_coeff = -0.5 / (sigma_space * sigma_space);
    let color_coeff = -0.5 / (sigma_color * sigma_color);

    let color_lut: Vec<f32> = (0..256u32)
        .map(|d| ((d * d) as f32 * color_coeff).exp())
        .collect();

    let mut kernel = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let d2 = dx * dx + dy * dy;
            if d2 > radius * radius {
                continue;
            }
            kernel.push((dx, dy, (d2 as f32 * space_coeff).exp()));
        }
    }

    let max_x = w as i64 - 1;
    let max_y = h as i64 - 1;
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let center = src.get_pixel(x, y)[0];
            let mut acc = 0.0f32;
            let mut norm = 0.0f32;
            for &(dx, dy, w_space) in &kernel {
                let sx = (x as i64 + dx).clamp(0, max_x) as u32;
                let sy = (y as i64 + dy).clamp(0, max_y) as u32;
                let v = src.get_pixel(sx, sy)[0];
                let wgt = w_space * color_lut[center.abs_diff(v) as usize];
                acc += wgt * v as f32;
                norm += wgt;
            }
            let value = if norm > 0.0 { acc / norm } else { center as f32 };
            out.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}
