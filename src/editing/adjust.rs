use image::{Rgb, RgbImage};
use imageproc::filter::median_filter;

/// Scale, shift, take the absolute value and saturate to u8
pub fn convert_scale_abs(value: u8, alpha: f32, beta: f32) -> u8 {
    (value as f32 * alpha + beta).abs().round().min(255.0) as u8
}

/// Apply `convert_scale_abs` to every channel of every pixel
pub fn scale_abs(img: &RgbImage, alpha: f32, beta: f32) -> RgbImage {
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        for c in pixel.0.iter_mut() {
            *c = convert_scale_abs(*c, alpha, beta);
        }
    }
    out
}

/// Shift all channels by `value` (negative darkens)
pub fn brightness(img: &RgbImage, value: i32) -> RgbImage {
    if value == 0 {
        return img.clone();
    }
    scale_abs(img, 1.0, value as f32)
}

/// Laplacian-style sharpening; non-positive strengths leave the image untouched
pub fn sharpness(img: &RgbImage, value: i32) -> RgbImage {
    if value <= 0 {
        return img.clone();
    }
    let center = 5.0 + value as f32 / 10.0;
    let kernel = [0.0, -1.0, 0.0, -1.0, center, -1.0, 0.0, -1.0, 0.0];
    convolve3x3(img, &kernel)
}

/// Median filter whose window grows by 2 for every 10 points of strength
pub fn noise_reduction(img: &RgbImage, value: i32) -> RgbImage {
    if value <= 0 {
        return img.clone();
    }
    let k = ((value / 10) * 2 + 1).max(1) as u32;
    let radius = (k - 1) / 2;
    if radius == 0 {
        return img.clone();
    }
    median_filter(img, radius, radius)
}

/// Per-channel gain, each value in [-100, 100] maps to a factor of `1 + v/100`
pub fn rgb_gain(img: &RgbImage, red: i32, green: i32, blue: i32) -> RgbImage {
    if red == 0 && green == 0 && blue == 0 {
        return img.clone();
    }
    let factors = [
        1.0 + red as f32 / 100.0,
        1.0 + green as f32 / 100.0,
        1.0 + blue as f32 / 100.0,
    ];
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        for (c, factor) in pixel.0.iter_mut().zip(factors) {
            *c = (*c as f32 * factor).clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// ITU-R BT.601 luma in 14-bit fixed point, rounded
pub fn luma(pixel: &Rgb<u8>) -> u8 {
    let [r, g, b] = pixel.0;
    ((r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + (1 << 13)) >> 14) as u8
}

/// Grey image kept in three channels
pub fn grayscale(img: &RgbImage) -> RgbImage {
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        let y = luma(pixel);
        *pixel = Rgb([y, y, y]);
    }
    out
}

/// Reflect an out-of-range index back inside `0..len` without repeating the edge
fn reflect(i: i64, len: i64) -> u32 {
    if len == 1 {
        return 0;
    }
    let mut i = i;
    if i < 0 {
        i = -i;
    }
    if i >= len {
        i = 2 * len - 2 - i;
    }
    i as u32
}

/// 3x3 correlation on every channel, saturated back to u8
pub fn convolve3x3(img: &RgbImage, kernel: &[f32; 9]) -> RgbImage {
    let (width, height) = img.dimensions();
    let (w, h) = (width as i64, height as i64);
    let mut out = RgbImage::new(width, height);

    for y in 0..h {
        for x in 0..w {
            let mut acc = [0.0f32; 3];
            for ky in -1..=1 {
                for kx in -1..=1 {
                    let weight = kernel[((ky + 1) * 3 + (kx + 1)) as usize];
                    if weight == 0.0 {
                        continue;
                    }
                    let sample = img.get_pixel(reflect(x + kx, w), reflect(y + ky, h));
                    for (a, c) in acc.iter_mut().zip(sample.0) {
                        *a += weight * c as f32;
                    }
                }
            }
            out.put_pixel(
                x as u32,
                y as u32,
                Rgb(acc.map(|v| v.round().clamp(0.0, 255.0) as u8)),
            );
        }
    }

    out
}
