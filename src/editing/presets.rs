use image::{Rgb, RgbImage};

use crate::editing::adjust::{convert_scale_abs, grayscale, luma, scale_abs};
use crate::models::Preset;

/// Contrast/brightness lift shared by the dramatic looks
const DRAMATIC_ALPHA: f32 = 1.15;
const DRAMATIC_BETA: f32 = 5.0;
const CHANNEL_BOOST: f32 = 1.10;
const CHANNEL_CUT: f32 = 0.92;

const NOIR_ALPHA: f32 = 1.3;
const NOIR_BETA: f32 = -10.0;

/// Apply a preset look to an RGB image
pub fn apply_preset(img: &RgbImage, preset: Preset) -> RgbImage {
    match preset {
        Preset::None => img.clone(),
        Preset::Mono => grayscale(img),
        Preset::DramaticWarm => dramatic(img, [CHANNEL_BOOST, 1.0, CHANNEL_CUT]),
        Preset::DramaticCool => dramatic(img, [CHANNEL_CUT, 1.0, CHANNEL_BOOST]),
        Preset::Noir => noir(img),
    }
}

fn dramatic(img: &RgbImage, channel_alpha: [f32; 3]) -> RgbImage {
    let mut out = scale_abs(img, DRAMATIC_ALPHA, DRAMATIC_BETA);
    for pixel in out.pixels_mut() {
        for (c, alpha) in pixel.0.iter_mut().zip(channel_alpha) {
            if alpha != 1.0 {
                *c = convert_scale_abs(*c, alpha, 0.0);
            }
        }
    }
    out
}

fn noir(img: &RgbImage) -> RgbImage {
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        let y = convert_scale_abs(luma(pixel), NOIR_ALPHA, NOIR_BETA);
        *pixel = Rgb([y, y, y]);
    }
    out
}
