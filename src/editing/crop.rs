use image::{ImageBuffer, Pixel, imageops};

use crate::models::CropRegion;

/// Pixel rectangle inside an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Resolve a normalized region against an image size.
/// Returns `None` when the region is disabled. The result always holds at least one pixel.
pub fn crop_bounds(width: u32, height: u32, region: &CropRegion) -> Option<BoundingBox> {
    if !region.enabled || width == 0 || height == 0 {
        return None;
    }

    let scale = |v: f32, full: u32| (v.clamp(0.0, 1.0) * full as f32) as u32;
    let x = scale(region.x, width).min(width - 1);
    let y = scale(region.y, height).min(height - 1);
    let w = scale(region.w, width).min(width - x).max(1);
    let h = scale(region.h, height).min(height - y).max(1);

    Some(BoundingBox {
        x,
        y,
        width: w,
        height: h,
    })
}

/// Crop any image buffer by a normalized region, copying the pixels
pub fn apply_crop<P>(img: &ImageBuffer<P, Vec<P::Subpixel>>, region: &CropRegion) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
{
    let (width, height) = img.dimensions();
    match crop_bounds(width, height, region) {
        Some(bbox) => imageops::crop_imm(img, bbox.x, bbox.y, bbox.width, bbox.height).to_image(),
        None => img.clone(),
    }
}
