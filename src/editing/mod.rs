pub mod adjust;
pub mod background;
pub mod crop;
pub mod presets;
pub mod steps;

use anyhow::{Context, Result};
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgba, RgbImage, RgbaImage};
use log::info;
use std::path::Path;
use std::sync::Arc;

use crate::models::EditParams;
use crate::pipeline::{Pipeline, PipelineData};

/// Split an image into an RGB colour plane and, if it has one, its alpha plane
pub fn split_alpha(img: &DynamicImage) -> (RgbImage, Option<GrayImage>) {
    if !img.color().has_alpha() {
        return (img.to_rgb8(), None);
    }
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    let rgb = RgbImage::from_fn(w, h, |x, y| {
        let [r, g, b, _] = rgba.get_pixel(x, y).0;
        image::Rgb([r, g, b])
    });
    let alpha = GrayImage::from_fn(w, h, |x, y| Luma([rgba.get_pixel(x, y)[3]]));
    (rgb, Some(alpha))
}

/// Combine a colour plane with an alpha plane of the same size
pub fn merge_alpha(rgb: &RgbImage, alpha: &GrayImage) -> RgbaImage {
    let (w, h) = rgb.dimensions();
    RgbaImage::from_fn(w, h, |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let a = alpha.get_pixel_checked(x, y).map(|p| p[0]).unwrap_or(255);
        Rgba([r, g, b, a])
    })
}

/// Build the editing pipeline for a parameter set.
///
/// Stage order: brightness, sharpness, noise reduction, preset, RGB gain, crop.
/// Monochrome presets skip the RGB gain; a disabled crop adds no crop stage.
pub fn build_edit_pipeline(params: &EditParams) -> Pipeline {
    use crate::editing::steps::*;

    let mut pipeline = Pipeline::new()
        .add_step(Arc::new(BrightnessStep {
            value: params.brightness,
        }))
        .add_step(Arc::new(SharpnessStep {
            value: params.sharpness,
        }))
        .add_step(Arc::new(NoiseReductionStep {
            value: params.denoise,
        }))
        .add_step(Arc::new(PresetStep {
            preset: params.preset,
        }));

    if params.preset.keeps_rgb_gain() {
        pipeline = pipeline.add_step(Arc::new(RgbGainStep {
            red: params.red,
            green: params.green,
            blue: params.blue,
        }));
    }

    if params.crop.enabled {
        pipeline = pipeline.add_step(Arc::new(CropStep {
            region: params.crop,
        }));
    }

    pipeline
}

/// Render an image through the editing pipeline. Transparency is preserved.
pub fn process_image(img: &DynamicImage, params: &EditParams) -> Result<DynamicImage> {
    let (rgb, alpha) = split_alpha(img);
    let out = build_edit_pipeline(params).run(PipelineData::with_alpha(rgb, alpha))?;
    Ok(out.to_dynamic())
}

/// Same as [`process_image`], saving every intermediate stage under `debug_dir`
pub fn process_image_debug(img: &DynamicImage, params: &EditParams, debug_dir: &Path) -> Result<DynamicImage> {
    let (rgb, alpha) = split_alpha(img);
    let out = build_edit_pipeline(params)
        .with_debug(debug_dir)?
        .run(PipelineData::with_alpha(rgb, alpha))?;
    Ok(out.to_dynamic())
}

/// Write an image, picking the format from the file extension.
/// JPEG and BMP cannot hold transparency, so the alpha channel is dropped for them.
pub fn export_image(img: &DynamicImage, path: &Path) -> Result<()> {
    let format = ImageFormat::from_path(path)
        .with_context(|| format!("Unsupported export format: {}", path.display()))?;

    let out = match format {
        ImageFormat::Jpeg | ImageFormat::Bmp if img.color().has_alpha() => {
            DynamicImage::ImageRgb8(img.to_rgb8())
        }
        _ => img.clone(),
    };
    out.save_with_format(path, format)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Exported {}x{} image to {}", out.width(), out.height(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CropRegion, Preset};
    use image::Rgb;

    #[test]
    fn neutral_params_are_identity() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(8, 8, |x, y| Rgb([x as u8 * 30, y as u8 * 30, 77])));
        let out = process_image(&img, &EditParams::default()).unwrap();
        assert_eq!(out.to_rgb8(), img.to_rgb8());
        assert!(!out.color().has_alpha());
    }

    #[test]
    fn rgb_gain_is_skipped_for_monochrome_presets() {
        let params = EditParams {
            preset: Preset::Noir,
            red: 100,
            ..Default::default()
        };
        let names = build_edit_pipeline(&params).step_names().join(",");
        assert!(!names.contains("RGB Gain"));

        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([100, 100, 100])));
        let out = process_image(&img, &params).unwrap().to_rgb8();
        let p = out.get_pixel(0, 0);
        assert_eq!(p[0], p[1]);
    }

    #[test]
    fn rgb_gain_applies_after_warm_preset() {
        let params = EditParams {
            preset: Preset::DramaticWarm,
            blue: -100,
            ..Default::default()
        };
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([100, 100, 100])));
        let out = process_image(&img, &params).unwrap().to_rgb8();
        assert_eq!(out.get_pixel(0, 0), &Rgb([132, 120, 0]));
    }

    #[test]
    fn alpha_survives_and_crops() {
        let mut rgba = RgbaImage::from_pixel(10, 10, Rgba([50, 60, 70, 255]));
        rgba.put_pixel(9, 9, Rgba([0, 0, 0, 0]));
        let img = DynamicImage::ImageRgba8(rgba);
        let params = EditParams {
            brightness: 10,
            crop: CropRegion::new(0.5, 0.5, 0.5, 0.5),
            ..Default::default()
        };
        let out = process_image(&img, &params).unwrap().to_rgba8();
        assert_eq!(out.dimensions(), (5, 5));
        assert_eq!(out.get_pixel(0, 0).0, [60, 70, 80, 255]);
        assert_eq!(out.get_pixel(4, 4)[3], 0);
    }

    #[test]
    fn jpeg_export_drops_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(6, 6, Rgba([200, 10, 10, 0])));

        let jpg = dir.path().join("out.jpg");
        export_image(&img, &jpg).unwrap();
        assert!(!image::open(&jpg).unwrap().color().has_alpha());

        let png = dir.path().join("out.png");
        export_image(&img, &png).unwrap();
        assert_eq!(image::open(&png).unwrap().to_rgba8().get_pixel(0, 0)[3], 0);

        assert!(export_image(&img, &dir.path().join("out.nope")).is_err());
    }
}
