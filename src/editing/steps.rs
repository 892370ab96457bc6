use anyhow::Result;

use crate::editing::{adjust, crop, presets};
use crate::models::{CropRegion, Preset};
use crate::pipeline::{MetadataValue, PipelineContext, PipelineData, PipelineStep};

/// Shift brightness of every channel
pub struct BrightnessStep {
    pub value: i32,
}

impl PipelineStep for BrightnessStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let adjusted = adjust::brightness(&item.image, self.value);
            result.push(item.map_image(adjusted));
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Brightness"
    }
}

/// Sharpen with a 3x3 kernel
pub struct SharpnessStep {
    pub value: i32,
}

impl PipelineStep for SharpnessStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let sharpened = adjust::sharpness(&item.image, self.value);
            result.push(item.map_image(sharpened));
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Sharpness"
    }
}

/// Median filter noise reduction
pub struct NoiseReductionStep {
    pub value: i32,
}

impl PipelineStep for NoiseReductionStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let filtered = adjust::noise_reduction(&item.image, self.value);
            result.push(item.map_image(filtered));
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Noise Reduction"
    }
}

/// Preset colour look
pub struct PresetStep {
    pub preset: Preset,
}

impl PipelineStep for PresetStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let looked = presets::apply_preset(&item.image, self.preset);
            result.push(
                item.map_image(looked)
                    .with_metadata("preset", MetadataValue::String(self.preset.to_string())),
            );
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Preset"
    }
}

/// Per-channel RGB gain
pub struct RgbGainStep {
    pub red: i32,
    pub green: i32,
    pub blue: i32,
}

impl PipelineStep for RgbGainStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let tinted = adjust::rgb_gain(&item.image, self.red, self.green, self.blue);
            result.push(item.map_image(tinted));
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "RGB Gain"
    }
}

/// Crop colour and alpha planes by a normalized region
pub struct CropStep {
    pub region: CropRegion,
}

impl PipelineStep for CropStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for mut item in data {
            item.image = crop::apply_crop(&item.image, &self.region);
            item.alpha = item.alpha.map(|alpha| crop::apply_crop(&alpha, &self.region));
            let (w, h) = item.image.dimensions();
            result.push(
                item.with_metadata("crop_width", MetadataValue::Int(w as i32))
                    .with_metadata("crop_height", MetadataValue::Int(h as i32)),
            );
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Crop"
    }
}
