use anyhow::{Context, Result};
use image::{DynamicImage, GrayImage, RgbImage};
use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::editing::merge_alpha;

/// Data that flows through the pipeline.
/// Each PipelineData is one image (colour plane plus optional alpha) with metadata.
#[derive(Clone)]
pub struct PipelineData {
    /// Colour plane, always 8-bit RGB
    pub image: RgbImage,

    /// Transparency plane; steps other than cropping pass it through untouched
    pub alpha: Option<GrayImage>,

    /// Values recorded by steps (e.g. "preset", "crop_width")
    pub metadata: HashMap<String, MetadataValue>,
}

/// Metadata value types
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Bool(bool),
    String(String),
    Int(i32),
}

impl PipelineData {
    /// Create PipelineData for an opaque image
    pub fn from_image(image: RgbImage) -> Self {
        Self::with_alpha(image, None)
    }

    /// Create PipelineData for an image with an optional alpha plane
    pub fn with_alpha(image: RgbImage, alpha: Option<GrayImage>) -> Self {
        Self {
            image,
            alpha,
            metadata: HashMap::new(),
        }
    }

    /// Replace the colour plane, keeping alpha and metadata
    pub fn map_image(mut self, image: RgbImage) -> Self {
        self.image = image;
        self
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.metadata.get(key) {
            Some(MetadataValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i32> {
        match self.metadata.get(key) {
            Some(MetadataValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.metadata.get(key) {
            Some(MetadataValue::String(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Colour and alpha merged into one image (RGB8 when opaque, RGBA8 otherwise)
    pub fn to_dynamic(&self) -> DynamicImage {
        match &self.alpha {
            Some(alpha) => DynamicImage::ImageRgba8(merge_alpha(&self.image, alpha)),
            None => DynamicImage::ImageRgb8(self.image.clone()),
        }
    }
}

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
    /// Whether debug mode is enabled
    pub enabled: bool,
}

impl DebugConfig {
    fn save_step(&self, step_idx: usize, step_name: &str, data: &[PipelineData]) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let step_dir_name = format!(
            "{:02}_{}",
            step_idx,
            step_name.to_lowercase().replace(' ', "_")
        );
        let step_dir = self.output_dir.join(&step_dir_name);
        std::fs::create_dir_all(&step_dir)?;

        for (idx, item) in data.iter().enumerate() {
            let output_path = step_dir.join(format!("{:02}.png", idx + 1));
            item.to_dynamic()
                .save(&output_path)
                .with_context(|| format!("Failed to save debug image {:?}", output_path))?;
        }
        debug!("Debug: saved {} images to {}/", data.len(), step_dir_name);
        Ok(())
    }
}

/// Context available to all pipeline steps
#[derive(Clone, Default)]
pub struct PipelineContext {
    pub debug: Option<DebugConfig>,
}

/// Trait that all pipeline steps must implement
pub trait PipelineStep: Send + Sync {
    /// Process data and return transformed data
    fn process(&self, data: Vec<PipelineData>, context: &PipelineContext) -> Result<Vec<PipelineData>>;

    /// Human-readable name for this step (used in logs and debug directory names)
    fn name(&self) -> &str;
}

/// Composable pipeline builder
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    context: PipelineContext,
}

impl Pipeline {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            context: PipelineContext::default(),
        }
    }

    /// Enable debug mode with output directory.
    /// The directory must be empty or non-existent.
    pub fn with_debug(mut self, output_dir: impl AsRef<Path>) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                anyhow::bail!("Debug directory is not empty: {}", output_dir.display());
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.context.debug = Some(DebugConfig {
            output_dir,
            enabled: true,
        });

        Ok(self)
    }

    /// Add a processing step to the pipeline
    pub fn add_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Helper method to add a step from a Box
    pub fn add_step_boxed(mut self, step: Box<dyn PipelineStep>) -> Self {
        self.steps.push(Arc::from(step));
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step on a single input
    pub fn run(&self, input: PipelineData) -> Result<PipelineData> {
        self.run_partial(input, self.steps.len())
    }

    /// Run the first `num_steps` steps (useful for debugging)
    pub fn run_partial(&self, input: PipelineData, num_steps: usize) -> Result<PipelineData> {
        if let Some(debug_config) = &self.context.debug {
            debug_config.save_step(0, "input", std::slice::from_ref(&input))?;
        }

        let mut data = vec![input];
        for (step_idx, step) in self.steps.iter().take(num_steps).enumerate() {
            debug!("Running step {}: {} ({} items)", step_idx + 1, step.name(), data.len());
            data = step.process(data, &self.context)?;

            if let Some(debug_config) = &self.context.debug {
                debug_config.save_step(step_idx + 1, step.name(), &data)?;
            }
        }

        let mut data = data.into_iter();
        match (data.next(), data.next()) {
            (Some(item), None) => Ok(item),
            (None, _) => anyhow::bail!("Pipeline produced no image"),
            (Some(_), Some(_)) => anyhow::bail!("Pipeline produced more than one image"),
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    struct InvertStep;

    impl PipelineStep for InvertStep {
        fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
            Ok(data
                .into_iter()
                .map(|mut item| {
                    image::imageops::invert(&mut item.image);
                    item.with_metadata("inverted", MetadataValue::Bool(true))
                })
                .collect())
        }

        fn name(&self) -> &str {
            "Invert"
        }
    }

    struct DropStep;

    impl PipelineStep for DropStep {
        fn process(&self, _data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
            Ok(vec![])
        }

        fn name(&self) -> &str {
            "Drop"
        }
    }

    #[test]
    fn steps_run_in_order_and_keep_metadata() {
        let input = PipelineData::from_image(RgbImage::from_pixel(2, 2, Rgb([10, 20, 30])));
        let pipeline = Pipeline::new()
            .add_step(Arc::new(InvertStep))
            .add_step_boxed(Box::new(InvertStep));
        let out = pipeline.run(input).unwrap();
        assert_eq!(out.image.get_pixel(0, 0), &Rgb([10, 20, 30]));
        assert_eq!(out.get_bool("inverted"), Some(true));
        assert_eq!(pipeline.step_names(), vec!["Invert", "Invert"]);
    }

    #[test]
    fn run_partial_stops_early() {
        let input = PipelineData::from_image(RgbImage::from_pixel(1, 1, Rgb([0, 0, 0])));
        let pipeline = Pipeline::new()
            .add_step(Arc::new(InvertStep))
            .add_step(Arc::new(DropStep));
        let out = pipeline.run_partial(input.clone(), 1).unwrap();
        assert_eq!(out.image.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert!(pipeline.run(input).is_err());
    }

    #[test]
    fn debug_dir_must_be_empty() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        std::fs::write(dir.path().join("junk.txt"), b"x")?;
        assert!(Pipeline::new().with_debug(dir.path()).is_err());

        let fresh = dir.path().join("fresh");
        let pipeline = Pipeline::new().with_debug(&fresh)?.add_step(Arc::new(InvertStep));
        pipeline.run(PipelineData::from_image(RgbImage::new(3, 3)))?;
        assert!(fresh.join("00_input").join("01.png").is_file());
        assert!(fresh.join("01_invert").join("01.png").is_file());
        Ok(())
    }
}
