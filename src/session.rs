//! Edit session: committed base images, live parameters, undo history, crop box and
//! the background removal worker.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, RgbaImage};
use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::editing::background::{self, CancelFlag};
use crate::editing::{crop, export_image, merge_alpha, process_image, split_alpha};
use crate::history::{History, HistoryState};
use crate::models::{Adjustment, CropRatio, CropRegion, EditParams, Preset};
use crate::overlay::{BoxMode, CropOverlay};

/// Panel the session is currently showing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tab {
    #[default]
    Adjust,
    Filter,
    RemoveBg,
    Crop,
}

/// State of the background removal worker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RemoveStatus {
    #[default]
    Idle,
    Running,
    Cancelling,
    Cancelled,
    Failed(String),
    Done,
    Applied,
}

impl fmt::Display for RemoveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoveStatus::Idle => f.write_str("Idle"),
            RemoveStatus::Running => f.write_str("Removing..."),
            RemoveStatus::Cancelling => f.write_str("Cancelling..."),
            RemoveStatus::Cancelled => f.write_str("Cancelled"),
            RemoveStatus::Failed(msg) => write!(f, "Failed: {}", msg),
            RemoveStatus::Done => f.write_str("Done"),
            RemoveStatus::Applied => f.write_str("Applied"),
        }
    }
}

struct RemovalJob {
    handle: JoinHandle<Result<Option<RgbaImage>>>,
    cancel: CancelFlag,
}

pub struct EditSession {
    bases: Vec<DynamicImage>,
    base_idx: usize,
    params: EditParams,
    history: History,
    tab: Tab,
    overlay: CropOverlay,
    crop_dirty: bool,
    removal: Option<RemovalJob>,
    remove_status: RemoveStatus,
    pending_removal: Option<RgbaImage>,
    remove_dirty: bool,
}

impl EditSession {
    pub fn new(image: DynamicImage) -> Self {
        let dims = (image.width(), image.height());
        let params = EditParams::default();
        Self {
            bases: vec![image],
            base_idx: 0,
            history: History::new(HistoryState {
                base_idx: 0,
                params: params.clone(),
            }),
            params,
            tab: Tab::default(),
            overlay: CropOverlay::new(dims, dims),
            crop_dirty: false,
            removal: None,
            remove_status: RemoveStatus::default(),
            pending_removal: None,
            remove_dirty: false,
        }
    }

    /// Rebuild a session from stored bases and history. The current state of the
    /// history decides the active base and parameters.
    pub fn from_parts(bases: Vec<DynamicImage>, history: History) -> Result<Self> {
        if bases.is_empty() {
            anyhow::bail!("Session has no base images");
        }
        if let Some(bad) = history.states().iter().find(|s| s.base_idx >= bases.len()) {
            anyhow::bail!(
                "History refers to base image {} but only {} are stored",
                bad.base_idx,
                bases.len()
            );
        }
        let current = history
            .current()
            .cloned()
            .context("Session history is empty")?;

        let dims = (bases[current.base_idx].width(), bases[current.base_idx].height());
        let mut overlay = CropOverlay::new(dims, dims);
        overlay.set_aspect(current.params.crop_ratio.aspect());

        Ok(Self {
            bases,
            base_idx: current.base_idx,
            params: current.params,
            history,
            tab: Tab::default(),
            overlay,
            crop_dirty: false,
            removal: None,
            remove_status: RemoveStatus::default(),
            pending_removal: None,
            remove_dirty: false,
        })
    }

    pub fn bases(&self) -> &[DynamicImage] {
        &self.bases
    }

    pub fn base_idx(&self) -> usize {
        self.base_idx
    }

    pub fn current_base(&self) -> &DynamicImage {
        &self.bases[self.base_idx]
    }

    pub fn params(&self) -> &EditParams {
        &self.params
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn tab(&self) -> Tab {
        self.tab
    }

    pub fn overlay(&self) -> &CropOverlay {
        &self.overlay
    }

    pub fn is_crop_dirty(&self) -> bool {
        self.crop_dirty
    }

    pub fn remove_status(&self) -> &RemoveStatus {
        &self.remove_status
    }

    pub fn is_removing(&self) -> bool {
        self.removal.is_some()
    }

    /// Segmentation result waiting to be applied
    pub fn pending_removal(&self) -> Option<&RgbaImage> {
        self.pending_removal.as_ref()
    }

    pub fn can_undo(&self) -> bool {
        !self.is_removing() && self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        !self.is_removing() && self.history.can_redo()
    }

    /// Switch panels. Ignored while background removal runs.
    pub fn open_tab(&mut self, tab: Tab) -> bool {
        if self.is_removing() {
            return false;
        }
        self.tab = tab;
        self.refresh_overlay();
        true
    }

    fn refresh_overlay(&mut self) {
        self.overlay
            .set_enabled(self.tab == Tab::Crop && self.params.crop_ratio != CropRatio::Original);
    }

    /// Size of the widget the crop box is drawn in
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.overlay.set_viewport((width, height));
    }

    fn snapshot(&self) -> HistoryState {
        HistoryState {
            base_idx: self.base_idx,
            params: self.params.clone(),
        }
    }

    fn push_history(&mut self) {
        let state = self.snapshot();
        if self.history.push(state) {
            debug!("History now at {}/{}", self.history.cursor() + 1, self.history.len());
        }
    }

    /// Live slider change; recorded on [`EditSession::commit`]
    pub fn set_adjustment(&mut self, adjustment: Adjustment, value: i32) {
        self.params.set(adjustment, value);
    }

    /// Record the live parameters in the history
    pub fn commit(&mut self) {
        self.push_history();
    }

    pub fn reset_adjustment(&mut self, adjustment: Adjustment) {
        self.params.set(adjustment, 0);
        self.push_history();
    }

    pub fn set_preset(&mut self, preset: Preset) {
        self.params.preset = preset;
        self.params.mono = preset == Preset::Mono;
        self.push_history();
    }

    pub fn set_crop_ratio(&mut self, ratio: CropRatio) {
        self.params.crop_ratio = ratio;

        if ratio == CropRatio::Original {
            self.params.crop = self.overlay.clear();
            self.overlay.set_enabled(false);
            self.crop_dirty = false;
            return;
        }

        self.overlay.set_enabled(true);
        self.overlay.set_aspect(ratio.aspect());
        let mode = if ratio == CropRatio::Custom {
            BoxMode::Custom
        } else {
            BoxMode::Aspect
        };
        if let Some(region) = self.overlay.ensure_box(mode) {
            self.update_crop(region);
        }
        self.crop_dirty = true;
    }

    /// Store a crop region coming from the overlay
    pub fn update_crop(&mut self, region: CropRegion) {
        self.params.crop = region;
        if region.enabled {
            self.crop_dirty = true;
        }
    }

    /// A resize released the locked aspect ratio
    pub fn force_crop_custom(&mut self) {
        if self.params.crop_ratio != CropRatio::Custom {
            self.params.crop_ratio = CropRatio::Custom;
            self.overlay.set_aspect(None);
            self.crop_dirty = true;
        }
    }

    pub fn crop_press(&mut self, x: i32, y: i32) {
        if let Some(region) = self.overlay.press(x, y) {
            self.update_crop(region);
        }
    }

    pub fn crop_drag(&mut self, x: i32, y: i32) {
        let update = self.overlay.drag_to(x, y);
        if update.became_custom {
            self.force_crop_custom();
        }
        if let Some(region) = update.region {
            self.update_crop(region);
        }
    }

    pub fn crop_release(&mut self) {
        if let Some(region) = self.overlay.release() {
            self.update_crop(region);
        }
    }

    /// Current base rendered with the live parameters. The crop is not applied.
    pub fn render_preview(&self) -> Result<DynamicImage> {
        let params = EditParams {
            crop: CropRegion::disabled(),
            ..self.params.clone()
        };
        process_image(self.current_base(), &params)
    }

    pub fn can_apply_crop(&self) -> bool {
        self.tab == Tab::Crop && !self.is_removing() && self.params.crop.enabled && self.crop_dirty
    }

    pub fn can_apply_background_removal(&self) -> bool {
        self.tab == Tab::RemoveBg
            && !self.is_removing()
            && self.pending_removal.is_some()
            && self.remove_dirty
    }

    fn commit_base(&mut self, image: DynamicImage) {
        self.bases.push(image);
        self.base_idx = self.bases.len() - 1;
        self.overlay.set_image_size((self.current_base().width(), self.current_base().height()));
    }

    fn reset_params_neutral(&mut self) {
        self.history.suspend();
        self.params = EditParams::default();
        self.overlay.set_aspect(None);
        self.history.resume();
    }

    /// Crop the rendered preview and commit it as a new base
    pub fn apply_crop(&mut self) -> Result<bool> {
        if !self.params.crop.enabled || self.is_removing() {
            return Ok(false);
        }

        let (rgb, alpha) = split_alpha(&self.render_preview()?);
        let region = self.params.crop;
        let rgb = crop::apply_crop(&rgb, &region);
        let cropped = match alpha {
            Some(alpha) => DynamicImage::ImageRgba8(merge_alpha(&rgb, &crop::apply_crop(&alpha, &region))),
            None => DynamicImage::ImageRgb8(rgb),
        };
        info!("Applied crop, new base is {}x{}", cropped.width(), cropped.height());

        self.commit_base(cropped);
        self.overlay.clear();
        self.overlay.set_enabled(false);
        self.crop_dirty = false;
        self.reset_params_neutral();
        self.push_history();
        Ok(true)
    }

    /// Render the preview and segment it on a blocking worker.
    /// Must be called from within a tokio runtime.
    pub fn start_background_removal(&mut self) -> Result<bool> {
        if self.is_removing() {
            return Ok(false);
        }

        let rgb = self.render_preview()?.to_rgb8();
        self.pending_removal = None;
        self.remove_dirty = false;

        let cancel = CancelFlag::new();
        let worker_cancel = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || background::remove_background(&rgb, &worker_cancel));

        self.removal = Some(RemovalJob { handle, cancel });
        self.remove_status = RemoveStatus::Running;
        info!("Background removal started");
        Ok(true)
    }

    pub fn cancel_background_removal(&mut self) -> bool {
        let Some(job) = &self.removal else {
            return false;
        };
        job.cancel.cancel();
        self.remove_status = RemoveStatus::Cancelling;
        true
    }

    /// Wait for the worker and take its result
    pub async fn finish_background_removal(&mut self) -> &RemoveStatus {
        let Some(job) = self.removal.take() else {
            return &self.remove_status;
        };

        let cancelled = job.cancel.is_cancelled();
        let outcome = job.handle.await;

        self.remove_status = match outcome {
            _ if cancelled => RemoveStatus::Cancelled,
            Ok(Ok(Some(image))) => {
                self.pending_removal = Some(image);
                self.remove_dirty = true;
                RemoveStatus::Done
            }
            Ok(Ok(None)) => RemoveStatus::Cancelled,
            Ok(Err(e)) => {
                warn!("Background removal failed: {:#}", e);
                RemoveStatus::Failed(e.to_string())
            }
            Err(e) => {
                warn!("Background removal worker stopped: {}", e);
                RemoveStatus::Failed(e.to_string())
            }
        };
        info!("Background removal finished: {}", self.remove_status);
        &self.remove_status
    }

    /// Commit the pending segmentation result as a new base
    pub fn apply_background_removal(&mut self) -> bool {
        if self.is_removing() {
            return false;
        }
        let Some(image) = self.pending_removal.take() else {
            return false;
        };

        self.commit_base(DynamicImage::ImageRgba8(image));
        self.remove_dirty = false;
        self.reset_params_neutral();
        self.push_history();
        self.remove_status = RemoveStatus::Applied;
        true
    }

    pub fn undo(&mut self) -> bool {
        if self.is_removing() {
            return false;
        }
        match self.history.undo().cloned() {
            Some(state) => {
                self.restore(state);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        if self.is_removing() {
            return false;
        }
        match self.history.redo().cloned() {
            Some(state) => {
                self.restore(state);
                true
            }
            None => false,
        }
    }

    fn restore(&mut self, state: HistoryState) {
        self.history.suspend();
        let base_changed = state.base_idx != self.base_idx;
        self.base_idx = state.base_idx;
        self.params = state.params;
        if base_changed {
            self.overlay.set_image_size((self.current_base().width(), self.current_base().height()));
        }
        self.overlay.set_aspect(self.params.crop_ratio.aspect());
        self.refresh_overlay();
        self.history.resume();
    }

    /// Render the preview and write it. JPEG and BMP outputs drop the alpha channel.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<()> {
        let out = self.render_preview()?;
        export_image(&out, path.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn session(w: u32, h: u32) -> EditSession {
        EditSession::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([100, 100, 100]))))
    }

    #[test]
    fn slider_changes_are_recorded_on_commit() {
        let mut s = session(8, 8);
        s.set_adjustment(Adjustment::Brightness, 30);
        assert_eq!(s.history().len(), 1);
        s.commit();
        s.commit();
        assert_eq!(s.history().len(), 2);
        assert!(s.can_undo());
    }

    #[test]
    fn preset_sets_mono_flag() {
        let mut s = session(8, 8);
        s.set_preset(Preset::Mono);
        assert!(s.params().mono);
        s.set_preset(Preset::Noir);
        assert!(!s.params().mono);
        assert_eq!(s.history().len(), 3);
    }

    #[test]
    fn undo_restores_params_and_keeps_tab() {
        let mut s = session(8, 8);
        s.open_tab(Tab::Filter);
        s.set_adjustment(Adjustment::Red, 40);
        s.commit();
        assert!(s.undo());
        assert_eq!(s.params().red, 0);
        assert_eq!(s.tab(), Tab::Filter);
        assert!(s.redo());
        assert_eq!(s.params().red, 40);
        assert!(!s.redo());
    }

    #[test]
    fn original_ratio_clears_crop() {
        let mut s = session(100, 100);
        s.open_tab(Tab::Crop);
        s.set_crop_ratio(CropRatio::Square);
        assert!(s.overlay().is_enabled());
        assert!(s.params().crop.enabled);
        assert!(s.can_apply_crop());

        s.set_crop_ratio(CropRatio::Original);
        assert!(!s.params().crop.enabled);
        assert!(!s.overlay().is_enabled());
        assert!(!s.can_apply_crop());
    }

    #[test]
    fn dragging_a_handle_switches_to_custom() {
        let mut s = session(100, 100);
        s.open_tab(Tab::Crop);
        s.set_crop_ratio(CropRatio::Square);
        s.crop_press(89, 89);
        s.crop_drag(69, 79);
        s.crop_release();
        assert_eq!(s.params().crop_ratio, CropRatio::Custom);
        assert!((s.params().crop.w - 0.6).abs() < 1e-6);
        assert!((s.params().crop.h - 0.7).abs() < 1e-6);
    }

    #[test]
    fn crop_apply_commits_new_base() -> Result<()> {
        let mut s = session(100, 50);
        s.open_tab(Tab::Crop);
        s.set_adjustment(Adjustment::Brightness, 10);
        s.set_crop_ratio(CropRatio::Custom);
        assert!(s.apply_crop()?);

        assert_eq!(s.bases().len(), 2);
        assert_eq!(s.base_idx(), 1);
        assert_eq!((s.current_base().width(), s.current_base().height()), (80, 40));
        assert_eq!(s.current_base().to_rgb8().get_pixel(0, 0), &Rgb([110, 110, 110]));
        assert!(s.params().is_neutral());
        assert!(!s.can_apply_crop());

        assert!(s.undo());
        assert_eq!(s.base_idx(), 0);
        assert_eq!(s.params().brightness, 0);
        Ok(())
    }

    #[test]
    fn crop_apply_needs_enabled_crop() -> Result<()> {
        let mut s = session(10, 10);
        assert!(!s.apply_crop()?);
        assert_eq!(s.bases().len(), 1);
        Ok(())
    }

    #[test]
    fn removal_apply_without_result_is_ignored() {
        let mut s = session(10, 10);
        assert!(!s.apply_background_removal());
        assert!(!s.cancel_background_removal());
    }

    #[test]
    fn preview_ignores_crop() -> Result<()> {
        let mut s = session(40, 20);
        s.update_crop(CropRegion::new(0.0, 0.0, 0.5, 0.5));
        let preview = s.render_preview()?;
        assert_eq!((preview.width(), preview.height()), (40, 20));
        Ok(())
    }

    #[test]
    fn export_rejects_unknown_extension() {
        let s = session(4, 4);
        let dir = tempfile::tempdir().unwrap();
        assert!(s.export(dir.path().join("out.xyz")).is_err());
    }
}
