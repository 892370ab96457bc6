//! Foreground extraction with GrabCut: colour mixtures for both classes are refined
//! iteratively and the labelling is settled by a min cut over the pixel grid.

pub mod gmm;
pub mod graph;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use image::{GrayImage, Luma, RgbImage, RgbaImage, imageops};
use log::debug;

use crate::editing::crop::BoundingBox;
use crate::editing::merge_alpha;
use gmm::{COMPONENTS, Color, Gmm, kmeans};
use graph::FlowGraph;

/// Distance of the initial foreground rectangle from every image edge
pub const RECT_BORDER: u32 = 10;
pub const ITERATIONS: usize = 5;
/// Longest side of the working copy the segmentation runs on
pub const WORK_SIZE: u32 = 320;

const GAMMA: f64 = 50.0;
const LAMBDA: f64 = 9.0 * GAMMA;
/// Floor for mixture densities before taking logs
const MIN_DENSITY: f64 = 1e-300;

/// Per-pixel segmentation label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskLabel {
    Background,
    Foreground,
    ProbableBackground,
    ProbableForeground,
}

impl MaskLabel {
    pub fn is_foreground(&self) -> bool {
        matches!(self, MaskLabel::Foreground | MaskLabel::ProbableForeground)
    }

    fn is_fixed(&self) -> bool {
        matches!(self, MaskLabel::Background | MaskLabel::Foreground)
    }
}

/// Shared flag used to abandon a running segmentation
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Remove the background of an RGB image.
///
/// The foreground is assumed to sit inside a rectangle inset by [`RECT_BORDER`] pixels.
/// Background pixels come back black and fully transparent. Returns `Ok(None)` when the
/// run was cancelled.
pub fn remove_background(img: &RgbImage, cancel: &CancelFlag) -> Result<Option<RgbaImage>> {
    let (width, height) = img.dimensions();
    if width <= 2 * RECT_BORDER || height <= 2 * RECT_BORDER {
        anyhow::bail!(
            "Image is too small for background removal: {}x{} (needs more than {} px per side)",
            width,
            height,
            2 * RECT_BORDER
        );
    }

    let (work, border) = match work_scale(width, height) {
        Some(scale) => {
            let ww = ((width as f64 * scale).round() as u32).max(1);
            let wh = ((height as f64 * scale).round() as u32).max(1);
            let border = ((RECT_BORDER as f64 * scale).round() as u32).max(1);
            debug!("Segmenting on a {}x{} working copy", ww, wh);
            (
                imageops::resize(img, ww, wh, imageops::FilterType::Triangle),
                border,
            )
        }
        None => (img.clone(), RECT_BORDER),
    };

    let (ww, wh) = work.dimensions();
    let rect = BoundingBox {
        x: border,
        y: border,
        width: ww.saturating_sub(2 * border).max(1),
        height: wh.saturating_sub(2 * border).max(1),
    };

    let Some(mask) = grabcut(&work, rect, ITERATIONS, cancel)? else {
        return Ok(None);
    };

    let alpha = GrayImage::from_fn(width, height, |x, y| {
        let mx = ((x as u64 * ww as u64) / width as u64) as u32;
        let my = ((y as u64 * wh as u64) / height as u64) as u32;
        if mask[(my * ww + mx) as usize].is_foreground() {
            Luma([255])
        } else {
            Luma([0])
        }
    });

    let mut color = img.clone();
    for (pixel, a) in color.pixels_mut().zip(alpha.pixels()) {
        if a[0] == 0 {
            pixel.0 = [0, 0, 0];
        }
    }

    Ok(Some(merge_alpha(&color, &alpha)))
}

/// Downscale factor for the working copy, `None` when the image is used as is.
///
/// The longest side is brought to [`WORK_SIZE`], but the shorter side never drops below
/// what the inset rectangle needs, so long thin strips keep an interior to segment.
fn work_scale(width: u32, height: u32) -> Option<f64> {
    let longest = width.max(height);
    if longest <= WORK_SIZE {
        return None;
    }
    let shortest = width.min(height);
    let min_scale = (2 * RECT_BORDER + 1) as f64 / shortest as f64;
    let scale = (WORK_SIZE as f64 / longest as f64).max(min_scale);
    if scale >= 1.0 { None } else { Some(scale) }
}

fn to_color(img: &RgbImage, idx: usize) -> Color {
    let (w, _) = img.dimensions();
    let p = img.get_pixel(idx as u32 % w, idx as u32 / w);
    Color::new(p[0] as f64, p[1] as f64, p[2] as f64)
}

/// Neighbour offsets looking backwards so each undirected pair is visited once
const NEIGHBOURS: [(i64, i64); 4] = [(-1, 0), (-1, -1), (0, -1), (1, -1)];

fn smoothness_beta(colors: &[Color], width: i64, height: i64) -> f64 {
    let mut total = 0.0;
    let mut count = 0usize;
    for y in 0..height {
        for x in 0..width {
            let c = &colors[(y * width + x) as usize];
            for (dx, dy) in NEIGHBOURS {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= width {
                    continue;
                }
                let n = &colors[(ny * width + nx) as usize];
                total += (c - n).norm_squared();
                count += 1;
            }
        }
    }
    if count == 0 || total <= f64::EPSILON {
        0.0
    } else {
        1.0 / (2.0 * total / count as f64)
    }
}

/// Run GrabCut initialised from a rectangle.
///
/// Pixels outside `rect` are fixed background, pixels inside start as probable
/// foreground. Returns the final mask in row-major order, or `None` if cancelled.
pub fn grabcut(
    img: &RgbImage,
    rect: BoundingBox,
    iterations: usize,
    cancel: &CancelFlag,
) -> Result<Option<Vec<MaskLabel>>> {
    let (width, height) = img.dimensions();
    let n = (width * height) as usize;
    let colors: Vec<Color> = (0..n).map(|i| to_color(img, i)).collect();

    let mut mask: Vec<MaskLabel> = (0..n)
        .map(|i| {
            let (x, y) = (i as u32 % width, i as u32 / width);
            let inside = x >= rect.x
                && y >= rect.y
                && x < rect.x + rect.width
                && y < rect.y + rect.height;
            if inside {
                MaskLabel::ProbableForeground
            } else {
                MaskLabel::Background
            }
        })
        .collect();

    let beta = smoothness_beta(&colors, width as i64, height as i64);
    let mut models: Option<(Gmm, Gmm)> = None;

    for iteration in 0..iterations {
        if cancel.is_cancelled() {
            debug!("Segmentation cancelled before iteration {}", iteration + 1);
            return Ok(None);
        }

        let (bgd_idx, fgd_idx): (Vec<usize>, Vec<usize>) =
            (0..n).partition(|&i| !mask[i].is_foreground());
        if fgd_idx.is_empty() || bgd_idx.is_empty() {
            debug!("One class is empty after {} iterations, stopping", iteration);
            break;
        }

        let bgd_samples: Vec<Color> = bgd_idx.iter().map(|&i| colors[i]).collect();
        let fgd_samples: Vec<Color> = fgd_idx.iter().map(|&i| colors[i]).collect();

        let (bgd_labels, fgd_labels) = match &models {
            None => (
                kmeans(&bgd_samples, COMPONENTS),
                kmeans(&fgd_samples, COMPONENTS),
            ),
            Some((bgd, fgd)) => (
                bgd_samples.iter().map(|c| bgd.most_likely_component(c)).collect(),
                fgd_samples.iter().map(|c| fgd.most_likely_component(c)).collect(),
            ),
        };
        let bgd = Gmm::fit(&bgd_samples, &bgd_labels);
        let fgd = Gmm::fit(&fgd_samples, &fgd_labels);

        let source = n;
        let sink = n + 1;
        let mut graph = FlowGraph::with_capacity(n + 2, n * 5);

        for (i, label) in mask.iter().enumerate() {
            match label {
                MaskLabel::Background => graph.add_edge(i, sink, LAMBDA, 0.0),
                MaskLabel::Foreground => graph.add_edge(source, i, LAMBDA, 0.0),
                MaskLabel::ProbableBackground | MaskLabel::ProbableForeground => {
                    let c = &colors[i];
                    let from_source = -bgd.density(c).max(MIN_DENSITY).ln();
                    let to_sink = -fgd.density(c).max(MIN_DENSITY).ln();
                    let net = from_source - to_sink;
                    if net > 0.0 {
                        graph.add_edge(source, i, net, 0.0);
                    } else if net < 0.0 {
                        graph.add_edge(i, sink, -net, 0.0);
                    }
                }
            }
        }

        let (w, h) = (width as i64, height as i64);
        for y in 0..h {
            for x in 0..w {
                let i = (y * w + x) as usize;
                for (dx, dy) in NEIGHBOURS {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx >= w {
                        continue;
                    }
                    let j = (ny * w + nx) as usize;
                    let (a, b) = (&colors[i], &colors[j]);
                    let diff = (a - b).norm_squared();
                    let dist = if dx != 0 && dy != 0 { std::f64::consts::SQRT_2 } else { 1.0 };
                    let weight = GAMMA / dist * (-beta * diff).exp();
                    graph.add_edge(i, j, weight, weight);
                }
            }
        }

        let flow = graph.max_flow(source, sink);
        let side = graph.source_side(source);
        let mut changed = 0usize;
        for (i, label) in mask.iter_mut().enumerate() {
            if label.is_fixed() {
                continue;
            }
            let next = if side[i] {
                MaskLabel::ProbableForeground
            } else {
                MaskLabel::ProbableBackground
            };
            if *label != next {
                changed += 1;
                *label = next;
            }
        }
        debug!(
            "GrabCut iteration {}: flow {:.1}, {} labels changed",
            iteration + 1,
            flow,
            changed
        );

        models = Some((bgd, fgd));
    }

    Ok(Some(mask))
}
