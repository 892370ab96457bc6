//! Gaussian mixture colour model used by the segmentation.

use nalgebra::{Matrix3, Vector3};

pub type Color = Vector3<f64>;

/// Number of Gaussians per mixture
pub const COMPONENTS: usize = 5;

/// Regularisation added to the covariance diagonal so flat regions stay invertible
const COVARIANCE_FLOOR: f64 = 0.01;

const KMEANS_ITERATIONS: usize = 10;

#[derive(Debug, Clone, Copy)]
struct Component {
    weight: f64,
    mean: Color,
    inverse: Matrix3<f64>,
    /// 1 / sqrt(det(covariance))
    norm: f64,
}

impl Default for Component {
    fn default() -> Self {
        Self {
            weight: 0.0,
            mean: Color::zeros(),
            inverse: Matrix3::zeros(),
            norm: 0.0,
        }
    }
}

impl Component {
    fn density(&self, color: &Color) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        let d = color - self.mean;
        let mahalanobis = d.dot(&(self.inverse * d));
        self.norm * (-0.5 * mahalanobis).exp()
    }
}

/// Mixture of full-covariance Gaussians over RGB
#[derive(Debug, Clone, Default)]
pub struct Gmm {
    components: [Component; COMPONENTS],
}

impl Gmm {
    /// Fit every component from samples and their component labels
    pub fn fit(samples: &[Color], labels: &[usize]) -> Self {
        let mut counts = [0usize; COMPONENTS];
        let mut sums = [Color::zeros(); COMPONENTS];
        let mut products = [Matrix3::<f64>::zeros(); COMPONENTS];

        for (color, &label) in samples.iter().zip(labels) {
            counts[label] += 1;
            sums[label] += color;
            products[label] += color * color.transpose();
        }

        let total = samples.len().max(1) as f64;
        let mut gmm = Gmm::default();
        for k in 0..COMPONENTS {
            let n = counts[k];
            if n == 0 {
                continue;
            }
            let n_f = n as f64;
            let mean = sums[k] / n_f;
            let cov = products[k] / n_f - mean * mean.transpose()
                + Matrix3::identity() * COVARIANCE_FLOOR;
            let det = cov.determinant();
            if det <= f64::EPSILON {
                continue;
            }
            let Some(inverse) = cov.try_inverse() else {
                continue;
            };
            gmm.components[k] = Component {
                weight: n_f / total,
                mean,
                inverse,
                norm: 1.0 / det.sqrt(),
            };
        }
        gmm
    }

    /// Weighted mixture density (without the constant (2π)^-3/2 factor)
    pub fn density(&self, color: &Color) -> f64 {
        self.components
            .iter()
            .map(|c| c.weight * c.density(color))
            .sum()
    }

    /// Component with the highest unweighted density for this colour
    pub fn most_likely_component(&self, color: &Color) -> usize {
        let mut best = 0;
        let mut best_density = f64::NEG_INFINITY;
        for (k, component) in self.components.iter().enumerate() {
            if component.weight <= 0.0 {
                continue;
            }
            let d = component.density(color);
            if d > best_density {
                best_density = d;
                best = k;
            }
        }
        best
    }

    pub fn component_weight(&self, k: usize) -> f64 {
        self.components[k].weight
    }
}

/// Lloyd's k-means with deterministic seeding at brightness quantiles.
/// Returns one cluster label per sample.
pub fn kmeans(samples: &[Color], k: usize) -> Vec<usize> {
    if samples.is_empty() || k == 0 {
        return vec![0; samples.len()];
    }

    let mut order: Vec<usize> = (0..samples.len()).collect();
    order.sort_by(|&a, &b| samples[a].sum().total_cmp(&samples[b].sum()));
    let mut centers: Vec<Color> = (0..k)
        .map(|i| {
            let q = ((2 * i + 1) * samples.len()) / (2 * k);
            samples[order[q.min(samples.len() - 1)]]
        })
        .collect();

    let mut labels = vec![0usize; samples.len()];
    for _ in 0..KMEANS_ITERATIONS {
        let mut changed = false;
        for (label, color) in labels.iter_mut().zip(samples) {
            let nearest = centers
                .iter()
                .enumerate()
                .map(|(i, c)| (i, (color - c).norm_squared()))
                .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
                .0;
            if *label != nearest {
                *label = nearest;
                changed = true;
            }
        }

        let mut sums = vec![Color::zeros(); k];
        let mut counts = vec![0usize; k];
        for (&label, color) in labels.iter().zip(samples) {
            counts[label] += 1;
            sums[label] += color;
        }
        for (center, (sum, count)) in centers.iter_mut().zip(sums.iter().zip(&counts)) {
            if *count > 0 {
                *center = sum / *count as f64;
            }
        }

        if !changed {
            break;
        }
    }
    labels
}
