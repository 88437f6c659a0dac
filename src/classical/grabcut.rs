//! Rectangle-seeded iterative graph-cut foreground extraction
//!
//! Pixels outside the seed rectangle are fixed background; pixels inside
//! start as probable foreground. Each iteration fits a Gaussian mixture
//! color model to each side, derives per-pixel data costs, adds an
//! 8-connected contrast-sensitive smoothness term and relabels the probable
//! pixels with a minimum s/t cut.

use super::maxflow::FlowGraph;
use crate::error::{BgRemovalError, Result};
use image::RgbImage;
use tracing::trace;

/// Mixture components per color model
pub const COMPONENTS: usize = 5;

/// Smoothness weight between neighbouring pixels
pub const GAMMA: f64 = 50.0;

/// Lloyd iterations used to initialize the mixtures
const KMEANS_ITERATIONS: usize = 10;

/// Diagonal regularization added to near-singular covariances
const COVARIANCE_REGULARIZATION: f64 = 0.01;

/// Seed rectangle in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// Centered rectangle spanning 1/8 to 7/8 of each axis
    #[must_use]
    pub fn centered(width: u32, height: u32) -> Self {
        Self {
            x: width / 8,
            y: height / 8,
            width: width * 3 / 4,
            height: height * 3 / 4,
        }
    }

    fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Background,
    ProbableBackground,
    ProbableForeground,
}

impl Label {
    fn is_foreground(self) -> bool {
        self == Self::ProbableForeground
    }
}

type Color = [f64; 3];

#[derive(Debug, Clone, Default)]
struct Component {
    weight: f64,
    mean: Color,
    inverse: [[f64; 3]; 3],
    /// `1 / sqrt(det(covariance))`
    norm: f64,
}

impl Component {
    fn density(&self, color: &Color) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        let d = [
            color[0] - self.mean[0],
            color[1] - self.mean[1],
            color[2] - self.mean[2],
        ];
        let mut mahalanobis = 0.0;
        for (i, row) in self.inverse.iter().enumerate() {
            mahalanobis += d[i] * (row[0] * d[0] + row[1] * d[1] + row[2] * d[2]);
        }
        self.norm * (-0.5 * mahalanobis).exp()
    }
}

/// Gaussian mixture color model
#[derive(Debug, Clone)]
struct Gmm {
    components: Vec<Component>,
}

impl Gmm {
    /// Fit components from samples and their component assignments
    fn fit(samples: &[Color], assignment: &[usize]) -> Result<Self> {
        let mut count = [0usize; COMPONENTS];
        let mut sum = [[0.0; 3]; COMPONENTS];
        let mut product = [[[0.0; 3]; 3]; COMPONENTS];

        for (color, &k) in samples.iter().zip(assignment) {
            count[k] += 1;
            for i in 0..3 {
                sum[k][i] += color[i];
                for j in 0..3 {
                    product[k][i][j] += color[i] * color[j];
                }
            }
        }

        let total = samples.len() as f64;
        let mut components = Vec::with_capacity(COMPONENTS);
        for k in 0..COMPONENTS {
            if count[k] == 0 {
                components.push(Component::default());
                continue;
            }
            let n = count[k] as f64;
            let mean = [sum[k][0] / n, sum[k][1] / n, sum[k][2] / n];
            let mut covariance = [[0.0; 3]; 3];
            for i in 0..3 {
                for j in 0..3 {
                    covariance[i][j] = product[k][i][j] / n - mean[i] * mean[j];
                }
            }

            let mut det = determinant(&covariance);
            if det <= f64::EPSILON {
                for (i, row) in covariance.iter_mut().enumerate() {
                    row[i] += COVARIANCE_REGULARIZATION;
                }
                det = determinant(&covariance);
            }
            if !(det > f64::EPSILON) || !det.is_finite() {
                return Err(BgRemovalError::numerical(format!(
                    "singular covariance in mixture component {k} (det = {det})"
                )));
            }

            components.push(Component {
                weight: n / total,
                mean,
                inverse: inverse(&covariance, det),
                norm: 1.0 / det.sqrt(),
            });
        }

        Ok(Self { components })
    }

    fn probability(&self, color: &Color) -> f64 {
        self.components
            .iter()
            .map(|c| c.weight * c.density(color))
            .sum()
    }

    fn best_component(&self, color: &Color) -> usize {
        let mut best = 0;
        let mut best_density = f64::NEG_INFINITY;
        for (k, component) in self.components.iter().enumerate() {
            let density = component.density(color);
            if component.weight > 0.0 && density > best_density {
                best = k;
                best_density = density;
            }
        }
        best
    }
}

fn determinant(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1]) - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn inverse(m: &[[f64; 3]; 3], det: f64) -> [[f64; 3]; 3] {
    let mut inv = [[0.0; 3]; 3];
    inv[0][0] = (m[1][1] * m[2][2] - m[1][2] * m[2][1]) / det;
    inv[0][1] = (m[0][2] * m[2][1] - m[0][1] * m[2][2]) / det;
    inv[0][2] = (m[0][1] * m[1][2] - m[0][2] * m[1][1]) / det;
    inv[1][0] = (m[1][2] * m[2][0] - m[1][0] * m[2][2]) / det;
    inv[1][1] = (m[0][0] * m[2][2] - m[0][2] * m[2][0]) / det;
    inv[1][2] = (m[0][2] * m[1][0] - m[0][0] * m[1][2]) / det;
    inv[2][0] = (m[1][0] * m[2][1] - m[1][1] * m[2][0]) / det;
    inv[2][1] = (m[0][1] * m[2][0] - m[0][0] * m[2][1]) / det;
    inv[2][2] = (m[0][0] * m[1][1] - m[0][1] * m[1][0]) / det;
    inv
}

fn distance_sq(a: &Color, b: &Color) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

/// Deterministic k-means: centers seeded at brightness quantiles
fn kmeans(samples: &[Color]) -> Vec<usize> {
    if samples.is_empty() {
        return Vec::new();
    }
    let mut order: Vec<usize> = (0..samples.len()).collect();
    order.sort_by(|&a, &b| {
        let la = samples[a].iter().sum::<f64>();
        let lb = samples[b].iter().sum::<f64>();
        la.total_cmp(&lb)
    });

    let mut centers: Vec<Color> = (0..COMPONENTS)
        .map(|k| {
            let position = ((2 * k + 1) * samples.len()) / (2 * COMPONENTS);
            samples[order[position.min(samples.len() - 1)]]
        })
        .collect();

    let mut assignment = vec![0usize; samples.len()];
    for _ in 0..KMEANS_ITERATIONS {
        for (slot, color) in assignment.iter_mut().zip(samples) {
            let mut best = 0;
            let mut best_distance = f64::INFINITY;
            for (k, center) in centers.iter().enumerate() {
                let d = distance_sq(color, center);
                if d < best_distance {
                    best = k;
                    best_distance = d;
                }
            }
            *slot = best;
        }

        let mut sums = [[0.0; 3]; COMPONENTS];
        let mut counts = [0usize; COMPONENTS];
        for (color, &k) in samples.iter().zip(&assignment) {
            counts[k] += 1;
            for i in 0..3 {
                sums[k][i] += color[i];
            }
        }
        for k in 0..COMPONENTS {
            if counts[k] > 0 {
                let n = counts[k] as f64;
                centers[k] = [sums[k][0] / n, sums[k][1] / n, sums[k][2] / n];
            }
        }
    }
    assignment
}

/// Foreground extraction state for one image
#[derive(Debug)]
pub struct GrabCut {
    width: u32,
    height: u32,
    colors: Vec<Color>,
    labels: Vec<Label>,
}

impl GrabCut {
    /// Initialize labels from the seed rectangle
    pub fn new(image: &RgbImage, rect: Rect) -> Result<Self> {
        let (width, height) = image.dimensions();
        if rect.width == 0 || rect.height == 0 || rect.x + rect.width > width || rect.y + rect.height > height {
            return Err(BgRemovalError::numerical(format!(
                "degenerate seed rectangle {rect:?} for {width}x{height} image"
            )));
        }

        let colors = image
            .pixels()
            .map(|p| [f64::from(p.0[0]), f64::from(p.0[1]), f64::from(p.0[2])])
            .collect();
        let labels = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| {
                if rect.contains(x, y) {
                    Label::ProbableForeground
                } else {
                    Label::Background
                }
            })
            .collect();

        Ok(Self {
            width,
            height,
            colors,
            labels,
        })
    }

    /// Run `iterations` rounds and return the binary foreground map
    pub fn run(mut self, iterations: usize) -> Result<Vec<bool>> {
        let smoothness = self.smoothness_weights();

        let (mut background, mut foreground) = self.initial_models()?;
        for iteration in 0..iterations {
            let (bg, fg) = self.refit_models(&background, &foreground)?;
            background = bg;
            foreground = fg;
            let changed = self.cut(&background, &foreground, &smoothness)?;
            trace!(iteration, changed, "Graph cut iteration");
        }

        Ok(self.labels.iter().map(|l| l.is_foreground()).collect())
    }

    fn samples(&self, foreground: bool) -> Vec<Color> {
        self.colors
            .iter()
            .zip(&self.labels)
            .filter(|(_, l)| l.is_foreground() == foreground)
            .map(|(c, _)| *c)
            .collect()
    }

    fn initial_models(&self) -> Result<(Gmm, Gmm)> {
        let bg = self.samples(false);
        let fg = self.samples(true);
        if bg.is_empty() || fg.is_empty() {
            return Err(BgRemovalError::numerical(
                "seed rectangle leaves an empty foreground or background sample set",
            ));
        }
        Ok((Gmm::fit(&bg, &kmeans(&bg))?, Gmm::fit(&fg, &kmeans(&fg))?))
    }

    /// Assign each pixel to its most likely component and refit both models
    fn refit_models(&self, background: &Gmm, foreground: &Gmm) -> Result<(Gmm, Gmm)> {
        let fit_side = |is_fg: bool, model: &Gmm| -> Result<Gmm> {
            let samples = self.samples(is_fg);
            if samples.is_empty() {
                return Err(BgRemovalError::numerical("label set became empty"));
            }
            let assignment: Vec<usize> = samples.iter().map(|c| model.best_component(c)).collect();
            Gmm::fit(&samples, &assignment)
        };
        Ok((fit_side(false, background)?, fit_side(true, foreground)?))
    }

    /// Neighbour offsets with their distance factor: left, up-left, up, up-right
    fn neighbours() -> [(i64, i64, f64); 4] {
        let diagonal = 1.0 / std::f64::consts::SQRT_2;
        [(-1, 0, 1.0), (-1, -1, diagonal), (0, -1, 1.0), (1, -1, diagonal)]
    }

    /// Contrast-sensitive n-link weights per pixel for each neighbour direction
    fn smoothness_weights(&self) -> Vec<[f64; 4]> {
        let (w, h) = (i64::from(self.width), i64::from(self.height));
        let neighbours = Self::neighbours();

        let mut total = 0.0;
        let mut pairs = 0usize;
        for y in 0..h {
            for x in 0..w {
                let color = &self.colors[(y * w + x) as usize];
                for &(dx, dy, _) in &neighbours {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx >= 0 && ny >= 0 && nx < w {
                        total += distance_sq(color, &self.colors[(ny * w + nx) as usize]);
                        pairs += 1;
                    }
                }
            }
        }
        let beta = if total <= f64::EPSILON {
            0.0
        } else {
            1.0 / (2.0 * total / pairs as f64)
        };

        let mut weights = vec![[0.0; 4]; self.colors.len()];
        for y in 0..h {
            for x in 0..w {
                let index = (y * w + x) as usize;
                for (slot, &(dx, dy, factor)) in neighbours.iter().enumerate() {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx >= 0 && ny >= 0 && nx < w {
                        let diff = distance_sq(&self.colors[index], &self.colors[(ny * w + nx) as usize]);
                        weights[index][slot] = GAMMA * factor * (-beta * diff).exp();
                    }
                }
            }
        }
        weights
    }

    /// Build the graph, cut it and relabel probable pixels; returns how many changed
    fn cut(&mut self, background: &Gmm, foreground: &Gmm, smoothness: &[[f64; 4]]) -> Result<usize> {
        let (w, h) = (i64::from(self.width), i64::from(self.height));
        let fixed = 8.0 * GAMMA + 1.0;
        let mut graph = FlowGraph::new(self.colors.len());

        for (index, (color, label)) in self.colors.iter().zip(&self.labels).enumerate() {
            let (source, sink) = match label {
                Label::Background => (0.0, fixed),
                Label::ProbableBackground | Label::ProbableForeground => {
                    let from_source = -background.probability(color).max(f64::MIN_POSITIVE).ln();
                    let to_sink = -foreground.probability(color).max(f64::MIN_POSITIVE).ln();
                    (from_source, to_sink)
                },
            };
            if !source.is_finite() || !sink.is_finite() {
                return Err(BgRemovalError::numerical("non-finite data cost"));
            }
            graph.add_terminal_weights(index, source, sink);
        }

        let neighbours = Self::neighbours();
        for y in 0..h {
            for x in 0..w {
                let index = (y * w + x) as usize;
                for (slot, &(dx, dy, _)) in neighbours.iter().enumerate() {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx >= 0 && ny >= 0 && nx < w {
                        let weight = smoothness[index][slot];
                        graph.add_edge(index, (ny * w + nx) as usize, weight, weight);
                    }
                }
            }
        }

        graph.max_flow();
        let source_side = graph.source_side();

        let mut changed = 0;
        for (label, &is_source) in self.labels.iter_mut().zip(&source_side) {
            if *label == Label::Background {
                continue;
            }
            let next = if is_source {
                Label::ProbableForeground
            } else {
                Label::ProbableBackground
            };
            if next != *label {
                changed += 1;
                *label = next;
            }
        }
        Ok(changed)
    }
}
