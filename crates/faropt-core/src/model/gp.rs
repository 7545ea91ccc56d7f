//! Gaussian process regression on the unit cube.
//!
//! RBF kernel with unit signal variance on standardised targets. The length scale is the
//! grid value with the highest log marginal likelihood.

use std::f64::consts::PI;

const LENGTH_SCALES: [f64; 8] = [0.05, 0.1, 0.2, 0.3, 0.5, 0.75, 1.0, 2.0];
const NOISE: f64 = 1e-6;

pub(crate) struct GaussianProcess {
    x: Vec<Vec<f64>>,
    chol: Vec<Vec<f64>>,
    alpha: Vec<f64>,
    length_scale: f64,
    y_mean: f64,
    y_std: f64,
}

impl GaussianProcess {
    /// Returns `None` when no kernel matrix of the grid is positive definite.
    pub(crate) fn fit(x: &[Vec<f64>], y: &[f64]) -> Option<Self> {
        if x.is_empty() || x.len() != y.len() {
            return None;
        }
        let n = y.len() as f64;
        let y_mean = y.iter().sum::<f64>() / n;
        let var = y.iter().map(|v| (v - y_mean).powi(2)).sum::<f64>() / n;
        let y_std = if var > 0.0 { var.sqrt() } else { 1.0 };
        let z: Vec<f64> = y.iter().map(|v| (v - y_mean) / y_std).collect();

        let mut best: Option<(f64, Self)> = None;
        for &length_scale in LENGTH_SCALES.iter() {
            let mut k = kernel_matrix(x, length_scale);
            for (i, row) in k.iter_mut().enumerate() {
                row[i] += NOISE;
            }
            let Some(chol) = cholesky(&k) else {
                continue;
            };
            let alpha = solve_upper_t(&chol, &solve_lower(&chol, &z));
            let log_det: f64 = chol.iter().enumerate().map(|(i, r)| r[i].ln()).sum();
            let fit: f64 = z.iter().zip(&alpha).map(|(a, b)| a * b).sum();
            let lml = -0.5 * fit - log_det - 0.5 * n * (2.0 * PI).ln();

            if best.as_ref().is_none_or(|(b, _)| lml > *b) {
                best = Some((
                    lml,
                    Self {
                        x: x.to_vec(),
                        chol,
                        alpha,
                        length_scale,
                        y_mean,
                        y_std,
                    },
                ));
            }
        }
        best.map(|(_, gp)| gp)
    }

    /// Posterior mean and standard deviation at `x`, in the original target scale.
    pub(crate) fn predict(&self, x: &[f64]) -> (f64, f64) {
        let k_star: Vec<f64> = self
            .x
            .iter()
            .map(|xi| rbf(xi, x, self.length_scale))
            .collect();
        let mean: f64 = k_star.iter().zip(&self.alpha).map(|(a, b)| a * b).sum();
        let v = solve_lower(&self.chol, &k_star);
        let var = (1.0 - v.iter().map(|a| a * a).sum::<f64>()).max(1e-12);
        (
            mean * self.y_std + self.y_mean,
            var.sqrt() * self.y_std,
        )
    }
}

/// Expected improvement over `best` for minimisation.
pub(crate) fn expected_improvement(mean: f64, std: f64, best: f64, xi: f64) -> f64 {
    let improvement = best - mean - xi;
    if std <= 0.0 {
        return improvement.max(0.0);
    }
    let z = improvement / std;
    improvement * normal_cdf(z) + std * normal_pdf(z)
}

fn rbf(a: &[f64], b: &[f64], length_scale: f64) -> f64 {
    let d2: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    (-0.5 * d2 / (length_scale * length_scale)).exp()
}

fn kernel_matrix(x: &[Vec<f64>], length_scale: f64) -> Vec<Vec<f64>> {
    x.iter()
        .map(|a| x.iter().map(|b| rbf(a, b, length_scale)).collect())
        .collect()
}

/// Lower triangular `L` with `L Lᵀ = a`.
fn cholesky(a: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = a.len();
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let d = a[i][i] - sum;
                if d <= 0.0 || !d.is_finite() {
                    return None;
                }
                l[i][j] = d.sqrt();
            } else {
                l[i][j] = (a[i][j] - sum) / l[j][j];
            }
        }
    }
    Some(l)
}

/// Solves `L y = b`.
fn solve_lower(l: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let mut y = vec![0.0; b.len()];
    for i in 0..b.len() {
        let sum: f64 = (0..i).map(|k| l[i][k] * y[k]).sum();
        y[i] = (b[i] - sum) / l[i][i];
    }
    y
}

/// Solves `Lᵀ x = y`.
fn solve_upper_t(l: &[Vec<f64>], y: &[f64]) -> Vec<f64> {
    let n = y.len();
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let sum: f64 = (i + 1..n).map(|k| l[k][i] * x[k]).sum();
        x[i] = (y[i] - sum) / l[i][i];
    }
    x
}

fn normal_pdf(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * PI).sqrt()
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

// Abramowitz and Stegun 7.1.26, absolute error below 1.5e-7.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    sign * (1.0 - poly * (-x * x).exp())
}
