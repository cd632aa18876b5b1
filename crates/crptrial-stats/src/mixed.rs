//! Linear mixed-effects model with a single random intercept per cluster.
//!
//! The model is
//!
//! ```text
//! yᵢⱼ = xᵢⱼᵀ β + uᵢ + εᵢⱼ,    uᵢ ~ N(0, τ²),    εᵢⱼ ~ N(0, σ²)
//! ```
//!
//! and is fitted by restricted maximum likelihood (REML). With a single
//! variance component the covariance of cluster `i` is
//! `σ² (I + γ J)` with `γ = τ² / σ²`, whose inverse has the closed form
//! `σ⁻² (I - γ / (1 + nᵢ γ) J)`. Each cluster therefore reduces to a handful of
//! sufficient statistics, β and σ² are profiled out analytically, and only
//! the scalar `γ` needs a numeric search. The search runs over
//! `ρ = γ / (1 + γ) ∈ [0, 1)` with a coarse grid followed by golden-section
//! refinement.
//!
//! # Examples
//!
//! ```
//! use crptrial_stats::mixed::RandomInterceptModel;
//!
//! let mut model = RandomInterceptModel::new(["Intercept", "x"]);
//! for (offset, cluster) in [(-1.0, 0), (0.5, 1), (0.2, 2), (0.9, 3)] {
//!     let rows = (0..5).map(|x| {
//!         let x = f64::from(x);
//!         let noise = if (x as i32 + cluster) % 2 == 0 { 0.1 } else { -0.1 };
//!         (vec![1.0, x], 3.0 + 2.0 * x + offset + noise)
//!     });
//!     model.add_cluster(rows);
//! }
//! let fit = model.fit().unwrap();
//! assert!((fit.coefficients[1].estimate - 2.0).abs() < 0.1);
//! ```

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use u_numflow::{
    matrix::{Matrix, MatrixError},
    special,
};

/// 97.5th percentile of the standard normal distribution.
pub const Z_975: f64 = 1.959_963_984_540_054;

const RHO_MAX: f64 = 0.999_999;
const GRID_POINTS: usize = 50;
const GOLDEN_TOLERANCE: f64 = 1e-10;
const MAX_ITERATIONS: usize = 200;
const PIVOT_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum MixedModelError {
    #[display("not enough data: {observations} observations for {parameters} fixed effects")]
    InsufficientData {
        observations: usize,
        parameters: usize,
    },
    #[display("fixed-effects design is singular")]
    SingularDesign { source: MatrixError },
    #[display("variance component search did not converge after {iterations} iterations")]
    NotConverged { iterations: usize },
}

/// Estimate and inference for one fixed-effect term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    /// Wald z statistic (`estimate / std_error`).
    pub z: f64,
    /// Two-sided p-value of the Wald test.
    pub p_value: f64,
    /// Lower bound of the 95% confidence interval.
    pub ci_lower: f64,
    /// Upper bound of the 95% confidence interval.
    pub ci_upper: f64,
}

impl Coefficient {
    #[must_use]
    pub fn ci_contains(&self, value: f64) -> bool {
        self.ci_lower <= value && value <= self.ci_upper
    }
}

/// Result of a REML fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixedModelFit {
    pub coefficients: Vec<Coefficient>,
    /// Between-cluster variance τ² (random intercept variance).
    pub group_variance: f64,
    /// Residual variance σ².
    pub residual_variance: f64,
    pub reml_log_likelihood: f64,
    pub observations: usize,
    pub clusters: usize,
    /// Golden-section iterations used for the variance ratio.
    pub iterations: usize,
}

impl MixedModelFit {
    #[must_use]
    pub fn coefficient(&self, name: &str) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.name == name)
    }
}

/// Per-cluster sufficient statistics.
#[derive(Debug, Clone)]
struct ClusterSums {
    len: usize,
    xtx: Matrix,
    x_sum: Vec<f64>,
    xty: Vec<f64>,
    y_sum: f64,
    y_sq_sum: f64,
}

#[derive(Debug, Clone)]
struct Profile {
    beta: Vec<f64>,
    xtwx: Matrix,
    ln_det_xtwx: f64,
    weighted_rss: f64,
    ln_det_cluster: f64,
}

/// Accumulates clustered observations and fits the random-intercept model.
#[derive(Debug, Clone)]
pub struct RandomInterceptModel {
    terms: Vec<String>,
    clusters: Vec<ClusterSums>,
    observations: usize,
}

impl RandomInterceptModel {
    /// Creates an empty model with the given fixed-effect term names.
    ///
    /// The design row of every observation must have one entry per term.
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            terms: terms.into_iter().map(Into::into).collect(),
            clusters: vec![],
            observations: 0,
        }
    }

    /// Adds one cluster given its `(design row, response)` pairs.
    ///
    /// Empty clusters are ignored.
    ///
    /// # Panics
    ///
    /// Panics if a design row length differs from the number of terms.
    pub fn add_cluster<I, R>(&mut self, rows: I)
    where
        I: IntoIterator<Item = (R, f64)>,
        R: AsRef<[f64]>,
    {
        let p = self.terms.len();
        let mut sums = ClusterSums {
            len: 0,
            xtx: Matrix::zeros(p, p),
            x_sum: vec![0.0; p],
            xty: vec![0.0; p],
            y_sum: 0.0,
            y_sq_sum: 0.0,
        };
        for (row, y) in rows {
            let row = row.as_ref();
            assert_eq!(row.len(), p, "design row must have one entry per term");
            sums.len += 1;
            add_outer(&mut sums.xtx, row, row, 1.0);
            for (i, x) in row.iter().enumerate() {
                sums.x_sum[i] += x;
                sums.xty[i] += x * y;
            }
            sums.y_sum += y;
            sums.y_sq_sum += y * y;
        }
        if sums.len > 0 {
            self.observations += sums.len;
            self.clusters.push(sums);
        }
    }

    /// Fits the model by REML.
    pub fn fit(&self) -> Result<MixedModelFit, MixedModelError> {
        let p = self.terms.len();
        if self.clusters.is_empty() || self.observations <= p {
            return Err(MixedModelError::InsufficientData {
                observations: self.observations,
                parameters: p,
            });
        }

        // Fails early on a rank-deficient design (identical at every γ)
        self.profile(0.0)
            .map_err(|source| MixedModelError::SingularDesign { source })?;

        let (rho, iterations) = self.minimize_objective()?;
        let gamma = rho_to_gamma(rho);
        let profile = self
            .profile(gamma)
            .map_err(|source| MixedModelError::SingularDesign { source })?;
        self.summarize(gamma, &profile, iterations)
    }

    #[expect(clippy::cast_precision_loss)]
    fn residual_df(&self) -> f64 {
        (self.observations - self.terms.len()) as f64
    }

    fn profile(&self, gamma: f64) -> Result<Profile, MatrixError> {
        let p = self.terms.len();
        let mut xtwx = Matrix::zeros(p, p);
        let mut xtwy = vec![0.0; p];
        let mut ytwy = 0.0;
        let mut ln_det_cluster = 0.0;

        for cluster in &self.clusters {
            #[expect(clippy::cast_precision_loss)]
            let n = cluster.len as f64;
            let w = gamma / (1.0 + n * gamma);
            xtwx = xtwx.add(&cluster.xtx)?;
            add_outer(&mut xtwx, &cluster.x_sum, &cluster.x_sum, -w);
            for i in 0..p {
                xtwy[i] += cluster.xty[i] - w * cluster.x_sum[i] * cluster.y_sum;
            }
            ytwy += cluster.y_sq_sum - w * cluster.y_sum * cluster.y_sum;
            ln_det_cluster += (1.0 + n * gamma).ln();
        }

        let ln_det_xtwx = ln_det_spd(&xtwx)?;
        let beta = xtwx.cholesky_solve(&xtwy)?;
        let fitted = beta.iter().zip(&xtwy).map(|(b, v)| b * v).sum::<f64>();
        Ok(Profile {
            beta,
            xtwx,
            ln_det_xtwx,
            weighted_rss: ytwy - fitted,
            ln_det_cluster,
        })
    }

    /// Profiled `-2 × REML log-likelihood` up to a constant.
    fn objective(&self, rho: f64) -> f64 {
        let Ok(profile) = self.profile(rho_to_gamma(rho)) else {
            return f64::INFINITY;
        };
        if profile.weighted_rss <= 0.0 {
            return f64::INFINITY;
        }
        let value = self.residual_df() * profile.weighted_rss.ln()
            + profile.ln_det_cluster
            + profile.ln_det_xtwx;
        if value.is_finite() {
            value
        } else {
            f64::INFINITY
        }
    }

    #[expect(clippy::cast_precision_loss)]
    fn minimize_objective(&self) -> Result<(f64, usize), MixedModelError> {
        let grid = (0..=GRID_POINTS)
            .map(|k| RHO_MAX * k as f64 / GRID_POINTS as f64)
            .collect::<Vec<_>>();
        let values = grid.iter().map(|&rho| self.objective(rho)).collect::<Vec<_>>();
        let best = values
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .filter(|&i| values[i].is_finite())
            .ok_or(MixedModelError::NotConverged { iterations: 0 })?;

        let mut lo = grid[best.saturating_sub(1)];
        let mut hi = grid[(best + 1).min(GRID_POINTS)];

        let inv_phi = (5f64.sqrt() - 1.0) / 2.0;
        let mut c = hi - inv_phi * (hi - lo);
        let mut d = lo + inv_phi * (hi - lo);
        let mut fc = self.objective(c);
        let mut fd = self.objective(d);
        let mut iterations = 0;
        while hi - lo > GOLDEN_TOLERANCE {
            if iterations == MAX_ITERATIONS {
                return Err(MixedModelError::NotConverged { iterations });
            }
            iterations += 1;
            if fc < fd {
                hi = d;
                d = c;
                fd = fc;
                c = hi - inv_phi * (hi - lo);
                fc = self.objective(c);
            } else {
                lo = c;
                c = d;
                fc = fd;
                d = lo + inv_phi * (hi - lo);
                fd = self.objective(d);
            }
        }

        let refined = f64::midpoint(lo, hi);
        let rho = if self.objective(refined) <= values[best] {
            refined
        } else {
            grid[best]
        };
        Ok((rho, iterations))
    }

    fn summarize(
        &self,
        gamma: f64,
        profile: &Profile,
        iterations: usize,
    ) -> Result<MixedModelFit, MixedModelError> {
        let df = self.residual_df();
        let residual_variance = profile.weighted_rss / df;
        if !residual_variance.is_finite() || residual_variance <= 0.0 {
            return Err(MixedModelError::NotConverged { iterations });
        }
        let covariance = profile
            .xtwx
            .inverse()
            .map_err(|source| MixedModelError::SingularDesign { source })?;

        let coefficients = self
            .terms
            .iter()
            .zip(&profile.beta)
            .enumerate()
            .map(|(i, (name, &estimate))| {
                let std_error = (residual_variance * covariance.get(i, i)).sqrt();
                let z = estimate / std_error;
                Coefficient {
                    name: name.clone(),
                    estimate,
                    std_error,
                    z,
                    p_value: 2.0 * special::standard_normal_sf(z.abs()),
                    ci_lower: estimate - Z_975 * std_error,
                    ci_upper: estimate + Z_975 * std_error,
                }
            })
            .collect();

        let reml_log_likelihood = -0.5
            * (df * ((2.0 * PI).ln() + 1.0 + residual_variance.ln())
                + profile.ln_det_cluster
                + profile.ln_det_xtwx);

        Ok(MixedModelFit {
            coefficients,
            group_variance: gamma * residual_variance,
            residual_variance,
            reml_log_likelihood,
            observations: self.observations,
            clusters: self.clusters.len(),
            iterations,
        })
    }
}

fn rho_to_gamma(rho: f64) -> f64 {
    rho / (1.0 - rho)
}

/// Adds `scale * u vᵀ` to `m`.
fn add_outer(m: &mut Matrix, u: &[f64], v: &[f64], scale: f64) {
    for (i, ui) in u.iter().enumerate() {
        for (j, vj) in v.iter().enumerate() {
            m.set(i, j, m.get(i, j) + scale * ui * vj);
        }
    }
}

/// Log-determinant of a symmetric positive definite matrix, `2 Σ ln Lᵢᵢ`.
///
/// A pivot that is negligible next to its diagonal entry is treated as zero,
/// so rank-deficient designs are rejected despite rounding.
fn ln_det_spd(m: &Matrix) -> Result<f64, MatrixError> {
    let lower = m.cholesky()?;
    let mut ln_det = 0.0;
    for (pivot, diagonal) in lower.diag().into_iter().zip(m.diag()) {
        if pivot * pivot <= diagonal.abs() * PIVOT_TOLERANCE {
            return Err(MatrixError::NotPositiveDefinite);
        }
        ln_det += 2.0 * pivot.ln();
    }
    Ok(ln_det)
}
