// src/preimage.rs

//! Fixed-point pre-image reconstruction for RBF kernel PCA.
//!
//! A query `x` is projected onto the fitted components,
//! `beta_j = sum_i alpha[i,j] k(x, x_i)`, which defines per-training-point
//! weights `gamma_i = sum_j alpha[i,j] beta_j`. The pre-image `z` then solves
//!
//! ```text
//! z = sum_i gamma_i k(z, x_i) x_i / sum_i gamma_i k(z, x_i)
//! ```
//!
//! by iterating from `z = x`. The starting point selects which fixed point is
//! reached, so it is always the query itself.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use log::{debug, trace, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::diagnostics::ConvergenceTrace;
use crate::error::{KernelPcaError, Result};
use crate::kernel::rbf_kernel_vector;
use crate::kernel_fit::{validate_gamma, CoefficientMatrix};

/// Default convergence tolerance on the max absolute coordinate change.
pub const DEFAULT_TOLERANCE: f64 = 1e-5;
/// Default cap on fixed-point iterations.
pub const DEFAULT_MAX_ITERATIONS: usize = 1000;

/// Terminal state of a reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReconstructionStatus {
    /// The max absolute coordinate change fell below the tolerance.
    Converged,
    /// The update's denominator vanished (or became non-finite); the point is all NaN.
    Diverged,
    /// The iteration cap was reached; the point is the last iterate.
    MaxItersExceeded,
}

/// Configuration for the fixed-point iteration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreimageConfig {
    /// Stop once `max_i |z_new[i] - z[i]| < tolerance`. Must be positive.
    pub tolerance: f64,
    /// Maximum number of fixed-point steps before giving up. Must be at least 1.
    pub max_iterations: usize,
    /// Record a [`ConvergenceTrace`] on every reconstruction.
    pub record_trace: bool,
}

impl Default for PreimageConfig {
    fn default() -> Self {
        PreimageConfig {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            record_trace: false,
        }
    }
}

impl PreimageConfig {
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_trace(mut self, record_trace: bool) -> Self {
        self.record_trace = record_trace;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(KernelPcaError::invalid(
                "tolerance",
                format!("must be positive and finite, got {}", self.tolerance),
            ));
        }
        if self.max_iterations == 0 {
            return Err(KernelPcaError::invalid("max_iterations", "must be at least 1"));
        }
        Ok(())
    }
}

/// Projection of one query onto the fitted components.
#[derive(Debug, Clone)]
pub struct ProjectionWeights {
    /// k(query, x_i) for every training row. Shape: (n_samples)
    pub kernel_similarities: Array1<f64>,
    /// Projection onto each component. Shape: (n_components)
    pub beta: Array1<f64>,
    /// Influence of each training row on the pre-image. Shape: (n_samples)
    pub gamma_weights: Array1<f64>,
}

/// Result of reconstructing one query.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// The pre-image. All NaN when `status` is `Diverged`.
    pub point: Array1<f64>,
    pub status: ReconstructionStatus,
    /// Number of fixed-point steps taken.
    pub iterations: usize,
    /// Max absolute change of the last completed step; NaN when diverged.
    pub final_change: f64,
    pub trace: Option<ConvergenceTrace>,
}

impl Reconstruction {
    pub fn is_converged(&self) -> bool {
        self.status == ReconstructionStatus::Converged
    }
}

/// Reconstructions of a batch of queries, one row per query.
#[derive(Debug, Clone)]
pub struct DenoisedBatch {
    /// Shape: (n_queries, n_features)
    pub points: Array2<f64>,
    pub statuses: Vec<ReconstructionStatus>,
    pub iterations: Vec<usize>,
}

impl DenoisedBatch {
    fn from_reconstructions(n_features: usize, reconstructions: Vec<Reconstruction>) -> Self {
        let mut points = Array2::<f64>::zeros((reconstructions.len(), n_features));
        let mut statuses = Vec::with_capacity(reconstructions.len());
        let mut iterations = Vec::with_capacity(reconstructions.len());
        for (mut row, reconstruction) in points.axis_iter_mut(Axis(0)).zip(reconstructions) {
            row.assign(&reconstruction.point);
            statuses.push(reconstruction.status);
            iterations.push(reconstruction.iterations);
        }
        DenoisedBatch {
            points,
            statuses,
            iterations,
        }
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn count(&self, status: ReconstructionStatus) -> usize {
        self.statuses.iter().filter(|&&s| s == status).count()
    }

    pub fn converged_count(&self) -> usize {
        self.count(ReconstructionStatus::Converged)
    }

    pub fn diverged_count(&self) -> usize {
        self.count(ReconstructionStatus::Diverged)
    }

    pub fn not_converged_count(&self) -> usize {
        self.count(ReconstructionStatus::MaxItersExceeded)
    }
}

/// Reconstructs pre-images against a fixed training set and coefficient matrix.
///
/// Holds read-only views only, so one solver can serve many queries and be
/// shared across threads.
#[derive(Debug, Clone)]
pub struct PreimageSolver<'a> {
    alphas: ArrayView2<'a, f64>,
    training_data: ArrayView2<'a, f64>,
    gamma: f64,
    config: PreimageConfig,
}

impl<'a> PreimageSolver<'a> {
    pub fn new(
        coefficients: &'a CoefficientMatrix,
        training_data: ArrayView2<'a, f64>,
        gamma: f64,
        config: PreimageConfig,
    ) -> Result<Self> {
        Self::from_alphas(coefficients.alphas().view(), training_data, gamma, config)
    }

    /// Builds a solver from a raw L x k coefficient matrix.
    pub fn from_alphas(
        alphas: ArrayView2<'a, f64>,
        training_data: ArrayView2<'a, f64>,
        gamma: f64,
        config: PreimageConfig,
    ) -> Result<Self> {
        validate_gamma(gamma)?;
        config.validate()?;
        let (n_samples, n_features) = training_data.dim();
        if n_samples == 0 || n_features == 0 {
            return Err(KernelPcaError::invalid(
                "training_data",
                "has zero samples or zero features",
            ));
        }
        if alphas.nrows() != n_samples {
            return Err(KernelPcaError::DimensionMismatch {
                context: "coefficient matrix rows vs training samples",
                expected: n_samples,
                found: alphas.nrows(),
            });
        }
        if alphas.ncols() == 0 {
            return Err(KernelPcaError::invalid("coefficients", "has zero components"));
        }
        if training_data.iter().any(|v| !v.is_finite()) {
            return Err(KernelPcaError::NonFiniteInput { context: "training_data" });
        }
        if alphas.iter().any(|v| !v.is_finite()) {
            return Err(KernelPcaError::NonFiniteInput { context: "coefficient matrix" });
        }
        Ok(Self {
            alphas,
            training_data,
            gamma,
            config,
        })
    }

    pub fn config(&self) -> &PreimageConfig {
        &self.config
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn n_features(&self) -> usize {
        self.training_data.ncols()
    }

    fn check_query(&self, query: ArrayView1<f64>) -> Result<()> {
        if query.len() != self.n_features() {
            return Err(KernelPcaError::DimensionMismatch {
                context: "query length vs training features",
                expected: self.n_features(),
                found: query.len(),
            });
        }
        if query.iter().any(|v| !v.is_finite()) {
            return Err(KernelPcaError::NonFiniteInput { context: "query" });
        }
        Ok(())
    }

    /// Projects `query` onto the components and derives the per-training-row
    /// weights of the pre-image update.
    ///
    /// The two stages are kept separate: `beta = alpha^T k` first, then
    /// `gamma_weights = alpha beta`.
    pub fn project(&self, query: ArrayView1<f64>) -> Result<ProjectionWeights> {
        self.check_query(query)?;
        let kernel_similarities = rbf_kernel_vector(query, self.training_data, self.gamma);
        let beta = self.alphas.t().dot(&kernel_similarities);
        let gamma_weights = self.alphas.dot(&beta);
        Ok(ProjectionWeights {
            kernel_similarities,
            beta,
            gamma_weights,
        })
    }

    /// One application of the fixed-point map to `z`.
    ///
    /// Returns the new iterate and the denominator of the update. When the
    /// denominator is zero the iterate is NaN; callers decide what that means.
    pub fn fixed_point_step(&self, z: ArrayView1<f64>, gamma_weights: ArrayView1<f64>) -> (Array1<f64>, f64) {
        let mut zcoeff = rbf_kernel_vector(z, self.training_data, self.gamma);
        zcoeff *= &gamma_weights;
        let denominator = zcoeff.sum();
        let numerator = self.training_data.t().dot(&zcoeff);
        (numerator / denominator, denominator)
    }

    /// Reconstructs the pre-image of a single query.
    ///
    /// Errors only for a malformed query (wrong length, non-finite values).
    /// Divergence and non-convergence are reported through
    /// [`Reconstruction::status`].
    pub fn reconstruct(&self, query: ArrayView1<f64>) -> Result<Reconstruction> {
        let weights = self.project(query)?;
        debug!(
            "Projected query: |beta|={:.6e}, sum(gamma_weights)={:.6e}",
            weights.beta.dot(&weights.beta).sqrt(),
            weights.gamma_weights.sum()
        );
        Ok(self.iterate(query, weights.gamma_weights.view()))
    }

    fn iterate(&self, query: ArrayView1<f64>, gamma_weights: ArrayView1<f64>) -> Reconstruction {
        let n_features = self.n_features();
        let mut trace_log = if self.config.record_trace {
            Some(ConvergenceTrace::default())
        } else {
            None
        };
        let mut z = query.to_owned();
        let mut last_change = f64::INFINITY;

        for iteration in 1..=self.config.max_iterations {
            let (z_new, denominator) = self.fixed_point_step(z.view(), gamma_weights);

            if denominator == 0.0 || !denominator.is_finite() || z_new.iter().any(|v| !v.is_finite()) {
                warn!(
                    "Pre-image iteration diverged at step {} (denominator {:e}); returning NaN.",
                    iteration, denominator
                );
                if let Some(t) = trace_log.as_mut() {
                    t.push(iteration, f64::NAN, denominator);
                }
                return Reconstruction {
                    point: Array1::from_elem(n_features, f64::NAN),
                    status: ReconstructionStatus::Diverged,
                    iterations: iteration,
                    final_change: f64::NAN,
                    trace: trace_log,
                };
            }

            let change = Zip::from(&z_new)
                .and(&z)
                .fold(0.0_f64, |m, &a, &b| m.max((a - b).abs()));
            trace!("Pre-image step {}: max |dz| = {:.3e}, denominator = {:.3e}", iteration, change, denominator);
            if let Some(t) = trace_log.as_mut() {
                t.push(iteration, change, denominator);
            }

            if change < self.config.tolerance {
                return Reconstruction {
                    point: z_new,
                    status: ReconstructionStatus::Converged,
                    iterations: iteration,
                    final_change: change,
                    trace: trace_log,
                };
            }
            z = z_new;
            last_change = change;
        }

        warn!(
            "Pre-image iteration did not converge within {} steps (last change {:.3e}).",
            self.config.max_iterations, last_change
        );
        Reconstruction {
            point: z,
            status: ReconstructionStatus::MaxItersExceeded,
            iterations: self.config.max_iterations,
            final_change: last_change,
            trace: trace_log,
        }
    }

    /// Reconstructs every row of `queries` in parallel. Results are in row
    /// order and identical to calling [`PreimageSolver::reconstruct`] per row.
    pub fn reconstruct_batch(&self, queries: ArrayView2<f64>) -> Result<Vec<Reconstruction>> {
        if queries.ncols() != self.n_features() {
            return Err(KernelPcaError::DimensionMismatch {
                context: "query columns vs training features",
                expected: self.n_features(),
                found: queries.ncols(),
            });
        }
        queries
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|query| self.reconstruct(query))
            .collect()
    }

    /// Batch reconstruction collected into a matrix plus per-row statuses.
    pub fn denoise(&self, queries: ArrayView2<f64>) -> Result<DenoisedBatch> {
        let reconstructions = self.reconstruct_batch(queries)?;
        let batch = DenoisedBatch::from_reconstructions(self.n_features(), reconstructions);
        if batch.diverged_count() > 0 || batch.not_converged_count() > 0 {
            warn!(
                "De-noised {} queries: {} converged, {} diverged, {} hit the iteration cap.",
                batch.len(),
                batch.converged_count(),
                batch.diverged_count(),
                batch.not_converged_count()
            );
        } else {
            debug!("De-noised {} queries, all converged.", batch.len());
        }
        Ok(batch)
    }
}

/// Reconstructs one query with the default iteration cap.
///
/// `coefficients` is the L x k alpha matrix from a fit on `training_data`.
///
/// When the leading eigenvalues of the fit are tied, the fitted columns are
/// just one basis of that eigenspace and the outcome for a given query depends
/// on which basis the eigensolver returned. On the symmetric four-point square
/// a query next to `[1, 0]` can come back `Diverged` when the basis picks the
/// other pair of points.
pub fn reconstruct<'a>(
    query: ArrayView1<f64>,
    coefficients: ArrayView2<'a, f64>,
    training_data: ArrayView2<'a, f64>,
    gamma: f64,
    tolerance: f64,
) -> Result<(Array1<f64>, ReconstructionStatus)> {
    let config = PreimageConfig::default().with_tolerance(tolerance);
    let solver = PreimageSolver::from_alphas(coefficients, training_data, gamma, config)?;
    let reconstruction = solver.reconstruct(query)?;
    Ok((reconstruction.point, reconstruction.status))
}
