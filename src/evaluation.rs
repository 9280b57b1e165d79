// src/evaluation.rs

//! Scoring de-noised reconstructions against ground truth, with linear PCA as
//! the reference method.

use ndarray::{s, Array1, Array2, ArrayView2, Axis, Zip};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{KernelPcaError, Result};
use crate::linalg_backends::{BackendEigh, LinAlgBackendProvider};
use crate::preimage::DenoisedBatch;

/// Mean-centered linear PCA used as the de-noising baseline.
///
/// Features are centered but not scaled, so reconstructions live in the same
/// units as the kernel pre-images they are compared with.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LinearPcaBaseline {
    /// Shape: (n_features)
    mean: Array1<f64>,
    /// Principal axes as unit-norm columns. Shape: (n_features, n_components)
    rotation: Array2<f64>,
    /// Covariance eigenvalues of the kept axes, descending. Shape: (n_components)
    explained_variance: Array1<f64>,
}

impl LinearPcaBaseline {
    /// Fits the top `n_components` axes from the covariance matrix of `data`.
    ///
    /// # Errors
    /// Returns an error if `data` has fewer than 2 rows, zero columns, or
    /// non-finite values, if `n_components` is 0 or exceeds the number of
    /// features, or if the eigendecomposition fails.
    pub fn fit(data: ArrayView2<f64>, n_components: usize) -> Result<Self> {
        let (n_samples, n_features) = data.dim();
        if n_samples < 2 {
            return Err(KernelPcaError::invalid("data", "linear PCA needs at least 2 samples"));
        }
        if n_features == 0 {
            return Err(KernelPcaError::invalid("data", "has zero features"));
        }
        if n_components == 0 || n_components > n_features {
            return Err(KernelPcaError::invalid(
                "n_components",
                format!("must be in 1..={} for linear PCA, got {}", n_features, n_components),
            ));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(KernelPcaError::NonFiniteInput { context: "baseline data" });
        }

        let mean = data
            .mean_axis(Axis(0))
            .ok_or_else(|| KernelPcaError::invalid("data", "failed to compute the feature means"))?;
        let centered = &data - &mean;

        let mut cov_matrix = centered.t().dot(&centered);
        cov_matrix /= (n_samples - 1) as f64;

        let eigh = LinAlgBackendProvider::<f64>::new()
            .eigh_upper(&cov_matrix)
            .map_err(|e| KernelPcaError::EigenDecomposition(e.to_string()))?;

        let mut eig_pairs: Vec<(f64, usize)> = eigh
            .eigenvalues
            .iter()
            .copied()
            .enumerate()
            .map(|(idx, val)| (val, idx))
            .collect();
        eig_pairs.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

        let mut rotation = Array2::<f64>::zeros((n_features, n_components));
        let mut explained_variance = Array1::<f64>::zeros(n_components);
        for (target_col, &(eigval, source_col)) in eig_pairs.iter().take(n_components).enumerate() {
            let mut axis_i = eigh.eigenvectors.column(source_col).to_owned();
            let norm = axis_i.dot(&axis_i).sqrt();
            if norm > 1e-9 {
                axis_i.mapv_inplace(|x| x / norm);
            } else {
                axis_i.fill(0.0);
            }
            rotation.slice_mut(s![.., target_col]).assign(&axis_i);
            explained_variance[target_col] = eigval.max(0.0);
        }

        debug!("Linear PCA baseline explained variance: {:?}", explained_variance);
        Ok(Self {
            mean,
            rotation,
            explained_variance,
        })
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn rotation(&self) -> &Array2<f64> {
        &self.rotation
    }

    pub fn explained_variance(&self) -> &Array1<f64> {
        &self.explained_variance
    }

    fn check_features(&self, n_features: usize) -> Result<()> {
        if n_features != self.mean.len() {
            return Err(KernelPcaError::DimensionMismatch {
                context: "data features vs baseline features",
                expected: self.mean.len(),
                found: n_features,
            });
        }
        Ok(())
    }

    /// Projects rows of `data` onto the principal axes.
    pub fn transform(&self, data: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.check_features(data.ncols())?;
        Ok((&data - &self.mean).dot(&self.rotation))
    }

    /// Maps component scores back into feature space.
    pub fn inverse_transform(&self, scores: ArrayView2<f64>) -> Result<Array2<f64>> {
        if scores.ncols() != self.rotation.ncols() {
            return Err(KernelPcaError::DimensionMismatch {
                context: "score columns vs baseline components",
                expected: self.rotation.ncols(),
                found: scores.ncols(),
            });
        }
        Ok(scores.dot(&self.rotation.t()) + &self.mean)
    }

    /// Projects and back-projects `data`: the rank-limited linear reconstruction.
    pub fn reconstruct(&self, data: ArrayView2<f64>) -> Result<Array2<f64>> {
        let scores = self.transform(data)?;
        self.inverse_transform(scores.view())
    }
}

/// Mean of squared differences over every entry. NaN entries propagate.
pub fn mean_squared_error(points: ArrayView2<f64>, truth: ArrayView2<f64>) -> Result<f64> {
    if points.dim() != truth.dim() {
        let (expected, found) = if points.nrows() != truth.nrows() {
            (truth.nrows(), points.nrows())
        } else {
            (truth.ncols(), points.ncols())
        };
        return Err(KernelPcaError::DimensionMismatch {
            context: "points vs ground truth",
            expected,
            found,
        });
    }
    if points.is_empty() {
        return Err(KernelPcaError::invalid("points", "cannot score an empty matrix"));
    }
    let sum_sq = Zip::from(&points)
        .and(&truth)
        .fold(0.0_f64, |acc, &p, &t| acc + (p - t) * (p - t));
    Ok(sum_sq / points.len() as f64)
}

/// De-noising quality of kernel PCA relative to linear PCA on the same queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DenoisingScore {
    pub baseline_mse: f64,
    pub kernel_mse: f64,
    /// `baseline_mse / kernel_mse`; above 1 means kernel PCA de-noised better.
    /// NaN whenever any kernel reconstruction diverged.
    pub ratio: f64,
    pub n_queries: usize,
    pub diverged: usize,
    pub not_converged: usize,
}

impl DenoisingScore {
    /// Scores kernel and baseline reconstructions of the same queries against
    /// per-row ground truth (e.g. the center each query was drawn around).
    pub fn evaluate(
        baseline_points: ArrayView2<f64>,
        kernel_batch: &DenoisedBatch,
        truth: ArrayView2<f64>,
    ) -> Result<Self> {
        let baseline_mse = mean_squared_error(baseline_points, truth)?;
        let kernel_mse = mean_squared_error(kernel_batch.points.view(), truth)?;
        let score = DenoisingScore {
            baseline_mse,
            kernel_mse,
            ratio: baseline_mse / kernel_mse,
            n_queries: kernel_batch.len(),
            diverged: kernel_batch.diverged_count(),
            not_converged: kernel_batch.not_converged_count(),
        };
        info!(
            "De-noising score: baseline MSE {:.6}, kernel MSE {:.6}, ratio {:.3} ({} diverged, {} not converged of {}).",
            score.baseline_mse, score.kernel_mse, score.ratio, score.diverged, score.not_converged, score.n_queries
        );
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_data(n_samples: usize, n_features: usize, seed: u64) -> Array2<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Array2::from_shape_fn((n_samples, n_features), |_| rng.gen_range(-1.0..1.0))
    }

    #[test]
    fn full_rank_baseline_reconstructs_exactly() {
        let data = random_data(30, 4, 7);
        let baseline = LinearPcaBaseline::fit(data.view(), 4).unwrap();
        let rebuilt = baseline.reconstruct(data.view()).unwrap();
        assert_abs_diff_eq!(mean_squared_error(rebuilt.view(), data.view()).unwrap(), 0.0, epsilon = 1e-20);
    }

    #[test]
    fn baseline_axes_are_orthonormal_and_sorted() {
        let data = random_data(50, 5, 21);
        let baseline = LinearPcaBaseline::fit(data.view(), 3).unwrap();
        let gram = baseline.rotation().t().dot(baseline.rotation());
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(gram[[i, j]], expected, epsilon = 1e-10);
            }
        }
        let ev = baseline.explained_variance();
        assert!(ev[0] >= ev[1] && ev[1] >= ev[2]);
    }

    #[test]
    fn rank_one_baseline_recovers_a_line() {
        // Points on the line y = 2x are reconstructed exactly by one axis.
        let data = array![[0.0, 0.0], [1.0, 2.0], [2.0, 4.0], [-1.0, -2.0]];
        let baseline = LinearPcaBaseline::fit(data.view(), 1).unwrap();
        let rebuilt = baseline.reconstruct(data.view()).unwrap();
        for (a, b) in rebuilt.iter().zip(data.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
        }
    }

    #[test]
    fn baseline_rejects_bad_component_counts() {
        let data = random_data(10, 3, 1);
        assert!(matches!(
            LinearPcaBaseline::fit(data.view(), 0),
            Err(KernelPcaError::InvalidParameter { parameter: "n_components", .. })
        ));
        assert!(LinearPcaBaseline::fit(data.view(), 4).is_err());

        let baseline = LinearPcaBaseline::fit(data.view(), 2).unwrap();
        assert!(matches!(
            baseline.transform(Array2::<f64>::zeros((2, 5)).view()),
            Err(KernelPcaError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn mse_propagates_nan() {
        let points = array![[f64::NAN, 0.0], [1.0, 1.0]];
        let truth = array![[0.0, 0.0], [1.0, 1.0]];
        assert!(mean_squared_error(points.view(), truth.view()).unwrap().is_nan());
        let ok = array![[1.0, 0.0], [1.0, 3.0]];
        assert_abs_diff_eq!(mean_squared_error(ok.view(), truth.view()).unwrap(), 5.0 / 4.0);
    }

    #[test]
    fn mse_rejects_shape_mismatch() {
        let a = Array2::<f64>::zeros((2, 3));
        let b = Array2::<f64>::zeros((3, 3));
        assert!(matches!(
            mean_squared_error(a.view(), b.view()),
            Err(KernelPcaError::DimensionMismatch { expected: 3, found: 2, .. })
        ));
    }
}
