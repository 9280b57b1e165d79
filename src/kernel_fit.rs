// src/kernel_fit.rs

use ndarray::{s, Array1, Array2, ArrayView2};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::diagnostics::FitDiagnostics;
use crate::error::{KernelPcaError, Result};
use crate::kernel::{center_kernel_matrix, rbf_kernel_matrix};
use crate::linalg_backends::{BackendEigh, LinAlgBackendProvider};

/// Configuration for fitting kernel PCA coefficients.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KernelPcaConfig {
    /// Bandwidth of the RBF kernel `exp(-gamma * ||x - y||^2)`. Must be positive and finite.
    pub gamma: f64,
    /// Number of leading components (k) to keep. Must satisfy `1 <= k <= n_samples`.
    pub n_components: usize,
    /// A selected eigenvalue counts as informative when it exceeds
    /// `degeneracy_tolerance * largest_eigenvalue`.
    pub degeneracy_tolerance: f64,
}

impl Default for KernelPcaConfig {
    fn default() -> Self {
        KernelPcaConfig {
            gamma: 1.0,
            n_components: 2,
            degeneracy_tolerance: 1e-10,
        }
    }
}

impl KernelPcaConfig {
    pub fn new(gamma: f64, n_components: usize) -> Self {
        Self {
            gamma,
            n_components,
            ..Self::default()
        }
    }

    /// Builds a configuration whose bandwidth matches isotropic noise of
    /// standard deviation `sigma` in `n_features` dimensions:
    /// `gamma = 1 / (n_features * 2 * sigma^2)`.
    pub fn from_sigma(sigma: f64, n_features: usize, n_components: usize) -> Result<Self> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(KernelPcaError::invalid(
                "sigma",
                format!("must be positive and finite, got {}", sigma),
            ));
        }
        if n_features == 0 {
            return Err(KernelPcaError::invalid("n_features", "must be at least 1"));
        }
        let gamma = 1.0 / (n_features as f64 * 2.0 * sigma * sigma);
        Ok(Self::new(gamma, n_components))
    }

    pub fn validate(&self) -> Result<()> {
        validate_gamma(self.gamma)?;
        if self.n_components == 0 {
            return Err(KernelPcaError::invalid("n_components", "must be at least 1"));
        }
        if !self.degeneracy_tolerance.is_finite() || self.degeneracy_tolerance < 0.0 {
            return Err(KernelPcaError::invalid(
                "degeneracy_tolerance",
                format!("must be non-negative and finite, got {}", self.degeneracy_tolerance),
            ));
        }
        Ok(())
    }
}

pub(crate) fn validate_gamma(gamma: f64) -> Result<()> {
    if !gamma.is_finite() || gamma <= 0.0 {
        return Err(KernelPcaError::invalid(
            "gamma",
            format!("must be positive and finite, got {}", gamma),
        ));
    }
    Ok(())
}

/// Checks the L x N training matrix: at least two samples, at least one
/// feature, all values finite.
pub(crate) fn validate_training_data(training_data: ArrayView2<f64>) -> Result<()> {
    let (n_samples, n_features) = training_data.dim();
    if n_samples < 2 {
        return Err(KernelPcaError::invalid(
            "training_data",
            format!("needs at least 2 samples to form pairwise distances, got {}", n_samples),
        ));
    }
    if n_features == 0 {
        return Err(KernelPcaError::invalid("training_data", "has zero features"));
    }
    if training_data.iter().any(|v| !v.is_finite()) {
        return Err(KernelPcaError::NonFiniteInput { context: "training_data" });
    }
    Ok(())
}

/// The L x k coefficient matrix (alpha) of a kernel PCA fit.
///
/// Column j is the unit-norm eigenvector of the centered kernel matrix that
/// belongs to its j-th largest eigenvalue. Columns are not rescaled by their
/// eigenvalues.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CoefficientMatrix {
    /// Shape: (n_samples, n_components)
    alphas: Array2<f64>,
    /// Eigenvalues of the selected columns, descending.
    /// Shape: (n_components)
    eigenvalues: Array1<f64>,
    /// How many of the selected eigenvalues are informative.
    effective_components: usize,
}

impl CoefficientMatrix {
    pub fn alphas(&self) -> &Array2<f64> {
        &self.alphas
    }

    pub fn eigenvalues(&self) -> &Array1<f64> {
        &self.eigenvalues
    }

    pub fn n_samples(&self) -> usize {
        self.alphas.nrows()
    }

    pub fn n_components(&self) -> usize {
        self.alphas.ncols()
    }

    /// Number of selected components whose eigenvalue is informative. Less
    /// than `n_components()` when the centered kernel is rank-deficient; the
    /// trailing columns are then whatever the eigensolver ordered last.
    pub fn effective_components(&self) -> usize {
        self.effective_components
    }

    pub fn is_degenerate(&self) -> bool {
        self.effective_components < self.n_components()
    }

    pub fn into_alphas(self) -> Array2<f64> {
        self.alphas
    }

    /// Internal consistency check used when a matrix comes from outside a fit.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.eigenvalues.len() != self.alphas.ncols() {
            return Err(KernelPcaError::DimensionMismatch {
                context: "coefficient eigenvalues",
                expected: self.alphas.ncols(),
                found: self.eigenvalues.len(),
            });
        }
        if self.effective_components > self.alphas.ncols() {
            return Err(KernelPcaError::invalid(
                "effective_components",
                format!(
                    "{} exceeds the number of components {}",
                    self.effective_components,
                    self.alphas.ncols()
                ),
            ));
        }
        if self.alphas.iter().chain(self.eigenvalues.iter()).any(|v| !v.is_finite()) {
            return Err(KernelPcaError::NonFiniteInput { context: "coefficient matrix" });
        }
        Ok(())
    }
}

/// Validated centered RBF kernel matrix of `training_data`.
pub fn centered_kernel_matrix(training_data: ArrayView2<f64>, gamma: f64) -> Result<Array2<f64>> {
    validate_gamma(gamma)?;
    validate_training_data(training_data)?;
    Ok(center_kernel_matrix(&rbf_kernel_matrix(training_data, gamma)))
}

/// Fits kernel PCA coefficients: builds the centered RBF kernel matrix of the
/// training rows and keeps the eigenvectors of its `n_components` largest
/// eigenvalues.
#[derive(Debug, Clone)]
pub struct KernelFit {
    config: KernelPcaConfig,
}

impl KernelFit {
    pub fn new(config: KernelPcaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KernelPcaConfig {
        &self.config
    }

    /// Computes the coefficient matrix for `training_data` (shape L x N).
    ///
    /// # Errors
    /// `InvalidParameter` when gamma is not positive, when `n_components` is
    /// zero or exceeds L, or when L < 2; `NonFiniteInput` for NaN/inf data;
    /// `EigenDecomposition` when the backend fails.
    ///
    /// Columns belonging to tied eigenvalues are any orthonormal basis of the
    /// shared eigenspace, as returned by the backend.
    ///
    /// A rank-deficient kernel is not an error: the result still has
    /// `n_components` columns and reports the shortfall through
    /// [`CoefficientMatrix::effective_components`].
    pub fn fit(&self, training_data: ArrayView2<f64>) -> Result<CoefficientMatrix> {
        self.fit_inner(training_data).map(|(coefficients, _)| coefficients)
    }

    /// Like [`KernelFit::fit`], also returning diagnostics of the centered
    /// kernel and the selected spectrum.
    pub fn fit_with_diagnostics(
        &self,
        training_data: ArrayView2<f64>,
    ) -> Result<(CoefficientMatrix, FitDiagnostics)> {
        let start_time = Instant::now();
        let (coefficients, centered) = self.fit_inner(training_data)?;
        let diagnostics = FitDiagnostics::from_fit(
            &centered,
            &coefficients,
            self.config.gamma,
            training_data.ncols(),
            start_time.elapsed().as_secs_f64(),
        );
        Ok((coefficients, diagnostics))
    }

    fn fit_inner(&self, training_data: ArrayView2<f64>) -> Result<(CoefficientMatrix, Array2<f64>)> {
        self.config.validate()?;
        validate_training_data(training_data)?;
        let (n_samples, n_features) = training_data.dim();
        let n_components = self.config.n_components;
        if n_components > n_samples {
            return Err(KernelPcaError::invalid(
                "n_components",
                format!("cannot extract {} components from {} samples", n_components, n_samples),
            ));
        }

        info!(
            "Fitting kernel PCA: {} samples, {} features, gamma={}, k={}.",
            n_samples, n_features, self.config.gamma, n_components
        );

        let kernel_start_time = Instant::now();
        let kernel = rbf_kernel_matrix(training_data, self.config.gamma);
        let centered = center_kernel_matrix(&kernel);
        info!("Built centered {}x{} kernel matrix in {:?}", n_samples, n_samples, kernel_start_time.elapsed());

        let eigh_start_time = Instant::now();
        let eigh = LinAlgBackendProvider::<f64>::new()
            .eigh_upper(&centered)
            .map_err(|e| KernelPcaError::EigenDecomposition(e.to_string()))?;
        info!("Eigendecomposition of centered kernel finished in {:?}", eigh_start_time.elapsed());

        // Sort descending by eigenvalue; do not rely on the backend's order.
        let mut eig_pairs: Vec<(f64, usize)> = eigh
            .eigenvalues
            .iter()
            .copied()
            .enumerate()
            .map(|(idx, val)| (val, idx))
            .collect();
        eig_pairs.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

        let mut alphas = Array2::<f64>::zeros((n_samples, n_components));
        let mut selected_eigenvalues = Array1::<f64>::zeros(n_components);
        for (target_col, &(eigval, source_col)) in eig_pairs.iter().take(n_components).enumerate() {
            alphas
                .slice_mut(s![.., target_col])
                .assign(&eigh.eigenvectors.column(source_col));
            selected_eigenvalues[target_col] = eigval;
        }

        let largest_eigval = eig_pairs.first().map_or(0.0, |(v, _)| *v);
        let effective_components = if largest_eigval <= 0.0 {
            0
        } else {
            let threshold = largest_eigval * self.config.degeneracy_tolerance;
            selected_eigenvalues.iter().take_while(|&&v| v > threshold).count()
        };

        debug!(
            "Leading eigenvalues of centered kernel: {:?}",
            selected_eigenvalues.iter().take(10).collect::<Vec<_>>()
        );
        if effective_components < n_components {
            warn!(
                "Centered kernel has only {} informative components of the {} requested (largest eigenvalue {:e}); trailing coefficient columns follow the eigensolver's ordering.",
                effective_components, n_components, largest_eigval
            );
        }

        Ok((
            CoefficientMatrix {
                alphas,
                eigenvalues: selected_eigenvalues,
                effective_components,
            },
            centered,
        ))
    }
}

/// Fits kernel PCA coefficients with the default degeneracy tolerance.
///
/// Tied eigenvalues have no preferred eigenvectors: for training sets with a
/// repeated leading eigenvalue (e.g. a symmetric square) the returned columns
/// are whichever orthonormal basis the backend produced, and pre-images built
/// from them can differ between backends.
///
/// Equivalent to `KernelFit::new(KernelPcaConfig::new(gamma, n_components)).fit(training_data)`.
pub fn fit(training_data: ArrayView2<f64>, gamma: f64, n_components: usize) -> Result<CoefficientMatrix> {
    KernelFit::new(KernelPcaConfig::new(gamma, n_components)).fit(training_data)
}
