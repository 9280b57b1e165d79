// src/diagnostics.rs

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::kernel_fit::CoefficientMatrix;

/// Summary of a kernel PCA fit: the selected spectrum and how well the
/// centered kernel satisfies its invariants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FitDiagnostics {
    pub n_samples: usize,
    pub n_features: usize,
    pub gamma: f64,
    pub requested_components: usize,
    pub effective_components: usize,
    pub selected_eigenvalues: Vec<f64>,

    // --- Centered kernel invariants ---
    pub max_abs_row_sum: f64,
    pub max_abs_column_sum: f64,
    /// max |K_c[i,j] - K_c[j,i]|
    pub symmetry_error: f64,

    /// Largest deviation of a coefficient column's Euclidean norm from 1.
    pub max_column_norm_error: f64,

    pub elapsed_seconds: f64,
}

impl FitDiagnostics {
    pub(crate) fn from_fit(
        centered_kernel: &Array2<f64>,
        coefficients: &CoefficientMatrix,
        gamma: f64,
        n_features: usize,
        elapsed_seconds: f64,
    ) -> Self {
        let max_abs = |values: ndarray::Array1<f64>| values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let max_abs_row_sum = max_abs(centered_kernel.sum_axis(Axis(1)));
        let max_abs_column_sum = max_abs(centered_kernel.sum_axis(Axis(0)));
        let symmetry_error = (centered_kernel - &centered_kernel.t())
            .iter()
            .fold(0.0_f64, |m, v| m.max(v.abs()));
        let max_column_norm_error = coefficients
            .alphas()
            .columns()
            .into_iter()
            .map(|col| (col.dot(&col).sqrt() - 1.0).abs())
            .fold(0.0_f64, f64::max);

        FitDiagnostics {
            n_samples: centered_kernel.nrows(),
            n_features,
            gamma,
            requested_components: coefficients.n_components(),
            effective_components: coefficients.effective_components(),
            selected_eigenvalues: coefficients.eigenvalues().to_vec(),
            max_abs_row_sum,
            max_abs_column_sum,
            symmetry_error,
            max_column_norm_error,
            elapsed_seconds,
        }
    }
}

/// One fixed-point step of a pre-image iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based step number.
    pub iteration: usize,
    /// max_i |z_new[i] - z[i]|; NaN on the step that diverged.
    pub max_abs_change: f64,
    /// Sum of the kernel-weighted coefficients that normalizes the update.
    pub denominator: f64,
}

/// Per-iteration history of a pre-image reconstruction.
/// Only recorded when `PreimageConfig::record_trace` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceTrace {
    pub steps: Vec<IterationRecord>,
}

impl ConvergenceTrace {
    pub(crate) fn push(&mut self, iteration: usize, max_abs_change: f64, denominator: f64) {
        self.steps.push(IterationRecord {
            iteration,
            max_abs_change,
            denominator,
        });
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn final_change(&self) -> Option<f64> {
        self.steps.last().map(|step| step.max_abs_change)
    }
}
