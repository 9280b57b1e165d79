// src/model.rs

use ndarray::{Array2, ArrayView1, ArrayView2};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::{KernelPcaError, Result};
use crate::kernel_fit::{validate_gamma, validate_training_data, CoefficientMatrix, KernelFit, KernelPcaConfig};
use crate::preimage::{DenoisedBatch, PreimageConfig, PreimageSolver, Reconstruction};

/// A fitted kernel PCA model: the training rows, the kernel bandwidth and the
/// coefficient matrix, so that one fit can serve any number of
/// reconstructions. Models can be saved to and loaded from files.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct KernelPcaModel {
    /// Shape: (n_samples, n_features)
    training_data: Array2<f64>,
    gamma: f64,
    coefficients: CoefficientMatrix,
}

impl KernelPcaModel {
    /// Fits the model on `training_data` (consumed and stored).
    pub fn fit(training_data: Array2<f64>, config: &KernelPcaConfig) -> Result<Self> {
        let coefficients = KernelFit::new(config.clone()).fit(training_data.view())?;
        Ok(Self {
            training_data,
            gamma: config.gamma,
            coefficients,
        })
    }

    pub fn training_data(&self) -> &Array2<f64> {
        &self.training_data
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn coefficients(&self) -> &CoefficientMatrix {
        &self.coefficients
    }

    pub fn n_features(&self) -> usize {
        self.training_data.ncols()
    }

    /// A solver borrowing this model's training data and coefficients.
    pub fn solver(&self, config: PreimageConfig) -> Result<PreimageSolver<'_>> {
        PreimageSolver::new(&self.coefficients, self.training_data.view(), self.gamma, config)
    }

    pub fn reconstruct(&self, query: ArrayView1<f64>, config: &PreimageConfig) -> Result<Reconstruction> {
        self.solver(config.clone())?.reconstruct(query)
    }

    /// Reconstructs every row of `queries` in parallel.
    pub fn denoise(&self, queries: ArrayView2<f64>, config: &PreimageConfig) -> Result<DenoisedBatch> {
        self.solver(config.clone())?.denoise(queries)
    }

    /// Saves the model to a file using bincode.
    ///
    /// # Errors
    /// Returns `ModelIo` if file I/O or serialization fails.
    pub fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref()).map_err(|e| {
            KernelPcaError::ModelIo(format!("Failed to create file at {:?}: {}", path.as_ref(), e))
        })?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| KernelPcaError::ModelIo(format!("Failed to serialize kernel PCA model: {}", e)))?;
        info!("Saved kernel PCA model to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads a model previously saved with `save_model`.
    ///
    /// # Errors
    /// `ModelIo` if file I/O or deserialization fails; a validation error if
    /// the loaded model is internally inconsistent (mismatched dimensions,
    /// non-positive gamma, non-finite values).
    pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            KernelPcaError::ModelIo(format!("Failed to open file at {:?}: {}", path.as_ref(), e))
        })?;
        let mut reader = BufReader::new(file);
        let model: KernelPcaModel =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
                .map_err(|e| KernelPcaError::ModelIo(format!("Failed to deserialize kernel PCA model: {}", e)))?;

        validate_gamma(model.gamma)?;
        validate_training_data(model.training_data.view())?;
        model.coefficients.validate()?;
        if model.coefficients.n_samples() != model.training_data.nrows() {
            return Err(KernelPcaError::DimensionMismatch {
                context: "loaded coefficient rows vs training samples",
                expected: model.training_data.nrows(),
                found: model.coefficients.n_samples(),
            });
        }
        info!(
            "Loaded kernel PCA model: {} samples, {} features, {} components.",
            model.training_data.nrows(),
            model.training_data.ncols(),
            model.coefficients.n_components()
        );
        Ok(model)
    }
}
