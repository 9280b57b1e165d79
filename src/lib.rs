// Kernel principal component analysis (kernel PCA) with pre-image reconstruction

#![doc = include_str!("../README.md")]

pub mod diagnostics;
pub mod error;
pub mod evaluation;
pub mod kernel;
pub mod kernel_fit;
pub mod linalg_backends;
pub mod model;
pub mod preimage;
pub mod synthetic;

#[cfg(test)]
mod kernel_fit_tests;

pub use error::{KernelPcaError, Result};
pub use kernel_fit::{fit, CoefficientMatrix, KernelFit, KernelPcaConfig};
pub use model::KernelPcaModel;
pub use preimage::{
    reconstruct, DenoisedBatch, PreimageConfig, PreimageSolver, Reconstruction, ReconstructionStatus,
};
