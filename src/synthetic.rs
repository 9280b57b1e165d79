// src/synthetic.rs

//! Seeded Gaussian-cluster datasets for de-noising experiments.

use ndarray::{Array2, ArrayView2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{KernelPcaError, Result};

/// Isotropic Gaussian clusters around centers drawn uniformly from `[-1, 1]^N`.
#[derive(Clone, Debug)]
pub struct GaussianClusters {
    pub n_features: usize,
    pub n_clusters: usize,
    /// Per-coordinate standard deviation of every cluster.
    pub sigma: f64,
    pub train_per_cluster: usize,
    pub test_per_cluster: usize,
    pub seed: u64,
}

impl Default for GaussianClusters {
    fn default() -> Self {
        GaussianClusters {
            n_features: 10,
            n_clusters: 11,
            sigma: 0.1,
            train_per_cluster: 100,
            test_per_cluster: 33,
            seed: 2025,
        }
    }
}

/// A train/test draw with the ground-truth center of every row.
#[derive(Clone, Debug)]
pub struct ClusterSample {
    /// Shape: (n_clusters, n_features)
    pub centers: Array2<f64>,
    /// Cluster-major rows. Shape: (n_clusters * train_per_cluster, n_features)
    pub train: Array2<f64>,
    /// Center of the cluster each training row was drawn from.
    pub train_centers: Array2<f64>,
    /// Cluster-major rows. Shape: (n_clusters * test_per_cluster, n_features)
    pub test: Array2<f64>,
    pub test_centers: Array2<f64>,
}

impl GaussianClusters {
    fn validate(&self) -> Result<()> {
        if self.n_features == 0 {
            return Err(KernelPcaError::invalid("n_features", "must be at least 1"));
        }
        if self.n_clusters == 0 {
            return Err(KernelPcaError::invalid("n_clusters", "must be at least 1"));
        }
        if !self.sigma.is_finite() || self.sigma <= 0.0 {
            return Err(KernelPcaError::invalid(
                "sigma",
                format!("must be positive and finite, got {}", self.sigma),
            ));
        }
        Ok(())
    }

    /// Draws centers, then training rows, then test rows, all from one seeded stream.
    pub fn generate(&self) -> Result<ClusterSample> {
        self.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let centers = Array2::from_shape_fn((self.n_clusters, self.n_features), |_| rng.gen_range(-1.0..1.0));
        self.sample_around(centers, &mut rng)
    }

    /// Like [`GaussianClusters::generate`] but around caller-chosen centers.
    /// `n_clusters` and `n_features` are taken from `centers`.
    pub fn generate_with_centers(&self, centers: ArrayView2<f64>) -> Result<ClusterSample> {
        let config = GaussianClusters {
            n_clusters: centers.nrows(),
            n_features: centers.ncols(),
            ..self.clone()
        };
        config.validate()?;
        if centers.iter().any(|v| !v.is_finite()) {
            return Err(KernelPcaError::NonFiniteInput { context: "cluster centers" });
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        config.sample_around(centers.to_owned(), &mut rng)
    }

    fn sample_around(&self, centers: Array2<f64>, rng: &mut ChaCha8Rng) -> Result<ClusterSample> {
        let noise = Normal::new(0.0, self.sigma)
            .map_err(|e| KernelPcaError::invalid("sigma", e.to_string()))?;
        let (train, train_centers) = draw_rows(&centers, self.train_per_cluster, &noise, rng);
        let (test, test_centers) = draw_rows(&centers, self.test_per_cluster, &noise, rng);
        Ok(ClusterSample {
            centers,
            train,
            train_centers,
            test,
            test_centers,
        })
    }
}

fn draw_rows(
    centers: &Array2<f64>,
    per_cluster: usize,
    noise: &Normal<f64>,
    rng: &mut ChaCha8Rng,
) -> (Array2<f64>, Array2<f64>) {
    let (n_clusters, n_features) = centers.dim();
    let mut rows = Array2::<f64>::zeros((n_clusters * per_cluster, n_features));
    let mut row_centers = Array2::<f64>::zeros((n_clusters * per_cluster, n_features));
    for (row_idx, (mut row, mut truth)) in rows
        .axis_iter_mut(Axis(0))
        .zip(row_centers.axis_iter_mut(Axis(0)))
        .enumerate()
    {
        let center = centers.row(row_idx / per_cluster);
        truth.assign(&center);
        for (value, &c) in row.iter_mut().zip(center.iter()) {
            *value = c + noise.sample(&mut *rng);
        }
    }
    (rows, row_centers)
}
