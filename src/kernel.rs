// src/kernel.rs

//! RBF (Gaussian) kernel primitives: pairwise squared distances, kernel
//! matrices and vectors, and double-centering of a kernel matrix.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use rayon::prelude::*;

/// Squared Euclidean distance between two equal-length vectors.
#[inline]
pub fn squared_euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    Zip::from(&a)
        .and(&b)
        .fold(0.0, |acc, &x, &y| acc + (x - y) * (x - y))
}

/// RBF kernel value `exp(-gamma * ||a - b||^2)`.
#[inline]
pub fn rbf(a: ArrayView1<f64>, b: ArrayView1<f64>, gamma: f64) -> f64 {
    (-gamma * squared_euclidean(a, b)).exp()
}

/// Condensed pairwise squared distances between the rows of `data`.
///
/// Pairs are enumerated as `(0,1), (0,2), .., (0,L-1), (1,2), ..`, giving a
/// vector of length `L(L-1)/2`. Rows are processed in parallel.
pub fn condensed_squared_distances(data: ArrayView2<f64>) -> Array1<f64> {
    let n_rows = data.nrows();
    let per_row: Vec<Vec<f64>> = (0..n_rows)
        .into_par_iter()
        .map(|i| {
            let row_i = data.row(i);
            ((i + 1)..n_rows)
                .map(|j| squared_euclidean(row_i, data.row(j)))
                .collect()
        })
        .collect();
    per_row.into_iter().flatten().collect()
}

/// Index of pair `(i, j)`, `i < j`, in a condensed vector over `n` rows.
#[inline]
fn condensed_index(n: usize, i: usize, j: usize) -> usize {
    debug_assert!(i < j && j < n);
    n * i - i * (i + 1) / 2 + (j - i - 1)
}

/// Expands a condensed distance vector into a full symmetric `n x n` matrix
/// with a zero diagonal.
///
/// `condensed.len()` must equal `n(n-1)/2`.
pub fn squareform(condensed: ArrayView1<f64>, n: usize) -> Array2<f64> {
    debug_assert_eq!(condensed.len(), n * n.saturating_sub(1) / 2);
    let mut full = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let d = condensed[condensed_index(n, i, j)];
            full[[i, j]] = d;
            full[[j, i]] = d;
        }
    }
    full
}

/// Uncentered RBF kernel matrix of the rows of `data`.
///
/// Symmetric, with a unit diagonal.
pub fn rbf_kernel_matrix(data: ArrayView2<f64>, gamma: f64) -> Array2<f64> {
    let condensed = condensed_squared_distances(data);
    let sq_dists = squareform(condensed.view(), data.nrows());
    sq_dists.mapv(|d| (-gamma * d).exp())
}

/// RBF kernel values between `point` and every row of `data`.
pub fn rbf_kernel_vector(point: ArrayView1<f64>, data: ArrayView2<f64>, gamma: f64) -> Array1<f64> {
    data.outer_iter().map(|row| rbf(point, row, gamma)).collect()
}

/// Double-centers a square kernel matrix: `K - J K - K J + J K J` where
/// every entry of `J` is `1/L`.
///
/// `J K` holds the column means in every row, `K J` the row means in every
/// column and `J K J` the grand mean, so the product is formed from those
/// means without materializing `J`.
pub fn center_kernel_matrix(kernel: &Array2<f64>) -> Array2<f64> {
    let n = kernel.nrows();
    if n == 0 {
        return kernel.clone();
    }
    let inv_n = 1.0 / n as f64;
    let column_means = kernel.sum_axis(Axis(0)) * inv_n;
    let row_means = kernel.sum_axis(Axis(1)) * inv_n;
    let grand_mean = row_means.sum() * inv_n;

    let mut centered = kernel.clone();
    for ((i, j), value) in centered.indexed_iter_mut() {
        *value = *value - column_means[j] - row_means[i] + grand_mean;
    }
    centered
}
