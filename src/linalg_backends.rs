// src/linalg_backends.rs

use ndarray::{Array1, Array2};
use std::marker::PhantomData;

use crate::error::ThreadSafeStdError;

/// Output of a symmetric eigendecomposition.
#[derive(Debug)]
pub struct EighOutput<F: 'static> {
    /// Eigenvalues in whatever order the backend produced them
    /// (LAPACK and faer both return ascending order).
    pub eigenvalues: Array1<F>,
    /// Eigenvectors as columns of the matrix.
    /// eigenvectors.column(i) corresponds to eigenvalues[i].
    pub eigenvectors: Array2<F>,
}

/// Trait for symmetric eigendecomposition (similar to LAPACK's DSYEVD).
/// Implementers expect `matrix` to be square and symmetric; only the upper
/// triangle is read.
pub trait BackendEigh<F: 'static + Copy + Send + Sync> {
    fn eigh_upper(&self, matrix: &Array2<F>) -> Result<EighOutput<F>, ThreadSafeStdError>;
}

// --- ndarray-linalg (LAPACK) backend ---
use ndarray_linalg::{Eigh as NdLinalgEigh, UPLO};

#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

fn to_dyn_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> ThreadSafeStdError {
    Box::new(e)
}

impl BackendEigh<f64> for NdarrayLinAlgBackend {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput<f64>, ThreadSafeStdError> {
        if matrix.nrows() != matrix.ncols() {
            return Err(format!(
                "Matrix must be square for eigendecomposition, got {}x{}.",
                matrix.nrows(),
                matrix.ncols()
            )
            .into());
        }
        let (eigenvalues, eigenvectors) = matrix.eigh(UPLO::Upper).map_err(to_dyn_error)?;
        Ok(EighOutput { eigenvalues, eigenvectors })
    }
}

// --- faer backend ---
#[cfg(feature = "backend_faer")]
mod faer_specific_code {
    use super::{BackendEigh, EighOutput};
    use crate::error::ThreadSafeStdError;
    use ndarray::{Array1, Array2, ShapeBuilder};

    #[derive(Debug, Default, Copy, Clone)]
    pub struct FaerLinAlgBackend;

    fn faer_mat_to_ndarray(faer_mat: faer::MatRef<'_, f64>) -> Result<Array2<f64>, ThreadSafeStdError> {
        let nrows = faer_mat.nrows();
        let ncols = faer_mat.ncols();
        let mut data_vec = Vec::with_capacity(nrows * ncols);
        for j in 0..ncols {
            for i in 0..nrows {
                data_vec.push(faer_mat[(i, j)]);
            }
        }
        let converted = Array2::from_shape_vec((nrows, ncols).f(), data_vec)?;
        Ok(converted)
    }

    impl BackendEigh<f64> for FaerLinAlgBackend {
        fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput<f64>, ThreadSafeStdError> {
            let (nrows, ncols) = matrix.dim();
            if nrows != ncols {
                return Err("Matrix must be square for eigendecomposition.".into());
            }
            if matrix.is_empty() {
                return Ok(EighOutput {
                    eigenvalues: Array1::zeros(0),
                    eigenvectors: Array2::zeros((0, 0)),
                });
            }
            // Kernel matrices are built in standard layout; anything else is copied.
            let owned;
            let slice = match matrix.as_slice() {
                Some(slice) => slice,
                None => {
                    owned = matrix.as_standard_layout().to_owned();
                    owned
                        .as_slice()
                        .ok_or("Failed to obtain a contiguous view of the kernel matrix.")?
                }
            };
            let faer_mat_view = faer::MatRef::from_row_major_slice(slice, nrows, ncols);
            let eig = faer_mat_view
                .self_adjoint_eigen(faer::Side::Upper)
                .map_err(|e| format!("faer self-adjoint eigendecomposition failed: {:?}", e))?;
            let eigenvalues = eig.S().column_vector().iter().copied().collect::<Array1<f64>>();
            Ok(EighOutput {
                eigenvalues,
                eigenvectors: faer_mat_to_ndarray(eig.U())?,
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn faer_matrix_converts_column_by_column() {
            let mat = faer::Mat::<f64>::from_fn(2, 3, |i, j| (10 * i + j) as f64);
            let converted = faer_mat_to_ndarray(mat.as_ref()).unwrap();
            assert_eq!(converted.dim(), (2, 3));
            for i in 0..2 {
                for j in 0..3 {
                    assert_eq!(converted[[i, j]], (10 * i + j) as f64);
                }
            }
        }

        #[test]
        fn faer_backend_returns_orthonormal_eigenvectors() {
            let matrix = ndarray::array![[2.0, 1.0], [1.0, 2.0]];
            let out = FaerLinAlgBackend.eigh_upper(&matrix).unwrap();
            let gram = out.eigenvectors.t().dot(&out.eigenvectors);
            for i in 0..2 {
                for j in 0..2 {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    assert!((gram[[i, j]] - expected).abs() < 1e-12);
                }
            }
        }
    }
}

/// A provider struct that dispatches to the selected linear algebra backend
/// based on compile-time feature flags.
#[derive(Debug, Default, Copy, Clone)]
pub struct LinAlgBackendProvider<F: 'static + Copy + Send + Sync> {
    _phantom: PhantomData<F>,
}

impl<F: 'static + Copy + Send + Sync> LinAlgBackendProvider<F> {
    pub fn new() -> Self {
        Self { _phantom: PhantomData }
    }
}

impl BackendEigh<f64> for LinAlgBackendProvider<f64> {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput<f64>, ThreadSafeStdError> {
        #[cfg(feature = "backend_faer")]
        {
            faer_specific_code::FaerLinAlgBackend.eigh_upper(matrix)
        }
        #[cfg(not(feature = "backend_faer"))]
        {
            NdarrayLinAlgBackend.eigh_upper(matrix)
        }
    }
}
