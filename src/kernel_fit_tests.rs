// src/kernel_fit_tests.rs
#![cfg(test)]

use crate::error::KernelPcaError;
use crate::kernel_fit::{centered_kernel_matrix, fit, KernelFit, KernelPcaConfig};
use approx::assert_abs_diff_eq;
use float_cmp::assert_approx_eq;
use ndarray::{array, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn generate_random_data(n_samples: usize, n_features: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_fn((n_samples, n_features), |_| rng.gen_range(-1.5..1.5))
}

fn square() -> Array2<f64> {
    array![[1.0, 0.0], [-1.0, 0.0], [0.0, 1.0], [0.0, -1.0]]
}

#[cfg(test)]
mod fit_tests {
    use super::*;

    #[test]
    fn columns_have_unit_norm() {
        for seed in 0..4 {
            let data = generate_random_data(40, 3, seed);
            let coefficients = fit(data.view(), 0.8, 6).unwrap();
            assert_eq!(coefficients.alphas().dim(), (40, 6));
            for col in coefficients.alphas().columns() {
                assert_abs_diff_eq!(col.dot(&col).sqrt(), 1.0, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn columns_are_mutually_orthogonal() {
        let data = generate_random_data(30, 4, 17);
        let coefficients = fit(data.view(), 0.5, 5).unwrap();
        let gram = coefficients.alphas().t().dot(coefficients.alphas());
        for i in 0..5 {
            for j in 0..5 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(gram[[i, j]], expected, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn eigenvalues_are_descending_and_satisfy_eigen_equation() {
        let data = generate_random_data(25, 2, 5);
        let gamma = 1.3;
        let coefficients = fit(data.view(), gamma, 8).unwrap();
        let eigenvalues = coefficients.eigenvalues();
        for w in eigenvalues.windows(2) {
            assert!(w[0] >= w[1], "eigenvalues not descending: {:?}", eigenvalues);
        }

        let centered = centered_kernel_matrix(data.view(), gamma).unwrap();
        for (j, col) in coefficients.alphas().columns().into_iter().enumerate() {
            let lhs = centered.dot(&col);
            let rhs = &col * eigenvalues[j];
            for (a, b) in lhs.iter().zip(rhs.iter()) {
                assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn leading_eigenvalue_is_the_largest_of_the_spectrum() {
        let data = generate_random_data(20, 3, 8);
        let all = fit(data.view(), 0.4, 20).unwrap();
        let top = fit(data.view(), 0.4, 3).unwrap();
        let max_eigenvalue = all.eigenvalues().iter().cloned().fold(f64::MIN, f64::max);
        assert_approx_eq!(f64, top.eigenvalues()[0], max_eigenvalue, epsilon = 1e-12);
        for j in 0..3 {
            assert_approx_eq!(f64, top.eigenvalues()[j], all.eigenvalues()[j], epsilon = 1e-12);
        }
    }

    #[test]
    fn square_fit_returns_single_unit_column() {
        let coefficients = fit(square().view(), 0.5, 1).unwrap();
        assert_eq!(coefficients.alphas().dim(), (4, 1));
        let col = coefficients.alphas().column(0);
        assert_abs_diff_eq!(col.dot(&col).sqrt(), 1.0, epsilon = 1e-6);
        // The two opposite pairs span the top eigenspace, eigenvalue 1 - exp(-2).
        assert_abs_diff_eq!(coefficients.eigenvalues()[0], 1.0 - (-2.0f64).exp(), epsilon = 1e-10);
        // Every eigenvector of a centered kernel is orthogonal to the constant vector.
        assert_abs_diff_eq!(col.sum(), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn rectangle_leading_component_separates_the_long_axis() {
        let data = array![[1.0, 0.0], [-1.0, 0.0], [0.0, 0.8], [0.0, -0.8]];
        let coefficients = fit(data.view(), 0.5, 2).unwrap();
        let col = coefficients.alphas().column(0);
        let h = std::f64::consts::FRAC_1_SQRT_2;
        assert_abs_diff_eq!(col[0].abs(), h, epsilon = 1e-8);
        assert_abs_diff_eq!(col[1].abs(), h, epsilon = 1e-8);
        assert_abs_diff_eq!(col[0] + col[1], 0.0, epsilon = 1e-8);
        assert_abs_diff_eq!(col[2], 0.0, epsilon = 1e-8);
        assert_abs_diff_eq!(col[3], 0.0, epsilon = 1e-8);
        assert_abs_diff_eq!(coefficients.eigenvalues()[1], 1.0 - (-1.28f64).exp(), epsilon = 1e-10);
        assert!(!coefficients.is_degenerate());
    }

    #[test]
    fn all_components_is_allowed() {
        let data = generate_random_data(6, 2, 2);
        let coefficients = fit(data.view(), 1.0, 6).unwrap();
        assert_eq!(coefficients.n_components(), 6);
        // The constant direction is always in the null space of a centered kernel.
        assert!(coefficients.is_degenerate());
        assert_eq!(coefficients.effective_components(), 5);
    }

    #[test]
    fn identical_samples_are_degenerate_but_still_fit() {
        let data = Array2::<f64>::from_elem((5, 3), 0.25);
        let coefficients = fit(data.view(), 1.0, 2).unwrap();
        assert_eq!(coefficients.alphas().dim(), (5, 2));
        assert_eq!(coefficients.effective_components(), 0);
        assert!(coefficients.is_degenerate());
    }

    #[test]
    fn fit_is_deterministic() {
        let data = generate_random_data(15, 3, 33);
        let a = fit(data.view(), 0.9, 4).unwrap();
        let b = fit(data.view(), 0.9, 4).unwrap();
        assert_eq!(a.alphas(), b.alphas());
        assert_eq!(a.eigenvalues(), b.eigenvalues());
    }
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    #[test]
    fn rejects_non_positive_gamma() {
        let data = square();
        for gamma in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                fit(data.view(), gamma, 1),
                Err(KernelPcaError::InvalidParameter { parameter: "gamma", .. })
            ));
        }
    }

    #[test]
    fn rejects_bad_component_counts() {
        let data = square();
        assert!(matches!(
            fit(data.view(), 0.5, 0),
            Err(KernelPcaError::InvalidParameter { parameter: "n_components", .. })
        ));
        assert!(matches!(
            fit(data.view(), 0.5, 5),
            Err(KernelPcaError::InvalidParameter { parameter: "n_components", .. })
        ));
    }

    #[test]
    fn rejects_too_few_samples_and_empty_features() {
        let one_row = array![[1.0, 2.0]];
        assert!(matches!(
            fit(one_row.view(), 0.5, 1),
            Err(KernelPcaError::InvalidParameter { parameter: "training_data", .. })
        ));
        let no_features = Array2::<f64>::zeros((4, 0));
        assert!(matches!(
            fit(no_features.view(), 0.5, 1),
            Err(KernelPcaError::InvalidParameter { parameter: "training_data", .. })
        ));
    }

    #[test]
    fn rejects_non_finite_training_data() {
        let mut data = square();
        data[[2, 1]] = f64::NAN;
        assert!(matches!(
            fit(data.view(), 0.5, 1),
            Err(KernelPcaError::NonFiniteInput { .. })
        ));
    }

    #[test]
    fn sigma_helper_matches_bandwidth_formula() {
        let config = KernelPcaConfig::from_sigma(0.1, 10, 3).unwrap();
        assert_approx_eq!(f64, config.gamma, 1.0 / (10.0 * 2.0 * 0.01), ulps = 4);
        assert_eq!(config.n_components, 3);
        assert!(KernelPcaConfig::from_sigma(0.0, 10, 3).is_err());
        assert!(KernelPcaConfig::from_sigma(0.1, 0, 3).is_err());
    }
}

#[cfg(test)]
mod diagnostics_tests {
    use super::*;

    #[test]
    fn diagnostics_report_centering_invariants() {
        let data = generate_random_data(35, 4, 12);
        let fitter = KernelFit::new(KernelPcaConfig::new(0.6, 4));
        let (coefficients, diagnostics) = fitter.fit_with_diagnostics(data.view()).unwrap();
        assert_eq!(diagnostics.n_samples, 35);
        assert_eq!(diagnostics.n_features, 4);
        assert_eq!(diagnostics.requested_components, 4);
        assert_eq!(diagnostics.effective_components, coefficients.effective_components());
        assert_eq!(diagnostics.selected_eigenvalues, coefficients.eigenvalues().to_vec());
        assert!(diagnostics.max_abs_row_sum < 1e-6);
        assert!(diagnostics.max_abs_column_sum < 1e-6);
        assert!(diagnostics.symmetry_error < 1e-12);
        assert!(diagnostics.max_column_norm_error < 1e-6);

        let json = serde_json::to_string(&diagnostics).unwrap();
        assert!(json.contains("\"max_abs_row_sum\""));
    }

    #[test]
    fn centered_kernel_sums_vanish() {
        let data = generate_random_data(50, 6, 77);
        let centered = centered_kernel_matrix(data.view(), 0.2).unwrap();
        for s in centered.sum_axis(Axis(0)).iter().chain(centered.sum_axis(Axis(1)).iter()) {
            assert_abs_diff_eq!(*s, 0.0, epsilon = 1e-6);
        }
    }
}
