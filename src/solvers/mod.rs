//! Leontief propagation of final demand through the technology network.
//!
//! Given a signed technology matrix `A` (materials x processes), a final
//! demand vector `y` (nonzero only at the delivered-product row) and a
//! per-process impact vector `q` (cost, emissions or factor hours), the
//! solver computes:
//!
//! 1. `pinv(A)`, the Moore-Penrose pseudo-inverse of `A`;
//! 2. the scaling vector `s = pinv(A) * y` (how often each process runs);
//! 3. the total impact `h = s . q`, or elementwise `s * q` per process.
//!
//! The pseudo-inverse is not an optimization: technology matrices are
//! routinely singular or non-square after process aggregation, so a
//! classical inverse would fail on valid inputs. Dimension mismatches are
//! rejected before any decomposition work.
//!
//! # Example
//!
//! ```
//! use battecon::solvers::LeontiefSolver;
//! use nalgebra::{DMatrix, DVector};
//!
//! let a = DMatrix::from_row_slice(2, 2, &[1.0, -2.0, 0.0, 1.0]);
//! let y = DVector::from_vec(vec![5.0, 0.0]);
//! let q = DVector::from_vec(vec![3.0, 7.0]);
//!
//! let solver = LeontiefSolver::new();
//! let s = solver.scaling_vector(&a, &y).unwrap();
//! assert!((s[0] - 5.0).abs() < 1e-9 && (s[1] - 10.0).abs() < 1e-9);
//! assert!((solver.propagate(&a, &y, &q).unwrap() - 85.0).abs() < 1e-9);
//! ```

pub mod batch;

use crate::matrix::LabeledMatrix;
use nalgebra::{DMatrix, DVector};

/// Result type for propagation operations.
pub type SolveResult<T> = Result<T, SolverError>;

/// Errors raised by the propagation solver.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolverError {
    /// Demand vector length does not match the matrix row count
    #[error("demand vector has {found} entries, technology matrix has {expected} material rows")]
    DemandLengthMismatch { expected: usize, found: usize },
    /// Impact vector length does not match the matrix column count
    #[error("impact vector has {found} entries, technology matrix has {expected} process columns")]
    ImpactLengthMismatch { expected: usize, found: usize },
    /// SVD-based pseudo-inversion failed
    #[error("pseudo-inverse computation failed: {0}")]
    DecompositionFailed(String),
    /// A labeled lookup found no such final-product row
    #[error("unknown final-product row '{0}'")]
    UnknownProduct(String),
    /// The final-product row has no positive (output) entry
    #[error("final-product row '{0}' is not produced by any process")]
    ProductNotProduced(String),
}

/// Propagation solver over technology matrices.
///
/// Tolerant of rank-deficient and rectangular matrices by construction:
/// the linear solve goes through the Moore-Penrose pseudo-inverse.
pub struct LeontiefSolver {
    /// Singular values below this threshold are treated as zero
    pub svd_epsilon: f64,
}

impl LeontiefSolver {
    /// Creates a solver with the default singular-value cutoff.
    pub fn new() -> Self {
        LeontiefSolver { svd_epsilon: 1e-10 }
    }

    /// Creates a solver with a custom singular-value cutoff.
    pub fn with_epsilon(svd_epsilon: f64) -> Self {
        LeontiefSolver { svd_epsilon }
    }

    /// Computes the scaling vector `s = pinv(A) * y`.
    ///
    /// # Errors
    ///
    /// [`SolverError::DemandLengthMismatch`] before any decomposition,
    /// [`SolverError::DecompositionFailed`] if the SVD does not converge.
    pub fn scaling_vector(
        &self,
        technology: &DMatrix<f64>,
        demand: &DVector<f64>,
    ) -> SolveResult<DVector<f64>> {
        if demand.len() != technology.nrows() {
            return Err(SolverError::DemandLengthMismatch {
                expected: technology.nrows(),
                found: demand.len(),
            });
        }
        let pinv = technology
            .clone()
            .pseudo_inverse(self.svd_epsilon)
            .map_err(|e| SolverError::DecompositionFailed(e.to_string()))?;
        Ok(pinv * demand)
    }

    /// Total system impact `h = (pinv(A) * y) . q`.
    ///
    /// All dimensions are checked before the decomposition runs.
    pub fn propagate(
        &self,
        technology: &DMatrix<f64>,
        demand: &DVector<f64>,
        impact: &DVector<f64>,
    ) -> SolveResult<f64> {
        self.check_impact(technology, impact)?;
        let s = self.scaling_vector(technology, demand)?;
        Ok(s.dot(impact))
    }

    /// Per-process impact elementwise `s * q` instead of the summed total.
    pub fn propagate_per_process(
        &self,
        technology: &DMatrix<f64>,
        demand: &DVector<f64>,
        impact: &DVector<f64>,
    ) -> SolveResult<DVector<f64>> {
        self.check_impact(technology, impact)?;
        let s = self.scaling_vector(technology, demand)?;
        Ok(s.component_mul(impact))
    }

    /// Pre-factors a technology matrix for repeated propagation.
    pub fn factor(&self, technology: DMatrix<f64>) -> SolveResult<FactoredTechnology> {
        FactoredTechnology::new(technology, self.svd_epsilon)
    }

    fn check_impact(&self, technology: &DMatrix<f64>, impact: &DVector<f64>) -> SolveResult<()> {
        if impact.len() != technology.ncols() {
            return Err(SolverError::ImpactLengthMismatch {
                expected: technology.ncols(),
                found: impact.len(),
            });
        }
        Ok(())
    }
}

impl Default for LeontiefSolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the final-demand vector from a labeled technology matrix: zero
/// everywhere except the delivered-product row, which carries the product's
/// output quantity (its positive entry).
///
/// # Errors
///
/// [`SolverError::UnknownProduct`] if the row does not exist,
/// [`SolverError::ProductNotProduced`] if no process outputs it.
pub fn final_demand(technology: &LabeledMatrix, product: &str) -> SolveResult<DVector<f64>> {
    if !technology.has_row(product) {
        return Err(SolverError::UnknownProduct(product.to_string()));
    }
    let row = technology.row(product).map_err(|_| SolverError::UnknownProduct(product.to_string()))?;
    let quantity = row
        .iter()
        .copied()
        .find(|v| *v > 0.0)
        .ok_or_else(|| SolverError::ProductNotProduced(product.to_string()))?;

    let mut demand = DVector::zeros(technology.nrows());
    let position = technology
        .rows()
        .iter()
        .position(|r| r == product)
        .ok_or_else(|| SolverError::UnknownProduct(product.to_string()))?;
    demand[position] = quantity;
    Ok(demand)
}

/// A technology matrix factored once for repeated propagations with
/// differing demand or impact vectors.
///
/// Taking the matrix by value pins the factorization to exactly the matrix
/// it was computed from; there is no way to mutate `A` afterwards and reuse
/// a stale inverse.
pub struct FactoredTechnology {
    pinv: DMatrix<f64>,
    nrows: usize,
    ncols: usize,
}

impl FactoredTechnology {
    /// Factors the matrix via SVD.
    pub fn new(technology: DMatrix<f64>, svd_epsilon: f64) -> SolveResult<Self> {
        let (nrows, ncols) = (technology.nrows(), technology.ncols());
        let pinv = technology
            .pseudo_inverse(svd_epsilon)
            .map_err(|e| SolverError::DecompositionFailed(e.to_string()))?;
        Ok(FactoredTechnology { pinv, nrows, ncols })
    }

    /// Scaling vector against the cached factorization.
    pub fn scaling_vector(&self, demand: &DVector<f64>) -> SolveResult<DVector<f64>> {
        if demand.len() != self.nrows {
            return Err(SolverError::DemandLengthMismatch {
                expected: self.nrows,
                found: demand.len(),
            });
        }
        Ok(&self.pinv * demand)
    }

    /// Total impact against the cached factorization.
    pub fn propagate(&self, demand: &DVector<f64>, impact: &DVector<f64>) -> SolveResult<f64> {
        if impact.len() != self.ncols {
            return Err(SolverError::ImpactLengthMismatch {
                expected: self.ncols,
                found: impact.len(),
            });
        }
        Ok(self.scaling_vector(demand)?.dot(impact))
    }

    /// Per-process impact against the cached factorization.
    pub fn propagate_per_process(
        &self,
        demand: &DVector<f64>,
        impact: &DVector<f64>,
    ) -> SolveResult<DVector<f64>> {
        if impact.len() != self.ncols {
            return Err(SolverError::ImpactLengthMismatch {
                expected: self.ncols,
                found: impact.len(),
            });
        }
        Ok(self.scaling_vector(demand)?.component_mul(impact))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_by_two() -> (DMatrix<f64>, DVector<f64>, DVector<f64>) {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, -2.0, 0.0, 1.0]);
        let y = DVector::from_vec(vec![5.0, 0.0]);
        let q = DVector::from_vec(vec![3.0, 7.0]);
        (a, y, q)
    }

    #[test]
    fn test_reference_scenario() {
        let (a, y, q) = two_by_two();
        let solver = LeontiefSolver::new();

        let s = solver.scaling_vector(&a, &y).unwrap();
        assert!((s[0] - 5.0).abs() < 1e-9);
        assert!((s[1] - 10.0).abs() < 1e-9);

        let h = solver.propagate(&a, &y, &q).unwrap();
        assert!((h - 85.0).abs() < 1e-9);

        let per_process = solver.propagate_per_process(&a, &y, &q).unwrap();
        assert!((per_process[0] - 15.0).abs() < 1e-9);
        assert!((per_process[1] - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_round_trip_reconstructs_demand() {
        let (a, y, _) = two_by_two();
        let solver = LeontiefSolver::new();
        let s = solver.scaling_vector(&a, &y).unwrap();
        let reconstructed = &a * s;
        for i in 0..y.len() {
            assert!((reconstructed[i] - y[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_singular_matrix_is_solvable() {
        // Rank-deficient: second row is a multiple of the first
        let a = DMatrix::from_row_slice(2, 2, &[1.0, -2.0, 2.0, -4.0]);
        let y = DVector::from_vec(vec![1.0, 2.0]);
        let solver = LeontiefSolver::new();
        // A classical inverse would fail here; the pseudo-inverse gives the
        // least-squares solution
        let s = solver.scaling_vector(&a, &y).unwrap();
        let reconstructed = &a * s;
        assert!((reconstructed[0] - 1.0).abs() < 1e-9);
        assert!((reconstructed[1] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_rectangular_matrix_is_solvable() {
        // Three materials, two processes
        let a = DMatrix::from_row_slice(3, 2, &[1.0, -1.0, -0.5, 0.0, 0.0, 1.0]);
        let y = DVector::from_vec(vec![0.0, 0.0, 2.0]);
        let solver = LeontiefSolver::new();
        let s = solver.scaling_vector(&a, &y).unwrap();
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_dimension_mismatch_rejected_before_solve() {
        let (a, y, _) = two_by_two();
        let solver = LeontiefSolver::new();

        let bad_demand = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        assert_eq!(
            solver.scaling_vector(&a, &bad_demand).unwrap_err(),
            SolverError::DemandLengthMismatch { expected: 2, found: 3 }
        );

        let bad_impact = DVector::from_vec(vec![1.0]);
        assert_eq!(
            solver.propagate(&a, &y, &bad_impact).unwrap_err(),
            SolverError::ImpactLengthMismatch { expected: 2, found: 1 }
        );
    }

    #[test]
    fn test_final_demand_from_labeled_matrix() {
        let technology = LabeledMatrix::from_rows(
            vec!["cell".into(), "battery pack".into()],
            vec!["cell production".into(), "pack assembly".into()],
            &[1.0, -2.0, 0.0, 300.0],
        )
        .unwrap();

        let y = final_demand(&technology, "battery pack").unwrap();
        assert_eq!(y.len(), 2);
        assert_eq!(y[0], 0.0);
        assert_eq!(y[1], 300.0);

        assert_eq!(
            final_demand(&technology, "module").unwrap_err(),
            SolverError::UnknownProduct("module".into())
        );
    }

    #[test]
    fn test_final_demand_requires_positive_output() {
        let technology = LabeledMatrix::from_rows(
            vec!["scrap".into()],
            vec!["handling".into()],
            &[-1.0],
        )
        .unwrap();
        assert_eq!(
            final_demand(&technology, "scrap").unwrap_err(),
            SolverError::ProductNotProduced("scrap".into())
        );
    }

    #[test]
    fn test_factored_matches_one_shot() {
        let (a, y, q) = two_by_two();
        let solver = LeontiefSolver::new();
        let one_shot = solver.propagate(&a, &y, &q).unwrap();

        let factored = solver.factor(a).unwrap();
        let cached = factored.propagate(&y, &q).unwrap();
        assert!((one_shot - cached).abs() < 1e-12);

        // Second demand against the same factorization
        let y2 = DVector::from_vec(vec![1.0, 1.0]);
        let s2 = factored.scaling_vector(&y2).unwrap();
        assert!((s2[0] - 3.0).abs() < 1e-9);
        assert!((s2[1] - 1.0).abs() < 1e-9);
    }
}
