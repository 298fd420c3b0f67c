//! Pre-reduction of the element balance before the interior-point solve.
//!
//! Three passes over `Ae·ne = be`:
//! 1. sign-definite rows with a zero budget force every species they touch
//!    to zero (repeated until nothing changes); a budget of the wrong sign is
//!    infeasible
//! 2. rows left without species are dropped (or infeasible if their budget
//!    is not zero)
//! 3. linearly dependent rows are dropped, earlier rows preferred, after
//!    checking that their budgets are consistent with the kept rows

use nalgebra::{DMatrix, DVector};

/// Budgets this small relative to `max(1, ‖be‖∞)` count as zero.
const ZERO_BUDGET: f64 = 1e-14;

/// Relative norm below which a Gram–Schmidt residual row is dependent.
const DEPENDENT_ROW: f64 = 1e-10;

/// Relative tolerance on the budgets of dropped dependent rows.
const CONSISTENCY: f64 = 1e-8;

/// Reduced balance `a·x = b` over the kept species and rows.
#[derive(Debug, Clone)]
pub(crate) struct Reduction {
    /// Positions (among equilibrium species) of the species kept.
    pub species: Vec<usize>,
    /// Positions of the species forced to zero.
    pub eliminated_species: Vec<usize>,
    /// Positions (in `be`) of the independent rows kept.
    pub rows: Vec<usize>,
    /// Positions of rows removed by zero-budget elimination.
    pub eliminated_rows: Vec<usize>,
    pub a: DMatrix<f64>,
    pub b: DVector<f64>,
}

#[derive(Debug, Clone)]
pub(crate) enum ReductionOutcome {
    Reduced(Reduction),
    Infeasible(String),
}

pub(crate) fn reduce(ae: &DMatrix<f64>, be: &DVector<f64>) -> ReductionOutcome {
    let (ne, ns) = ae.shape();
    let scale = be.amax().max(1.0);
    let zero = ZERO_BUDGET * scale;

    let mut species_alive = vec![true; ns];
    let mut row_alive = vec![true; ne];
    let mut eliminated_rows = Vec::new();

    loop {
        let mut changed = false;
        for r in 0..ne {
            if !row_alive[r] {
                continue;
            }
            let coefficients: Vec<f64> = (0..ns)
                .filter(|&j| species_alive[j])
                .map(|j| ae[(r, j)])
                .filter(|&c| c != 0.0)
                .collect();
            if coefficients.is_empty() {
                continue;
            }
            let nonnegative = coefficients.iter().all(|&c| c > 0.0);
            let nonpositive = coefficients.iter().all(|&c| c < 0.0);
            if !(nonnegative || nonpositive) {
                continue;
            }

            let b = be[r];
            if (nonnegative && b < -zero) || (nonpositive && b > zero) {
                return ReductionOutcome::Infeasible(format!(
                    "budget {b:e} of element row {r} cannot be reached with non-negative amounts"
                ));
            }
            if b.abs() <= zero {
                for j in 0..ns {
                    if species_alive[j] && ae[(r, j)] != 0.0 {
                        species_alive[j] = false;
                    }
                }
                row_alive[r] = false;
                eliminated_rows.push(r);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let species: Vec<usize> = (0..ns).filter(|&j| species_alive[j]).collect();
    let eliminated_species: Vec<usize> = (0..ns).filter(|&j| !species_alive[j]).collect();

    // Rows that no longer touch any species
    let mut candidates = Vec::new();
    for r in 0..ne {
        if !row_alive[r] {
            continue;
        }
        if species.iter().all(|&j| ae[(r, j)] == 0.0) {
            if be[r].abs() > zero {
                return ReductionOutcome::Infeasible(format!(
                    "element row {r} has budget {:e} but no species can carry it",
                    be[r]
                ));
            }
            continue;
        }
        candidates.push(r);
    }

    let sub = |rows: &[usize]| DMatrix::from_fn(rows.len(), species.len(), |i, j| ae[(rows[i], species[j])]);
    let rows = independent_rows(&sub(&candidates), &candidates);
    let a = sub(&rows);
    let b = DVector::from_iterator(rows.len(), rows.iter().map(|&r| be[r]));

    if rows.len() < candidates.len() {
        let all = sub(&candidates);
        let b_all = DVector::from_iterator(candidates.len(), candidates.iter().map(|&r| be[r]));
        match least_norm_solution(&a, &b) {
            Some(x) => {
                let mismatch = (&all * x - &b_all).amax();
                if mismatch > CONSISTENCY * scale {
                    return ReductionOutcome::Infeasible(format!(
                        "budgets of linearly dependent elements are inconsistent (mismatch {mismatch:e})"
                    ));
                }
            }
            None => {
                return ReductionOutcome::Infeasible(
                    "reduced element balance is rank deficient".to_string(),
                );
            }
        }
    }

    ReductionOutcome::Reduced(Reduction {
        species,
        eliminated_species,
        rows,
        eliminated_rows,
        a,
        b,
    })
}

/// Select a maximal set of linearly independent rows by modified
/// Gram–Schmidt, preferring earlier rows.
fn independent_rows(a: &DMatrix<f64>, labels: &[usize]) -> Vec<usize> {
    let mut basis: Vec<DVector<f64>> = Vec::new();
    let mut kept = Vec::new();
    for (i, &label) in labels.iter().enumerate() {
        let row = a.row(i).transpose();
        let norm = row.norm();
        if norm == 0.0 {
            continue;
        }
        let mut v = row;
        for q in &basis {
            let proj = q.dot(&v);
            v -= q * proj;
        }
        let rnorm = v.norm();
        if rnorm > DEPENDENT_ROW * norm {
            basis.push(v / rnorm);
            kept.push(label);
        }
    }
    kept
}

/// `x = Aᵀ(AAᵀ)⁻¹b`, the minimum-norm solution of a full-row-rank system.
pub(crate) fn least_norm_solution(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    if a.nrows() == 0 {
        return Some(DVector::zeros(a.ncols()));
    }
    let aat = a * a.transpose();
    let y = aat.lu().solve(b)?;
    let x = a.tr_mul(&y);
    x.iter().all(|v| v.is_finite()).then_some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reduced(outcome: ReductionOutcome) -> Reduction {
        match outcome {
            ReductionOutcome::Reduced(r) => r,
            ReductionOutcome::Infeasible(what) => panic!("unexpected infeasible: {what}"),
        }
    }

    #[test]
    fn dependent_rows_are_dropped() {
        // N and O rows of NO2 / N2O4: O = 2 N
        let ae = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let be = DVector::from_vec(vec![1.0, 2.0]);
        let r = reduced(reduce(&ae, &be));
        assert_eq!(r.rows, vec![0]);
        assert_eq!(r.species, vec![0, 1]);
        assert_eq!(r.a.shape(), (1, 2));
    }

    #[test]
    fn inconsistent_dependent_rows_are_infeasible() {
        let ae = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let be = DVector::from_vec(vec![1.0, 3.0]);
        assert!(matches!(reduce(&ae, &be), ReductionOutcome::Infeasible(_)));
    }

    #[test]
    fn negative_budget_is_infeasible() {
        let ae = DMatrix::from_row_slice(1, 1, &[1.0]);
        let be = DVector::from_vec(vec![-1.0]);
        assert!(matches!(reduce(&ae, &be), ReductionOutcome::Infeasible(_)));
    }

    #[test]
    fn zero_budget_eliminates_species() {
        // Elements H, O, Na, Z over H2O, H+, OH-, Na+
        let ae = DMatrix::from_row_slice(
            4,
            4,
            &[
                2.0, 1.0, 1.0, 0.0, // H
                1.0, 0.0, 1.0, 0.0, // O
                0.0, 0.0, 0.0, 1.0, // Na
                0.0, 1.0, -1.0, 1.0, // Z
            ],
        );
        let be = DVector::from_vec(vec![111.0, 55.5, 0.0, 0.0]);
        let r = reduced(reduce(&ae, &be));
        assert_eq!(r.eliminated_species, vec![3]);
        assert_eq!(r.eliminated_rows, vec![2]);
        assert_eq!(r.species, vec![0, 1, 2]);
        // Over the remaining species Z = H - 2 O
        assert_eq!(r.rows, vec![0, 1]);
    }

    #[test]
    fn budget_without_carrier_is_infeasible() {
        // Row 1 only touches species 1, which row 0 eliminates
        let ae = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 1.0]);
        let be = DVector::from_vec(vec![0.0, 1.0]);
        assert!(matches!(reduce(&ae, &be), ReductionOutcome::Infeasible(_)));
    }

    #[test]
    fn least_norm_solution_satisfies_system() {
        let a = DMatrix::from_row_slice(2, 3, &[1.0, 1.0, 0.0, 0.0, 1.0, 1.0]);
        let b = DVector::from_vec(vec![1.0, 2.0]);
        let x = least_norm_solution(&a, &b).unwrap();
        assert!((&a * x - b).amax() < 1e-12);
    }
}
