//! Constrained-acceleration solver.
//!
//! Solves
//!
//! ```text
//! M nu_dot + c = S^T tau + Jc^T f_c + f_ext
//! Jc nu_dot + Jd nu = a_d
//! ```
//!
//! by eliminating the contact forces through the Schur complement
//! `Jc M^-1 Jc^T`. How the forces are picked from that reduced system is
//! delegated to a [`ContactForceSolver`].

use std::fmt;

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

use crate::constraint::FrictionCone;
use crate::error::{check_len, check_shape, Result, SimError};
use crate::state::BASE_VEL_LEN;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolverSettings {
    // sigma / (sigma^2 + damping^2), sigma < tolerance dropped
    pub damping: f64,
    pub tolerance: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            damping: 1e-6,
            tolerance: 1e-8,
        }
    }
}

impl SolverSettings {
    #[must_use]
    pub const fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Damped SVD pseudo-inverse, and whether any singular value was truncated.
pub fn damped_pseudo_inverse(a: &DMatrix<f64>, settings: &SolverSettings) -> (DMatrix<f64>, bool) {
    let (rows, cols) = a.shape();
    if rows == 0 || cols == 0 {
        return (DMatrix::zeros(cols, rows), false);
    }
    let svd = a.clone().svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return (DMatrix::zeros(cols, rows), true);
    };

    let eps2 = settings.damping * settings.damping;
    let mut truncated = false;
    let inverted = svd.singular_values.map(|sigma| {
        if sigma < settings.tolerance {
            truncated = true;
            0.0
        } else {
            sigma / (sigma * sigma + eps2)
        }
    });
    let inverse = v_t.transpose() * DMatrix::from_diagonal(&inverted) * u.transpose();
    (inverse, truncated)
}

// M^-1 applied through a factorization, never formed on the Cholesky path
enum MassInverse {
    Cholesky(Cholesky<f64, Dyn>),
    Pseudo(DMatrix<f64>),
}

impl MassInverse {
    fn new(mass_matrix: &DMatrix<f64>, settings: &SolverSettings) -> (Self, bool) {
        match mass_matrix.clone().cholesky() {
            Some(cholesky) => (Self::Cholesky(cholesky), false),
            None => {
                tracing::debug!(
                    dim = mass_matrix.nrows(),
                    "mass matrix is not positive definite, using damped pseudo-inverse"
                );
                let (inverse, _) = damped_pseudo_inverse(mass_matrix, settings);
                (Self::Pseudo(inverse), true)
            }
        }
    }

    fn solve_vector(&self, b: &DVector<f64>) -> DVector<f64> {
        match self {
            Self::Cholesky(c) => c.solve(b),
            Self::Pseudo(inverse) => inverse * b,
        }
    }

    fn solve_matrix(&self, b: &DMatrix<f64>) -> DMatrix<f64> {
        match self {
            Self::Cholesky(c) => c.solve(b),
            Self::Pseudo(inverse) => inverse * b,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ContactForceInput<'a> {
    pub jacobian: &'a DMatrix<f64>,
    pub mass_matrix: &'a DMatrix<f64>,
    // S^T tau - c + f_ext
    pub generalized_force: &'a DVector<f64>,
    // M^-1 h
    pub free_acceleration: &'a DVector<f64>,
    pub schur: &'a DMatrix<f64>,
    // a_d - Jd nu - Jc nu_dot_free
    pub residual: &'a DVector<f64>,
    pub friction: &'a [FrictionCone],
    pub settings: &'a SolverSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContactForces {
    pub forces: DVector<f64>,
    pub regularized: bool,
}

impl From<DVector<f64>> for ContactForces {
    fn from(forces: DVector<f64>) -> Self {
        Self {
            forces,
            regularized: false,
        }
    }
}

/// Picks one force per constraint row from the reduced problem.
pub trait ContactForceSolver {
    fn contact_forces(&self, input: &ContactForceInput<'_>) -> Result<ContactForces>;
}

/// Enforces the constraints exactly: `f_c = pinv(Jc M^-1 Jc^T) r`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchurComplement;

impl ContactForceSolver for SchurComplement {
    fn contact_forces(&self, input: &ContactForceInput<'_>) -> Result<ContactForces> {
        let (inverse, regularized) = damped_pseudo_inverse(input.schur, input.settings);
        if regularized {
            tracing::debug!(
                rows = input.schur.nrows(),
                "schur complement is rank deficient, truncated singular values"
            );
        }
        Ok(ContactForces {
            forces: inverse * input.residual,
            regularized,
        })
    }
}

// vectors are n + 6 long unless noted, m constraint rows
#[derive(Debug, Clone, Copy)]
pub struct ConstrainedProblem<'a> {
    pub mass_matrix: &'a DMatrix<f64>,
    pub bias_forces: &'a DVector<f64>,
    // n
    pub torques: &'a DVector<f64>,
    pub jacobian: &'a DMatrix<f64>,
    pub jacobian_derivative_contraction: &'a DVector<f64>,
    pub desired_acceleration: &'a DVector<f64>,
    // sum of J_ext^T f_ext
    pub external_forces: &'a DVector<f64>,
    pub friction: &'a [FrictionCone],
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstrainedSolution {
    pub acceleration: DVector<f64>,
    pub contact_forces: DVector<f64>,
    pub regularized: bool,
}

pub struct ConstrainedDynamicsSolver {
    settings: SolverSettings,
    force_solver: Box<dyn ContactForceSolver + Send + Sync>,
}

impl fmt::Debug for ConstrainedDynamicsSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstrainedDynamicsSolver")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Default for ConstrainedDynamicsSolver {
    fn default() -> Self {
        Self::new(SolverSettings::default())
    }
}

impl ConstrainedDynamicsSolver {
    pub fn new(settings: SolverSettings) -> Self {
        Self {
            settings,
            force_solver: Box::new(SchurComplement),
        }
    }

    #[must_use]
    pub fn with_force_solver(
        mut self,
        force_solver: impl ContactForceSolver + Send + Sync + 'static,
    ) -> Self {
        self.force_solver = Box::new(force_solver);
        self
    }

    pub fn solve(&self, problem: &ConstrainedProblem<'_>) -> Result<ConstrainedSolution> {
        let nv = problem.mass_matrix.nrows();
        check_shape("mass matrix", (nv, nv), problem.mass_matrix.shape())?;
        if nv < BASE_VEL_LEN {
            return Err(SimError::dimension_mismatch(
                "mass matrix",
                (BASE_VEL_LEN, BASE_VEL_LEN),
                problem.mass_matrix.shape(),
            ));
        }
        let n = nv - BASE_VEL_LEN;
        check_len("bias forces", nv, problem.bias_forces.len())?;
        check_len("torques", n, problem.torques.len())?;
        check_len("external forces", nv, problem.external_forces.len())?;
        let m = problem.jacobian.nrows();
        check_shape("constraint jacobian", (m, nv), problem.jacobian.shape())?;
        check_len(
            "jacobian derivative contraction",
            m,
            problem.jacobian_derivative_contraction.len(),
        )?;
        check_len("desired acceleration", m, problem.desired_acceleration.len())?;
        check_len("friction cones", m, problem.friction.len())?;

        let mut h = problem.external_forces - problem.bias_forces;
        {
            let mut joints = h.rows_mut(BASE_VEL_LEN, n);
            joints += problem.torques;
        }

        let (inverse, mut regularized) = MassInverse::new(problem.mass_matrix, &self.settings);
        let free = inverse.solve_vector(&h);
        if m == 0 {
            return Ok(ConstrainedSolution {
                acceleration: free,
                contact_forces: DVector::zeros(0),
                regularized,
            });
        }

        let minv_jt = inverse.solve_matrix(&problem.jacobian.transpose());
        let schur = problem.jacobian * &minv_jt;
        let schur = (&schur + schur.transpose()) * 0.5;
        let residual = problem.desired_acceleration
            - problem.jacobian_derivative_contraction
            - problem.jacobian * &free;

        let forces = self.force_solver.contact_forces(&ContactForceInput {
            jacobian: problem.jacobian,
            mass_matrix: problem.mass_matrix,
            generalized_force: &h,
            free_acceleration: &free,
            schur: &schur,
            residual: &residual,
            friction: problem.friction,
            settings: &self.settings,
        })?;
        check_len("contact forces", m, forces.forces.len())?;
        regularized |= forces.regularized;

        let acceleration = free + minv_jt * &forces.forces;
        Ok(ConstrainedSolution {
            acceleration,
            contact_forces: forces.forces,
            regularized,
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    const NV: usize = 8;

    fn mass_matrix() -> DMatrix<f64> {
        let a = DMatrix::from_fn(NV, NV, |i, j| ((i * 7 + j * 3) as f64).sin());
        &a * a.transpose() + DMatrix::identity(NV, NV) * NV as f64
    }

    fn bias() -> DVector<f64> {
        DVector::from_fn(NV, |i, _| 0.3 * (i as f64).cos())
    }

    fn torques() -> DVector<f64> {
        DVector::from_vec(vec![1.5, -0.7])
    }

    fn jacobian(rows: usize) -> DMatrix<f64> {
        DMatrix::from_fn(rows, NV, |i, j| ((i * 5 + j * 2 + 1) as f64).cos())
    }

    struct Fixture {
        m: DMatrix<f64>,
        c: DVector<f64>,
        tau: DVector<f64>,
        jc: DMatrix<f64>,
        jd: DVector<f64>,
        ad: DVector<f64>,
        ext: DVector<f64>,
        friction: Vec<FrictionCone>,
    }

    impl Fixture {
        fn new(jc: DMatrix<f64>) -> Self {
            let rows = jc.nrows();
            Self {
                m: mass_matrix(),
                c: bias(),
                tau: torques(),
                jd: DVector::from_fn(rows, |i, _| 0.1 * i as f64),
                ad: DVector::zeros(rows),
                ext: DVector::zeros(NV),
                friction: vec![FrictionCone::default(); rows],
                jc,
            }
        }

        fn problem(&self) -> ConstrainedProblem<'_> {
            ConstrainedProblem {
                mass_matrix: &self.m,
                bias_forces: &self.c,
                torques: &self.tau,
                jacobian: &self.jc,
                jacobian_derivative_contraction: &self.jd,
                desired_acceleration: &self.ad,
                external_forces: &self.ext,
                friction: &self.friction,
            }
        }
    }

    fn generalized_torque(tau: &DVector<f64>) -> DVector<f64> {
        let mut full = DVector::zeros(NV);
        full.rows_mut(BASE_VEL_LEN, tau.len()).copy_from(tau);
        full
    }

    #[test]
    fn free_body_test() {
        let fixture = Fixture::new(DMatrix::zeros(0, NV));
        let solution = ConstrainedDynamicsSolver::default()
            .solve(&fixture.problem())
            .unwrap();
        let expected = fixture
            .m
            .clone()
            .lu()
            .solve(&(generalized_torque(&fixture.tau) - &fixture.c))
            .unwrap();
        assert_relative_eq!(solution.acceleration, expected, epsilon = 1e-10);
        assert_eq!(solution.contact_forces.len(), 0);
        assert!(!solution.regularized);
    }

    #[test]
    fn constraints_are_satisfied_test() {
        let mut fixture = Fixture::new(jacobian(3));
        fixture.ad = DVector::from_vec(vec![0.2, -0.1, 0.4]);
        let solution = ConstrainedDynamicsSolver::default()
            .solve(&fixture.problem())
            .unwrap();
        let achieved = &fixture.jc * &solution.acceleration + &fixture.jd;
        assert_relative_eq!(achieved, fixture.ad, epsilon = 1e-8);
        assert!(!solution.regularized);

        // equations of motion hold with the returned forces
        let lhs = &fixture.m * &solution.acceleration + &fixture.c;
        let rhs = generalized_torque(&fixture.tau) + fixture.jc.transpose() * &solution.contact_forces;
        assert_relative_eq!(lhs, rhs, epsilon = 1e-8);
    }

    #[test]
    fn duplicated_rows_are_regularized_test() {
        let base = jacobian(3);
        let mut jc = DMatrix::zeros(4, NV);
        jc.rows_mut(0, 3).copy_from(&base);
        jc.row_mut(3).copy_from(&base.row(0));
        let mut fixture = Fixture::new(jc);
        fixture.jd[3] = fixture.jd[0];

        let solution = ConstrainedDynamicsSolver::default()
            .solve(&fixture.problem())
            .unwrap();
        assert!(solution.regularized);
        assert!(solution.acceleration.iter().all(|x| x.is_finite()));
        let achieved = &fixture.jc * &solution.acceleration + &fixture.jd;
        assert_relative_eq!(achieved, fixture.ad, epsilon = 1e-6);
    }

    #[test]
    fn non_positive_mass_matrix_is_regularized_test() {
        let mut fixture = Fixture::new(DMatrix::zeros(0, NV));
        fixture.m[(0, 0)] = -1.0;
        let solution = ConstrainedDynamicsSolver::default()
            .solve(&fixture.problem())
            .unwrap();
        assert!(solution.regularized);
        assert!(solution.acceleration.iter().all(|x| x.is_finite()));
    }

    struct NoForces;

    impl ContactForceSolver for NoForces {
        fn contact_forces(&self, input: &ContactForceInput<'_>) -> Result<ContactForces> {
            Ok(DVector::zeros(input.residual.len()).into())
        }
    }

    struct WrongLength;

    impl ContactForceSolver for WrongLength {
        fn contact_forces(&self, _input: &ContactForceInput<'_>) -> Result<ContactForces> {
            Ok(DVector::zeros(1).into())
        }
    }

    #[test]
    fn substituted_force_solver_is_used_test() {
        let fixture = Fixture::new(jacobian(3));
        let solver = ConstrainedDynamicsSolver::default().with_force_solver(NoForces);
        let solution = solver.solve(&fixture.problem()).unwrap();
        let free = ConstrainedDynamicsSolver::default()
            .solve(&Fixture::new(DMatrix::zeros(0, NV)).problem())
            .unwrap();
        assert_relative_eq!(solution.acceleration, free.acceleration, epsilon = 1e-12);
        assert_eq!(solution.contact_forces, DVector::zeros(3));
    }

    #[test]
    fn force_of_wrong_length_test() {
        let fixture = Fixture::new(jacobian(3));
        let solver = ConstrainedDynamicsSolver::default().with_force_solver(WrongLength);
        assert!(matches!(
            solver.solve(&fixture.problem()),
            Err(SimError::DimensionMismatch {
                what: "contact forces",
                ..
            })
        ));
    }

    #[test]
    fn shape_checks_test() {
        let mut fixture = Fixture::new(jacobian(3));
        fixture.tau = DVector::zeros(3);
        assert!(matches!(
            ConstrainedDynamicsSolver::default().solve(&fixture.problem()),
            Err(SimError::DimensionMismatch { what: "torques", .. })
        ));
        let mut fixture = Fixture::new(jacobian(3));
        fixture.jd = DVector::zeros(2);
        assert!(matches!(
            ConstrainedDynamicsSolver::default().solve(&fixture.problem()),
            Err(SimError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn damped_pseudo_inverse_test() {
        let settings = SolverSettings::default();
        let (empty, truncated) = damped_pseudo_inverse(&DMatrix::zeros(0, 0), &settings);
        assert_eq!(empty.shape(), (0, 0));
        assert!(!truncated);

        let a = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 0.0]);
        let (inverse, truncated) = damped_pseudo_inverse(&a, &settings);
        assert!(truncated);
        assert_relative_eq!(inverse[(0, 0)], 0.5, epsilon = 1e-9);
        assert_relative_eq!(inverse[(1, 1)], 0.0);
    }
}
