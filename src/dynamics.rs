//! Constrained forward dynamics right-hand side.
//!
//! [`ForwardDynamics::rhs`] maps `(t, x)` to `dx/dt` for the packed state of
//! [`StateLayout`]. One evaluation decodes the state, queries the model,
//! stacks the active constraint rows, asks the controller for torques, adds
//! the configured end-effector forces and solves for the acceleration.

use nalgebra::{DMatrix, DVector};

use crate::constraint::{ConstraintSet, ForceSource, FrictionCone};
use crate::controller::{ControlInput, TorqueController};
use crate::error::{check_len, check_shape, Result, SimError};
use crate::model::RigidBodyModel;
use crate::solver::{ConstrainedDynamicsSolver, ConstrainedProblem, ContactForceSolver};
use crate::state::StateLayout;

/// Everything computed in one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// `dx/dt`.
    pub derivative: DVector<f64>,
    /// Generalized acceleration.
    pub acceleration: DVector<f64>,
    /// Forces on the active constraint rows.
    pub contact_forces: DVector<f64>,
    pub torques: DVector<f64>,
    /// Stacked Jacobian of the active constraint rows.
    pub constraint_jacobian: DMatrix<f64>,
    /// Stacked `Jd nu`.
    pub constraint_bias: DVector<f64>,
    pub desired_acceleration: DVector<f64>,
    pub regularized: bool,
}

#[derive(Debug)]
pub struct ForwardDynamics<M, C> {
    model: M,
    controller: C,
    constraints: ConstraintSet,
    forces: Vec<ForceSource>,
    solver: ConstrainedDynamicsSolver,
    layout: StateLayout,
}

impl<M: RigidBodyModel, C: TorqueController> ForwardDynamics<M, C> {
    /// Free-floating dynamics of `model` driven by `controller`.
    pub fn new(model: M, controller: C) -> Self {
        let layout = StateLayout::new(model.dof());
        Self {
            model,
            controller,
            constraints: ConstraintSet::free(),
            forces: Vec::new(),
            solver: ConstrainedDynamicsSolver::default(),
            layout,
        }
    }

    #[must_use]
    pub fn with_constraints(mut self, constraints: ConstraintSet) -> Self {
        self.constraints = constraints;
        self
    }

    #[must_use]
    pub fn with_force(mut self, force: ForceSource) -> Self {
        self.forces.push(force);
        self
    }

    #[must_use]
    pub fn with_solver(mut self, solver: ConstrainedDynamicsSolver) -> Self {
        self.solver = solver;
        self
    }

    #[must_use]
    pub fn with_force_solver(
        mut self,
        force_solver: impl ContactForceSolver + Send + Sync + 'static,
    ) -> Self {
        self.solver = self.solver.with_force_solver(force_solver);
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// Switching contacts between integration steps goes through here.
    pub fn constraints_mut(&mut self) -> &mut ConstraintSet {
        &mut self.constraints
    }

    pub fn forces(&self) -> &[ForceSource] {
        &self.forces
    }

    pub fn rhs(&self, t: f64, x: &DVector<f64>) -> Result<DVector<f64>> {
        self.evaluate(t, x).map(|e| e.derivative)
    }

    pub fn evaluate(&self, t: f64, x: &DVector<f64>) -> Result<Evaluation> {
        let state = self.layout.decode(x)?;
        self.constraints.validate()?;

        let n = self.layout.n_dof();
        let nv = self.layout.velocity_len();
        let query = self.model.evaluate(&state)?;
        check_shape("mass matrix", (nv, nv), query.mass_matrix.shape())?;
        check_len("bias forces", nv, query.bias_forces.len())?;
        let nu = state.generalized_velocity();

        let rows = self.constraints.rows();
        let mut jacobian = DMatrix::zeros(rows, nv);
        let mut bias = DVector::zeros(rows);
        let mut desired = DVector::zeros(rows);
        let mut friction: Vec<FrictionCone> = Vec::with_capacity(rows);
        let mut row = 0;
        for (point, constraint) in self.constraints.active() {
            let frame = query.frame(point)?;
            check_shape("point jacobian", (6, nv), frame.jacobian.shape())?;
            check_len(
                "point jacobian derivative contraction",
                6,
                frame.jacobian_derivative_contraction.len(),
            )?;
            // point contacts keep the linear rows
            let k = constraint.kind.rows();
            let velocity = query.point_velocity(point, &nu)?;
            let acc = constraint.desired_acceleration(
                t,
                &frame.pose,
                &velocity,
                self.constraints.pose_correction,
            );
            jacobian
                .rows_mut(row, k)
                .copy_from(&frame.jacobian.rows(0, k));
            bias.rows_mut(row, k)
                .copy_from(&frame.jacobian_derivative_contraction.rows(0, k));
            desired.rows_mut(row, k).copy_from(&acc.rows(0, k));
            friction.extend(std::iter::repeat(constraint.friction).take(k));
            row += k;
        }

        let torques = self
            .controller
            .torques(&ControlInput {
                time: t,
                mass_matrix: &query.mass_matrix,
                bias_forces: &query.bias_forces,
                state: &state,
                generalized_velocity: &nu,
                jacobian: &jacobian,
                jacobian_derivative_contraction: &bias,
                constraints: &self.constraints,
                query: &query,
            })
            .map_err(SimError::Controller)?;
        check_len("torques", n, torques.len())?;

        let gravity = self.model.gravity();
        let mut external = DVector::zeros(nv);
        for force in &self.forces {
            let j = query.jacobian(force.point())?;
            check_shape("force jacobian", (6, nv), j.shape())?;
            external += j.transpose() * force.wrench(&gravity);
        }

        let solution = self.solver.solve(&ConstrainedProblem {
            mass_matrix: &query.mass_matrix,
            bias_forces: &query.bias_forces,
            torques: &torques,
            jacobian: &jacobian,
            jacobian_derivative_contraction: &bias,
            desired_acceleration: &desired,
            external_forces: &external,
            friction: &friction,
        })?;
        let derivative = self.layout.encode_derivative(&state, &solution.acceleration)?;

        tracing::trace!(
            t,
            rows,
            forces = self.forces.len(),
            regularized = solution.regularized,
            "evaluated dynamics"
        );

        Ok(Evaluation {
            derivative,
            acceleration: solution.acceleration,
            contact_forces: solution.contact_forces,
            torques,
            constraint_jacobian: jacobian,
            constraint_bias: bias,
            desired_acceleration: desired,
            regularized: solution.regularized,
        })
    }
}
