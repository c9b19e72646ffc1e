//! Joint torque controllers.
//!
//! A controller sees the full model query of the current evaluation and
//! returns the `n` joint torques. Errors are boxed and surfaced unchanged
//! by the dynamics as [`SimError::Controller`](crate::SimError::Controller).

use nalgebra::{DMatrix, DVector};

use crate::constraint::ConstraintSet;
use crate::model::ModelQuery;
use crate::state::{DynamicState, BASE_VEL_LEN};

pub type ControllerError = Box<dyn std::error::Error + Send + Sync>;

/// Everything a controller may read during one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct ControlInput<'a> {
    pub time: f64,
    pub mass_matrix: &'a DMatrix<f64>,
    pub bias_forces: &'a DVector<f64>,
    pub state: &'a DynamicState,
    pub generalized_velocity: &'a DVector<f64>,
    /// Stacked Jacobian of the active constraint rows.
    pub jacobian: &'a DMatrix<f64>,
    /// Stacked `Jd nu` of the active constraint rows.
    pub jacobian_derivative_contraction: &'a DVector<f64>,
    pub constraints: &'a ConstraintSet,
    pub query: &'a ModelQuery,
}

pub trait TorqueController {
    fn torques(&self, input: &ControlInput<'_>) -> Result<DVector<f64>, ControllerError>;
}

impl<F> TorqueController for F
where
    F: Fn(&ControlInput<'_>) -> Result<DVector<f64>, ControllerError>,
{
    fn torques(&self, input: &ControlInput<'_>) -> Result<DVector<f64>, ControllerError> {
        self(input)
    }
}

/// Passive joints.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroTorque;

impl TorqueController for ZeroTorque {
    fn torques(&self, input: &ControlInput<'_>) -> Result<DVector<f64>, ControllerError> {
        Ok(DVector::zeros(input.state.n_dof()))
    }
}

/// Joint-space PD around a fixed posture:
/// `tau = K (q_ref - q) - D q_dot [+ c_joints]`.
#[derive(Debug, Clone, PartialEq)]
pub struct JointImpedance {
    pub reference: DVector<f64>,
    pub stiffness: f64,
    pub damping: f64,
    /// Add the joint rows of the bias forces.
    pub gravity_compensation: bool,
}

impl JointImpedance {
    pub fn new(reference: DVector<f64>, stiffness: f64, damping: f64) -> Self {
        Self {
            reference,
            stiffness,
            damping,
            gravity_compensation: false,
        }
    }

    #[must_use]
    pub fn with_gravity_compensation(mut self, enabled: bool) -> Self {
        self.gravity_compensation = enabled;
        self
    }
}

impl TorqueController for JointImpedance {
    fn torques(&self, input: &ControlInput<'_>) -> Result<DVector<f64>, ControllerError> {
        let state = input.state;
        let n = state.n_dof();
        if self.reference.len() != n {
            return Err(format!(
                "impedance reference has {} joints, state has {n}",
                self.reference.len()
            )
            .into());
        }
        let mut tau = (&self.reference - &state.joint_positions) * self.stiffness
            - &state.joint_velocities * self.damping;
        if self.gravity_compensation {
            tau += input.bias_forces.rows(BASE_VEL_LEN, n);
        }
        Ok(tau)
    }
}
