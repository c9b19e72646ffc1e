//! Rigid-body model service interface.
//!
//! A model service maps a [`DynamicState`] to an immutable [`ModelQuery`]
//! holding everything one dynamics evaluation needs. Nothing is cached
//! between calls, so callers never observe a stale configuration.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector, Isometry3, Vector3, Vector6};

use crate::constraint::EndEffector;
use crate::error::{check_len, Result, SimError};
use crate::state::DynamicState;

/// Kinematics of one registered frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameKinematics {
    /// World pose of the frame.
    pub pose: Isometry3<f64>,
    /// Maps the generalized velocity to `[linear; angular]` frame velocity.
    pub jacobian: DMatrix<f64>,
    /// `Jd * nu`.
    pub jacobian_derivative_contraction: DVector<f64>,
}

/// Result of evaluating the model at one state.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelQuery {
    pub mass_matrix: DMatrix<f64>,
    pub bias_forces: DVector<f64>,
    pub frames: BTreeMap<EndEffector, FrameKinematics>,
}

impl ModelQuery {
    pub fn mass_matrix(&self) -> &DMatrix<f64> {
        &self.mass_matrix
    }

    pub fn bias_forces(&self) -> &DVector<f64> {
        &self.bias_forces
    }

    pub fn frame(&self, point: EndEffector) -> Result<&FrameKinematics> {
        self.frames.get(&point).ok_or(SimError::UnknownPoint(point))
    }

    pub fn jacobian(&self, point: EndEffector) -> Result<&DMatrix<f64>> {
        Ok(&self.frame(point)?.jacobian)
    }

    pub fn jacobian_derivative_contraction(&self, point: EndEffector) -> Result<&DVector<f64>> {
        Ok(&self.frame(point)?.jacobian_derivative_contraction)
    }

    pub fn forward_kinematics(&self, point: EndEffector) -> Result<&Isometry3<f64>> {
        Ok(&self.frame(point)?.pose)
    }

    /// Mixed velocity `[linear; angular]` of a frame.
    pub fn point_velocity(&self, point: EndEffector, nu: &DVector<f64>) -> Result<Vector6<f64>> {
        let jacobian = self.jacobian(point)?;
        check_len("generalized velocity", jacobian.ncols(), nu.len())?;
        let v = jacobian * nu;
        if v.len() != 6 {
            return Err(SimError::length_mismatch("frame velocity", 6, v.len()));
        }
        Ok(Vector6::from_column_slice(v.as_slice()))
    }
}

/// Rigid-body model evaluator.
pub trait RigidBodyModel {
    /// Number of actuated joints.
    fn dof(&self) -> usize;

    /// World gravity acting on the robot.
    fn gravity(&self) -> Vector3<f64>;

    /// Mass matrix, bias forces and registered frame kinematics at `state`.
    fn evaluate(&self, state: &DynamicState) -> Result<ModelQuery>;
}

impl<T: RigidBodyModel + ?Sized> RigidBodyModel for &T {
    fn dof(&self) -> usize {
        (**self).dof()
    }

    fn gravity(&self) -> Vector3<f64> {
        (**self).gravity()
    }

    fn evaluate(&self, state: &DynamicState) -> Result<ModelQuery> {
        (**self).evaluate(state)
    }
}

impl<T: RigidBodyModel + ?Sized> RigidBodyModel for Box<T> {
    fn dof(&self) -> usize {
        (**self).dof()
    }

    fn gravity(&self) -> Vector3<f64> {
        (**self).gravity()
    }

    fn evaluate(&self, state: &DynamicState) -> Result<ModelQuery> {
        (**self).evaluate(state)
    }
}
