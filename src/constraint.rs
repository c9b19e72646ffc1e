//! Contact and constraint configuration.
//!
//! Constraints are keyed by [`EndEffector`]. Each active point contributes
//! rows to the stacked contact Jacobian and a desired acceleration, either
//! the reference acceleration (rigid contact) or a PD term pulling the point
//! back to its reference pose (pose correction).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use nalgebra::{Isometry3, Vector3, Vector6};

use crate::error::{Result, SimError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EndEffector {
    LeftFoot,
    RightFoot,
    LeftHand,
    RightHand,
}

impl EndEffector {
    pub const ALL: [EndEffector; 4] = [
        EndEffector::LeftFoot,
        EndEffector::RightFoot,
        EndEffector::LeftHand,
        EndEffector::RightHand,
    ];

    pub const FEET: [EndEffector; 2] = [EndEffector::LeftFoot, EndEffector::RightFoot];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ContactKind {
    // flat foot or rigid grasp, all six rows
    #[default]
    Surface,
    Point,
}

impl ContactKind {
    pub const fn rows(self) -> usize {
        match self {
            ContactKind::Surface => 6,
            ContactKind::Point => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrictionCone {
    pub coefficient: f64,
    // world-frame contact normal
    pub normal: Vector3<f64>,
}

impl Default for FrictionCone {
    fn default() -> Self {
        Self {
            coefficient: 1.0,
            normal: Vector3::z(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Gains {
    pub position_stiffness: f64,
    pub position_damping: f64,
    pub orientation_stiffness: f64,
    pub orientation_damping: f64,
}

impl Gains {
    #[must_use]
    pub fn critically_damped(stiffness: f64) -> Self {
        let damping = 2.0 * stiffness.sqrt();
        Self {
            position_stiffness: stiffness,
            position_damping: damping,
            orientation_stiffness: stiffness,
            orientation_damping: damping,
        }
    }
}

impl Default for Gains {
    fn default() -> Self {
        Self::critically_damped(100.0)
    }
}

/// Desired pose of a point at some instant, rates `[linear; angular]` in the
/// world frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub pose: Isometry3<f64>,
    pub velocity: Vector6<f64>,
    pub acceleration: Vector6<f64>,
}

impl Target {
    pub fn hold(pose: Isometry3<f64>) -> Self {
        Self {
            pose,
            velocity: Vector6::zeros(),
            acceleration: Vector6::zeros(),
        }
    }
}

pub type TrajectoryFn = Arc<dyn Fn(f64) -> Target + Send + Sync>;

#[derive(Clone)]
pub enum Reference {
    Hold(Isometry3<f64>),
    Trajectory(TrajectoryFn),
}

impl Reference {
    pub fn target(&self, t: f64) -> Target {
        match self {
            Reference::Hold(pose) => Target::hold(*pose),
            Reference::Trajectory(f) => f(t),
        }
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Hold(pose) => f.debug_tuple("Hold").field(pose).finish(),
            Reference::Trajectory(_) => f.write_str("Trajectory(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PointConstraint {
    pub active: bool,
    pub kind: ContactKind,
    pub reference: Reference,
    pub gains: Gains,
    pub friction: FrictionCone,
}

impl PointConstraint {
    pub fn hold(pose: Isometry3<f64>) -> Self {
        Self {
            active: true,
            kind: ContactKind::Surface,
            reference: Reference::Hold(pose),
            gains: Gains::default(),
            friction: FrictionCone::default(),
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: ContactKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_gains(mut self, gains: Gains) -> Self {
        self.gains = gains;
        self
    }

    #[must_use]
    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.reference = reference;
        self
    }

    #[must_use]
    pub fn with_friction(mut self, friction: FrictionCone) -> Self {
        self.friction = friction;
        self
    }

    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Desired `[linear; angular]` acceleration at the current `pose` and
    /// `velocity`. Without pose correction this is the reference acceleration.
    pub fn desired_acceleration(
        &self,
        t: f64,
        pose: &Isometry3<f64>,
        velocity: &Vector6<f64>,
        pose_correction: bool,
    ) -> Vector6<f64> {
        let target = self.reference.target(t);
        if !pose_correction {
            return target.acceleration;
        }
        let g = &self.gains;
        let position_error = target.pose.translation.vector - pose.translation.vector;
        let orientation_error = (target.pose.rotation * pose.rotation.inverse()).scaled_axis();
        let velocity_error = target.velocity - velocity;

        let mut acc = target.acceleration;
        acc.fixed_rows_mut::<3>(0).axpy(
            g.position_stiffness,
            &position_error,
            1.0,
        );
        acc.fixed_rows_mut::<3>(3).axpy(
            g.orientation_stiffness,
            &orientation_error,
            1.0,
        );
        acc.fixed_rows_mut::<3>(0)
            .axpy(g.position_damping, &velocity_error.fixed_rows::<3>(0), 1.0);
        acc.fixed_rows_mut::<3>(3)
            .axpy(g.orientation_damping, &velocity_error.fixed_rows::<3>(3), 1.0);
        acc
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    pub points: BTreeMap<EndEffector, PointConstraint>,
    // PD pose correction instead of the reference acceleration
    pub pose_correction: bool,
}

impl ConstraintSet {
    pub fn free() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_point(mut self, point: EndEffector, constraint: PointConstraint) -> Self {
        self.points.insert(point, constraint);
        self
    }

    #[must_use]
    pub fn with_pose_correction(mut self, enabled: bool) -> Self {
        self.pose_correction = enabled;
        self
    }

    pub fn set_active(&mut self, point: EndEffector, active: bool) -> Result<()> {
        let constraint = self
            .points
            .get_mut(&point)
            .ok_or(SimError::UnknownPoint(point))?;
        constraint.active = active;
        Ok(())
    }

    pub fn active(&self) -> impl Iterator<Item = (EndEffector, &PointConstraint)> {
        self.points
            .iter()
            .filter(|(_, c)| c.active)
            .map(|(p, c)| (*p, c))
    }

    pub fn rows(&self) -> usize {
        self.active().map(|(_, c)| c.kind.rows()).sum()
    }

    pub fn validate(&self) -> Result<()> {
        if self.pose_correction && self.active().next().is_none() {
            return Err(SimError::constraint_config(
                "pose correction requested but no constraint point is active",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ForceSource {
    // world frame [force; torque about the point]
    External {
        point: EndEffector,
        wrench: Vector6<f64>,
    },
    Payload { point: EndEffector, mass: f64 },
}

impl ForceSource {
    pub fn point(&self) -> EndEffector {
        match self {
            ForceSource::External { point, .. } | ForceSource::Payload { point, .. } => *point,
        }
    }

    pub fn wrench(&self, gravity: &Vector3<f64>) -> Vector6<f64> {
        match self {
            ForceSource::External { wrench, .. } => *wrench,
            ForceSource::Payload { mass, .. } => {
                let mut w = Vector6::zeros();
                w.fixed_rows_mut::<3>(0).copy_from(&(gravity * *mass));
                w
            }
        }
    }
}
