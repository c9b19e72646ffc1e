//! Constrained forward dynamics of floating-base robots.
//!
//! A robot is loaded from URDF into a [`Model`], wrapped in a
//! [`FloatingBaseModel`] that answers mass-matrix, bias-force and Jacobian
//! queries, and driven by [`ForwardDynamics`], whose `rhs(t, x)` is the
//! right-hand side handed to an integrator.

use nalgebra::{Isometry3, Matrix6, Translation3, UnitQuaternion, Vector3, Vector6};
use petgraph::prelude::*;

mod bfs;
pub mod constraint;
pub mod controller;
pub mod dynamics;
pub mod equilibrium;
pub mod error;
pub mod floating_base;
pub mod integrator;
pub mod model;
pub mod solver;
pub mod spatial;
pub mod state;
mod urdf;
mod utils;

#[cfg(test)]
pub(crate) mod test_robot;

pub use constraint::{
    ConstraintSet, ContactKind, EndEffector, ForceSource, FrictionCone, Gains, PointConstraint,
    Reference, Target,
};
pub use controller::{ControlInput, ControllerError, JointImpedance, TorqueController, ZeroTorque};
pub use dynamics::{Evaluation, ForwardDynamics};
pub use equilibrium::{hold_current, standing_state};
pub use error::{Result, SimError};
pub use floating_base::{FloatingBaseModel, STANDARD_GRAVITY};
pub use integrator::{integrate, simulate_batch, IntegratorSettings, Method, Trajectory};
pub use model::{FrameKinematics, ModelQuery, RigidBodyModel};
pub use solver::{
    ConstrainedDynamicsSolver, ConstrainedProblem, ConstrainedSolution, ContactForceInput,
    ContactForceSolver, ContactForces, SchurComplement, SolverSettings,
};
pub use state::{DynamicState, StateLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointKind {
    Revolute,
    Prismatic,
    Fixed,
}

#[derive(Debug, Clone)]
pub struct Joint {
    pub name: String,
    pub kind: JointKind,
    // unit axis in the child link frame
    pub axis: Vector3<f64>,
    // index into the joint coordinates, none for fixed joints
    pub dof: Option<usize>,
}

impl Joint {
    /// Child frame displacement at joint position `position`.
    pub fn motion(&self, position: f64) -> Isometry3<f64> {
        match self.kind {
            JointKind::Revolute => Isometry3::rotation(self.axis * position),
            JointKind::Prismatic => Isometry3::from_parts(
                Translation3::from(self.axis * position),
                UnitQuaternion::identity(),
            ),
            JointKind::Fixed => Isometry3::identity(),
        }
    }

    /// Screw axis in the child link frame.
    pub fn screw(&self) -> Vector6<f64> {
        match self.kind {
            JointKind::Revolute => spatial::twist(&self.axis, &Vector3::zeros()),
            JointKind::Prismatic => spatial::twist(&Vector3::zeros(), &self.axis),
            JointKind::Fixed => Vector6::zeros(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Link {
    pub name: String,
    pub parent: Option<usize>,

    // zero pose relative to parent link
    pub parent_zero_pose: Isometry3<f64>,

    // link frame spatial inertia
    pub local_spatial_inertial: Matrix6<f64>,
    pub mass: f64,
    // link frame
    pub center_of_mass: Vector3<f64>,

    // joint to the parent link, none for the root
    pub joint: Option<Joint>,
}

#[derive(Debug)]
pub struct Model {
    pub name: String,
    // rigid body tree
    pub links: Vec<Link>,
    pub link_graph: DiGraphMap<usize, ()>,
    pub bfs: Vec<usize>,
    // floating base link
    pub root: usize,
    pub n_dof: usize,
}

impl Model {
    pub fn link_index(&self, name: &str) -> Result<usize> {
        self.links
            .iter()
            .position(|l| l.name == name)
            .ok_or_else(|| SimError::UnknownLink(name.to_string()))
    }

    /// Names of the movable joints, in coordinate order.
    pub fn joint_names(&self) -> Vec<&str> {
        let mut joints = self
            .links
            .iter()
            .filter_map(|l| l.joint.as_ref())
            .filter_map(|j| j.dof.map(|d| (d, j.name.as_str())))
            .collect::<Vec<_>>();
        joints.sort_by_key(|(d, _)| *d);
        joints.into_iter().map(|(_, n)| n).collect()
    }

    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.links
            .iter()
            .filter_map(|l| l.joint.as_ref())
            .find(|j| j.name == name)
            .and_then(|j| j.dof)
    }

    pub fn total_mass(&self) -> f64 {
        self.links.iter().map(|l| l.mass).sum()
    }
}
