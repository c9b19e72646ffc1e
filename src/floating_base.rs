//! Floating-base rigid-body model service built on a URDF [`Model`].
//!
//! All quantities are computed in the world frame with spatial twists
//! `[w; v_o]`, `v_o` being the velocity of the body point at the world
//! origin. For every link `i` with space Jacobian `J_i` and world spatial
//! inertia `G_i`:
//!
//! ```text
//! M = sum J_i^T G_i J_i
//! c = sum J_i^T (G_i (Jd_i nu - a_g) - ad(V_i)^T G_i V_i)
//! ```
//!
//! with `a_g = [0; g]`. Registered frames are reported in the mixed
//! `[linear; angular]` convention of the generalized velocity.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector, Isometry3, Matrix6xX, Point3, Vector3, Vector6};

use crate::constraint::EndEffector;
use crate::error::{check_len, Result, SimError};
use crate::model::{FrameKinematics, ModelQuery, RigidBodyModel};
use crate::spatial::{ad, adjoint, base_twist_map, point_velocity_map, twist};
use crate::state::{DynamicState, BASE_VEL_LEN};
use crate::Model;

/// Standard gravity, world `-z`.
pub const STANDARD_GRAVITY: Vector3<f64> = Vector3::new(0.0, 0.0, -9.81);

#[derive(Debug, Clone)]
struct Frame {
    link: usize,
    offset: Isometry3<f64>,
}

// per-link world kinematics
#[derive(Debug, Clone)]
struct LinkState {
    pose: Isometry3<f64>,
    twist: Vector6<f64>,
    // Jd * nu
    bias_acceleration: Vector6<f64>,
    jacobian: Matrix6xX<f64>,
}

#[derive(Debug)]
pub struct FloatingBaseModel {
    model: Model,
    gravity: Vector3<f64>,
    frames: BTreeMap<EndEffector, Frame>,
}

impl FloatingBaseModel {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            gravity: STANDARD_GRAVITY,
            frames: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_gravity(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = gravity;
        self
    }

    #[must_use]
    pub fn without_gravity(self) -> Self {
        self.with_gravity(Vector3::zeros())
    }

    /// Registers `point` as the frame `offset` relative to link `link`.
    pub fn with_frame(mut self, point: EndEffector, link: &str, offset: Isometry3<f64>) -> Result<Self> {
        let link = self.model.link_index(link)?;
        self.frames.insert(point, Frame { link, offset });
        Ok(self)
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// World pose of every link, indexed like `Model::links`.
    pub fn link_poses(&self, state: &DynamicState) -> Result<Vec<Isometry3<f64>>> {
        Ok(self
            .link_states(state)?
            .into_iter()
            .map(|s| s.pose)
            .collect())
    }

    /// World position of the center of mass.
    pub fn center_of_mass(&self, state: &DynamicState) -> Result<Vector3<f64>> {
        let mass = self.model.total_mass();
        if mass <= 0.0 {
            return Err(SimError::Urdf("robot has no mass".into()));
        }
        let weighted = self
            .link_states(state)?
            .iter()
            .zip(&self.model.links)
            .map(|(s, link)| (s.pose * Point3::from(link.center_of_mass)).coords * link.mass)
            .sum::<Vector3<f64>>();
        Ok(weighted / mass)
    }

    fn link_states(&self, state: &DynamicState) -> Result<Vec<LinkState>> {
        let n = self.model.n_dof;
        let nv = n + BASE_VEL_LEN;
        check_len("joint positions", n, state.joint_positions.len())?;
        check_len("joint velocities", n, state.joint_velocities.len())?;

        let base = state.base_pose()?;
        let nu = state.generalized_velocity();

        let mut states: Vec<Option<LinkState>> = vec![None; self.model.links.len()];
        for &i in &self.model.bfs {
            let link = &self.model.links[i];
            let link_state = match (link.parent, &link.joint) {
                (Some(parent), Some(joint)) => {
                    let parent_state = states[parent].as_ref().ok_or_else(|| {
                        SimError::Urdf(format!("link {} visited before its parent", link.name))
                    })?;
                    let position = joint.dof.map_or(0.0, |d| state.joint_positions[d]);
                    let pose = parent_state.pose * link.parent_zero_pose * joint.motion(position);
                    let mut velocity = parent_state.twist;
                    let mut bias_acceleration = parent_state.bias_acceleration;
                    let mut jacobian = parent_state.jacobian.clone();
                    if let Some(d) = joint.dof {
                        let screw = adjoint(&pose) * joint.screw();
                        let rate = state.joint_velocities[d];
                        velocity += screw * rate;
                        bias_acceleration += ad(&velocity) * screw * rate;
                        jacobian.set_column(BASE_VEL_LEN + d, &screw);
                    }
                    LinkState {
                        pose,
                        twist: velocity,
                        bias_acceleration,
                        jacobian,
                    }
                }
                _ => {
                    let p = base.translation.vector;
                    let x = base_twist_map(&p);
                    let mut jacobian = Matrix6xX::zeros(nv);
                    jacobian.fixed_view_mut::<6, 6>(0, 0).copy_from(&x);
                    let linear = state.base_linear_velocity;
                    let angular = state.base_angular_velocity;
                    LinkState {
                        pose: base,
                        twist: x * nu.fixed_rows::<6>(0),
                        bias_acceleration: twist(&Vector3::zeros(), &linear.cross(&angular)),
                        jacobian,
                    }
                }
            };
            states[i] = Some(link_state);
        }

        states
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| SimError::Urdf("link not reachable from the root".into()))
    }
}

impl RigidBodyModel for FloatingBaseModel {
    fn dof(&self) -> usize {
        self.model.n_dof
    }

    fn gravity(&self) -> Vector3<f64> {
        self.gravity
    }

    fn evaluate(&self, state: &DynamicState) -> Result<ModelQuery> {
        let nv = self.model.n_dof + BASE_VEL_LEN;
        let states = self.link_states(state)?;
        let gravity = twist(&Vector3::zeros(), &self.gravity);

        let mut mass_matrix = DMatrix::zeros(nv, nv);
        let mut bias_forces = DVector::zeros(nv);
        for (s, link) in states.iter().zip(&self.model.links) {
            let ad_inv = adjoint(&s.pose.inverse());
            let inertia = ad_inv.transpose() * link.local_spatial_inertial * ad_inv;
            mass_matrix += s.jacobian.transpose() * (inertia * &s.jacobian);
            let momentum = inertia * s.twist;
            let wrench = inertia * (s.bias_acceleration - gravity) - ad(&s.twist).transpose() * momentum;
            bias_forces += s.jacobian.transpose() * wrench;
        }
        // round-off symmetrisation
        let mass_matrix = (&mass_matrix + mass_matrix.transpose()) * 0.5;

        let mut frames = BTreeMap::new();
        for (point, frame) in &self.frames {
            let s = &states[frame.link];
            let pose = s.pose * frame.offset;
            let y = point_velocity_map(&pose.translation.vector);
            let jacobian = y * &s.jacobian;
            let velocity = y * s.twist;
            let mut contraction = y * s.bias_acceleration;
            let coriolis = velocity
                .fixed_rows::<3>(3)
                .cross(&velocity.fixed_rows::<3>(0));
            let mut linear = contraction.fixed_rows_mut::<3>(0);
            linear += coriolis;
            frames.insert(
                *point,
                FrameKinematics {
                    pose,
                    jacobian: DMatrix::from_column_slice(6, nv, jacobian.as_slice()),
                    jacobian_derivative_contraction: DVector::from_column_slice(
                        contraction.as_slice(),
                    ),
                },
            );
        }

        Ok(ModelQuery {
            mass_matrix,
            bias_forces,
            frames,
        })
    }
}
