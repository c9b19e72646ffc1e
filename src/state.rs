//! Flat integration state and its named components.
//!
//! Layout of the state vector for `n` joints:
//!
//! ```text
//! [ p_B (3) | quat w,x,y,z (4) | q (n) | v_B (3) | w_B (3) | qd (n) ]
//! ```
//!
//! Base velocities use the mixed convention: `v_B` is the world-frame
//! velocity of the base origin and `w_B` the world-frame angular velocity.

use nalgebra::{DVector, Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};

use crate::error::{check_len, Result, SimError};

/// Scalars per base pose (position + quaternion).
pub const BASE_POSE_LEN: usize = 7;

/// Scalars per base velocity (linear + angular).
pub const BASE_VEL_LEN: usize = 6;

/// Decoded dynamic state.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicState {
    pub base_position: Vector3<f64>,
    // kept raw, renormalised by the model service
    pub base_orientation: Quaternion<f64>,
    pub joint_positions: DVector<f64>,
    pub base_linear_velocity: Vector3<f64>,
    pub base_angular_velocity: Vector3<f64>,
    pub joint_velocities: DVector<f64>,
}

impl DynamicState {
    /// Base at the origin, identity orientation, everything at rest.
    pub fn at_rest(n_dof: usize) -> Self {
        Self {
            base_position: Vector3::zeros(),
            base_orientation: Quaternion::identity(),
            joint_positions: DVector::zeros(n_dof),
            base_linear_velocity: Vector3::zeros(),
            base_angular_velocity: Vector3::zeros(),
            joint_velocities: DVector::zeros(n_dof),
        }
    }

    pub fn n_dof(&self) -> usize {
        self.joint_positions.len()
    }

    /// Generalized velocity `[v_B; w_B; qd]`.
    pub fn generalized_velocity(&self) -> DVector<f64> {
        let n = self.n_dof();
        let mut nu = DVector::zeros(n + BASE_VEL_LEN);
        nu.fixed_rows_mut::<3>(0)
            .copy_from(&self.base_linear_velocity);
        nu.fixed_rows_mut::<3>(3)
            .copy_from(&self.base_angular_velocity);
        nu.rows_mut(BASE_VEL_LEN, n).copy_from(&self.joint_velocities);
        nu
    }

    /// Normalised base orientation.
    pub fn base_rotation(&self) -> Result<UnitQuaternion<f64>> {
        if self.base_orientation.norm() < f64::EPSILON {
            return Err(SimError::DegenerateOrientation);
        }
        Ok(UnitQuaternion::from_quaternion(self.base_orientation))
    }

    /// World pose of the base frame.
    pub fn base_pose(&self) -> Result<Isometry3<f64>> {
        Ok(Isometry3::from_parts(
            Translation3::from(self.base_position),
            self.base_rotation()?,
        ))
    }

    /// Overwrites the base pose, keeping velocities and joints.
    pub fn set_base_pose(&mut self, pose: &Isometry3<f64>) {
        self.base_position = pose.translation.vector;
        self.base_orientation = pose.rotation.into_inner();
    }
}

/// Time derivative of a quaternion under a world-frame angular velocity:
/// `qd = 0.5 * (0, w) * q`.
pub fn quaternion_derivative(q: &Quaternion<f64>, omega: &Vector3<f64>) -> Quaternion<f64> {
    (Quaternion::from_imag(*omega) * q) * 0.5
}

/// Packs and unpacks the flat state vector for a fixed dof count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateLayout {
    n_dof: usize,
}

impl StateLayout {
    pub const fn new(n_dof: usize) -> Self {
        Self { n_dof }
    }

    pub const fn n_dof(&self) -> usize {
        self.n_dof
    }

    /// Length of the state vector, `2n + 13`.
    pub const fn len(&self) -> usize {
        2 * self.n_dof + BASE_POSE_LEN + BASE_VEL_LEN
    }

    /// Length of the generalized velocity, `n + 6`.
    pub const fn velocity_len(&self) -> usize {
        self.n_dof + BASE_VEL_LEN
    }

    pub fn decode(&self, chi: &DVector<f64>) -> Result<DynamicState> {
        check_len("state vector", self.len(), chi.len())?;
        let n = self.n_dof;
        let vel = BASE_POSE_LEN + n;
        Ok(DynamicState {
            base_position: chi.fixed_rows::<3>(0).into_owned(),
            base_orientation: Quaternion::new(chi[3], chi[4], chi[5], chi[6]),
            joint_positions: chi.rows(BASE_POSE_LEN, n).into_owned(),
            base_linear_velocity: chi.fixed_rows::<3>(vel).into_owned(),
            base_angular_velocity: chi.fixed_rows::<3>(vel + 3).into_owned(),
            joint_velocities: chi.rows(vel + BASE_VEL_LEN, n).into_owned(),
        })
    }

    pub fn encode(&self, state: &DynamicState) -> Result<DVector<f64>> {
        self.check_state(state)?;
        let q = &state.base_orientation;
        let mut chi = DVector::zeros(self.len());
        chi.fixed_rows_mut::<3>(0).copy_from(&state.base_position);
        chi[3] = q.w;
        chi[4] = q.i;
        chi[5] = q.j;
        chi[6] = q.k;
        chi.rows_mut(BASE_POSE_LEN, self.n_dof)
            .copy_from(&state.joint_positions);
        chi.rows_mut(BASE_POSE_LEN + self.n_dof, self.velocity_len())
            .copy_from(&state.generalized_velocity());
        Ok(chi)
    }

    /// `dchi/dt` from the current state and the generalized acceleration.
    pub fn encode_derivative(
        &self,
        state: &DynamicState,
        acceleration: &DVector<f64>,
    ) -> Result<DVector<f64>> {
        self.check_state(state)?;
        check_len("generalized acceleration", self.velocity_len(), acceleration.len())?;
        let q_dot = quaternion_derivative(&state.base_orientation, &state.base_angular_velocity);
        let mut d = DVector::zeros(self.len());
        d.fixed_rows_mut::<3>(0)
            .copy_from(&state.base_linear_velocity);
        d[3] = q_dot.w;
        d[4] = q_dot.i;
        d[5] = q_dot.j;
        d[6] = q_dot.k;
        d.rows_mut(BASE_POSE_LEN, self.n_dof)
            .copy_from(&state.joint_velocities);
        d.rows_mut(BASE_POSE_LEN + self.n_dof, self.velocity_len())
            .copy_from(acceleration);
        Ok(d)
    }

    fn check_state(&self, state: &DynamicState) -> Result<()> {
        check_len("joint positions", self.n_dof, state.joint_positions.len())?;
        check_len("joint velocities", self.n_dof, state.joint_velocities.len())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn sample_chi(layout: &StateLayout) -> DVector<f64> {
        DVector::from_fn(layout.len(), |i, _| 0.1 * i as f64 - 0.37)
    }

    #[test]
    fn decode_encode_roundtrip_test() {
        let layout = StateLayout::new(4);
        let chi = sample_chi(&layout);
        let state = layout.decode(&chi).unwrap();
        assert_eq!(layout.encode(&state).unwrap(), chi);
    }

    #[test]
    fn decode_names_components_test() {
        let layout = StateLayout::new(2);
        let chi = DVector::from_vec(vec![
            1., 2., 3., // position
            0.5, 0.5, 0.5, 0.5, // quaternion
            10., 11., // joints
            4., 5., 6., // linear
            7., 8., 9., // angular
            12., 13., // joint rates
        ]);
        let s = layout.decode(&chi).unwrap();
        assert_eq!(s.base_position, Vector3::new(1., 2., 3.));
        assert_eq!(s.base_orientation.w, 0.5);
        assert_eq!(s.joint_positions.as_slice(), &[10., 11.]);
        assert_eq!(s.base_linear_velocity, Vector3::new(4., 5., 6.));
        assert_eq!(s.base_angular_velocity, Vector3::new(7., 8., 9.));
        assert_eq!(s.joint_velocities.as_slice(), &[12., 13.]);
        assert_eq!(
            s.generalized_velocity().as_slice(),
            &[4., 5., 6., 7., 8., 9., 12., 13.]
        );
    }

    #[test]
    fn length_mismatch_test() {
        let layout = StateLayout::new(25);
        assert_eq!(layout.len(), 63);
        let err = layout.decode(&DVector::zeros(62)).unwrap_err();
        assert!(matches!(
            err,
            SimError::DimensionMismatch {
                expected: (63, 1),
                found: (62, 1),
                ..
            }
        ));
    }

    #[test]
    fn quaternion_derivative_test() {
        let q = Quaternion::identity();
        let d = quaternion_derivative(&q, &Vector3::new(0., 0., 1.));
        assert_relative_eq!(d.w, 0.0);
        assert_relative_eq!(d.k, 0.5);
        assert_relative_eq!(d.i, 0.0);

        // integrating the derivative keeps the rotation about the same axis
        let dt = 1e-4;
        let next = UnitQuaternion::from_quaternion(q + d * dt);
        assert_relative_eq!(next.angle(), dt, epsilon = 1e-9);
    }

    #[test]
    fn encode_derivative_test() {
        let layout = StateLayout::new(1);
        let mut state = DynamicState::at_rest(1);
        state.base_linear_velocity = Vector3::new(1., 0., 0.);
        state.base_angular_velocity = Vector3::new(0., 0., 2.);
        state.joint_velocities[0] = 3.;
        let acc = DVector::from_vec(vec![0., 0., -9.81, 0., 0., 0., 4.]);
        let d = layout.encode_derivative(&state, &acc).unwrap();
        assert_eq!(d.len(), layout.len());
        assert_eq!(d[0], 1.);
        // orientation part comes from the kinematic map, not the raw rate
        assert_relative_eq!(d[6], 1.0);
        assert_eq!(d[7], 3.);
        assert_eq!(d.rows(8, 7), acc.rows(0, 7));
    }

    #[test]
    fn degenerate_orientation_test() {
        let mut state = DynamicState::at_rest(0);
        state.base_orientation = Quaternion::new(0., 0., 0., 0.);
        assert!(matches!(
            state.base_pose(),
            Err(SimError::DegenerateOrientation)
        ));
    }
}
