//! Spatial algebra on `[angular; linear]` twists and `[moment; force]`
//! wrenches, plus the maps between spatial twists and the mixed
//! `[linear; angular]` point velocities used at the interface.

use liealg::{Group, SE3};
use nalgebra::{Isometry3, Matrix3, Matrix6, Vector3, Vector6};

pub(super) fn to_local_spatial_inertial(
    inertia_frame: &SE3<f64>,
    inertia: &Matrix3<f64>,
    mass: f64,
) -> Matrix6<f64> {
    // rotational block first, matching the twist ordering
    let mut i_b = Matrix6::from_diagonal_element(mass);
    i_b.fixed_view_mut::<3, 3>(0, 0).copy_from(inertia);
    let b_t_a = inertia_frame.inv();
    let adj_b_t_a = Matrix6::from_column_slice(b_t_a.adjoint().as_slice());
    adj_b_t_a.transpose() * i_b * adj_b_t_a
}

pub fn twist(angular: &Vector3<f64>, linear: &Vector3<f64>) -> Vector6<f64> {
    let mut v = Vector6::zeros();
    v.fixed_rows_mut::<3>(0).copy_from(angular);
    v.fixed_rows_mut::<3>(3).copy_from(linear);
    v
}

/// Adjoint of a pose: `[[R, 0], [[p]R, R]]`.
pub fn adjoint(pose: &Isometry3<f64>) -> Matrix6<f64> {
    let r = pose.rotation.to_rotation_matrix().into_inner();
    let p = pose.translation.vector.cross_matrix();
    let mut ad = Matrix6::zeros();
    ad.fixed_view_mut::<3, 3>(0, 0).copy_from(&r);
    ad.fixed_view_mut::<3, 3>(3, 0).copy_from(&(p * r));
    ad.fixed_view_mut::<3, 3>(3, 3).copy_from(&r);
    ad
}

/// Lie bracket operator, `ad(V1) V2 = [V1, V2]`.
pub fn ad(v: &Vector6<f64>) -> Matrix6<f64> {
    let w = v.fixed_rows::<3>(0).cross_matrix();
    let u = v.fixed_rows::<3>(3).cross_matrix();
    let mut m = Matrix6::zeros();
    m.fixed_view_mut::<3, 3>(0, 0).copy_from(&w);
    m.fixed_view_mut::<3, 3>(3, 0).copy_from(&u);
    m.fixed_view_mut::<3, 3>(3, 3).copy_from(&w);
    m
}

/// Spatial twist of the base from its mixed velocity `[v_B; w_B]`,
/// with `p` the world position of the base origin.
pub(crate) fn base_twist_map(p: &Vector3<f64>) -> Matrix6<f64> {
    let mut x = Matrix6::zeros();
    x.fixed_view_mut::<3, 3>(0, 3).copy_from(&Matrix3::identity());
    x.fixed_view_mut::<3, 3>(3, 0).copy_from(&Matrix3::identity());
    x.fixed_view_mut::<3, 3>(3, 3).copy_from(&p.cross_matrix());
    x
}

/// Mixed velocity `[v_p; w]` of the body point at world position `p`
/// from the body's spatial twist.
pub(crate) fn point_velocity_map(p: &Vector3<f64>) -> Matrix6<f64> {
    let mut y = Matrix6::zeros();
    y.fixed_view_mut::<3, 3>(0, 0).copy_from(&(-p.cross_matrix()));
    y.fixed_view_mut::<3, 3>(0, 3).copy_from(&Matrix3::identity());
    y.fixed_view_mut::<3, 3>(3, 0).copy_from(&Matrix3::identity());
    y
}
