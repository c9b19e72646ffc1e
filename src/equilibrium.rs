//! Consistent initial states and constraint sets.

use nalgebra::DVector;

use crate::constraint::{ConstraintSet, EndEffector, PointConstraint};
use crate::error::{check_len, Result};
use crate::model::RigidBodyModel;
use crate::state::DynamicState;

/// State at rest in `posture` with the `support` frame at the world origin.
///
/// The base pose is `T_bf^-1`, `T_bf` being the support frame pose with the
/// base at the identity.
pub fn standing_state<M>(model: &M, posture: &DVector<f64>, support: EndEffector) -> Result<DynamicState>
where
    M: RigidBodyModel + ?Sized,
{
    let n = model.dof();
    check_len("posture", n, posture.len())?;
    let mut state = DynamicState::at_rest(n);
    state.joint_positions.copy_from(posture);

    let query = model.evaluate(&state)?;
    let base_to_support = query.forward_kinematics(support)?;
    state.set_base_pose(&base_to_support.inverse());
    Ok(state)
}

/// Holds every point of `points` at its pose in `state`.
pub fn hold_current<M>(
    model: &M,
    state: &DynamicState,
    points: &[EndEffector],
    pose_correction: bool,
) -> Result<ConstraintSet>
where
    M: RigidBodyModel + ?Sized,
{
    let query = model.evaluate(state)?;
    points
        .iter()
        .try_fold(
            ConstraintSet::free().with_pose_correction(pose_correction),
            |set, &point| {
                let pose = *query.forward_kinematics(point)?;
                Ok(set.with_point(point, PointConstraint::hold(pose)))
            },
        )
}
