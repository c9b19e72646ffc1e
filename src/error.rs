//! Error types for the simulation core.

use thiserror::Error;

use crate::constraint::EndEffector;
use crate::controller::ControllerError;

/// Errors raised while building a model or evaluating the dynamics.
///
/// Numerical ill-conditioning is not an error: the solver absorbs it with a
/// damped pseudo-inverse.
#[derive(Debug, Error)]
pub enum SimError {
    /// A matrix or vector does not have the shape implied by the dof count
    /// or by the number of active constraint rows.
    #[error("dimension mismatch in {what}: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        /// The quantity that was checked.
        what: &'static str,
        /// Expected (rows, cols).
        expected: (usize, usize),
        /// Actual (rows, cols).
        found: (usize, usize),
    },

    /// The constraint configuration cannot be used as requested.
    #[error("constraint configuration error: {0}")]
    ConstraintConfig(String),

    /// The injected torque controller failed.
    #[error("torque controller failed: {0}")]
    Controller(#[source] ControllerError),

    /// No frame is registered for the requested end-effector.
    #[error("no frame registered for end-effector {0:?}")]
    UnknownPoint(EndEffector),

    /// A link name did not resolve.
    #[error("unknown link: {0}")]
    UnknownLink(String),

    /// The URDF description could not be turned into a model.
    #[error("urdf error: {0}")]
    Urdf(String),

    /// Reading a robot description failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The base orientation quaternion has (close to) zero norm.
    #[error("base orientation quaternion is degenerate")]
    DegenerateOrientation,

    /// The integrator driver could not advance the state.
    #[error("integration failed: {0}")]
    Integration(String),
}

impl SimError {
    /// Shape mismatch of a matrix.
    #[must_use]
    pub const fn dimension_mismatch(
        what: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    ) -> Self {
        Self::DimensionMismatch {
            what,
            expected,
            found,
        }
    }

    /// Length mismatch of a column vector.
    #[must_use]
    pub const fn length_mismatch(what: &'static str, expected: usize, found: usize) -> Self {
        Self::DimensionMismatch {
            what,
            expected: (expected, 1),
            found: (found, 1),
        }
    }

    /// Inconsistent constraint configuration.
    #[must_use]
    pub fn constraint_config(reason: impl Into<String>) -> Self {
        Self::ConstraintConfig(reason.into())
    }

    /// Integrator failure.
    #[must_use]
    pub fn integration(reason: impl Into<String>) -> Self {
        Self::Integration(reason.into())
    }
}

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;

/// Checks a vector length, reporting `what` on mismatch.
pub(crate) fn check_len(what: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(SimError::length_mismatch(what, expected, found))
    }
}

/// Checks a matrix shape, reporting `what` on mismatch.
pub(crate) fn check_shape(
    what: &'static str,
    expected: (usize, usize),
    found: (usize, usize),
) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(SimError::dimension_mismatch(what, expected, found))
    }
}
