//! Fixed-step integration of `dx/dt = f(t, x)`.
//!
//! RK4:
//!
//! ```text
//! k1 = f(t, x)
//! k2 = f(t + h/2, x + h/2 k1)
//! k3 = f(t + h/2, x + h/2 k2)
//! k4 = f(t + h, x + h k3)
//! x' = x + h/6 (k1 + 2 k2 + 2 k3 + k4)
//! ```

use nalgebra::DVector;
use rayon::prelude::*;

use crate::error::{check_len, Result, SimError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Method {
    ExplicitEuler,
    #[default]
    Rk4,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IntegratorSettings {
    /// Largest step, seconds. The span is divided into equal steps.
    pub step: f64,
    pub method: Method,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            step: 1e-3,
            method: Method::Rk4,
        }
    }
}

impl IntegratorSettings {
    #[must_use]
    pub const fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    #[must_use]
    pub const fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }
}

/// Sampled solution, one state per time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    pub times: Vec<f64>,
    pub states: Vec<DVector<f64>>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn last(&self) -> Option<(f64, &DVector<f64>)> {
        self.times.last().copied().zip(self.states.last())
    }

    fn push(&mut self, t: f64, x: DVector<f64>) {
        self.times.push(t);
        self.states.push(x);
    }
}

fn derivative<F>(rhs: &F, t: f64, x: &DVector<f64>) -> Result<DVector<f64>>
where
    F: Fn(f64, &DVector<f64>) -> Result<DVector<f64>>,
{
    let dx = rhs(t, x)?;
    check_len("state derivative", x.len(), dx.len())?;
    Ok(dx)
}

/// Advances `x` from `t` by `h`.
pub fn step<F>(rhs: &F, t: f64, x: &DVector<f64>, h: f64, method: Method) -> Result<DVector<f64>>
where
    F: Fn(f64, &DVector<f64>) -> Result<DVector<f64>>,
{
    match method {
        Method::ExplicitEuler => Ok(x + derivative(rhs, t, x)? * h),
        Method::Rk4 => {
            let half = 0.5 * h;
            let k1 = derivative(rhs, t, x)?;
            let k2 = derivative(rhs, t + half, &(x + &k1 * half))?;
            let k3 = derivative(rhs, t + half, &(x + &k2 * half))?;
            let k4 = derivative(rhs, t + h, &(x + &k3 * h))?;
            Ok(x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (h / 6.0))
        }
    }
}

/// Integrates over `span = (t0, t1)` and records every step.
pub fn integrate<F>(
    rhs: F,
    span: (f64, f64),
    x0: DVector<f64>,
    settings: &IntegratorSettings,
) -> Result<Trajectory>
where
    F: Fn(f64, &DVector<f64>) -> Result<DVector<f64>>,
{
    let (t0, t1) = span;
    if !(settings.step.is_finite() && settings.step > 0.0) {
        return Err(SimError::integration(format!(
            "step must be positive and finite, got {}",
            settings.step
        )));
    }
    if !(t0.is_finite() && t1.is_finite()) || t1 < t0 {
        return Err(SimError::integration(format!(
            "invalid time span [{t0}, {t1}]"
        )));
    }
    if x0.iter().any(|v| !v.is_finite()) {
        return Err(SimError::integration("initial state is not finite"));
    }

    let duration = t1 - t0;
    // k whole steps within rounding take k steps, any positive span at least one
    let ratio = duration / settings.step;
    let steps = if duration > 0.0 {
        (ratio * (1.0 - 1e-9)).ceil().max(1.0) as usize
    } else {
        0
    };
    tracing::info!(
        t0,
        t1,
        steps,
        method = ?settings.method,
        dim = x0.len(),
        "integration started"
    );

    let mut trajectory = Trajectory::default();
    trajectory.push(t0, x0);
    if steps == 0 {
        return Ok(trajectory);
    }
    let h = duration / steps as f64;
    for k in 0..steps {
        let (t, x) = trajectory
            .last()
            .ok_or_else(|| SimError::integration("empty trajectory"))?;
        let next = step(&rhs, t, x, h, settings.method)?;
        // land exactly on t1
        let t_next = if k + 1 == steps {
            t1
        } else {
            t0 + (k + 1) as f64 * h
        };
        if next.iter().any(|v| !v.is_finite()) {
            tracing::warn!(t = t_next, "state became non-finite, aborting integration");
            return Err(SimError::integration(format!(
                "state became non-finite at t = {t_next}"
            )));
        }
        trajectory.push(t_next, next);
    }

    tracing::info!(t1, samples = trajectory.len(), "integration finished");
    Ok(trajectory)
}

/// Integrates one trajectory per initial state in parallel.
///
/// `factory(i)` builds the right-hand side of trajectory `i`, so every worker
/// owns its own dynamics and model instance.
pub fn simulate_batch<F, R>(
    initial: &[DVector<f64>],
    span: (f64, f64),
    settings: &IntegratorSettings,
    factory: F,
) -> Vec<Result<Trajectory>>
where
    F: Fn(usize) -> Result<R> + Sync,
    R: Fn(f64, &DVector<f64>) -> Result<DVector<f64>>,
{
    initial
        .par_iter()
        .enumerate()
        .map(|(i, x0)| {
            let rhs = factory(i)?;
            integrate(rhs, span, x0.clone(), settings)
        })
        .collect()
}
