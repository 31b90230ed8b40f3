use std::cell::Cell;

use diffsol::{
    NalgebraLU, NalgebraMat, NalgebraVec, OdeBuilder, OdeSolverMethod, OdeSolverStopReason,
    VectorHost,
};

use super::{Method, RateLaw, SolverOptions, SolverStats, Stepper, T, V};
use crate::error::KineticsError;

type DM = NalgebraMat<T>;
type DV = NalgebraVec<T>;
type LS = NalgebraLU<T>;

/// Variable-order BDF integration delegated to `diffsol`
///
/// Each interval between two output times is solved as its own initial value problem, starting
/// from the state reached at the end of the previous one.
pub(crate) struct BdfStepper<'a, R: RateLaw + ?Sized> {
    law: &'a R,
    options: &'a SolverOptions,
    span: (T, T),
    stats: SolverStats,
}

impl<'a, R: RateLaw + ?Sized> BdfStepper<'a, R> {
    pub(crate) fn new(law: &'a R, options: &'a SolverOptions, span: (T, T)) -> Self {
        BdfStepper {
            law,
            options,
            span,
            stats: SolverStats::default(),
        }
    }

    fn failure(&self, at: Option<T>, reason: impl Into<String>) -> KineticsError {
        KineticsError::Solver {
            method: Method::Bdf,
            t_start: self.span.0,
            t_end: self.span.1,
            at,
            reason: reason.into(),
        }
    }
}

impl<'a, R: RateLaw + ?Sized> Stepper for BdfStepper<'a, R> {
    fn advance(
        &mut self,
        t_from: T,
        t_to: T,
        y: V,
        every_step: bool,
    ) -> Result<Vec<(T, V)>, KineticsError> {
        let law = self.law;
        let nstates = y.len();
        let evaluations = Cell::new(0usize);
        // Time of the first derivative that came back non-finite from a finite state
        let non_finite = Cell::new(None::<T>);

        let derivative = |t: T, x: &[T]| -> V {
            let state = V::from_column_slice(x);
            let mut dy = V::zeros(nstates);
            law.evaluate(t, &state, &mut dy);
            evaluations.set(evaluations.get() + 1);
            if non_finite.get().is_none()
                && state.iter().all(|v| v.is_finite())
                && dy.iter().any(|v| !v.is_finite())
            {
                non_finite.set(Some(t));
            }
            dy
        };

        let mut builder = OdeBuilder::<DM>::new()
            .t0(t_from)
            .rtol(self.options.rtol)
            .atol([self.options.atol]);
        if self.options.h0 > 0.0 {
            builder = builder.h0(self.options.h0);
        }
        let problem = builder
            .rhs_implicit(
                |x: &DV, _p: &DV, t: T, dy: &mut DV| {
                    dy.as_mut_slice()
                        .copy_from_slice(derivative(t, x.as_slice()).as_slice());
                },
                |x: &DV, _p: &DV, t: T, v: &DV, jv: &mut DV| {
                    jacobian_action(&derivative, t, x.as_slice(), v.as_slice(), jv.as_mut_slice());
                },
            )
            .init(
                |_p: &DV, _t: T, y0: &mut DV| y0.as_mut_slice().copy_from_slice(y.as_slice()),
                nstates,
            )
            .build()
            .map_err(|err| self.failure(Some(t_from), err.to_string()))?;

        let mut solver = problem
            .bdf::<LS>()
            .map_err(|err| self.failure(Some(t_from), err.to_string()))?;
        solver
            .set_stop_time(t_to)
            .map_err(|err| self.failure(Some(t_from), err.to_string()))?;

        let mut samples: Vec<(T, V)> = Vec::new();
        loop {
            if self.stats.steps >= self.options.max_steps {
                return Err(self.failure(
                    Some(solver.state().t),
                    format!("step budget of {} exhausted", self.options.max_steps),
                ));
            }
            let reason = solver.step();
            self.stats.steps += 1;
            if let Some(at) = non_finite.get() {
                return Err(self.failure(Some(at), "rate law returned a non-finite derivative"));
            }
            let reason = reason.map_err(|err| self.failure(Some(solver.state().t), err.to_string()))?;

            let state = solver.state();
            if state.y.as_slice().iter().any(|v| !v.is_finite()) {
                return Err(self.failure(Some(state.t), "state became non-finite"));
            }
            match reason {
                OdeSolverStopReason::TstopReached => {
                    samples.push((t_to, V::from_column_slice(state.y.as_slice())));
                    break;
                }
                _ => {
                    if state.h.abs() < self.options.h_min {
                        return Err(self.failure(
                            Some(state.t),
                            format!("step size {:e} fell below h_min", state.h.abs()),
                        ));
                    }
                    if every_step && state.t < t_to {
                        samples.push((state.t, V::from_column_slice(state.y.as_slice())));
                    }
                }
            }
        }

        let statistics = solver.get_statistics();
        self.stats.accepted += statistics.number_of_steps;
        self.stats.rejected += statistics.number_of_error_test_failures;
        self.stats.rhs_evaluations += evaluations.get();
        Ok(samples)
    }

    fn stats(&self) -> SolverStats {
        self.stats
    }
}

/// Forward-difference approximation of `J(x) v`
///
/// Rate laws only provide the derivative, so the directional derivative along `v` is estimated
/// with a step scaled to the magnitude of the state.
fn jacobian_action<F>(derivative: &F, t: T, x: &[T], v: &[T], jv: &mut [T])
where
    F: Fn(T, &[T]) -> V,
{
    let v_norm = v.iter().fold(0.0_f64, |acc, value| acc.max(value.abs()));
    if v_norm == 0.0 {
        jv.fill(0.0);
        return;
    }
    let x_norm = x.iter().fold(0.0_f64, |acc, value| acc.max(value.abs()));
    let delta = f64::EPSILON.sqrt() * x_norm.max(1e-10) / v_norm;

    let shifted: Vec<T> = x.iter().zip(v).map(|(xi, vi)| xi + delta * vi).collect();
    let base = derivative(t, x);
    let forward = derivative(t, &shifted);
    for (out, (f, b)) in jv.iter_mut().zip(forward.iter().zip(base.iter())) {
        *out = (f - b) / delta;
    }
}
