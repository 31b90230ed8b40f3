use ode_solvers::dop_shared::{IntegrationError, OutputType};
use ode_solvers::Dopri5;

use super::{Method, RateLaw, SolverOptions, SolverStats, Stepper, T, V};
use crate::error::KineticsError;

type State = V;
type Time = T;

// Step-size controller defaults of `ode_solvers`
const SAFETY_FACTOR: f64 = 0.9;
const BETA: f64 = 0.04;
const FAC_MIN: f64 = 0.2;
const FAC_MAX: f64 = 10.0;
const N_STIFF: u32 = 1000;

/// Adapts a [RateLaw] to the `ode_solvers` system interface
struct Model<'a, R: RateLaw + ?Sized> {
    law: &'a R,
}

impl<'a, R: RateLaw + ?Sized> ode_solvers::System<Time, State> for Model<'a, R> {
    fn system(&self, t: Time, y: &State, dy: &mut State) {
        self.law.evaluate(t, y, dy)
    }
}

/// Explicit Dormand–Prince integration delegated to `ode_solvers`
pub(crate) struct Dopri5Stepper<'a, R: RateLaw + ?Sized> {
    law: &'a R,
    options: &'a SolverOptions,
    span: (T, T),
    stats: SolverStats,
}

impl<'a, R: RateLaw + ?Sized> Dopri5Stepper<'a, R> {
    pub(crate) fn new(law: &'a R, options: &'a SolverOptions, span: (T, T)) -> Self {
        Dopri5Stepper {
            law,
            options,
            span,
            stats: SolverStats::default(),
        }
    }

    fn failure(&self, at: Option<T>, reason: impl Into<String>) -> KineticsError {
        KineticsError::Solver {
            method: Method::Dopri5,
            t_start: self.span.0,
            t_end: self.span.1,
            at,
            reason: reason.into(),
        }
    }
}

impl<'a, R: RateLaw + ?Sized> Stepper for Dopri5Stepper<'a, R> {
    fn advance(
        &mut self,
        t_from: T,
        t_to: T,
        y: V,
        every_step: bool,
    ) -> Result<Vec<(T, V)>, KineticsError> {
        let remaining = self.options.max_steps.saturating_sub(self.stats.steps);
        if remaining == 0 {
            return Err(self.failure(
                Some(t_from),
                format!("step budget of {} exhausted", self.options.max_steps),
            ));
        }
        let model = Model { law: self.law };
        // Sparse output records every accepted step, starting with the initial state
        let mut stepper = Dopri5::from_param(
            model,
            t_from,
            t_to,
            0.0,
            y,
            self.options.rtol,
            self.options.atol,
            SAFETY_FACTOR,
            BETA,
            FAC_MIN,
            FAC_MAX,
            self.options.h_max.min(t_to - t_from),
            self.options.h0,
            u32::try_from(remaining).unwrap_or(u32::MAX),
            N_STIFF,
            OutputType::Sparse,
        );
        let result = stepper.integrate();
        let results = stepper.results().get();
        if let Some(at) = first_non_finite(results.0, results.1) {
            return Err(self.failure(Some(at), "state became non-finite"));
        }
        let stats = match result {
            Ok(stats) => stats,
            Err(err) => {
                let at = match err {
                    IntegrationError::MaxNumStepReached { x, .. }
                    | IntegrationError::StepSizeUnderflow { x }
                    | IntegrationError::StiffnessDetected { x } => x,
                };
                return Err(self.failure(Some(at), err.to_string()));
            }
        };

        let (x_out, y_out) = results;
        let last = match y_out.last() {
            Some(last) => last.clone(),
            None => return Err(self.failure(Some(t_from), "no output produced")),
        };
        if last.iter().any(|v| !v.is_finite()) {
            return Err(self.failure(Some(t_to), "state became non-finite"));
        }

        self.stats.steps += (stats.accepted_steps + stats.rejected_steps) as usize;
        self.stats.accepted += stats.accepted_steps as usize;
        self.stats.rejected += stats.rejected_steps as usize;
        self.stats.rhs_evaluations += stats.num_eval as usize;

        let mut samples: Vec<(T, V)> = Vec::new();
        if every_step {
            samples.extend(
                x_out
                    .iter()
                    .zip(y_out.iter())
                    .filter(|&(&x, _)| x > t_from && x < t_to)
                    .map(|(&x, y)| (x, y.clone())),
            );
        }
        samples.push((t_to, last));
        Ok(samples)
    }

    fn stats(&self) -> SolverStats {
        self.stats
    }
}

/// Time of the first recorded sample holding a non-finite value
fn first_non_finite(times: &[T], states: &[V]) -> Option<T> {
    times
        .iter()
        .zip(states)
        .find(|(_, y)| y.iter().any(|v| !v.is_finite()))
        .map(|(&t, _)| t)
}
