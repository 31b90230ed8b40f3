pub mod bdf;
pub mod dopri;

use std::fmt;

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::KineticsError;
use crate::models::species::{index_of, Species};

pub type T = f64;
pub type V = nalgebra::DVector<T>;

/// Right-hand side of a kinetics ODE system
///
/// Implementations must be pure: the derivative written into `dy` depends only on `t`, `y` and the
/// immutable state of the evaluator. `y` and `dy` follow the order of [RateLaw::species].
pub trait RateLaw {
    fn species(&self) -> &'static [Species];

    fn evaluate(&self, t: T, y: &V, dy: &mut V);

    fn dimension(&self) -> usize {
        self.species().len()
    }
}

/// Integration method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Variable-order BDF from `diffsol`, suited to stiff systems
    #[default]
    Bdf,
    /// Explicit Dormand–Prince 5(4), only for non-stiff problems
    Dopri5,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Bdf => write!(f, "BDF"),
            Method::Dopri5 => write!(f, "Dopri5"),
        }
    }
}

/// Solver configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct SolverOptions {
    pub method: Method,
    /// Relative tolerance
    pub rtol: f64,
    /// Absolute tolerance, in M
    pub atol: f64,
    /// Initial step size; 0 selects one automatically
    pub h0: f64,
    /// Smallest step size before the solver gives up, only checked by [Method::Bdf]
    pub h_min: f64,
    /// Largest step size, only honoured by [Method::Dopri5]
    pub h_max: f64,
    /// Maximum number of attempted steps over the whole span
    pub max_steps: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            method: Method::Bdf,
            rtol: 1e-6,
            atol: 1e-12,
            h0: 0.0,
            h_min: 1e-12,
            h_max: f64::MAX,
            max_steps: 200_000,
        }
    }
}

impl SolverOptions {
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_tolerances(mut self, rtol: f64, atol: f64) -> Self {
        self.rtol = rtol;
        self.atol = atol;
        self
    }

    pub fn validate(&self) -> Result<(), KineticsError> {
        for (name, value) in [("rtol", self.rtol), ("atol", self.atol)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(KineticsError::InvalidParameter { name, value });
            }
        }
        if !(self.h0.is_finite() && self.h0 >= 0.0) {
            return Err(KineticsError::InvalidParameter {
                name: "h0",
                value: self.h0,
            });
        }
        if !(self.h_min.is_finite() && self.h_min > 0.0) {
            return Err(KineticsError::InvalidParameter {
                name: "h_min",
                value: self.h_min,
            });
        }
        if !(self.h_max > self.h_min) {
            return Err(KineticsError::InvalidParameter {
                name: "h_max",
                value: self.h_max,
            });
        }
        if self.max_steps == 0 {
            return Err(KineticsError::InvalidParameter {
                name: "max_steps",
                value: 0.0,
            });
        }
        Ok(())
    }
}

/// Counters collected while integrating
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolverStats {
    pub steps: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub rhs_evaluations: usize,
}

/// Discretized solution of an ODE system
///
/// `states` holds one row per sample, one column per species.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    species: &'static [Species],
    times: Vec<T>,
    states: Array2<T>,
}

impl Trajectory {
    fn from_samples(species: &'static [Species], samples: Vec<(T, V)>) -> Self {
        let nstates = species.len();
        let mut states = Array2::<T>::zeros((samples.len(), nstates));
        let mut times = Vec::with_capacity(samples.len());
        for (row, (t, y)) in samples.into_iter().enumerate() {
            times.push(t);
            for (col, value) in y.iter().enumerate() {
                states[[row, col]] = *value;
            }
        }
        Trajectory {
            species,
            times,
            states,
        }
    }

    pub fn species(&self) -> &'static [Species] {
        self.species
    }

    pub fn times(&self) -> &[T] {
        &self.times
    }

    pub fn states(&self) -> &Array2<T> {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// State at sample `index`, in species order
    pub fn state(&self, index: usize) -> Option<ArrayView1<'_, T>> {
        (index < self.len()).then(|| self.states.row(index))
    }

    /// Time course of a single species
    pub fn column(&self, species: Species) -> Option<ArrayView1<'_, T>> {
        index_of(self.species, species).map(|i| self.states.column(i))
    }

    pub fn last(&self) -> Option<(T, ArrayView1<'_, T>)> {
        let index = self.len().checked_sub(1)?;
        Some((self.times[index], self.states.row(index)))
    }
}

/// Advances an ODE solution between two times
pub(crate) trait Stepper {
    /// Integrates from `t_from` to `t_to` starting at `y`
    ///
    /// Returns the accepted steps after `t_from` when `every_step` is set, otherwise only the
    /// final state. The last sample is always at exactly `t_to`.
    fn advance(
        &mut self,
        t_from: T,
        t_to: T,
        y: V,
        every_step: bool,
    ) -> Result<Vec<(T, V)>, KineticsError>;

    fn stats(&self) -> SolverStats;
}

/// Integrates `rate_law` over the closed interval `t_span`
///
/// With `evaluation_times` the trajectory holds exactly those samples, preceded by `t_span.0`
/// when it is not the first requested time. Without them every accepted solver step is
/// returned. The first sample is always `t_span.0` with `y0` unchanged.
///
/// All inputs are checked before the first step. A solver failure discards the partial
/// solution.
pub fn solve<R: RateLaw + ?Sized>(
    rate_law: &R,
    t_span: (T, T),
    y0: &V,
    evaluation_times: Option<&[T]>,
    options: &SolverOptions,
) -> Result<Trajectory, KineticsError> {
    let species = rate_law.species();
    if species.is_empty() {
        return Err(KineticsError::EmptyRateLaw);
    }
    if y0.len() != species.len() {
        return Err(KineticsError::InitialStateLength {
            expected: species.len(),
            found: y0.len(),
        });
    }
    let (t0, t1) = t_span;
    if !t0.is_finite() || !t1.is_finite() || t0 > t1 {
        return Err(KineticsError::InvalidTimeSpan { start: t0, end: t1 });
    }
    options.validate()?;

    let targets = match evaluation_times {
        Some(times) => check_evaluation_times(times, t_span)?,
        None => vec![t1],
    };
    let every_step = evaluation_times.is_none();

    tracing::debug!(
        "Integrating {} species over [{}, {}] with {}",
        species.len(),
        t0,
        t1,
        options.method
    );

    let mut samples = vec![(t0, y0.clone())];
    if t0 == t1 {
        return Ok(Trajectory::from_samples(species, samples));
    }

    let mut stepper: Box<dyn Stepper + '_> = match options.method {
        Method::Bdf => Box::new(bdf::BdfStepper::new(rate_law, options, t_span)),
        Method::Dopri5 => Box::new(dopri::Dopri5Stepper::new(rate_law, options, t_span)),
    };

    let mut t = t0;
    let mut y = y0.clone();
    for target in targets {
        if target == t {
            continue;
        }
        let segment = match stepper.advance(t, target, y.clone(), every_step) {
            Ok(segment) => segment,
            Err(err) => {
                tracing::error!("Integration failed: {}", err);
                return Err(err);
            }
        };
        if let Some((_, last)) = segment.last() {
            y = last.clone();
        }
        t = target;
        samples.extend(segment);
    }

    let stats = stepper.stats();
    tracing::debug!(
        "Integration finished with {} samples ({} accepted, {} rejected steps, {} rhs evaluations)",
        samples.len(),
        stats.accepted,
        stats.rejected,
        stats.rhs_evaluations
    );

    Ok(Trajectory::from_samples(species, samples))
}

fn check_evaluation_times(times: &[T], t_span: (T, T)) -> Result<Vec<T>, KineticsError> {
    let (t0, t1) = t_span;
    if times.is_empty() {
        return Err(KineticsError::InvalidEvaluationTimes(
            "no evaluation times given".to_string(),
        ));
    }
    for window in times.windows(2) {
        if !(window[1] > window[0]) {
            return Err(KineticsError::InvalidEvaluationTimes(format!(
                "times must be strictly increasing, found {} after {}",
                window[1], window[0]
            )));
        }
    }
    if let Some(outside) = times.iter().find(|&&t| !(t >= t0 && t <= t1)) {
        return Err(KineticsError::InvalidEvaluationTimes(format!(
            "{} lies outside [{}, {}]",
            outside, t0, t1
        )));
    }
    Ok(times.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::species::DEGRADATION_SPECIES;

    /// dy0/dt = -k y0, dy1/dt = k y0
    struct Decay {
        k: f64,
    }

    impl RateLaw for Decay {
        fn species(&self) -> &'static [Species] {
            &DEGRADATION_SPECIES
        }

        fn evaluate(&self, _t: T, y: &V, dy: &mut V) {
            dy[0] = -self.k * y[0];
            dy[1] = self.k * y[0];
        }
    }

    /// Linear growth that stops being defined after `breakdown`
    struct Breakdown {
        breakdown: f64,
    }

    impl RateLaw for Breakdown {
        fn species(&self) -> &'static [Species] {
            &DEGRADATION_SPECIES
        }

        fn evaluate(&self, t: T, _y: &V, dy: &mut V) {
            let rate = if t > self.breakdown { f64::NAN } else { 1.0 };
            dy[0] = rate;
            dy[1] = 0.0;
        }
    }

    struct Empty;

    impl RateLaw for Empty {
        fn species(&self) -> &'static [Species] {
            &[]
        }

        fn evaluate(&self, _t: T, _y: &V, _dy: &mut V) {}
    }

    #[test]
    fn first_sample_is_initial_state() {
        let y0 = V::from_vec(vec![1e-3, 2e-4]);
        for method in [Method::Bdf, Method::Dopri5] {
            let options = SolverOptions::default().with_method(method);
            let trajectory = solve(&Decay { k: 0.5 }, (0.0, 10.0), &y0, None, &options).unwrap();
            assert_eq!(trajectory.times()[0], 0.0);
            assert_eq!(trajectory.state(0).unwrap().to_vec(), vec![1e-3, 2e-4]);
            assert_eq!(trajectory.last().unwrap().0, 10.0);
            assert!(trajectory.len() > 2, "{method} returned only the end points");
            for window in trajectory.times().windows(2) {
                assert!(window[1] > window[0], "{method}: {window:?}");
            }
        }
    }

    #[test]
    fn bdf_matches_exponential_decay() {
        let y0 = V::from_vec(vec![1.0, 0.0]);
        let times: Vec<f64> = (0..=10).map(|i| i as f64).collect();
        let options = SolverOptions::default().with_tolerances(1e-8, 1e-10);
        let trajectory = solve(&Decay { k: 0.3 }, (0.0, 10.0), &y0, Some(&times), &options).unwrap();
        assert_eq!(trajectory.times(), times.as_slice());
        for (i, &t) in times.iter().enumerate() {
            let exact = (-0.3 * t).exp();
            let state = trajectory.state(i).unwrap();
            assert!((state[0] - exact).abs() < 1e-4, "t = {t}");
            assert!((state[0] + state[1] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn bdf_is_stable_on_stiff_decay() {
        let y0 = V::from_vec(vec![1.0, 0.0]);
        let trajectory = solve(
            &Decay { k: 1e5 },
            (0.0, 100.0),
            &y0,
            Some(&[1.0, 50.0, 100.0]),
            &SolverOptions::default(),
        )
        .unwrap();
        let (_, last) = trajectory.last().unwrap();
        assert!(last[0].abs() < 1e-6);
        assert!((last[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn dopri_matches_exponential_decay() {
        let y0 = V::from_vec(vec![1.0, 0.0]);
        let options = SolverOptions::default().with_method(Method::Dopri5);
        let trajectory =
            solve(&Decay { k: 0.3 }, (0.0, 5.0), &y0, Some(&[2.5, 5.0]), &options).unwrap();
        assert_eq!(trajectory.times(), &[0.0, 2.5, 5.0]);
        let (_, last) = trajectory.last().unwrap();
        assert!((last[0] - (-1.5f64).exp()).abs() < 1e-5);
    }

    #[test]
    fn dopri_records_every_step_on_a_short_span() {
        let y0 = V::from_vec(vec![1.0, 0.0]);
        let options = SolverOptions::default().with_method(Method::Dopri5);
        let trajectory = solve(&Decay { k: 2.0 }, (0.0, 0.5), &y0, None, &options).unwrap();
        assert!(trajectory.len() > 2);
        assert_eq!(trajectory.last().unwrap().0, 0.5);
        let (_, last) = trajectory.last().unwrap();
        assert!((last[0] - (-1.0f64).exp()).abs() < 1e-5);
    }

    #[test]
    fn zero_length_span_returns_initial_state() {
        let y0 = V::from_vec(vec![3.0, 4.0]);
        for method in [Method::Bdf, Method::Dopri5] {
            let options = SolverOptions::default().with_method(method);
            let trajectory = solve(&Decay { k: 1.0 }, (2.0, 2.0), &y0, None, &options).unwrap();
            assert_eq!(trajectory.len(), 1);
            assert_eq!(trajectory.state(0).unwrap().to_vec(), vec![3.0, 4.0]);
        }
    }

    #[test]
    fn t0_is_prepended_to_evaluation_times() {
        let y0 = V::from_vec(vec![1.0, 0.0]);
        let trajectory = solve(
            &Decay { k: 1.0 },
            (0.0, 2.0),
            &y0,
            Some(&[1.0, 2.0]),
            &SolverOptions::default(),
        )
        .unwrap();
        assert_eq!(trajectory.times(), &[0.0, 1.0, 2.0]);
    }

    #[test]
    fn empty_rate_law_fails_fast() {
        let err = solve(&Empty, (0.0, 1.0), &V::zeros(0), None, &SolverOptions::default())
            .unwrap_err();
        assert_eq!(err, KineticsError::EmptyRateLaw);
        assert!(err.is_configuration());
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let law = Decay { k: 1.0 };
        let options = SolverOptions::default();
        let y0 = V::zeros(2);

        assert!(matches!(
            solve(&law, (0.0, 1.0), &V::zeros(3), None, &options),
            Err(KineticsError::InitialStateLength { expected: 2, found: 3 })
        ));
        assert!(matches!(
            solve(&law, (1.0, 0.0), &y0, None, &options),
            Err(KineticsError::InvalidTimeSpan { .. })
        ));
        assert!(matches!(
            solve(&law, (0.0, 1.0), &y0, Some(&[0.5, 0.5]), &options),
            Err(KineticsError::InvalidEvaluationTimes(_))
        ));
        assert!(matches!(
            solve(&law, (0.0, 1.0), &y0, Some(&[0.5, 2.0]), &options),
            Err(KineticsError::InvalidEvaluationTimes(_))
        ));
    }

    #[test]
    fn step_size_options_name_the_failing_field() {
        let cases = [
            (SolverOptions { h0: -1.0, ..SolverOptions::default() }, "h0"),
            (SolverOptions { h_min: 0.0, ..SolverOptions::default() }, "h_min"),
            (
                SolverOptions {
                    h_min: 1.0,
                    h_max: 0.5,
                    ..SolverOptions::default()
                },
                "h_max",
            ),
            (SolverOptions { max_steps: 0, ..SolverOptions::default() }, "max_steps"),
        ];
        for (options, field) in cases {
            match options.validate() {
                Err(KineticsError::InvalidParameter { name, .. }) => assert_eq!(name, field),
                other => panic!("expected {field} to be rejected, got {other:?}"),
            }
        }
        assert!(SolverOptions::default().validate().is_ok());
    }

    #[test]
    fn exhausted_step_budget_is_a_solver_error() {
        let options = SolverOptions {
            max_steps: 3,
            ..SolverOptions::default()
        };
        let err = solve(
            &Decay { k: 1.0 },
            (0.0, 100.0),
            &V::from_vec(vec![1.0, 0.0]),
            None,
            &options,
        )
        .unwrap_err();
        assert!(matches!(err, KineticsError::Solver { at: Some(_), .. }));
        assert!(!err.is_configuration());
    }

    #[test]
    fn non_finite_derivative_is_a_solver_error() {
        let law = Breakdown { breakdown: 1.0 };
        let y0 = V::from_vec(vec![0.0, 0.0]);
        let times = [0.5, 1.0, 2.0, 3.0];
        let err = solve(&law, (0.0, 3.0), &y0, Some(&times), &SolverOptions::default()).unwrap_err();
        match err {
            KineticsError::Solver {
                method,
                t_start,
                t_end,
                at: Some(at),
                ..
            } => {
                assert_eq!(method, Method::Bdf);
                assert_eq!((t_start, t_end), (0.0, 3.0));
                assert!(at > 1.0 && at <= 3.0, "failed at {at}");
            }
            other => panic!("expected a solver error, got {other:?}"),
        }
    }
}
