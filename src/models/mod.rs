pub mod degradation;
pub mod model1;
pub mod model2;
pub mod model3;
pub mod species;
pub mod terms;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::KineticsError;
use crate::output::{to_report_units, ObservedPool, OutputConfig, Report, UnitConversion};
use crate::parameters::{effective_source_concentration, Enzyme, Parameters};
use crate::simulator::{self, RateLaw, SolverOptions, Trajectory, T, V};
pub use degradation::Degradation;
pub use model1::Model1;
pub use model2::Model2;
pub use model3::Model3;
use species::{SpeciesState, DEGRADATION_SPECIES, HAEM_SPECIES};
pub use species::Species;
use terms::{Growth, ProteaseRemoval, Redox, Transport, TransportConstants, TransportCurve};

/// The reaction networks that can be simulated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Model1,
    Model2,
    #[default]
    Model3,
    Degradation,
}

impl Variant {
    pub const ALL: [Variant; 4] = [
        Variant::Model1,
        Variant::Model2,
        Variant::Model3,
        Variant::Degradation,
    ];

    pub fn species(&self) -> &'static [Species] {
        match self {
            Variant::Degradation => &DEGRADATION_SPECIES,
            _ => &HAEM_SPECIES,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Variant::Model1 => "Model 1",
            Variant::Model2 => "Model 2",
            Variant::Model3 => "Model 3",
            Variant::Degradation => "Haemoglobin degradation",
        }
    }

    /// Whether the initially tracked haem is taken from the red blood cell pool
    pub fn consumes_source(&self) -> bool {
        matches!(self, Variant::Model3 | Variant::Degradation)
    }

    /// Transport curve used unless one is configured
    pub fn default_transport(&self) -> TransportCurve {
        match self {
            Variant::Model3 => TransportCurve::Exponential,
            _ => TransportCurve::Constant,
        }
    }

    pub fn default_output(&self, parameters: &Parameters) -> OutputConfig {
        match self {
            Variant::Degradation => OutputConfig::new(UnitConversion::per_cell_mass(parameters.vol_dv))
                .with_observed(ObservedPool::undegraded_haemoglobin()),
            _ => OutputConfig::new(UnitConversion::fixed_scale()),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Per-variant choices that are not physical constants
///
/// Model 1 and Model 2 always use constant transport and first-order degradation, so only
/// Model 3 and the degradation network read `transport`, `proteases` and `enzyme_growth`.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantOptions {
    pub transport: TransportCurve,
    pub transport_constants: TransportConstants,
    pub proteases: Vec<Enzyme>,
    /// Growth of the protease content over the life cycle
    pub enzyme_growth: Growth,
}

impl VariantOptions {
    pub fn for_variant(variant: Variant) -> Self {
        VariantOptions {
            transport: variant.default_transport(),
            transport_constants: TransportConstants::default(),
            proteases: vec![Enzyme::Hap],
            enzyme_growth: Growth::FRACTION,
        }
    }
}

/// A fully parameterized rate law of one of the [Variant]s
#[derive(Debug, Clone, PartialEq)]
pub enum Network {
    Model1(Model1),
    Model2(Model2),
    Model3(Model3),
    Degradation(Degradation),
}

impl Network {
    /// Wires the rate law of `variant` with `source` as the RBC haem concentration
    pub fn build(variant: Variant, parameters: &Parameters, options: &VariantOptions, source: f64) -> Self {
        let transport = Transport {
            curve: options.transport,
            constants: options.transport_constants.clone(),
            k_hb_trans: parameters.k_hb_trans,
            source,
        };
        match variant {
            Variant::Model1 => Network::Model1(Model1::new(parameters, source)),
            Variant::Model2 => Network::Model2(Model2::new(parameters, source)),
            Variant::Model3 => Network::Model3(Model3::new(
                transport,
                ProteaseRemoval::new(parameters, &options.proteases, options.enzyme_growth),
                Redox::new(parameters, parameters.lipid_sequestration_fraction()),
            )),
            Variant::Degradation => Network::Degradation(Degradation::new(
                transport,
                ProteaseRemoval::new(parameters, &options.proteases, options.enzyme_growth),
            )),
        }
    }
}

impl RateLaw for Network {
    fn species(&self) -> &'static [Species] {
        match self {
            Network::Model1(law) => law.species(),
            Network::Model2(law) => law.species(),
            Network::Model3(law) => law.species(),
            Network::Degradation(law) => law.species(),
        }
    }

    fn evaluate(&self, t: T, y: &V, dy: &mut V) {
        match self {
            Network::Model1(law) => law.evaluate(t, y, dy),
            Network::Model2(law) => law.evaluate(t, y, dy),
            Network::Model3(law) => law.evaluate(t, y, dy),
            Network::Degradation(law) => law.evaluate(t, y, dy),
        }
    }
}

/// Integration request for [KineticsModel::run]
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    /// Integration interval, in minutes
    pub t_span: (T, T),
    /// Initial concentrations in species order; `None` keeps the model's initial state
    pub initial: Option<Vec<f64>>,
    /// Times at which the trajectory is sampled; `None` returns every solver step
    pub evaluation_times: Option<Vec<T>>,
    pub solver: SolverOptions,
}

impl RunRequest {
    pub fn new(t_span: (T, T)) -> Self {
        RunRequest {
            t_span,
            initial: None,
            evaluation_times: None,
            solver: SolverOptions::default(),
        }
    }

    /// Samples `t0, t0 + step, ...` up to but excluding `t1`, integrating until the last sample
    pub fn stepped(t0: T, t1: T, step: T, initial: Option<Vec<f64>>) -> Result<Self, KineticsError> {
        if !(step.is_finite() && step > 0.0) {
            return Err(KineticsError::InvalidParameter {
                name: "t_step",
                value: step,
            });
        }
        if !(t0.is_finite() && t1.is_finite() && t1 > t0) {
            return Err(KineticsError::InvalidTimeSpan { start: t0, end: t1 });
        }
        let times: Vec<T> = (0..)
            .map(|i| t0 + i as T * step)
            .take_while(|&t| t < t1)
            .collect();
        let end = times.last().copied().unwrap_or(t0);
        Ok(RunRequest {
            t_span: (t0, end),
            initial,
            evaluation_times: Some(times),
            solver: SolverOptions::default(),
        })
    }

    pub fn with_initial(mut self, initial: Vec<f64>) -> Self {
        self.initial = Some(initial);
        self
    }

    pub fn with_evaluation_times(mut self, times: Vec<T>) -> Self {
        self.evaluation_times = Some(times);
        self
    }

    pub fn with_solver(mut self, solver: SolverOptions) -> Self {
        self.solver = solver;
        self
    }
}

/// Lifecycle of a [KineticsModel]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    /// Parameters and initial state are set, no solution is held
    Configured,
    /// The last run succeeded and its solution is available
    Solved,
}

#[derive(Debug, Clone)]
struct Solution {
    trajectory: Trajectory,
    report: Report,
}

/// A reaction network together with its parameters, initial state and last solution
#[derive(Debug, Clone)]
pub struct KineticsModel {
    variant: Variant,
    name: String,
    parameters: Parameters,
    options: VariantOptions,
    output: OutputConfig,
    initial: SpeciesState,
    solution: Option<Solution>,
}

impl KineticsModel {
    /// Creates a model in the [ModelState::Configured] state
    ///
    /// Derived quantities are computed when `parameters` has not been computed yet.
    pub fn new(variant: Variant, parameters: Parameters) -> Result<Self, KineticsError> {
        let parameters = prepare(parameters)?;
        Ok(KineticsModel {
            variant,
            name: variant.name().to_string(),
            output: variant.default_output(&parameters),
            options: VariantOptions::for_variant(variant),
            initial: SpeciesState::zeros(variant.species()),
            parameters,
            solution: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_transport(mut self, transport: TransportCurve) -> Self {
        self.options.transport = transport;
        self.solution = None;
        self
    }

    pub fn with_proteases(mut self, proteases: Vec<Enzyme>) -> Self {
        self.options.proteases = proteases;
        self.solution = None;
        self
    }

    pub fn with_options(mut self, options: VariantOptions) -> Self {
        self.options = options;
        self.solution = None;
        self
    }

    pub fn with_output(mut self, output: OutputConfig) -> Self {
        self.output = output;
        self.solution = None;
        self
    }

    /// Replaces the parameters; the output volume of the per-cell conversion follows `vol_dv`
    pub fn with_parameters(mut self, parameters: Parameters) -> Result<Self, KineticsError> {
        let parameters = prepare(parameters)?;
        if let Some(volume_l) = self.output.conversion.volume_mut() {
            *volume_l = parameters.vol_dv;
        }
        self.parameters = parameters;
        self.solution = None;
        Ok(self)
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn options(&self) -> &VariantOptions {
        &self.options
    }

    pub fn output(&self) -> &OutputConfig {
        &self.output
    }

    pub fn species(&self) -> &'static [Species] {
        self.variant.species()
    }

    pub fn initial_state(&self) -> &SpeciesState {
        &self.initial
    }

    /// Overwrites the initial concentrations, given in species order
    pub fn set_initial_state(&mut self, values: &[f64]) -> Result<(), KineticsError> {
        self.initial = SpeciesState::from_slice(self.variant.species(), values)?;
        Ok(())
    }

    /// RBC haem concentration seen by the rate law for the current initial state
    pub fn source_concentration(&self) -> f64 {
        let base = self.parameters.conc_hb_rbc;
        if self.variant.consumes_source() {
            effective_source_concentration(base, self.initial.total(), self.parameters.volume_ratio())
        } else {
            base
        }
    }

    /// The rate law wired for the current initial state
    pub fn network(&self) -> Network {
        Network::build(
            self.variant,
            &self.parameters,
            &self.options,
            self.source_concentration(),
        )
    }

    /// Derivative of the network at `(t, state)`
    pub fn evaluate_derivative(&self, t: T, state: &[f64]) -> Result<Vec<f64>, KineticsError> {
        let species = self.variant.species();
        if state.len() != species.len() {
            return Err(KineticsError::InitialStateLength {
                expected: species.len(),
                found: state.len(),
            });
        }
        let y = V::from_column_slice(state);
        let mut dy = V::zeros(state.len());
        self.network().evaluate(t, &y, &mut dy);
        Ok(dy.iter().copied().collect())
    }

    /// Integrates the network and converts the trajectory into report units
    ///
    /// Any previous solution is dropped first. The source adjustment is recomputed from the
    /// base parameters on every call, so repeated runs with the same request agree. On error the
    /// model stays [ModelState::Configured].
    pub fn run(&mut self, request: &RunRequest) -> Result<&Report, KineticsError> {
        self.solution = None;
        if let Some(initial) = &request.initial {
            self.set_initial_state(initial)?;
        }

        let network = self.network();
        tracing::debug!(
            "Running {} over [{}, {}] min with source concentration {:.4e} M",
            self.name,
            request.t_span.0,
            request.t_span.1,
            self.source_concentration()
        );

        let trajectory = simulator::solve(
            &network,
            request.t_span,
            self.initial.values(),
            request.evaluation_times.as_deref(),
            &request.solver,
        )?;
        let report = to_report_units(&trajectory, &self.output)?;

        let solution = self.solution.insert(Solution { trajectory, report });
        Ok(&solution.report)
    }

    pub fn state(&self) -> ModelState {
        match self.solution {
            Some(_) => ModelState::Solved,
            None => ModelState::Configured,
        }
    }

    pub fn is_solved(&self) -> bool {
        self.solution.is_some()
    }

    /// Raw trajectory, in M and minutes, of the last successful run
    pub fn trajectory(&self) -> Option<&Trajectory> {
        self.solution.as_ref().map(|s| &s.trajectory)
    }

    /// Report of the last successful run
    pub fn report(&self) -> Option<&Report> {
        self.solution.as_ref().map(|s| &s.report)
    }
}

fn prepare(mut parameters: Parameters) -> Result<Parameters, KineticsError> {
    if parameters.is_computed() {
        parameters.validate()?;
    } else {
        parameters.compute()?;
    }
    if !parameters.is_computed() {
        tracing::warn!("Haemoglobin degradation rate is zero, check the protease abundances");
    }
    Ok(parameters)
}
