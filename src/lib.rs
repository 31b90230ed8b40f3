//! Haem speciation kinetics during haemoglobin catabolism in the digestive vacuole of
//! *Plasmodium falciparum*.
//!
//! A [KineticsModel](models::KineticsModel) couples one of the fixed reaction networks to a set of
//! [Parameters](parameters::Parameters), integrates it with the [simulator] and renders the
//! trajectory as iron content per cell in a [Report](output::Report).

pub mod data;
pub mod entrypoints;
pub mod error;
pub mod logger;
pub mod models;
pub mod output;
pub mod parameters;
pub mod settings;
pub mod simulator;
pub mod sweep;

pub mod prelude {
    pub use crate::data::{Comparison, ExperimentalData, Reference, Series};
    pub use crate::entrypoints::{build_model, simulate, simulate_from_file};
    pub use crate::error::KineticsError;
    pub use crate::models::terms::TransportCurve;
    pub use crate::models::{
        KineticsModel, ModelState, Network, RunRequest, Species, Variant, VariantOptions,
    };
    pub use crate::output::{OutputConfig, Report, UnitConversion};
    pub use crate::parameters::{effective_source_concentration, Enzyme, Parameters};
    pub use crate::settings::Settings;
    pub use crate::simulator::{solve, Method, RateLaw, SolverOptions, Trajectory};
    pub use crate::sweep::run_sweep;
}
