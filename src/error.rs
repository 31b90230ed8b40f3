use thiserror::Error;

use crate::simulator::Method;

/// Errors raised while configuring or integrating a kinetics model
///
/// Configuration errors are detected before any integration work starts. Solver errors carry the
/// time span and, when known, the time at which integration stopped.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KineticsError {
    #[error("expected {expected} initial concentrations, got {found}")]
    InitialStateLength { expected: usize, found: usize },
    #[error("the rate law does not define any species")]
    EmptyRateLaw,
    #[error("invalid time span [{start}, {end}]: start must be finite and not after end")]
    InvalidTimeSpan { start: f64, end: f64 },
    #[error("invalid evaluation times: {0}")]
    InvalidEvaluationTimes(String),
    #[error("compartment volume must be strictly positive, got {0} L")]
    InvalidVolume(f64),
    #[error("parameter '{name}' must be non-negative and finite, got {value}")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error("{method} solver failed on [{t_start}, {t_end}]{}: {reason}", .at.map(|t| format!(" at t = {t}")).unwrap_or_default())]
    Solver {
        method: Method,
        t_start: f64,
        t_end: f64,
        at: Option<f64>,
        reason: String,
    },
}

impl KineticsError {
    /// True for errors caused by invalid inputs rather than by the numerical solver
    pub fn is_configuration(&self) -> bool {
        !matches!(self, KineticsError::Solver { .. })
    }
}
