use rayon::prelude::*;

use crate::error::KineticsError;
use crate::models::{KineticsModel, RunRequest};
use crate::output::Report;
use crate::parameters::Parameters;

/// Runs `template` once per parameter set, in parallel
///
/// Each run works on its own copy of the model. Derived parameters are recomputed for every set,
/// and results are returned in the order of `parameter_sets`.
pub fn run_sweep(
    template: &KineticsModel,
    parameter_sets: Vec<Parameters>,
    request: &RunRequest,
) -> Vec<Result<Report, KineticsError>> {
    tracing::debug!(
        "Sweeping {} parameter sets of {}",
        parameter_sets.len(),
        template.name()
    );
    parameter_sets
        .into_par_iter()
        .map(|mut parameters| {
            parameters.compute()?;
            let mut model = template.clone().with_parameters(parameters)?;
            model.run(request).cloned()
        })
        .collect()
}

/// Copies of `base` with a single input replaced by each of `values`
pub fn vary<F>(base: &Parameters, values: &[f64], set: F) -> Vec<Parameters>
where
    F: Fn(&mut Parameters, f64),
{
    values
        .iter()
        .map(|&value| {
            let mut parameters = base.clone();
            set(&mut parameters, value);
            parameters
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Variant;

    #[test]
    fn sweep_keeps_order_and_reports_errors() {
        let template = KineticsModel::new(Variant::Model2, Parameters::default()).unwrap();
        let mut sets = vary(&Parameters::default(), &[0.06, 0.12, 0.24], |p, k| p.k_hz = k);
        sets.push(Parameters {
            vol_dv: 0.0,
            ..Parameters::default()
        });
        let request = RunRequest::stepped(0.0, 600.0, 60.0, None).unwrap();

        let results = run_sweep(&template, sets, &request);
        assert_eq!(results.len(), 4);
        assert_eq!(results[3], Err(KineticsError::InvalidVolume(0.0)));

        let hz: Vec<f64> = results[..3]
            .iter()
            .map(|r| {
                let report = r.as_ref().unwrap();
                report.column("conc_hz").unwrap()[report.len() - 1]
            })
            .collect();
        assert!(hz[0] < hz[1] && hz[1] < hz[2]);
    }
}
