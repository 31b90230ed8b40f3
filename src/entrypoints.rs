use std::time::Instant;

use eyre::{Result, WrapErr};

use crate::data::{default_pairs, sum_of_squares};
use crate::logger;
use crate::models::{KineticsModel, RunRequest, VariantOptions};
use crate::output::{Report, UnitConversion};
use crate::settings::{self, Settings};

/// Builds the model described by the settings
///
/// Derived parameters are recomputed from the configured inputs.
pub fn build_model(settings: &Settings) -> Result<KineticsModel> {
    let model_settings = &settings.model;
    let variant = model_settings.variant;

    let mut parameters = settings.parameters.clone();
    parameters.compute()?;

    let mut options = VariantOptions::for_variant(variant);
    if let Some(transport) = model_settings.transport {
        options.transport = transport;
    }
    options.proteases = model_settings.proteases.clone();

    let mut output = variant
        .default_output(&parameters)
        .with_time_offset(settings.output.time_offset)
        .with_clamp_negative(settings.output.clamp_negative);
    if settings.output.molar_mass {
        if let UnitConversion::PerCellMass { volume_l, .. } = output.conversion {
            output.conversion = UnitConversion::molar_mass(volume_l);
        }
    }

    let mut model = KineticsModel::new(variant, parameters)?
        .with_options(options)
        .with_output(output);
    if let Some(name) = &model_settings.name {
        model = model.with_name(name.clone());
    }
    Ok(model)
}

/// Runs the simulation described by the settings
///
/// The report is written to `<output.path>/report.csv` when output is enabled, and compared with
/// the reference measurements when `run.reference` is set.
pub fn simulate(settings: Settings) -> Result<Report> {
    let now = Instant::now();
    settings.validate()?;

    let mut model = build_model(&settings)?;
    let run = &settings.run;
    let request = RunRequest::stepped(run.t_start, run.t_end, run.t_step, run.initial.clone())?
        .with_solver(settings.solver.clone());

    let name = model.name().to_string();
    tracing::info!("Starting {} ({})", name, model.variant());
    let report = model
        .run(&request)
        .wrap_err_with(|| format!("Simulation of {name} failed"))?
        .clone();
    tracing::info!(
        "{} finished with {} time points in {:.2?}",
        name,
        report.len(),
        now.elapsed()
    );

    if let Some(reference) = run.reference {
        let data = reference.load();
        let pairs = default_pairs(model.output().observed.is_some());
        let comparisons = data.compare(&report, &pairs);
        tracing::info!(
            "Sum of squared residuals against {} over {} measurements: {:.4}",
            data.name(),
            comparisons.len(),
            sum_of_squares(&comparisons)
        );
    }

    if settings.output.write {
        report.write_csv(&settings.output.path, "report.csv")?;
    } else {
        tracing::info!("Output files will not be written - set `output.write = true` to enable them");
    }

    Ok(report)
}

/// Reads the settings from a TOML file, sets up logging and runs the simulation
pub fn simulate_from_file(path: impl Into<String>) -> Result<Report> {
    let settings = settings::read(path)?;
    logger::setup_log(&settings)?;
    simulate(settings)
}
