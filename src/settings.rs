use config::Config as eConfig;
use eyre::{bail, Result, WrapErr};
use serde::Deserialize;
use serde_derive::Serialize;

use crate::data::Reference;
use crate::models::terms::TransportCurve;
use crate::models::Variant;
use crate::output::OutputFile;
use crate::parameters::{Enzyme, Parameters};
use crate::simulator::SolverOptions;

/// Contains all settings for a simulation
///
/// Every section is optional in the TOML file and falls back to its defaults.
#[derive(Debug, Deserialize, Clone, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    /// Which network to simulate
    pub model: Model,
    /// Time span, sampling and initial state
    pub run: Run,
    /// Integration method and tolerances
    pub solver: SolverOptions,
    /// Overrides of the physical constants
    ///
    /// Derived quantities (`conc_hb_rbc`, `k_hb_deg`, protease concentrations) are always
    /// recomputed from the inputs.
    pub parameters: Parameters,
    pub output: Output,
    pub log: Log,
}

impl Settings {
    pub fn new() -> Self {
        Settings::default()
    }

    /// Validates the settings
    pub fn validate(&self) -> Result<()> {
        self.run.validate()?;
        self.solver.validate()?;
        self.parameters.validate()?;
        if let Some(initial) = &self.run.initial {
            let expected = self.model.variant.species().len();
            if initial.len() != expected {
                bail!(
                    "{} tracks {} species, but {} initial concentrations were given",
                    self.model.variant,
                    expected,
                    initial.len()
                );
            }
        }
        Ok(())
    }
}

/// Configuration of the reaction network
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Model {
    pub variant: Variant,
    /// Name used in the logs, defaults to the name of the variant
    pub name: Option<String>,
    /// Transport curve, defaults to the curve of the variant
    pub transport: Option<TransportCurve>,
    /// Proteases degrading haemoglobin in Model 3 and the degradation network
    pub proteases: Vec<Enzyme>,
}

impl Default for Model {
    fn default() -> Self {
        Model {
            variant: Variant::default(),
            name: None,
            transport: None,
            proteases: vec![Enzyme::Hap],
        }
    }
}

/// Time course to simulate, in minutes after the start of the trophozoite stage
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Run {
    pub t_start: f64,
    /// Exclusive end of the sampling grid
    pub t_end: f64,
    pub t_step: f64,
    /// Initial concentrations in M, in species order; all zero when not given
    pub initial: Option<Vec<f64>>,
    /// Measurements the report is compared with
    pub reference: Option<Reference>,
}

impl Default for Run {
    fn default() -> Self {
        Run {
            t_start: 0.0,
            t_end: 1760.0,
            t_step: 20.0,
            initial: None,
            reference: None,
        }
    }
}

impl Run {
    pub fn validate(&self) -> Result<()> {
        if !(self.t_start.is_finite() && self.t_end.is_finite()) {
            bail!("The time span must be finite");
        }
        if self.t_end <= self.t_start {
            bail!(
                "t_end ({}) must be greater than t_start ({})",
                self.t_end,
                self.t_start
            );
        }
        if !(self.t_step > 0.0) {
            bail!("t_step must be positive, got {}", self.t_step);
        }
        Ok(())
    }
}

/// Configuration for the output files
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Output {
    /// Whether to write the output files
    pub write: bool,
    /// The (relative) path to write the output files to
    pub path: String,
    /// Replace negative amounts by zero in the report
    pub clamp_negative: bool,
    /// Hours post invasion at which the simulation starts
    pub time_offset: f64,
    /// Report per-cell iron as moles times molar mass instead of dividing by the atomic weight
    pub molar_mass: bool,
}

impl Default for Output {
    fn default() -> Self {
        Output {
            write: true,
            path: String::from("outputs/"),
            clamp_negative: false,
            time_offset: crate::output::LIFE_CYCLE_OFFSET_HOURS,
            molar_mass: false,
        }
    }
}

impl Output {
    /// Parses the output folder location
    ///
    /// If a `#` symbol is found, it is replaced by the first number for which the folder does not
    /// exist yet.
    pub fn parse_output_folder(&mut self) -> Result<()> {
        if self.path.is_empty() {
            self.path = Output::default().path;
        }

        let count = self.path.matches('#').count();
        match count {
            0 => Ok(()),
            1 => {
                let mut num = 1;
                while std::path::Path::new(&self.path.replace('#', &num.to_string())).exists() {
                    num += 1;
                }
                self.path = self.path.replace('#', &num.to_string());
                Ok(())
            }
            _ => bail!("Only one `#` symbol is allowed in the output path"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Log {
    /// The maximum log level to display
    ///
    /// One of `trace`, `debug`, `info`, `warn` or `error`, or any `EnvFilter` directive.
    pub level: String,
    /// The file to write the log to, inside the output folder
    pub file: String,
    /// Whether to install a global subscriber
    ///
    /// Disable it when the caller sets up its own subscriber, for example in benchmarks.
    pub write: bool,
}

impl Default for Log {
    fn default() -> Self {
        Log {
            level: String::from("info"),
            file: String::from("log.txt"),
            write: true,
        }
    }
}

/// Parses the settings from a TOML configuration file
///
/// Entries may be overridden by environment variables prefixed with `HAEM_`, using a double
/// underscore between nested keys, e.g. `HAEM_RUN__T_END=2400` or `HAEM_MODEL__VARIANT=model2`.
pub fn read(path: impl Into<String>) -> Result<Settings> {
    let settings_path = path.into();

    let parsed = eConfig::builder()
        .add_source(config::File::with_name(&settings_path).format(config::FileFormat::Toml))
        .add_source(
            config::Environment::with_prefix("HAEM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .wrap_err_with(|| format!("Unable to read settings from {}", settings_path))?;

    let mut settings: Settings = parsed
        .try_deserialize()
        .wrap_err("Unable to parse settings")?;

    settings.validate()?;
    settings.output.parse_output_folder()?;

    if settings.output.write {
        write_settings_to_file(&settings).wrap_err("Could not write settings to file")?;
    }

    Ok(settings)
}

/// Writes a copy of the parsed settings to `settings.json` in the output folder
pub fn write_settings_to_file(settings: &Settings) -> Result<()> {
    let serialized = serde_json::to_string_pretty(settings)?;
    let outputfile = OutputFile::new(settings.output.path.as_str(), "settings.json")?;
    let mut file = outputfile.file_owned();
    std::io::Write::write_all(&mut file, serialized.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::new();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.model.variant, Variant::Model3);
        assert_eq!(settings.run.t_end, 1760.0);
    }

    #[test]
    fn inverted_span_is_rejected() {
        let mut settings = Settings::new();
        settings.run.t_end = -1.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn initial_state_must_match_variant() {
        let mut settings = Settings::new();
        settings.model.variant = Variant::Degradation;
        settings.run.initial = Some(vec![0.0; 4]);
        assert!(settings.validate().is_err());
        settings.run.initial = Some(vec![0.0; 2]);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn multiple_placeholders_are_rejected() {
        let mut output = Output {
            path: "out#/run#".to_string(),
            ..Output::default()
        };
        assert!(output.parse_output_folder().is_err());
    }
}
