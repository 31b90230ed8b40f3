use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use eyre::{Result, WrapErr};
use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::error::KineticsError;
use crate::models::species::{index_of, Species};
use crate::simulator::Trajectory;

/// Atomic weight of iron used for the per-cell mass conversion, in g/mol
pub const FE_ATOMIC_WEIGHT: f64 = 55.85;

/// Scale from M to fg/cell used by the four-species networks
pub const FIXED_SCALE_FACTOR: f64 = 1000.0 * 0.2232;

/// Start of the trophozoite stage in the parasite life cycle, in hours
pub const LIFE_CYCLE_OFFSET_HOURS: f64 = 16.0;

/// Conversion of molar concentrations to iron mass per cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnitConversion {
    /// `fg/cell = M * factor`
    FixedScale { factor: f64 },
    /// `fg/cell = M * volume_l * 1e15 / atomic_weight`, the published per-cell conversion
    PerCellMass { volume_l: f64, atomic_weight: f64 },
    /// `fg/cell = M * volume_l * 1e15 * atomic_weight`
    ///
    /// Moles in the compartment times the molar mass, scaled from g to fg.
    MolarMass { volume_l: f64, atomic_weight: f64 },
}

impl UnitConversion {
    pub fn fixed_scale() -> Self {
        UnitConversion::FixedScale {
            factor: FIXED_SCALE_FACTOR,
        }
    }

    pub fn per_cell_mass(volume_l: f64) -> Self {
        UnitConversion::PerCellMass {
            volume_l,
            atomic_weight: FE_ATOMIC_WEIGHT,
        }
    }

    pub fn molar_mass(volume_l: f64) -> Self {
        UnitConversion::MolarMass {
            volume_l,
            atomic_weight: FE_ATOMIC_WEIGHT,
        }
    }

    /// Compartment volume of the per-cell conversions
    pub fn volume_mut(&mut self) -> Option<&mut f64> {
        match self {
            UnitConversion::FixedScale { .. } => None,
            UnitConversion::PerCellMass { volume_l, .. }
            | UnitConversion::MolarMass { volume_l, .. } => Some(volume_l),
        }
    }

    pub fn validate(&self) -> Result<(), KineticsError> {
        match *self {
            UnitConversion::FixedScale { factor } => {
                if !(factor.is_finite() && factor > 0.0) {
                    return Err(KineticsError::InvalidParameter {
                        name: "factor",
                        value: factor,
                    });
                }
            }
            UnitConversion::PerCellMass {
                volume_l,
                atomic_weight,
            }
            | UnitConversion::MolarMass {
                volume_l,
                atomic_weight,
            } => {
                if !(volume_l.is_finite() && volume_l > 0.0) {
                    return Err(KineticsError::InvalidVolume(volume_l));
                }
                if !(atomic_weight.is_finite() && atomic_weight > 0.0) {
                    return Err(KineticsError::InvalidParameter {
                        name: "atomic_weight",
                        value: atomic_weight,
                    });
                }
            }
        }
        Ok(())
    }

    fn scale(&self) -> f64 {
        match *self {
            UnitConversion::FixedScale { factor } => factor,
            UnitConversion::PerCellMass {
                volume_l,
                atomic_weight,
            } => volume_l * 1e15 / atomic_weight,
            // L to fL, then mol to g
            UnitConversion::MolarMass {
                volume_l,
                atomic_weight,
            } => volume_l * 1e15 * atomic_weight,
        }
    }

    /// M to fg/cell
    pub fn apply(&self, molar: f64) -> f64 {
        molar * self.scale()
    }

    /// fg/cell to M
    pub fn invert(&self, fg_per_cell: f64) -> f64 {
        fg_per_cell / self.scale()
    }
}

/// Derived column holding the difference of two tracked species
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedPool {
    pub name: &'static str,
    pub minuend: Species,
    pub subtrahend: Species,
}

impl ObservedPool {
    /// Haemoglobin delivered to the digestive vacuole that has not been degraded yet
    pub fn undegraded_haemoglobin() -> Self {
        ObservedPool {
            name: "conc_hb_dv_obs",
            minuend: Species::HbDv,
            subtrahend: Species::Fe2pp,
        }
    }
}

/// How a trajectory is rendered into a [Report]
#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub conversion: UnitConversion,
    pub observed: Option<ObservedPool>,
    pub time_offset_hours: f64,
    /// Replace negative values by zero after conversion
    pub clamp_negative: bool,
}

impl OutputConfig {
    pub fn new(conversion: UnitConversion) -> Self {
        OutputConfig {
            conversion,
            observed: None,
            time_offset_hours: LIFE_CYCLE_OFFSET_HOURS,
            clamp_negative: false,
        }
    }

    pub fn with_observed(mut self, observed: ObservedPool) -> Self {
        self.observed = Some(observed);
        self
    }

    pub fn with_time_offset(mut self, hours: f64) -> Self {
        self.time_offset_hours = hours;
        self
    }

    pub fn with_clamp_negative(mut self, clamp: bool) -> Self {
        self.clamp_negative = clamp;
        self
    }

    /// Converts minutes of integration time into hours of the life cycle
    pub fn hours(&self, minutes: f64) -> f64 {
        self.time_offset_hours + minutes / 60.0
    }
}

/// Time-indexed table of iron content per species, in fg/cell
///
/// Columns are the tracked species in integration order, then `conc_hz` when haemozoin is not
/// tracked, then the observed pool if one is configured.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    time: Array1<f64>,
    columns: Vec<String>,
    values: Array2<f64>,
}

impl Report {
    /// Time index, in hours
    pub fn time(&self) -> &Array1<f64> {
        &self.time
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// One row per time point, one column per entry of [Report::columns]
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.values.column(i))
    }

    /// Linear interpolation of a column at `hours`
    ///
    /// Returns `None` for an unknown column or a time outside the report.
    pub fn interpolate(&self, name: &str, hours: f64) -> Option<f64> {
        let column = self.column(name)?;
        let n = self.time.len();
        if n == 0 || !(hours >= self.time[0] && hours <= self.time[n - 1]) {
            return None;
        }
        let upper = self.time.iter().position(|&t| t >= hours)?;
        if self.time[upper] == hours || upper == 0 {
            return Some(column[upper]);
        }
        let lower = upper - 1;
        let (t0, t1) = (self.time[lower], self.time[upper]);
        let w = (hours - t0) / (t1 - t0);
        Some(column[lower] + w * (column[upper] - column[lower]))
    }

    /// Writes the report as CSV with a `time` column followed by [Report::columns]
    pub fn write_csv(&self, folder: &str, file_name: &str) -> Result<PathBuf> {
        let outputfile = OutputFile::new(folder, file_name)?;
        let path = outputfile.relative_path().to_path_buf();
        self.write_csv_to(outputfile.file_owned())
            .wrap_err_with(|| format!("Unable to write report to {}", path.display()))?;
        tracing::info!("Report written to {}", path.display());
        Ok(path)
    }

    pub fn write_csv_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = WriterBuilder::new().has_headers(true).from_writer(writer);

        let mut header = vec!["time".to_string()];
        header.extend(self.columns.iter().cloned());
        writer.write_record(&header)?;

        for (t, row) in self.time.iter().zip(self.values.axis_iter(Axis(0))) {
            let mut record = vec![t.to_string()];
            record.extend(row.iter().map(|v| v.to_string()));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// A file inside the output folder, created together with its parent directories
#[derive(Debug)]
pub struct OutputFile {
    file: File,
    relative_path: PathBuf,
}

impl OutputFile {
    pub fn new(folder: &str, file_name: &str) -> Result<Self> {
        let relative_path = Path::new(&folder).join(file_name);

        if let Some(parent) = relative_path.parent() {
            create_dir_all(parent)
                .wrap_err_with(|| format!("Failed to create directories for {:?}", parent))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&relative_path)
            .wrap_err_with(|| format!("Failed to open file: {:?}", relative_path))?;

        Ok(OutputFile {
            file,
            relative_path,
        })
    }

    pub fn file_owned(self) -> File {
        self.file
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }
}

/// Renders a trajectory in report units
pub fn to_report_units(trajectory: &Trajectory, config: &OutputConfig) -> Result<Report, KineticsError> {
    config.conversion.validate()?;

    let species = trajectory.species();
    let states = trajectory.states();
    let nrows = trajectory.len();

    let mut columns: Vec<String> = species.iter().map(|s| s.name().to_string()).collect();
    let mut blocks: Vec<Array1<f64>> = species
        .iter()
        .enumerate()
        .map(|(i, _)| states.column(i).mapv(|m| config.conversion.apply(m)))
        .collect();

    if index_of(species, Species::Hz).is_none() {
        columns.push(Species::Hz.name().to_string());
        blocks.push(Array1::zeros(nrows));
    }

    if let Some(pool) = &config.observed {
        let (minuend, subtrahend) = match (
            index_of(species, pool.minuend),
            index_of(species, pool.subtrahend),
        ) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(KineticsError::InvalidParameter {
                    name: "observed",
                    value: f64::NAN,
                })
            }
        };
        let pool_values = &blocks[minuend] - &blocks[subtrahend];
        columns.push(pool.name.to_string());
        blocks.push(pool_values);
    }

    let mut values = Array2::<f64>::zeros((nrows, columns.len()));
    for (j, block) in blocks.iter().enumerate() {
        values.column_mut(j).assign(block);
    }
    if config.clamp_negative {
        values.mapv_inplace(|v| v.max(0.0));
    }

    let time = trajectory.times().iter().map(|&t| config.hours(t)).collect();

    Ok(Report {
        time,
        columns,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::species::DEGRADATION_SPECIES;
    use crate::simulator::{solve, RateLaw, SolverOptions, T, V};

    struct Inflow;

    impl RateLaw for Inflow {
        fn species(&self) -> &'static [Species] {
            &DEGRADATION_SPECIES
        }

        fn evaluate(&self, _t: T, _y: &V, dy: &mut V) {
            dy[0] = 2e-6;
            dy[1] = 1e-6;
        }
    }

    fn inflow_trajectory() -> Trajectory {
        solve(
            &Inflow,
            (0.0, 120.0),
            &V::zeros(2),
            Some(&[60.0, 120.0]),
            &SolverOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn per_cell_mass_divides_by_atomic_weight() {
        let conversion = UnitConversion::per_cell_mass(1e-15);
        assert!((conversion.apply(1e-3) - 1.7905e-5).abs() < 1e-9);
        assert!((conversion.apply(1e-3) - 1e-3 / 55.85).abs() < 1e-18);
        for molar in [0.0, 1e-9, 3.7e-5, 0.21] {
            let back = conversion.invert(conversion.apply(molar));
            assert!((back - molar).abs() <= 1e-15 * molar.max(1.0));
        }
    }

    #[test]
    fn molar_mass_multiplies_by_atomic_weight() {
        let conversion = UnitConversion::molar_mass(1e-15);
        // 1 mM in 1 fL holds 1e-18 mol of Fe
        assert!((conversion.apply(1e-3) - 55.85e-3).abs() < 1e-12);
        assert!((conversion.invert(55.85e-3) - 1e-3).abs() < 1e-15);
        assert_eq!(
            UnitConversion::molar_mass(-1.0).validate(),
            Err(KineticsError::InvalidVolume(-1.0))
        );
    }

    #[test]
    fn fixed_scale_round_trip() {
        let conversion = UnitConversion::fixed_scale();
        assert!((conversion.apply(1.0) - 223.2).abs() < 1e-9);
        assert!((conversion.invert(conversion.apply(0.0123)) - 0.0123).abs() < 1e-15);
    }

    #[test]
    fn zero_volume_is_a_configuration_error() {
        let config = OutputConfig::new(UnitConversion::per_cell_mass(0.0));
        let err = to_report_units(&inflow_trajectory(), &config).unwrap_err();
        assert_eq!(err, KineticsError::InvalidVolume(0.0));
        assert!(err.is_configuration());
    }

    #[test]
    fn time_is_offset_into_the_life_cycle() {
        let report = to_report_units(
            &inflow_trajectory(),
            &OutputConfig::new(UnitConversion::fixed_scale()),
        )
        .unwrap();
        assert_eq!(report.time().to_vec(), vec![16.0, 17.0, 18.0]);
    }

    #[test]
    fn untracked_haemozoin_is_zero_filled_and_pool_derived() {
        let config = OutputConfig::new(UnitConversion::per_cell_mass(1e-15))
            .with_observed(ObservedPool::undegraded_haemoglobin());
        let report = to_report_units(&inflow_trajectory(), &config).unwrap();
        assert_eq!(
            report.columns(),
            &["conc_hb_dv", "conc_fe2pp", "conc_hz", "conc_hb_dv_obs"]
        );
        assert!(report.column("conc_hz").unwrap().iter().all(|&v| v == 0.0));

        let hb = report.column("conc_hb_dv").unwrap();
        let fe2 = report.column("conc_fe2pp").unwrap();
        let obs = report.column("conc_hb_dv_obs").unwrap();
        for i in 0..report.len() {
            assert!((obs[i] - (hb[i] - fe2[i])).abs() < 1e-12);
        }
    }

    #[test]
    fn clamping_removes_negative_values() {
        let config = OutputConfig::new(UnitConversion::fixed_scale())
            .with_observed(ObservedPool {
                name: "deficit",
                minuend: Species::Fe2pp,
                subtrahend: Species::HbDv,
            })
            .with_clamp_negative(true);
        let report = to_report_units(&inflow_trajectory(), &config).unwrap();
        assert!(report.column("deficit").unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn interpolation_between_samples() {
        let report = to_report_units(
            &inflow_trajectory(),
            &OutputConfig::new(UnitConversion::fixed_scale()),
        )
        .unwrap();
        let at_17 = report.interpolate("conc_hb_dv", 17.0).unwrap();
        let at_17_5 = report.interpolate("conc_hb_dv", 17.5).unwrap();
        let at_18 = report.interpolate("conc_hb_dv", 18.0).unwrap();
        assert!((at_17_5 - 0.5 * (at_17 + at_18)).abs() < 1e-12);
        assert_eq!(report.interpolate("conc_hb_dv", 15.0), None);
        assert_eq!(report.interpolate("unknown", 17.0), None);
    }

    #[test]
    fn csv_has_time_then_columns() {
        let report = to_report_units(
            &inflow_trajectory(),
            &OutputConfig::new(UnitConversion::fixed_scale()),
        )
        .unwrap();
        let mut buffer = Vec::new();
        report.write_csv_to(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("time,conc_hb_dv,conc_fe2pp,conc_hz"));
        assert_eq!(lines.count(), 3);
    }
}
