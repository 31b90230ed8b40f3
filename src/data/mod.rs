use std::fmt;
use std::path::Path;

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};

use crate::output::Report;

/// Measured iron pools of the parasite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Series {
    /// Haemoglobin
    Hb,
    /// Free haem
    Hm,
    /// Haemozoin
    Hz,
}

impl Series {
    pub const ALL: [Series; 3] = [Series::Hb, Series::Hm, Series::Hz];
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Series::Hb => write!(f, "Hb"),
            Series::Hm => write!(f, "Hm"),
            Series::Hz => write!(f, "Hz"),
        }
    }
}

/// Built-in measurement sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reference {
    Nf54,
    Dd2,
}

impl Reference {
    pub fn load(&self) -> ExperimentalData {
        match self {
            Reference::Nf54 => ExperimentalData::nf54(),
            Reference::Dd2 => ExperimentalData::dd2(),
        }
    }
}

/// A mean measurement with its standard error, in fg/cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Hours post invasion
    pub time: f64,
    pub value: f64,
    pub sem: f64,
}

/// One row of a measurement file
#[derive(Debug, Clone, Deserialize, Serialize)]
struct Row {
    time: f64,
    #[serde(rename = "Hb")]
    hb: f64,
    #[serde(rename = "Hb:SEM")]
    hb_sem: f64,
    #[serde(rename = "Hm")]
    hm: f64,
    #[serde(rename = "Hm:SEM")]
    hm_sem: f64,
    #[serde(rename = "Hz")]
    hz: f64,
    #[serde(rename = "Hz:SEM")]
    hz_sem: f64,
}

/// Iron speciation measured over the intraerythrocytic cycle
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentalData {
    name: String,
    time: Vec<f64>,
    hb: Vec<[f64; 2]>,
    hm: Vec<[f64; 2]>,
    hz: Vec<[f64; 2]>,
}

impl ExperimentalData {
    /// Untreated NF54 parasites
    pub fn nf54() -> Self {
        ExperimentalData {
            name: "NF54".to_string(),
            time: vec![21.0, 24.0, 27.0, 30.0, 33.0, 36.0, 39.0, 41.0, 44.0, 47.0],
            hb: vec![
                [26.5546875, 3.515625],
                [21.609375, 1.5],
                [11.6015625, 1.3828125],
                [4.1015625, 0.0],
                [1.4765625, 0.0],
                [3.4453125, 0.9140625],
                [2.296875, 1.3828125],
                [2.296875, 1.8046875],
                [1.40625, 0.5390625],
                [1.6875, 0.9375],
            ],
            hm: vec![
                [1.430397727, 0.183238636],
                [1.630681818, 0.213068182],
                [2.393465909, 0.323863636],
                [2.457386364, 0.136363636],
                [2.921875, 0.191761364],
                [3.936079545, 0.289772727],
                [5.142045455, 0.098011364],
                [6.066761364, 0.519886364],
                [5.704545455, 0.234375],
                [5.815340909, 0.524147727],
            ],
            hz: vec![
                [6.089965398, 2.76816609],
                [10.51903114, 0.0],
                [23.99077278, 3.875432526],
                [30.08073818, 3.783160323],
                [35.80161476, 4.290657439],
                [40.23068051, 4.705882353],
                [51.30334487, 0.0],
                [56.83967705, 6.551326413],
                [65.88235294, 2.952710496],
                [69.38869666, 8.581314879],
            ],
        }
    }

    /// Untreated Dd2 parasites
    pub fn dd2() -> Self {
        ExperimentalData {
            name: "Dd2".to_string(),
            time: vec![20.0, 23.0, 26.0, 29.0, 32.0, 35.0, 38.0, 41.0, 44.0],
            hb: vec![
                [1.217, 0.2035],
                [1.441, 0.3788],
                [2.107, 0.3346],
                [1.649, 0.4148],
                [1.678, 0.141],
                [2.16, 0.3945],
                [2.174, 0.7867],
                [2.459, 0.3721],
                [1.976, 0.8357],
            ],
            hm: vec![
                [1.48, 0.033],
                [3.115, 0.9283],
                [2.082, 0.2012],
                [2.272, 0.3602],
                [2.492, 0.1986],
                [3.878, 0.2985],
                [3.95, 0.8316],
                [5.171, 0.8572],
                [5.83, 1.699],
            ],
            hz: vec![
                [23.05, 8.49],
                [28.22, 8.72],
                [31.29, 7.3],
                [33.76, 4.125],
                [43.75, 5.025],
                [54.6, 7.592],
                [66.76, 12.63],
                [76.97, 15.91],
                [97.65, 20.75],
            ],
        }
    }

    /// Reads measurements from a CSV file with the columns
    /// `time,Hb,Hb:SEM,Hm,Hm:SEM,Hz,Hz:SEM`
    pub fn read_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .has_headers(true)
            .from_path(path)
            .wrap_err_with(|| format!("Unable to open {}", path.display()))?;

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut data = ExperimentalData {
            name,
            time: Vec::new(),
            hb: Vec::new(),
            hm: Vec::new(),
            hz: Vec::new(),
        };
        for row in reader.deserialize() {
            let row: Row = row.wrap_err_with(|| format!("Malformed row in {}", path.display()))?;
            data.time.push(row.time);
            data.hb.push([row.hb, row.hb_sem]);
            data.hm.push([row.hm, row.hm_sem]);
            data.hz.push([row.hz, row.hz_sem]);
        }
        tracing::debug!("Read {} time points from {}", data.len(), path.display());
        Ok(data)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sampling times, in hours post invasion
    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn series(&self, series: Series) -> Vec<Observation> {
        let values = match series {
            Series::Hb => &self.hb,
            Series::Hm => &self.hm,
            Series::Hz => &self.hz,
        };
        self.time
            .iter()
            .zip(values.iter())
            .map(|(&time, &[value, sem])| Observation { time, value, sem })
            .collect()
    }

    /// Compares model output with the measurements
    ///
    /// Each pair maps a report column onto a measured series. The model is linearly interpolated
    /// at the sampling times; times outside the report are skipped.
    pub fn compare(&self, report: &Report, pairs: &[(&str, Series)]) -> Vec<Comparison> {
        let mut comparisons = Vec::new();
        for &(column, series) in pairs {
            for observation in self.series(series) {
                let Some(model) = report.interpolate(column, observation.time) else {
                    continue;
                };
                let residual = model - observation.value;
                let z_score = (observation.sem > 0.0).then(|| residual / observation.sem);
                comparisons.push(Comparison {
                    column: column.to_string(),
                    series,
                    time: observation.time,
                    observed: observation.value,
                    model,
                    residual,
                    z_score,
                });
            }
        }
        comparisons
    }
}

/// Report columns paired with the measured series they predict
///
/// The degradation network reports the undegraded haemoglobin as `conc_hb_dv_obs`.
pub fn default_pairs(observed_haemoglobin: bool) -> Vec<(&'static str, Series)> {
    let hb = if observed_haemoglobin {
        "conc_hb_dv_obs"
    } else {
        "conc_hb_dv"
    };
    vec![(hb, Series::Hb), ("conc_fe3pp", Series::Hm), ("conc_hz", Series::Hz)]
}

/// Model prediction against a single measurement
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub column: String,
    pub series: Series,
    pub time: f64,
    pub observed: f64,
    pub model: f64,
    /// `model - observed`
    pub residual: f64,
    /// Residual in units of SEM, `None` when the SEM is zero
    pub z_score: Option<f64>,
}

/// Sum of squared residuals over a set of comparisons
pub fn sum_of_squares(comparisons: &[Comparison]) -> f64 {
    comparisons.iter().map(|c| c.residual.powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_series_are_aligned() {
        for data in [ExperimentalData::nf54(), ExperimentalData::dd2()] {
            for series in Series::ALL {
                assert_eq!(data.series(series).len(), data.len(), "{} {}", data.name(), series);
            }
        }
        let nf54 = ExperimentalData::nf54();
        assert_eq!(nf54.len(), 10);
        assert_eq!(nf54.series(Series::Hz)[1].sem, 0.0);
        assert_eq!(Reference::Dd2.load().time()[0], 20.0);
    }

    #[test]
    fn pairs_follow_the_haemoglobin_pool() {
        assert_eq!(default_pairs(true)[0], ("conc_hb_dv_obs", Series::Hb));
        assert_eq!(default_pairs(false)[0], ("conc_hb_dv", Series::Hb));
        assert_eq!(default_pairs(false)[2], ("conc_hz", Series::Hz));
    }
}
