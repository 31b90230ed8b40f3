use serde::{Deserialize, Serialize};
use std::fmt;

/// Haemoglobin degrading proteases of the digestive vacuole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Enzyme {
    /// Plasmepsin I
    #[serde(alias = "plm_1")]
    Plasmepsin1,
    /// Plasmepsin II
    #[serde(alias = "plm_2")]
    Plasmepsin2,
    /// Histo-aspartic protease
    Hap,
    /// Plasmepsin IV
    #[serde(alias = "plm_4")]
    Plasmepsin4,
}

impl Enzyme {
    pub const ALL: [Enzyme; 4] = [
        Enzyme::Plasmepsin1,
        Enzyme::Plasmepsin2,
        Enzyme::Hap,
        Enzyme::Plasmepsin4,
    ];
}

impl fmt::Display for Enzyme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Enzyme::Plasmepsin1 => "plm_1",
            Enzyme::Plasmepsin2 => "plm_2",
            Enzyme::Hap => "hap",
            Enzyme::Plasmepsin4 => "plm_4",
        };
        write!(f, "{name}")
    }
}

/// Michaelis–Menten constants and abundance of a single protease
///
/// In settings files `ppm`, `kcat` and `km` must be given together.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EnzymeKinetics {
    /// Abundance in parts per million of the parasite proteome (paxDB)
    pub ppm: f64,
    /// Catalytic rate constant, in s-1
    pub kcat: f64,
    /// Michaelis constant, in M
    pub km: f64,
    /// Concentration in the digestive vacuole, in M
    ///
    /// Derived from `ppm` by [Parameters::compute](super::Parameters::compute).
    #[serde(default)]
    pub concentration: f64,
}

impl EnzymeKinetics {
    pub fn new(ppm: f64, kcat: f64, km: f64) -> Self {
        EnzymeKinetics {
            ppm,
            kcat,
            km,
            concentration: 0.0,
        }
    }

    /// Catalytic rate constant converted to min-1
    pub fn kcat_per_minute(&self) -> f64 {
        self.kcat * 60.0
    }
}

/// The closed set of proteases known to the model, keyed by [Enzyme]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Proteases {
    pub plm_1: EnzymeKinetics,
    pub plm_2: EnzymeKinetics,
    pub hap: EnzymeKinetics,
    pub plm_4: EnzymeKinetics,
}

impl Default for Proteases {
    // Abundances from paxDB. Rate constants from
    // https://www.sciencedirect.com/science/article/pii/0166685196026515 (plm_1, hap),
    // https://www.sciencedirect.com/science/article/abs/pii/S0731708503005661 (plm_2) and
    // https://pubs.acs.org/doi/abs/10.1021/bi048252q (plm_4).
    fn default() -> Self {
        Proteases {
            plm_1: EnzymeKinetics::new(754.0, 2.3, 0.49e-6),
            plm_2: EnzymeKinetics::new(585.0, 11.0, 2.6e-6),
            // Km of HAP is unknown
            hap: EnzymeKinetics::new(1_373.0, 0.1, 0.0),
            plm_4: EnzymeKinetics::new(1_377.0, 1.05, 0.33e-6),
        }
    }
}

impl Proteases {
    pub fn get(&self, enzyme: Enzyme) -> &EnzymeKinetics {
        match enzyme {
            Enzyme::Plasmepsin1 => &self.plm_1,
            Enzyme::Plasmepsin2 => &self.plm_2,
            Enzyme::Hap => &self.hap,
            Enzyme::Plasmepsin4 => &self.plm_4,
        }
    }

    pub fn get_mut(&mut self, enzyme: Enzyme) -> &mut EnzymeKinetics {
        match enzyme {
            Enzyme::Plasmepsin1 => &mut self.plm_1,
            Enzyme::Plasmepsin2 => &mut self.plm_2,
            Enzyme::Hap => &mut self.hap,
            Enzyme::Plasmepsin4 => &mut self.plm_4,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Enzyme, &EnzymeKinetics)> + '_ {
        Enzyme::ALL.into_iter().map(move |enzyme| (enzyme, self.get(enzyme)))
    }
}
