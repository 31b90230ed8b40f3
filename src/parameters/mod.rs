pub mod enzymes;

use serde::{Deserialize, Serialize};

use crate::error::KineticsError;
pub use enzymes::{Enzyme, EnzymeKinetics, Proteases};

/// Physical and chemical constants required by the rate laws
///
/// A freshly constructed [Parameters] only holds the literature inputs. The derived quantities
/// (`conc_hb_rbc`, `k_hb_deg` and the protease concentrations) stay at zero until
/// [Parameters::compute] is called. A zero `k_hb_deg` therefore means that initialization was
/// skipped, see [Parameters::is_computed].
///
/// Every field can be overridden from the `[parameters]` section of the settings file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Parameters {
    /// Haem concentration in the red blood cell, in M (derived)
    pub conc_hb_rbc: f64,
    /// Oxygen concentration, in M, based on the Hb saturation curve (30% at 3% O2)
    pub conc_oxy: f64,
    /// Superoxide concentration, in M, assumed to be 0 because of superoxide dismutase
    pub conc_supoxy: f64,

    /// Rate constant for the transport of haemoglobin into the digestive vacuole
    pub k_hb_trans: f64,
    /// Observed rate constant for the degradation of haemoglobin (derived)
    pub k_hb_deg: f64,
    /// Rate of Fe(II) haem oxidation by O2, see https://pubs.acs.org/doi/pdf/10.1021/bi00878a025
    pub k_fe2pp_ox: f64,
    /// Rate of Fe(III) haem reduction by O2-
    ///
    /// Unknown, but irrelevant while `conc_supoxy` is 0.
    pub k_fe3pp_red: f64,
    /// Rate of haemozoin formation, in min-1, see https://link.springer.com/article/10.1186/1475-2875-11-337
    pub k_hz: f64,

    /// Fe(III)PPIX lipid partitioning coefficient
    pub k_partition: f64,

    pub avogadro: f64,
    /// Scales the RBC haemoglobin concentration up and the protease concentrations down
    pub fudge: f64,
    /// Average number of proteins in a P. falciparum parasite
    pub num_prots: f64,

    /// Volume of the digestive vacuole, in L
    pub vol_dv: f64,
    /// Volume of the red blood cell, in L
    pub vol_rbc: f64,
    /// Fractional volume of the lipid nanospheres relative to the digestive vacuole
    pub vol_fract_lip: f64,

    /// Average haemoglobin concentration in the RBC, in g/dL (https://medlineplus.gov/ency/article/003648.htm)
    pub hb_density: f64,
    /// Molecular weight of haemoglobin, in g/mol
    pub hb_molecular_weight: f64,
    /// Number of haems per haemoglobin molecule
    pub haems_per_hb: f64,

    pub proteases: Proteases,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            conc_hb_rbc: 0.0,
            conc_oxy: 1e-3,
            conc_supoxy: 0.0,
            k_hb_trans: 0.0011,
            k_hb_deg: 0.0,
            k_fe2pp_ox: 193_800.0,
            k_fe3pp_red: 180e-9,
            k_hz: 0.12,
            k_partition: 398.0,
            avogadro: 6.022e23,
            fudge: 10.0,
            num_prots: 1.9e8,
            vol_dv: 1e-15,
            vol_rbc: 90e-15,
            vol_fract_lip: 0.016,
            hb_density: 34.0,
            hb_molecular_weight: 64_500.0,
            haems_per_hb: 4.0,
            proteases: Proteases::default(),
        }
    }
}

impl Parameters {
    pub fn new() -> Self {
        Parameters::default()
    }

    /// Default inputs with all derived quantities computed
    pub fn computed() -> Result<Self, KineticsError> {
        let mut parameters = Parameters::default();
        parameters.compute()?;
        Ok(parameters)
    }

    /// Validates the inputs and derives every dependent quantity
    ///
    /// Must be called before any rate law is evaluated.
    pub fn compute(&mut self) -> Result<(), KineticsError> {
        self.validate()?;
        self.compute_conc_hb_rbc();
        self.compute_rate_hb_deg();
        tracing::debug!(
            "Derived conc_hb_rbc = {:.4e} M and k_hb_deg = {:.4e}",
            self.conc_hb_rbc,
            self.k_hb_deg
        );
        Ok(())
    }

    /// False while the derived degradation rate is still zero
    pub fn is_computed(&self) -> bool {
        self.k_hb_deg > 0.0
    }

    /// Checks that concentrations and rate constants are non-negative and volumes positive
    pub fn validate(&self) -> Result<(), KineticsError> {
        for (name, value) in [
            ("vol_dv", self.vol_dv),
            ("vol_rbc", self.vol_rbc),
        ] {
            if !(value.is_finite() && value > 0.0) {
                tracing::error!("Parameter {} must be strictly positive, got {}", name, value);
                return Err(KineticsError::InvalidVolume(value));
            }
        }

        let non_negative = [
            ("conc_hb_rbc", self.conc_hb_rbc),
            ("conc_oxy", self.conc_oxy),
            ("conc_supoxy", self.conc_supoxy),
            ("k_hb_trans", self.k_hb_trans),
            ("k_hb_deg", self.k_hb_deg),
            ("k_fe2pp_ox", self.k_fe2pp_ox),
            ("k_fe3pp_red", self.k_fe3pp_red),
            ("k_hz", self.k_hz),
            ("k_partition", self.k_partition),
            ("num_prots", self.num_prots),
            ("hb_density", self.hb_density),
            ("haems_per_hb", self.haems_per_hb),
        ];
        for (name, value) in non_negative {
            check_non_negative(name, value)?;
        }

        for (name, value) in [
            ("avogadro", self.avogadro),
            ("fudge", self.fudge),
            ("hb_molecular_weight", self.hb_molecular_weight),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(KineticsError::InvalidParameter { name, value });
            }
        }

        if !(0.0..1.0).contains(&self.vol_fract_lip) {
            return Err(KineticsError::InvalidParameter {
                name: "vol_fract_lip",
                value: self.vol_fract_lip,
            });
        }

        for (_, kinetics) in self.proteases.iter() {
            check_non_negative("ppm", kinetics.ppm)?;
            check_non_negative("kcat", kinetics.kcat)?;
            check_non_negative("km", kinetics.km)?;
        }
        Ok(())
    }

    /// Converts the abundance of a digestive vacuole protein from ppm to M
    ///
    /// mol = ppm * 1e-6 * (number of proteins in the cell) / (Avogadro's constant)
    /// M = mol / (volume of the digestive vacuole)
    pub fn ppm_to_molar(&self, ppm: f64) -> f64 {
        let fraction = ppm * 1e-6;
        let moles = fraction * self.num_prots / self.avogadro;
        moles / self.vol_dv
    }

    /// Haem concentration in the red blood cell, in M, before the fudge factor is applied
    pub fn haem_conc_rbc(&self) -> f64 {
        // There are 0.1 dL in 1 L
        let grams_per_litre = self.hb_density / 0.1;
        let hb_molar = grams_per_litre / self.hb_molecular_weight;
        hb_molar * self.haems_per_hb
    }

    pub fn compute_conc_hb_rbc(&mut self) {
        self.conc_hb_rbc = self.haem_conc_rbc() * self.fudge;
    }

    /// Observed rate constant, in min-1, from the Michaelis–Menten constants
    ///
    /// `kcat` is expected in s-1. A zero denominator yields a zero rate.
    pub fn k_obs(kcat: f64, km: f64, enzyme_conc: f64) -> f64 {
        let denom = km + enzyme_conc;
        if denom == 0.0 {
            return 0.0;
        }
        kcat * enzyme_conc / denom * 60.0
    }

    /// Derives the protease concentrations and the overall degradation rate constant
    pub fn compute_rate_hb_deg(&mut self) {
        for enzyme in Enzyme::ALL {
            let ppm = self.proteases.get(enzyme).ppm;
            self.proteases.get_mut(enzyme).concentration = self.ppm_to_molar(ppm);
        }

        self.k_hb_deg = self
            .proteases
            .iter()
            .map(|(_, e)| Self::k_obs(e.kcat, e.km, e.concentration) * e.concentration)
            .sum();
    }

    /// Fraction of Fe(III) haem that is not sequestered into the lipid phase
    pub fn lipid_sequestration_fraction(&self) -> f64 {
        let f_lip = self.vol_fract_lip;
        (1.0 - f_lip) / (1.0 + f_lip + f_lip * self.k_partition)
    }

    /// Ratio used to express a digestive vacuole amount as an RBC concentration
    pub fn volume_ratio(&self) -> f64 {
        self.vol_dv / self.vol_rbc
    }
}

/// Source concentration left in the red blood cell once the initially tracked haem is accounted for
///
/// Always derived from the untouched `base` value, so repeated runs do not compound the
/// subtraction. Never negative.
pub fn effective_source_concentration(base: f64, initial_tracked_total: f64, volume_ratio: f64) -> f64 {
    (base - initial_tracked_total * volume_ratio).max(0.0)
}

fn check_non_negative(name: &'static str, value: f64) -> Result<(), KineticsError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(KineticsError::InvalidParameter { name, value })
    }
}
