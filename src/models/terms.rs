//! Reaction terms shared by the rate laws

use serde::{Deserialize, Serialize};

use crate::parameters::{Enzyme, Parameters};

/// Michaelis–Menten rate `kcat [E] / (Km + [S])`
///
/// A zero denominator yields a zero rate.
pub fn michaelis_menten(kcat: f64, enzyme_conc: f64, km: f64, substrate: f64) -> f64 {
    let denom = km + substrate;
    if denom == 0.0 {
        return 0.0;
    }
    kcat * enzyme_conc / denom
}

/// Exponential curve `a e^(b t)` fitted to the life-cycle stage of the parasite
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Growth {
    pub a: f64,
    pub b: f64,
}

impl Growth {
    /// Fractional growth of haemoglobin uptake and protease content, t in minutes
    pub const FRACTION: Growth = Growth {
        a: 0.1578,
        b: 0.001102,
    };

    /// Haemoglobin uptake in fg Fe per cell, t in minutes
    pub const UPTAKE: Growth = Growth { a: 13.1, b: 8.3e-4 };

    /// `a e^(b t)`
    pub fn value(&self, t: f64) -> f64 {
        self.a * (self.b * t).exp()
    }

    /// `a b e^(b t)`
    pub fn rate(&self, t: f64) -> f64 {
        self.a * self.b * (self.b * t).exp()
    }
}

/// Shape of the haemoglobin transport into the digestive vacuole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportCurve {
    /// `k_hb_trans * [Hb]rbc`
    #[default]
    Constant,
    /// `a e^(b t) * [Hb]rbc / dilution`
    Exponential,
    /// `a b e^(b t) / atomic weight of Fe`, from the fitted uptake curve
    ExponentialDerivative,
    /// Derivative of a log-logistic curve in `ln t`
    Sigmoid,
}

/// Constants of the transport curves
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct TransportConstants {
    pub fraction: Growth,
    pub uptake: Growth,
    /// Dilution of the RBC haemoglobin pool for exponential transport
    pub dilution: f64,
    /// Atomic weight of Fe, in g/mol
    pub atomic_weight: f64,
    pub sigmoid_top: f64,
    pub sigmoid_bottom: f64,
    pub sigmoid_k: f64,
    pub sigmoid_h: f64,
}

impl Default for TransportConstants {
    fn default() -> Self {
        TransportConstants {
            fraction: Growth::FRACTION,
            uptake: Growth::UPTAKE,
            // TODO: derive from vol_rbc / vol_dv once the uptake volume is measured
            dilution: 40.0,
            atomic_weight: 55.845,
            sigmoid_top: 1.924,
            sigmoid_bottom: 0.5633,
            sigmoid_k: 7.121,
            sigmoid_h: 2.493,
        }
    }
}

/// Formation of digestive vacuole haemoglobin
#[derive(Debug, Clone, PartialEq)]
pub struct Transport {
    pub curve: TransportCurve,
    pub constants: TransportConstants,
    pub k_hb_trans: f64,
    /// Haemoglobin (haem) concentration of the source compartment
    pub source: f64,
}

impl Transport {
    pub fn rate(&self, t: f64) -> f64 {
        let c = &self.constants;
        match self.curve {
            TransportCurve::Constant => self.k_hb_trans * self.source,
            TransportCurve::Exponential => c.fraction.value(t) * self.source / c.dilution,
            TransportCurve::ExponentialDerivative => c.uptake.rate(t) / c.atomic_weight,
            TransportCurve::Sigmoid => {
                let ln_t = if t > 0.0 { t.ln() } else { 0.0 };
                let h = c.sigmoid_h;
                let e = (h * (c.sigmoid_k - ln_t)).exp();
                h * (c.sigmoid_top - c.sigmoid_bottom) * e / (1.0 + e).powi(2)
            }
        }
    }
}

/// A protease taking part in haemoglobin degradation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveProtease {
    pub enzyme: Enzyme,
    /// min-1
    pub kcat: f64,
    pub km: f64,
    pub concentration: f64,
}

/// Michaelis–Menten degradation of haemoglobin by a set of proteases
///
/// The substrate is haemoglobin (`[Hb]dv / haems_per_hb`). Each protease contributes
/// `kcat [E](t) / (Km + [S]) * [S]` haemoglobin per minute, which releases `haems_per_hb` haems.
/// Protease content follows the fractional growth curve and is scaled down by the fudge factor.
#[derive(Debug, Clone, PartialEq)]
pub struct ProteaseRemoval {
    pub proteases: Vec<ActiveProtease>,
    pub growth: Growth,
    pub fudge: f64,
    pub haems_per_hb: f64,
}

impl ProteaseRemoval {
    pub fn new(parameters: &Parameters, enzymes: &[Enzyme], growth: Growth) -> Self {
        let proteases = enzymes
            .iter()
            .map(|&enzyme| {
                let kinetics = parameters.proteases.get(enzyme);
                ActiveProtease {
                    enzyme,
                    kcat: kinetics.kcat_per_minute(),
                    km: kinetics.km,
                    concentration: kinetics.concentration,
                }
            })
            .collect();
        ProteaseRemoval {
            proteases,
            growth,
            fudge: parameters.fudge,
            haems_per_hb: parameters.haems_per_hb,
        }
    }

    /// Haem released per minute from `conc_hb_dv` (in haem equivalents)
    pub fn rate(&self, t: f64, conc_hb_dv: f64) -> f64 {
        let substrate = conc_hb_dv / self.haems_per_hb;
        let growth = self.growth.value(t);
        let per_substrate: f64 = self
            .proteases
            .iter()
            .map(|p| michaelis_menten(p.kcat, growth * p.concentration / self.fudge, p.km, substrate))
            .sum();
        self.haems_per_hb * per_substrate * substrate
    }
}

/// Fe(II)/Fe(III) interconversion and haemozoin formation
///
/// `lipid` multiplies the terms that consume Fe(III) haem. It is 1 for networks without lipid
/// partitioning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Redox {
    pub k_fe2pp_ox: f64,
    pub conc_oxy: f64,
    pub k_fe3pp_red: f64,
    pub conc_supoxy: f64,
    pub k_hz: f64,
    pub lipid: f64,
}

impl Redox {
    pub fn new(parameters: &Parameters, lipid: f64) -> Self {
        Redox {
            k_fe2pp_ox: parameters.k_fe2pp_ox,
            conc_oxy: parameters.conc_oxy,
            k_fe3pp_red: parameters.k_fe3pp_red,
            conc_supoxy: parameters.conc_supoxy,
            k_hz: parameters.k_hz,
            lipid,
        }
    }

    pub fn oxidation(&self, fe2pp: f64) -> f64 {
        self.k_fe2pp_ox * fe2pp * self.conc_oxy
    }

    pub fn reduction(&self, fe3pp: f64) -> f64 {
        self.k_fe3pp_red * self.lipid * fe3pp * self.conc_supoxy
    }

    pub fn crystallization(&self, fe3pp: f64) -> f64 {
        self.k_hz * self.lipid * fe3pp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn michaelis_menten_zero_denominator() {
        assert_eq!(michaelis_menten(6.0, 1e-4, 0.0, 0.0), 0.0);
        assert!((michaelis_menten(6.0, 1e-4, 0.0, 2e-4) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn growth_curves() {
        assert_eq!(Growth::FRACTION.value(0.0), 0.1578);
        assert!((Growth::UPTAKE.rate(0.0) - 13.1 * 8.3e-4).abs() < 1e-15);
        assert!(Growth::FRACTION.value(1760.0) > Growth::FRACTION.value(0.0));
    }

    #[test]
    fn sigmoid_transport_is_finite_at_origin() {
        let transport = Transport {
            curve: TransportCurve::Sigmoid,
            constants: TransportConstants::default(),
            k_hb_trans: 0.0011,
            source: 0.2,
        };
        for t in [0.0, 1e-6, 1.0, 1240.0, 1760.0] {
            let rate = transport.rate(t);
            assert!(rate.is_finite() && rate >= 0.0);
        }
    }

    #[test]
    fn removal_uses_haemoglobin_as_substrate() {
        let parameters = Parameters::computed().unwrap();
        let removal = ProteaseRemoval::new(&parameters, &[Enzyme::Hap], Growth::FRACTION);
        assert_eq!(removal.rate(0.0, 0.0), 0.0);

        // With Km = 0 the removal is zero order in haemoglobin
        let hap = parameters.proteases.hap;
        let expected = 4.0 * hap.kcat_per_minute() * 0.1578 * hap.concentration / parameters.fudge;
        assert!((removal.rate(0.0, 1e-3) - expected).abs() < 1e-15);
        assert!((removal.rate(0.0, 5e-3) - expected).abs() < 1e-15);
    }

    #[test]
    fn superoxide_free_reduction_vanishes() {
        let parameters = Parameters::computed().unwrap();
        let redox = Redox::new(&parameters, parameters.lipid_sequestration_fraction());
        assert_eq!(redox.reduction(1e-3), 0.0);
        assert!(redox.oxidation(1e-6) > 0.0);
    }
}
