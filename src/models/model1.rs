use super::species::{Species, HAEM_SPECIES};
use super::terms::Redox;
use crate::parameters::Parameters;
use crate::simulator::{RateLaw, T, V};

/// Simplest haemoglobin catabolism network
///
/// Haemoglobin enters the digestive vacuole at a constant rate and is degraded with the observed
/// first-order rate constant. O2- is taken as 0 M because of superoxide dismutase, so Fe(III)
/// haem reduction vanishes numerically. The network predicts haemozoin accumulation over the
/// trophozoite stage but cannot sustain the basal free haem levels.
#[derive(Debug, Clone, PartialEq)]
pub struct Model1 {
    k_hb_trans: f64,
    source: f64,
    k_hb_deg: f64,
    redox: Redox,
}

impl Model1 {
    pub fn new(parameters: &Parameters, source: f64) -> Self {
        Model1 {
            k_hb_trans: parameters.k_hb_trans,
            source,
            k_hb_deg: parameters.k_hb_deg,
            redox: Redox::new(parameters, 1.0),
        }
    }
}

impl RateLaw for Model1 {
    fn species(&self) -> &'static [Species] {
        &HAEM_SPECIES
    }

    fn evaluate(&self, _t: T, y: &V, dy: &mut V) {
        let (hb_dv, fe2pp, fe3pp) = (y[0], y[1], y[2]);

        let degradation = self.k_hb_deg * hb_dv;
        let oxidation = self.redox.oxidation(fe2pp);
        let reduction = self.redox.reduction(fe3pp);
        let crystallization = self.redox.crystallization(fe3pp);

        dy[0] = self.k_hb_trans * self.source - degradation;
        dy[1] = (degradation + reduction) - oxidation;
        dy[2] = oxidation - (reduction + crystallization);
        dy[3] = crystallization;
    }
}
