use super::species::{Species, HAEM_SPECIES};
use super::terms::Redox;
use crate::parameters::Parameters;
use crate::simulator::{RateLaw, T, V};

/// Constant transport with lipid sequestration of Fe(III) haem
///
/// Degradation acts on haemoglobin molecules (`[Hb]dv / 4`), and only the fraction of Fe(III)
/// haem left outside the lipid nanospheres is reduced or crystallized.
#[derive(Debug, Clone, PartialEq)]
pub struct Model2 {
    k_hb_trans: f64,
    source: f64,
    k_hb_deg: f64,
    haems_per_hb: f64,
    redox: Redox,
}

impl Model2 {
    pub fn new(parameters: &Parameters, source: f64) -> Self {
        Model2 {
            k_hb_trans: parameters.k_hb_trans,
            source,
            k_hb_deg: parameters.k_hb_deg,
            haems_per_hb: parameters.haems_per_hb,
            redox: Redox::new(parameters, parameters.lipid_sequestration_fraction()),
        }
    }
}

impl RateLaw for Model2 {
    fn species(&self) -> &'static [Species] {
        &HAEM_SPECIES
    }

    fn evaluate(&self, _t: T, y: &V, dy: &mut V) {
        let (hb_dv, fe2pp, fe3pp) = (y[0], y[1], y[2]);

        let degradation = self.k_hb_deg * hb_dv / self.haems_per_hb;
        let oxidation = self.redox.oxidation(fe2pp);
        let reduction = self.redox.reduction(fe3pp);
        let crystallization = self.redox.crystallization(fe3pp);

        dy[0] = self.k_hb_trans * self.source - degradation;
        dy[1] = (degradation + reduction) - oxidation;
        dy[2] = oxidation - (reduction + crystallization);
        dy[3] = crystallization;
    }
}
