use super::species::{Species, HAEM_SPECIES};
use super::terms::{ProteaseRemoval, Redox, Transport};
use crate::simulator::{RateLaw, T, V};

/// Life-cycle driven network
///
/// - haemoglobin is transported exponentially into the digestive vacuole
/// - degradation is Michaelis–Menten, rate limited by HAP unless configured otherwise
/// - protease content grows with the same curve as the transport
/// - a portion of Fe(III) haem is sequestered in lipid nanospheres
#[derive(Debug, Clone, PartialEq)]
pub struct Model3 {
    transport: Transport,
    removal: ProteaseRemoval,
    redox: Redox,
}

impl Model3 {
    pub fn new(transport: Transport, removal: ProteaseRemoval, redox: Redox) -> Self {
        Model3 {
            transport,
            removal,
            redox,
        }
    }
}

impl RateLaw for Model3 {
    fn species(&self) -> &'static [Species] {
        &HAEM_SPECIES
    }

    fn evaluate(&self, t: T, y: &V, dy: &mut V) {
        let (hb_dv, fe2pp, fe3pp) = (y[0], y[1], y[2]);

        let degradation = self.removal.rate(t, hb_dv);
        let oxidation = self.redox.oxidation(fe2pp);
        let reduction = self.redox.reduction(fe3pp);
        let crystallization = self.redox.crystallization(fe3pp);

        dy[0] = self.transport.rate(t) - degradation;
        dy[1] = (degradation + reduction) - oxidation;
        dy[2] = oxidation - (reduction + crystallization);
        dy[3] = crystallization;
    }
}
