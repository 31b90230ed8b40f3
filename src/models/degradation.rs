use super::species::{Species, DEGRADATION_SPECIES};
use super::terms::{ProteaseRemoval, Transport};
use crate::simulator::{RateLaw, T, V};

/// Haemoglobin delivery and degradation without the downstream haem chemistry
///
/// `conc_hb_dv` accumulates every haemoglobin delivered to the digestive vacuole and
/// `conc_fe2pp` every haem released from it, so the haemoglobin still present is their
/// difference (the observed pool of the report).
#[derive(Debug, Clone, PartialEq)]
pub struct Degradation {
    transport: Transport,
    removal: ProteaseRemoval,
}

impl Degradation {
    pub fn new(transport: Transport, removal: ProteaseRemoval) -> Self {
        Degradation { transport, removal }
    }
}

impl RateLaw for Degradation {
    fn species(&self) -> &'static [Species] {
        &DEGRADATION_SPECIES
    }

    fn evaluate(&self, t: T, y: &V, dy: &mut V) {
        dy[0] = self.transport.rate(t);
        dy[1] = self.removal.rate(t, y[0]);
    }
}
