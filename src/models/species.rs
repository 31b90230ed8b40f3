use std::fmt;

use crate::error::KineticsError;
use crate::simulator::V;

/// Haem species tracked by the models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Species {
    /// Haemoglobin in the digestive vacuole, in haem equivalents
    HbDv,
    /// Free Fe(II) haem
    Fe2pp,
    /// Free Fe(III) haem
    Fe3pp,
    /// Haemozoin
    Hz,
}

impl Species {
    /// Stable column identifier of the species
    pub fn name(&self) -> &'static str {
        match self {
            Species::HbDv => "conc_hb_dv",
            Species::Fe2pp => "conc_fe2pp",
            Species::Fe3pp => "conc_fe3pp",
            Species::Hz => "conc_hz",
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Species order of the four-species networks
pub const HAEM_SPECIES: [Species; 4] = [Species::HbDv, Species::Fe2pp, Species::Fe3pp, Species::Hz];

/// Species order of the two-species degradation network
pub const DEGRADATION_SPECIES: [Species; 2] = [Species::HbDv, Species::Fe2pp];

/// Position of `species` in an ordered species list
pub fn index_of(order: &[Species], species: Species) -> Option<usize> {
    order.iter().position(|&s| s == species)
}

/// Concentrations (in M) of an ordered, fixed set of species
///
/// The order of `species` is the order of the vector handed to and returned by the integrator.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesState {
    species: &'static [Species],
    values: V,
}

impl SpeciesState {
    /// All-zero state for the given species order
    pub fn zeros(species: &'static [Species]) -> Self {
        SpeciesState {
            species,
            values: V::zeros(species.len()),
        }
    }

    /// Builds a state from concentrations given in species order
    pub fn from_slice(species: &'static [Species], values: &[f64]) -> Result<Self, KineticsError> {
        if values.len() != species.len() {
            return Err(KineticsError::InitialStateLength {
                expected: species.len(),
                found: values.len(),
            });
        }
        Ok(SpeciesState {
            species,
            values: V::from_column_slice(values),
        })
    }

    pub fn species(&self) -> &'static [Species] {
        self.species
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn get(&self, species: Species) -> Option<f64> {
        index_of(self.species, species).map(|i| self.values[i])
    }

    pub fn values(&self) -> &V {
        &self.values
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }

    /// Sum of all tracked concentrations
    pub fn total(&self) -> f64 {
        self.values.sum()
    }

    /// `(species, concentration)` pairs in species order
    pub fn iter(&self) -> impl Iterator<Item = (Species, f64)> + '_ {
        self.species.iter().copied().zip(self.values.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_is_preserved() {
        let state = SpeciesState::from_slice(&HAEM_SPECIES, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let names: Vec<&str> = state.iter().map(|(s, _)| s.name()).collect();
        assert_eq!(names, vec!["conc_hb_dv", "conc_fe2pp", "conc_fe3pp", "conc_hz"]);
        assert_eq!(state.get(Species::Fe3pp), Some(3.0));
        assert_eq!(state.total(), 10.0);
    }

    #[test]
    fn cardinality_is_checked() {
        let err = SpeciesState::from_slice(&DEGRADATION_SPECIES, &[0.0, 0.0, 0.0]).unwrap_err();
        assert_eq!(
            err,
            KineticsError::InitialStateLength {
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn untracked_species_is_absent() {
        let state = SpeciesState::zeros(&DEGRADATION_SPECIES);
        assert_eq!(state.get(Species::Hz), None);
        assert_eq!(state.to_vec(), vec![0.0, 0.0]);
    }
}
