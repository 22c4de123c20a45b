//! Seams between the optimizer core and its collaborators.
//!
//! The crate ships implementations for each (distance matrices, coordinate
//! lookup, `good_lp` backends, Nominatim); tests substitute their own.

use crate::backend::SolverKind;
use crate::geocode::GeocodingError;
use crate::mip::{CvrpInstance, MipOutcome, SolveLimits};
use crate::models::Coordinate;

/// Distance and travel time of one directed leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leg {
    pub miles: f64,
    pub hours: f64,
    /// Set when the leg is a fixed fallback rather than measured data.
    pub estimated: bool,
}

impl Leg {
    pub fn measured(miles: f64, hours: f64) -> Self {
        Self {
            miles,
            hours,
            estimated: false,
        }
    }
}

/// Provides travel metrics between named locations.
///
/// Returns `None` when the provider has no data for the pair, letting the
/// caller fall through to the next provider.
pub trait TravelMetrics {
    fn leg(&self, from: &str, to: &str) -> Option<Leg>;
}

/// A mixed-integer backend able to solve the CVRP formulation.
pub trait MipBackend {
    fn kind(&self) -> SolverKind;

    /// Blocking solve bounded by `limits`. Never panics on solver failure;
    /// failures are reported through [`MipOutcome::status`].
    fn solve(&self, instance: &CvrpInstance, limits: &SolveLimits) -> MipOutcome;
}

/// Resolves a free-form address to coordinates.
pub trait Geocoder {
    fn geocode(&self, address: &str) -> Result<Coordinate, GeocodingError>;
}
