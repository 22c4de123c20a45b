//! Cached pairwise metrics and the leg lookup chain used by the routers and
//! the cost model.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::warn;

use crate::geo::{DEFAULT_SPEED_MPH, GeoProvider};
use crate::models::Coordinate;
use crate::traits::{Leg, TravelMetrics};

/// Distance used when neither a matrix nor coordinates know a pair.
pub const DEFAULT_LEG_MILES: f64 = 50.0;

/// Pairwise distances (miles) and travel times (hours) keyed by ordered
/// location-name pairs.
///
/// Symmetric when built from coordinates; entries inserted by hand may be
/// directional. Treated as read-only once a solve starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistanceMatrix {
    pub locations: Vec<String>,
    pub distances: HashMap<(String, String), f64>,
    pub travel_times: HashMap<(String, String), f64>,
}

impl DistanceMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes every ordered pair of `named` points with `geo`.
    pub fn from_coordinates(named: &[(String, Coordinate)], geo: &GeoProvider) -> Self {
        let rows: Vec<Vec<((String, String), f64, f64)>> = named
            .par_iter()
            .map(|(from, a)| {
                named
                    .iter()
                    .map(|(to, b)| {
                        let miles = if from == to { 0.0 } else { geo.distance(*a, *b) };
                        ((from.clone(), to.clone()), miles, miles / geo.speed_mph)
                    })
                    .collect()
            })
            .collect();

        let mut matrix = Self {
            locations: named.iter().map(|(name, _)| name.clone()).collect(),
            ..Self::default()
        };
        for (key, miles, hours) in rows.into_iter().flatten() {
            matrix.distances.insert(key.clone(), miles);
            matrix.travel_times.insert(key, hours);
        }
        matrix
    }

    /// Adds or replaces one directed entry.
    pub fn insert(&mut self, from: &str, to: &str, miles: f64, hours: Option<f64>) {
        for name in [from, to] {
            if !self.locations.iter().any(|known| known == name) {
                self.locations.push(name.to_string());
            }
        }
        let key = (from.to_string(), to.to_string());
        if let Some(hours) = hours {
            self.travel_times.insert(key.clone(), hours);
        }
        self.distances.insert(key, miles);
    }

    pub fn distance(&self, from: &str, to: &str) -> Option<f64> {
        self.distances
            .get(&(from.to_string(), to.to_string()))
            .copied()
    }

    pub fn travel_time(&self, from: &str, to: &str) -> Option<f64> {
        self.travel_times
            .get(&(from.to_string(), to.to_string()))
            .copied()
    }

    /// The entry as a leg, timing distance-only entries at `speed_mph`.
    pub fn leg_at(&self, from: &str, to: &str, speed_mph: f64) -> Option<Leg> {
        let miles = self.distance(from, to)?;
        let hours = self.travel_time(from, to).unwrap_or(miles / speed_mph);
        Some(Leg::measured(miles, hours))
    }
}

impl TravelMetrics for DistanceMatrix {
    fn leg(&self, from: &str, to: &str) -> Option<Leg> {
        self.leg_at(from, to, DEFAULT_SPEED_MPH)
    }
}

/// Name → coordinate lookup measured with a [`GeoProvider`].
#[derive(Debug, Clone, Default)]
pub struct CoordinateIndex {
    points: HashMap<String, Coordinate>,
    geo: GeoProvider,
}

impl CoordinateIndex {
    pub fn new(geo: GeoProvider) -> Self {
        Self {
            points: HashMap::new(),
            geo,
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, point: Coordinate) {
        self.points.insert(name.into(), point);
    }

    pub fn get(&self, name: &str) -> Option<Coordinate> {
        self.points.get(name).copied()
    }

    pub fn geo(&self) -> &GeoProvider {
        &self.geo
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl TravelMetrics for CoordinateIndex {
    fn leg(&self, from: &str, to: &str) -> Option<Leg> {
        let a = self.get(from)?;
        let b = self.get(to)?;
        if from == to {
            return Some(Leg::measured(0.0, 0.0));
        }
        Some(Leg::measured(self.geo.distance(a, b), self.geo.travel_time(a, b)))
    }
}

/// Matrix first, then coordinates, then the fixed default leg.
#[derive(Debug, Clone, Copy)]
pub struct LegResolver<'a> {
    matrix: Option<&'a DistanceMatrix>,
    coordinates: Option<&'a CoordinateIndex>,
    speed_mph: f64,
}

impl<'a> LegResolver<'a> {
    pub fn new(
        matrix: Option<&'a DistanceMatrix>,
        coordinates: Option<&'a CoordinateIndex>,
    ) -> Self {
        Self {
            matrix,
            coordinates,
            speed_mph: DEFAULT_SPEED_MPH,
        }
    }

    /// Speed for matrix entries without a travel time and for the default leg.
    pub fn with_speed(mut self, speed_mph: f64) -> Self {
        self.speed_mph = speed_mph;
        self
    }

    /// Always yields a leg; the default is flagged `estimated`.
    pub fn resolve(&self, from: &str, to: &str) -> Leg {
        let speed = self.speed_mph;
        if let Some(leg) = self.matrix.and_then(|matrix| matrix.leg_at(from, to, speed)) {
            return leg;
        }
        if let Some(leg) = self.coordinates.and_then(|index| index.leg(from, to)) {
            return leg;
        }
        warn!(from, to, "no distance data for leg, using default estimate");
        Leg {
            miles: DEFAULT_LEG_MILES,
            hours: DEFAULT_LEG_MILES / speed,
            estimated: true,
        }
    }
}
