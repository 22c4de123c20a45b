//! Geo provider: great-circle distances and derived travel times.
//!
//! Distances default to the WGS-84 ellipsoidal geodesic. The spherical
//! haversine formula is available for callers that need to reproduce
//! figures computed that way; the two differ around the third decimal of a
//! mile, so fixtures must name the formula they were computed with.

use geo::{GeodesicDistance, Point};

use crate::models::Coordinate;

/// Average driving speed used for travel-time estimates.
pub const DEFAULT_SPEED_MPH: f64 = 55.0;

/// Earth radius in miles for the haversine formula.
const EARTH_RADIUS_MILES: f64 = 3959.0;

const METERS_PER_MILE: f64 = 1609.344;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceFormula {
    #[default]
    Geodesic,
    Haversine,
}

/// Stateless distance/time calculator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoProvider {
    pub formula: DistanceFormula,
    /// Assumed average driving speed in miles per hour.
    pub speed_mph: f64,
}

impl Default for GeoProvider {
    fn default() -> Self {
        Self {
            formula: DistanceFormula::Geodesic,
            speed_mph: DEFAULT_SPEED_MPH,
        }
    }
}

impl GeoProvider {
    pub fn new(formula: DistanceFormula, speed_mph: f64) -> Self {
        Self { formula, speed_mph }
    }

    /// Distance between two points in miles.
    pub fn distance(&self, from: Coordinate, to: Coordinate) -> f64 {
        match self.formula {
            DistanceFormula::Geodesic => geodesic_miles(from, to),
            DistanceFormula::Haversine => haversine_miles(from, to),
        }
    }

    /// Travel time in hours at the configured speed.
    pub fn travel_time(&self, from: Coordinate, to: Coordinate) -> f64 {
        self.distance(from, to) / self.speed_mph
    }

    /// Total length of a path visiting `points` in order.
    pub fn route_distance(&self, points: &[Coordinate]) -> f64 {
        points
            .windows(2)
            .map(|pair| self.distance(pair[0], pair[1]))
            .sum()
    }

    /// The `n` closest named points to `target`, nearest first.
    pub fn nearest<'a>(
        &self,
        target: Coordinate,
        points: &'a [(String, Coordinate)],
        n: usize,
    ) -> Vec<(&'a str, f64)> {
        let mut ranked: Vec<(&str, f64)> = points
            .iter()
            .map(|(name, point)| (name.as_str(), self.distance(target, *point)))
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked.truncate(n);
        ranked
    }

    pub fn within_radius(&self, center: Coordinate, target: Coordinate, radius_miles: f64) -> bool {
        self.distance(center, target) <= radius_miles
    }
}

/// Ellipsoidal geodesic distance in miles.
pub fn geodesic_miles(from: Coordinate, to: Coordinate) -> f64 {
    let a = Point::new(from.lon, from.lat);
    let b = Point::new(to.lon, to.lat);
    a.geodesic_distance(&b) / METERS_PER_MILE
}

/// Spherical haversine distance in miles.
pub fn haversine_miles(from: Coordinate, to: Coordinate) -> f64 {
    let lat1_rad = from.lat.to_radians();
    let lat2_rad = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lon = (to.lon - from.lon).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_MILES * c
}

/// Arithmetic mean of latitudes and longitudes.
///
/// Only meaningful for regional extents; it ignores curvature and breaks
/// across the antimeridian.
pub fn centroid(points: &[Coordinate]) -> Option<Coordinate> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let lat = points.iter().map(|p| p.lat).sum::<f64>() / n;
    let lon = points.iter().map(|p| p.lon).sum::<f64>() / n;
    Some(Coordinate::new(lat, lon))
}

/// Demand-weighted centroid, usable as a candidate depot location.
///
/// Mismatched or non-positive weights fall back to equal weighting.
pub fn weighted_centroid(points: &[Coordinate], weights: &[f64]) -> Option<Coordinate> {
    if points.is_empty() {
        return None;
    }
    let total: f64 = weights.iter().sum();
    if weights.len() != points.len() || total <= 0.0 {
        return centroid(points);
    }
    let lat = points.iter().zip(weights).map(|(p, w)| p.lat * w).sum::<f64>() / total;
    let lon = points.iter().zip(weights).map(|(p, w)| p.lon * w).sum::<f64>() / total;
    Some(Coordinate::new(lat, lon))
}

/// Axis-aligned bounds as `(min_lat, max_lat, min_lon, max_lon)`.
pub fn bounding_box(points: &[Coordinate]) -> Option<(f64, f64, f64, f64)> {
    let first = points.first()?;
    let init = (first.lat, first.lat, first.lon, first.lon);
    Some(points.iter().fold(init, |(min_lat, max_lat, min_lon, max_lon), p| {
        (
            min_lat.min(p.lat),
            max_lat.max(p.lat),
            min_lon.min(p.lon),
            max_lon.max(p.lon),
        )
    }))
}
