//! Cost model: route cost breakdowns, supplier assignment cost and
//! consolidation estimates.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geo::{DEFAULT_SPEED_MPH, GeoProvider};
use crate::matrix::{CoordinateIndex, DistanceMatrix, LegResolver};
use crate::models::{
    Coordinate, CostBreakdown, DEPOT, Route, Store, Supplier, TollSegment, Vehicle,
};
use crate::traits::Leg;

/// Pallet capacity assumed for a route whose vehicle is not known.
const STANDARD_TRAILER_PALLETS: u32 = 26;

/// Below this utilization the fleet is considered worth consolidating.
const CONSOLIDATION_THRESHOLD: f64 = 0.80;

const TARGET_UTILIZATION: f64 = 0.85;

/// Rates applied by the cost model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    pub fuel_cost_per_mile: f64,
    pub driver_cost_per_hour: f64,
    /// Per pallet, charged once per route.
    pub warehouse_handling_cost: f64,
    /// Toll rate per mile for legs missing from the toll table.
    pub default_toll_rate: f64,
    pub average_speed_mph: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            fuel_cost_per_mile: 0.65,
            driver_cost_per_hour: 25.0,
            warehouse_handling_cost: 15.0,
            default_toll_rate: 0.15,
            average_speed_mph: DEFAULT_SPEED_MPH,
        }
    }
}

/// Toll rates keyed by directed location-name pairs; lookups also try the
/// reverse direction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TollTable {
    rates: HashMap<(String, String), (f64, Option<f64>)>,
}

impl TollTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: &[TollSegment]) -> Self {
        let mut table = Self::new();
        for segment in segments {
            table.rates.insert(
                (segment.from_location.clone(), segment.to_location.clone()),
                (segment.rate_per_mile, segment.flat_rate),
            );
        }
        table
    }

    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>, rate_per_mile: f64) {
        self.rates.insert((from.into(), to.into()), (rate_per_mile, None));
    }

    /// `(rate_per_mile, flat_rate)` for the pair in either direction.
    pub fn lookup(&self, from: &str, to: &str) -> Option<(f64, Option<f64>)> {
        self.rates
            .get(&(from.to_string(), to.to_string()))
            .or_else(|| self.rates.get(&(to.to_string(), from.to_string())))
            .copied()
    }

    pub fn rate(&self, from: &str, to: &str) -> Option<f64> {
        self.lookup(from, to).map(|(rate, _)| rate)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Fleet utilization summary with a consolidation target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UtilizationOutlook {
    pub current_utilization: f64,
    pub target_utilization: f64,
    pub potential_cost_savings: f64,
    pub consolidation_opportunities: usize,
}

/// Converts routes into costs. Pure: no state changes after construction.
#[derive(Debug, Clone, Default)]
pub struct CostModel {
    config: CostConfig,
    tolls: TollTable,
    matrix: Option<DistanceMatrix>,
    coordinates: CoordinateIndex,
}

impl CostModel {
    pub fn new(config: CostConfig) -> Self {
        let geo = GeoProvider {
            speed_mph: config.average_speed_mph,
            ..GeoProvider::default()
        };
        Self {
            config,
            tolls: TollTable::new(),
            matrix: None,
            coordinates: CoordinateIndex::new(geo),
        }
    }

    pub fn with_tolls(mut self, tolls: TollTable) -> Self {
        self.tolls = tolls;
        self
    }

    pub fn with_distance_matrix(mut self, matrix: DistanceMatrix) -> Self {
        self.matrix = Some(matrix);
        self
    }

    /// Registers a named coordinate used when the matrix has no entry.
    pub fn with_location(mut self, name: impl Into<String>, point: Coordinate) -> Self {
        self.coordinates.insert(name, point);
        self
    }

    /// Registers every store under its stop name and the depot.
    pub fn with_stores(mut self, depot: Coordinate, stores: &[Store]) -> Self {
        self.coordinates.insert(DEPOT, depot);
        for store in stores {
            self.coordinates.insert(store.stop_name(), store.location.coordinate());
        }
        self
    }

    pub fn config(&self) -> &CostConfig {
        &self.config
    }

    pub fn tolls(&self) -> &TollTable {
        &self.tolls
    }

    pub fn geo(&self) -> &GeoProvider {
        self.coordinates.geo()
    }

    fn resolver(&self) -> LegResolver<'_> {
        let coordinates = (!self.coordinates.is_empty()).then_some(&self.coordinates);
        LegResolver::new(self.matrix.as_ref(), coordinates)
            .with_speed(self.config.average_speed_mph)
    }

    pub fn leg(&self, from: &str, to: &str) -> Leg {
        self.resolver().resolve(from, to)
    }

    pub fn distance_cost(&self, from: &str, to: &str, vehicle: &Vehicle) -> f64 {
        self.leg(from, to).miles * vehicle.cost_per_mile
    }

    pub fn time_cost(&self, from: &str, to: &str, vehicle: &Vehicle) -> f64 {
        self.leg(from, to).hours * vehicle.cost_per_hour
    }

    pub fn toll_cost(&self, from: &str, to: &str) -> f64 {
        self.toll_for(from, to, self.leg(from, to).miles)
    }

    fn toll_for(&self, from: &str, to: &str, miles: f64) -> f64 {
        match self.tolls.lookup(from, to) {
            Some((rate, flat)) => miles * rate + flat.unwrap_or(0.0),
            None => miles * self.config.default_toll_rate,
        }
    }

    pub fn handling_cost(&self, pallets: u32) -> f64 {
        pallets as f64 * self.config.warehouse_handling_cost
    }

    /// Itemized cost of driving `route.stops` in order.
    pub fn route_cost(&self, route: &Route) -> CostBreakdown {
        let resolver = self.resolver();
        let mut fuel_cost = 0.0;
        let mut driver_cost = 0.0;
        let mut toll_cost = 0.0;
        let mut total_distance = 0.0;
        let mut total_time = 0.0;
        let mut estimated_legs = 0;

        for pair in route.stops.windows(2) {
            let (from, to) = (pair[0].as_str(), pair[1].as_str());
            let leg = resolver.resolve(from, to);
            if leg.estimated {
                estimated_legs += 1;
            }

            total_distance += leg.miles;
            total_time += leg.hours;
            fuel_cost += leg.miles * self.config.fuel_cost_per_mile;
            driver_cost += leg.hours * self.config.driver_cost_per_hour;
            toll_cost += self.toll_for(from, to, leg.miles);
        }

        let handling_cost = self.handling_cost(route.pallets_delivered);
        let total_cost = fuel_cost + driver_cost + toll_cost + handling_cost;

        CostBreakdown {
            fuel_cost,
            driver_cost,
            toll_cost,
            handling_cost,
            total_cost,
            cost_per_pallet: total_cost / route.pallets_delivered.max(1) as f64,
            cost_per_mile: total_cost / total_distance.max(1.0),
            total_distance,
            total_time,
            estimated_legs,
        }
    }

    /// Cost of serving `store` from `supplier`.
    ///
    /// Transport is half the fuel of the straight-line distance (one-way share
    /// of a round trip). Lower-priority stores are scaled up so greedy
    /// assignment serves high-priority stores from the cheapest suppliers
    /// first.
    pub fn supplier_assignment_cost(&self, store: &Store, supplier: &Supplier) -> f64 {
        let base_cost = supplier.cost_per_pallet * store.demand_pallets as f64;
        let distance = self
            .geo()
            .distance(store.location.coordinate(), supplier.location.coordinate());
        let transportation_cost = distance * self.config.fuel_cost_per_mile * 0.5;
        let reliability_penalty = (1.0 - supplier.reliability_score) * base_cost * 0.1;
        let priority_factor = 1.0 + (store.priority as f64 - 1.0) * 0.05;

        (base_cost + transportation_cost + reliability_penalty) * priority_factor
    }

    /// Savings per route id from serving several stores on one trip instead
    /// of one round trip each. Routes with a single delivery are skipped.
    pub fn consolidation_savings(&self, routes: &[Route]) -> HashMap<String, f64> {
        let resolver = self.resolver();
        let mut savings = HashMap::new();

        for route in routes {
            let deliveries = route.delivery_stops();
            if deliveries.len() < 2 {
                continue;
            }
            let depot = route.stops[0].as_str();
            let individual: f64 = deliveries
                .iter()
                .map(|stop| {
                    resolver.resolve(depot, stop).miles * 2.0 * self.config.fuel_cost_per_mile
                })
                .sum();
            let saved = (individual - route.total_cost).max(0.0);
            debug!(
                route = %route.id,
                individual,
                actual = route.total_cost,
                saved,
                "consolidation estimate"
            );
            savings.insert(route.id.clone(), saved);
        }

        savings
    }

    /// Utilization of `routes` against their vehicles, with a consolidation
    /// target when utilization is low. `None` when the fleet is already well
    /// used.
    pub fn utilization_outlook(
        &self,
        routes: &[Route],
        vehicles: &[Vehicle],
    ) -> Option<UtilizationOutlook> {
        let capacity: u32 = routes
            .iter()
            .map(|route| {
                vehicles
                    .iter()
                    .find(|vehicle| vehicle.id == route.vehicle_id)
                    .map_or(STANDARD_TRAILER_PALLETS, |vehicle| vehicle.max_pallets)
            })
            .sum();
        let used: u32 = routes.iter().map(|route| route.pallets_delivered).sum();
        let utilization = used as f64 / capacity.max(1) as f64;

        if utilization >= CONSOLIDATION_THRESHOLD {
            return None;
        }

        let count = routes.len();
        Some(UtilizationOutlook {
            current_utilization: utilization,
            target_utilization: TARGET_UTILIZATION,
            potential_cost_savings: count as f64 * 0.15 * 1000.0,
            consolidation_opportunities: count
                - (count as f64 * TARGET_UTILIZATION).ceil() as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Location;

    fn chicago_milwaukee_model() -> CostModel {
        let mut matrix = DistanceMatrix::new();
        matrix.insert("Chicago", "Milwaukee", 90.0, None);
        matrix.insert("Milwaukee", "Chicago", 90.0, None);
        let mut tolls = TollTable::new();
        tolls.insert("Chicago", "Milwaukee", 0.15);
        CostModel::new(CostConfig::default())
            .with_distance_matrix(matrix)
            .with_tolls(tolls)
    }

    fn route_through(stops: &[&str], pallets: u32) -> Route {
        let mut route = Route::planned("truck", &[]);
        route.stops = stops.iter().map(|stop| stop.to_string()).collect();
        route.pallets_delivered = pallets;
        route
    }

    #[test]
    fn toll_uses_table_rate_in_both_directions() {
        let model = chicago_milwaukee_model();
        assert!((model.toll_cost("Chicago", "Milwaukee") - 13.5).abs() < 1e-9);
        assert!((model.toll_cost("Milwaukee", "Chicago") - 13.5).abs() < 1e-9);
        assert_eq!(model.tolls().rate("Milwaukee", "Chicago"), Some(0.15));
    }

    #[test]
    fn toll_defaults_when_pair_unknown() {
        let mut matrix = DistanceMatrix::new();
        matrix.insert("A", "B", 10.0, None);
        let config = CostConfig {
            default_toll_rate: 0.2,
            ..CostConfig::default()
        };
        let model = CostModel::new(config).with_distance_matrix(matrix);
        assert!((model.toll_cost("A", "B") - 2.0).abs() < 1e-9);
    }

    #[test]
    fn flat_rate_is_added_per_traversal() {
        let mut matrix = DistanceMatrix::new();
        matrix.insert("A", "B", 10.0, None);
        let mut segment = TollSegment::new("A", "B", 0.1).unwrap();
        segment.flat_rate = Some(4.0);
        let model = CostModel::new(CostConfig::default())
            .with_distance_matrix(matrix)
            .with_tolls(TollTable::from_segments(&[segment]));
        assert!((model.toll_cost("A", "B") - 5.0).abs() < 1e-9);
    }

    #[test]
    fn route_cost_components() {
        let model = chicago_milwaukee_model();
        let route = route_through(&["Chicago", "Milwaukee"], 10);
        let cost = model.route_cost(&route);

        assert!((cost.fuel_cost - 90.0 * 0.65).abs() < 1e-9);
        assert!((cost.driver_cost - 90.0 / 55.0 * 25.0).abs() < 1e-9);
        assert!((cost.toll_cost - 13.5).abs() < 1e-9);
        assert_eq!(cost.handling_cost, 150.0);
        assert_eq!(
            cost.total_cost,
            cost.fuel_cost + cost.driver_cost + cost.toll_cost + cost.handling_cost
        );
        assert!((cost.cost_per_pallet * 10.0 - cost.total_cost).abs() < 1e-9);
        assert!((cost.cost_per_mile - cost.total_cost / 90.0).abs() < 1e-12);
        assert!(!cost.is_estimated());
    }

    #[test]
    fn matrix_legs_are_timed_at_configured_speed() {
        let mut matrix = DistanceMatrix::new();
        matrix.insert("Chicago", "Milwaukee", 90.0, None);
        let config = CostConfig {
            average_speed_mph: 45.0,
            ..CostConfig::default()
        };
        let model = CostModel::new(config).with_distance_matrix(matrix);

        assert!((model.leg("Chicago", "Milwaukee").hours - 2.0).abs() < 1e-12);
        let cost = model.route_cost(&route_through(&["Chicago", "Milwaukee"], 1));
        assert!((cost.driver_cost - 2.0 * 25.0).abs() < 1e-9);
        assert!((cost.total_time - 2.0).abs() < 1e-12);
    }

    #[test]
    fn empty_route_guards_division() {
        let model = CostModel::default();
        let route = route_through(&["depot"], 0);
        let cost = model.route_cost(&route);
        assert_eq!(cost.total_cost, 0.0);
        assert_eq!(cost.cost_per_pallet, 0.0);
        assert_eq!(cost.cost_per_mile, 0.0);
    }

    #[test]
    fn zero_pallets_divides_by_one() {
        let model = chicago_milwaukee_model();
        let cost = model.route_cost(&route_through(&["Chicago", "Milwaukee"], 0));
        assert_eq!(cost.handling_cost, 0.0);
        assert_eq!(cost.cost_per_pallet, cost.total_cost);
    }

    #[test]
    fn unknown_legs_are_estimated() {
        let model = CostModel::new(CostConfig::default());
        let cost = model.route_cost(&route_through(&["depot", "Nowhere", "depot"], 4));
        assert_eq!(cost.estimated_legs, 2);
        assert!(cost.is_estimated());
        assert!((cost.total_distance - 100.0).abs() < 1e-9);
    }

    #[test]
    fn route_cost_is_idempotent() {
        let model = chicago_milwaukee_model();
        let route = route_through(&["Chicago", "Milwaukee", "Chicago"], 12);
        assert_eq!(model.route_cost(&route), model.route_cost(&route));
    }

    #[test]
    fn supplier_cost_formula() {
        let model = CostModel::new(CostConfig::default());
        let here = Location::new("Store", 41.8781, -87.6298).unwrap();
        let store = Store::new("S1", here.clone(), 40).unwrap().with_priority(3);
        let plant = Location::new("Plant", 41.8781, -87.6298).unwrap();
        let supplier = Supplier::new("P1", plant, 100, 10.0)
            .with_reliability(0.9)
            .unwrap();

        // Co-located: no transport component.
        let base = 400.0;
        let expected = (base + (1.0 - 0.9) * base * 0.1) * 1.1;
        assert!((model.supplier_assignment_cost(&store, &supplier) - expected).abs() < 1e-9);
    }

    #[test]
    fn consolidation_savings_floor_at_zero() {
        let mut matrix = DistanceMatrix::new();
        matrix.insert("depot", "A", 20.0, None);
        matrix.insert("depot", "B", 30.0, None);
        let model = CostModel::new(CostConfig::default()).with_distance_matrix(matrix);

        let mut multi = route_through(&["depot", "A", "B", "depot"], 10);
        multi.total_cost = 40.0;
        let mut expensive = route_through(&["depot", "A", "B", "depot"], 10);
        expensive.total_cost = 500.0;
        let single = route_through(&["depot", "A", "depot"], 5);

        let savings =
            model.consolidation_savings(&[multi.clone(), expensive.clone(), single.clone()]);
        let individual = (20.0 + 30.0) * 2.0 * 0.65;
        assert!((savings[&multi.id] - (individual - 40.0)).abs() < 1e-9);
        assert_eq!(savings[&expensive.id], 0.0);
        assert!(!savings.contains_key(&single.id));
    }

    #[test]
    fn utilization_outlook_flags_low_usage() {
        let model = CostModel::default();
        let vehicles = vec![Vehicle::new("truck", 26, 1.0, 1.0).unwrap()];
        let low: Vec<Route> = (0..4).map(|_| route_through(&["depot", "depot"], 10)).collect();

        let outlook = model.utilization_outlook(&low, &vehicles).unwrap();
        assert!((outlook.current_utilization - 40.0 / 104.0).abs() < 1e-12);
        assert_eq!(outlook.target_utilization, 0.85);
        assert_eq!(outlook.potential_cost_savings, 600.0);
        assert_eq!(outlook.consolidation_opportunities, 0);

        let full = vec![route_through(&["depot", "depot"], 25)];
        assert!(model.utilization_outlook(&full, &vehicles).is_none());
    }
}
