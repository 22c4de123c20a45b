//! Greedy nearest-neighbor route construction.
//!
//! Each available vehicle in turn leaves the depot and repeatedly drives to
//! the nearest unassigned store that still fits its remaining capacity. The
//! route closes when nothing fits; construction stops when every store is
//! placed or the vehicles run out. O(n²) per vehicle.

use tracing::{debug, warn};

use crate::geo::GeoProvider;
use crate::models::{Coordinate, Route, Store, Vehicle};

/// Routes plus the stores no vehicle could take.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicPlan {
    pub routes: Vec<Route>,
    /// Store ids, in input order.
    pub unassigned: Vec<String>,
}

/// Builds routes from `depot` for `stores` using the available `vehicles`.
///
/// Stores whose demand exceeds every remaining vehicle's capacity are
/// skipped and reported in [`HeuristicPlan::unassigned`].
pub fn nearest_neighbor(
    stores: &[Store],
    vehicles: &[Vehicle],
    depot: Coordinate,
    geo: &GeoProvider,
) -> HeuristicPlan {
    let mut assigned = vec![false; stores.len()];
    let mut routes = Vec::new();

    for vehicle in vehicles.iter().filter(|vehicle| vehicle.available) {
        if assigned.iter().all(|&done| done) {
            break;
        }

        let mut visits: Vec<usize> = Vec::new();
        let mut load = 0;
        let mut current = depot;

        while load < vehicle.max_pallets {
            let mut best: Option<(usize, f64)> = None;
            for (index, store) in stores.iter().enumerate() {
                if assigned[index] || load + store.demand_pallets > vehicle.max_pallets {
                    continue;
                }
                let distance = geo.distance(current, store.location.coordinate());
                if best.is_none_or(|(_, nearest)| distance < nearest) {
                    best = Some((index, distance));
                }
            }

            let Some((next, _)) = best else { break };
            assigned[next] = true;
            visits.push(next);
            load += stores[next].demand_pallets;
            current = stores[next].location.coordinate();
        }

        if visits.is_empty() {
            continue;
        }

        let route_stores: Vec<&Store> = visits.iter().map(|&index| &stores[index]).collect();
        let route = measure_route(vehicle, &route_stores, depot, geo);
        debug!(
            vehicle = %vehicle.id,
            stops = route_stores.len(),
            pallets = route.pallets_delivered,
            miles = route.total_distance,
            "built nearest-neighbor route"
        );
        routes.push(route);
    }

    let unassigned: Vec<String> = stores
        .iter()
        .zip(&assigned)
        .filter(|(_, done)| !**done)
        .map(|(store, _)| store.id.clone())
        .collect();
    if !unassigned.is_empty() {
        warn!(count = unassigned.len(), stores = ?unassigned, "stores left unassigned");
    }

    HeuristicPlan { routes, unassigned }
}

/// A planned route for `stores` with distance and time along
/// depot → stores → depot and the vehicle's operating cost.
pub fn measure_route(
    vehicle: &Vehicle,
    stores: &[&Store],
    depot: Coordinate,
    geo: &GeoProvider,
) -> Route {
    let mut path = Vec::with_capacity(stores.len() + 2);
    path.push(depot);
    path.extend(stores.iter().map(|store| store.location.coordinate()));
    path.push(depot);

    let mut route = Route::planned(vehicle.id.clone(), stores);
    for pair in path.windows(2) {
        route.total_distance += geo.distance(pair[0], pair[1]);
        route.total_time += geo.travel_time(pair[0], pair[1]);
    }
    route.total_cost = vehicle.operating_cost(route.total_distance, route.total_time);
    route
}
