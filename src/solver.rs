//! Pallet delivery optimizer.
//!
//! [`PalletOptimizer`] owns the configuration and cost model and exposes the
//! three planning operations: exact routing with heuristic fallback, direct
//! heuristic routing, and greedy supplier assignment.

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::assignment::{self, CapacityLedger, SupplierAssignment};
use crate::backend::{self, SolverUnavailableError};
use crate::config::OptimizerConfig;
use crate::cost::CostModel;
use crate::geo::GeoProvider;
use crate::heuristic;
use crate::matrix::DistanceMatrix;
use crate::mip::{self, CvrpInstance, MipOutcome};
use crate::models::{
    Coordinate, DEPOT, MipStatus, OptimizationResult, Route, SolverStatus, Store, Supplier,
    Vehicle,
};
use crate::traits::{Leg, MipBackend};

/// Depot used when a problem does not name one (downtown Chicago).
pub const DEFAULT_DEPOT: Coordinate = Coordinate::new(41.8781, -87.6298);

/// Stores and fleet for one routing run.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryProblem<'a> {
    pub stores: &'a [Store],
    pub vehicles: &'a [Vehicle],
    pub depot: Option<Coordinate>,
    /// Measured legs keyed by stop name; missing legs use coordinates.
    pub matrix: Option<&'a DistanceMatrix>,
}

impl<'a> DeliveryProblem<'a> {
    pub fn new(stores: &'a [Store], vehicles: &'a [Vehicle]) -> Self {
        Self {
            stores,
            vehicles,
            depot: None,
            matrix: None,
        }
    }

    pub fn with_depot(mut self, depot: Coordinate) -> Self {
        self.depot = Some(depot);
        self
    }

    pub fn with_distance_matrix(mut self, matrix: &'a DistanceMatrix) -> Self {
        self.matrix = Some(matrix);
        self
    }

    pub fn depot_or_default(&self) -> Coordinate {
        self.depot.unwrap_or(DEFAULT_DEPOT)
    }

    fn available_vehicles(&self) -> Vec<Vehicle> {
        self.vehicles
            .iter()
            .filter(|vehicle| vehicle.available)
            .cloned()
            .collect()
    }
}

pub struct PalletOptimizer {
    config: OptimizerConfig,
    costs: CostModel,
    backend: Option<Box<dyn MipBackend>>,
}

impl PalletOptimizer {
    /// The backend is resolved from `config.solver` on each exact solve.
    pub fn new(config: OptimizerConfig) -> Self {
        let costs = CostModel::new(config.costs.clone());
        Self {
            config,
            costs,
            backend: None,
        }
    }

    /// Uses `backend` instead of resolving one from the configuration.
    pub fn with_backend(mut self, backend: Box<dyn MipBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_cost_model(mut self, costs: CostModel) -> Self {
        self.costs = costs;
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.costs
    }

    /// Solves the CVRP exactly when the backend proves optimality, and falls
    /// back to nearest-neighbor routes otherwise.
    ///
    /// Only fails when no backend can be used at all.
    pub fn optimize_deliveries(
        &self,
        problem: &DeliveryProblem<'_>,
    ) -> Result<OptimizationResult, SolverUnavailableError> {
        let started = Instant::now();
        let vehicles = problem.available_vehicles();

        if problem.stores.is_empty() {
            info!("no stores to route");
            return Ok(OptimizationResult::from_routes(
                Vec::new(),
                &vehicles,
                SolverStatus::Optimal,
                started.elapsed().as_secs_f64(),
                0.0,
                Vec::new(),
            ));
        }

        let resolved;
        let backend: &dyn MipBackend = match &self.backend {
            Some(backend) => backend.as_ref(),
            None => {
                resolved = backend::resolve(self.config.solver)?;
                resolved.as_ref()
            }
        };

        if vehicles.is_empty() {
            warn!(stores = problem.stores.len(), "no available vehicles");
            return Ok(self.fallback(problem, &vehicles, MipStatus::Infeasible, started));
        }

        let legs = StopLegs::new(
            problem.depot_or_default(),
            problem.stores,
            problem.matrix,
            *self.costs.geo(),
        );

        let instance = build_instance(problem.stores, &vehicles, &legs);
        info!(
            solver = %backend.kind(),
            stores = problem.stores.len(),
            vehicles = vehicles.len(),
            time_limit_secs = self.config.time_limit_seconds,
            "solving CVRP"
        );
        let outcome = backend.solve(&instance, &self.config.limits());

        match outcome {
            MipOutcome {
                status: MipStatus::Optimal,
                objective: Some(objective),
                arcs: Some(arcs),
            } => {
                let tours = mip::extract_tours(&arcs);
                let mut routes = Vec::new();
                let mut served = vec![false; problem.stores.len()];
                for (vehicle, tour) in vehicles.iter().zip(tours) {
                    if tour.is_empty() {
                        continue;
                    }
                    for &location in &tour {
                        served[location - 1] = true;
                    }
                    routes.push(measure_tour(vehicle, &tour, problem.stores, &legs));
                }
                let unassigned = unserved(problem.stores, &served);
                if !unassigned.is_empty() {
                    warn!(count = unassigned.len(), "optimal solution left stores unrouted");
                }

                let solve_time = started.elapsed().as_secs_f64();
                info!(routes = routes.len(), objective, solve_time, "optimal routes found");
                Ok(OptimizationResult::from_routes(
                    routes,
                    &vehicles,
                    SolverStatus::Optimal,
                    solve_time,
                    objective,
                    unassigned,
                ))
            }
            MipOutcome { status, .. } => {
                warn!(%status, "exact solve did not reach optimality, using heuristic");
                Ok(self.fallback(problem, &vehicles, status, started))
            }
        }
    }

    /// Nearest-neighbor routes without attempting an exact solve.
    pub fn route_heuristic(&self, problem: &DeliveryProblem<'_>) -> OptimizationResult {
        let started = Instant::now();
        let vehicles = problem.available_vehicles();
        self.heuristic_result(problem, &vehicles, SolverStatus::Heuristic, started)
    }

    /// Greedy supplier assignment; `suppliers` capacities are debited in
    /// place.
    pub fn assign_suppliers(
        &self,
        stores: &[Store],
        suppliers: &mut [Supplier],
    ) -> SupplierAssignment {
        let mut ledger = CapacityLedger::from_suppliers(suppliers);
        let result = assignment::assign_suppliers(stores, suppliers, &mut ledger, &self.costs);
        ledger.apply_to(suppliers);
        info!(
            assigned = result.assignments.len(),
            unassigned = result.unassigned.len(),
            "supplier assignment complete"
        );
        result
    }

    fn fallback(
        &self,
        problem: &DeliveryProblem<'_>,
        vehicles: &[Vehicle],
        status: MipStatus,
        started: Instant,
    ) -> OptimizationResult {
        self.heuristic_result(problem, vehicles, SolverStatus::HeuristicFallback(status), started)
    }

    fn heuristic_result(
        &self,
        problem: &DeliveryProblem<'_>,
        vehicles: &[Vehicle],
        status: SolverStatus,
        started: Instant,
    ) -> OptimizationResult {
        let plan = heuristic::nearest_neighbor(
            problem.stores,
            vehicles,
            problem.depot_or_default(),
            self.costs.geo(),
        );
        let objective: f64 = plan
            .routes
            .iter()
            .map(|route| {
                let cost_per_mile = vehicles
                    .iter()
                    .find(|vehicle| vehicle.id == route.vehicle_id)
                    .map_or(0.0, |vehicle| vehicle.cost_per_mile);
                route.total_distance * cost_per_mile
            })
            .sum();

        let solve_time = started.elapsed().as_secs_f64();
        info!(%status, routes = plan.routes.len(), objective, "heuristic routes built");
        OptimizationResult::from_routes(
            plan.routes,
            vehicles,
            status,
            solve_time,
            objective,
            plan.unassigned,
        )
    }
}

/// Legs between the depot (index 0) and each store (indices `1..=n`).
///
/// Matrix entries are looked up by stop name; anything else is measured
/// between the stops' own coordinates, so stores sharing a name stay apart.
struct StopLegs<'a> {
    stops: Vec<(&'a str, Coordinate)>,
    matrix: Option<&'a DistanceMatrix>,
    geo: GeoProvider,
}

impl<'a> StopLegs<'a> {
    fn new(
        depot: Coordinate,
        stores: &'a [Store],
        matrix: Option<&'a DistanceMatrix>,
        geo: GeoProvider,
    ) -> Self {
        if matrix.is_some() {
            let mut names = HashSet::new();
            for store in stores {
                if !names.insert(store.stop_name()) {
                    warn!(
                        store = %store.id,
                        name = store.stop_name(),
                        "duplicate stop name, matrix entries are shared"
                    );
                }
            }
        }
        let stops = std::iter::once((DEPOT, depot))
            .chain(stores.iter().map(|store| (store.stop_name(), store.location.coordinate())))
            .collect();
        Self {
            stops,
            matrix,
            geo,
        }
    }

    fn len(&self) -> usize {
        self.stops.len()
    }

    fn leg(&self, from: usize, to: usize) -> Leg {
        if from == to {
            return Leg::measured(0.0, 0.0);
        }
        let (from_name, a) = self.stops[from];
        let (to_name, b) = self.stops[to];
        self.matrix
            .filter(|_| from_name != to_name)
            .and_then(|matrix| matrix.leg_at(from_name, to_name, self.geo.speed_mph))
            .unwrap_or_else(|| Leg::measured(self.geo.distance(a, b), self.geo.travel_time(a, b)))
    }
}

/// Dense instance over depot (index 0) and `stores` (indices `1..=n`).
fn build_instance(stores: &[Store], vehicles: &[Vehicle], legs: &StopLegs<'_>) -> CvrpInstance {
    let n = legs.len();
    let mut distances = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            distances.push(legs.leg(i, j).miles);
        }
    }

    let demands = std::iter::once(0)
        .chain(stores.iter().map(|store| store.demand_pallets))
        .collect();
    let capacities = vehicles.iter().map(|vehicle| vehicle.max_pallets).collect();
    let cost_per_mile = vehicles.iter().map(|vehicle| vehicle.cost_per_mile).collect();

    debug!(locations = n, vehicles = vehicles.len(), "built CVRP instance");
    CvrpInstance::new(distances, demands, capacities, cost_per_mile)
}

/// Route for `tour` (store indices, depot excluded) measured leg by leg.
fn measure_tour(vehicle: &Vehicle, tour: &[usize], stores: &[Store], legs: &StopLegs<'_>) -> Route {
    let visited: Vec<&Store> = tour.iter().map(|&location| &stores[location - 1]).collect();
    let mut route = Route::planned(vehicle.id.clone(), &visited);
    let path: Vec<usize> = std::iter::once(0)
        .chain(tour.iter().copied())
        .chain(std::iter::once(0))
        .collect();
    for pair in path.windows(2) {
        let leg = legs.leg(pair[0], pair[1]);
        route.total_distance += leg.miles;
        route.total_time += leg.hours;
    }
    route.total_cost = vehicle.operating_cost(route.total_distance, route.total_time);
    route
}

fn unserved(stores: &[Store], served: &[bool]) -> Vec<String> {
    stores
        .iter()
        .zip(served)
        .filter(|(_, done)| !**done)
        .map(|(store, _)| store.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SolverKind;
    use crate::mip::{ArcValues, SolveLimits};
    use crate::models::Location;

    struct FixedBackend(MipStatus);

    impl MipBackend for FixedBackend {
        fn kind(&self) -> SolverKind {
            SolverKind::Cbc
        }

        fn solve(&self, _instance: &CvrpInstance, _limits: &SolveLimits) -> MipOutcome {
            MipOutcome::failed(self.0)
        }
    }

    /// Returns one tour per vehicle visiting stores in index order.
    struct ScriptedBackend(Vec<Vec<usize>>);

    impl MipBackend for ScriptedBackend {
        fn kind(&self) -> SolverKind {
            SolverKind::MicroLp
        }

        fn solve(&self, instance: &CvrpInstance, _limits: &SolveLimits) -> MipOutcome {
            let mut arcs = ArcValues::new(instance.n_locations(), instance.n_vehicles());
            for (k, tour) in self.0.iter().enumerate() {
                let mut current = 0;
                for &stop in tour {
                    arcs.set(current, stop, k, 1.0);
                    current = stop;
                }
                arcs.set(current, 0, k, 1.0);
            }
            MipOutcome::solved(MipStatus::Optimal, arcs, instance)
        }
    }

    fn store(id: &str, lat: f64, lon: f64, demand: u32) -> Store {
        Store::new(id, Location::new(id, lat, lon).unwrap(), demand).unwrap()
    }

    fn stores() -> Vec<Store> {
        vec![
            store("evanston", 42.0451, -87.6877, 10),
            store("oak-park", 41.8850, -87.7845, 8),
            store("gary", 41.5934, -87.3464, 6),
        ]
    }

    fn fleet() -> Vec<Vehicle> {
        vec![
            Vehicle::new("t1", 20, 2.0, 30.0).unwrap(),
            Vehicle::new("t2", 20, 2.5, 30.0).unwrap(),
        ]
    }

    #[test]
    fn infeasible_backend_falls_back_to_heuristic() {
        let (stores, vehicles) = (stores(), fleet());
        let optimizer = PalletOptimizer::new(OptimizerConfig::default())
            .with_backend(Box::new(FixedBackend(MipStatus::Infeasible)));

        let result = optimizer
            .optimize_deliveries(&DeliveryProblem::new(&stores, &vehicles))
            .unwrap();

        assert_eq!(
            result.solver_status,
            SolverStatus::HeuristicFallback(MipStatus::Infeasible)
        );
        assert!(result.solver_status.is_degraded());
        let heuristic = optimizer.route_heuristic(&DeliveryProblem::new(&stores, &vehicles));
        assert_eq!(result.routes.len(), heuristic.routes.len());
        for (a, b) in result.routes.iter().zip(&heuristic.routes) {
            assert_eq!(a.store_ids, b.store_ids);
        }
        let expected: f64 = result
            .routes
            .iter()
            .map(|route| {
                let cpm = if route.vehicle_id == "t1" { 2.0 } else { 2.5 };
                route.total_distance * cpm
            })
            .sum();
        assert!((result.objective_value - expected).abs() < 1e-9);
    }

    #[test]
    fn time_limited_solve_is_not_trusted() {
        let (stores, vehicles) = (stores(), fleet());
        let optimizer = PalletOptimizer::new(OptimizerConfig::default())
            .with_backend(Box::new(FixedBackend(MipStatus::TimeLimited)));
        let result = optimizer
            .optimize_deliveries(&DeliveryProblem::new(&stores, &vehicles))
            .unwrap();
        assert_eq!(
            result.solver_status,
            SolverStatus::HeuristicFallback(MipStatus::TimeLimited)
        );
    }

    #[test]
    fn optimal_arcs_become_routes() {
        let (stores, vehicles) = (stores(), fleet());
        let optimizer = PalletOptimizer::new(OptimizerConfig::default())
            .with_backend(Box::new(ScriptedBackend(vec![vec![1, 2], vec![3]])));
        let problem = DeliveryProblem::new(&stores, &vehicles).with_depot(DEFAULT_DEPOT);

        let result = optimizer.optimize_deliveries(&problem).unwrap();

        assert_eq!(result.solver_status, SolverStatus::Optimal);
        assert_eq!(result.routes.len(), 2);
        assert_eq!(result.routes[0].vehicle_id, "t1");
        assert_eq!(result.routes[0].store_ids, vec!["evanston", "oak-park"]);
        assert_eq!(result.routes[0].stops.first().map(String::as_str), Some(DEPOT));
        assert_eq!(result.routes[0].stops.last().map(String::as_str), Some(DEPOT));
        assert_eq!(result.routes[1].store_ids, vec!["gary"]);
        assert_eq!(result.pallets_delivered(), 24);
        assert!(result.unassigned_stores.is_empty());

        let expected: f64 = result
            .routes
            .iter()
            .map(|route| {
                let cpm = if route.vehicle_id == "t1" { 2.0 } else { 2.5 };
                route.total_distance * cpm
            })
            .sum();
        assert!((result.objective_value - expected).abs() < 1e-6);
    }

    #[test]
    fn matrix_legs_override_coordinates() {
        let stores = vec![store("A", 42.0, -87.7, 5)];
        let vehicles = vec![Vehicle::new("t1", 20, 1.0, 0.0).unwrap()];
        let mut matrix = DistanceMatrix::new();
        matrix.insert(DEPOT, "A", 12.0, None);
        matrix.insert("A", DEPOT, 12.0, None);

        let optimizer = PalletOptimizer::new(OptimizerConfig::default())
            .with_backend(Box::new(ScriptedBackend(vec![vec![1]])));
        let problem = DeliveryProblem::new(&stores, &vehicles).with_distance_matrix(&matrix);
        let result = optimizer.optimize_deliveries(&problem).unwrap();

        assert!((result.total_distance - 24.0).abs() < 1e-9);
        assert!((result.objective_value - 24.0).abs() < 1e-9);
    }

    #[test]
    fn same_named_stores_keep_their_own_coordinates() {
        let evanston = Location::new("Walgreens", 42.0451, -87.6877).unwrap();
        let gary = Location::new("Walgreens", 41.5934, -87.3464).unwrap();
        let stores = vec![
            Store::new("S1", evanston, 5).unwrap(),
            Store::new("S2", gary, 5).unwrap(),
        ];
        let vehicles = vec![Vehicle::new("t1", 20, 1.0, 0.0).unwrap()];
        let optimizer = PalletOptimizer::new(OptimizerConfig::default())
            .with_backend(Box::new(ScriptedBackend(vec![vec![1, 2]])));
        let problem = DeliveryProblem::new(&stores, &vehicles).with_depot(DEFAULT_DEPOT);

        let result = optimizer.optimize_deliveries(&problem).unwrap();

        let geo = GeoProvider::default();
        let (a, b) = (stores[0].location.coordinate(), stores[1].location.coordinate());
        let expected =
            geo.distance(DEFAULT_DEPOT, a) + geo.distance(a, b) + geo.distance(b, DEFAULT_DEPOT);
        assert_eq!(result.routes[0].store_ids, vec!["S1", "S2"]);
        assert!((result.total_distance - expected).abs() < 1e-6);
        assert!((result.objective_value - expected).abs() < 1e-6);
        let greedy = optimizer.route_heuristic(&problem);
        assert!((result.total_distance - greedy.total_distance).abs() < 1e-6);
    }

    #[test]
    fn no_stores_is_trivially_optimal() {
        let vehicles = fleet();
        let optimizer = PalletOptimizer::new(OptimizerConfig::default())
            .with_backend(Box::new(FixedBackend(MipStatus::NotSolved)));
        let result = optimizer
            .optimize_deliveries(&DeliveryProblem::new(&[], &vehicles))
            .unwrap();
        assert_eq!(result.solver_status, SolverStatus::Optimal);
        assert!(result.routes.is_empty());
        assert_eq!(result.total_cost, 0.0);
    }

    #[test]
    fn no_available_vehicles_reports_infeasible() {
        let stores = stores();
        let mut vehicles = fleet();
        for vehicle in &mut vehicles {
            vehicle.available = false;
        }
        let optimizer = PalletOptimizer::new(OptimizerConfig::default())
            .with_backend(Box::new(ScriptedBackend(Vec::new())));
        let result = optimizer
            .optimize_deliveries(&DeliveryProblem::new(&stores, &vehicles))
            .unwrap();
        assert_eq!(
            result.solver_status,
            SolverStatus::HeuristicFallback(MipStatus::Infeasible)
        );
        assert!(result.routes.is_empty());
        assert_eq!(result.unassigned_stores.len(), 3);
    }

    #[test]
    fn heuristic_status_is_reported() {
        let (stores, vehicles) = (stores(), fleet());
        let optimizer = PalletOptimizer::new(OptimizerConfig::default());
        let result = optimizer.route_heuristic(&DeliveryProblem::new(&stores, &vehicles));
        assert_eq!(result.solver_status, SolverStatus::Heuristic);
        assert_eq!(result.pallets_delivered(), 24);
        let summed: f64 = result.routes.iter().map(|r| r.total_cost).sum();
        assert!((result.total_cost - summed).abs() < 1e-9);
    }

    #[test]
    fn supplier_capacity_is_written_back() {
        let optimizer = PalletOptimizer::new(OptimizerConfig::default());
        let here = Location::new("dc", 41.8781, -87.6298).unwrap();
        let mut suppliers = vec![Supplier::new("P1", here, 50, 10.0)];
        let stores = [store("S1", 41.9, -87.6, 30)];
        let result = optimizer.assign_suppliers(&stores, &mut suppliers);
        assert_eq!(result.as_map()["S1"], "P1");
        assert_eq!(suppliers[0].available_pallets, 20);
    }
}
