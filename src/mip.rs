//! Two-index CVRP formulation and route extraction.
//!
//! Locations are indexed with the depot at 0 and stores at `1..=n`.
//! Variables:
//! - `x[i,j,k]` binary, vehicle `k` drives arc `i -> j` (`i != j`)
//! - `load[k,i]` integer in `[0, capacity_k]`, pallets on board when `k`
//!   arrives at `i`; fixed to 0 at the depot
//!
//! The objective is distance × cost per mile only; time and tolls are left
//! to the cost model.

use std::time::Duration;

use good_lp::{
    constraint, variable, Constraint, Expression, ProblemVariables, ResolutionError, Solution,
    SolutionStatus, SolverModel, Variable,
};
use tracing::warn;

use crate::models::MipStatus;

/// Backend stopping criteria.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveLimits {
    pub time_limit: Duration,
    /// Relative MIP gap tolerance.
    pub mip_gap: f64,
}

impl Default for SolveLimits {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(3600),
            mip_gap: 0.01,
        }
    }
}

/// Numeric CVRP data handed to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CvrpInstance {
    distances: Vec<f64>,
    demands: Vec<u32>,
    capacities: Vec<u32>,
    cost_per_mile: Vec<f64>,
}

impl CvrpInstance {
    /// `distances` is row-major over `demands.len()` locations; `demands[0]`
    /// belongs to the depot and is ignored.
    pub fn new(
        distances: Vec<f64>,
        mut demands: Vec<u32>,
        capacities: Vec<u32>,
        cost_per_mile: Vec<f64>,
    ) -> Self {
        debug_assert_eq!(distances.len(), demands.len() * demands.len());
        debug_assert_eq!(capacities.len(), cost_per_mile.len());
        if let Some(depot) = demands.first_mut() {
            *depot = 0;
        }
        Self {
            distances,
            demands,
            capacities,
            cost_per_mile,
        }
    }

    pub fn n_locations(&self) -> usize {
        self.demands.len()
    }

    pub fn n_vehicles(&self) -> usize {
        self.capacities.len()
    }

    pub fn distance(&self, from: usize, to: usize) -> f64 {
        self.distances[from * self.n_locations() + to]
    }

    pub fn demand(&self, location: usize) -> u32 {
        self.demands[location]
    }

    pub fn capacity(&self, vehicle: usize) -> u32 {
        self.capacities[vehicle]
    }

    pub fn arc_cost(&self, from: usize, to: usize, vehicle: usize) -> f64 {
        self.distance(from, to) * self.cost_per_mile[vehicle]
    }
}

/// Arc values of a solved model, indexed like the `x` variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ArcValues {
    n_locations: usize,
    n_vehicles: usize,
    values: Vec<f64>,
}

impl ArcValues {
    pub fn new(n_locations: usize, n_vehicles: usize) -> Self {
        Self {
            n_locations,
            n_vehicles,
            values: vec![0.0; n_locations * n_locations * n_vehicles],
        }
    }

    fn index(&self, from: usize, to: usize, vehicle: usize) -> usize {
        (from * self.n_locations + to) * self.n_vehicles + vehicle
    }

    pub fn get(&self, from: usize, to: usize, vehicle: usize) -> f64 {
        self.values[self.index(from, to, vehicle)]
    }

    pub fn set(&mut self, from: usize, to: usize, vehicle: usize, value: f64) {
        let index = self.index(from, to, vehicle);
        self.values[index] = value;
    }

    /// Objective value of these arcs for `instance`.
    pub fn objective(&self, instance: &CvrpInstance) -> f64 {
        let n = self.n_locations;
        let mut total = 0.0;
        for i in 0..n {
            for j in (0..n).filter(|&j| j != i) {
                for k in 0..self.n_vehicles {
                    total += self.get(i, j, k) * instance.arc_cost(i, j, k);
                }
            }
        }
        total
    }
}

/// What a backend returned. Arc values are only trusted when the status is
/// [`MipStatus::Optimal`].
#[derive(Debug, Clone, PartialEq)]
pub struct MipOutcome {
    pub status: MipStatus,
    pub objective: Option<f64>,
    pub arcs: Option<ArcValues>,
}

impl MipOutcome {
    pub fn failed(status: MipStatus) -> Self {
        Self {
            status,
            objective: None,
            arcs: None,
        }
    }

    pub fn solved(status: MipStatus, arcs: ArcValues, instance: &CvrpInstance) -> Self {
        Self {
            status,
            objective: Some(arcs.objective(instance)),
            arcs: Some(arcs),
        }
    }
}

/// Handles on the `x` variables of a built model.
pub(crate) struct ArcVariables {
    n_locations: usize,
    n_vehicles: usize,
    arcs: Vec<Option<Variable>>,
}

impl ArcVariables {
    fn get(&self, from: usize, to: usize, vehicle: usize) -> Option<Variable> {
        self.arcs[(from * self.n_locations + to) * self.n_vehicles + vehicle]
    }
}

/// Builds the formulation. `into_model` picks the solver and receives the
/// variables and objective; constraints are added to the model it returns.
pub(crate) fn formulate<M, F>(instance: &CvrpInstance, into_model: F) -> (M, ArcVariables)
where
    M: SolverModel,
    F: FnOnce(ProblemVariables, Expression) -> M,
{
    let n = instance.n_locations();
    let m = instance.n_vehicles();
    let mut vars = ProblemVariables::new();

    let mut arcs = vec![None; n * n * m];
    for i in 0..n {
        for j in (0..n).filter(|&j| j != i) {
            for k in 0..m {
                arcs[(i * n + j) * m + k] = Some(vars.add(variable().binary()));
            }
        }
    }
    let x = ArcVariables {
        n_locations: n,
        n_vehicles: m,
        arcs,
    };

    let mut loads = Vec::with_capacity(n * m);
    for k in 0..m {
        for i in 0..n {
            let upper = if i == 0 { 0.0 } else { instance.capacity(k) as f64 };
            loads.push(vars.add(variable().integer().min(0.0).max(upper)));
        }
    }
    let load = |k: usize, i: usize| loads[k * n + i];

    let mut objective = Expression::with_capacity(n * n * m);
    for i in 0..n {
        for j in 0..n {
            for k in 0..m {
                if let Some(arc) = x.get(i, j, k) {
                    objective += instance.arc_cost(i, j, k) * arc;
                }
            }
        }
    }

    let mut constraints: Vec<Constraint> = Vec::new();

    // Every store is entered exactly once over all vehicles.
    for j in 1..n {
        let mut entering = Expression::with_capacity(n * m);
        for i in (0..n).filter(|&i| i != j) {
            for k in 0..m {
                if let Some(arc) = x.get(i, j, k) {
                    entering += arc;
                }
            }
        }
        constraints.push(constraint!(entering == 1.0));
    }

    for k in 0..m {
        // Flow conservation.
        for j in 0..n {
            let mut inflow = Expression::with_capacity(n);
            let mut outflow = Expression::with_capacity(n);
            for i in (0..n).filter(|&i| i != j) {
                if let Some(arc) = x.get(i, j, k) {
                    inflow += arc;
                }
                if let Some(arc) = x.get(j, i, k) {
                    outflow += arc;
                }
            }
            constraints.push(constraint!(inflow == outflow));
        }

        // Leave and return to the depot at most once.
        let mut departures = Expression::with_capacity(n);
        let mut returns = Expression::with_capacity(n);
        for j in 1..n {
            if let Some(arc) = x.get(0, j, k) {
                departures += arc;
            }
            if let Some(arc) = x.get(j, 0, k) {
                returns += arc;
            }
        }
        constraints.push(constraint!(departures <= 1.0));
        constraints.push(constraint!(returns <= 1.0));

        // load_j >= load_i + d_j - Q (1 - x_ijk), rearranged with constants
        // on the right. Also eliminates subtours that skip the depot.
        let capacity = instance.capacity(k) as f64;
        for i in 0..n {
            for j in (1..n).filter(|&j| j != i) {
                if let Some(arc) = x.get(i, j, k) {
                    let demand = instance.demand(j) as f64;
                    constraints.push(constraint!(
                        load(k, j) - load(k, i) - capacity * arc >= demand - capacity
                    ));
                }
            }
        }
    }

    let mut model = into_model(vars, objective);
    for c in constraints {
        model.add_constraint(c);
    }
    (model, x)
}

/// Maps a backend result onto [`MipOutcome`].
///
/// A solve stopped by the gap tolerance counts as optimal; one stopped by
/// the time limit does not.
pub(crate) fn read_outcome<S: Solution>(
    result: Result<S, ResolutionError>,
    x: &ArcVariables,
    instance: &CvrpInstance,
) -> MipOutcome {
    match result {
        Ok(solution) => {
            let status = match solution.status() {
                SolutionStatus::TimeLimit => MipStatus::TimeLimited,
                _ => MipStatus::Optimal,
            };
            let mut values = ArcValues::new(x.n_locations, x.n_vehicles);
            for i in 0..x.n_locations {
                for j in 0..x.n_locations {
                    for k in 0..x.n_vehicles {
                        if let Some(arc) = x.get(i, j, k) {
                            values.set(i, j, k, solution.value(arc));
                        }
                    }
                }
            }
            MipOutcome::solved(status, values, instance)
        }
        Err(ResolutionError::Infeasible) => MipOutcome::failed(MipStatus::Infeasible),
        Err(ResolutionError::Unbounded) => MipOutcome::failed(MipStatus::Unbounded),
        Err(err) => {
            warn!(error = %err, "MIP backend failed");
            MipOutcome::failed(MipStatus::NotSolved)
        }
    }
}

/// For each vehicle, the store indices it visits in order.
///
/// Follows the first outgoing arc above 0.5 from the depot until the depot
/// is reached again or no arc leaves the current location. A location seen
/// twice ends the walk.
pub fn extract_tours(arcs: &ArcValues) -> Vec<Vec<usize>> {
    let n = arcs.n_locations;
    (0..arcs.n_vehicles)
        .map(|k| {
            let mut tour = Vec::new();
            let mut seen = vec![false; n];
            let mut current = 0;
            loop {
                let next = (0..n).find(|&j| j != current && arcs.get(current, j, k) > 0.5);
                match next {
                    None | Some(0) => break,
                    Some(j) if seen[j] => break,
                    Some(j) => {
                        seen[j] = true;
                        tour.push(j);
                        current = j;
                    }
                }
            }
            tour
        })
        .collect()
}
