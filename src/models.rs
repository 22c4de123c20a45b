//! Data model shared by the routers, the cost model and the data gateway.
//!
//! Entities are plain data. Stores, suppliers and vehicles are treated as
//! immutable for the duration of one optimization run; supplier capacity is
//! tracked separately by [`crate::assignment::CapacityLedger`].

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stop label used for the depot at both ends of every route.
pub const DEPOT: &str = "depot";

/// Validation failures for model invariants.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("latitude {0} outside [-90, 90]")]
    InvalidLatitude(f64),
    #[error("longitude {0} outside [-180, 180]")]
    InvalidLongitude(f64),
    #[error("store {0} must demand at least one pallet")]
    ZeroDemand(String),
    #[error("vehicle {0} must carry at least one pallet")]
    ZeroCapacity(String),
    #[error("order {0} must have a positive quantity")]
    ZeroQuantity(String),
    #[error("supplier {id} reliability {score} outside [0, 1]")]
    InvalidReliability { id: String, score: f64 },
    #[error("toll rate {0} must not be negative")]
    NegativeTollRate(f64),
}

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(ModelError::InvalidLatitude(self.lat));
        }
        if !(-180.0..=180.0).contains(&self.lon) {
            return Err(ModelError::InvalidLongitude(self.lon));
        }
        Ok(())
    }
}

/// A physical point with its postal details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub address: String,
    pub lat: f64,
    pub lon: f64,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub contact_info: Option<String>,
}

impl Location {
    /// Creates a location with empty postal fields, validating coordinates.
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Result<Self, ModelError> {
        Coordinate::new(lat, lon).validate()?;
        Ok(Self {
            name: name.into(),
            address: String::new(),
            lat,
            lon,
            city: String::new(),
            state: String::new(),
            zip_code: String::new(),
            contact_info: None,
        })
    }

    pub fn with_address(
        mut self,
        address: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        zip_code: impl Into<String>,
    ) -> Self {
        self.address = address.into();
        self.city = city.into();
        self.state = state.into();
        self.zip_code = zip_code.into();
        self
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }
}

/// A demand point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub id: String,
    pub name: String,
    pub location: Location,
    pub demand_pallets: u32,
    pub delivery_window_start: Option<NaiveDateTime>,
    pub delivery_window_end: Option<NaiveDateTime>,
    /// 1 is the highest priority.
    pub priority: u32,
    pub special_requirements: Vec<String>,
}

impl Store {
    pub fn new(
        id: impl Into<String>,
        location: Location,
        demand_pallets: u32,
    ) -> Result<Self, ModelError> {
        let id = id.into();
        if demand_pallets == 0 {
            return Err(ModelError::ZeroDemand(id));
        }
        Ok(Self {
            name: location.name.clone(),
            id,
            location,
            demand_pallets,
            delivery_window_start: None,
            delivery_window_end: None,
            priority: 1,
            special_requirements: Vec::new(),
        })
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority.max(1);
        self
    }

    /// Stop label of this store inside a route.
    pub fn stop_name(&self) -> &str {
        &self.location.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PalletType {
    Standard,
    Euro,
    Custom,
}

impl PalletType {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(Self::Standard),
            "euro" => Some(Self::Euro),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// A supply source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: String,
    pub name: String,
    pub location: Location,
    pub available_pallets: u32,
    pub cost_per_pallet: f64,
    pub lead_time_days: u32,
    pub capacity_per_day: u32,
    pub reliability_score: f64,
    pub pallet_types: Vec<PalletType>,
}

impl Supplier {
    pub fn new(
        id: impl Into<String>,
        location: Location,
        available_pallets: u32,
        cost_per_pallet: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: location.name.clone(),
            location,
            available_pallets,
            cost_per_pallet,
            lead_time_days: 1,
            capacity_per_day: 100,
            reliability_score: 1.0,
            pallet_types: vec![PalletType::Standard],
        }
    }

    pub fn with_reliability(mut self, score: f64) -> Result<Self, ModelError> {
        if !(0.0..=1.0).contains(&score) {
            return Err(ModelError::InvalidReliability {
                id: self.id,
                score,
            });
        }
        self.reliability_score = score;
        Ok(self)
    }
}

/// A capacity-limited routing resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    pub vehicle_type: String,
    pub max_pallets: u32,
    pub max_weight: u32,
    pub cost_per_mile: f64,
    pub cost_per_hour: f64,
    pub home_location: Option<Location>,
    pub available: bool,
}

impl Vehicle {
    pub fn new(
        id: impl Into<String>,
        max_pallets: u32,
        cost_per_mile: f64,
        cost_per_hour: f64,
    ) -> Result<Self, ModelError> {
        let id = id.into();
        if max_pallets == 0 {
            return Err(ModelError::ZeroCapacity(id));
        }
        Ok(Self {
            id,
            vehicle_type: "truck".to_string(),
            max_pallets,
            max_weight: 0,
            cost_per_mile,
            cost_per_hour,
            home_location: None,
            available: true,
        })
    }

    /// Cost of driving `miles` in `hours` at this vehicle's rates.
    pub fn operating_cost(&self, miles: f64, hours: f64) -> f64 {
        miles * self.cost_per_mile + hours * self.cost_per_hour
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Planned,
    InProgress,
    Completed,
    Cancelled,
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RouteStatus::Planned => "planned",
            RouteStatus::InProgress => "in_progress",
            RouteStatus::Completed => "completed",
            RouteStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// One vehicle's tour, starting and ending at the depot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub vehicle_id: String,
    pub stops: Vec<String>,
    pub store_ids: Vec<String>,
    pub total_distance: f64,
    pub total_time: f64,
    pub total_cost: f64,
    pub pallets_delivered: u32,
    pub status: RouteStatus,
    pub created_at: DateTime<Utc>,
}

impl Route {
    /// Builds a planned route for `stores`, wrapping their stop labels with
    /// the depot marker. Metrics start at zero.
    pub fn planned(vehicle_id: impl Into<String>, stores: &[&Store]) -> Self {
        let mut stops = Vec::with_capacity(stores.len() + 2);
        stops.push(DEPOT.to_string());
        stops.extend(stores.iter().map(|store| store.stop_name().to_string()));
        stops.push(DEPOT.to_string());

        Self {
            id: new_route_id(),
            vehicle_id: vehicle_id.into(),
            stops,
            store_ids: stores.iter().map(|store| store.id.clone()).collect(),
            total_distance: 0.0,
            total_time: 0.0,
            total_cost: 0.0,
            pallets_delivered: stores.iter().map(|store| store.demand_pallets).sum(),
            status: RouteStatus::Planned,
            created_at: Utc::now(),
        }
    }

    /// Stops between the leading and trailing depot.
    pub fn delivery_stops(&self) -> &[String] {
        match self.stops.len() {
            0..=2 => &[],
            len => &self.stops[1..len - 1],
        }
    }
}

/// `route_` followed by eight hex characters.
pub fn new_route_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("route_{}", &hex[..8])
}

/// A historical or requested delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub store_id: String,
    pub supplier_id: String,
    pub quantity: u32,
    pub pallet_type: PalletType,
    pub requested_date: Option<NaiveDate>,
    pub priority: u32,
    pub special_instructions: Option<String>,
}

/// A priced corridor between two named locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TollSegment {
    pub from_location: String,
    pub to_location: String,
    pub rate_per_mile: f64,
    pub flat_rate: Option<f64>,
}

impl TollSegment {
    pub fn new(
        from_location: impl Into<String>,
        to_location: impl Into<String>,
        rate_per_mile: f64,
    ) -> Result<Self, ModelError> {
        if rate_per_mile < 0.0 {
            return Err(ModelError::NegativeTollRate(rate_per_mile));
        }
        Ok(Self {
            from_location: from_location.into(),
            to_location: to_location.into(),
            rate_per_mile,
            flat_rate: None,
        })
    }
}

/// Per-route cost decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub fuel_cost: f64,
    pub driver_cost: f64,
    pub toll_cost: f64,
    pub handling_cost: f64,
    /// Always `fuel_cost + driver_cost + toll_cost + handling_cost`.
    pub total_cost: f64,
    pub cost_per_pallet: f64,
    pub cost_per_mile: f64,
    pub total_distance: f64,
    pub total_time: f64,
    /// Legs scored with the fixed default distance instead of real data.
    pub estimated_legs: usize,
}

impl CostBreakdown {
    pub fn is_estimated(&self) -> bool {
        self.estimated_legs > 0
    }
}

/// Status reported by a MIP backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MipStatus {
    Optimal,
    TimeLimited,
    Infeasible,
    Unbounded,
    NotSolved,
}

impl fmt::Display for MipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MipStatus::Optimal => "Optimal",
            MipStatus::TimeLimited => "Time limited",
            MipStatus::Infeasible => "Infeasible",
            MipStatus::Unbounded => "Unbounded",
            MipStatus::NotSolved => "Not Solved",
        };
        f.write_str(label)
    }
}

/// How the routes of an [`OptimizationResult`] were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverStatus {
    /// Routes extracted from an optimal MIP solution.
    Optimal,
    /// Heuristic requested directly.
    Heuristic,
    /// The MIP did not reach optimality; routes come from the heuristic.
    HeuristicFallback(MipStatus),
}

impl SolverStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, SolverStatus::HeuristicFallback(_))
    }
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverStatus::Optimal => f.write_str("Optimal"),
            SolverStatus::Heuristic => f.write_str("Heuristic"),
            SolverStatus::HeuristicFallback(status) => {
                write!(f, "Heuristic (fallback: {})", status)
            }
        }
    }
}

/// Aggregate output of one optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub routes: Vec<Route>,
    pub total_cost: f64,
    pub total_distance: f64,
    pub total_time: f64,
    /// Delivered pallets over the capacity of vehicles that got a route.
    pub utilization_rate: f64,
    pub solver_status: SolverStatus,
    /// Wall-clock seconds.
    pub solve_time: f64,
    pub objective_value: f64,
    pub gap: Option<f64>,
    /// Store ids that no route serves.
    pub unassigned_stores: Vec<String>,
}

impl OptimizationResult {
    /// Aggregates route totals and fleet utilization.
    pub fn from_routes(
        routes: Vec<Route>,
        vehicles: &[Vehicle],
        solver_status: SolverStatus,
        solve_time: f64,
        objective_value: f64,
        unassigned_stores: Vec<String>,
    ) -> Self {
        let total_distance = routes.iter().map(|route| route.total_distance).sum();
        let total_time = routes.iter().map(|route| route.total_time).sum();
        let total_cost = routes.iter().map(|route| route.total_cost).sum();

        let capacity: u32 = vehicles
            .iter()
            .filter(|vehicle| routes.iter().any(|route| route.vehicle_id == vehicle.id))
            .map(|vehicle| vehicle.max_pallets)
            .sum();
        let delivered: u32 = routes.iter().map(|route| route.pallets_delivered).sum();
        let utilization_rate = if capacity > 0 {
            delivered as f64 / capacity as f64
        } else {
            0.0
        };

        Self {
            routes,
            total_cost,
            total_distance,
            total_time,
            utilization_rate,
            solver_status,
            solve_time,
            objective_value,
            gap: None,
            unassigned_stores,
        }
    }

    pub fn pallets_delivered(&self) -> u32 {
        self.routes.iter().map(|route| route.pallets_delivered).sum()
    }
}
