//! Test fixtures for pallet-router.
//!
//! Provides:
//! - Real Chicago-area locations
//! - Builders for stores, suppliers and vehicles

#![allow(dead_code)]

pub mod chicago_locations;

pub use chicago_locations::*;

use pallet_router::models::{Coordinate, Location, Store, Supplier, Vehicle};

impl Place {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }

    pub fn location(&self) -> Location {
        Location::new(self.name, self.lat, self.lon).expect("fixture coordinates are valid")
    }
}

/// Builder for test stores with one pallet of demand by default.
#[derive(Debug, Clone)]
pub struct TestStore {
    id: String,
    place: Place,
    demand: u32,
    priority: u32,
}

impl TestStore {
    pub fn new(id: &str, place: Place) -> Self {
        Self {
            id: id.to_string(),
            place,
            demand: 1,
            priority: 1,
        }
    }

    pub fn demand(mut self, pallets: u32) -> Self {
        self.demand = pallets;
        self
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn build(self) -> Store {
        Store::new(self.id, self.place.location(), self.demand)
            .expect("fixture demand is positive")
            .with_priority(self.priority)
    }
}

/// A 26-pallet box truck at $2/mile and $30/hour.
pub fn truck(id: &str) -> Vehicle {
    Vehicle::new(id, 26, 2.0, 30.0).expect("fixture capacity is positive")
}

pub fn truck_with(id: &str, max_pallets: u32, cost_per_mile: f64) -> Vehicle {
    Vehicle::new(id, max_pallets, cost_per_mile, 30.0).expect("fixture capacity is positive")
}

pub fn supplier(id: &str, place: Place, available: u32, cost_per_pallet: f64) -> Supplier {
    Supplier::new(id, place.location(), available, cost_per_pallet)
}

/// One store per place with the given demands, ids `S1..`.
pub fn stores_at(places: &[Place], demands: &[u32]) -> Vec<Store> {
    places
        .iter()
        .zip(demands)
        .enumerate()
        .map(|(index, (place, &demand))| {
            TestStore::new(&format!("S{}", index + 1), *place)
                .demand(demand)
                .build()
        })
        .collect()
}
