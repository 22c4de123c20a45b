//! pallet-router
//!
//! Capacitated pallet delivery planning: exact CVRP routing through a MIP
//! backend with a nearest-neighbor fallback, itemized route costing, and
//! greedy supplier assignment.

pub mod models;
pub mod traits;
pub mod geo;
pub mod matrix;
pub mod config;
pub mod cost;
pub mod mip;
pub mod backend;
pub mod heuristic;
pub mod assignment;
pub mod solver;
pub mod gateway;
pub mod geocode;

pub use config::OptimizerConfig;
pub use models::{OptimizationResult, SolverStatus};
pub use solver::{DeliveryProblem, PalletOptimizer};
