//! Greedy store-to-supplier assignment against a capacity ledger.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::cost::CostModel;
use crate::models::{Store, Supplier};

/// Remaining pallets per supplier id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapacityLedger {
    remaining: HashMap<String, u32>,
}

impl CapacityLedger {
    pub fn from_suppliers(suppliers: &[Supplier]) -> Self {
        Self {
            remaining: suppliers
                .iter()
                .map(|supplier| (supplier.id.clone(), supplier.available_pallets))
                .collect(),
        }
    }

    /// Zero for suppliers the ledger does not know.
    pub fn remaining(&self, supplier_id: &str) -> u32 {
        self.remaining.get(supplier_id).copied().unwrap_or(0)
    }

    /// Takes `pallets` from the supplier, saturating at zero.
    pub fn consume(&mut self, supplier_id: &str, pallets: u32) {
        if let Some(left) = self.remaining.get_mut(supplier_id) {
            *left = left.saturating_sub(pallets);
        }
    }

    /// Writes the remaining capacity back onto `suppliers`.
    pub fn apply_to(&self, suppliers: &mut [Supplier]) {
        for supplier in suppliers {
            if let Some(&left) = self.remaining.get(&supplier.id) {
                supplier.available_pallets = left;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub store_id: String,
    pub supplier_id: String,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SupplierAssignment {
    /// In store order.
    pub assignments: Vec<Assignment>,
    /// Stores no supplier had capacity for.
    pub unassigned: Vec<String>,
}

impl SupplierAssignment {
    /// Store id to supplier id.
    pub fn as_map(&self) -> HashMap<String, String> {
        self.assignments
            .iter()
            .map(|a| (a.store_id.clone(), a.supplier_id.clone()))
            .collect()
    }
}

/// Assigns each store, in order, to the cheapest supplier that can still
/// cover its whole demand, and debits the ledger before moving on.
///
/// The result depends on store order: an early store may take capacity a
/// later store needed more.
pub fn assign_suppliers(
    stores: &[Store],
    suppliers: &[Supplier],
    ledger: &mut CapacityLedger,
    costs: &CostModel,
) -> SupplierAssignment {
    let mut result = SupplierAssignment::default();

    for store in stores {
        let mut best: Option<(&Supplier, f64)> = None;
        for supplier in suppliers {
            if ledger.remaining(&supplier.id) < store.demand_pallets {
                continue;
            }
            let cost = costs.supplier_assignment_cost(store, supplier);
            if best.is_none_or(|(_, lowest)| cost < lowest) {
                best = Some((supplier, cost));
            }
        }

        match best {
            Some((supplier, cost)) => {
                ledger.consume(&supplier.id, store.demand_pallets);
                debug!(
                    store = %store.id,
                    supplier = %supplier.id,
                    cost,
                    remaining = ledger.remaining(&supplier.id),
                    "assigned supplier"
                );
                result.assignments.push(Assignment {
                    store_id: store.id.clone(),
                    supplier_id: supplier.id.clone(),
                    cost,
                });
            }
            None => {
                warn!(
                    store = %store.id,
                    demand = store.demand_pallets,
                    "no supplier can cover demand"
                );
                result.unassigned.push(store.id.clone());
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::CostConfig;
    use crate::models::Location;

    fn store(id: &str, demand: u32) -> Store {
        Store::new(id, Location::new(id, 41.8781, -87.6298).unwrap(), demand).unwrap()
    }

    fn supplier(id: &str, available: u32, cost_per_pallet: f64) -> Supplier {
        let location = Location::new(id, 41.8781, -87.6298).unwrap();
        Supplier::new(id, location, available, cost_per_pallet)
    }

    #[test]
    fn capacity_decrements_between_stores() {
        // S1 takes 40 from P1 (cheaper), leaving 10; S2 needs 20 and must use P2.
        let stores = vec![store("S1", 40), store("S2", 20)];
        let suppliers = vec![supplier("P1", 50, 10.0), supplier("P2", 100, 12.0)];
        let mut ledger = CapacityLedger::from_suppliers(&suppliers);

        let model = CostModel::new(CostConfig::default());
        let result = assign_suppliers(&stores, &suppliers, &mut ledger, &model);

        let map = result.as_map();
        assert_eq!(map["S1"], "P1");
        assert_eq!(map["S2"], "P2");
        assert_eq!(ledger.remaining("P1"), 10);
        assert_eq!(ledger.remaining("P2"), 80);
        assert!(result.unassigned.is_empty());
    }

    #[test]
    fn store_order_changes_outcome() {
        let suppliers = vec![supplier("P1", 50, 10.0), supplier("P2", 100, 12.0)];
        let model = CostModel::default();

        let mut ledger = CapacityLedger::from_suppliers(&suppliers);
        let stores = [store("S2", 20), store("S1", 40)];
        let reversed = assign_suppliers(&stores, &suppliers, &mut ledger, &model);

        let map = reversed.as_map();
        assert_eq!(map["S2"], "P1");
        assert_eq!(map["S1"], "P2");
    }

    #[test]
    fn first_minimum_wins_on_ties() {
        let suppliers = vec![supplier("A", 50, 10.0), supplier("B", 50, 10.0)];
        let mut ledger = CapacityLedger::from_suppliers(&suppliers);
        let model = CostModel::default();
        let result = assign_suppliers(&[store("S", 5)], &suppliers, &mut ledger, &model);
        assert_eq!(result.assignments[0].supplier_id, "A");
    }

    #[test]
    fn uncovered_demand_is_reported() {
        let suppliers = vec![supplier("P1", 10, 10.0)];
        let mut ledger = CapacityLedger::from_suppliers(&suppliers);
        let stores = [store("big", 11), store("small", 10)];
        let model = CostModel::default();
        let result = assign_suppliers(&stores, &suppliers, &mut ledger, &model);
        assert_eq!(result.unassigned, vec!["big"]);
        assert_eq!(result.as_map()["small"], "P1");
        assert_eq!(ledger.remaining("P1"), 0);
    }

    #[test]
    fn ledger_writes_back_and_saturates() {
        let mut suppliers = vec![supplier("P1", 10, 1.0)];
        let mut ledger = CapacityLedger::from_suppliers(&suppliers);
        ledger.consume("P1", 25);
        ledger.consume("unknown", 5);
        assert_eq!(ledger.remaining("P1"), 0);
        assert_eq!(ledger.remaining("unknown"), 0);

        ledger.apply_to(&mut suppliers);
        assert_eq!(suppliers[0].available_pallets, 0);
    }
}
