//! Real Chicago-area and southern Wisconsin locations for test fixtures.
//!
//! Coordinates are city-center or storefront points taken from
//! OpenStreetMap, rounded to four decimals.

/// A named point.
#[derive(Debug, Clone, Copy)]
pub struct Place {
    pub name: &'static str,
    pub lat: f64,
    pub lon: f64,
}

impl Place {
    pub const fn new(name: &'static str, lat: f64, lon: f64) -> Self {
        Self { name, lat, lon }
    }
}

// ============================================================================
// Distribution centers
// ============================================================================

pub const CHICAGO_DC: Place = Place::new("Chicago DC", 41.8781, -87.6298);
pub const ELK_GROVE_DC: Place = Place::new("Elk Grove DC", 42.0039, -87.9703);
pub const KENOSHA_DC: Place = Place::new("Kenosha DC", 42.5847, -87.8212);

// ============================================================================
// Grocery stores
// ============================================================================

pub const CITY_STORES: &[Place] = &[
    Place::new("Lincoln Park", 41.9214, -87.6513),
    Place::new("Hyde Park", 41.7943, -87.5907),
    Place::new("Wicker Park", 41.9088, -87.6796),
    Place::new("Pilsen", 41.8564, -87.6562),
    Place::new("Logan Square", 41.9231, -87.7093),
    Place::new("Bridgeport", 41.8381, -87.6510),
];

pub const SUBURB_STORES: &[Place] = &[
    Place::new("Evanston", 42.0451, -87.6877),
    Place::new("Oak Park", 41.8850, -87.7845),
    Place::new("Naperville", 41.7508, -88.1535),
    Place::new("Schaumburg", 42.0334, -88.0834),
    Place::new("Joliet", 41.5250, -88.0817),
    Place::new("Gary", 41.5934, -87.3464),
];

pub const WISCONSIN_STORES: &[Place] = &[
    Place::new("Milwaukee", 43.0389, -87.9065),
    Place::new("Racine", 42.7261, -87.7829),
    Place::new("Waukesha", 43.0117, -88.2315),
];

/// Every store fixture.
pub fn all_stores() -> Vec<Place> {
    CITY_STORES
        .iter()
        .chain(SUBURB_STORES)
        .chain(WISCONSIN_STORES)
        .copied()
        .collect()
}
