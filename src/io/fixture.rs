//! Board fixtures for the command-line driver
//!
//! A fixture is a JSON document holding a tenant's bookings and the known
//! customer site locations:
//!
//! ```json
//! {
//!   "bookings": [{ "id": "...", "start": "2024-06-03T09:00:00", ... }],
//!   "locations": { "house-3": { "lat": 64.14, "lng": -21.94 } }
//! }
//! ```

use crate::domain::{Booking, CustomerRef, SiteLocation};
use anyhow::Context;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoardFixture {
    #[serde(default)]
    pub bookings: Vec<Booking>,
    /// Keyed by customer reference
    #[serde(default)]
    locations: HashMap<String, SiteLocation>,
}

impl BoardFixture {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Failed to parse fixture {}", path.display()))
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let fixture: BoardFixture = serde_json::from_str(content)?;
        for booking in &fixture.bookings {
            booking
                .interval()
                .with_context(|| format!("booking {} has an invalid interval", booking.id))?;
        }
        Ok(fixture)
    }

    pub fn locations(&self) -> FxHashMap<CustomerRef, SiteLocation> {
        self.locations.iter().map(|(k, v)| (CustomerRef::new(k.clone()), *v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fixture_with_locations() {
        let json = r#"{
            "bookings": [{
                "id": "0190a0b4-3c1e-7d2a-9f00-000000000001",
                "start": "2024-06-03T09:00:00",
                "end": "2024-06-03T10:00:00",
                "assignee": "staff-a",
                "customer_ref": "house-3"
            }],
            "locations": { "house-3": { "lat": 64.14, "lng": -21.94, "geofence_radius_m": 75.0 } }
        }"#;
        let fixture = BoardFixture::from_json(json).unwrap();
        assert_eq!(fixture.bookings.len(), 1);
        assert_eq!(fixture.bookings[0].assignee.as_ref().map(|s| s.0.as_str()), Some("staff-a"));

        let locations = fixture.locations();
        let site = locations.get(&CustomerRef::new("house-3")).unwrap();
        assert_eq!(site.point.lat, 64.14);
        assert_eq!(site.geofence_radius_m, Some(75.0));
    }

    #[test]
    fn test_inverted_interval_is_rejected() {
        let json = r#"{
            "bookings": [{
                "id": "0190a0b4-3c1e-7d2a-9f00-000000000002",
                "start": "2024-06-03T10:00:00",
                "end": "2024-06-03T09:00:00",
                "customer_ref": "house-3"
            }]
        }"#;
        assert!(BoardFixture::from_json(json).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = BoardFixture::from_file("/nonexistent/fixture.json").unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read fixture"));
    }
}
