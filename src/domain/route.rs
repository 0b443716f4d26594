//! Route model - geolocated stops and the ordered result of route planning

use crate::domain::types::{Booking, BookingId};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Coordinates in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and inside the valid degree ranges
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Location stored on a customer/property record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SiteLocation {
    #[serde(flatten)]
    pub point: GeoPoint,
    #[serde(default)]
    pub geofence_radius_m: Option<f64>,
}

/// A booking offered to the route planner; the location may be missing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteCandidate {
    pub booking_id: BookingId,
    pub label: String,
    pub scheduled_start: NaiveDateTime,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

impl RouteCandidate {
    pub fn from_booking(booking: &Booking, label: &str, location: Option<GeoPoint>) -> Self {
        Self {
            booking_id: booking.id,
            label: label.to_string(),
            scheduled_start: booking.start,
            location,
        }
    }

    /// Convert to a route point when the coordinates are usable
    pub fn to_point(&self) -> Option<RoutePoint> {
        let location = self.location.filter(GeoPoint::is_valid)?;
        Some(RoutePoint {
            booking_id: self.booking_id,
            lat: location.lat,
            lng: location.lng,
            label: self.label.clone(),
            scheduled_start: self.scheduled_start,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub booking_id: BookingId,
    pub lat: f64,
    pub lng: f64,
    pub label: String,
    pub scheduled_start: NaiveDateTime,
}

impl RoutePoint {
    #[inline]
    pub fn geo(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// One visit in the planned order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteStop {
    /// 1-based position in the route
    pub sequence: usize,
    pub point: RoutePoint,
    /// Distance from the previous stop (0 for the origin)
    pub leg_distance_m: f64,
}

/// Ordered route plus its cost
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteResult {
    pub stops: Vec<RouteStop>,
    pub total_distance_m: f64,
    /// Credits charged (or to be charged) for this plan
    pub credit_cost: Decimal,
}

impl RouteResult {
    pub fn booking_order(&self) -> Vec<BookingId> {
        self.stops.iter().map(|s| s.point.booking_id).collect()
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }
}
