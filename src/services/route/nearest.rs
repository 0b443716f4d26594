//! Nearest-neighbor sequencing
//!
//! Start at the earliest scheduled point and always step to the closest
//! unvisited one. Quadratic, deterministic; ties go to the point that came
//! first after the stable sort.

use crate::domain::{RoutePoint, RouteStop};
use crate::services::route::geo::haversine_m;

/// Order the points; returns the stops and the summed leg distance
pub fn sequence(mut points: Vec<RoutePoint>) -> (Vec<RouteStop>, f64) {
    points.sort_by_key(|p| p.scheduled_start);

    let mut remaining = points.into_iter();
    let Some(origin) = remaining.next() else {
        return (Vec::new(), 0.0);
    };
    let mut unvisited: Vec<RoutePoint> = remaining.collect();
    let mut stops = Vec::with_capacity(unvisited.len() + 1);
    stops.push(RouteStop { sequence: 1, point: origin, leg_distance_m: 0.0 });
    let mut total = 0.0;

    while !unvisited.is_empty() {
        let tail = stops[stops.len() - 1].point.geo();
        let mut best = 0;
        let mut best_distance = f64::INFINITY;
        for (i, candidate) in unvisited.iter().enumerate() {
            let d = haversine_m(tail, candidate.geo());
            // strict comparison keeps the first minimum
            if d < best_distance {
                best = i;
                best_distance = d;
            }
        }
        let next = unvisited.remove(best);
        total += best_distance;
        stops.push(RouteStop { sequence: stops.len() + 1, point: next, leg_distance_m: best_distance });
    }

    (stops, total)
}
