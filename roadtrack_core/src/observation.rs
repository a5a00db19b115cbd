//! Vehicle observations and their per-vehicle chains.
//!
//! Observations arrive as geographic fixes and are projected into a local
//! metric plane before any filtering. Each vehicle's observations form a
//! chain through `prev` with strictly increasing timestamps; a violation is
//! rejected without touching the chain.

use std::collections::HashMap;
use std::sync::Arc;

use geo::Point;
use nalgebra::Vector2;
use uuid::Uuid;

use crate::error::TrackError;

/// Mean Earth radius in metres, for the local tangent-plane projection.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A single timestamped GPS fix for one vehicle.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Vehicle this fix belongs to.
    pub vehicle_id: Uuid,

    /// Seconds since the epoch.
    pub timestamp: f64,

    /// Geographic position (x = longitude, y = latitude), degrees.
    pub world: Point<f64>,

    /// Position in the projected metric plane, metres.
    pub projected: Vector2<f64>,

    /// Predecessor in this vehicle's chain, if any.
    pub prev: Option<Arc<Observation>>,
}

impl Observation {
    /// Creates a chain head.
    pub fn new(vehicle_id: Uuid, timestamp: f64, world: Point<f64>, projected: Vector2<f64>) -> Self {
        Self {
            vehicle_id,
            timestamp,
            world,
            projected,
            prev: None,
        }
    }

    /// Creates a successor, enforcing strict time order.
    pub fn after(
        prev: Arc<Observation>,
        timestamp: f64,
        world: Point<f64>,
        projected: Vector2<f64>,
    ) -> Result<Self, TrackError> {
        if timestamp <= prev.timestamp {
            return Err(TrackError::TimeOrder {
                previous: prev.timestamp,
                observed: timestamp,
            });
        }
        Ok(Self {
            vehicle_id: prev.vehicle_id,
            timestamp,
            world,
            projected,
            prev: Some(prev),
        })
    }

    /// Seconds elapsed since the previous observation, or `fallback` for a
    /// chain head.
    pub fn time_delta(&self, fallback: f64) -> f64 {
        self.prev
            .as_ref()
            .map(|p| self.timestamp - p.timestamp)
            .unwrap_or(fallback)
    }
}

/// Projects a geographic point into the metric plane anchored at `anchor`.
///
/// Equirectangular projection: exact enough over the few kilometres a street
/// graph spans, and trivially invertible for the simulator.
pub fn project_to_plane(world: Point<f64>, anchor: Point<f64>) -> Result<Vector2<f64>, TrackError> {
    for p in [&world, &anchor] {
        if !p.x().is_finite() || !p.y().is_finite() {
            return Err(TrackError::georef(format!(
                "non-finite coordinate ({}, {})",
                p.x(),
                p.y()
            )));
        }
        if p.y().abs() > 90.0 || p.x().abs() > 180.0 {
            return Err(TrackError::georef(format!(
                "coordinate out of range ({}, {})",
                p.x(),
                p.y()
            )));
        }
    }
    let lat0 = anchor.y().to_radians();
    let x = (world.x() - anchor.x()).to_radians() * lat0.cos() * EARTH_RADIUS_M;
    let y = (world.y() - anchor.y()).to_radians() * EARTH_RADIUS_M;
    Ok(Vector2::new(x, y))
}

/// Inverse of [`project_to_plane`]: planar metres back to degrees.
///
/// Used by the simulator to turn sampled planar observations into
/// geographic fixes.
pub fn unproject_from_plane(projected: Vector2<f64>, anchor: Point<f64>) -> Point<f64> {
    let lat0 = anchor.y().to_radians();
    let lon = anchor.x() + (projected.x / (EARTH_RADIUS_M * lat0.cos())).to_degrees();
    let lat = anchor.y() + (projected.y / EARTH_RADIUS_M).to_degrees();
    Point::new(lon, lat)
}

/// Builds per-vehicle observation chains.
///
/// The first observation fixes the projection anchor for the whole run.
/// Rejecting an out-of-order fix leaves the affected chain unchanged.
#[derive(Debug, Default)]
pub struct ObservationFactory {
    heads: HashMap<Uuid, Arc<Observation>>,
    anchor: Option<Point<f64>>,
}

impl ObservationFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory with a pre-fixed projection anchor, for callers that already
    /// work in a planar frame (e.g. the simulator).
    pub fn with_anchor(anchor: Point<f64>) -> Self {
        Self {
            heads: HashMap::new(),
            anchor: Some(anchor),
        }
    }

    /// Ingests a fix for `vehicle_id`, returning the new chain head.
    pub fn observe(
        &mut self,
        vehicle_id: Uuid,
        timestamp: f64,
        world: Point<f64>,
    ) -> Result<Arc<Observation>, TrackError> {
        let anchor = *self.anchor.get_or_insert(world);
        let projected = project_to_plane(world, anchor)?;
        let obs = match self.heads.get(&vehicle_id) {
            Some(head) => Observation::after(head.clone(), timestamp, world, projected)?,
            None => Observation::new(vehicle_id, timestamp, world, projected),
        };
        let obs = Arc::new(obs);
        self.heads.insert(vehicle_id, obs.clone());
        Ok(obs)
    }

    /// Latest observation for a vehicle, if any.
    pub fn latest(&self, vehicle_id: &Uuid) -> Option<&Arc<Observation>> {
        self.heads.get(vehicle_id)
    }

    /// Projection anchor, once the first observation has fixed it.
    pub fn anchor(&self) -> Option<Point<f64>> {
        self.anchor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_time_order_rejected_chain_unchanged() {
        let mut factory = ObservationFactory::new();
        let vehicle = Uuid::new_v4();

        let first = factory
            .observe(vehicle, 10.0, Point::new(-122.41, 37.77))
            .unwrap();

        // Older fix must fail with TimeOrder and leave the chain head alone.
        let result = factory.observe(vehicle, 5.0, Point::new(-122.42, 37.78));
        assert!(matches!(
            result,
            Err(TrackError::TimeOrder {
                previous,
                observed
            }) if previous == 10.0 && observed == 5.0
        ));
        assert!(Arc::ptr_eq(factory.latest(&vehicle).unwrap(), &first));
    }

    #[test]
    fn test_equal_timestamp_rejected() {
        let mut factory = ObservationFactory::new();
        let vehicle = Uuid::new_v4();
        factory
            .observe(vehicle, 10.0, Point::new(-122.41, 37.77))
            .unwrap();
        assert!(factory
            .observe(vehicle, 10.0, Point::new(-122.41, 37.77))
            .is_err());
    }

    #[test]
    fn test_anchor_projects_to_origin() {
        let anchor = Point::new(-122.41, 37.77);
        let projected = project_to_plane(anchor, anchor).unwrap();
        assert_relative_eq!(projected.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(projected.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_projection_round_trip() {
        let anchor = Point::new(-122.41, 37.77);
        let world = Point::new(-122.405, 37.772);
        let projected = project_to_plane(world, anchor).unwrap();
        let back = unproject_from_plane(projected, anchor);
        assert_relative_eq!(back.x(), world.x(), epsilon = 1e-9);
        assert_relative_eq!(back.y(), world.y(), epsilon = 1e-9);
    }

    #[test]
    fn test_out_of_range_coordinate_fails() {
        let anchor = Point::new(0.0, 0.0);
        let result = project_to_plane(Point::new(0.0, 91.0), anchor);
        assert!(matches!(result, Err(TrackError::NotGeoreferenced(_))));
    }

    #[test]
    fn test_time_delta_fallback() {
        let vehicle = Uuid::new_v4();
        let head = Observation::new(vehicle, 100.0, Point::new(0.0, 0.0), Vector2::zeros());
        assert_relative_eq!(head.time_delta(30.0), 30.0);

        let next = Observation::after(
            Arc::new(head),
            112.0,
            Point::new(0.0, 0.0),
            Vector2::zeros(),
        )
        .unwrap();
        assert_relative_eq!(next.time_delta(30.0), 12.0);
    }
}
