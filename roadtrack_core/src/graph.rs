//! Read-only view of the inferred street graph.
//!
//! Edges carry planar polyline geometry in the projected metric frame.
//! Adjacency is explicit (an edge knows its incoming and outgoing
//! neighbours) and a spatial index answers "which edges are near this
//! point" for off-road vehicles approaching the network.

use std::collections::HashMap;
use std::sync::Arc;

use geo::{EuclideanDistance, EuclideanLength, LineInterpolatePoint, LineLocatePoint, LineString, Point};
use nalgebra::Vector2;
use rstar::{primitives::GeomWithData, RTree, AABB};
use serde::{Deserialize, Serialize};

use crate::error::TrackError;

/// Stable identity of an inferred edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// A directed edge of the street graph.
///
/// Geometry is a polyline in the projected metric plane; `length` is its
/// precomputed arc length. Equality is by identity.
#[derive(Debug, Clone)]
pub struct InferredEdge {
    pub id: EdgeId,
    pub geometry: LineString<f64>,
    pub length: f64,
}

impl PartialEq for InferredEdge {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for InferredEdge {}

impl InferredEdge {
    /// Builds an edge, rejecting degenerate geometry.
    pub fn new(id: EdgeId, geometry: LineString<f64>) -> Result<Self, TrackError> {
        if geometry.0.len() < 2 {
            return Err(TrackError::graph(format!(
                "edge {id} needs at least two vertices"
            )));
        }
        let length = geometry.euclidean_length();
        if !(length.is_finite() && length > 0.0) {
            return Err(TrackError::graph(format!(
                "edge {id} has degenerate length {length}"
            )));
        }
        Ok(Self { id, geometry, length })
    }

    /// First vertex of the polyline.
    pub fn start(&self) -> Vector2<f64> {
        let c = self.geometry.0[0];
        Vector2::new(c.x, c.y)
    }

    /// Last vertex of the polyline.
    pub fn end(&self) -> Vector2<f64> {
        let c = self.geometry.0[self.geometry.0.len() - 1];
        Vector2::new(c.x, c.y)
    }

    /// Point at arc-length `arc` from the start, clamped to the extent.
    pub fn point_at(&self, arc: f64) -> Vector2<f64> {
        let fraction = (arc / self.length).clamp(0.0, 1.0);
        match self.geometry.line_interpolate_point(fraction) {
            Some(p) => Vector2::new(p.x(), p.y()),
            None => self.start(),
        }
    }

    /// Unit tangent of the polyline segment containing arc-length `arc`.
    ///
    /// Zero-length segments are skipped; past the final vertex the last
    /// segment's tangent applies.
    pub fn tangent_at(&self, arc: f64) -> Vector2<f64> {
        let clamped = arc.clamp(0.0, self.length);
        let mut travelled = 0.0;
        let mut tangent = Vector2::new(1.0, 0.0);
        for segment in self.geometry.lines() {
            let dx = segment.end.x - segment.start.x;
            let dy = segment.end.y - segment.start.y;
            let seg_len = (dx * dx + dy * dy).sqrt();
            if seg_len <= f64::EPSILON {
                continue;
            }
            tangent = Vector2::new(dx / seg_len, dy / seg_len);
            if travelled + seg_len >= clamped {
                break;
            }
            travelled += seg_len;
        }
        tangent
    }

    /// Projects a planar point onto the edge: returns the arc length of the
    /// foot of the perpendicular and the foot itself.
    pub fn project(&self, point: &Vector2<f64>) -> (f64, Vector2<f64>) {
        let p = Point::new(point.x, point.y);
        let arc = self
            .geometry
            .line_locate_point(&p)
            .map(|fraction| fraction * self.length)
            .unwrap_or(0.0);
        (arc, self.point_at(arc))
    }

    /// Euclidean distance from a planar point to the edge geometry.
    pub fn distance_to(&self, point: &Vector2<f64>) -> f64 {
        Point::new(point.x, point.y).euclidean_distance(&self.geometry)
    }
}

/// The street graph: edge store, explicit adjacency, and a spatial index
/// over edge geometries.
pub struct RoadGraph {
    edges: HashMap<EdgeId, Arc<InferredEdge>>,
    outgoing: HashMap<EdgeId, Vec<EdgeId>>,
    incoming: HashMap<EdgeId, Vec<EdgeId>>,
    index: RTree<GeomWithData<LineString<f64>, EdgeId>>,
}

impl RoadGraph {
    pub fn new() -> Self {
        Self {
            edges: HashMap::new(),
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
            index: RTree::new(),
        }
    }

    /// Inserts an edge. Ids must be unique.
    pub fn add_edge(
        &mut self,
        id: EdgeId,
        geometry: LineString<f64>,
    ) -> Result<Arc<InferredEdge>, TrackError> {
        if self.edges.contains_key(&id) {
            return Err(TrackError::graph(format!("duplicate edge id {id}")));
        }
        let edge = Arc::new(InferredEdge::new(id, geometry)?);
        self.index
            .insert(GeomWithData::new(edge.geometry.clone(), id));
        self.edges.insert(id, edge.clone());
        Ok(edge)
    }

    /// Declares `to` reachable from the end of `from`.
    pub fn connect(&mut self, from: EdgeId, to: EdgeId) -> Result<(), TrackError> {
        if !self.edges.contains_key(&from) || !self.edges.contains_key(&to) {
            return Err(TrackError::graph(format!(
                "connect {from} -> {to}: unknown edge"
            )));
        }
        let out = self.outgoing.entry(from).or_default();
        if !out.contains(&to) {
            out.push(to);
        }
        let inc = self.incoming.entry(to).or_default();
        if !inc.contains(&from) {
            inc.push(from);
        }
        Ok(())
    }

    pub fn edge(&self, id: EdgeId) -> Option<Arc<InferredEdge>> {
        self.edges.get(&id).cloned()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edges reachable from the end of `id`, in insertion order.
    pub fn outgoing(&self, id: EdgeId) -> Vec<Arc<InferredEdge>> {
        self.resolve(self.outgoing.get(&id))
    }

    /// Edges whose end feeds the start of `id`, in insertion order.
    pub fn incoming(&self, id: EdgeId) -> Vec<Arc<InferredEdge>> {
        self.resolve(self.incoming.get(&id))
    }

    /// Union of incoming and outgoing neighbours, deduplicated.
    pub fn neighbours(&self, id: EdgeId) -> Vec<Arc<InferredEdge>> {
        let mut result = self.outgoing(id);
        for edge in self.incoming(id) {
            if !result.iter().any(|e| e.id == edge.id) {
                result.push(edge);
            }
        }
        result
    }

    /// True when `b` is reachable from `a` in either direction, or `a == b`.
    pub fn is_adjacent(&self, a: EdgeId, b: EdgeId) -> bool {
        a == b
            || self.outgoing.get(&a).is_some_and(|v| v.contains(&b))
            || self.incoming.get(&a).is_some_and(|v| v.contains(&b))
    }

    /// Edges whose geometry lies within `radius` metres of `point`, nearest
    /// first (ties broken by id so results are reproducible).
    pub fn nearby_edges(&self, point: &Vector2<f64>, radius: f64) -> Vec<Arc<InferredEdge>> {
        let query = Point::new(point.x, point.y);
        let bbox = AABB::from_corners(
            Point::new(point.x - radius, point.y - radius),
            Point::new(point.x + radius, point.y + radius),
        );
        let mut hits: Vec<(f64, EdgeId)> = self
            .index
            .locate_in_envelope_intersecting(&bbox)
            .map(|geom| (query.euclidean_distance(geom.geom()), geom.data))
            .filter(|(dist, _)| *dist <= radius)
            .collect();
        hits.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal).then(a.1.cmp(&b.1)));
        hits.into_iter()
            .filter_map(|(_, id)| self.edges.get(&id).cloned())
            .collect()
    }

    fn resolve(&self, ids: Option<&Vec<EdgeId>>) -> Vec<Arc<InferredEdge>> {
        ids.map(|ids| {
            ids.iter()
                .filter_map(|id| self.edges.get(id).cloned())
                .collect()
        })
        .unwrap_or_default()
    }
}

impl Default for RoadGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::line_string;

    fn straight_edge(id: u64, x0: f64, x1: f64) -> (EdgeId, LineString<f64>) {
        (EdgeId(id), line_string![(x: x0, y: 0.0), (x: x1, y: 0.0)])
    }

    #[test]
    fn test_degenerate_geometry_rejected() {
        let geometry = line_string![(x: 5.0, y: 5.0), (x: 5.0, y: 5.0)];
        assert!(matches!(
            InferredEdge::new(EdgeId(1), geometry),
            Err(TrackError::GraphInconsistency(_))
        ));
    }

    #[test]
    fn test_projection_onto_straight_edge() {
        let (id, geometry) = straight_edge(1, 0.0, 100.0);
        let edge = InferredEdge::new(id, geometry).unwrap();

        let (arc, foot) = edge.project(&Vector2::new(40.0, 7.0));
        assert_relative_eq!(arc, 40.0, epsilon = 1e-9);
        assert_relative_eq!(foot.x, 40.0, epsilon = 1e-9);
        assert_relative_eq!(foot.y, 0.0, epsilon = 1e-9);

        // Beyond the extent clamps to the end vertex.
        let (arc, _) = edge.project(&Vector2::new(150.0, 0.0));
        assert_relative_eq!(arc, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_tangent_follows_polyline_bend() {
        let geometry = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0)];
        let edge = InferredEdge::new(EdgeId(1), geometry).unwrap();

        let t0 = edge.tangent_at(5.0);
        assert_relative_eq!(t0.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(t0.y, 0.0, epsilon = 1e-12);

        let t1 = edge.tangent_at(15.0);
        assert_relative_eq!(t1.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(t1.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_adjacency() {
        let mut graph = RoadGraph::new();
        let (a, ga) = straight_edge(1, 0.0, 50.0);
        let (b, gb) = straight_edge(2, 50.0, 100.0);
        graph.add_edge(a, ga).unwrap();
        graph.add_edge(b, gb).unwrap();
        graph.connect(a, b).unwrap();

        assert!(graph.is_adjacent(a, b));
        assert!(graph.is_adjacent(b, a));
        assert!(graph.is_adjacent(a, a));
        assert_eq!(graph.outgoing(a).len(), 1);
        assert_eq!(graph.outgoing(b).len(), 0);
        assert_eq!(graph.incoming(b)[0].id, a);
    }

    #[test]
    fn test_duplicate_edge_id_rejected() {
        let mut graph = RoadGraph::new();
        let (a, ga) = straight_edge(1, 0.0, 50.0);
        let (_, gb) = straight_edge(1, 50.0, 100.0);
        graph.add_edge(a, ga).unwrap();
        assert!(graph.add_edge(a, gb).is_err());
    }

    #[test]
    fn test_nearby_edges_sorted_by_distance() {
        let mut graph = RoadGraph::new();
        graph
            .add_edge(EdgeId(1), line_string![(x: 0.0, y: 10.0), (x: 100.0, y: 10.0)])
            .unwrap();
        graph
            .add_edge(EdgeId(2), line_string![(x: 0.0, y: 3.0), (x: 100.0, y: 3.0)])
            .unwrap();
        graph
            .add_edge(EdgeId(3), line_string![(x: 0.0, y: 500.0), (x: 100.0, y: 500.0)])
            .unwrap();

        let nearby = graph.nearby_edges(&Vector2::new(50.0, 0.0), 20.0);
        assert_eq!(nearby.len(), 2);
        assert_eq!(nearby[0].id, EdgeId(2));
        assert_eq!(nearby[1].id, EdgeId(1));
    }
}
